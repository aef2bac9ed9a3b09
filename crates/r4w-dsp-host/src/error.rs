//! Error types for the DSP host crate.

use thiserror::Error;

/// Failure to bring a bytecode module up to the `Initialized` state.
///
/// Every variant is fatal to that initialization attempt; the bridge is left
/// in its disabled (passthrough) state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    /// The owned copy of the artifact could not be allocated
    #[error("artifact copy failed: {0}")]
    ArtifactCopy(String),

    /// The runtime (engine) could not be created
    #[error("runtime init failed: {0}")]
    RuntimeInit(String),

    /// The loader rejected the artifact
    #[error("module load failed: {0}")]
    LoadFailed(String),

    /// The execution context (store, linker, host imports) could not be built
    #[error("execution context failed: {0}")]
    ContextFailed(String),

    /// Instantiation failed (unresolved imports, memory budget, start trap)
    #[error("instantiation failed: {0}")]
    InstantiateFailed(String),

    /// A required export is absent
    #[error("missing export '{0}'")]
    MissingExport(String),

    /// A required export exists but has the wrong signature
    #[error("export '{name}' has the wrong signature: {reason}")]
    SignatureMismatch {
        /// Export name
        name: String,
        /// What did not match
        reason: String,
    },
}

/// Failure to lay out the scratch regions during `prepare`.
///
/// The bridge stays in its previous state (`Initialized`, not `Prepared`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// `prepare` was called without a loaded module
    #[error("bridge is not initialized")]
    NotInitialized,

    /// The module does not export a linear memory
    #[error("module exports no linear memory named '{0}'")]
    NoMemory(String),

    /// The linear memory is smaller than the highest region end offset
    #[error("linear memory too small: need {required} bytes, have {available}")]
    MemoryTooSmall {
        /// Highest region end offset in bytes
        required: usize,
        /// Current memory size in bytes
        available: usize,
    },

    /// The audio I/O regions would run into the sample arena
    #[error("I/O regions end at {io_end} but the sample arena starts at {arena_start}")]
    RegionOverlap {
        /// End of the right-out region
        io_end: usize,
        /// Start of the sample arena
        arena_start: usize,
    },

    /// The sample arena ends beyond what a 32-bit module can address
    #[error("sample arena ends at {0}, beyond the 32-bit address range")]
    OutOfAddressRange(usize),

    /// A block size of zero, or one too large to address
    #[error("invalid block size {0}")]
    InvalidBlockSize(usize),

    /// The module's `init` export trapped
    #[error("init export failed: {0}")]
    InitFailed(String),
}

/// Failure of a sampler slot operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SampleError {
    /// No module is loaded, or the module is not a sampler
    #[error("sampler is not initialized")]
    NotInitialized,

    /// Slot index outside the layout's slot count
    #[error("slot {slot} out of range (0..{count})")]
    InvalidSlot {
        /// Requested slot
        slot: usize,
        /// Number of slots in the layout
        count: usize,
    },

    /// The slot region lies beyond the end of linear memory
    #[error("linear memory too small for slot region ending at {0}")]
    MemoryTooSmall(usize),

    /// The calling thread could not register with the runtime
    #[error("calling thread is not registered with the runtime")]
    Unregistered,

    /// The module trapped while recording the slot
    #[error("sandbox trap: {0}")]
    Trap(String),
}

/// Crate-level error type.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Initialization error
    #[error(transparent)]
    Init(#[from] InitError),

    /// Region allocation error
    #[error(transparent)]
    Alloc(#[from] AllocError),

    /// Sample slot error
    #[error(transparent)]
    Sample(#[from] SampleError),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
