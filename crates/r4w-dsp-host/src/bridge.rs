//! The per-block call protocol between the audio host and a DSP module.
//!
//! ## Threads
//!
//! Two threads use a [`DspBridge`]:
//!
//! - the **control thread** loads, prepares, sets parameters, loads samples
//!   and shuts down; it may block
//! - the **audio thread** calls [`DspBridge::process`] once per block; it never
//!   blocks, allocates or returns an error
//!
//! The module lives behind a mutex. Control operations `lock()` it; the audio
//! thread only `try_lock()`s and renders the fallback for that block if the
//! control thread holds it. The `initialized` and `prepared` flags are read
//! with acquire ordering before the lock is even attempted, and `shutdown`
//! clears them with release ordering before it tears anything down.
//!
//! ## Fallback
//!
//! A block the module cannot render is still written:
//!
//! | Cause | Output |
//! |-------|--------|
//! | not prepared, bad sample count | input copied through |
//! | module busy, thread unregistered, trap | variant fallback |
//!
//! The variant fallback is passthrough for the delay and silence for the
//! sampler (see [`BridgeConfig::fallback_mode`]).

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{AllocError, InitError, SampleError};
use crate::stats::{ProcessStats, StatsSnapshot};
use crate::thread_guard::{ThreadEnv, ThreadGuard};
use crate::wasm::memory::{
    self, IoRegions, Region, Regions, SampleArena, BYTES_PER_SAMPLE, MEMORY_EXPORT,
};
use crate::wasm::{BridgeConfig, DspVariant, FallbackMode, MemoryLayout, ModuleStore, Param};

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

/// Samples copied per lock hold by [`DspBridge::load_sample`].
const LOAD_CHUNK: usize = 4 * 1024;

/// Gap between chunks while the audio thread may be running.
const LOAD_PAUSE: Duration = Duration::from_millis(1);

/// Lifecycle state of a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// No module loaded; processing passes audio through
    Uninitialized,
    /// Module loaded and bound, no buffers yet
    Initialized,
    /// Buffers laid out and the module initialized for a sample rate
    Prepared,
    /// A block is being rendered
    Processing,
    /// Teardown in progress
    ShuttingDown,
}

/// Why a block was not rendered by the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// `prepare` has not succeeded (or shutdown started)
    NotPrepared,
    /// Zero samples, more than the prepared capacity, or short buffers
    InvalidBlockSize,
    /// The control thread held the module
    Busy,
    /// The calling thread could not register with the runtime
    ThreadUnregistered,
    /// The module trapped
    Fault,
}

/// What happened to one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// The module rendered the block
    Processed,
    /// The fallback rendered the block
    Fallback {
        /// What was written
        mode: FallbackMode,
        /// Why
        reason: FallbackReason,
    },
}

impl BlockOutcome {
    /// Whether the module rendered the block.
    pub fn is_processed(&self) -> bool {
        matches!(self, BlockOutcome::Processed)
    }
}

/// Stereo buffers for one block.
trait BlockIo {
    /// Shortest buffer length.
    fn len(&self) -> usize;
    fn inputs(&self) -> (&[f32], &[f32]);
    fn outputs(&mut self) -> (&mut [f32], &mut [f32]);
    fn passthrough(&mut self, n: usize);

    fn silence(&mut self, n: usize) {
        let (left, right) = self.outputs();
        let n = n.min(left.len()).min(right.len());
        left[..n].fill(0.0);
        right[..n].fill(0.0);
    }
}

struct SplitIo<'a> {
    left_in: &'a [f32],
    right_in: &'a [f32],
    left_out: &'a mut [f32],
    right_out: &'a mut [f32],
}

impl BlockIo for SplitIo<'_> {
    fn len(&self) -> usize {
        self.left_in
            .len()
            .min(self.right_in.len())
            .min(self.left_out.len())
            .min(self.right_out.len())
    }

    fn inputs(&self) -> (&[f32], &[f32]) {
        (self.left_in, self.right_in)
    }

    fn outputs(&mut self) -> (&mut [f32], &mut [f32]) {
        (&mut *self.left_out, &mut *self.right_out)
    }

    fn passthrough(&mut self, n: usize) {
        let left = n.min(self.left_in.len()).min(self.left_out.len());
        self.left_out[..left].copy_from_slice(&self.left_in[..left]);
        let right = n.min(self.right_in.len()).min(self.right_out.len());
        self.right_out[..right].copy_from_slice(&self.right_in[..right]);
    }
}

struct InPlaceIo<'a> {
    left: &'a mut [f32],
    right: &'a mut [f32],
}

impl BlockIo for InPlaceIo<'_> {
    fn len(&self) -> usize {
        self.left.len().min(self.right.len())
    }

    fn inputs(&self) -> (&[f32], &[f32]) {
        (&*self.left, &*self.right)
    }

    fn outputs(&mut self) -> (&mut [f32], &mut [f32]) {
        (&mut *self.left, &mut *self.right)
    }

    fn passthrough(&mut self, _n: usize) {}
}

/// A parameter value waiting for the module to become free.
#[derive(Default)]
struct PendingParam {
    bits: AtomicU32,
    dirty: AtomicBool,
}

struct PendingParams([PendingParam; Param::COUNT]);

impl PendingParams {
    fn new() -> Self {
        Self(std::array::from_fn(|_| PendingParam::default()))
    }

    fn park(&self, param: Param, value: f32) {
        let slot = &self.0[param.index()];
        slot.bits.store(value.to_bits(), Ordering::Relaxed);
        slot.dirty.store(true, Ordering::Release);
    }

    fn take(&self, param: Param) -> Option<f32> {
        let slot = &self.0[param.index()];
        slot.dirty
            .swap(false, Ordering::Acquire)
            .then(|| f32::from_bits(slot.bits.load(Ordering::Relaxed)))
    }

    fn clear(&self) {
        for slot in &self.0 {
            slot.dirty.store(false, Ordering::Relaxed);
        }
    }
}

/// A loaded module plus what has been laid out in its memory.
struct Session {
    regions: Option<Regions>,
    arena: Option<SampleArena>,
    module: ModuleStore,
}

impl Session {
    fn new(module: ModuleStore) -> Self {
        Self {
            regions: None,
            arena: None,
            module,
        }
    }

    fn capacity(&self) -> usize {
        self.regions.map(|r| r.io.capacity).unwrap_or(0)
    }

    fn run_init(&mut self, sample_rate: f32, max_delay_ms: f32) -> Result<(), AllocError> {
        match self.module.call_init(sample_rate, max_delay_ms) {
            Ok(Some(status)) if status != 0 => {
                let export = self.module.variant().init_export();
                tracing::warn!("{} returned status {}", export, status);
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => Err(AllocError::InitFailed(format!("{:#}", e))),
        }
    }

    fn apply_param(&mut self, param: Param, value: f32) {
        if let Err(e) = self.module.call_param(param, value) {
            tracing::debug!("{} trapped: {}", param.export_name(), e);
        }
    }

    /// Apply parked values. Runs on the audio thread too, so traps are not logged.
    fn flush_pending(&mut self, pending: &PendingParams) {
        for &param in self.module.variant().params() {
            if let Some(value) = pending.take(param) {
                let _ = self.module.call_param(param, value);
            }
        }
    }

    /// The committed arena, committing it first if `prepare` has not run.
    fn sample_arena(&mut self, layout: &MemoryLayout) -> Result<SampleArena, SampleError> {
        if let Some(arena) = self.arena {
            return Ok(arena);
        }
        let memory = self.module.memory_mut().ok_or(SampleError::NotInitialized)?;
        let arena = memory::commit_arena(memory, layout).map_err(|e| match e {
            AllocError::MemoryTooSmall { required, .. } => SampleError::MemoryTooSmall(required),
            AllocError::OutOfAddressRange(end) => SampleError::MemoryTooSmall(end),
            _ => SampleError::NotInitialized,
        })?;
        self.arena = Some(arena);
        Ok(arena)
    }

    /// Copy in, call `process_block`, copy out. `Err` means nothing usable was produced.
    fn run_block(
        &mut self,
        io: &IoRegions,
        block: &mut impl BlockIo,
        n: usize,
    ) -> Result<(), ()> {
        {
            let memory = self.module.memory_mut().ok_or(())?;
            let (left_in, right_in) = block.inputs();
            if !memory::write_samples(memory, &io.left_in, &left_in[..n])
                || !memory::write_samples(memory, &io.right_in, &right_in[..n])
            {
                return Err(());
            }
        }

        self.module.call_process(io, n).map_err(|_| ())?;

        // The module may have grown its memory; take a fresh view
        let memory = self.module.memory_mut().ok_or(())?;
        let (left_out, right_out) = block.outputs();
        if memory::read_samples(memory, &io.left_out, &mut left_out[..n])
            && memory::read_samples(memory, &io.right_out, &mut right_out[..n])
        {
            Ok(())
        } else {
            Err(())
        }
    }
}

/// Hosts one DSP module for an audio callback.
///
/// All methods take `&self`; share the bridge between the control and audio
/// threads with an `Arc`.
pub struct DspBridge {
    config: BridgeConfig,
    initialized: AtomicBool,
    prepared: AtomicBool,
    processing: AtomicBool,
    shutting_down: AtomicBool,
    capacity: AtomicUsize,
    epoch: AtomicU64,
    session: Mutex<Option<Session>>,
    pending: PendingParams,
    guard: ThreadGuard,
    stats: ProcessStats,
}

impl DspBridge {
    /// Create an uninitialized bridge.
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_thread_env(config, crate::thread_guard::WasmtimeThreadEnv)
    }

    /// Create a bridge with a custom per-thread environment.
    pub fn with_thread_env(config: BridgeConfig, env: impl ThreadEnv + 'static) -> Self {
        Self {
            config,
            initialized: AtomicBool::new(false),
            prepared: AtomicBool::new(false),
            processing: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            capacity: AtomicUsize::new(0),
            epoch: AtomicU64::new(0),
            session: Mutex::new(None),
            pending: PendingParams::new(),
            guard: ThreadGuard::new(env),
            stats: ProcessStats::default(),
        }
    }

    /// Load `artifact`, replacing any module already loaded.
    ///
    /// On failure the bridge is left uninitialized and passes audio through.
    pub fn initialize(&self, artifact: &[u8]) -> Result<(), InitError> {
        self.shutdown();

        let epoch = NEXT_EPOCH.fetch_add(1, Ordering::Relaxed);
        self.epoch.store(epoch, Ordering::Release);
        if !self.guard.ensure_registered(epoch) {
            return Err(InitError::RuntimeInit(
                "calling thread could not register with the runtime".to_string(),
            ));
        }

        let mut module = ModuleStore::load(&self.config, artifact).map_err(|e| {
            tracing::warn!("DSP module initialization failed: {}", e);
            e
        })?;
        module.drain_console();
        tracing::info!(
            "DSP module initialized ({:?}, {} bytes, {} bytes linear memory)",
            module.variant(),
            module.artifact().len(),
            module.memory_size()
        );

        let mut session = self.session.lock();
        *session = Some(Session::new(module));
        self.pending.clear();
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Lay out buffers for `max_block_size` samples and initialize the module
    /// for `sample_rate`.
    ///
    /// If the current buffers are already large enough only the module's init
    /// export runs. A zero block size is rejected without touching the
    /// current buffers; any other failure leaves the bridge initialized but
    /// unprepared.
    pub fn prepare(&self, sample_rate: f64, max_block_size: usize) -> Result<(), AllocError> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(AllocError::NotInitialized);
        }
        if max_block_size == 0 {
            return Err(AllocError::InvalidBlockSize(max_block_size));
        }
        if !self.guard.ensure_registered(self.epoch.load(Ordering::Acquire)) {
            return Err(AllocError::InitFailed(
                "calling thread could not register with the runtime".to_string(),
            ));
        }

        let mut guard = self.session.lock();
        let session = guard.as_mut().ok_or(AllocError::NotInitialized)?;
        let sample_rate = sample_rate as f32;

        if self.prepared.load(Ordering::Acquire) && session.capacity() >= max_block_size {
            let init = session.run_init(sample_rate, self.config.max_delay_ms);
            session.module.drain_console();
            init?;
            session.flush_pending(&self.pending);
            tracing::debug!("re-initialized DSP module at {} Hz", sample_rate);
            return Ok(());
        }

        // Old regions are dead from here on, even if allocation fails
        self.prepared.store(false, Ordering::Release);
        self.capacity.store(0, Ordering::Release);
        session.regions = None;

        let with_arena = self.config.variant.has_sample_arena();
        let existing_arena = session.arena;
        let memory = session
            .module
            .memory_mut()
            .ok_or_else(|| AllocError::NoMemory(MEMORY_EXPORT.to_string()))?;
        let regions = memory::allocate(
            memory,
            &self.config.layout,
            max_block_size,
            with_arena,
            existing_arena,
        )
        .map_err(|e| {
            tracing::warn!("DSP buffer allocation failed: {}", e);
            e
        })?;
        session.arena = regions.arena;
        session.regions = Some(regions);

        let init = session.run_init(sample_rate, self.config.max_delay_ms);
        session.module.drain_console();
        init?;
        session.flush_pending(&self.pending);

        self.capacity.store(max_block_size, Ordering::Release);
        self.prepared.store(true, Ordering::Release);
        tracing::debug!(
            "prepared DSP module: {} Hz, {} samples per block, I/O at {}..{}",
            sample_rate,
            max_block_size,
            regions.io.start(),
            regions.io.end()
        );
        Ok(())
    }

    /// Render one block from split input and output buffers.
    ///
    /// Never fails: a block the module cannot render is written by the
    /// fallback and the reason is returned.
    pub fn process(
        &self,
        left_in: &[f32],
        right_in: &[f32],
        left_out: &mut [f32],
        right_out: &mut [f32],
        num_samples: usize,
    ) -> BlockOutcome {
        let mut io = SplitIo {
            left_in,
            right_in,
            left_out,
            right_out,
        };
        self.process_with(&mut io, num_samples)
    }

    /// Render one block in place over a shared stereo buffer.
    pub fn process_in_place(
        &self,
        left: &mut [f32],
        right: &mut [f32],
        num_samples: usize,
    ) -> BlockOutcome {
        let mut io = InPlaceIo { left, right };
        self.process_with(&mut io, num_samples)
    }

    fn process_with(&self, io: &mut impl BlockIo, n: usize) -> BlockOutcome {
        if !self.initialized.load(Ordering::Acquire) || !self.prepared.load(Ordering::Acquire) {
            return self.fall_back(io, n, FallbackMode::Passthrough, FallbackReason::NotPrepared);
        }
        if n == 0 || n > self.capacity.load(Ordering::Acquire) || n > io.len() {
            let reason = FallbackReason::InvalidBlockSize;
            return self.fall_back(io, n, FallbackMode::Passthrough, reason);
        }

        let mode = self.config.fallback_mode();
        if !self.guard.ensure_registered(self.epoch.load(Ordering::Acquire)) {
            return self.fall_back(io, n, mode, FallbackReason::ThreadUnregistered);
        }

        let Some(mut guard) = self.session.try_lock() else {
            return self.fall_back(io, n, mode, FallbackReason::Busy);
        };
        // Shutdown clears the flags before it takes the lock
        if !self.initialized.load(Ordering::Acquire) || !self.prepared.load(Ordering::Acquire) {
            return self.fall_back(io, n, FallbackMode::Passthrough, FallbackReason::NotPrepared);
        }
        let Some(session) = guard.as_mut() else {
            return self.fall_back(io, n, FallbackMode::Passthrough, FallbackReason::NotPrepared);
        };
        let Some(regions) = session.regions else {
            return self.fall_back(io, n, FallbackMode::Passthrough, FallbackReason::NotPrepared);
        };
        if n > regions.io.capacity {
            let reason = FallbackReason::InvalidBlockSize;
            return self.fall_back(io, n, FallbackMode::Passthrough, reason);
        }

        self.processing.store(true, Ordering::Relaxed);
        session.flush_pending(&self.pending);
        let result = session.run_block(&regions.io, io, n);
        self.processing.store(false, Ordering::Relaxed);
        drop(guard);

        match result {
            Ok(()) => {
                self.stats.record_processed();
                BlockOutcome::Processed
            }
            Err(()) => {
                self.stats.record_fault();
                self.fall_back(io, n, mode, FallbackReason::Fault)
            }
        }
    }

    fn fall_back(
        &self,
        io: &mut impl BlockIo,
        n: usize,
        mode: FallbackMode,
        reason: FallbackReason,
    ) -> BlockOutcome {
        match mode {
            FallbackMode::Passthrough => io.passthrough(n),
            FallbackMode::Silence => io.silence(n),
        }
        self.stats.record_fallback();
        BlockOutcome::Fallback { mode, reason }
    }

    /// Send a parameter value to the module.
    ///
    /// A no-op when uninitialized or when `param` belongs to the other
    /// variant. Never blocks: if the module is busy the value is kept and
    /// applied by the next call that gets the module, newest value winning.
    pub fn set_param(&self, param: Param, value: f32) {
        if !self.initialized.load(Ordering::Acquire) {
            return;
        }
        if param.variant() != self.config.variant {
            tracing::debug!("{:?} is not a {:?} parameter", param, self.config.variant);
            return;
        }
        if !self.guard.ensure_registered(self.epoch.load(Ordering::Acquire)) {
            return;
        }

        match self.session.try_lock() {
            Some(mut guard) => {
                if !self.initialized.load(Ordering::Acquire) {
                    return;
                }
                if let Some(session) = guard.as_mut() {
                    session.flush_pending(&self.pending);
                    session.apply_param(param, value);
                    session.module.drain_console();
                }
            }
            None => self.pending.park(param, value),
        }
    }

    /// Set the delay time in milliseconds
    pub fn set_delay_time(&self, ms: f32) {
        self.set_param(Param::DelayTime, ms);
    }

    /// Set the delay feedback
    pub fn set_feedback(&self, value: f32) {
        self.set_param(Param::Feedback, value);
    }

    /// Set the dry/wet mix
    pub fn set_mix(&self, value: f32) {
        self.set_param(Param::Mix, value);
    }

    /// Set the horizontal blend position
    pub fn set_blend_x(&self, value: f32) {
        self.set_param(Param::BlendX, value);
    }

    /// Set the vertical blend position
    pub fn set_blend_y(&self, value: f32) {
        self.set_param(Param::BlendY, value);
    }

    /// Set the playback speed multiplier
    pub fn set_playback_speed(&self, speed: f32) {
        self.set_param(Param::PlaybackSpeed, speed);
    }

    /// Set the grain length in samples
    pub fn set_grain_length(&self, samples: i32) {
        self.set_param(Param::GrainLength, samples as f32);
    }

    /// Set the grain density
    pub fn set_grain_density(&self, density: f32) {
        self.set_param(Param::GrainDensity, density);
    }

    /// Freeze or release the grain cloud
    pub fn set_freeze(&self, frozen: bool) {
        self.set_param(Param::Freeze, if frozen { 1.0 } else { 0.0 });
    }

    /// Copy mono PCM into a sampler slot and register it with the module.
    ///
    /// Data longer than the slot capacity is truncated. Returns the number of
    /// samples stored. Once prepared, the copy is made in chunks with a short
    /// pause between them while the module is unlocked, so a playing sampler
    /// keeps rendering while a long sample loads. It may hear the slot half
    /// overwritten until the load finishes.
    pub fn load_sample(&self, slot: usize, pcm: &[f32]) -> Result<usize, SampleError> {
        if !self.initialized.load(Ordering::Acquire) || !self.config.variant.has_sample_arena() {
            return Err(SampleError::NotInitialized);
        }
        let layout = self.config.layout;
        if slot >= layout.slot_count {
            return Err(SampleError::InvalidSlot {
                slot,
                count: layout.slot_count,
            });
        }
        let epoch = self.epoch.load(Ordering::Acquire);
        if !self.guard.ensure_registered(epoch) {
            return Err(SampleError::Unregistered);
        }

        let (region, len) = {
            let mut guard = self.session.lock();
            let session = self.live_session(&mut guard, epoch)?;
            let arena = session.sample_arena(&layout)?;
            let region = arena.slot(slot).ok_or(SampleError::InvalidSlot {
                slot,
                count: arena.slot_count,
            })?;
            (region, pcm.len().min(arena.max_samples_per_slot))
        };

        for (index, chunk) in pcm[..len].chunks(LOAD_CHUNK).enumerate() {
            if index > 0 && self.prepared.load(Ordering::Acquire) {
                std::thread::sleep(LOAD_PAUSE);
            }
            let target = Region::new(
                region.offset + index * LOAD_CHUNK * BYTES_PER_SAMPLE,
                chunk.len() * BYTES_PER_SAMPLE,
            );
            let mut guard = self.session.lock();
            let session = self.live_session(&mut guard, epoch)?;
            let memory = session.module.memory_mut().ok_or(SampleError::NotInitialized)?;
            if !memory::write_samples(memory, &target, chunk) {
                return Err(SampleError::MemoryTooSmall(target.end()));
            }
        }

        let mut guard = self.session.lock();
        let session = self.live_session(&mut guard, epoch)?;
        let result = session
            .module
            .call_load_sample(slot as i32, region.wasm_offset(), len as i32);
        session.module.drain_console();
        match result {
            Some(Ok(())) => {
                tracing::debug!("loaded {} samples into slot {}", len, slot);
                Ok(len)
            }
            Some(Err(e)) => Err(SampleError::Trap(format!("{:#}", e))),
            None => Err(SampleError::NotInitialized),
        }
    }

    /// The session, as long as it is still the module loaded at `epoch`.
    fn live_session<'a>(
        &self,
        session: &'a mut Option<Session>,
        epoch: u64,
    ) -> Result<&'a mut Session, SampleError> {
        let replaced = self.epoch.load(Ordering::Acquire) != epoch;
        if replaced || !self.initialized.load(Ordering::Acquire) {
            return Err(SampleError::NotInitialized);
        }
        session.as_mut().ok_or(SampleError::NotInitialized)
    }

    /// Forget the sample in `slot`.
    pub fn clear_slot(&self, slot: usize) {
        self.sampler_call("clear_slot", |module| module.call_clear_slot(slot as i32));
    }

    /// Start playback of all loaded slots.
    pub fn play_all(&self) {
        self.sampler_call("play_all", |module| module.call_play_all());
    }

    /// Stop playback of all slots.
    pub fn stop_all(&self) {
        self.sampler_call("stop_all", |module| module.call_stop_all());
    }

    /// Length in samples the module reports for `slot`; 0 when uninitialized.
    pub fn slot_length(&self, slot: usize) -> usize {
        self.sampler_call("get_slot_length", |module| module.call_get_slot_length(slot as i32))
            .map(|len| len.max(0) as usize)
            .unwrap_or(0)
    }

    fn sampler_call<T>(
        &self,
        name: &str,
        call: impl FnOnce(&mut ModuleStore) -> Option<wasmtime::Result<T>>,
    ) -> Option<T> {
        if !self.initialized.load(Ordering::Acquire) {
            return None;
        }
        if !self.guard.ensure_registered(self.epoch.load(Ordering::Acquire)) {
            return None;
        }
        let mut guard = self.session.lock();
        let session = guard.as_mut()?;
        let result = call(&mut session.module);
        session.module.drain_console();
        match result? {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("{} trapped: {:#}", name, e);
                None
            }
        }
    }

    /// Tear the module down. Safe to repeat and safe while another thread is
    /// inside [`DspBridge::process`].
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        self.initialized.store(false, Ordering::Release);
        self.prepared.store(false, Ordering::Release);
        self.capacity.store(0, Ordering::Release);

        let session = self.session.lock().take();
        if let Some(mut session) = session {
            session.module.drain_console();
            drop(session);
            tracing::info!("DSP module shut down");
        }
        self.pending.clear();
        self.shutting_down.store(false, Ordering::Release);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BridgeState {
        if self.shutting_down.load(Ordering::Acquire) {
            BridgeState::ShuttingDown
        } else if !self.initialized.load(Ordering::Acquire) {
            BridgeState::Uninitialized
        } else if self.processing.load(Ordering::Relaxed) {
            BridgeState::Processing
        } else if self.prepared.load(Ordering::Acquire) {
            BridgeState::Prepared
        } else {
            BridgeState::Initialized
        }
    }

    /// Whether a module is loaded and bound.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Whether buffers are laid out for processing.
    pub fn is_prepared(&self) -> bool {
        self.prepared.load(Ordering::Acquire)
    }

    /// Largest block `process` accepts; 0 when unprepared.
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// Current I/O regions, if prepared.
    pub fn regions(&self) -> Option<IoRegions> {
        let guard = self.session.lock();
        guard.as_ref()?.regions.map(|r| r.io)
    }

    /// Linear memory size of the loaded module in bytes; 0 when uninitialized.
    pub fn memory_size(&self) -> usize {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.module.memory_size())
            .unwrap_or(0)
    }

    /// Number of console lines the module has printed. Lines still waiting
    /// in the console are logged first.
    pub fn console_lines(&self) -> u64 {
        let mut guard = self.session.lock();
        match guard.as_mut() {
            Some(session) => {
                session.module.drain_console();
                session.module.console().lines_printed()
            }
            None => 0,
        }
    }

    /// Variant this bridge hosts.
    pub fn variant(&self) -> DspVariant {
        self.config.variant
    }

    /// The configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Block counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for DspBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_params_last_writer_wins() {
        let pending = PendingParams::new();
        assert_eq!(pending.take(Param::Mix), None);
        pending.park(Param::Mix, 0.25);
        pending.park(Param::Mix, 0.75);
        assert_eq!(pending.take(Param::Mix), Some(0.75));
        assert_eq!(pending.take(Param::Mix), None);

        pending.park(Param::Feedback, 0.5);
        pending.clear();
        assert_eq!(pending.take(Param::Feedback), None);
    }

    #[test]
    fn test_split_io_passthrough_and_silence() {
        let left_in = [1.0, 2.0, 3.0];
        let right_in = [4.0, 5.0, 6.0];
        let mut left_out = [0.0; 3];
        let mut right_out = [9.0; 3];
        let mut io = SplitIo {
            left_in: &left_in,
            right_in: &right_in,
            left_out: &mut left_out,
            right_out: &mut right_out,
        };
        io.passthrough(2);
        io.silence(1);
        assert_eq!(left_out, [0.0, 2.0, 0.0]);
        assert_eq!(right_out, [0.0, 5.0, 9.0]);
    }

    #[test]
    fn test_passthrough_clamps_to_shortest_buffer() {
        let left_in = [1.0, 2.0];
        let right_in = [3.0, 4.0, 5.0, 6.0];
        let mut left_out = [0.0; 4];
        let mut right_out = [0.0; 4];
        let mut io = SplitIo {
            left_in: &left_in,
            right_in: &right_in,
            left_out: &mut left_out,
            right_out: &mut right_out,
        };
        assert_eq!(io.len(), 2);
        io.passthrough(4);
        assert_eq!(left_out, [1.0, 2.0, 0.0, 0.0]);
        assert_eq!(right_out, [3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_uninitialized_bridge_passes_through() {
        let bridge = DspBridge::new(BridgeConfig::delay());
        assert_eq!(bridge.state(), BridgeState::Uninitialized);

        let input = [0.5f32; 16];
        let mut left = [0.0f32; 16];
        let mut right = [0.0f32; 16];
        let outcome = bridge.process(&input, &input, &mut left, &mut right, 16);
        assert_eq!(
            outcome,
            BlockOutcome::Fallback {
                mode: FallbackMode::Passthrough,
                reason: FallbackReason::NotPrepared
            }
        );
        assert_eq!(left, input);
        assert_eq!(right, input);
        assert_eq!(bridge.prepare(44_100.0, 512), Err(AllocError::NotInitialized));
        assert_eq!(bridge.slot_length(0), 0);
        assert_eq!(bridge.load_sample(0, &input), Err(SampleError::NotInitialized));
    }
}
