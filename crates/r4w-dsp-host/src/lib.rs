//! # R4W DSP Host
//!
//! Runs sandboxed DSP modules inside a real-time audio callback.
//!
//! A DSP module is a WebAssembly artifact that renders stereo audio blocks.
//! The host loads it, lays out scratch buffers in its linear memory, feeds it
//! one block per audio callback and tears it down again. A module that is not
//! ready, busy or faulting never produces an error on the audio thread: the
//! block is rendered by a fallback instead.
//!
//! ## Lifecycle
//!
//! | State | Entered by | `process` renders |
//! |-------|------------|-------------------|
//! | Uninitialized | `new`, `shutdown`, failed `initialize` | input copied through |
//! | Initialized | `initialize` | input copied through |
//! | Prepared | `prepare` | the module |
//! | ShuttingDown | `shutdown` | input copied through |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use r4w_dsp_host::{BridgeConfig, DspBridge};
//! use std::sync::Arc;
//!
//! let bridge = Arc::new(DspBridge::new(BridgeConfig::delay()));
//! bridge.initialize(&std::fs::read("delay.wasm")?)?;
//! bridge.prepare(48_000.0, 512)?;
//! bridge.set_delay_time(250.0);
//!
//! // On the audio thread
//! bridge.process(&left_in, &right_in, &mut left_out, &mut right_out, 512);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bridge;
pub mod error;
pub mod stats;
pub mod thread_guard;
pub mod wasm;

// Re-export main types
pub use bridge::{BlockOutcome, BridgeState, DspBridge, FallbackReason};
pub use error::{AllocError, BridgeError, InitError, Result, SampleError};
pub use stats::{LatencyStats, ProcessStats, StatsSnapshot};
pub use thread_guard::{ThreadEnv, ThreadGuard, WasmtimeThreadEnv};
pub use wasm::{BridgeConfig, DspVariant, FallbackMode, MemoryLayout, Param};
