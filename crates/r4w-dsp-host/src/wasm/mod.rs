//! WebAssembly side of the DSP host.
//!
//! DSP modules are compiled to WebAssembly and run under wasmtime. Each
//! module runs in its own linear memory; the host only touches that memory
//! through the regions laid out in [`memory`].
//!
//! ## Module Contract
//!
//! | Export | Signature | Variant |
//! |--------|-----------|---------|
//! | `memory` | linear memory | both |
//! | `init_delay` | `(f32 sample_rate, f32 max_delay_ms) -> i32` | delay |
//! | `init_sampler` | `(f32 sample_rate)` | sampler |
//! | `process_block` | `(i32 ctx, i32 li, i32 ri, i32 lo, i32 ro, i32 n) -> i32` | both |
//! | `set_*` | `(f32)` or `(i32)` | per parameter |
//! | `load_sample` | `(i32 slot, i32 offset, i32 len)` | sampler |
//!
//! Modules may import `spectest.print_char(i32)` for console output.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use r4w_dsp_host::wasm::{BridgeConfig, ModuleStore};
//!
//! let store = ModuleStore::load(&BridgeConfig::delay(), &std::fs::read("delay.wasm")?)?;
//! println!("{} pages", store.memory_pages().unwrap_or(0));
//! ```

mod config;
mod exports;
mod host_functions;
pub mod memory;
mod runtime;

pub use config::{BridgeConfig, FallbackMode};
pub use exports::{Bindings, DspVariant, Param, ParamKind, PROCESS_BLOCK, PROCESS_CONTEXT};
pub use host_functions::{Console, ConsoleHostFunctions, CONSOLE_MODULE};
pub use memory::{IoRegions, MemoryLayout, Region, SampleArena};
pub use runtime::{build_engine, Artifact, HostState, ModuleStore};
