//! Module lifecycle using wasmtime.
//!
//! A [`ModuleStore`] owns everything one loaded DSP module needs: the copied
//! artifact, the engine, the compiled module, the store (execution context)
//! and the instance with its resolved exports. Dropping it tears all of that
//! down in reverse order of construction.

use super::config::BridgeConfig;
use super::exports::{Bindings, DspVariant, Param, PROCESS_CONTEXT};
use super::host_functions::{Console, ConsoleHostFunctions};
use super::memory::{IoRegions, MEMORY_EXPORT, WASM_PAGE_SIZE};
use crate::error::InitError;

use wasmtime::*;

/// Host state for the store.
pub struct HostState {
    limits: StoreLimits,
    /// Console output of the module
    pub console: Console,
}

/// Owned copy of the bytecode artifact.
///
/// The caller's buffer is not guaranteed to outlive the module, so the store
/// keeps its own copy until teardown.
#[derive(Debug)]
pub struct Artifact {
    bytes: Vec<u8>,
}

impl Artifact {
    /// Copy `bytes`, reporting allocation failure instead of aborting.
    pub fn copy_from(bytes: &[u8]) -> Result<Self, InitError> {
        let mut owned = Vec::new();
        owned
            .try_reserve_exact(bytes.len())
            .map_err(|e| InitError::ArtifactCopy(format!("{} bytes: {}", bytes.len(), e)))?;
        owned.extend_from_slice(bytes);
        Ok(Self { bytes: owned })
    }

    /// The copied bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the artifact is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Build the engine for a bridge configuration.
///
/// Precompiled artifacts only load into an engine built from an identical
/// configuration.
pub fn build_engine(config: &BridgeConfig) -> Result<Engine, InitError> {
    let mut engine_config = Config::new();

    engine_config.cranelift_opt_level(match config.optimization_level {
        0 => OptLevel::None,
        1 => OptLevel::Speed,
        _ => OptLevel::SpeedAndSize,
    });

    // Relaxed SIMD cannot stay on without SIMD
    engine_config.wasm_relaxed_simd(config.enable_simd);
    engine_config.wasm_simd(config.enable_simd);

    engine_config.max_wasm_stack(config.stack_size);

    if let Some(ref cache_path) = config.cache_path {
        if let Err(e) = engine_config.cache_config_load(cache_path) {
            tracing::warn!("Failed to load cache config: {}", e);
        }
    }

    Engine::new(&engine_config).map_err(|e| InitError::RuntimeInit(e.to_string()))
}

/// A loaded, instantiated DSP module.
pub struct ModuleStore {
    // Field order is teardown order.
    bindings: Bindings,
    memory: Option<Memory>,
    #[allow(dead_code)]
    instance: Instance,
    store: Store<HostState>,
    #[allow(dead_code)]
    module: Module,
    #[allow(dead_code)]
    engine: Engine,
    artifact: Artifact,
}

impl ModuleStore {
    /// Copy, load, instantiate and bind a module.
    ///
    /// On any failure the resources built so far are dropped before the
    /// error is returned.
    pub fn load(config: &BridgeConfig, artifact: &[u8]) -> Result<Self, InitError> {
        let artifact = Artifact::copy_from(artifact)?;
        let engine = build_engine(config)?;
        let module = load_module(&engine, &artifact, config.allow_precompiled)?;

        let mut store = Store::new(
            &engine,
            HostState {
                limits: StoreLimitsBuilder::new()
                    .memory_size(config.memory_limit)
                    .instances(1)
                    .build(),
                console: Console::new(),
            },
        );
        store.limiter(|state| &mut state.limits);

        let mut linker: Linker<HostState> = Linker::new(&engine);
        ConsoleHostFunctions::register(&mut linker)?;

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| InitError::InstantiateFailed(format!("{:#}", e)))?;

        let memory = instance.get_memory(&mut store, MEMORY_EXPORT);
        let bindings = Bindings::resolve(&mut store, &instance, config.variant)?;

        tracing::debug!(
            "loaded {:?} module: {} bytes, {} exports bound, memory {} pages",
            config.variant,
            artifact.len(),
            config.variant.required_exports().len(),
            memory.map(|m| m.size(&store)).unwrap_or(0)
        );

        Ok(Self {
            bindings,
            memory,
            instance,
            store,
            module,
            engine,
            artifact,
        })
    }

    /// Variant the exports were bound for.
    pub fn variant(&self) -> DspVariant {
        self.bindings.variant()
    }

    /// The owned artifact copy.
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Current linear memory size in pages, `None` without a memory export.
    pub fn memory_pages(&self) -> Option<u64> {
        self.memory.map(|m| m.size(&self.store))
    }

    /// Current linear memory size in bytes (pages × page size).
    pub fn memory_size(&self) -> usize {
        self.memory_pages()
            .map(|pages| pages as usize * WASM_PAGE_SIZE)
            .unwrap_or(0)
    }

    /// The whole linear memory, `None` without a memory export.
    pub fn memory_mut(&mut self) -> Option<&mut [u8]> {
        let memory = self.memory?;
        Some(memory.data_mut(&mut self.store))
    }

    /// Console output of the module.
    pub fn console(&self) -> &Console {
        &self.store.data().console
    }

    /// Log console lines completed since the last drain. Control threads only.
    pub fn drain_console(&mut self) -> usize {
        self.store.data_mut().console.drain()
    }

    pub(crate) fn call_init(
        &mut self,
        sample_rate: f32,
        max_delay_ms: f32,
    ) -> wasmtime::Result<Option<i32>> {
        self.bindings.init.call(&mut self.store, sample_rate, max_delay_ms)
    }

    /// Returns `false` when the variant has no such parameter.
    pub(crate) fn call_param(&mut self, param: Param, value: f32) -> wasmtime::Result<bool> {
        match self.bindings.param(param) {
            Some(func) => func.call(&mut self.store, value).map(|_| true),
            None => Ok(false),
        }
    }

    pub(crate) fn call_process(&mut self, io: &IoRegions, len: usize) -> wasmtime::Result<i32> {
        self.bindings.process_block.call(
            &mut self.store,
            (
                PROCESS_CONTEXT,
                io.left_in.wasm_offset(),
                io.right_in.wasm_offset(),
                io.left_out.wasm_offset(),
                io.right_out.wasm_offset(),
                len as i32,
            ),
        )
    }

    pub(crate) fn call_load_sample(
        &mut self,
        slot: i32,
        offset: i32,
        len: i32,
    ) -> Option<wasmtime::Result<()>> {
        let funcs = self.bindings.sampler.as_ref()?;
        Some(funcs.load_sample.call(&mut self.store, (slot, offset, len)))
    }

    pub(crate) fn call_clear_slot(&mut self, slot: i32) -> Option<wasmtime::Result<()>> {
        let funcs = self.bindings.sampler.as_ref()?;
        Some(funcs.clear_slot.call(&mut self.store, slot))
    }

    pub(crate) fn call_play_all(&mut self) -> Option<wasmtime::Result<()>> {
        let funcs = self.bindings.sampler.as_ref()?;
        Some(funcs.play_all.call(&mut self.store, ()))
    }

    pub(crate) fn call_stop_all(&mut self) -> Option<wasmtime::Result<()>> {
        let funcs = self.bindings.sampler.as_ref()?;
        Some(funcs.stop_all.call(&mut self.store, ()))
    }

    pub(crate) fn call_get_slot_length(&mut self, slot: i32) -> Option<wasmtime::Result<i32>> {
        let funcs = self.bindings.sampler.as_ref()?;
        Some(funcs.get_slot_length.call(&mut self.store, slot))
    }
}

fn load_module(
    engine: &Engine,
    artifact: &Artifact,
    allow_precompiled: bool,
) -> Result<Module, InitError> {
    let bytes = artifact.as_bytes();
    if engine.detect_precompiled(bytes).is_some() {
        if !allow_precompiled {
            return Err(InitError::LoadFailed(
                "precompiled artifact rejected (allow_precompiled is off)".to_string(),
            ));
        }
        // SAFETY: precompiled artifacts are only accepted when the config
        // marks them as coming from a trusted build; wasmtime still checks
        // that they match this engine's version and settings.
        return unsafe { Module::deserialize(engine, bytes) }
            .map_err(|e| InitError::LoadFailed(format!("{:#}", e)));
    }
    Module::new(engine, bytes).map_err(|e| InitError::LoadFailed(format!("{:#}", e)))
}
