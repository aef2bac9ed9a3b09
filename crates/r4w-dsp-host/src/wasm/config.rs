//! Configuration for the DSP bridge.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::exports::DspVariant;
use super::memory::MemoryLayout;
use crate::error::{BridgeError, Result};

/// What a block renders when the module cannot process it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    /// Copy input to output unchanged
    Passthrough,
    /// Write zeros
    Silence,
}

/// Configuration for the DSP bridge runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Which export set the module provides
    pub variant: DspVariant,

    /// Scratch-region offsets agreed with the module
    pub layout: MemoryLayout,

    /// Maximum linear memory in bytes for the instance
    pub memory_limit: usize,

    /// Maximum native stack the module may use, in bytes
    pub stack_size: usize,

    /// Cranelift optimization level (0-2)
    pub optimization_level: u8,

    /// Enable SIMD support
    pub enable_simd: bool,

    /// Override the variant's fault fallback
    pub fallback: Option<FallbackMode>,

    /// Longest delay the delay module must provision, passed to its init export
    pub max_delay_ms: f32,

    /// Accept artifacts precompiled by wasmtime (`.cwasm`).
    ///
    /// Precompiled code is loaded without validation, so only enable this for
    /// artifacts produced by a trusted build.
    pub allow_precompiled: bool,

    /// Cache compiled modules to disk
    pub cache_path: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            variant: DspVariant::Delay,
            layout: MemoryLayout::V1,
            memory_limit: 128 * 1024 * 1024, // 128 MB
            stack_size: 256 * 1024,          // 256 KB
            optimization_level: 2,
            enable_simd: true,
            fallback: None,
            max_delay_ms: 2000.0,
            allow_precompiled: false,
            cache_path: None,
        }
    }
}

impl BridgeConfig {
    /// Config for a delay module
    pub fn delay() -> Self {
        Self::default()
    }

    /// Config for a sampler module
    pub fn sampler() -> Self {
        Self {
            variant: DspVariant::Sampler,
            ..Default::default()
        }
    }

    /// Parse a config from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| BridgeError::ConfigError(e.to_string()))
    }

    /// Fallback used for faulted blocks.
    pub fn fallback_mode(&self) -> FallbackMode {
        self.fallback.unwrap_or_else(|| self.variant.default_fallback())
    }

    /// Builder: set variant
    pub fn variant(mut self, variant: DspVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Builder: set memory layout
    pub fn layout(mut self, layout: MemoryLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Builder: set memory limit
    pub fn memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    /// Builder: set stack size
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    /// Builder: set optimization level
    pub fn optimize(mut self, level: u8) -> Self {
        self.optimization_level = level.min(2);
        self
    }

    /// Builder: enable SIMD
    pub fn simd(mut self, enable: bool) -> Self {
        self.enable_simd = enable;
        self
    }

    /// Builder: override the fault fallback
    pub fn fallback(mut self, mode: FallbackMode) -> Self {
        self.fallback = Some(mode);
        self
    }

    /// Builder: set the longest provisioned delay
    pub fn max_delay_ms(mut self, ms: f32) -> Self {
        self.max_delay_ms = ms;
        self
    }

    /// Builder: accept precompiled artifacts
    pub fn allow_precompiled(mut self, allow: bool) -> Self {
        self.allow_precompiled = allow;
        self
    }

    /// Builder: set cache path
    pub fn cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }
}
