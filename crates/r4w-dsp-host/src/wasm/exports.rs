//! Export binding for the two supported DSP module variants.
//!
//! Each variant has a fixed list of exports that are looked up by name once,
//! right after instantiation, and cached as typed handles for the lifetime of
//! the instance. Resolution is all-or-nothing.
//!
//! ## Call Convention
//!
//! ```wat
//! (func (export "process_block")
//!   (param $ctx i32) (param $left_in i32) (param $right_in i32)
//!   (param $left_out i32) (param $right_out i32) (param $len i32)
//!   (result i32))
//! ```
//! - `$ctx` is reserved and always 0
//! - Buffer arguments are byte offsets into linear memory
//! - `$len` is a sample count

use serde::{Deserialize, Serialize};
use wasmtime::{Func, Instance, Store, TypedFunc, Val, ValType, WasmParams, WasmResults};

use super::config::FallbackMode;
use super::runtime::HostState;
use crate::error::InitError;

/// Export invoked once per audio block.
pub const PROCESS_BLOCK: &str = "process_block";

/// Reserved first argument of `process_block`.
pub const PROCESS_CONTEXT: i32 = 0;

const LOAD_SAMPLE: &str = "load_sample";
const CLEAR_SLOT: &str = "clear_slot";
const PLAY_ALL: &str = "play_all";
const STOP_ALL: &str = "stop_all";
const GET_SLOT_LENGTH: &str = "get_slot_length";

const SAMPLER_EXPORTS: [&str; 5] = [LOAD_SAMPLE, CLEAR_SLOT, PLAY_ALL, STOP_ALL, GET_SLOT_LENGTH];

/// The kind of DSP module a bridge hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DspVariant {
    /// Stereo delay effect
    Delay,
    /// Multi-slot granular sampler
    Sampler,
}

impl DspVariant {
    /// Name of the per-sample-rate init export.
    pub fn init_export(&self) -> &'static str {
        match self {
            DspVariant::Delay => "init_delay",
            DspVariant::Sampler => "init_sampler",
        }
    }

    /// Number of f32 arguments the init export takes.
    fn init_arity(&self) -> usize {
        match self {
            DspVariant::Delay => 2,
            DspVariant::Sampler => 1,
        }
    }

    /// Parameters this variant exposes.
    pub fn params(&self) -> &'static [Param] {
        match self {
            DspVariant::Delay => &[Param::DelayTime, Param::Feedback, Param::Mix],
            DspVariant::Sampler => &[
                Param::BlendX,
                Param::BlendY,
                Param::PlaybackSpeed,
                Param::GrainLength,
                Param::GrainDensity,
                Param::Freeze,
            ],
        }
    }

    /// Whether the variant needs the sample arena.
    pub fn has_sample_arena(&self) -> bool {
        matches!(self, DspVariant::Sampler)
    }

    /// What a faulted block renders.
    ///
    /// A sampler generates its output, so echoing the input is not meaningful.
    pub fn default_fallback(&self) -> FallbackMode {
        match self {
            DspVariant::Delay => FallbackMode::Passthrough,
            DspVariant::Sampler => FallbackMode::Silence,
        }
    }

    /// Every export the variant requires, in lookup order.
    pub fn required_exports(&self) -> Vec<&'static str> {
        let mut names = vec![self.init_export()];
        if self.has_sample_arena() {
            names.extend(SAMPLER_EXPORTS);
        }
        names.extend(self.params().iter().map(|p| p.export_name()));
        names.push(PROCESS_BLOCK);
        names
    }
}

/// Scalar type of a parameter export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Takes an f32
    Float,
    /// Takes an i32; host values are truncated
    Int,
}

/// A named parameter setter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Param {
    /// Delay time in milliseconds
    DelayTime,
    /// Delay feedback, 0..1
    Feedback,
    /// Dry/wet mix, 0..1
    Mix,
    /// Horizontal blend position
    BlendX,
    /// Vertical blend position
    BlendY,
    /// Playback speed multiplier
    PlaybackSpeed,
    /// Grain length in samples
    GrainLength,
    /// Grains per second
    GrainDensity,
    /// Freeze toggle (0 or 1)
    Freeze,
}

impl Param {
    /// Number of parameters across all variants.
    pub const COUNT: usize = 9;

    /// Every parameter.
    pub const ALL: [Param; Param::COUNT] = [
        Param::DelayTime,
        Param::Feedback,
        Param::Mix,
        Param::BlendX,
        Param::BlendY,
        Param::PlaybackSpeed,
        Param::GrainLength,
        Param::GrainDensity,
        Param::Freeze,
    ];

    /// Dense index for per-parameter tables.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Export name of the setter.
    pub fn export_name(self) -> &'static str {
        match self {
            Param::DelayTime => "set_delay_time",
            Param::Feedback => "set_feedback",
            Param::Mix => "set_mix",
            Param::BlendX => "set_blend_x",
            Param::BlendY => "set_blend_y",
            Param::PlaybackSpeed => "set_playback_speed",
            Param::GrainLength => "set_grain_length",
            Param::GrainDensity => "set_grain_density",
            Param::Freeze => "set_freeze",
        }
    }

    /// Scalar type the export takes.
    pub fn kind(self) -> ParamKind {
        match self {
            Param::GrainLength | Param::Freeze => ParamKind::Int,
            _ => ParamKind::Float,
        }
    }

    /// Variant the parameter belongs to.
    pub fn variant(self) -> DspVariant {
        match self {
            Param::DelayTime | Param::Feedback | Param::Mix => DspVariant::Delay,
            _ => DspVariant::Sampler,
        }
    }
}

type ProcessFn = TypedFunc<(i32, i32, i32, i32, i32, i32), i32>;

/// A resolved parameter setter.
#[derive(Clone)]
pub(crate) enum ParamFunc {
    Float(TypedFunc<f32, ()>),
    Int(TypedFunc<i32, ()>),
}

impl ParamFunc {
    pub(crate) fn call(&self, store: &mut Store<HostState>, value: f32) -> wasmtime::Result<()> {
        match self {
            ParamFunc::Float(func) => func.call(store, value),
            ParamFunc::Int(func) => func.call(store, value as i32),
        }
    }
}

/// The init export, kept untyped because variants differ in arity and result.
#[derive(Clone)]
pub(crate) struct InitFunc {
    func: Func,
    arity: usize,
    results: usize,
}

impl InitFunc {
    /// Returns the module's status code when the export has one.
    pub(crate) fn call(
        &self,
        store: &mut Store<HostState>,
        sample_rate: f32,
        max_delay_ms: f32,
    ) -> wasmtime::Result<Option<i32>> {
        let args = [Val::F32(sample_rate.to_bits()), Val::F32(max_delay_ms.to_bits())];
        let mut results = vec![Val::I32(0); self.results];
        self.func.call(store, &args[..self.arity], &mut results)?;
        Ok(results.first().and_then(Val::i32))
    }
}

/// Sampler-only exports.
#[derive(Clone)]
pub(crate) struct SamplerFuncs {
    pub(crate) load_sample: TypedFunc<(i32, i32, i32), ()>,
    pub(crate) clear_slot: TypedFunc<i32, ()>,
    pub(crate) play_all: TypedFunc<(), ()>,
    pub(crate) stop_all: TypedFunc<(), ()>,
    pub(crate) get_slot_length: TypedFunc<i32, i32>,
}

/// Exports resolved for one instance.
///
/// The handles are only meaningful together with the store they came from;
/// the bridge never keeps them past teardown.
#[derive(Clone)]
pub struct Bindings {
    variant: DspVariant,
    pub(crate) init: InitFunc,
    pub(crate) process_block: ProcessFn,
    pub(crate) params: [Option<ParamFunc>; Param::COUNT],
    pub(crate) sampler: Option<SamplerFuncs>,
}

impl Bindings {
    /// Resolve every export `variant` requires.
    ///
    /// A missing name is reported before any signature problem so the error
    /// names the first absent export in lookup order.
    pub fn resolve(
        store: &mut Store<HostState>,
        instance: &Instance,
        variant: DspVariant,
    ) -> Result<Self, InitError> {
        for name in variant.required_exports() {
            if instance.get_func(&mut *store, name).is_none() {
                return Err(InitError::MissingExport(name.to_string()));
            }
        }

        let init = resolve_init(store, instance, variant)?;
        let process_block =
            typed::<(i32, i32, i32, i32, i32, i32), i32>(store, instance, PROCESS_BLOCK)?;

        let mut params: [Option<ParamFunc>; Param::COUNT] = Default::default();
        for &param in variant.params() {
            let name = param.export_name();
            params[param.index()] = Some(match param.kind() {
                ParamKind::Float => ParamFunc::Float(typed::<f32, ()>(store, instance, name)?),
                ParamKind::Int => ParamFunc::Int(typed::<i32, ()>(store, instance, name)?),
            });
        }

        let sampler = if variant.has_sample_arena() {
            Some(SamplerFuncs {
                load_sample: typed(store, instance, LOAD_SAMPLE)?,
                clear_slot: typed(store, instance, CLEAR_SLOT)?,
                play_all: typed(store, instance, PLAY_ALL)?,
                stop_all: typed(store, instance, STOP_ALL)?,
                get_slot_length: typed(store, instance, GET_SLOT_LENGTH)?,
            })
        } else {
            None
        };

        Ok(Self {
            variant,
            init,
            process_block,
            params,
            sampler,
        })
    }

    /// Variant these bindings were resolved for.
    pub fn variant(&self) -> DspVariant {
        self.variant
    }

    pub(crate) fn param(&self, param: Param) -> Option<&ParamFunc> {
        self.params[param.index()].as_ref()
    }
}

fn lookup(
    store: &mut Store<HostState>,
    instance: &Instance,
    name: &str,
) -> Result<Func, InitError> {
    instance
        .get_func(&mut *store, name)
        .ok_or_else(|| InitError::MissingExport(name.to_string()))
}

fn typed<P, R>(
    store: &mut Store<HostState>,
    instance: &Instance,
    name: &str,
) -> Result<TypedFunc<P, R>, InitError>
where
    P: WasmParams,
    R: WasmResults,
{
    lookup(store, instance, name)?
        .typed::<P, R>(&*store)
        .map_err(|e| InitError::SignatureMismatch {
            name: name.to_string(),
            reason: e.to_string(),
        })
}

fn resolve_init(
    store: &mut Store<HostState>,
    instance: &Instance,
    variant: DspVariant,
) -> Result<InitFunc, InitError> {
    let name = variant.init_export();
    let func = lookup(store, instance, name)?;
    let ty = func.ty(&*store);
    let mismatch = |reason: String| InitError::SignatureMismatch {
        name: name.to_string(),
        reason,
    };

    let params: Vec<ValType> = ty.params().collect();
    if params.len() != variant.init_arity() || !params.iter().all(|p| matches!(p, ValType::F32)) {
        return Err(mismatch(format!(
            "expected {} f32 parameter(s), found {:?}",
            variant.init_arity(),
            params
        )));
    }
    let results = ty.results().len();
    if results > 1 {
        return Err(mismatch(format!("expected at most one result, found {}", results)));
    }

    Ok(InitFunc {
        func,
        arity: variant.init_arity(),
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_indices_are_dense() {
        for (i, param) in Param::ALL.iter().enumerate() {
            assert_eq!(param.index(), i);
        }
    }

    #[test]
    fn test_delay_required_exports() {
        assert_eq!(
            DspVariant::Delay.required_exports(),
            vec!["init_delay", "set_delay_time", "set_feedback", "set_mix", "process_block"]
        );
    }

    #[test]
    fn test_sampler_required_exports() {
        let names = DspVariant::Sampler.required_exports();
        assert_eq!(names.first(), Some(&"init_sampler"));
        assert_eq!(names.last(), Some(&PROCESS_BLOCK));
        for name in SAMPLER_EXPORTS {
            assert!(names.contains(&name), "missing {}", name);
        }
        assert!(names.contains(&"set_freeze"));
        assert_eq!(names.len(), 1 + 5 + 6 + 1);
    }

    #[test]
    fn test_params_belong_to_their_variant() {
        for variant in [DspVariant::Delay, DspVariant::Sampler] {
            for param in variant.params() {
                assert_eq!(param.variant(), variant);
            }
        }
        assert_eq!(Param::Freeze.kind(), ParamKind::Int);
        assert_eq!(Param::Mix.kind(), ParamKind::Float);
    }
}
