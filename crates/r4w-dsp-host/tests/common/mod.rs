//! Shared fixtures for the bridge integration tests.

#![allow(dead_code)]

use r4w_dsp_host::{BridgeConfig, DspBridge};

/// Stereo feedback delay (16 pages).
pub const DELAY_WAT: &str = include_str!("../fixtures/delay.wat");

/// Eight-slot sampler (720 pages).
pub const SAMPLER_WAT: &str = include_str!("../fixtures/sampler.wat");

/// Delay whose `process_block` always traps.
pub const TRAPPING_DELAY_WAT: &str = r#"
(module
  (memory (export "memory") 16)
  (func (export "init_delay") (param f32 f32) (result i32) (i32.const 0))
  (func (export "set_delay_time") (param f32))
  (func (export "set_feedback") (param f32))
  (func (export "set_mix") (param f32))
  (func (export "process_block") (param i32 i32 i32 i32 i32 i32) (result i32)
    unreachable))
"#;

/// Delay whose `init_delay` always traps.
pub const FAILING_INIT_WAT: &str = r#"
(module
  (memory (export "memory") 16)
  (func (export "init_delay") (param f32 f32) (result i32) unreachable)
  (func (export "set_delay_time") (param f32))
  (func (export "set_feedback") (param f32))
  (func (export "set_mix") (param f32))
  (func (export "process_block") (param i32 i32 i32 i32 i32 i32) (result i32) (i32.const 0)))
"#;

/// Delay with only one page of memory, too small for the I/O regions.
pub const TINY_DELAY_WAT: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "init_delay") (param f32 f32) (result i32) (i32.const 0))
  (func (export "set_delay_time") (param f32))
  (func (export "set_feedback") (param f32))
  (func (export "set_mix") (param f32))
  (func (export "process_block") (param i32 i32 i32 i32 i32 i32) (result i32) (i32.const 0)))
"#;

/// Sampler with the full export set but only 16 pages, too small for its arena.
pub const SMALL_SAMPLER_WAT: &str = r#"
(module
  (memory (export "memory") 16)
  (func (export "init_sampler") (param f32))
  (func (export "load_sample") (param i32 i32 i32))
  (func (export "clear_slot") (param i32))
  (func (export "play_all"))
  (func (export "stop_all"))
  (func (export "get_slot_length") (param i32) (result i32) (i32.const 0))
  (func (export "set_blend_x") (param f32))
  (func (export "set_blend_y") (param f32))
  (func (export "set_playback_speed") (param f32))
  (func (export "set_grain_length") (param i32))
  (func (export "set_grain_density") (param f32))
  (func (export "set_freeze") (param i32))
  (func (export "process_block") (param i32 i32 i32 i32 i32 i32) (result i32) (i32.const 0)))
"#;

/// Gain stage (`out = in * (1 - mix)`) whose `init_delay` spins for
/// `sample_rate * 20000` iterations, so a prepare at audio rates holds the
/// module for a long time.
pub const SLOW_INIT_WAT: &str = r#"
(module
  (memory (export "memory") 16)
  (global $mix (mut f32) (f32.const 0))
  (func (export "init_delay") (param $sr f32) (param f32) (result i32)
    (local $i i32)
    (local.set $i (i32.trunc_sat_f32_u (f32.mul (local.get $sr) (f32.const 20000))))
    (block $done
      (loop $spin
        (br_if $done (i32.eqz (local.get $i)))
        (local.set $i (i32.sub (local.get $i) (i32.const 1)))
        (br $spin)))
    (i32.const 0))
  (func (export "set_delay_time") (param f32))
  (func (export "set_feedback") (param f32))
  (func (export "set_mix") (param $v f32) (global.set $mix (local.get $v)))
  (func (export "process_block")
    (param $ctx i32) (param $li i32) (param $ri i32) (param $lo i32) (param $ro i32) (param $n i32)
    (result i32)
    (local $i i32)
    (local $at i32)
    (block $done
      (loop $next
        (br_if $done (i32.ge_s (local.get $i) (local.get $n)))
        (local.set $at (i32.shl (local.get $i) (i32.const 2)))
        (f32.store (i32.add (local.get $lo) (local.get $at))
          (f32.mul (f32.load (i32.add (local.get $li) (local.get $at)))
            (f32.sub (f32.const 1) (global.get $mix))))
        (f32.store (i32.add (local.get $ro) (local.get $at))
          (f32.mul (f32.load (i32.add (local.get $ri) (local.get $at)))
            (f32.sub (f32.const 1) (global.get $mix))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $next)))
    (i32.const 0)))
"#;

/// Delay that prints "x" on its console from every `process_block` and
/// leaves the output untouched.
pub const CHATTY_DELAY_WAT: &str = r#"
(module
  (import "spectest" "print_char" (func $print_char (param i32)))
  (memory (export "memory") 16)
  (func (export "init_delay") (param f32 f32) (result i32) (i32.const 0))
  (func (export "set_delay_time") (param f32))
  (func (export "set_feedback") (param f32))
  (func (export "set_mix") (param f32))
  (func (export "process_block") (param i32 i32 i32 i32 i32 i32) (result i32)
    (call $print_char (i32.const 120))
    (call $print_char (i32.const 10))
    (i32.const 0)))
"#;

/// Route bridge logs to the test harness. Set `RUST_LOG=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A delay bridge that is initialized and prepared.
pub fn prepared_delay(sample_rate: f64, max_block_size: usize) -> DspBridge {
    init_tracing();
    let bridge = DspBridge::new(BridgeConfig::delay());
    bridge
        .initialize(DELAY_WAT.as_bytes())
        .expect("delay fixture should initialize");
    bridge
        .prepare(sample_rate, max_block_size)
        .expect("delay fixture should prepare");
    bridge
}

/// A sampler bridge that is initialized and prepared.
pub fn prepared_sampler(sample_rate: f64, max_block_size: usize) -> DspBridge {
    init_tracing();
    let bridge = DspBridge::new(BridgeConfig::sampler());
    bridge
        .initialize(SAMPLER_WAT.as_bytes())
        .expect("sampler fixture should initialize");
    bridge
        .prepare(sample_rate, max_block_size)
        .expect("sampler fixture should prepare");
    bridge
}

/// Render one block, returning both output channels.
pub fn render(bridge: &DspBridge, left: &[f32], right: &[f32]) -> (Vec<f32>, Vec<f32>) {
    let mut left_out = vec![0.0; left.len()];
    let mut right_out = vec![0.0; right.len()];
    bridge.process(left, right, &mut left_out, &mut right_out, left.len());
    (left_out, right_out)
}
