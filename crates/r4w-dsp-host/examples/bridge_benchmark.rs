//! DSP Bridge Benchmarks
//!
//! Run with: cargo run -p r4w-dsp-host --example bridge_benchmark --release
//!
//! Set `RUST_LOG=debug` to see bridge and module logs.

use r4w_dsp_host::{BridgeConfig, DspBridge, LatencyStats};
use std::time::Instant;

const DELAY_WAT: &str = include_str!("../tests/fixtures/delay.wat");
const SAMPLER_WAT: &str = include_str!("../tests/fixtures/sampler.wat");

const SAMPLE_RATE: f64 = 48_000.0;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== DSP Bridge Benchmarks ===\n");

    bench_initialize();
    bench_block_sizes();
    bench_param_changes();
    bench_sampler_playback();
    bench_native_comparison();

    println!("\n=== Benchmark Complete ===");
}

fn bench_initialize() {
    println!("## Initialize + Prepare");

    let bridge = DspBridge::new(BridgeConfig::delay());
    let mut stats = LatencyStats::new();
    for _ in 0..20 {
        let start = Instant::now();
        bridge.initialize(DELAY_WAT.as_bytes()).unwrap();
        bridge.prepare(SAMPLE_RATE, 512).unwrap();
        stats.record(start.elapsed().as_micros() as u64);
    }
    println!("  initialize+prepare: {}", stats.summary());
    println!();
}

fn bench_block_sizes() {
    println!("## process() by Block Size");

    let bridge = DspBridge::new(BridgeConfig::delay());
    bridge.initialize(DELAY_WAT.as_bytes()).unwrap();
    bridge.prepare(SAMPLE_RATE, 2048).unwrap();
    bridge.set_delay_time(250.0);
    bridge.set_feedback(0.4);
    bridge.set_mix(0.5);

    for &block in &[64usize, 128, 256, 512, 1024, 2048] {
        let input: Vec<f32> = (0..block)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / SAMPLE_RATE as f32).sin())
            .collect();
        let mut left = vec![0.0f32; block];
        let mut right = vec![0.0f32; block];

        // Warm up
        for _ in 0..50 {
            bridge.process(&input, &input, &mut left, &mut right, block);
        }

        let mut stats = LatencyStats::new();
        for _ in 0..2_000 {
            let start = Instant::now();
            bridge.process(&input, &input, &mut left, &mut right, block);
            stats.record(start.elapsed().as_micros() as u64);
        }
        println!(
            "  {:>5} samples: {}  load={:.1}%",
            block,
            stats.summary(),
            stats.realtime_load(block, SAMPLE_RATE) * 100.0
        );
    }

    let counters = bridge.stats();
    println!(
        "  blocks: {} processed, {} fallback",
        counters.processed_blocks, counters.fallback_blocks
    );
    println!();
}

fn bench_param_changes() {
    println!("## Parameter Setters");

    let bridge = DspBridge::new(BridgeConfig::delay());
    bridge.initialize(DELAY_WAT.as_bytes()).unwrap();
    bridge.prepare(SAMPLE_RATE, 512).unwrap();

    let mut stats = LatencyStats::new();
    for i in 0..10_000 {
        let start = Instant::now();
        bridge.set_delay_time((i % 500) as f32);
        stats.record(start.elapsed().as_micros() as u64);
    }
    println!("  set_delay_time: {}", stats.summary());
    println!();
}

fn bench_sampler_playback() {
    println!("## Sampler");

    let bridge = DspBridge::new(BridgeConfig::sampler());
    bridge.initialize(SAMPLER_WAT.as_bytes()).unwrap();
    bridge.prepare(SAMPLE_RATE, 512).unwrap();

    let pcm: Vec<f32> = (0..SAMPLE_RATE as usize * 10)
        .map(|i| (i as f32 * 0.01).sin())
        .collect();
    let mut stats = LatencyStats::new();
    for slot in 0..bridge.config().layout.slot_count {
        let start = Instant::now();
        bridge.load_sample(slot, &pcm).unwrap();
        stats.record(start.elapsed().as_micros() as u64);
    }
    println!("  load_sample (10 s): {}", stats.summary());

    bridge.play_all();
    let silence = vec![0.0f32; 512];
    let mut left = vec![0.0f32; 512];
    let mut right = vec![0.0f32; 512];
    let mut stats = LatencyStats::new();
    for _ in 0..2_000 {
        let start = Instant::now();
        bridge.process(&silence, &silence, &mut left, &mut right, 512);
        stats.record(start.elapsed().as_micros() as u64);
    }
    println!("  process (8 slots, 512): {}", stats.summary());
    println!();
}

fn bench_native_comparison() {
    println!("## Native Comparison");

    let block = 512;
    let input: Vec<f32> = (0..block).map(|i| (i as f32 * 0.01).sin()).collect();
    let mut output = vec![0.0f32; block];
    let mix = 0.5f32;

    let mut stats = LatencyStats::new();
    for _ in 0..2_000 {
        let start = Instant::now();
        for (out, &x) in output.iter_mut().zip(&input) {
            *out = x * (1.0 - mix);
        }
        std::hint::black_box(&output);
        stats.record(start.elapsed().as_micros() as u64);
    }
    println!("  native gain (512): {}", stats.summary());
}
