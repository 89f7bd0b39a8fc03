//! End-to-end runner scenarios: constant sinks, summing, feedback, swaps with
//! alignment, crossfades and UGen lifecycle across retirement.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use rill_core::ugens::{Oscillator, Shape};
use rill_core::{
    Arg, BlockPool, Context, Graph, GraphError, Inputs, SampleConfig, UGen, UGenError, constructor,
};
use rill_engine::{ConstructionError, EngineError, Frame, Runner, RunnerConfig};

const TIMEOUT: Duration = Duration::from_secs(10);

fn start(sample_rate: u32, block_size: usize, crossfade_ms: f64) -> (Runner, Receiver<Frame>) {
    let config = RunnerConfig {
        sample_rate,
        block_size,
        crossfade_ms,
        workers: 2,
        ..Default::default()
    };
    Runner::new(config, Arc::new(BlockPool::new())).unwrap()
}

fn next(frames: &Receiver<Frame>) -> Frame {
    frames.recv_timeout(TIMEOUT).expect("runner stopped producing frames")
}

fn constant_graph(value: f64, const_id: &str) -> Graph {
    Graph::builder()
        .constant(const_id, value)
        .out("out0", 0)
        .edge(const_id, "out0", "in")
        .build()
        .unwrap()
}

#[test]
fn constant_sink() {
    let (runner, frames) = start(48_000, 8, 0.0);
    runner.set_graph(constant_graph(0.5, "c")).unwrap();
    for _ in 0..5 {
        let frame = next(&frames);
        assert_eq!(frame.num_channels(), 1);
        assert_eq!(frame.channels()[0].as_slice(), &[0.5; 8]);
    }
    runner.shutdown();
}

#[test]
fn summed_constants() {
    let (runner, frames) = start(48_000, 16, 0.0);
    let graph = Graph::builder()
        .constant("c1", 0.25)
        .constant("c2", -0.10)
        .sum("s")
        .out("out0", 0)
        .edge("c1", "s", "$0")
        .edge("c2", "s", "$1")
        .edge("s", "out0", "in")
        .build()
        .unwrap();
    runner.set_graph(graph).unwrap();
    for _ in 0..4 {
        let frame = next(&frames);
        assert!(frame.channels()[0].iter().all(|&s| (s - 0.15).abs() < 1e-12));
    }
}

#[test]
fn feedback_bootstrapping() {
    let (runner, frames) = start(48_000, 8, 0.0);
    let graph = Graph::builder()
        .constant("c", 1.0)
        .sum("s")
        .out("out0", 0)
        .edge("c", "s", "$0")
        .edge("s", "s", "$1")
        .edge("s", "out0", "in")
        .build()
        .unwrap();
    runner.set_graph(graph).unwrap();
    for k in 1..=20 {
        let frame = next(&frames);
        assert_eq!(frame.channels()[0].as_slice(), &[f64::from(k); 8], "block {k}");
    }
}

#[test]
fn sinks_are_ordered_by_channel() {
    let (runner, frames) = start(48_000, 8, 0.0);
    let graph = Graph::builder()
        .constant("hi", 0.75)
        .constant("lo", -0.75)
        .out("right", 1)
        .out("left", 0)
        .edge("hi", "right", "in")
        .edge("lo", "left", "in")
        .build()
        .unwrap();
    runner.set_graph(graph).unwrap();
    let frame = next(&frames);
    assert_eq!(frame.num_channels(), 2);
    assert_eq!(frame.channels()[0][0], -0.75);
    assert_eq!(frame.channels()[1][0], 0.75);
}

#[test]
fn lone_right_sink_plays_on_channel_one() {
    let (runner, frames) = start(48_000, 8, 0.0);
    let graph = Graph::builder()
        .constant("c", 0.5)
        .out("right", 1)
        .edge("c", "right", "in")
        .build()
        .unwrap();
    runner.set_graph(graph).unwrap();
    for _ in 0..3 {
        let frame = next(&frames);
        assert_eq!(frame.num_channels(), 2);
        assert_eq!(frame.channel(0).unwrap().as_slice(), &[0.0; 8]);
        assert_eq!(frame.channel(1).unwrap().as_slice(), &[0.5; 8]);
    }
}

#[test]
fn crossfade_pairs_channels_by_index() {
    // stereo {1.0, 0.5} fades to a right-only -1.0 over ten ticks
    let (runner, frames) = start(1000, 8, 80.0);
    let stereo = Graph::builder()
        .constant("l", 1.0)
        .constant("r", 0.5)
        .out("out0", 0)
        .out("out1", 1)
        .edge("l", "out0", "in")
        .edge("r", "out1", "in")
        .build()
        .unwrap();
    let right_only = Graph::builder()
        .constant("m", -1.0)
        .out("side", 1)
        .edge("m", "side", "in")
        .build()
        .unwrap();

    runner.set_graph(stereo).unwrap();
    for _ in 0..3 {
        let frame = next(&frames);
        assert_eq!(frame.channels()[0][0], 1.0);
        assert_eq!(frame.channels()[1][0], 0.5);
    }
    runner.set_graph(right_only).unwrap();

    let mut frame = next(&frames);
    while frame.channels()[1].iter().all(|&s| s == 0.5) {
        frame = next(&frames);
    }
    for step in 0..10 {
        assert_eq!(frame.num_channels(), 2);
        for j in 0..8 {
            let t = (step * 8 + j) as f64 / 80.0;
            let left = frame.channels()[0][j];
            let right = frame.channels()[1][j];
            assert!((left - (1.0 - t)).abs() < 1e-12, "step {step} left {left}");
            assert!(
                (right - (0.5 * (1.0 - t) - t)).abs() < 1e-12,
                "step {step} right {right}"
            );
        }
        frame = next(&frames);
    }
    assert_eq!(frame.channels()[0].as_slice(), &[0.0; 8]);
    assert_eq!(frame.channels()[1].as_slice(), &[-1.0; 8]);
}

fn sine_graph(osc: &str, out: &str) -> Graph {
    Graph::builder()
        .sine(osc, 440.0)
        .out(out, 0)
        .edge(osc, out, "in")
        .build()
        .unwrap()
}

/// Blocks a standalone 440 Hz sine produces, for comparison.
fn reference_sine(blocks: usize, sample_rate: u32, block_size: usize) -> Vec<Vec<f64>> {
    let mut osc = Oscillator::from_args(Shape::Sine, &[Arg::Number(440.0)]).unwrap();
    let ctx = Context::default();
    let cfg = SampleConfig::new(sample_rate, Inputs::new());
    (0..blocks)
        .map(|_| {
            let mut block = vec![0.0; block_size];
            osc.generate(&ctx, &cfg, &mut block);
            block
        })
        .collect()
}

#[test]
fn swap_with_alignment_keeps_phase() {
    const SR: u32 = 48_000;
    const B: usize = 128;
    let (runner, frames) = start(SR, B, 100.0);
    let crossfade = runner.config().crossfade_ticks();
    let capacity = runner.config().channel_capacity;
    let after_swap = capacity + 2 + crossfade + 10;
    let reference = reference_sine(100 + after_swap, SR, B);

    runner.set_graph(sine_graph("osc", "out0")).unwrap();
    for expected in &reference[..100] {
        assert_eq!(next(&frames).channels()[0].as_slice(), expected.as_slice());
    }

    runner.set_graph(sine_graph("osc-2", "out0-2")).unwrap();
    for (k, expected) in reference[100..].iter().enumerate() {
        let frame = next(&frames);
        let got = frame.channels()[0].as_slice();
        if k >= after_swap - 10 {
            assert_eq!(got, expected.as_slice(), "block {k} after swap");
        } else {
            for (a, b) in got.iter().zip(expected) {
                assert!((a - b).abs() < 1e-9, "block {k} after swap: {a} vs {b}");
            }
        }
    }
    let stats = runner.stats();
    assert_eq!(stats.swaps, 2);
    assert_eq!(stats.crossfades, 1);
}

#[test]
fn crossfade_is_linear() {
    // 80 ms at 1 kHz in blocks of 8: ten ticks, 80 samples.
    let (runner, frames) = start(1000, 8, 80.0);
    assert_eq!(runner.config().crossfade_ticks(), 10);
    let total = 80.0;

    runner.set_graph(constant_graph(1.0, "plus")).unwrap();
    for _ in 0..3 {
        assert!(next(&frames).channels()[0].iter().all(|&s| s == 1.0));
    }
    runner.set_graph(constant_graph(-1.0, "minus")).unwrap();

    let mut frame = next(&frames);
    while frame.channels()[0].iter().all(|&s| s == 1.0) {
        frame = next(&frames);
    }
    for step in 0..10 {
        for (j, &sample) in frame.channels()[0].iter().enumerate() {
            let t = (step * 8 + j) as f64 / total;
            let expected = 1.0 * (1.0 - t) + (-1.0) * t;
            assert!(
                (sample - expected).abs() < 1e-12,
                "step {step} sample {j}: {sample} vs {expected}"
            );
        }
        frame = next(&frames);
    }
    for _ in 0..3 {
        assert!(frame.channels()[0].iter().all(|&s| s == -1.0));
        frame = next(&frames);
    }
}

#[derive(Default)]
struct Counts {
    starts: AtomicU32,
    stops: AtomicU32,
    gens: AtomicU32,
}

struct CountingSine {
    osc: Oscillator,
    counts: Arc<Counts>,
}

impl UGen for CountingSine {
    fn start(&mut self, _ctx: &Context) -> Result<(), UGenError> {
        self.counts.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn generate(&mut self, ctx: &Context, cfg: &SampleConfig<'_>, out: &mut [f64]) {
        self.counts.gens.fetch_add(1, Ordering::SeqCst);
        self.osc.generate(ctx, cfg, out);
    }

    fn stop(&mut self, _ctx: &Context) {
        self.counts.stops.fetch_add(1, Ordering::SeqCst);
    }
}

fn counted_sine_graph(osc: &str, counts: &Arc<Counts>) -> Graph {
    let counts = Arc::clone(counts);
    Graph::builder()
        .ugen(
            osc,
            "sine",
            constructor(move |args| {
                Ok(Box::new(CountingSine {
                    osc: Oscillator::from_args(Shape::Sine, args)?,
                    counts: Arc::clone(&counts),
                }))
            }),
            vec![Arg::Number(440.0)],
        )
        .out("out0", 0)
        .edge(osc, "out0", "in")
        .build()
        .unwrap()
}

#[test]
fn retained_ugen_lifecycle() {
    let (runner, frames) = start(48_000, 64, 20.0);
    let first = Arc::new(Counts::default());
    let second = Arc::new(Counts::default());

    runner.set_graph(counted_sine_graph("sine-a", &first)).unwrap();
    for _ in 0..100 {
        next(&frames);
    }
    runner.set_graph(counted_sine_graph("sine-b", &second)).unwrap();
    let crossfade = runner.config().crossfade_ticks();
    for _ in 0..(crossfade + 20) {
        next(&frames);
    }
    assert_eq!(runner.stats().crossfades, 1);
    assert_eq!(first.starts.load(Ordering::SeqCst), 1);
    assert_eq!(first.stops.load(Ordering::SeqCst), 0);
    assert_eq!(second.starts.load(Ordering::SeqCst), 0);

    // let the driver block on the full channel so no tick is in flight
    thread::sleep(Duration::from_millis(50));
    let ticks = runner.stats().ticks;
    runner.shutdown();

    assert_eq!(first.stops.load(Ordering::SeqCst), 1);
    assert_eq!(u64::from(first.gens.load(Ordering::SeqCst)), ticks);
    assert_eq!(second.gens.load(Ordering::SeqCst), 0);
    assert_eq!(second.stops.load(Ordering::SeqCst), 0);
}

struct Refuses;

impl UGen for Refuses {
    fn start(&mut self, _ctx: &Context) -> Result<(), UGenError> {
        Err(UGenError::Start("no device".into()))
    }

    fn generate(&mut self, _ctx: &Context, _cfg: &SampleConfig<'_>, out: &mut [f64]) {
        out.fill(1.0);
    }
}

#[test]
fn failed_swap_keeps_playing() {
    let (runner, frames) = start(48_000, 8, 0.0);
    runner.set_graph(constant_graph(0.5, "c")).unwrap();
    next(&frames);

    let broken = Graph::builder()
        .ugen("r", "refuses", constructor(|_| Ok(Box::new(Refuses))), vec![])
        .out("out0", 0)
        .edge("r", "out0", "in")
        .build()
        .unwrap();
    let err = runner.set_graph(broken).unwrap_err();
    assert!(matches!(
        err,
        EngineError::EpochConstructionFailed(ConstructionError::UGenStartFailed { .. })
    ));

    let invalid = Graph::builder().constant("c", 1.0).build_unchecked();
    let err = runner.set_graph(invalid).unwrap_err();
    assert!(matches!(
        err,
        EngineError::EpochConstructionFailed(ConstructionError::Graph(GraphError::MissingSink))
    ));

    for _ in 0..10 {
        assert_eq!(next(&frames).channels()[0].as_slice(), &[0.5; 8]);
    }
    let stats = runner.stats();
    assert_eq!(stats.failed_swaps, 2);
    assert_eq!(stats.swaps, 1);
}

#[test]
fn silence_fills_configured_channels() {
    let (runner, frames) = start(48_000, 32, 0.0);
    runner.silence().unwrap();
    let frame = next(&frames);
    assert_eq!(frame.num_channels(), runner.config().channels);
    assert!(frame.channels().iter().flat_map(|b| b.iter()).all(|&s| s == 0.0));
}

#[test]
fn subscribers_see_frames_and_slow_ones_drop() {
    let (runner, frames) = start(48_000, 8, 0.0);
    let fast = runner.subscribe(1024);
    let slow = runner.subscribe(1);
    runner.set_graph(constant_graph(0.25, "c")).unwrap();

    for _ in 0..20 {
        let frame = next(&frames);
        let tapped = fast.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(*tapped, frame);
    }
    assert!(runner.stats().dropped_frames > 0);
    assert_eq!(slow.len(), 1);

    drop(fast);
    drop(slow);
    next(&frames);
    next(&frames);
}

#[test]
fn cancelled_runner_rejects_graphs() {
    let (runner, frames) = start(48_000, 8, 0.0);
    runner.set_graph(constant_graph(0.5, "c")).unwrap();
    next(&frames);
    runner.cancel();
    assert!(runner.is_cancelled());
    assert!(matches!(
        runner.set_graph(constant_graph(0.5, "c")),
        Err(EngineError::Cancelled)
    ));
    runner.shutdown();
    // the driver dropped its sender; only already-queued frames remain
    while frames.recv_timeout(Duration::from_millis(100)).is_ok() {}
    assert!(frames.recv_timeout(Duration::from_millis(100)).is_err());
}

/// Sleeps in every block and records calls made after cancellation.
struct Sluggish {
    late: Arc<AtomicU32>,
}

impl UGen for Sluggish {
    fn generate(&mut self, ctx: &Context, _cfg: &SampleConfig<'_>, out: &mut [f64]) {
        if ctx.is_cancelled() {
            self.late.fetch_add(1, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_millis(2));
        out.fill(0.0);
    }
}

#[test]
fn cancel_stops_workers_within_two_blocks() {
    // 64 samples at 1 kHz: one block lasts 64 ms; one tick takes about 40 ms
    let config = RunnerConfig {
        sample_rate: 1000,
        block_size: 64,
        workers: 1,
        crossfade_ms: 0.0,
        ..Default::default()
    };
    let block = config.block_duration();
    let (runner, frames) = Runner::new(config, Arc::new(BlockPool::new())).unwrap();

    let late = Arc::new(AtomicU32::new(0));
    let mut builder = Graph::builder();
    for i in 0..20 {
        let late = Arc::clone(&late);
        builder = builder.ugen(
            format!("n{i}").as_str(),
            "sluggish",
            constructor(move |_| {
                Ok(Box::new(Sluggish {
                    late: Arc::clone(&late),
                }))
            }),
            vec![],
        );
        if i > 0 {
            builder = builder.edge(format!("n{}", i - 1).as_str(), format!("n{i}").as_str(), "$0");
        }
    }
    let graph = builder.out("out0", 0).edge("n19", "out0", "in").build().unwrap();
    runner.set_graph(graph).unwrap();

    next(&frames);
    // land in the middle of the next tick
    thread::sleep(Duration::from_millis(15));
    let started = Instant::now();
    runner.cancel();
    runner.shutdown();
    let elapsed = started.elapsed();

    assert!(elapsed < block * 2, "shutdown took {elapsed:?}");
    assert_eq!(late.load(Ordering::SeqCst), 0);
}

#[test]
fn invalid_config_is_rejected() {
    let config = RunnerConfig {
        block_size: 100,
        ..Default::default()
    };
    assert!(matches!(
        Runner::new(config, Arc::new(BlockPool::new())),
        Err(EngineError::InvalidConfig(_))
    ));
}
