//! Runner → output stage → device, end to end.

use std::sync::Arc;
use std::thread;

use hound::WavReader;
use rill_core::{BlockPool, Graph};
use rill_engine::{Runner, RunnerConfig};
use rill_io::{MemoryDevice, OutputConfig, OutputStage, SampleFormat, Step, WavDevice};
use tempfile::tempdir;

fn stereo_constants(left: f64, right: f64) -> Graph {
    Graph::builder()
        .constant("l", left)
        .constant("r", right)
        .out("out_l", 0)
        .out("out_r", 1)
        .edge("l", "out_l", "in")
        .edge("r", "out_r", "in")
        .build()
        .unwrap()
}

fn runner(block_size: usize) -> (Runner, crossbeam_channel::Receiver<rill_engine::Frame>, Arc<BlockPool>) {
    let pool = Arc::new(BlockPool::new());
    let config = RunnerConfig {
        sample_rate: 8000,
        block_size,
        workers: 1,
        crossfade_ms: 0.0,
        gain: 1.0,
        ..Default::default()
    };
    let (runner, frames) = Runner::new(config, Arc::clone(&pool)).unwrap();
    (runner, frames, pool)
}

#[test]
fn runner_frames_reach_memory_device() {
    let (runner, frames, pool) = runner(16);
    runner.set_graph(stereo_constants(0.5, -0.25)).unwrap();

    let device = MemoryDevice::new();
    let capture = device.capture();
    let config = OutputConfig {
        sample_rate: 8000,
        block_size: 16,
        silence_on_timeout: false,
        ..Default::default()
    };
    let mut stage = OutputStage::new(
        config,
        Box::new(device),
        frames,
        runner.gain_control(),
        runner.cancel_token(),
    )
    .with_pool(pool);

    for _ in 0..8 {
        assert_eq!(stage.step().unwrap(), Step::Played);
    }
    runner.shutdown();
    let stats = stage.run().unwrap();
    assert!(stats.blocks >= 8);
    assert_eq!(stats.underruns, 0);

    let left = capture.channel(0);
    let right = capture.channel(1);
    assert_eq!(&left[..128], &[0.5f32; 128][..]);
    assert_eq!(&right[..128], &[-0.25f32; 128][..]);
}

#[test]
fn render_to_wav() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("render.wav");

    let (runner, frames, _pool) = runner(32);
    runner.set_gain(0.5);
    runner.set_graph(stereo_constants(1.0, 1.0)).unwrap();

    let config = OutputConfig {
        sample_rate: 8000,
        block_size: 32,
        format: SampleFormat::S16,
        silence_on_timeout: false,
        ..Default::default()
    };
    let mut stage = OutputStage::new(
        config,
        Box::new(WavDevice::new(&path)),
        frames,
        runner.gain_control(),
        runner.cancel_token(),
    );
    for _ in 0..10 {
        stage.step().unwrap();
    }
    stage.close().unwrap();
    runner.shutdown();

    let reader = WavReader::open(&path).unwrap();
    assert_eq!(reader.spec().sample_rate, 8000);
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.duration(), 320);
    let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
    assert!(samples.iter().all(|&s| s == 16384));
}

#[test]
fn cancelling_runner_stops_stage() {
    let (runner, frames, _pool) = runner(64);
    runner.set_graph(stereo_constants(0.1, 0.1)).unwrap();
    let mut stage = OutputStage::new(
        OutputConfig {
            sample_rate: 8000,
            block_size: 64,
            ..Default::default()
        },
        Box::new(MemoryDevice::realtime()),
        frames,
        runner.gain_control(),
        runner.cancel_token(),
    );
    let handle = thread::spawn(move || stage.run());
    thread::sleep(std::time::Duration::from_millis(50));
    runner.shutdown();
    let stats = handle.join().unwrap().unwrap();
    assert!(stats.blocks > 0);
}
