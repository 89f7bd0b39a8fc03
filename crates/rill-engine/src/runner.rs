//! Graph-swapping runner.
//!
//! The [`Runner`] owns a driver thread that ticks the current [`Epoch`] and
//! emits one [`Frame`] per tick into a bounded channel. Host threads submit
//! graphs with [`Runner::set_graph`]; construction and `start` happen on the
//! caller's thread, so a bad graph is rejected before the driver ever sees
//! it and the old sound keeps playing.
//!
//! # Swaps
//!
//! ```text
//! host:    set_graph ─► build epoch ─► Adopt ──┐
//!                                              ▼
//! driver:  … tick(A) ─► adopt B ─► tick(B)+tick(A) mixed over C ticks ─► retire A
//! ```
//!
//! While a crossfade is running, further swaps wait in the command queue and
//! are adopted one by one once the fade completes.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, SendError, Sender, TrySendError, select};
use parking_lot::Mutex;
use rill_core::{BlockPool, CancelToken, GainControl, Graph};

use crate::config::RunnerConfig;
use crate::epoch::{Epoch, EpochEnv, Prior};
use crate::error::EngineError;
use crate::frame::{Frame, crossfade_into};
use crate::plan::Plan;
use crate::stats::{Counters, RunnerStats};

enum Command {
    Adopt(Epoch),
}

#[derive(Default)]
struct Host {
    graph: Option<Graph>,
    plan: Option<Arc<Plan>>,
    next_epoch: u64,
}

type Subscribers = Arc<Mutex<Vec<Sender<Arc<Frame>>>>>;

/// Runs graphs on a worker pool and streams their output.
pub struct Runner {
    config: RunnerConfig,
    env: EpochEnv,
    commands: Sender<Command>,
    host: Mutex<Host>,
    subscribers: Subscribers,
    gain: GainControl,
    driver: Option<JoinHandle<()>>,
}

impl Runner {
    /// Spawns the driver and returns the runner with its frame stream.
    ///
    /// No sound is produced until the first [`set_graph`](Self::set_graph).
    pub fn new(
        config: RunnerConfig,
        pool: Arc<BlockPool>,
    ) -> Result<(Self, Receiver<Frame>), EngineError> {
        config.validate()?;
        let env = EpochEnv::new(&config, pool, CancelToken::new());
        let (commands_tx, commands_rx) = crossbeam_channel::unbounded();
        let (frames_tx, frames_rx) = crossbeam_channel::bounded(config.channel_capacity);
        let subscribers: Subscribers = Arc::default();

        let driver = Driver {
            commands: commands_rx,
            output: frames_tx,
            cancel: env.cancel.clone(),
            pool: Arc::clone(&env.pool),
            counters: Arc::clone(&env.counters),
            subscribers: Arc::clone(&subscribers),
            block_size: config.block_size,
            crossfade_ticks: config.crossfade_ticks(),
            current: None,
            fade: None,
        };
        let handle = std::thread::Builder::new()
            .name("rill-driver".into())
            .spawn(move || driver.run())
            .map_err(EngineError::Spawn)?;

        tracing::info!(
            sample_rate = config.sample_rate,
            block_size = config.block_size,
            workers = config.workers,
            crossfade_ms = config.crossfade_ms,
            "runner started"
        );
        let runner = Self {
            gain: GainControl::new(config.gain),
            config,
            env,
            commands: commands_tx,
            host: Mutex::new(Host::default()),
            subscribers,
            driver: Some(handle),
        };
        Ok((runner, frames_rx))
    }

    /// Replaces the running graph.
    ///
    /// Builds and starts the new epoch on this thread, then hands it to the
    /// driver. Aligned nodes keep their UGen state. On error the current
    /// graph keeps playing.
    pub fn set_graph(&self, graph: Graph) -> Result<(), EngineError> {
        if self.env.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let mut host = self.host.lock();
        let id = host.next_epoch;
        host.next_epoch += 1;

        let prior = match (&host.graph, &host.plan) {
            (Some(graph), Some(plan)) => Some(Prior { graph, plan }),
            _ => None,
        };
        let epoch = match Epoch::build(id, &graph, prior, &self.env) {
            Ok(epoch) => epoch,
            Err(err) => {
                Counters::bump(&self.env.counters.failed_swaps);
                tracing::warn!(epoch = id, %err, "graph rejected, keeping current epoch");
                return Err(err.into());
            }
        };
        let plan = Arc::clone(epoch.plan());

        if let Err(SendError(Command::Adopt(mut epoch))) = self.commands.send(Command::Adopt(epoch))
        {
            epoch.retire();
            return Err(EngineError::Cancelled);
        }
        tracing::info!(
            epoch = id,
            nodes = plan.len(),
            pruned = plan.pruned().len(),
            "graph submitted"
        );
        host.graph = Some(graph);
        host.plan = Some(plan);
        Ok(())
    }

    /// Swaps in a graph of constant zeros on every configured channel.
    pub fn silence(&self) -> Result<(), EngineError> {
        self.set_graph(Graph::silence(self.config.channels))
    }

    /// Sets the output gain, clamped to `[0, 1]`.
    pub fn set_gain(&self, gain: f64) {
        self.gain.set(gain);
    }

    /// Handle the output stage reads the gain from.
    pub fn gain_control(&self) -> GainControl {
        self.gain.clone()
    }

    /// Registers a tap that receives every frame.
    ///
    /// A subscriber that falls `capacity` frames behind misses frames rather
    /// than stalling playback. Dropping the receiver unsubscribes.
    pub fn subscribe(&self, capacity: usize) -> Receiver<Arc<Frame>> {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        self.subscribers.lock().push(tx);
        rx
    }

    /// Counter snapshot.
    pub fn stats(&self) -> RunnerStats {
        self.env.counters.snapshot()
    }

    /// The configuration the runner was started with.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Token observed by the driver and every UGen.
    pub fn cancel_token(&self) -> CancelToken {
        self.env.cancel.clone()
    }

    /// Stops ticking. Pending and running epochs are retired by the driver.
    pub fn cancel(&self) {
        self.env.cancel.cancel();
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.env.cancel.is_cancelled()
    }

    /// Cancels and waits for the driver to retire every epoch.
    pub fn shutdown(mut self) {
        self.stop_driver();
    }

    fn stop_driver(&mut self) {
        self.env.cancel.cancel();
        if let Some(handle) = self.driver.take() {
            if handle.join().is_err() {
                tracing::error!("driver thread panicked");
            }
            tracing::info!(stats = ?self.env.counters.snapshot(), "runner stopped");
        }
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.stop_driver();
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("config", &self.config)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

struct Fade {
    old: Epoch,
    step: usize,
    steps: usize,
}

struct Driver {
    commands: Receiver<Command>,
    output: Sender<Frame>,
    cancel: CancelToken,
    pool: Arc<BlockPool>,
    counters: Arc<Counters>,
    subscribers: Subscribers,
    block_size: usize,
    crossfade_ticks: usize,
    current: Option<Epoch>,
    fade: Option<Fade>,
}

impl Driver {
    fn run(mut self) {
        while !self.cancel.is_cancelled() {
            if self.fade.is_none() && !self.poll() {
                break;
            }
            let frame = match self.tick() {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(err) => {
                    tracing::debug!(%err, "driver tick aborted");
                    break;
                }
            };
            self.publish(&frame);
            if !self.emit(frame) {
                break;
            }
        }
        self.teardown();
    }

    /// Adopts queued epochs; blocks while nothing is playing.
    fn poll(&mut self) -> bool {
        if self.current.is_none() {
            let command = select! {
                recv(self.commands) -> command => command.ok(),
                recv(self.cancel.signal()) -> _ => None,
            };
            match command {
                Some(command) => self.apply(command),
                None => return false,
            }
        }
        while self.fade.is_none() {
            match self.commands.try_recv() {
                Ok(command) => self.apply(command),
                Err(_) => break,
            }
        }
        true
    }

    fn apply(&mut self, command: Command) {
        let Command::Adopt(mut epoch) = command;
        epoch.adopt(self.current.as_ref());
        let id = epoch.id();
        match self.current.replace(epoch) {
            Some(mut old) if self.crossfade_ticks > 0 => {
                old.begin_drain();
                self.fade = Some(Fade {
                    old,
                    step: 0,
                    steps: self.crossfade_ticks,
                });
            }
            Some(mut old) => old.retire(),
            None => {}
        }
        Counters::bump(&self.counters.swaps);
        tracing::info!(epoch = id, crossfade = self.fade.is_some(), "epoch adopted");
    }

    fn tick(&mut self) -> Result<Option<Frame>, EngineError> {
        let Some(current) = self.current.as_mut() else {
            return Ok(None);
        };
        current.tick(&self.cancel)?;
        let mut frame = current.frame();

        if let Some(fade) = self.fade.as_mut() {
            fade.old.tick(&self.cancel)?;
            let old = fade.old.frame();
            let offset = fade.step * self.block_size;
            crossfade_into(&old, &mut frame, offset, fade.steps * self.block_size, &self.pool);
            old.recycle(&self.pool);
            fade.step += 1;
            if fade.step >= fade.steps
                && let Some(mut done) = self.fade.take()
            {
                done.old.retire();
                Counters::bump(&self.counters.crossfades);
                tracing::debug!(epoch = done.old.id(), "crossfade finished");
            }
        }
        Counters::bump(&self.counters.ticks);
        Ok(Some(frame))
    }

    fn publish(&self, frame: &Frame) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }
        let shared = Arc::new(frame.clone());
        subscribers.retain(|tx| match tx.try_send(Arc::clone(&shared)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                Counters::bump(&self.counters.dropped_frames);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    fn emit(&self, frame: Frame) -> bool {
        select! {
            send(self.output, frame) -> sent => {
                if sent.is_err() {
                    tracing::debug!("frame consumer disconnected");
                }
                sent.is_ok()
            },
            recv(self.cancel.signal()) -> _ => false,
        }
    }

    fn teardown(&mut self) {
        if let Some(mut fade) = self.fade.take() {
            fade.old.retire();
        }
        if let Some(mut current) = self.current.take() {
            current.retire();
        }
        for command in self.commands.try_iter() {
            let Command::Adopt(mut epoch) = command;
            epoch.retire();
        }
        tracing::debug!("driver stopped");
    }
}
