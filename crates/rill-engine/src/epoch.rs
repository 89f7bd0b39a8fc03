//! One running instance of a graph: UGens, blocks and a worker pool.
//!
//! An [`Epoch`] owns everything needed to compute ticks for a single
//! [`Plan`]. Ticks are driven from one thread (the runner's driver) and fan
//! out over a private pool of workers:
//!
//! ```text
//!  driver                    workers (W threads)
//!  ──────                    ───────────────────
//!  remaining = N
//!  push roots ──► jobs ──►   pop slot
//!                            read inputs, generate, zero non-finite
//!                            for each successor:
//!                                pending -= 1; == 0 → push
//!                            pending = limit
//!  wait done  ◄── done ◄──   remaining -= 1; == 0 → signal
//!  roll bootstrap blocks
//! ```
//!
//! # States
//!
//! `Built` (UGens started, workers parked) → `Running` (adopted by the
//! driver) → `Draining` (fading out after a swap) → `Stopped`. Retained UGens
//! move to the successor epoch at adoption; the old slot becomes a mirror
//! that copies the successor's block so a crossfade never advances a UGen
//! twice in one tick.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, select};
use parking_lot::{Mutex, RwLock};
use rill_core::{
    Block, BlockPool, CancelToken, Context, Graph, Inputs, NodeId, SampleConfig, UGen, align,
};

use crate::config::RunnerConfig;
use crate::error::{ConstructionError, EngineError};
use crate::frame::Frame;
use crate::plan::{Plan, PlannedInput};
use crate::stats::Counters;

/// Lifecycle of an [`Epoch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochState {
    /// Constructed and started; not yet ticking.
    Built,
    /// The driver's current epoch.
    Running,
    /// Fading out behind a newer epoch.
    Draining,
    /// Workers joined, UGens stopped.
    Stopped,
}

/// Resources shared by every epoch a runner builds.
#[derive(Debug, Clone)]
pub struct EpochEnv {
    /// Sample rate handed to every `generate`.
    pub sample_rate: u32,
    /// Samples per tick.
    pub block_size: usize,
    /// Worker threads per epoch before capping.
    pub workers: usize,
    /// Block recycler.
    pub pool: Arc<BlockPool>,
    /// Runner-wide cancellation.
    pub cancel: CancelToken,
    /// Runner-wide counters.
    pub counters: Arc<Counters>,
}

impl EpochEnv {
    /// Derives an environment from a runner configuration.
    pub fn new(config: &RunnerConfig, pool: Arc<BlockPool>, cancel: CancelToken) -> Self {
        Self {
            sample_rate: config.sample_rate,
            block_size: config.block_size,
            workers: config.workers,
            pool,
            cancel,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Workers to spawn for an epoch of `nodes` scheduled nodes.
    pub fn workers_for(&self, nodes: usize) -> usize {
        self.workers.min(nodes).max(1)
    }
}

/// The graph and plan an epoch is being built to replace.
#[derive(Debug, Clone, Copy)]
pub struct Prior<'a> {
    /// Graph of the epoch being replaced.
    pub graph: &'a Graph,
    /// Its schedule.
    pub plan: &'a Plan,
}

enum Generator {
    Owned(Box<dyn UGen>),
    Mirror { source: Arc<Shared>, slot: usize },
    Vacant,
}

struct Slot {
    id: NodeId,
    kind: String,
    generator: Mutex<Generator>,
    output: RwLock<Block>,
    previous: Option<RwLock<Block>>,
    inputs: Vec<PlannedInput>,
    successors: Vec<usize>,
    pending: AtomicUsize,
    activation_limit: usize,
    warned: AtomicBool,
}

struct Shared {
    id: u64,
    sample_rate: u32,
    ctx: Context,
    slots: Vec<Slot>,
    jobs: Sender<usize>,
    done: Sender<()>,
    remaining: AtomicUsize,
    halted: AtomicBool,
    counters: Arc<Counters>,
}

fn copy_block(dst: &mut [f64], src: &[f64]) {
    if dst.len() == src.len() {
        dst.copy_from_slice(src);
    } else {
        dst.fill(0.0);
    }
}

impl Shared {
    fn stopping(&self) -> bool {
        self.halted.load(Ordering::Acquire) || self.ctx.is_cancelled()
    }

    /// Runs one node and releases its successors.
    ///
    /// After cancel no further `generate` starts and nothing is released;
    /// the tick is abandoned.
    fn execute(&self, index: usize) {
        if self.stopping() {
            return;
        }
        let slot = &self.slots[index];
        self.render(slot);
        if self.stopping() {
            return;
        }

        for &next in &slot.successors {
            let before = self.slots[next].pending.fetch_sub(1, Ordering::AcqRel);
            assert!(before > 0, "activation underflow at node '{}'", self.slots[next].id);
            if before == 1 {
                // receivers outlive every job while the epoch ticks
                let _ = self.jobs.send(next);
            }
        }
        slot.pending.store(slot.activation_limit, Ordering::Release);

        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _ = self.done.send(());
        }
    }

    fn render(&self, slot: &Slot) {
        let guards: Vec<_> = slot
            .inputs
            .iter()
            .map(|input| {
                let source = &self.slots[input.source];
                match (&source.previous, input.delayed) {
                    (Some(previous), true) => previous.read(),
                    _ => source.output.read(),
                }
            })
            .collect();
        let inputs: Inputs<'_> = slot
            .inputs
            .iter()
            .zip(&guards)
            .map(|(input, block)| (input.port.as_str(), block.as_slice()))
            .collect();
        let cfg = SampleConfig::new(self.sample_rate, inputs);

        let mut out = slot.output.write();
        let mut generator = slot.generator.lock();
        match &mut *generator {
            Generator::Owned(_) if self.ctx.is_cancelled() => out.fill(0.0),
            Generator::Owned(ugen) => {
                out.fill(0.0);
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    ugen.generate(&self.ctx, &cfg, out.as_mut_slice());
                }));
                if result.is_err() {
                    out.fill(0.0);
                    Counters::bump(&self.counters.gen_panics);
                    let err = EngineError::GenPanicked {
                        node: slot.id.clone(),
                    };
                    tracing::error!(epoch = self.id, kind = %slot.kind, %err, "emitting silence");
                }
            }
            Generator::Mirror { source, slot: index } => {
                copy_block(&mut out, &source.slots[*index].output.read());
            }
            Generator::Vacant => out.fill(0.0),
        }
        drop(generator);

        let mut zapped = false;
        for sample in out.iter_mut() {
            if !sample.is_finite() {
                *sample = 0.0;
                zapped = true;
            }
        }
        if zapped {
            Counters::bump(&self.counters.non_finite_blocks);
            if !slot.warned.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    epoch = self.id,
                    node = %slot.id,
                    kind = %slot.kind,
                    "non-finite samples replaced with zero"
                );
            }
        }
    }
}

fn worker_loop(shared: Arc<Shared>, jobs: Receiver<usize>, shutdown: Receiver<()>) {
    loop {
        select! {
            recv(jobs) -> job => match job {
                Ok(index) => shared.execute(index),
                Err(_) => return,
            },
            recv(shutdown) -> _ => return,
        }
    }
}

/// A started graph instance with its own worker pool.
pub struct Epoch {
    shared: Arc<Shared>,
    plan: Arc<Plan>,
    roots: Vec<usize>,
    inherited: Vec<(usize, usize)>,
    done: Receiver<()>,
    shutdown: Option<Sender<()>>,
    workers: Vec<JoinHandle<()>>,
    state: EpochState,
    pool: Arc<BlockPool>,
    block_size: usize,
}

impl Epoch {
    /// Plans `graph`, constructs and starts its UGens and spawns workers.
    ///
    /// Non-sink nodes aligned with a scheduled node of `prior` are marked for
    /// retention: they are neither constructed nor started here, and receive
    /// the old instance when the epoch is [adopted](Self::adopt). An old node
    /// is claimed at most once; later claimants get a fresh instance.
    ///
    /// On error nothing is stopped; UGens started before the failure are
    /// simply dropped.
    pub fn build(
        id: u64,
        graph: &Graph,
        prior: Option<Prior<'_>>,
        env: &EpochEnv,
    ) -> Result<Self, ConstructionError> {
        let plan = Plan::new(graph)?;

        let mut inherit: Vec<Option<usize>> = vec![None; plan.len()];
        if let Some(prior) = prior {
            let alignment = align(prior.graph, graph);
            let mut claimed = HashSet::new();
            // sinks are stateless and always rebuilt
            for node in graph.nodes().iter().filter(|node| !node.is_sink()) {
                if let Some(slot) = plan.slot_of(node.id())
                    && let Some(old_id) = alignment.get(node.id())
                    && let Some(old_slot) = prior.plan.slot_of(old_id)
                    && claimed.insert(old_slot)
                {
                    inherit[slot] = Some(old_slot);
                }
            }
        }

        let mut fresh: Vec<Option<Box<dyn UGen>>> = Vec::with_capacity(plan.len());
        for (planned, inherited) in plan.nodes().iter().zip(&inherit) {
            if inherited.is_some() {
                fresh.push(None);
                continue;
            }
            let node = &graph.nodes()[planned.graph_index];
            let ugen = node
                .instantiate()
                .map_err(|source| ConstructionError::Construct {
                    node: planned.id.clone(),
                    source,
                })?;
            fresh.push(Some(ugen));
        }

        let ctx = Context::new(env.cancel.clone());
        for (planned, ugen) in plan.nodes().iter().zip(fresh.iter_mut()) {
            if let Some(ugen) = ugen {
                ugen.start(&ctx)
                    .map_err(|source| ConstructionError::UGenStartFailed {
                        node: planned.id.clone(),
                        source,
                    })?;
            }
        }

        let mut slots = Vec::with_capacity(plan.len());
        for (planned, ugen) in plan.nodes().iter().zip(fresh) {
            let previous = if planned.keeps_previous {
                Some(RwLock::new(env.pool.get(env.block_size)?))
            } else {
                None
            };
            slots.push(Slot {
                id: planned.id.clone(),
                kind: graph.nodes()[planned.graph_index].kind().to_string(),
                generator: Mutex::new(ugen.map_or(Generator::Vacant, Generator::Owned)),
                output: RwLock::new(env.pool.get(env.block_size)?),
                previous,
                inputs: planned.inputs.clone(),
                successors: planned.successors.clone(),
                pending: AtomicUsize::new(planned.activation_limit),
                activation_limit: planned.activation_limit,
                warned: AtomicBool::new(false),
            });
        }

        let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded();
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let shared = Arc::new(Shared {
            id,
            sample_rate: env.sample_rate,
            ctx,
            slots,
            jobs: jobs_tx,
            done: done_tx,
            remaining: AtomicUsize::new(0),
            halted: AtomicBool::new(false),
            counters: Arc::clone(&env.counters),
        });

        let inherited = inherit
            .iter()
            .enumerate()
            .filter_map(|(slot, old)| old.map(|old| (slot, old)))
            .collect();
        let mut epoch = Self {
            shared,
            roots: plan.roots().collect(),
            plan: Arc::new(plan),
            inherited,
            done: done_rx,
            shutdown: Some(shutdown_tx),
            workers: Vec::new(),
            state: EpochState::Built,
            pool: Arc::clone(&env.pool),
            block_size: env.block_size,
        };

        let count = env.workers_for(epoch.plan.len());
        for w in 0..count {
            let shared = Arc::clone(&epoch.shared);
            let jobs = jobs_rx.clone();
            let shutdown = shutdown_rx.clone();
            let handle = thread::Builder::new()
                .name(format!("rill-e{id}-w{w}"))
                .spawn(move || worker_loop(shared, jobs, shutdown))
                .map_err(ConstructionError::WorkerSpawn)?;
            epoch.workers.push(handle);
        }

        tracing::debug!(
            epoch = id,
            nodes = epoch.plan.len(),
            retained = epoch.inherited.len(),
            workers = count,
            "epoch built"
        );
        Ok(epoch)
    }

    /// Takes over retained UGens from `previous` and marks the epoch running.
    ///
    /// Each retained slot's last output seeds both the new output block and,
    /// for bootstrap producers, the previous-tick block, so feedback carries
    /// across the swap. The old slot is left mirroring the new one.
    pub fn adopt(&mut self, previous: Option<&Epoch>) {
        for &(slot, old_slot) in &self.inherited {
            let target = &self.shared.slots[slot];
            let Some(old) = previous.and_then(|p| p.shared.slots.get(old_slot)) else {
                tracing::warn!(node = %target.id, "no predecessor to retain from");
                continue;
            };
            let taken = std::mem::replace(
                &mut *old.generator.lock(),
                Generator::Mirror {
                    source: Arc::clone(&self.shared),
                    slot,
                },
            );
            let last = old.output.read();
            copy_block(&mut target.output.write(), &last);
            if let Some(prev) = &target.previous {
                copy_block(&mut prev.write(), &last);
            }
            match taken {
                Generator::Owned(ugen) => *target.generator.lock() = Generator::Owned(ugen),
                _ => tracing::warn!(node = %target.id, "retained node had no live ugen"),
            }
        }
        self.inherited.clear();
        self.state = EpochState::Running;
    }

    /// Computes one tick on the worker pool.
    ///
    /// Returns [`EngineError::Cancelled`] if `cancel` fires first or the
    /// epoch has been stopped.
    pub fn tick(&mut self, cancel: &CancelToken) -> Result<(), EngineError> {
        if self.state == EpochState::Stopped || cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let shared = &self.shared;
        shared.remaining.store(shared.slots.len(), Ordering::Release);
        for &root in &self.roots {
            shared
                .jobs
                .send(root)
                .map_err(|_| EngineError::Cancelled)?;
        }
        select! {
            recv(self.done) -> done => done.map_err(|_| EngineError::Cancelled)?,
            recv(cancel.signal()) -> _ => return Err(EngineError::Cancelled),
        }

        for slot in &shared.slots {
            if let Some(previous) = &slot.previous {
                copy_block(&mut previous.write(), &slot.output.read());
            }
        }
        Ok(())
    }

    /// Copies the sink blocks of the last tick into a [`Frame`].
    ///
    /// Each sink lands at its own channel index; channels without a sink
    /// stay zero.
    pub fn frame(&self) -> Frame {
        let mut channels: Vec<Block> = (0..self.plan.channel_count())
            .map(|_| {
                self.pool
                    .get(self.block_size)
                    .unwrap_or_else(|_| Block::zeroed(self.block_size))
            })
            .collect();
        for &sink in self.plan.sinks() {
            if let Some(channel) = self.plan.nodes()[sink].sink
                && let Some(block) = channels.get_mut(channel)
            {
                copy_block(block, &self.shared.slots[sink].output.read());
            }
        }
        Frame::new(channels)
    }

    /// Marks the epoch as fading out.
    pub fn begin_drain(&mut self) {
        if self.state != EpochState::Stopped {
            self.state = EpochState::Draining;
        }
    }

    /// Joins the workers, stops every UGen still owned and recycles blocks.
    ///
    /// Idempotent. UGens handed to a successor are not stopped here.
    pub fn retire(&mut self) {
        if self.state == EpochState::Stopped {
            return;
        }
        self.shared.halted.store(true, Ordering::Release);
        self.shutdown.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!(epoch = self.shared.id, "worker thread panicked");
            }
        }

        let ctx = &self.shared.ctx;
        let mut blocks = Vec::with_capacity(self.shared.slots.len());
        for slot in &self.shared.slots {
            let generator = std::mem::replace(&mut *slot.generator.lock(), Generator::Vacant);
            if let Generator::Owned(mut ugen) = generator {
                let stopped = panic::catch_unwind(AssertUnwindSafe(|| ugen.stop(ctx)));
                if stopped.is_err() {
                    tracing::error!(node = %slot.id, "ugen panicked during stop");
                }
            }
            blocks.push(std::mem::take(&mut *slot.output.write()));
            if let Some(previous) = &slot.previous {
                blocks.push(std::mem::take(&mut *previous.write()));
            }
        }
        self.pool.put_all(blocks);

        Counters::bump(&self.shared.counters.epochs_retired);
        self.state = EpochState::Stopped;
        tracing::debug!(epoch = self.shared.id, "epoch retired");
    }

    /// Epoch id assigned by the runner.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EpochState {
        self.state
    }

    /// The schedule this epoch runs.
    pub fn plan(&self) -> &Arc<Plan> {
        &self.plan
    }

    /// Number of worker threads alive.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Copy of the last block produced by `id`, if it is scheduled.
    pub fn output_of(&self, id: &NodeId) -> Option<Vec<f64>> {
        let slot = self.plan.slot_of(id)?;
        Some(self.shared.slots[slot].output.read().to_vec())
    }
}

impl Drop for Epoch {
    fn drop(&mut self) {
        self.retire();
    }
}

impl std::fmt::Debug for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Epoch")
            .field("id", &self.shared.id)
            .field("state", &self.state)
            .field("nodes", &self.plan.len())
            .field("workers", &self.workers.len())
            .finish()
    }
}
