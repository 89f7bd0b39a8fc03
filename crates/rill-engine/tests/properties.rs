//! Property-based tests for rill-engine.
//!
//! Random graphs of constants and sums, with arbitrary feedback, must produce
//! exactly what a single-threaded evaluation in dependency order produces.
//! Crossfaded samples must stay between their endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;
use rill_core::{Block, BlockPool, CancelToken, Graph};
use rill_engine::{Epoch, EpochEnv, Frame, Plan, RunnerConfig, crossfade_into};

#[derive(Debug, Clone)]
struct Shape {
    constants: Vec<f64>,
    sums: usize,
    outs: usize,
    /// Sources for each sum, then each out; indices into constants ++ sums.
    wiring: Vec<Vec<usize>>,
}

fn shapes() -> impl Strategy<Value = Shape> {
    (1usize..3, 0usize..5, 1usize..3).prop_flat_map(|(c, s, o)| {
        (
            prop::collection::vec(-1.0f64..1.0, c),
            prop::collection::vec(prop::collection::vec(0..c + s, 0..3), s + o),
        )
            .prop_map(move |(constants, wiring)| Shape {
                constants,
                sums: s,
                outs: o,
                wiring,
            })
    })
}

fn source_id(shape: &Shape, index: usize) -> String {
    if index < shape.constants.len() {
        format!("c{index}")
    } else {
        format!("s{}", index - shape.constants.len())
    }
}

fn build(shape: &Shape) -> Graph {
    let mut builder = Graph::builder();
    for (i, &v) in shape.constants.iter().enumerate() {
        builder = builder.constant(format!("c{i}"), v);
    }
    for i in 0..shape.sums {
        builder = builder.sum(format!("s{i}"));
    }
    for i in 0..shape.outs {
        builder = builder.out(format!("o{i}"), i);
    }
    for (k, sources) in shape.wiring.iter().enumerate() {
        let target = if k < shape.sums {
            format!("s{k}")
        } else {
            format!("o{}", k - shape.sums)
        };
        for (port, &source) in sources.iter().enumerate() {
            builder = builder.edge(source_id(shape, source), target.as_str(), format!("${port}"));
        }
    }
    builder.build().unwrap()
}

/// Single-threaded scalar evaluation of `ticks` ticks; returns sink values
/// per tick, ordered by channel.
fn evaluate(shape: &Shape, plan: &Plan, ticks: usize) -> Vec<Vec<f64>> {
    let constants: HashMap<String, f64> = shape
        .constants
        .iter()
        .enumerate()
        .map(|(i, &v)| (format!("c{i}"), v))
        .collect();
    let n = plan.len();
    let mut value = vec![0.0; n];
    let mut previous = vec![0.0; n];
    let mut out = Vec::new();

    for _ in 0..ticks {
        let mut pending: Vec<usize> = plan.nodes().iter().map(|p| p.activation_limit).collect();
        let mut ready: Vec<usize> = plan.roots().collect();
        let mut visited = 0;
        while let Some(slot) = ready.pop() {
            visited += 1;
            let node = &plan.nodes()[slot];
            value[slot] = match constants.get(node.id.as_str()) {
                Some(&v) => v,
                None => node
                    .inputs
                    .iter()
                    .map(|i| if i.delayed { previous[i.source] } else { value[i.source] })
                    .sum(),
            };
            for &next in &node.successors {
                pending[next] -= 1;
                if pending[next] == 0 {
                    ready.push(next);
                }
            }
        }
        assert_eq!(visited, n, "schedule left nodes unvisited");
        previous.clone_from(&value);
        out.push(plan.sinks().iter().map(|&s| value[s]).collect());
    }
    out
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * (1.0 + b.abs())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The parallel scheduler agrees with sequential evaluation, feedback
    /// included.
    #[test]
    fn scheduler_matches_sequential(shape in shapes(), workers in 1usize..4) {
        let graph = build(&shape);
        let config = RunnerConfig { block_size: 8, workers, ..Default::default() };
        let env = EpochEnv::new(&config, Arc::new(BlockPool::new()), CancelToken::new());
        let mut epoch = Epoch::build(0, &graph, None, &env).unwrap();
        epoch.adopt(None);

        let expected = evaluate(&shape, epoch.plan(), 4);
        for sinks in expected {
            epoch.tick(&env.cancel).unwrap();
            let frame = epoch.frame();
            prop_assert_eq!(frame.num_channels(), shape.outs);
            for (block, want) in frame.channels().iter().zip(&sinks) {
                prop_assert!(block.iter().all(|&s| close(s, *want)), "{:?} vs {}", block, want);
            }
        }
        epoch.retire();
    }

    /// Every crossfaded sample lies between its old and new values.
    #[test]
    fn crossfade_stays_between_endpoints(
        old in prop::collection::vec(-1.0f64..1.0, 8),
        new in prop::collection::vec(-1.0f64..1.0, 8),
        step in 0usize..10,
    ) {
        let pool = BlockPool::new();
        let before = Frame::new(vec![Block::from(old.clone())]);
        let mut after = Frame::new(vec![Block::from(new.clone())]);
        crossfade_into(&before, &mut after, step * 8, 80, &pool);
        for (j, &mixed) in after.channels()[0].iter().enumerate() {
            let lo = old[j].min(new[j]) - 1e-12;
            let hi = old[j].max(new[j]) + 1e-12;
            prop_assert!(mixed >= lo && mixed <= hi);
        }
    }
}
