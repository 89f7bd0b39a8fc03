//! Patch validation and schedule inspection.

use anyhow::Context;
use clap::Args;
use rill_engine::Plan;
use rill_registry::UGenRegistry;

use super::common::load_graph;

#[derive(Args)]
pub struct CheckArgs {
    /// Patch name or path to a patch file
    patch: String,
}

pub fn run(args: CheckArgs) -> anyhow::Result<()> {
    let registry = UGenRegistry::new();
    let (patch, graph) = load_graph(&args.patch, &registry)?;

    // Surface bad constructor arguments now rather than at swap time.
    for node in graph.nodes() {
        node.instantiate()
            .with_context(|| format!("node '{}' ({}) cannot be built", node.id(), node.kind()))?;
    }
    let plan = Plan::new(&graph)?;

    println!("Patch: {}", patch.display_name());
    if let Some(description) = &patch.description {
        println!("  {description}");
    }
    println!(
        "{} nodes, {} edges, {} sinks, {} channels",
        graph.len(),
        graph.edges().len(),
        plan.sinks().len(),
        plan.channel_count()
    );
    println!();

    println!("Schedule:");
    println!("{:<4} {:<16} {:<10} {:>6}  SINK", "SLOT", "NODE", "TYPE", "WAITS");
    println!("{}", "-".repeat(48));
    for (slot, planned) in plan.nodes().iter().enumerate() {
        let node = &graph.nodes()[planned.graph_index];
        let sink = planned
            .sink
            .map(|channel| format!("ch {channel}"))
            .unwrap_or_default();
        println!(
            "{:<4} {:<16} {:<10} {:>6}  {}",
            slot,
            planned.id.to_string(),
            node.kind(),
            planned.activation_limit,
            sink
        );
    }

    let bootstrap = plan.bootstrap_edges();
    if !bootstrap.is_empty() {
        println!();
        println!("Bootstrap edges (read the previous block):");
        for &index in bootstrap {
            let edge = &graph.edges()[index];
            println!("  {} -> {}.{}", edge.from, edge.to, edge.port);
        }
    }

    let pruned = plan.pruned();
    if !pruned.is_empty() {
        println!();
        let names: Vec<String> = pruned.iter().map(ToString::to_string).collect();
        println!("Pruned (no path to a sink): {}", names.join(", "));
    }

    println!();
    println!("OK");
    Ok(())
}
