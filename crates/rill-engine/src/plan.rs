//! Static schedule derived from a graph snapshot.
//!
//! A [`Plan`] answers three questions about a validated [`Graph`]:
//!
//! 1. **Which nodes run.** Only nodes from which some sink is reachable are
//!    scheduled; everything else is pruned.
//! 2. **Which edges are bootstrap edges.** A depth-first walk from the sinks
//!    (sink declaration order, incoming edges in edge-list order) marks every
//!    edge into a node that is still on the walk's path. Those edges close a
//!    cycle; the consumer reads the producer's block from the *previous* tick
//!    and the edge does not count toward activation.
//! 3. **Who waits for whom.** Each scheduled node gets a deduplicated list of
//!    successors along non-bootstrap edges and an activation limit equal to
//!    its number of distinct non-bootstrap predecessors.
//!
//! Removing the bootstrap edges leaves a DAG, so every tick terminates.
//!
//! ```text
//!   one ──► acc ──► out
//!           ▲  │
//!           └──┘   acc → acc is a bootstrap edge
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use rill_core::{Graph, GraphError, NodeId};

/// One resolved input port of a scheduled node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedInput {
    /// Port name on the consumer.
    pub port: String,
    /// Slot index of the producer.
    pub source: usize,
    /// Read the producer's previous-tick block.
    pub delayed: bool,
}

/// A scheduled node.
#[derive(Debug, Clone)]
pub struct PlannedNode {
    /// Node id.
    pub id: NodeId,
    /// Position in [`Graph::nodes`].
    pub graph_index: usize,
    /// Inputs in edge-list order.
    pub inputs: Vec<PlannedInput>,
    /// Distinct consumers along non-bootstrap edges.
    pub successors: Vec<usize>,
    /// Distinct producers along non-bootstrap edges.
    pub activation_limit: usize,
    /// Some consumer reads this node through a bootstrap edge.
    pub keeps_previous: bool,
    /// Output channel if this node is a sink.
    pub sink: Option<usize>,
}

/// The schedule for one graph.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    nodes: Vec<PlannedNode>,
    slots: HashMap<NodeId, usize>,
    sinks: Vec<usize>,
    channels: usize,
    bootstrap: Vec<usize>,
    pruned: Vec<NodeId>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Fresh,
    OnPath,
    Done,
}

impl Plan {
    /// Validates `graph` and derives its schedule.
    pub fn new(graph: &Graph) -> Result<Self, GraphError> {
        graph.validate()?;

        let n = graph.len();
        // (edge index, producer graph index) per consumer, edge-list order
        let mut incoming: Vec<Vec<(usize, usize)>> = vec![Vec::new(); n];
        for (e, edge) in graph.edges().iter().enumerate() {
            if let (Some(from), Some(to)) = (graph.position(&edge.from), graph.position(&edge.to)) {
                incoming[to].push((e, from));
            }
        }
        let sinks: Vec<usize> = graph
            .nodes()
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_sink())
            .map(|(i, _)| i)
            .collect();

        let back_pairs = find_back_pairs(&incoming, &sinks, n);

        // Reverse BFS from the sinks; reversing the visit order puts
        // producers ahead of their consumers.
        let mut visited = vec![false; n];
        let mut visit_order = Vec::with_capacity(n);
        let mut queue: VecDeque<usize> = VecDeque::new();
        for &s in &sinks {
            if !visited[s] {
                visited[s] = true;
                queue.push_back(s);
            }
        }
        while let Some(node) = queue.pop_front() {
            visit_order.push(node);
            for &(_, from) in &incoming[node] {
                if !visited[from] {
                    visited[from] = true;
                    queue.push_back(from);
                }
            }
        }
        visit_order.reverse();

        let mut slot_of = vec![usize::MAX; n];
        for (slot, &g) in visit_order.iter().enumerate() {
            slot_of[g] = slot;
        }

        let mut nodes: Vec<PlannedNode> = visit_order
            .iter()
            .map(|&g| {
                let node = &graph.nodes()[g];
                PlannedNode {
                    id: node.id().clone(),
                    graph_index: g,
                    inputs: Vec::with_capacity(incoming[g].len()),
                    successors: Vec::new(),
                    activation_limit: 0,
                    keeps_previous: false,
                    sink: node.sink_index(),
                }
            })
            .collect();

        let mut bootstrap = Vec::new();
        for (slot, &g) in visit_order.iter().enumerate() {
            let mut producers = HashSet::new();
            for &(e, from) in &incoming[g] {
                let source = slot_of[from];
                let delayed = back_pairs.contains(&(from, g));
                if delayed {
                    bootstrap.push(e);
                    nodes[source].keeps_previous = true;
                } else if producers.insert(source) {
                    nodes[source].successors.push(slot);
                }
                nodes[slot].inputs.push(PlannedInput {
                    port: graph.edges()[e].port.clone(),
                    source,
                    delayed,
                });
            }
            nodes[slot].activation_limit = producers.len();
        }
        bootstrap.sort_unstable();

        let mut sink_slots: Vec<usize> = nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.sink.is_some())
            .map(|(slot, _)| slot)
            .collect();
        sink_slots.sort_by_key(|&slot| nodes[slot].sink);
        let channels = nodes.iter().filter_map(|node| node.sink).max().map_or(0, |c| c + 1);

        let pruned: Vec<NodeId> = graph
            .nodes()
            .iter()
            .enumerate()
            .filter(|(i, _)| !visited[*i])
            .map(|(_, node)| node.id().clone())
            .collect();
        if !pruned.is_empty() {
            tracing::debug!(count = pruned.len(), "pruned nodes with no path to a sink");
        }

        let slots = nodes
            .iter()
            .enumerate()
            .map(|(slot, node)| (node.id.clone(), slot))
            .collect();

        Ok(Self {
            nodes,
            slots,
            sinks: sink_slots,
            channels,
            bootstrap,
            pruned,
        })
    }

    /// Scheduled nodes; slot index is the position in this slice.
    pub fn nodes(&self) -> &[PlannedNode] {
        &self.nodes
    }

    /// Number of scheduled nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Slot of a scheduled node.
    pub fn slot_of(&self, id: &NodeId) -> Option<usize> {
        self.slots.get(id).copied()
    }

    /// Returns `true` if `id` is scheduled.
    pub fn is_scheduled(&self, id: &NodeId) -> bool {
        self.slots.contains_key(id)
    }

    /// Sink slots ordered by channel index.
    pub fn sinks(&self) -> &[usize] {
        &self.sinks
    }

    /// Width of a frame: the highest sink channel plus one.
    ///
    /// Channels with no sink are silent.
    pub fn channel_count(&self) -> usize {
        self.channels
    }

    /// Indices into [`Graph::edges`] of the bootstrap edges, ascending.
    pub fn bootstrap_edges(&self) -> &[usize] {
        &self.bootstrap
    }

    /// Nodes dropped because no sink depends on them.
    pub fn pruned(&self) -> &[NodeId] {
        &self.pruned
    }

    /// Slots that can start as soon as a tick begins.
    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.activation_limit == 0)
            .map(|(slot, _)| slot)
    }
}

/// Iterative DFS from every sink; returns `(producer, consumer)` pairs whose
/// edges point back into the current path.
fn find_back_pairs(
    incoming: &[Vec<(usize, usize)>],
    sinks: &[usize],
    n: usize,
) -> HashSet<(usize, usize)> {
    let mut mark = vec![Mark::Fresh; n];
    let mut back = HashSet::new();
    // (node, next incoming edge to look at)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for &sink in sinks {
        if mark[sink] != Mark::Fresh {
            continue;
        }
        mark[sink] = Mark::OnPath;
        stack.push((sink, 0));
        while let Some(top) = stack.last_mut() {
            let (node, cursor) = *top;
            let Some(&(_, from)) = incoming[node].get(cursor) else {
                mark[node] = Mark::Done;
                stack.pop();
                continue;
            };
            top.1 += 1;
            match mark[from] {
                Mark::OnPath => {
                    back.insert((from, node));
                }
                Mark::Fresh => {
                    mark[from] = Mark::OnPath;
                    stack.push((from, 0));
                }
                Mark::Done => {}
            }
        }
    }
    back
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(plan: &Plan) -> Vec<&str> {
        plan.nodes().iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn test_chain_order_and_limits() {
        let graph = Graph::builder()
            .constant("c", 1.0)
            .sum("s")
            .out("o", 0)
            .edge("c", "s", "$0")
            .edge("s", "o", "in")
            .build()
            .unwrap();
        let plan = Plan::new(&graph).unwrap();
        assert_eq!(ids(&plan), vec!["c", "s", "o"]);
        assert_eq!(plan.nodes()[0].activation_limit, 0);
        assert_eq!(plan.nodes()[1].activation_limit, 1);
        assert_eq!(plan.nodes()[0].successors, vec![1]);
        assert_eq!(plan.roots().collect::<Vec<_>>(), vec![0]);
        assert!(plan.bootstrap_edges().is_empty());
    }

    #[test]
    fn test_unreachable_nodes_are_pruned() {
        let graph = Graph::builder()
            .constant("c", 1.0)
            .sine("lonely", 440.0)
            .out("o", 0)
            .edge("c", "o", "in")
            .build()
            .unwrap();
        let plan = Plan::new(&graph).unwrap();
        assert_eq!(plan.len(), 2);
        assert!(!plan.is_scheduled(&"lonely".into()));
        assert_eq!(plan.pruned(), &["lonely".into()]);
    }

    #[test]
    fn test_self_loop_is_bootstrap() {
        let graph = Graph::builder()
            .constant("one", 1.0)
            .sum("acc")
            .out("o", 0)
            .edge("one", "acc", "$0")
            .edge("acc", "acc", "$1")
            .edge("acc", "o", "in")
            .build()
            .unwrap();
        let plan = Plan::new(&graph).unwrap();
        assert_eq!(plan.bootstrap_edges(), &[1]);
        let acc = plan.slot_of(&"acc".into()).unwrap();
        let node = &plan.nodes()[acc];
        assert!(node.keeps_previous);
        assert_eq!(node.activation_limit, 1);
        assert!(node.inputs.iter().any(|i| i.port == "$1" && i.delayed));
    }

    #[test]
    fn test_two_node_cycle_marks_one_edge() {
        let graph = Graph::builder()
            .sum("a")
            .sum("b")
            .out("o", 0)
            .edge("a", "b", "$0")
            .edge("b", "a", "$0")
            .edge("b", "o", "in")
            .build()
            .unwrap();
        let plan = Plan::new(&graph).unwrap();
        // DFS: o -> b -> a, then a's input from b points back into the path.
        assert_eq!(plan.bootstrap_edges(), &[1]);
        let a = plan.slot_of(&"a".into()).unwrap();
        let b = plan.slot_of(&"b".into()).unwrap();
        assert_eq!(plan.nodes()[a].activation_limit, 0);
        assert_eq!(plan.nodes()[b].activation_limit, 1);
        assert!(plan.nodes()[b].keeps_previous);
    }

    #[test]
    fn test_diamond_has_no_bootstrap_edges() {
        let graph = Graph::builder()
            .constant("src", 1.0)
            .sum("l")
            .sum("r")
            .sum("join")
            .out("o", 0)
            .edge("src", "l", "$0")
            .edge("src", "r", "$0")
            .edge("l", "join", "$0")
            .edge("r", "join", "$1")
            .edge("join", "o", "in")
            .build()
            .unwrap();
        let plan = Plan::new(&graph).unwrap();
        assert!(plan.bootstrap_edges().is_empty());
        let join = plan.slot_of(&"join".into()).unwrap();
        assert_eq!(plan.nodes()[join].activation_limit, 2);
        let src = plan.slot_of(&"src".into()).unwrap();
        assert_eq!(plan.nodes()[src].successors.len(), 2);
    }

    #[test]
    fn test_parallel_edges_count_once() {
        let graph = Graph::builder()
            .constant("c", 2.0)
            .product("sq")
            .out("o", 0)
            .edge("c", "sq", "$0")
            .edge("c", "sq", "$1")
            .edge("sq", "o", "in")
            .build()
            .unwrap();
        let plan = Plan::new(&graph).unwrap();
        let sq = plan.slot_of(&"sq".into()).unwrap();
        assert_eq!(plan.nodes()[sq].activation_limit, 1);
        assert_eq!(plan.nodes()[sq].inputs.len(), 2);
        let c = plan.slot_of(&"c".into()).unwrap();
        assert_eq!(plan.nodes()[c].successors, vec![sq]);
    }

    #[test]
    fn test_sinks_sorted_by_channel() {
        let graph = Graph::builder()
            .constant("c", 1.0)
            .out("right", 1)
            .out("left", 0)
            .edge("c", "right", "in")
            .edge("c", "left", "in")
            .build()
            .unwrap();
        let plan = Plan::new(&graph).unwrap();
        let names: Vec<_> = plan
            .sinks()
            .iter()
            .map(|&s| plan.nodes()[s].id.as_str())
            .collect();
        assert_eq!(names, vec!["left", "right"]);
        assert_eq!(plan.channel_count(), 2);
    }

    #[test]
    fn test_channel_count_spans_gaps() {
        let graph = Graph::builder()
            .constant("c", 1.0)
            .out("aux", 3)
            .edge("c", "aux", "in")
            .build()
            .unwrap();
        let plan = Plan::new(&graph).unwrap();
        assert_eq!(plan.sinks().len(), 1);
        assert_eq!(plan.channel_count(), 4);
    }

    #[test]
    fn test_missing_sink_rejected() {
        let graph = Graph::builder().constant("c", 1.0).build_unchecked();
        assert!(matches!(Plan::new(&graph), Err(GraphError::MissingSink)));
    }
}
