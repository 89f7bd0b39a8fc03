//! Node identity across successive graphs.
//!
//! When a graph is replaced, nodes that are "the same" in the old and new
//! snapshot keep their UGen instance, so oscillator phases, filter memories
//! and RNG state carry over instead of restarting.
//!
//! # Algorithm
//!
//! 1. `const` nodes are matched by value. A new constant with no equal old
//!    constant stays unmatched. Old constants never take part in step 2.
//! 2. The remaining nodes of each graph, in declaration order, are aligned
//!    with a Levenshtein edit grid (old on rows, new on columns). Two nodes
//!    are equal when their type tags match and their argument lists are
//!    structurally equal. Diagonal "equal" moves on the traceback become
//!    identities.
//!
//! The match is approximate. A node moved far within the declaration order
//! may be rebuilt even though an identical node exists.

use std::collections::HashMap;

use crate::graph::{Graph, Node, NodeId};

/// Partial map from new-graph node ids to old-graph node ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Alignment {
    identities: HashMap<NodeId, NodeId>,
}

impl Alignment {
    /// Old-graph node matched to `new_id`.
    pub fn get(&self, new_id: &NodeId) -> Option<&NodeId> {
        self.identities.get(new_id)
    }

    /// Number of matched pairs.
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    /// Returns `true` if nothing matched.
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// `(new, old)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &NodeId)> {
        self.identities.iter()
    }
}

#[derive(Clone, Copy, Default)]
struct Cell {
    dist: usize,
    eq: bool,
}

fn constant_key(node: &Node) -> Option<u64> {
    let value = node.constant_value()?;
    if value.is_nan() {
        return None;
    }
    // 0.0 and -0.0 are the same constant
    Some(if value == 0.0 { 0 } else { value.to_bits() })
}

/// Computes the identity map from `new` onto `old`.
pub fn align(old: &Graph, new: &Graph) -> Alignment {
    let mut identities = HashMap::new();

    let mut old_constants = HashMap::new();
    let mut old_rest: Vec<&Node> = Vec::with_capacity(old.len());
    for node in old.nodes() {
        match constant_key(node) {
            Some(key) => {
                old_constants.insert(key, node.id());
            }
            None => old_rest.push(node),
        }
    }

    let mut new_rest: Vec<&Node> = Vec::with_capacity(new.len());
    for node in new.nodes() {
        match constant_key(node) {
            Some(key) => {
                if let Some(&old_id) = old_constants.get(&key) {
                    identities.insert(node.id().clone(), old_id.clone());
                }
            }
            None => new_rest.push(node),
        }
    }

    let rows = old_rest.len();
    let cols = new_rest.len();
    let mut grid = vec![vec![Cell::default(); cols + 1]; rows + 1];
    for (i, row) in grid.iter_mut().enumerate() {
        row[0].dist = i;
    }
    for (j, cell) in grid[0].iter_mut().enumerate() {
        cell.dist = j;
    }
    for i in 1..=rows {
        for j in 1..=cols {
            grid[i][j] = if old_rest[i - 1].same_as(new_rest[j - 1]) {
                Cell {
                    dist: grid[i - 1][j - 1].dist,
                    eq: true,
                }
            } else {
                let best = grid[i - 1][j]
                    .dist
                    .min(grid[i][j - 1].dist)
                    .min(grid[i - 1][j - 1].dist);
                Cell {
                    dist: best + 1,
                    eq: false,
                }
            };
        }
    }

    let (mut i, mut j) = (rows, cols);
    while i > 0 && j > 0 {
        let cell = grid[i][j];
        if cell.eq {
            identities.insert(new_rest[j - 1].id().clone(), old_rest[i - 1].id().clone());
            i -= 1;
            j -= 1;
        } else if cell.dist == grid[i - 1][j].dist + 1 {
            i -= 1;
        } else if cell.dist == grid[i][j - 1].dist + 1 {
            j -= 1;
        } else {
            i -= 1;
            j -= 1;
        }
    }

    tracing::debug!(
        matched = identities.len(),
        old = old.len(),
        new = new.len(),
        "graphs aligned"
    );
    Alignment { identities }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;

    fn chain(prefix: &str, freqs: &[f64]) -> GraphBuilder {
        let mut builder = Graph::builder();
        for (k, f) in freqs.iter().enumerate() {
            builder = builder.sine(format!("{prefix}{k}"), *f);
        }
        builder.out(format!("{prefix}out"), 0)
    }

    #[test]
    fn test_renamed_graph_fully_aligns() {
        let a = chain("a", &[110.0, 220.0, 330.0]).build_unchecked();
        let b = chain("b", &[110.0, 220.0, 330.0]).build_unchecked();
        let alignment = align(&a, &b);
        assert_eq!(alignment.len(), 4);
        assert_eq!(alignment.get(&"b1".into()), Some(&"a1".into()));
        assert_eq!(alignment.get(&"bout".into()), Some(&"aout".into()));
    }

    #[test]
    fn test_single_insertion() {
        let a = chain("a", &[110.0, 220.0, 330.0]).build_unchecked();
        let b = chain("b", &[110.0, 165.0, 220.0, 330.0]).build_unchecked();
        let alignment = align(&a, &b);
        assert_eq!(alignment.len(), b.len() - 1);
        assert!(alignment.get(&"b1".into()).is_none());
        assert_eq!(alignment.get(&"b2".into()), Some(&"a1".into()));
    }

    #[test]
    fn test_single_removal() {
        let a = chain("a", &[110.0, 220.0, 330.0]).build_unchecked();
        let b = chain("b", &[110.0, 330.0]).build_unchecked();
        let alignment = align(&a, &b);
        assert_eq!(alignment.len(), b.len());
        assert_eq!(alignment.get(&"b1".into()), Some(&"a2".into()));
    }

    #[test]
    fn test_changed_argument_breaks_identity() {
        let a = chain("a", &[110.0]).build_unchecked();
        let b = chain("b", &[111.0]).build_unchecked();
        let alignment = align(&a, &b);
        assert!(alignment.get(&"b0".into()).is_none());
        assert!(alignment.get(&"bout".into()).is_some());
    }

    #[test]
    fn test_constants_match_by_value() {
        let a = Graph::builder()
            .constant("one", 1.0)
            .constant("zero", 0.0)
            .out("o", 0)
            .build_unchecked();
        let b = Graph::builder()
            .constant("uno", 1.0)
            .constant("neg-zero", -0.0)
            .constant("two", 2.0)
            .out("o", 0)
            .build_unchecked();
        let alignment = align(&a, &b);
        assert_eq!(alignment.get(&"uno".into()), Some(&"one".into()));
        assert_eq!(alignment.get(&"neg-zero".into()), Some(&"zero".into()));
        assert!(alignment.get(&"two".into()).is_none());
        assert_eq!(alignment.len(), 3);
    }

    #[test]
    fn test_empty_graphs() {
        let alignment = align(&Graph::default(), &Graph::default());
        assert!(alignment.is_empty());
    }
}
