//! Typed subgraph pattern matching.
//!
//! Patterns are tiny (three or four nodes), so matching is a plain
//! backtracking search over per-node candidate pools filtered by meta-type.

use std::collections::{BTreeMap, BTreeSet};

use crate::attrs::MetaType;
use crate::error::{GraphError, GraphResult};

use super::{NodeId, TypedGraphStore};

/// Assignment of pattern (or rule) keys to graph nodes.
pub type Binding = BTreeMap<String, NodeId>;

/// A pattern graph: named nodes typed by meta-type, plus required edges.
#[derive(Debug, Clone, Default)]
pub struct Pattern {
    nodes: Vec<(String, MetaType)>,
    edges: Vec<(String, String)>,
}

impl Pattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, key: impl Into<String>, meta_type: MetaType) -> Self {
        self.nodes.push((key.into(), meta_type));
        self
    }

    pub fn edge(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.edges.push((source.into(), target.into()));
        self
    }

    pub fn nodes(&self) -> &[(String, MetaType)] {
        &self.nodes
    }

    pub fn edges(&self) -> &[(String, String)] {
        &self.edges
    }

    fn position(&self, key: &str) -> GraphResult<usize> {
        self.nodes
            .iter()
            .position(|(k, _)| k == key)
            .ok_or_else(|| GraphError::UnboundRuleNode {
                key: key.to_string(),
            })
    }
}

/// Find every injective binding of `pattern` into `candidates`.
pub fn find_matching<S: TypedGraphStore + ?Sized>(
    store: &S,
    pattern: &Pattern,
    candidates: &BTreeSet<NodeId>,
) -> GraphResult<Vec<Binding>> {
    let edges: Vec<(usize, usize)> = pattern
        .edges()
        .iter()
        .map(|(s, t)| Ok((pattern.position(s)?, pattern.position(t)?)))
        .collect::<GraphResult<_>>()?;

    let pools: Vec<Vec<NodeId>> = pattern
        .nodes()
        .iter()
        .map(|(_, meta_type)| {
            candidates
                .iter()
                .copied()
                .filter(|c| store.meta_type(*c).is_ok_and(|t| t == *meta_type))
                .collect()
        })
        .collect();

    let mut results = Vec::new();
    let mut assignment = Vec::with_capacity(pools.len());
    extend(store, pattern, &edges, &pools, &mut assignment, &mut results);
    Ok(results)
}

fn extend<S: TypedGraphStore + ?Sized>(
    store: &S,
    pattern: &Pattern,
    edges: &[(usize, usize)],
    pools: &[Vec<NodeId>],
    assignment: &mut Vec<NodeId>,
    results: &mut Vec<Binding>,
) {
    let depth = assignment.len();
    if depth == pools.len() {
        results.push(
            pattern
                .nodes()
                .iter()
                .zip(assignment.iter())
                .map(|((key, _), node)| (key.clone(), *node))
                .collect(),
        );
        return;
    }

    for &candidate in &pools[depth] {
        if assignment.contains(&candidate) {
            continue;
        }
        let consistent = edges.iter().all(|&(s, t)| {
            let endpoint = |i: usize| {
                if i == depth {
                    Some(candidate)
                } else {
                    assignment.get(i).copied()
                }
            };
            // Only check edges whose endpoints are both assigned, one of them now.
            if s != depth && t != depth {
                return true;
            }
            match (endpoint(s), endpoint(t)) {
                (Some(a), Some(b)) => store.exists_edge(a, b),
                _ => true,
            }
        });
        if consistent {
            assignment.push(candidate);
            extend(store, pattern, edges, pools, assignment, results);
            assignment.pop();
        }
    }
}
