//! Typed graph store: the storage contract consumed by the identification,
//! bookkeeping and semantics layers.
//!
//! - [`TypedGraphStore`]: the contract (typed nodes, multi-valued attributes,
//!   traversal, mutation, merge, pattern matching and rule application)
//! - [`MemoryGraphStore`]: arena-backed implementation over `petgraph`
//! - [`Pattern`] / [`Rule`]: inputs of `find_matching` and `rewrite`
//!
//! Node handles are generation-checked. A merge always issues a fresh handle
//! for the surviving node; the merged handles become stale and can only be
//! followed through [`TypedGraphStore::resolve`].

pub mod memory;
pub mod pattern;
pub mod rewrite;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attrs::{Attrs, EdgeAttrs, MetaType, NodeData};
use crate::error::GraphResult;

pub use memory::{EdgeRecord, GraphSnapshot, MemoryGraphStore, NodeRecord};
pub use pattern::{Binding, Pattern};
pub use rewrite::{RewriteOp, Rule};

/// Stable handle to a node: arena slot plus the generation of its occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node:{}v{}", self.index, self.generation)
    }
}

/// Storage contract for typed action graphs and nuggets.
///
/// Callers hold exclusive access for the duration of one nugget insertion;
/// implementations are not required to be thread-safe.
pub trait TypedGraphStore {
    /// Typed payload of a live node.
    fn node(&self, id: NodeId) -> GraphResult<&NodeData>;

    fn meta_type(&self, id: NodeId) -> GraphResult<MetaType> {
        Ok(self.node(id)?.meta_type())
    }

    fn get_node_attrs(&self, id: NodeId) -> GraphResult<Attrs> {
        Ok(self.node(id)?.attrs())
    }

    fn get_edge_attrs(&self, source: NodeId, target: NodeId) -> GraphResult<EdgeAttrs>;

    /// Targets of outgoing edges, in handle order.
    fn successors(&self, id: NodeId) -> GraphResult<Vec<NodeId>>;

    /// Sources of incoming edges, in handle order.
    fn predecessors(&self, id: NodeId) -> GraphResult<Vec<NodeId>>;

    fn exists_edge(&self, source: NodeId, target: NodeId) -> bool;

    fn contains(&self, id: NodeId) -> bool;

    /// All live nodes, in handle order.
    fn nodes(&self) -> Vec<NodeId>;

    /// All edges as `(source, target)` pairs.
    fn edges(&self) -> Vec<(NodeId, NodeId)>;

    fn node_count(&self) -> usize;

    fn edge_count(&self) -> usize;

    /// Follow merge forwarding from `id` to the live node it became.
    fn resolve(&self, id: NodeId) -> Option<NodeId>;

    fn add_node(&mut self, data: NodeData) -> NodeId;

    /// Add an edge; if it already exists the attributes are unioned.
    fn add_edge(&mut self, source: NodeId, target: NodeId, attrs: EdgeAttrs) -> GraphResult<()>;

    fn add_edge_attrs(&mut self, source: NodeId, target: NodeId, attrs: &EdgeAttrs)
    -> GraphResult<()>;

    fn add_node_attrs(&mut self, id: NodeId, attrs: &Attrs) -> GraphResult<()>;

    /// Merge the given nodes into one fresh node and return its handle.
    fn merge_nodes(&mut self, nodes: &[NodeId]) -> GraphResult<NodeId>;

    /// Remove every node and edge. Outstanding handles become stale.
    fn clear(&mut self);

    /// Live nodes of one meta-type.
    fn nodes_of_type(&self, meta_type: MetaType) -> Vec<NodeId> {
        self.nodes()
            .into_iter()
            .filter(|n| self.meta_type(*n).is_ok_and(|t| t == meta_type))
            .collect()
    }

    /// Subgraph matches of `pattern` among `candidates`.
    fn find_matching(
        &self,
        pattern: &Pattern,
        candidates: &BTreeSet<NodeId>,
    ) -> GraphResult<Vec<Binding>> {
        pattern::find_matching(self, pattern, candidates)
    }

    /// Apply `rule` at `instance`; returns where every rule key ended up.
    fn rewrite(&mut self, rule: &Rule, instance: &Binding, message: &str) -> GraphResult<Binding> {
        rewrite::apply_rule(self, rule, instance, message)
    }
}
