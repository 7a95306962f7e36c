//! In-memory typed graph store.
//!
//! Uses a `petgraph` `StableDiGraph` as the node arena. Slot indices are
//! reused after removal, so every slot also records the generation of its
//! occupant and handles are checked against it.

use std::collections::{BTreeSet, HashMap};

use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use serde::{Deserialize, Serialize};

use crate::attrs::{Attrs, EdgeAttrs, MetaType, NodeData};
use crate::error::{GraphError, GraphResult};

use super::{NodeId, TypedGraphStore};

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    data: NodeData,
}

/// Arena-backed typed graph with generation-checked handles.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraphStore {
    graph: StableDiGraph<Slot, EdgeAttrs>,
    /// Slot index → generation of its current (or next) occupant.
    generations: HashMap<u32, u32>,
    /// Merged-away handle → handle of the merge result.
    forward: HashMap<NodeId, NodeId>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn index_of(&self, id: NodeId) -> GraphResult<NodeIndex> {
        let idx = NodeIndex::new(id.index() as usize);
        match self.graph.node_weight(idx) {
            Some(slot) if slot.generation == id.generation() => Ok(idx),
            _ if self.is_retired(id) => Err(GraphError::StaleNode {
                node: id.to_string(),
            }),
            _ => Err(GraphError::NodeNotFound {
                node: id.to_string(),
            }),
        }
    }

    fn is_retired(&self, id: NodeId) -> bool {
        self.forward.contains_key(&id)
            || self
                .generations
                .get(&id.index())
                .is_some_and(|g| *g > id.generation())
    }

    fn id_of(&self, idx: NodeIndex) -> NodeId {
        let generation = self.graph.node_weight(idx).map_or(0, |s| s.generation);
        NodeId::new(idx.index() as u32, generation)
    }

    fn remove(&mut self, idx: NodeIndex) {
        if self.graph.remove_node(idx).is_some() {
            *self.generations.entry(idx.index() as u32).or_insert(0) += 1;
        }
    }

    fn neighbors(&self, id: NodeId, direction: Direction) -> GraphResult<Vec<NodeId>> {
        let idx = self.index_of(id)?;
        let mut out: Vec<NodeId> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| self.id_of(n))
            .collect();
        out.sort();
        out.dedup();
        Ok(out)
    }

    fn upsert_edge(&mut self, source: NodeIndex, target: NodeIndex, attrs: EdgeAttrs) {
        match self.graph.find_edge(source, target) {
            Some(e) => self.graph[e].union_with(&attrs),
            None => {
                self.graph.add_edge(source, target, attrs);
            }
        }
    }

    /// Serialisable view of the whole graph.
    pub fn snapshot(&self) -> GraphSnapshot {
        let nodes = self
            .nodes()
            .into_iter()
            .filter_map(|id| {
                let data = self.node(id).ok()?;
                Some(NodeRecord {
                    id,
                    meta_type: data.meta_type(),
                    attrs: data.attrs(),
                })
            })
            .collect();
        let edges = self
            .graph
            .edge_references()
            .map(|e| EdgeRecord {
                source: self.id_of(e.source()),
                target: self.id_of(e.target()),
                attrs: e.weight().attrs(),
            })
            .collect();
        GraphSnapshot { nodes, edges }
    }
}

impl TypedGraphStore for MemoryGraphStore {
    fn node(&self, id: NodeId) -> GraphResult<&NodeData> {
        let idx = self.index_of(id)?;
        Ok(&self.graph[idx].data)
    }

    fn get_edge_attrs(&self, source: NodeId, target: NodeId) -> GraphResult<EdgeAttrs> {
        let (s, t) = (self.index_of(source)?, self.index_of(target)?);
        self.graph
            .find_edge(s, t)
            .map(|e| self.graph[e].clone())
            .ok_or_else(|| GraphError::EdgeNotFound {
                source_node: source.to_string(),
                target: target.to_string(),
            })
    }

    fn successors(&self, id: NodeId) -> GraphResult<Vec<NodeId>> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn predecessors(&self, id: NodeId) -> GraphResult<Vec<NodeId>> {
        self.neighbors(id, Direction::Incoming)
    }

    fn exists_edge(&self, source: NodeId, target: NodeId) -> bool {
        match (self.index_of(source), self.index_of(target)) {
            (Ok(s), Ok(t)) => self.graph.find_edge(s, t).is_some(),
            _ => false,
        }
    }

    fn contains(&self, id: NodeId) -> bool {
        self.index_of(id).is_ok()
    }

    fn nodes(&self) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .graph
            .node_indices()
            .map(|idx| self.id_of(idx))
            .collect();
        out.sort();
        out
    }

    fn edges(&self) -> Vec<(NodeId, NodeId)> {
        let mut out: Vec<(NodeId, NodeId)> = self
            .graph
            .edge_references()
            .map(|e| (self.id_of(e.source()), self.id_of(e.target())))
            .collect();
        out.sort();
        out
    }

    fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn resolve(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;
        loop {
            if self.contains(current) {
                return Some(current);
            }
            current = *self.forward.get(&current)?;
        }
    }

    fn add_node(&mut self, data: NodeData) -> NodeId {
        let idx = self.graph.add_node(Slot {
            generation: 0,
            data,
        });
        let generation = *self.generations.entry(idx.index() as u32).or_insert(0);
        self.graph[idx].generation = generation;
        NodeId::new(idx.index() as u32, generation)
    }

    fn add_edge(&mut self, source: NodeId, target: NodeId, attrs: EdgeAttrs) -> GraphResult<()> {
        let (s, t) = (self.index_of(source)?, self.index_of(target)?);
        self.upsert_edge(s, t, attrs);
        Ok(())
    }

    fn add_edge_attrs(
        &mut self,
        source: NodeId,
        target: NodeId,
        attrs: &EdgeAttrs,
    ) -> GraphResult<()> {
        let (s, t) = (self.index_of(source)?, self.index_of(target)?);
        let edge = self
            .graph
            .find_edge(s, t)
            .ok_or_else(|| GraphError::EdgeNotFound {
                source_node: source.to_string(),
                target: target.to_string(),
            })?;
        self.graph[edge].union_with(attrs);
        Ok(())
    }

    fn add_node_attrs(&mut self, id: NodeId, attrs: &Attrs) -> GraphResult<()> {
        let idx = self.index_of(id)?;
        self.graph[idx].data.add_attrs(attrs);
        Ok(())
    }

    fn merge_nodes(&mut self, nodes: &[NodeId]) -> GraphResult<NodeId> {
        let mut members: Vec<NodeId> = nodes.to_vec();
        members.sort();
        members.dedup();
        let indices: Vec<NodeIndex> = members
            .iter()
            .map(|id| self.index_of(*id))
            .collect::<GraphResult<_>>()?;

        let (&first, rest) = indices.split_first().ok_or_else(|| GraphError::InvalidMerge {
            message: "empty merge set".into(),
        })?;
        if rest.is_empty() {
            return Ok(members[0]);
        }

        let mut data = self.graph[first].data.clone();
        for idx in rest {
            data.merge_from(&self.graph[*idx].data)?;
        }

        let member_set: BTreeSet<NodeIndex> = indices.iter().copied().collect();
        let mut outgoing: Vec<(NodeIndex, EdgeAttrs)> = Vec::new();
        let mut incoming: Vec<(NodeIndex, EdgeAttrs)> = Vec::new();
        for idx in &indices {
            for e in self.graph.edges_directed(*idx, Direction::Outgoing) {
                if !member_set.contains(&e.target()) {
                    outgoing.push((e.target(), e.weight().clone()));
                }
            }
            for e in self.graph.edges_directed(*idx, Direction::Incoming) {
                if !member_set.contains(&e.source()) {
                    incoming.push((e.source(), e.weight().clone()));
                }
            }
        }

        let merged = self.add_node(data);
        let merged_idx = self.index_of(merged)?;
        for (target, attrs) in outgoing {
            self.upsert_edge(merged_idx, target, attrs);
        }
        for (source, attrs) in incoming {
            self.upsert_edge(source, merged_idx, attrs);
        }
        for (id, idx) in members.iter().zip(indices) {
            self.remove(idx);
            self.forward.insert(*id, merged);
        }

        tracing::debug!(count = members.len(), into = %merged, "merged nodes");
        Ok(merged)
    }

    fn clear(&mut self) {
        let live: Vec<NodeIndex> = self.graph.node_indices().collect();
        for idx in live {
            *self.generations.entry(idx.index() as u32).or_insert(0) += 1;
        }
        self.graph.clear();
        self.forward.clear();
    }
}

/// Serialisable node of a [`GraphSnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub meta_type: MetaType,
    pub attrs: Attrs,
}

/// Serialisable edge of a [`GraphSnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: NodeId,
    pub target: NodeId,
    pub attrs: Attrs,
}

/// Point-in-time copy of a graph, for export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}
