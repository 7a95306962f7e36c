//! Graph transformation rules.
//!
//! A [`Rule`] is an ordered list of additive operations and merges applied at
//! an instance (a binding of rule keys to existing nodes). Rules are checked
//! against the instance before anything is mutated, so a rule that would
//! violate typing leaves the store untouched.

use std::collections::BTreeMap;

use crate::attrs::{Attrs, EdgeAttrs, MetaType, NodeData};
use crate::error::{GraphError, GraphResult};

use super::{Binding, NodeId, TypedGraphStore};

/// One step of a rewrite rule.
#[derive(Debug, Clone)]
pub enum RewriteOp {
    AddNode { key: String, data: NodeData },
    AddEdge { source: String, target: String, attrs: EdgeAttrs },
    AddNodeAttrs { key: String, attrs: Attrs },
    AddEdgeAttrs { source: String, target: String, attrs: EdgeAttrs },
    /// Merge the nodes bound to `keys`; the result is bound to `into` and to
    /// every merged key.
    MergeNodes { keys: Vec<String>, into: String },
}

#[derive(Debug, Clone, Default)]
pub struct Rule {
    ops: Vec<RewriteOp>,
}

impl Rule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(mut self, key: impl Into<String>, data: NodeData) -> Self {
        self.ops.push(RewriteOp::AddNode {
            key: key.into(),
            data,
        });
        self
    }

    pub fn add_edge(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        attrs: EdgeAttrs,
    ) -> Self {
        self.ops.push(RewriteOp::AddEdge {
            source: source.into(),
            target: target.into(),
            attrs,
        });
        self
    }

    pub fn add_node_attrs(mut self, key: impl Into<String>, attrs: Attrs) -> Self {
        self.ops.push(RewriteOp::AddNodeAttrs {
            key: key.into(),
            attrs,
        });
        self
    }

    pub fn add_edge_attrs(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        attrs: EdgeAttrs,
    ) -> Self {
        self.ops.push(RewriteOp::AddEdgeAttrs {
            source: source.into(),
            target: target.into(),
            attrs,
        });
        self
    }

    pub fn merge<I, K>(mut self, keys: I, into: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.ops.push(RewriteOp::MergeNodes {
            keys: keys.into_iter().map(Into::into).collect(),
            into: into.into(),
        });
        self
    }

    pub fn ops(&self) -> &[RewriteOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

fn lookup<'a, T>(map: &'a BTreeMap<String, T>, key: &str) -> GraphResult<&'a T> {
    map.get(key).ok_or_else(|| GraphError::UnboundRuleNode {
        key: key.to_string(),
    })
}

/// Check that every key is bound and every merge is type-coherent.
fn validate<S: TypedGraphStore + ?Sized>(
    store: &S,
    rule: &Rule,
    instance: &Binding,
) -> GraphResult<()> {
    let mut types: BTreeMap<String, MetaType> = BTreeMap::new();
    for (key, node) in instance {
        types.insert(key.clone(), store.meta_type(*node)?);
    }

    for op in rule.ops() {
        match op {
            RewriteOp::AddNode { key, data } => {
                types.insert(key.clone(), data.meta_type());
            }
            RewriteOp::AddEdge { source, target, .. }
            | RewriteOp::AddEdgeAttrs { source, target, .. } => {
                lookup(&types, source)?;
                lookup(&types, target)?;
            }
            RewriteOp::AddNodeAttrs { key, .. } => {
                lookup(&types, key)?;
            }
            RewriteOp::MergeNodes { keys, into } => {
                let Some(first) = keys.first() else {
                    return Err(GraphError::InvalidMerge {
                        message: format!("merge into '{into}' names no nodes"),
                    });
                };
                let expected = *lookup(&types, first)?;
                for key in keys {
                    let actual = *lookup(&types, key)?;
                    if actual != expected {
                        return Err(GraphError::MetaTypeMismatch { expected, actual });
                    }
                }
                types.insert(into.clone(), expected);
            }
        }
    }
    Ok(())
}

/// Apply `rule` at `instance`.
pub fn apply_rule<S: TypedGraphStore + ?Sized>(
    store: &mut S,
    rule: &Rule,
    instance: &Binding,
    message: &str,
) -> GraphResult<Binding> {
    validate(store, rule, instance)?;

    let mut binding = instance.clone();
    for op in rule.ops() {
        match op {
            RewriteOp::AddNode { key, data } => {
                let id = store.add_node(data.clone());
                binding.insert(key.clone(), id);
            }
            RewriteOp::AddEdge {
                source,
                target,
                attrs,
            } => {
                let (s, t) = (*lookup(&binding, source)?, *lookup(&binding, target)?);
                store.add_edge(s, t, attrs.clone())?;
            }
            RewriteOp::AddEdgeAttrs {
                source,
                target,
                attrs,
            } => {
                let (s, t) = (*lookup(&binding, source)?, *lookup(&binding, target)?);
                store.add_edge_attrs(s, t, attrs)?;
            }
            RewriteOp::AddNodeAttrs { key, attrs } => {
                store.add_node_attrs(*lookup(&binding, key)?, attrs)?;
            }
            RewriteOp::MergeNodes { keys, into } => {
                let mut members: Vec<NodeId> = keys
                    .iter()
                    .map(|k| lookup(&binding, k).copied())
                    .collect::<GraphResult<_>>()?;
                members.sort();
                members.dedup();
                let merged = store.merge_nodes(&members)?;
                for node in binding.values_mut() {
                    if members.contains(node) {
                        *node = merged;
                    }
                }
                binding.insert(into.clone(), merged);
            }
        }
    }

    tracing::debug!(ops = rule.ops().len(), %message, "applied rewrite");
    Ok(binding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryGraphStore;

    #[test]
    fn adds_nodes_and_edges_at_instance() {
        let mut g = MemoryGraphStore::new();
        let region = g.add_node(NodeData::region("kinase"));
        let instance = Binding::from([("region".to_string(), region)]);

        let rule = Rule::new()
            .add_node("activity", NodeData::state("activity", true))
            .add_edge("activity", "region", EdgeAttrs::default());
        let result = g.rewrite(&rule, &instance, "add activity").unwrap();

        let activity = result["activity"];
        assert!(g.exists_edge(activity, region));
        assert_eq!(g.node(activity).unwrap().name(), Some("activity"));
    }

    #[test]
    fn merge_rebinds_every_merged_key() {
        let mut g = MemoryGraphStore::new();
        let a = g.add_node(NodeData::modification(true));
        let b = g.add_node(NodeData::modification(true));
        let instance = Binding::from([("a".to_string(), a), ("b".to_string(), b)]);

        let rule = Rule::new().merge(["a", "b"], "ab");
        let result = g.rewrite(&rule, &instance, "merge mods").unwrap();

        assert_eq!(result["a"], result["ab"]);
        assert_eq!(result["b"], result["ab"]);
        assert!(!g.contains(a));
        assert_eq!(g.resolve(a), Some(result["ab"]));
    }

    #[test]
    fn ill_typed_merge_leaves_store_untouched() {
        let mut g = MemoryGraphStore::new();
        let a = g.add_node(NodeData::modification(true));
        let b = g.add_node(NodeData::binding());
        let instance = Binding::from([("a".to_string(), a), ("b".to_string(), b)]);

        let rule = Rule::new()
            .add_node("extra", NodeData::state("activity", true))
            .merge(["a", "b"], "ab");
        let err = g.rewrite(&rule, &instance, "bad merge").unwrap_err();

        assert!(matches!(err, GraphError::MetaTypeMismatch { .. }));
        assert_eq!(g.node_count(), 2);
    }

    #[test]
    fn unbound_key_is_rejected() {
        let mut g = MemoryGraphStore::new();
        let rule = Rule::new().add_edge("x", "y", EdgeAttrs::default());
        let err = g.rewrite(&rule, &Binding::new(), "dangling").unwrap_err();
        assert!(matches!(err, GraphError::UnboundRuleNode { .. }));
    }
}
