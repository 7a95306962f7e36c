//! Bookkeeping: restores the structure implied by a freshly merged nugget.
//!
//! Every step only adds edges or merges duplicate residues, and each one is
//! idempotent: re-running over an already bookkept graph changes nothing.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::AddAssign;

use serde::Serialize;

use crate::attrs::{EdgeAttrs, MetaType};
use crate::error::GraphResult;
use crate::identify::{EntityIdentifier, FragmentQuery, find_fragment};
use crate::store::{NodeId, Pattern, TypedGraphStore};

/// What one bookkeeping step changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BookkeepingReport {
    pub edges_added: usize,
    pub residues_merged: usize,
}

impl BookkeepingReport {
    pub fn is_noop(&self) -> bool {
        self.edges_added == 0 && self.residues_merged == 0
    }
}

impl AddAssign for BookkeepingReport {
    fn add_assign(&mut self, rhs: Self) {
        self.edges_added += rhs.edges_added;
        self.residues_merged += rhs.residues_merged;
    }
}

/// Three-level containment shapes closed by transitive shortcuts, as
/// `(top, middle, leaf)`. Order matters: a shortcut added by one shape can
/// complete a later one.
const TRANSITIVE_SHAPES: [(MetaType, MetaType, MetaType); 4] = [
    (MetaType::Protoform, MetaType::Region, MetaType::Site),
    (MetaType::Region, MetaType::Site, MetaType::Residue),
    (MetaType::Protoform, MetaType::Region, MetaType::Residue),
    (MetaType::Protoform, MetaType::Site, MetaType::Residue),
];

/// Follow merge forwarding for a set of handles, dropping deleted nodes.
pub fn live_nodes<S: TypedGraphStore + ?Sized>(
    graph: &S,
    nodes: &BTreeSet<NodeId>,
) -> BTreeSet<NodeId> {
    nodes.iter().filter_map(|n| graph.resolve(*n)).collect()
}

fn contains_range(outer: (i64, i64), inner: (i64, i64)) -> bool {
    outer.0 <= inner.0 && inner.1 <= outer.1
}

pub struct Bookkeeper<'g, S: TypedGraphStore + ?Sized> {
    graph: &'g mut S,
}

impl<'g, S: TypedGraphStore + ?Sized> Bookkeeper<'g, S> {
    pub fn new(graph: &'g mut S) -> Self {
        Self { graph }
    }

    fn identifier(&self) -> EntityIdentifier<'_, S> {
        EntityIdentifier::new(&*self.graph)
    }

    fn add_shortcut(
        &mut self,
        source: NodeId,
        target: NodeId,
        attrs: EdgeAttrs,
    ) -> GraphResult<usize> {
        if source == target || self.graph.exists_edge(source, target) {
            return Ok(0);
        }
        tracing::debug!(%source, %target, "adding transitive edge");
        self.graph.add_edge(source, target, attrs.into_transitive())?;
        Ok(1)
    }

    /// Merge residues of `protoform` that sit at the same location.
    pub fn merge_residues(&mut self, protoform: NodeId) -> GraphResult<BookkeepingReport> {
        let groups = {
            let ident = self.identifier();
            let mut by_loc: BTreeMap<i64, Vec<NodeId>> = BTreeMap::new();
            for residue in ident.ancestors_of_type(protoform, MetaType::Residue)? {
                if let Some(loc) = ident.residue_loc(residue, protoform)? {
                    by_loc.entry(loc).or_default().push(residue);
                }
            }
            by_loc
        };

        let mut report = BookkeepingReport::default();
        for (loc, residues) in groups {
            if residues.len() < 2 {
                continue;
            }
            let merged = self.graph.merge_nodes(&residues)?;
            tracing::debug!(loc, count = residues.len(), into = %merged, "merged duplicate residues");
            report.residues_merged += residues.len() - 1;
        }
        Ok(report)
    }

    /// Attach every located residue to each region and site whose range
    /// contains it.
    pub fn reconnect_residues(
        &mut self,
        protoform: NodeId,
        residues: &BTreeSet<NodeId>,
        regions: &BTreeSet<NodeId>,
        sites: &BTreeSet<NodeId>,
    ) -> GraphResult<BookkeepingReport> {
        let mut pending = Vec::new();
        {
            let ident = self.identifier();
            let mut ranged = Vec::new();
            for fragment in regions.iter().chain(sites) {
                if let Some(range) = ident.fragment_range(*fragment, protoform)? {
                    ranged.push((*fragment, range));
                }
            }
            for residue in residues {
                let Some(loc) = ident.residue_loc(*residue, protoform)? else {
                    continue;
                };
                for (fragment, (start, end)) in &ranged {
                    if (*start..=*end).contains(&loc) {
                        pending.push((*residue, *fragment, EdgeAttrs::at(loc)));
                    }
                }
            }
        }

        let mut report = BookkeepingReport::default();
        for (residue, fragment, attrs) in pending {
            report.edges_added += self.add_shortcut(residue, fragment, attrs)?;
        }
        Ok(report)
    }

    /// Attach every site to each region whose range contains the site's.
    pub fn reconnect_sites(
        &mut self,
        protoform: NodeId,
        sites: &BTreeSet<NodeId>,
        regions: &BTreeSet<NodeId>,
    ) -> GraphResult<BookkeepingReport> {
        let mut pending = Vec::new();
        {
            let ident = self.identifier();
            let mut region_ranges = Vec::new();
            for region in regions {
                if let Some(range) = ident.fragment_range(*region, protoform)? {
                    region_ranges.push((*region, range));
                }
            }
            for site in sites {
                let Some(site_range) = ident.fragment_range(*site, protoform)? else {
                    continue;
                };
                for (region, region_range) in &region_ranges {
                    if contains_range(*region_range, site_range) {
                        pending.push((*site, *region, EdgeAttrs::range(site_range.0, site_range.1)));
                    }
                }
            }
        }

        let mut report = BookkeepingReport::default();
        for (site, region, attrs) in pending {
            report.edges_added += self.add_shortcut(site, region, attrs)?;
        }
        Ok(report)
    }

    /// Link each site of the given protoforms to the region it matches by
    /// position or name.
    pub fn connect_nested_fragments(
        &mut self,
        protoforms: &BTreeSet<NodeId>,
    ) -> GraphResult<BookkeepingReport> {
        let mut pending = Vec::new();
        {
            let ident = self.identifier();
            for protoform in protoforms {
                let regions = ident.fragment_candidates(*protoform, MetaType::Region)?;
                if regions.is_empty() {
                    continue;
                }
                for (site, candidate) in ident.fragment_candidates(*protoform, MetaType::Site)? {
                    let query = FragmentQuery {
                        name: candidate.names.first().cloned(),
                        interpro_ids: candidate.interpro_ids.clone(),
                        range: candidate.range,
                        order: None,
                    };
                    if let Some(region) = find_fragment(&query, &regions) {
                        let attrs = candidate
                            .range
                            .map_or_else(EdgeAttrs::default, |(s, e)| EdgeAttrs::range(s, e));
                        pending.push((site, region, attrs));
                    }
                }
            }
        }

        let mut report = BookkeepingReport::default();
        for (site, region, attrs) in pending {
            report.edges_added += self.add_shortcut(site, region, attrs)?;
        }
        Ok(report)
    }

    /// Close the three-level containment shapes among `touched` with
    /// shortcut edges carrying the leaf edge's positional attributes.
    pub fn connect_transitive_components(
        &mut self,
        touched: &BTreeSet<NodeId>,
    ) -> GraphResult<BookkeepingReport> {
        let candidates = live_nodes(&*self.graph, touched);
        let mut report = BookkeepingReport::default();

        for (top, middle, leaf) in TRANSITIVE_SHAPES {
            let pattern = Pattern::new()
                .node("top", top)
                .node("middle", middle)
                .node("leaf", leaf)
                .edge("middle", "top")
                .edge("leaf", "middle");
            for binding in self.graph.find_matching(&pattern, &candidates)? {
                let (top, middle, leaf) = (binding["top"], binding["middle"], binding["leaf"]);
                if self.graph.exists_edge(leaf, top) {
                    continue;
                }
                let attrs = self.graph.get_edge_attrs(leaf, middle)?.positional();
                report.edges_added += self.add_shortcut(leaf, top, attrs)?;
            }
        }
        Ok(report)
    }

    /// Run every bookkeeping step over the nodes touched by one insertion.
    ///
    /// Stale handles in either set are followed to their merged survivors.
    /// A final transitive pass closes the shapes created by reconnection, so
    /// a second invocation is a no-op.
    pub fn apply_bookkeeping(
        &mut self,
        touched: &BTreeSet<NodeId>,
        protoforms: &BTreeSet<NodeId>,
    ) -> GraphResult<BookkeepingReport> {
        let protoforms = live_nodes(&*self.graph, protoforms);
        let mut report = self.connect_nested_fragments(&protoforms)?;
        report += self.connect_transitive_components(touched)?;

        for protoform in &protoforms {
            let (residues, regions, sites) = {
                let ident = self.identifier();
                (
                    ident.ancestors_of_type(*protoform, MetaType::Residue)?,
                    ident.ancestors_of_type(*protoform, MetaType::Region)?,
                    ident.ancestors_of_type(*protoform, MetaType::Site)?,
                )
            };
            report += self.reconnect_residues(*protoform, &residues, &regions, &sites)?;
            report += self.reconnect_sites(*protoform, &sites, &regions)?;
            report += self.merge_residues(*protoform)?;
        }

        report += self.connect_transitive_components(touched)?;

        tracing::debug!(
            edges_added = report.edges_added,
            residues_merged = report.residues_merged,
            "bookkeeping applied"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::NodeData;
    use crate::store::MemoryGraphStore;

    fn edge_set(g: &MemoryGraphStore) -> BTreeSet<(NodeId, NodeId)> {
        g.edges().into_iter().collect()
    }

    #[test]
    fn transitive_closure_of_nested_chain() {
        let mut g = MemoryGraphStore::new();
        let p = g.add_node(NodeData::protoform("P"));
        let r = g.add_node(NodeData::region("R"));
        let s = g.add_node(NodeData::site("S"));
        let x = g.add_node(NodeData::residue('Y'));
        g.add_edge(r, p, EdgeAttrs::range(1, 100)).unwrap();
        g.add_edge(s, r, EdgeAttrs::range(10, 20)).unwrap();
        g.add_edge(x, s, EdgeAttrs::at(15)).unwrap();

        let touched = BTreeSet::from([p, r, s, x]);
        let report = Bookkeeper::new(&mut g)
            .connect_transitive_components(&touched)
            .unwrap();

        assert_eq!(report.edges_added, 3);
        for (a, b) in [(s, p), (x, r), (x, p)] {
            let attrs = g.get_edge_attrs(a, b).unwrap();
            assert!(attrs.is_transitive(), "{a} -> {b} should be transitive");
        }
        assert_eq!(g.get_edge_attrs(s, p).unwrap().range_bounds(), Some((10, 20)));
        assert_eq!(g.get_edge_attrs(x, p).unwrap().loc(), Some(15));
    }

    #[test]
    fn transitive_closure_ignores_nodes_outside_touched_set() {
        let mut g = MemoryGraphStore::new();
        let p = g.add_node(NodeData::protoform("P"));
        let r = g.add_node(NodeData::region("R"));
        let s = g.add_node(NodeData::site("S"));
        g.add_edge(r, p, EdgeAttrs::range(1, 100)).unwrap();
        g.add_edge(s, r, EdgeAttrs::range(10, 20)).unwrap();

        let report = Bookkeeper::new(&mut g)
            .connect_transitive_components(&BTreeSet::from([p, r]))
            .unwrap();
        assert!(report.is_noop());
        assert!(!g.exists_edge(s, p));
    }

    #[test]
    fn residue_reconnects_only_to_containing_region() {
        let mut g = MemoryGraphStore::new();
        let p = g.add_node(NodeData::protoform("P"));
        let r = g.add_node(NodeData::region("R"));
        let inside = g.add_node(NodeData::residue('S'));
        let outside = g.add_node(NodeData::residue('T'));
        g.add_edge(r, p, EdgeAttrs::range(10, 50)).unwrap();
        g.add_edge(inside, p, EdgeAttrs::at(30)).unwrap();
        g.add_edge(outside, p, EdgeAttrs::at(60)).unwrap();

        let report = Bookkeeper::new(&mut g)
            .reconnect_residues(
                p,
                &BTreeSet::from([inside, outside]),
                &BTreeSet::from([r]),
                &BTreeSet::new(),
            )
            .unwrap();

        assert_eq!(report.edges_added, 1);
        assert!(g.exists_edge(inside, r));
        assert!(!g.exists_edge(outside, r));
        assert_eq!(g.get_edge_attrs(inside, r).unwrap().loc(), Some(30));
    }

    #[test]
    fn reconnect_never_duplicates_existing_edges() {
        let mut g = MemoryGraphStore::new();
        let p = g.add_node(NodeData::protoform("P"));
        let r = g.add_node(NodeData::region("R"));
        let x = g.add_node(NodeData::residue('S'));
        g.add_edge(r, p, EdgeAttrs::range(10, 50)).unwrap();
        g.add_edge(x, p, EdgeAttrs::at(30)).unwrap();
        g.add_edge(x, r, EdgeAttrs::at(30)).unwrap();

        let report = Bookkeeper::new(&mut g)
            .reconnect_residues(p, &BTreeSet::from([x]), &BTreeSet::from([r]), &BTreeSet::new())
            .unwrap();
        assert!(report.is_noop());
        assert!(!g.get_edge_attrs(x, r).unwrap().is_transitive());
    }

    #[test]
    fn site_reconnects_to_enclosing_region() {
        let mut g = MemoryGraphStore::new();
        let p = g.add_node(NodeData::protoform("P"));
        let r = g.add_node(NodeData::region("R"));
        let inner = g.add_node(NodeData::site("inner"));
        let overlapping = g.add_node(NodeData::site("overlapping"));
        g.add_edge(r, p, EdgeAttrs::range(100, 200)).unwrap();
        g.add_edge(inner, p, EdgeAttrs::range(120, 130)).unwrap();
        g.add_edge(overlapping, p, EdgeAttrs::range(190, 210)).unwrap();

        Bookkeeper::new(&mut g)
            .reconnect_sites(p, &BTreeSet::from([inner, overlapping]), &BTreeSet::from([r]))
            .unwrap();
        assert!(g.exists_edge(inner, r));
        assert!(!g.exists_edge(overlapping, r));
    }

    #[test]
    fn duplicate_residues_merge_their_amino_acids() {
        let mut g = MemoryGraphStore::new();
        let p = g.add_node(NodeData::protoform("P"));
        let a = g.add_node(NodeData::residue('S'));
        let b = g.add_node(NodeData::residue('T'));
        let unlocated = g.add_node(NodeData::residue('Y'));
        g.add_edge(a, p, EdgeAttrs::at(42)).unwrap();
        g.add_edge(b, p, EdgeAttrs::at(42)).unwrap();
        g.add_edge(unlocated, p, EdgeAttrs::default()).unwrap();

        let report = Bookkeeper::new(&mut g).merge_residues(p).unwrap();
        assert_eq!(report.residues_merged, 1);

        let merged = g.resolve(a).unwrap();
        assert_eq!(g.resolve(b), Some(merged));
        let aa = g.node(merged).unwrap().amino_acids().unwrap();
        assert_eq!(aa, &BTreeSet::from(['S', 'T']));
        assert!(g.contains(unlocated));
    }

    #[test]
    fn nested_site_is_linked_to_matching_region() {
        let mut g = MemoryGraphStore::new();
        let p = g.add_node(NodeData::protoform("P"));
        let r = g.add_node(NodeData::region("kinase"));
        let s = g.add_node(NodeData::site("loop"));
        g.add_edge(r, p, EdgeAttrs::range(700, 980)).unwrap();
        g.add_edge(s, p, EdgeAttrs::range(850, 870)).unwrap();

        let report = Bookkeeper::new(&mut g)
            .connect_nested_fragments(&BTreeSet::from([p]))
            .unwrap();
        assert_eq!(report.edges_added, 1);
        let attrs = g.get_edge_attrs(s, r).unwrap();
        assert!(attrs.is_transitive());
        assert_eq!(attrs.range_bounds(), Some((850, 870)));
    }

    #[test]
    fn apply_bookkeeping_is_idempotent() {
        let mut g = MemoryGraphStore::new();
        let p = g.add_node(NodeData::protoform("P"));
        let r = g.add_node(NodeData::region("R"));
        let s = g.add_node(NodeData::site("S"));
        let x1 = g.add_node(NodeData::residue('S'));
        let x2 = g.add_node(NodeData::residue('T'));
        g.add_edge(r, p, EdgeAttrs::range(1, 100)).unwrap();
        g.add_edge(s, r, EdgeAttrs::range(10, 20)).unwrap();
        g.add_edge(x1, s, EdgeAttrs::at(15)).unwrap();
        g.add_edge(x2, p, EdgeAttrs::at(15)).unwrap();

        let touched = BTreeSet::from([p, r, s, x1, x2]);
        let protoforms = BTreeSet::from([p]);

        let first = Bookkeeper::new(&mut g)
            .apply_bookkeeping(&touched, &protoforms)
            .unwrap();
        assert_eq!(first.residues_merged, 1);
        let nodes = g.nodes();
        let edges = edge_set(&g);

        let second = Bookkeeper::new(&mut g)
            .apply_bookkeeping(&touched, &protoforms)
            .unwrap();
        assert!(second.is_noop(), "second pass changed the graph: {second:?}");
        assert_eq!(g.nodes(), nodes);
        assert_eq!(edge_set(&g), edges);
    }
}
