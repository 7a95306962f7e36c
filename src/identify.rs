//! Entity identification: read-only queries deciding whether a biological
//! component mentioned by a nugget already exists in a graph, and where.
//!
//! The identifier never mutates the graph. Ambiguity resolves to "no match"
//! (the caller creates a new node) and is reported through [`Diagnostics`];
//! only a structural component detached from every protoform is a hard error.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use petgraph::Direction;

use crate::attrs::{MetaType, NodeData};
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{GraphError, GraphResult, IdentifyError, IdentifyResult};
use crate::store::{NodeId, TypedGraphStore};

// ---------------------------------------------------------------------------
// Fragment matching
// ---------------------------------------------------------------------------

/// What is known about a region or site that may or may not exist yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentQuery {
    pub name: Option<String>,
    pub interpro_ids: BTreeSet<String>,
    /// Absolute `[start, end]` sequence range.
    pub range: Option<(i64, i64)>,
    /// 1-based rank among same-named fragments, ordered by start position.
    pub order: Option<i64>,
}

impl FragmentQuery {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_range(mut self, start: i64, end: i64) -> Self {
        self.range = Some((start, end));
        self
    }

    pub fn with_interpro(mut self, id: impl Into<String>) -> Self {
        self.interpro_ids.insert(id.into());
        self
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }

    fn label(&self) -> String {
        match (&self.name, self.range) {
            (Some(name), Some((s, e))) => format!("{name}[{s}-{e}]"),
            (Some(name), None) => name.clone(),
            (None, Some((s, e))) => format!("[{s}-{e}]"),
            (None, None) => self
                .interpro_ids
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// Metadata of an existing fragment, as seen from its protoform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentCandidate {
    pub names: BTreeSet<String>,
    pub interpro_ids: BTreeSet<String>,
    pub range: Option<(i64, i64)>,
    pub order: Option<i64>,
}

/// Outcome of fragment matching, before collapsing to `Option<NodeId>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentMatch {
    /// One range contains the other.
    Contained(NodeId),
    /// Exactly one candidate matched by name or InterPro id.
    Unique(NodeId),
    /// Several matched and the query's `order` picked one.
    Ordered(NodeId),
    /// Several matched and nothing disambiguates them.
    Ambiguous(Vec<NodeId>),
    NoMatch,
}

impl FragmentMatch {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Self::Contained(n) | Self::Unique(n) | Self::Ordered(n) => Some(*n),
            Self::Ambiguous(_) | Self::NoMatch => None,
        }
    }
}

pub(crate) fn contains_range(outer: (i64, i64), inner: (i64, i64)) -> bool {
    outer.0 <= inner.0 && inner.1 <= outer.1
}

fn names_overlap(query: &str, names: &BTreeSet<String>) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return false;
    }
    names.iter().any(|name| {
        let name = name.trim().to_lowercase();
        !name.is_empty() && (query.contains(&name) || name.contains(&query))
    })
}

/// Decide which candidate, if any, `query` denotes.
///
/// Positional containment wins outright. Otherwise candidates are pooled by
/// name substring or shared InterPro id; a single pooled candidate matches,
/// several are only resolved by the query's `order`.
pub fn match_fragment(
    query: &FragmentQuery,
    candidates: &[(NodeId, FragmentCandidate)],
) -> FragmentMatch {
    if let Some(range) = query.range {
        for (id, candidate) in candidates {
            if let Some(other) = candidate.range {
                if contains_range(range, other) || contains_range(other, range) {
                    return FragmentMatch::Contained(*id);
                }
            }
        }
    }

    let pool: Vec<&(NodeId, FragmentCandidate)> = candidates
        .iter()
        .filter(|(_, c)| {
            query
                .name
                .as_deref()
                .is_some_and(|name| names_overlap(name, &c.names))
                || !query.interpro_ids.is_disjoint(&c.interpro_ids)
        })
        .collect();

    match pool.as_slice() {
        [] => FragmentMatch::NoMatch,
        [(id, _)] => FragmentMatch::Unique(*id),
        _ => {
            let ids = pool.iter().map(|(id, _)| *id).collect::<Vec<_>>();
            let Some(order) = query.order else {
                return FragmentMatch::Ambiguous(ids);
            };
            let same_order: Vec<NodeId> = pool
                .iter()
                .filter(|(_, c)| c.order == Some(order))
                .map(|(id, _)| *id)
                .collect();
            if let [id] = same_order.as_slice() {
                return FragmentMatch::Ordered(*id);
            }
            // Rank by start; equal starts keep candidate order.
            let mut ranked = Vec::with_capacity(pool.len());
            for (id, c) in &pool {
                let Some((start, _)) = c.range else {
                    return FragmentMatch::Ambiguous(ids);
                };
                ranked.push((start, *id));
            }
            ranked.sort_by_key(|(start, _)| *start);
            order
                .checked_sub(1)
                .and_then(|i| usize::try_from(i).ok())
                .and_then(|i| ranked.get(i))
                .map_or(FragmentMatch::Ambiguous(ids), |(_, id)| {
                    FragmentMatch::Ordered(*id)
                })
        }
    }
}

/// [`match_fragment`] collapsed to the matching node, if any.
pub fn find_fragment(
    query: &FragmentQuery,
    candidates: &[(NodeId, FragmentCandidate)],
) -> Option<NodeId> {
    match_fragment(query, candidates).node()
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// One participant of an action, resolved to its most specific component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorBinding {
    pub protoform: NodeId,
    pub region: Option<NodeId>,
    pub site: Option<NodeId>,
}

impl ActorBinding {
    /// The component that acts: site, else region, else the protoform.
    pub fn acting(&self) -> NodeId {
        self.site.or(self.region).unwrap_or(self.protoform)
    }
}

/// Target of a modification: the modified state and what owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModTarget {
    pub state: NodeId,
    pub residue: Option<NodeId>,
    pub substrate: ActorBinding,
}

/// Role assignment of a `mod` node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModTemplate {
    pub mod_node: NodeId,
    pub enzymes: Vec<ActorBinding>,
    pub targets: Vec<ModTarget>,
}

impl ModTemplate {
    pub fn enzyme(&self) -> Option<&ActorBinding> {
        self.enzymes.first()
    }

    pub fn target(&self) -> Option<&ModTarget> {
        self.targets.first()
    }
}

/// Role assignment of a `bnd` node. Both sides are empty when the partners
/// could not be grouped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BndTemplate {
    pub bnd_node: NodeId,
    pub left: Vec<ActorBinding>,
    pub right: Vec<ActorBinding>,
}

impl BndTemplate {
    pub fn is_grouped(&self) -> bool {
        !self.left.is_empty() && !self.right.is_empty()
    }
}

fn specificity(meta_type: MetaType) -> u8 {
    match meta_type {
        MetaType::Site => 0,
        MetaType::Region => 1,
        MetaType::Protoform => 2,
        _ => 3,
    }
}

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

/// Read-only identification queries against a typed graph.
pub struct EntityIdentifier<'g, S: TypedGraphStore + ?Sized> {
    graph: &'g S,
    /// Answer attachment queries from direct (incl. transitive) edges only,
    /// instead of walking the containment chain.
    immediate: bool,
}

impl<'g, S: TypedGraphStore + ?Sized> EntityIdentifier<'g, S> {
    pub fn new(graph: &'g S) -> Self {
        Self {
            graph,
            immediate: false,
        }
    }

    /// Rely on bookkept shortcut edges for attachment queries.
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn graph(&self) -> &'g S {
        self.graph
    }

    fn bfs_of_type(
        &self,
        node: NodeId,
        meta_type: MetaType,
        direction: Direction,
    ) -> GraphResult<BTreeSet<NodeId>> {
        let step = |n: NodeId| match direction {
            Direction::Incoming => self.graph.predecessors(n),
            Direction::Outgoing => self.graph.successors(n),
        };
        let mut found = BTreeSet::new();
        let mut visited = BTreeSet::from([node]);
        let mut queue: VecDeque<NodeId> = step(node)?.into();

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            let current_type = self.graph.meta_type(current)?;
            if current_type == meta_type {
                found.insert(current);
            }
            if !current_type.is_action() || meta_type.is_action() {
                queue.extend(step(current)?);
            }
        }
        Ok(found)
    }

    /// Nodes of `meta_type` with a path to `node`, found along predecessors
    /// (components point at their owners).
    pub fn ancestors_of_type(
        &self,
        node: NodeId,
        meta_type: MetaType,
    ) -> GraphResult<BTreeSet<NodeId>> {
        self.bfs_of_type(node, meta_type, Direction::Incoming)
    }

    /// Nodes of `meta_type` reachable from `node` along successors.
    pub fn descendants_of_type(
        &self,
        node: NodeId,
        meta_type: MetaType,
    ) -> GraphResult<BTreeSet<NodeId>> {
        self.bfs_of_type(node, meta_type, Direction::Outgoing)
    }

    /// The nearest protoform above a structural node.
    pub fn get_protoform_of(&self, node: NodeId) -> IdentifyResult<NodeId> {
        if self.graph.meta_type(node)? == MetaType::Protoform {
            return Ok(node);
        }
        let mut visited = BTreeSet::from([node]);
        let mut queue: VecDeque<NodeId> = self.graph.successors(node)?.into();
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            match self.graph.meta_type(current)? {
                MetaType::Protoform => return Ok(current),
                t if t.is_action() => {}
                _ => queue.extend(self.graph.successors(current)?),
            }
        }
        Err(IdentifyError::ProtoformNotFound {
            node: node.to_string(),
        })
    }

    fn attached(&self, node: NodeId, meta_type: MetaType) -> GraphResult<BTreeSet<NodeId>> {
        if self.immediate {
            let mut out = BTreeSet::new();
            for pred in self.graph.predecessors(node)? {
                if self.graph.meta_type(pred)? == meta_type {
                    out.insert(pred);
                }
            }
            Ok(out)
        } else {
            self.ancestors_of_type(node, meta_type)
        }
    }

    pub fn get_attached_regions(&self, node: NodeId) -> GraphResult<BTreeSet<NodeId>> {
        self.attached(node, MetaType::Region)
    }

    pub fn get_attached_sites(&self, node: NodeId) -> GraphResult<BTreeSet<NodeId>> {
        self.attached(node, MetaType::Site)
    }

    pub fn get_attached_residues(&self, node: NodeId) -> GraphResult<BTreeSet<NodeId>> {
        self.attached(node, MetaType::Residue)
    }

    /// States directly attached to `node` (never those of its components).
    pub fn get_attached_states(&self, node: NodeId) -> GraphResult<BTreeSet<NodeId>> {
        let mut out = BTreeSet::new();
        for pred in self.graph.predecessors(node)? {
            if self.graph.meta_type(pred)? == MetaType::State {
                out.insert(pred);
            }
        }
        Ok(out)
    }

    /// Absolute range of a region or site: from its edge to the protoform if
    /// present, else from the first owner edge that carries one.
    pub fn fragment_range(
        &self,
        fragment: NodeId,
        protoform: NodeId,
    ) -> GraphResult<Option<(i64, i64)>> {
        if self.graph.exists_edge(fragment, protoform) {
            if let Some(range) = self.graph.get_edge_attrs(fragment, protoform)?.range_bounds() {
                return Ok(Some(range));
            }
        }
        for owner in self.graph.successors(fragment)? {
            if self.graph.meta_type(owner)?.is_action() {
                continue;
            }
            if let Some(range) = self.graph.get_edge_attrs(fragment, owner)?.range_bounds() {
                return Ok(Some(range));
            }
        }
        Ok(None)
    }

    /// Sequence location of a residue, read like [`Self::fragment_range`].
    pub fn residue_loc(&self, residue: NodeId, protoform: NodeId) -> GraphResult<Option<i64>> {
        if self.graph.exists_edge(residue, protoform) {
            if let Some(loc) = self.graph.get_edge_attrs(residue, protoform)?.loc() {
                return Ok(Some(loc));
            }
        }
        for owner in self.graph.successors(residue)? {
            if self.graph.meta_type(owner)?.is_action() {
                continue;
            }
            if let Some(loc) = self.graph.get_edge_attrs(residue, owner)?.loc() {
                return Ok(Some(loc));
            }
        }
        Ok(None)
    }

    /// Matching metadata for every region or site of `protoform`.
    pub fn fragment_candidates(
        &self,
        protoform: NodeId,
        meta_type: MetaType,
    ) -> GraphResult<Vec<(NodeId, FragmentCandidate)>> {
        let mut out = Vec::new();
        for fragment in self.attached(protoform, meta_type)? {
            let Some(attrs) = self.graph.node(fragment)?.fragment() else {
                continue;
            };
            out.push((
                fragment,
                FragmentCandidate {
                    names: attrs.names.clone(),
                    interpro_ids: attrs.interpro_ids.clone(),
                    range: self.fragment_range(fragment, protoform)?,
                    order: attrs.order.first().copied(),
                },
            ));
        }
        Ok(out)
    }

    /// The protoform carrying `uniprot_id`, if any.
    pub fn identify_protoform(&self, uniprot_id: &str) -> Option<NodeId> {
        self.graph
            .nodes_of_type(MetaType::Protoform)
            .into_iter()
            .find(|p| {
                self.graph.node(*p).is_ok_and(|data| match data {
                    NodeData::Protoform(attrs) => {
                        attrs.uniprot_id.contains(uniprot_id)
                    }
                    _ => false,
                })
            })
    }

    fn identify_fragment(
        &self,
        query: &FragmentQuery,
        protoform: NodeId,
        meta_type: MetaType,
        diagnostics: &mut Diagnostics,
    ) -> GraphResult<Option<NodeId>> {
        let candidates = self.fragment_candidates(protoform, meta_type)?;
        let result = match_fragment(query, &candidates);
        if let FragmentMatch::Ambiguous(candidates) = &result {
            diagnostics.push(Warning::AmbiguousFragment {
                query: query.label(),
                candidates: candidates.clone(),
            });
        }
        Ok(result.node())
    }

    pub fn identify_region(
        &self,
        query: &FragmentQuery,
        protoform: NodeId,
        diagnostics: &mut Diagnostics,
    ) -> GraphResult<Option<NodeId>> {
        self.identify_fragment(query, protoform, MetaType::Region, diagnostics)
    }

    pub fn identify_site(
        &self,
        query: &FragmentQuery,
        protoform: NodeId,
        diagnostics: &mut Diagnostics,
    ) -> GraphResult<Option<NodeId>> {
        self.identify_fragment(query, protoform, MetaType::Site, diagnostics)
    }

    /// The residue of `protoform` at `loc`, if any.
    pub fn identify_residue(&self, loc: i64, protoform: NodeId) -> GraphResult<Option<NodeId>> {
        for residue in self.get_attached_residues(protoform)? {
            if self.residue_loc(residue, protoform)? == Some(loc) {
                return Ok(Some(residue));
            }
        }
        Ok(None)
    }

    /// The state named `name` directly attached to `owner`, if any.
    pub fn identify_state(&self, name: &str, owner: NodeId) -> GraphResult<Option<NodeId>> {
        for state in self.get_attached_states(owner)? {
            let matches = match self.graph.node(state)? {
                NodeData::State(attrs) => {
                    attrs.name.iter().any(|n| n.eq_ignore_ascii_case(name))
                }
                _ => false,
            };
            if matches {
                return Ok(Some(state));
            }
        }
        Ok(None)
    }

    /// Resolve a component to the protoform and fragments it belongs to.
    pub fn actor_of(&self, component: NodeId) -> IdentifyResult<ActorBinding> {
        let protoform = self.get_protoform_of(component)?;
        let unique = |meta_type: MetaType| -> GraphResult<Option<NodeId>> {
            if self.graph.meta_type(component)? == meta_type {
                return Ok(Some(component));
            }
            let above = self.descendants_of_type(component, meta_type)?;
            Ok(match above.len() {
                1 => above.first().copied(),
                _ => None,
            })
        };
        Ok(ActorBinding {
            protoform,
            region: unique(MetaType::Region)?,
            site: unique(MetaType::Site)?,
        })
    }

    fn structural_neighbors(&self, nodes: Vec<NodeId>) -> GraphResult<Vec<NodeId>> {
        let mut out = Vec::with_capacity(nodes.len());
        for n in nodes {
            if self.graph.meta_type(n)?.is_structural() {
                out.push(n);
            }
        }
        Ok(out)
    }

    fn expect_type(&self, node: NodeId, expected: MetaType) -> GraphResult<()> {
        let actual = self.graph.meta_type(node)?;
        if actual == expected {
            Ok(())
        } else {
            Err(GraphError::MetaTypeMismatch { expected, actual })
        }
    }

    /// Classify the neighbours of a `mod` node into enzymes and targets.
    ///
    /// Predecessors are grouped by protoform; within a group the most
    /// specific component with a direct edge to the action is the actor.
    pub fn identify_mod_template(&self, mod_node: NodeId) -> IdentifyResult<ModTemplate> {
        self.expect_type(mod_node, MetaType::Mod)?;

        let preds = self.structural_neighbors(self.graph.predecessors(mod_node)?)?;
        let mut by_protoform: BTreeMap<NodeId, (u8, NodeId)> = BTreeMap::new();
        for pred in preds {
            let protoform = self.get_protoform_of(pred)?;
            let rank = specificity(self.graph.meta_type(pred)?);
            let entry = by_protoform.entry(protoform).or_insert((rank, pred));
            if rank < entry.0 {
                *entry = (rank, pred);
            }
        }
        let enzymes = by_protoform
            .into_values()
            .map(|(_, component)| self.actor_of(component))
            .collect::<IdentifyResult<Vec<_>>>()?;

        let mut targets = Vec::new();
        for state in self.graph.successors(mod_node)? {
            if self.graph.meta_type(state)? != MetaType::State {
                continue;
            }
            let owner = self
                .structural_neighbors(self.graph.successors(state)?)?
                .into_iter()
                .next()
                .ok_or_else(|| IdentifyError::ProtoformNotFound {
                    node: state.to_string(),
                })?;
            let residue = match self.graph.meta_type(owner)? {
                MetaType::Residue => Some(owner),
                _ => None,
            };
            targets.push(ModTarget {
                state,
                residue,
                substrate: self.actor_of(owner)?,
            });
        }

        Ok(ModTemplate {
            mod_node,
            enzymes,
            targets,
        })
    }

    /// Split the partners of a `bnd` node into left and right sides.
    ///
    /// More than two partners are grouped by uniprot accession; when that does
    /// not yield exactly two groups both sides stay empty and a warning is
    /// recorded.
    pub fn identify_bnd_template(
        &self,
        bnd_node: NodeId,
        diagnostics: &mut Diagnostics,
    ) -> IdentifyResult<BndTemplate> {
        self.expect_type(bnd_node, MetaType::Bnd)?;

        let partners = self.structural_neighbors(self.graph.predecessors(bnd_node)?)?;
        let mut actors = Vec::with_capacity(partners.len());
        for p in &partners {
            actors.push(self.actor_of(*p)?);
        }

        let (left, right) = match actors.as_slice() {
            [] => (vec![], vec![]),
            [only] => (vec![*only], vec![*only]),
            [a, b] => (vec![*a], vec![*b]),
            _ => {
                let mut groups: Vec<(String, Vec<ActorBinding>)> = Vec::new();
                for actor in &actors {
                    let key = self
                        .graph
                        .node(actor.protoform)?
                        .uniprot_id()
                        .unwrap_or_default()
                        .to_string();
                    match groups.iter_mut().find(|(k, _)| *k == key) {
                        Some((_, members)) => members.push(*actor),
                        None => groups.push((key, vec![*actor])),
                    }
                }
                match <[_; 2]>::try_from(groups) {
                    Ok([(_, left), (_, right)]) => (left, right),
                    Err(_) => (vec![], vec![]),
                }
            }
        };

        let template = BndTemplate {
            bnd_node,
            left,
            right,
        };
        if !template.is_grouped() {
            diagnostics.push(Warning::UngroupablePartners {
                bnd: bnd_node,
                partners,
            });
        }
        Ok(template)
    }
}
