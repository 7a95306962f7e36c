//! Semantic pattern recognition.
//!
//! After a nugget has been merged and bookkept, [`SemanticEngine`] checks
//! whether it instantiates a known motif, completes the nodes the motif
//! implies, merges redundant action nodes and records a [`SemanticRelation`]
//! in the [`SemanticRegistry`].
//!
//! Two motifs are recognised:
//!
//! - **phosphorylation**: a `mod` with value `true` on a `phosphorylation`
//!   state, performed by a region tagged `protein_kinase`
//! - **SH2–pY binding**: a `bnd` between a region tagged `sh2_domain` and a
//!   partner carrying a phosphorylated tyrosine
//!
//! Recognition never fails an insertion on ambiguity: it stops with a
//! [`Warning`] and [`SemanticOutcome::Ambiguous`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attrs::{AttrValue, EdgeAttrs, MetaType, NodeData, attrs_from, keys};
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{GraphError, GraphResult, KbResult};
use crate::identify::{ActorBinding, EntityIdentifier, contains_range};
use crate::nugget::{Nugget, NuggetKind};
use crate::store::{Binding, NodeId, Rule, TypedGraphStore};

pub const PHOSPHORYLATION: &str = "phosphorylation";
pub const ACTIVITY: &str = "activity";

// ---------------------------------------------------------------------------
// Roles, motifs, relations
// ---------------------------------------------------------------------------

/// Fixed role labels of the recognised motifs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticRole {
    Phospho,
    TargetState,
    TargetResidue,
    ProteinKinase,
    ProteinKinaseActivity,
    Sh2Domain,
    #[serde(rename = "sh2_pY_binding")]
    Sh2PyBinding,
    #[serde(rename = "pY_site")]
    PySite,
    #[serde(rename = "pY_residue")]
    PyResidue,
    #[serde(rename = "pY_state")]
    PyState,
}

impl SemanticRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Phospho => "phospho",
            Self::TargetState => "target_state",
            Self::TargetResidue => "target_residue",
            Self::ProteinKinase => "protein_kinase",
            Self::ProteinKinaseActivity => "protein_kinase_activity",
            Self::Sh2Domain => "sh2_domain",
            Self::Sh2PyBinding => "sh2_pY_binding",
            Self::PySite => "pY_site",
            Self::PyResidue => "pY_residue",
            Self::PyState => "pY_state",
        }
    }
}

impl fmt::Display for SemanticRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Motif {
    Phosphorylation,
    Sh2PyBinding,
}

impl fmt::Display for Motif {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Phosphorylation => f.write_str("phosphorylation"),
            Self::Sh2PyBinding => f.write_str("sh2_pY_binding"),
        }
    }
}

/// How recognition ended for one nugget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "motif", rename_all = "snake_case")]
pub enum SemanticOutcome {
    Registered(Motif),
    NotRecognized,
    /// A motif was triggered but could not be resolved; a warning was emitted.
    Ambiguous,
}

/// Roles of one recognised motif, on the nugget and on the action graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticRelation {
    pub motif: Motif,
    pub nugget_roles: BTreeMap<NodeId, BTreeSet<SemanticRole>>,
    pub action_graph_roles: BTreeMap<NodeId, BTreeSet<SemanticRole>>,
}

impl SemanticRelation {
    pub fn new(motif: Motif) -> Self {
        Self {
            motif,
            nugget_roles: BTreeMap::new(),
            action_graph_roles: BTreeMap::new(),
        }
    }

    /// Action-graph nodes playing `role`.
    pub fn nodes_with(&self, role: SemanticRole) -> Vec<NodeId> {
        self.action_graph_roles
            .iter()
            .filter(|(_, roles)| roles.contains(&role))
            .map(|(node, _)| *node)
            .collect()
    }
}

fn rekey_roles<S: TypedGraphStore + ?Sized>(
    roles: &mut BTreeMap<NodeId, BTreeSet<SemanticRole>>,
    store: &S,
) {
    let mut rekeyed: BTreeMap<NodeId, BTreeSet<SemanticRole>> = BTreeMap::new();
    for (node, set) in std::mem::take(roles) {
        if let Some(live) = store.resolve(node) {
            rekeyed.entry(live).or_default().extend(set);
        }
    }
    *roles = rekeyed;
}

/// Semantic tags of action-graph nodes and the relations of every nugget.
#[derive(Debug, Clone, Default)]
pub struct SemanticRegistry {
    tags: BTreeMap<NodeId, BTreeSet<SemanticRole>>,
    relations: BTreeMap<String, SemanticRelation>,
}

impl SemanticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(&mut self, node: NodeId, role: SemanticRole) {
        self.tags.entry(node).or_default().insert(role);
    }

    pub fn has_tag(&self, node: NodeId, role: SemanticRole) -> bool {
        self.tags.get(&node).is_some_and(|roles| roles.contains(&role))
    }

    pub fn roles(&self, node: NodeId) -> Option<&BTreeSet<SemanticRole>> {
        self.tags.get(&node)
    }

    pub fn tags(&self) -> &BTreeMap<NodeId, BTreeSet<SemanticRole>> {
        &self.tags
    }

    /// Nodes tagged with `role`.
    pub fn tagged(&self, role: SemanticRole) -> Vec<NodeId> {
        self.tags
            .iter()
            .filter(|(_, roles)| roles.contains(&role))
            .map(|(node, _)| *node)
            .collect()
    }

    pub fn register(&mut self, nugget_id: impl Into<String>, relation: SemanticRelation) {
        self.relations.insert(nugget_id.into(), relation);
    }

    pub fn relation(&self, nugget_id: &str) -> Option<&SemanticRelation> {
        self.relations.get(nugget_id)
    }

    pub fn relations(&self) -> &BTreeMap<String, SemanticRelation> {
        &self.relations
    }

    /// Follow merges in `store`: merged nodes pool their roles, deleted nodes
    /// lose them.
    pub fn rekey<S: TypedGraphStore + ?Sized>(&mut self, store: &S) {
        rekey_roles(&mut self.tags, store);
        for relation in self.relations.values_mut() {
            rekey_roles(&mut relation.action_graph_roles, store);
        }
    }

    pub fn clear(&mut self) {
        self.tags.clear();
        self.relations.clear();
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

enum RegionResolution {
    /// The nugget names the region and it carries the role.
    Explicit { nugget: NodeId, image: NodeId },
    /// The nugget names no region; the protoform has exactly one tagged.
    Inferred(NodeId),
    /// The nugget names only a site, lying in exactly one tagged region.
    Enclosing { site: NodeId, image: NodeId },
    /// The nugget names a region, or a site outside every region, that lacks
    /// the role.
    Untagged(NodeId),
    Missing,
    Ambiguous(Vec<NodeId>),
}

fn bound(binding: &Binding, key: &str) -> GraphResult<NodeId> {
    binding
        .get(key)
        .copied()
        .ok_or_else(|| GraphError::UnboundRuleNode {
            key: key.to_string(),
        })
}

fn named(data: &NodeData, name: &str) -> bool {
    data.name().is_some_and(|n| n.eq_ignore_ascii_case(name))
}

fn tests_true(data: &NodeData) -> bool {
    data.test().is_some_and(|t| t.contains(&true))
}

/// Find a tyrosine residue of `protoform` with a true phosphorylation state.
fn phospho_tyrosine<S: TypedGraphStore + ?Sized>(
    graph: &S,
    protoform: NodeId,
) -> GraphResult<Option<(NodeId, NodeId)>> {
    let ident = EntityIdentifier::new(graph);
    for residue in ident.ancestors_of_type(protoform, MetaType::Residue)? {
        let is_tyrosine = graph
            .node(residue)?
            .amino_acids()
            .is_some_and(|aa| aa.contains(&'Y'));
        if !is_tyrosine {
            continue;
        }
        for state in ident.get_attached_states(residue)? {
            let data = graph.node(state)?;
            if named(data, PHOSPHORYLATION) && tests_true(data) {
                return Ok(Some((residue, state)));
            }
        }
    }
    Ok(None)
}

/// Applies motif recognition to nuggets already merged into an action graph.
pub struct SemanticEngine<'a, S: TypedGraphStore + ?Sized> {
    action_graph: &'a mut S,
    registry: &'a mut SemanticRegistry,
}

impl<'a, S: TypedGraphStore + ?Sized> SemanticEngine<'a, S> {
    pub fn new(action_graph: &'a mut S, registry: &'a mut SemanticRegistry) -> Self {
        Self {
            action_graph,
            registry,
        }
    }

    fn image(&self, nugget: &Nugget, node: NodeId) -> GraphResult<NodeId> {
        nugget
            .image(node)
            .and_then(|n| self.action_graph.resolve(n))
            .ok_or_else(|| GraphError::NodeNotFound {
                node: node.to_string(),
            })
    }

    fn resolve_region(
        &self,
        nugget: &Nugget,
        actor: &ActorBinding,
        role: SemanticRole,
    ) -> KbResult<RegionResolution> {
        if let Some(region) = actor.region {
            let image = self.image(nugget, region)?;
            return Ok(if self.registry.has_tag(image, role) {
                RegionResolution::Explicit {
                    nugget: region,
                    image,
                }
            } else {
                RegionResolution::Untagged(image)
            });
        }

        let protoform = self.image(nugget, actor.protoform)?;
        let ident = EntityIdentifier::new(&*self.action_graph);
        let tagged: Vec<NodeId> = ident
            .ancestors_of_type(protoform, MetaType::Region)?
            .into_iter()
            .filter(|r| self.registry.has_tag(*r, role))
            .collect();

        let Some(site) = actor.site else {
            return Ok(match tagged.len() {
                0 => RegionResolution::Missing,
                1 => RegionResolution::Inferred(tagged[0]),
                _ => RegionResolution::Ambiguous(tagged),
            });
        };

        // A named site only acts through a tagged region enclosing it, either
        // by an existing edge or by position.
        let site_image = self.image(nugget, site)?;
        let above = ident.descendants_of_type(site_image, MetaType::Region)?;
        let site_range = ident.fragment_range(site_image, protoform)?;
        let mut enclosing = Vec::new();
        for region in tagged {
            let by_position = match (ident.fragment_range(region, protoform)?, site_range) {
                (Some(outer), Some(inner)) => contains_range(outer, inner),
                _ => false,
            };
            if above.contains(&region) || by_position {
                enclosing.push(region);
            }
        }
        Ok(match enclosing.len() {
            0 => RegionResolution::Untagged(site_image),
            1 => RegionResolution::Enclosing {
                site,
                image: enclosing[0],
            },
            _ => RegionResolution::Ambiguous(enclosing),
        })
    }

    /// Add the action-graph region `image` to the nugget as the acting
    /// component of its action, and link it to the action in the action graph.
    /// A `site` named by the nugget is placed inside the new region.
    fn autocomplete_region(
        &mut self,
        nugget: &mut Nugget,
        protoform: NodeId,
        image: NodeId,
        site: Option<NodeId>,
    ) -> KbResult<NodeId> {
        let data = self.action_graph.node(image)?.clone();
        let protoform_image = self.image(nugget, protoform)?;
        let position = EntityIdentifier::new(&*self.action_graph)
            .fragment_range(image, protoform_image)?
            .map_or_else(EdgeAttrs::default, |(s, e)| EdgeAttrs::range(s, e));

        let rule = Rule::new()
            .add_node("region", data)
            .add_edge("region", "protoform", position)
            .add_edge("region", "action", EdgeAttrs::default());
        let instance = Binding::from([
            ("protoform".to_string(), protoform),
            ("action".to_string(), nugget.action),
        ]);
        let result = nugget
            .graph
            .rewrite(&rule, &instance, "autocomplete acting region")?;
        let region = bound(&result, "region")?;
        nugget.typing.insert(region, image);

        if let Some(site) = site {
            let site_image = self.image(nugget, site)?;
            let rule = Rule::new().add_edge("site", "region", EdgeAttrs::default());
            nugget.graph.rewrite(
                &rule,
                &Binding::from([
                    ("site".to_string(), site),
                    ("region".to_string(), region),
                ]),
                "place acting site in region",
            )?;
            if !self.action_graph.exists_edge(site_image, image) {
                self.action_graph.rewrite(
                    &rule,
                    &Binding::from([
                        ("site".to_string(), site_image),
                        ("region".to_string(), image),
                    ]),
                    "place acting site in region",
                )?;
            }
        }

        let action = self.image(nugget, nugget.action)?;
        let rule = Rule::new().add_edge("region", "action", EdgeAttrs::default());
        let instance = Binding::from([
            ("region".to_string(), image),
            ("action".to_string(), action),
        ]);
        self.action_graph
            .rewrite(&rule, &instance, "link acting region to action")?;
        Ok(region)
    }

    /// Merge action nodes assumed to denote one mechanism.
    fn merge_actions(&mut self, nugget: &mut Nugget, actions: BTreeSet<NodeId>) -> KbResult<()> {
        if actions.len() < 2 {
            return Ok(());
        }
        let keys: Vec<String> = (0..actions.len()).map(|i| format!("action{i}")).collect();
        let instance: Binding = keys.iter().cloned().zip(actions.iter().copied()).collect();
        let rule = Rule::new().merge(keys, "merged");
        let result = self
            .action_graph
            .rewrite(&rule, &instance, "merge actions of one mechanism")?;
        let merged = bound(&result, "merged")?;
        tracing::debug!(
            count = actions.len(),
            into = %merged,
            nugget = %nugget.id,
            "merged action nodes"
        );
        nugget.rekey(&*self.action_graph);
        self.registry.rekey(&*self.action_graph);
        Ok(())
    }

    fn register(
        &mut self,
        nugget: &Nugget,
        motif: Motif,
        roles: &[(NodeId, SemanticRole)],
    ) -> KbResult<SemanticOutcome> {
        let mut relation = SemanticRelation::new(motif);
        for &(node, role) in roles {
            relation.nugget_roles.entry(node).or_default().insert(role);
            let image = self.image(nugget, node)?;
            relation
                .action_graph_roles
                .entry(image)
                .or_default()
                .insert(role);
            self.registry.tag(image, role);
        }
        tracing::info!(nugget = %nugget.id, %motif, "semantic relation registered");
        self.registry.register(nugget.id.clone(), relation);
        Ok(SemanticOutcome::Registered(motif))
    }

    /// Recognise a kinase phosphorylation in a `mod` nugget.
    pub fn apply_mod_semantics(
        &mut self,
        nugget: &mut Nugget,
        diagnostics: &mut Diagnostics,
    ) -> KbResult<SemanticOutcome> {
        if nugget.kind != NuggetKind::Mod {
            return Ok(SemanticOutcome::NotRecognized);
        }
        let template = EntityIdentifier::new(&nugget.graph).identify_mod_template(nugget.action)?;
        let activates = nugget
            .graph
            .node(nugget.action)?
            .mod_value()
            .is_some_and(|v| v.contains(&true));
        let target = template.targets.iter().copied().find(|t| {
            nugget
                .graph
                .node(t.state)
                .is_ok_and(|data| named(data, PHOSPHORYLATION))
        });
        let (Some(target), Some(enzyme), true) = (target, template.enzyme().copied(), activates)
        else {
            return Ok(SemanticOutcome::NotRecognized);
        };

        let (region, kinase) =
            match self.resolve_region(nugget, &enzyme, SemanticRole::ProteinKinase)? {
                RegionResolution::Explicit {
                    nugget: region,
                    image,
                } => (region, image),
                RegionResolution::Inferred(image) => {
                    let region = self.autocomplete_region(nugget, enzyme.protoform, image, None)?;
                    (region, image)
                }
                RegionResolution::Enclosing { site, image } => {
                    let region =
                        self.autocomplete_region(nugget, enzyme.protoform, image, Some(site))?;
                    (region, image)
                }
                RegionResolution::Untagged(region) => {
                    diagnostics.push(Warning::UntaggedEnzymeRegion { region });
                    return Ok(SemanticOutcome::Ambiguous);
                }
                RegionResolution::Missing => {
                    let protoform = self.image(nugget, enzyme.protoform)?;
                    diagnostics.push(Warning::MissingKinase { protoform });
                    return Ok(SemanticOutcome::Ambiguous);
                }
                RegionResolution::Ambiguous(candidates) => {
                    let protoform = self.image(nugget, enzyme.protoform)?;
                    diagnostics.push(Warning::AmbiguousKinase {
                        protoform,
                        candidates,
                    });
                    return Ok(SemanticOutcome::Ambiguous);
                }
            };

        // Same kinase region, same mechanism.
        let mut actions = BTreeSet::from([self.image(nugget, nugget.action)?]);
        for succ in self.action_graph.successors(kinase)? {
            if self.action_graph.meta_type(succ)? == MetaType::Mod {
                actions.insert(succ);
            }
        }
        self.merge_actions(nugget, actions)?;
        let kinase = self.image(nugget, region)?;

        let activity = self.autocomplete_activity(nugget, region, kinase)?;

        let mut roles = vec![
            (nugget.action, SemanticRole::Phospho),
            (target.state, SemanticRole::TargetState),
            (region, SemanticRole::ProteinKinase),
            (activity, SemanticRole::ProteinKinaseActivity),
        ];
        if let Some(residue) = target.residue {
            roles.push((residue, SemanticRole::TargetResidue));
        }
        self.register(nugget, Motif::Phosphorylation, &roles)
    }

    /// Make sure the nugget asserts `activity = true` on the kinase region,
    /// reusing the action graph's activity state when there is one.
    fn autocomplete_activity(
        &mut self,
        nugget: &mut Nugget,
        region: NodeId,
        kinase: NodeId,
    ) -> KbResult<NodeId> {
        if let Some(state) = EntityIdentifier::new(&nugget.graph).identify_state(ACTIVITY, region)? {
            if tests_true(nugget.graph.node(state)?) {
                return Ok(state);
            }
        }

        let existing = EntityIdentifier::new(&*self.action_graph).identify_state(ACTIVITY, kinase)?;
        let image = match existing {
            Some(state) => {
                let rule = Rule::new().add_node_attrs(
                    "state",
                    attrs_from([(keys::TEST, [AttrValue::Bool(true)])]),
                );
                let instance = Binding::from([("state".to_string(), state)]);
                self.action_graph
                    .rewrite(&rule, &instance, "reuse kinase activity")?;
                state
            }
            None => {
                let rule = Rule::new()
                    .add_node("activity", NodeData::state(ACTIVITY, true))
                    .add_edge("activity", "region", EdgeAttrs::default());
                let instance = Binding::from([("region".to_string(), kinase)]);
                let result = self
                    .action_graph
                    .rewrite(&rule, &instance, "add kinase activity")?;
                bound(&result, "activity")?
            }
        };

        let rule = Rule::new()
            .add_node("activity", NodeData::state(ACTIVITY, true))
            .add_edge("activity", "region", EdgeAttrs::default());
        let instance = Binding::from([("region".to_string(), region)]);
        let result = nugget
            .graph
            .rewrite(&rule, &instance, "autocomplete kinase activity")?;
        let activity = bound(&result, "activity")?;
        nugget.typing.insert(activity, image);
        Ok(activity)
    }

    /// Recognise an SH2 domain binding a phosphorylated tyrosine in a `bnd`
    /// nugget.
    pub fn apply_bnd_semantics(
        &mut self,
        nugget: &mut Nugget,
        diagnostics: &mut Diagnostics,
    ) -> KbResult<SemanticOutcome> {
        if nugget.kind != NuggetKind::Bnd {
            return Ok(SemanticOutcome::NotRecognized);
        }
        let template = EntityIdentifier::new(&nugget.graph)
            .identify_bnd_template(nugget.action, diagnostics)?;
        if !template.is_grouped() {
            return Ok(SemanticOutcome::NotRecognized);
        }

        let mut resolved = None;
        for (sh2_side, partner_side) in [
            (&template.left, &template.right),
            (&template.right, &template.left),
        ] {
            let ([actor], Some(partner)) = (sh2_side.as_slice(), partner_side.first()) else {
                continue;
            };
            match self.resolve_region(nugget, actor, SemanticRole::Sh2Domain)? {
                RegionResolution::Explicit {
                    nugget: region,
                    image,
                } => {
                    resolved = Some((*actor, Some(region), image, *partner));
                    break;
                }
                RegionResolution::Inferred(image) | RegionResolution::Enclosing { image, .. } => {
                    resolved = Some((*actor, None, image, *partner));
                    break;
                }
                RegionResolution::Ambiguous(candidates) => {
                    let protoform = self.image(nugget, actor.protoform)?;
                    diagnostics.push(Warning::AmbiguousSh2Domain {
                        protoform,
                        candidates,
                    });
                    return Ok(SemanticOutcome::Ambiguous);
                }
                RegionResolution::Untagged(_) | RegionResolution::Missing => {}
            }
        }
        let Some((sh2_actor, explicit, sh2, partner)) = resolved else {
            return Ok(SemanticOutcome::NotRecognized);
        };

        let Some((residue, state)) = phospho_tyrosine(&nugget.graph, partner.protoform)? else {
            let bnd = self.image(nugget, nugget.action)?;
            diagnostics.push(Warning::MissingPhosphoTyrosine { bnd });
            return Ok(SemanticOutcome::Ambiguous);
        };

        let region = match explicit {
            Some(region) => region,
            None => self.autocomplete_region(nugget, sh2_actor.protoform, sh2, sh2_actor.site)?,
        };

        // Earlier bindings of the same SH2 domain to the same partner protein.
        let action = self.image(nugget, nugget.action)?;
        let partner_protoform = self.image(nugget, partner.protoform)?;
        let mut actions = BTreeSet::from([action]);
        {
            let ident = EntityIdentifier::new(&*self.action_graph);
            for succ in self.action_graph.successors(sh2)? {
                if succ == action || self.action_graph.meta_type(succ)? != MetaType::Bnd {
                    continue;
                }
                let mut partners = BTreeSet::new();
                for pred in self.action_graph.predecessors(succ)? {
                    if self.action_graph.meta_type(pred)?.is_structural() {
                        partners.insert(ident.get_protoform_of(pred)?);
                    }
                }
                if partners.contains(&partner_protoform) {
                    actions.insert(succ);
                }
            }
        }
        self.merge_actions(nugget, actions)?;

        let mut roles = vec![
            (nugget.action, SemanticRole::Sh2PyBinding),
            (region, SemanticRole::Sh2Domain),
            (residue, SemanticRole::PyResidue),
            (state, SemanticRole::PyState),
        ];
        if let Some(site) = partner.site {
            roles.push((site, SemanticRole::PySite));
        }
        self.register(nugget, Motif::Sh2PyBinding, &roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nugget::{
        ActorDesc, BndInteraction, Interaction, ModInteraction, NuggetGenerator, RegionDesc,
        ResidueDesc, SiteDesc, StateDesc, TargetDesc,
    };
    use crate::store::MemoryGraphStore;

    /// Copy a nugget into the action graph, reusing protoforms by accession.
    fn embed(ag: &mut MemoryGraphStore, nugget: &mut Nugget) {
        for n in nugget.graph.nodes() {
            let data = nugget.graph.node(n).unwrap().clone();
            let existing = data
                .uniprot_id()
                .and_then(|acc| EntityIdentifier::new(&*ag).identify_protoform(acc));
            let image = existing.unwrap_or_else(|| ag.add_node(data));
            nugget.typing.insert(n, image);
        }
        for (s, t) in nugget.graph.edges() {
            let attrs = nugget.graph.get_edge_attrs(s, t).unwrap();
            ag.add_edge(nugget.typing[&s], nugget.typing[&t], attrs).unwrap();
        }
    }

    fn phosphorylation(enzyme: ActorDesc, loc: i64) -> Interaction {
        Interaction::Mod(ModInteraction {
            enzyme,
            substrate: ActorDesc::protoform("P00533"),
            target: TargetDesc {
                residue: Some(ResidueDesc::new('Y', loc)),
                state: StateDesc::new(PHOSPHORYLATION, false),
            },
            value: true,
            desc: None,
        })
    }

    fn egfr_with_kinase(registry: &mut SemanticRegistry) -> (MemoryGraphStore, NodeId, NodeId) {
        let mut ag = MemoryGraphStore::new();
        let egfr = ag.add_node(NodeData::protoform("P00533"));
        let kinase = ag.add_node(NodeData::region("Protein kinase"));
        ag.add_edge(kinase, egfr, EdgeAttrs::range(700, 980)).unwrap();
        registry.tag(kinase, SemanticRole::ProteinKinase);
        (ag, egfr, kinase)
    }

    fn insert(
        ag: &mut MemoryGraphStore,
        registry: &mut SemanticRegistry,
        id: &str,
        interaction: &Interaction,
    ) -> (Nugget, SemanticOutcome, Diagnostics) {
        let mut nugget = NuggetGenerator::generate(id, interaction).unwrap();
        embed(ag, &mut nugget);
        let mut diag = Diagnostics::new();
        let mut engine = SemanticEngine::new(ag, registry);
        let outcome = match nugget.kind {
            NuggetKind::Mod => engine.apply_mod_semantics(&mut nugget, &mut diag),
            NuggetKind::Bnd => engine.apply_bnd_semantics(&mut nugget, &mut diag),
        }
        .unwrap();
        (nugget, outcome, diag)
    }

    #[test]
    fn unspecified_enzyme_region_is_inferred_and_completed() {
        let mut registry = SemanticRegistry::new();
        let (mut ag, _, kinase) = egfr_with_kinase(&mut registry);
        let interaction = phosphorylation(ActorDesc::protoform("P00533"), 1092);

        let (nugget, outcome, diag) = insert(&mut ag, &mut registry, "n1", &interaction);
        assert_eq!(outcome, SemanticOutcome::Registered(Motif::Phosphorylation));
        assert!(diag.is_empty());

        // The nugget gained the kinase region and its activity.
        assert_eq!(nugget.graph.nodes_of_type(MetaType::Region).len(), 1);
        let activity = EntityIdentifier::new(&ag)
            .identify_state(ACTIVITY, kinase)
            .unwrap()
            .unwrap();
        assert!(tests_true(ag.node(activity).unwrap()));

        let action = nugget.image(nugget.action).unwrap();
        assert!(ag.exists_edge(kinase, action));
        let relation = registry.relation("n1").unwrap();
        assert_eq!(relation.nodes_with(SemanticRole::ProteinKinase), vec![kinase]);
        assert_eq!(relation.nodes_with(SemanticRole::Phospho), vec![action]);
        assert_eq!(relation.nodes_with(SemanticRole::TargetResidue).len(), 1);
        assert!(registry.has_tag(activity, SemanticRole::ProteinKinaseActivity));
    }

    #[test]
    fn second_phosphorylation_by_same_kinase_merges_actions() {
        let mut registry = SemanticRegistry::new();
        let (mut ag, _, kinase) = egfr_with_kinase(&mut registry);

        insert(&mut ag, &mut registry, "n1", &phosphorylation(ActorDesc::protoform("P00533"), 1092));
        let (nugget, outcome, _) = insert(
            &mut ag,
            &mut registry,
            "n2",
            &phosphorylation(ActorDesc::protoform("P00533"), 1068),
        );
        assert_eq!(outcome, SemanticOutcome::Registered(Motif::Phosphorylation));

        let mods = ag.nodes_of_type(MetaType::Mod);
        assert_eq!(mods.len(), 1);
        assert_eq!(nugget.image(nugget.action), Some(mods[0]));
        // The first relation follows the merge.
        let first = registry.relation("n1").unwrap();
        assert_eq!(first.nodes_with(SemanticRole::Phospho), mods);
        // One shared activity state.
        let states = EntityIdentifier::new(&ag).get_attached_states(kinase).unwrap();
        assert_eq!(states.len(), 1);
    }

    #[test]
    fn untagged_explicit_region_is_not_registered() {
        let mut registry = SemanticRegistry::new();
        let (mut ag, _, _) = egfr_with_kinase(&mut registry);
        let enzyme = ActorDesc::protoform("P00533").with_region(RegionDesc::named("tail").at(1000, 1100));

        let (_, outcome, diag) = insert(&mut ag, &mut registry, "n1", &phosphorylation(enzyme, 1092));
        assert_eq!(outcome, SemanticOutcome::Ambiguous);
        assert!(matches!(diag.warnings(), [Warning::UntaggedEnzymeRegion { .. }]));
        assert!(registry.relation("n1").is_none());
    }

    #[test]
    fn enzyme_site_acts_through_the_enclosing_kinase_region() {
        let mut registry = SemanticRegistry::new();
        let (mut ag, _, kinase) = egfr_with_kinase(&mut registry);
        let enzyme = ActorDesc::protoform("P00533").with_site(SiteDesc::named("A-loop").at(855, 880));

        let (nugget, outcome, diag) = insert(&mut ag, &mut registry, "n1", &phosphorylation(enzyme, 1092));
        assert_eq!(outcome, SemanticOutcome::Registered(Motif::Phosphorylation));
        assert!(diag.is_empty());

        let site = nugget.graph.nodes_of_type(MetaType::Site)[0];
        let regions = nugget.graph.nodes_of_type(MetaType::Region);
        assert_eq!(regions.len(), 1);
        assert!(nugget.graph.exists_edge(site, regions[0]));
        assert_eq!(nugget.image(regions[0]), Some(kinase));
        assert!(ag.exists_edge(nugget.image(site).unwrap(), kinase));

        let relation = registry.relation("n1").unwrap();
        assert_eq!(relation.nodes_with(SemanticRole::ProteinKinase), vec![kinase]);
    }

    #[test]
    fn enzyme_site_outside_every_kinase_region_is_not_registered() {
        let mut registry = SemanticRegistry::new();
        let (mut ag, _, kinase) = egfr_with_kinase(&mut registry);
        let enzyme = ActorDesc::protoform("P00533").with_site(SiteDesc::named("loop").at(100, 110));

        let (nugget, outcome, diag) = insert(&mut ag, &mut registry, "n1", &phosphorylation(enzyme, 1092));
        assert_eq!(outcome, SemanticOutcome::Ambiguous);
        let site = nugget.image(nugget.graph.nodes_of_type(MetaType::Site)[0]).unwrap();
        assert_eq!(diag.warnings(), [Warning::UntaggedEnzymeRegion { region: site }]);
        assert!(registry.relation("n1").is_none());

        // Nothing was autocompleted or linked to the kinase.
        assert!(nugget.graph.nodes_of_type(MetaType::Region).is_empty());
        for succ in ag.successors(kinase).unwrap() {
            assert_ne!(ag.meta_type(succ).unwrap(), MetaType::Mod);
        }
    }

    #[test]
    fn asserted_activity_is_not_duplicated() {
        let mut registry = SemanticRegistry::new();
        let (mut ag, egfr, kinase) = egfr_with_kinase(&mut registry);
        let enzyme = ActorDesc::protoform("P00533").with_region(
            RegionDesc::named("Protein kinase")
                .at(712, 979)
                .with_state(StateDesc::new(ACTIVITY, true)),
        );
        let mut nugget = NuggetGenerator::generate("n1", &phosphorylation(enzyme, 1092)).unwrap();
        embed(&mut ag, &mut nugget);
        // Identify the nugget's region and its activity with the tagged ones.
        let region = nugget.graph.nodes_of_type(MetaType::Region)[0];
        let activity = EntityIdentifier::new(&nugget.graph)
            .identify_state(ACTIVITY, region)
            .unwrap()
            .unwrap();
        let copy = nugget.typing[&region];
        let merged = ag.merge_nodes(&[copy, kinase]).unwrap();
        registry.rekey(&ag);
        nugget.rekey(&ag);
        assert!(ag.exists_edge(merged, egfr));

        let mut diag = Diagnostics::new();
        let outcome = SemanticEngine::new(&mut ag, &mut registry)
            .apply_mod_semantics(&mut nugget, &mut diag)
            .unwrap();
        assert_eq!(outcome, SemanticOutcome::Registered(Motif::Phosphorylation));
        assert!(diag.is_empty());

        assert_eq!(nugget.graph.nodes_of_type(MetaType::State).len(), 2);
        let states = EntityIdentifier::new(&ag).get_attached_states(merged).unwrap();
        assert_eq!(states.len(), 1);
        let relation = registry.relation("n1").unwrap();
        assert!(relation.nugget_roles[&activity].contains(&SemanticRole::ProteinKinaseActivity));
        assert_eq!(
            relation.nodes_with(SemanticRole::ProteinKinaseActivity),
            vec![nugget.image(activity).unwrap()]
        );
    }

    #[test]
    fn several_kinase_regions_are_ambiguous() {
        let mut registry = SemanticRegistry::new();
        let (mut ag, egfr, _) = egfr_with_kinase(&mut registry);
        let second = ag.add_node(NodeData::region("Second kinase"));
        ag.add_edge(second, egfr, EdgeAttrs::range(10, 200)).unwrap();
        registry.tag(second, SemanticRole::ProteinKinase);

        let (_, outcome, diag) = insert(
            &mut ag,
            &mut registry,
            "n1",
            &phosphorylation(ActorDesc::protoform("P00533"), 1092),
        );
        assert_eq!(outcome, SemanticOutcome::Ambiguous);
        assert!(matches!(
            diag.warnings(),
            [Warning::AmbiguousKinase { candidates, .. }] if candidates.len() == 2
        ));
    }

    #[test]
    fn other_modifications_are_not_recognised() {
        let mut registry = SemanticRegistry::new();
        let (mut ag, _, _) = egfr_with_kinase(&mut registry);
        let mut interaction = phosphorylation(ActorDesc::protoform("P00533"), 1092);
        if let Interaction::Mod(m) = &mut interaction {
            m.target.state.name = "ubiquitination".into();
        }
        let (_, outcome, diag) = insert(&mut ag, &mut registry, "n1", &interaction);
        assert_eq!(outcome, SemanticOutcome::NotRecognized);
        assert!(diag.is_empty());
    }

    fn grb2_egfr(phosphorylated: bool) -> Interaction {
        Interaction::Bnd(BndInteraction {
            left: ActorDesc::protoform("P62993"),
            right: ActorDesc::protoform("P00533").with_residue(
                ResidueDesc::new('Y', 1068).with_state(StateDesc::new(PHOSPHORYLATION, phosphorylated)),
            ),
            test: true,
            desc: None,
        })
    }

    fn grb2_with_sh2(registry: &mut SemanticRegistry) -> (MemoryGraphStore, NodeId) {
        let mut ag = MemoryGraphStore::new();
        let grb2 = ag.add_node(NodeData::protoform("P62993"));
        let sh2 = ag.add_node(NodeData::region("SH2"));
        ag.add_edge(sh2, grb2, EdgeAttrs::range(60, 152)).unwrap();
        ag.add_node(NodeData::protoform("P00533"));
        registry.tag(sh2, SemanticRole::Sh2Domain);
        (ag, sh2)
    }

    #[test]
    fn sh2_binding_to_phosphotyrosine_is_registered() {
        let mut registry = SemanticRegistry::new();
        let (mut ag, sh2) = grb2_with_sh2(&mut registry);

        let (nugget, outcome, diag) = insert(&mut ag, &mut registry, "b1", &grb2_egfr(true));
        assert_eq!(outcome, SemanticOutcome::Registered(Motif::Sh2PyBinding));
        assert!(diag.is_empty());
        let bnd = nugget.image(nugget.action).unwrap();
        assert!(ag.exists_edge(sh2, bnd));
        let relation = registry.relation("b1").unwrap();
        assert_eq!(relation.nodes_with(SemanticRole::Sh2Domain), vec![sh2]);
        assert_eq!(relation.nodes_with(SemanticRole::PyResidue).len(), 1);

        // A repeated binding of the same pair reuses the action.
        insert(&mut ag, &mut registry, "b2", &grb2_egfr(true));
        assert_eq!(ag.nodes_of_type(MetaType::Bnd).len(), 1);
    }

    fn grb2_site_egfr(start: i64, end: i64) -> Interaction {
        let Interaction::Bnd(mut bnd) = grb2_egfr(true) else {
            unreachable!()
        };
        bnd.left = ActorDesc::protoform("P62993").with_site(SiteDesc::named("pocket").at(start, end));
        Interaction::Bnd(bnd)
    }

    #[test]
    fn binding_site_inside_sh2_domain_is_registered() {
        let mut registry = SemanticRegistry::new();
        let (mut ag, sh2) = grb2_with_sh2(&mut registry);

        let (nugget, outcome, diag) = insert(&mut ag, &mut registry, "b1", &grb2_site_egfr(90, 100));
        assert_eq!(outcome, SemanticOutcome::Registered(Motif::Sh2PyBinding));
        assert!(diag.is_empty());
        let site = nugget.graph.nodes_of_type(MetaType::Site)[0];
        let region = nugget.graph.nodes_of_type(MetaType::Region)[0];
        assert!(nugget.graph.exists_edge(site, region));
        assert_eq!(registry.relation("b1").unwrap().nodes_with(SemanticRole::Sh2Domain), vec![sh2]);
    }

    #[test]
    fn binding_site_outside_sh2_domain_is_not_recognised() {
        let mut registry = SemanticRegistry::new();
        let (mut ag, sh2) = grb2_with_sh2(&mut registry);

        let (nugget, outcome, _) = insert(&mut ag, &mut registry, "b1", &grb2_site_egfr(200, 210));
        assert_eq!(outcome, SemanticOutcome::NotRecognized);
        assert!(registry.relation("b1").is_none());
        assert!(nugget.graph.nodes_of_type(MetaType::Region).is_empty());
        let bnd = nugget.image(nugget.action).unwrap();
        assert!(!ag.exists_edge(sh2, bnd));
    }

    #[test]
    fn sh2_binding_without_phosphotyrosine_warns() {
        let mut registry = SemanticRegistry::new();
        let (mut ag, _) = grb2_with_sh2(&mut registry);
        let (_, outcome, diag) = insert(&mut ag, &mut registry, "b1", &grb2_egfr(false));
        assert_eq!(outcome, SemanticOutcome::Ambiguous);
        assert!(matches!(diag.warnings(), [Warning::MissingPhosphoTyrosine { .. }]));
    }

    #[test]
    fn registry_rekey_pools_roles_of_merged_nodes() {
        let mut g = MemoryGraphStore::new();
        let a = g.add_node(NodeData::region("a"));
        let b = g.add_node(NodeData::region("b"));
        let mut registry = SemanticRegistry::new();
        registry.tag(a, SemanticRole::ProteinKinase);
        registry.tag(b, SemanticRole::Sh2Domain);

        let merged = g.merge_nodes(&[a, b]).unwrap();
        registry.rekey(&g);
        let roles = registry.roles(merged).unwrap();
        assert!(roles.contains(&SemanticRole::ProteinKinase));
        assert!(roles.contains(&SemanticRole::Sh2Domain));
        assert!(registry.roles(a).is_none());
    }

    #[test]
    fn roles_serialise_with_motif_labels() {
        let json = serde_json::to_string(&SemanticRole::Sh2PyBinding).unwrap();
        assert_eq!(json, "\"sh2_pY_binding\"");
        let role: SemanticRole = serde_json::from_str("\"protein_kinase\"").unwrap();
        assert_eq!(role, SemanticRole::ProteinKinase);
    }
}
