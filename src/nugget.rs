//! Nuggets: small typed graphs, one per observed interaction.
//!
//! Interactions arrive as serde descriptions ([`Interaction`]) and are turned
//! into a [`Nugget`] graph by [`NuggetGenerator`]. The nugget keeps a typing
//! of its nodes into the action graph once it has been identified there.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::attrs::{EdgeAttrs, FragmentAttrs, MetaType, NodeData, ProtoformAttrs, ResidueAttrs};
use crate::error::{CorpusError, GraphResult};
use crate::identify::FragmentQuery;
use crate::semantics::SemanticRole;
use crate::store::{MemoryGraphStore, NodeId, TypedGraphStore};

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Interaction descriptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtoformDesc {
    pub uniprot_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl ProtoformDesc {
    pub fn new(uniprot_id: impl Into<String>) -> Self {
        Self {
            uniprot_id: uniprot_id.into(),
            name: None,
        }
    }

    fn node_data(&self) -> NodeData {
        let mut attrs = ProtoformAttrs::new(self.uniprot_id.clone());
        if let Some(name) = &self.name {
            attrs = attrs.with_name(name.clone());
        }
        NodeData::Protoform(attrs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDesc {
    pub name: String,
    #[serde(default = "default_true")]
    pub test: bool,
}

impl StateDesc {
    pub fn new(name: impl Into<String>, test: bool) -> Self {
        Self {
            name: name.into(),
            test,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidueDesc {
    pub aa: char,
    #[serde(default)]
    pub loc: Option<i64>,
    #[serde(default)]
    pub state: Option<StateDesc>,
}

impl ResidueDesc {
    pub fn new(aa: char, loc: i64) -> Self {
        Self {
            aa,
            loc: Some(loc),
            state: None,
        }
    }

    pub fn with_state(mut self, state: StateDesc) -> Self {
        self.state = Some(state);
        self
    }
}

/// A region, optionally tagged with semantic roles such as `protein_kinase`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDesc {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start: Option<i64>,
    #[serde(default)]
    pub end: Option<i64>,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default)]
    pub interpro_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<SemanticRole>,
    #[serde(default)]
    pub states: Vec<StateDesc>,
}

impl RegionDesc {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn at(mut self, start: i64, end: i64) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn with_interpro(mut self, id: impl Into<String>) -> Self {
        self.interpro_ids.push(id.into());
        self
    }

    pub fn tagged(mut self, role: SemanticRole) -> Self {
        self.tags.push(role);
        self
    }

    pub fn with_state(mut self, state: StateDesc) -> Self {
        self.states.push(state);
        self
    }

    pub fn range(&self) -> Option<(i64, i64)> {
        self.start.zip(self.end)
    }

    pub fn query(&self) -> FragmentQuery {
        fragment_query(&self.name, &self.interpro_ids, self.range(), self.order)
    }

    pub fn node_data(&self) -> NodeData {
        NodeData::Region(fragment_attrs(&self.name, &self.interpro_ids, self.order))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteDesc {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start: Option<i64>,
    #[serde(default)]
    pub end: Option<i64>,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default)]
    pub interpro_ids: Vec<String>,
    #[serde(default)]
    pub states: Vec<StateDesc>,
}

impl SiteDesc {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn at(mut self, start: i64, end: i64) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn range(&self) -> Option<(i64, i64)> {
        self.start.zip(self.end)
    }

    pub fn query(&self) -> FragmentQuery {
        fragment_query(&self.name, &self.interpro_ids, self.range(), self.order)
    }

    pub fn node_data(&self) -> NodeData {
        NodeData::Site(fragment_attrs(&self.name, &self.interpro_ids, self.order))
    }
}

fn fragment_attrs(name: &Option<String>, interpro_ids: &[String], order: Option<i64>) -> FragmentAttrs {
    let mut attrs = FragmentAttrs::default();
    attrs.names.extend(name.iter().cloned());
    attrs.interpro_ids.extend(interpro_ids.iter().cloned());
    attrs.order.extend(order);
    attrs
}

fn fragment_query(
    name: &Option<String>,
    interpro_ids: &[String],
    range: Option<(i64, i64)>,
    order: Option<i64>,
) -> FragmentQuery {
    FragmentQuery {
        name: name.clone(),
        interpro_ids: interpro_ids.iter().cloned().collect(),
        range,
        order,
    }
}

/// One participant of an interaction: a protoform, optionally narrowed to a
/// region and site, plus the conditions (residues, states) it must satisfy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorDesc {
    pub protoform: ProtoformDesc,
    #[serde(default)]
    pub region: Option<RegionDesc>,
    #[serde(default)]
    pub site: Option<SiteDesc>,
    #[serde(default)]
    pub residues: Vec<ResidueDesc>,
    #[serde(default)]
    pub states: Vec<StateDesc>,
}

impl ActorDesc {
    pub fn protoform(uniprot_id: impl Into<String>) -> Self {
        Self {
            protoform: ProtoformDesc::new(uniprot_id),
            ..Default::default()
        }
    }

    pub fn with_region(mut self, region: RegionDesc) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_site(mut self, site: SiteDesc) -> Self {
        self.site = Some(site);
        self
    }

    pub fn with_residue(mut self, residue: ResidueDesc) -> Self {
        self.residues.push(residue);
        self
    }

    pub fn with_state(mut self, state: StateDesc) -> Self {
        self.states.push(state);
        self
    }
}

/// What a modification changes: a state, on a residue or on the substrate's
/// acting component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDesc {
    #[serde(default)]
    pub residue: Option<ResidueDesc>,
    pub state: StateDesc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModInteraction {
    pub enzyme: ActorDesc,
    pub substrate: ActorDesc,
    pub target: TargetDesc,
    #[serde(default = "default_true")]
    pub value: bool,
    #[serde(default)]
    pub desc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BndInteraction {
    pub left: ActorDesc,
    pub right: ActorDesc,
    #[serde(default = "default_true")]
    pub test: bool,
    #[serde(default)]
    pub desc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Interaction {
    Mod(ModInteraction),
    Bnd(BndInteraction),
}

impl Interaction {
    pub fn kind(&self) -> NuggetKind {
        match self {
            Self::Mod(_) => NuggetKind::Mod,
            Self::Bnd(_) => NuggetKind::Bnd,
        }
    }

    pub fn desc(&self) -> Option<&str> {
        match self {
            Self::Mod(m) => m.desc.as_deref(),
            Self::Bnd(b) => b.desc.as_deref(),
        }
    }

    fn actors(&self) -> [&ActorDesc; 2] {
        match self {
            Self::Mod(m) => [&m.enzyme, &m.substrate],
            Self::Bnd(b) => [&b.left, &b.right],
        }
    }

    /// Reject descriptions that cannot be turned into a well-formed nugget.
    pub fn validate(&self) -> Result<(), CorpusError> {
        let invalid = |message: String| Err(CorpusError::InvalidInteraction { message });
        for actor in self.actors() {
            if actor.protoform.uniprot_id.trim().is_empty() {
                return invalid("protoform without uniprot accession".into());
            }
            let ranges = [
                actor.region.as_ref().and_then(RegionDesc::range),
                actor.site.as_ref().and_then(SiteDesc::range),
            ];
            for (start, end) in ranges.into_iter().flatten() {
                if start > end {
                    return invalid(format!("fragment range [{start}, {end}] is reversed"));
                }
            }
        }
        if let Self::Mod(m) = self {
            if m.target.state.name.trim().is_empty() {
                return invalid("modification target has no state name".into());
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Nugget graphs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NuggetKind {
    Mod,
    Bnd,
}

/// A nugget graph together with its typing into the action graph.
#[derive(Debug, Clone)]
pub struct Nugget {
    pub id: String,
    pub kind: NuggetKind,
    pub graph: MemoryGraphStore,
    /// The `mod` or `bnd` node of the nugget.
    pub action: NodeId,
    /// Nugget node to action-graph node.
    pub typing: BTreeMap<NodeId, NodeId>,
    /// Roles declared on nugget regions by the interaction description.
    pub tags: BTreeMap<NodeId, BTreeSet<SemanticRole>>,
    pub desc: Option<String>,
}

impl Nugget {
    /// Action-graph image of a nugget node.
    pub fn image(&self, node: NodeId) -> Option<NodeId> {
        self.typing.get(&node).copied()
    }

    /// Protoform nodes of the nugget graph.
    pub fn protoforms(&self) -> Vec<NodeId> {
        self.graph.nodes_of_type(MetaType::Protoform)
    }

    /// Follow merges in the action graph; drop images that no longer exist.
    pub fn rekey<S: TypedGraphStore + ?Sized>(&mut self, action_graph: &S) {
        self.typing = std::mem::take(&mut self.typing)
            .into_iter()
            .filter_map(|(node, image)| Some((node, action_graph.resolve(image)?)))
            .collect();
    }
}

/// Builds nugget graphs from interaction descriptions.
#[derive(Default)]
pub struct NuggetGenerator {
    graph: MemoryGraphStore,
    tags: BTreeMap<NodeId, BTreeSet<SemanticRole>>,
}

impl NuggetGenerator {
    /// Generate the nugget graph of `interaction`, with an empty typing.
    ///
    /// A modification's target state is recorded with its value before the
    /// modification, i.e. the negation of the modification value.
    pub fn generate(id: impl Into<String>, interaction: &Interaction) -> GraphResult<Nugget> {
        let mut generator = Self::default();
        let action = match interaction {
            Interaction::Mod(m) => generator.add_mod(m)?,
            Interaction::Bnd(b) => generator.add_bnd(b)?,
        };
        Ok(Nugget {
            id: id.into(),
            kind: interaction.kind(),
            graph: generator.graph,
            action,
            typing: BTreeMap::new(),
            tags: generator.tags,
            desc: interaction.desc().map(str::to_string),
        })
    }

    fn add_mod(&mut self, desc: &ModInteraction) -> GraphResult<NodeId> {
        let (_, enzyme) = self.add_actor(&desc.enzyme)?;
        let (substrate_protoform, substrate) = self.add_actor(&desc.substrate)?;

        let owner = match &desc.target.residue {
            Some(residue) => self.add_residue(residue, substrate_protoform)?,
            None => substrate,
        };
        let state = self
            .graph
            .add_node(NodeData::state(desc.target.state.name.clone(), !desc.value));
        self.graph.add_edge(state, owner, EdgeAttrs::default())?;

        let action = self.graph.add_node(NodeData::modification(desc.value));
        self.graph.add_edge(enzyme, action, EdgeAttrs::default())?;
        self.graph.add_edge(action, state, EdgeAttrs::default())?;
        Ok(action)
    }

    fn add_bnd(&mut self, desc: &BndInteraction) -> GraphResult<NodeId> {
        let (_, left) = self.add_actor(&desc.left)?;
        let (_, right) = self.add_actor(&desc.right)?;
        let mut data = NodeData::binding();
        if let NodeData::Bnd(attrs) = &mut data {
            attrs.test = [desc.test].into();
        }
        let action = self.graph.add_node(data);
        self.graph.add_edge(left, action, EdgeAttrs::default())?;
        self.graph.add_edge(right, action, EdgeAttrs::default())?;
        Ok(action)
    }

    /// Returns the actor's protoform and its acting component.
    fn add_actor(&mut self, desc: &ActorDesc) -> GraphResult<(NodeId, NodeId)> {
        let protoform = self.graph.add_node(desc.protoform.node_data());
        self.add_states(&desc.states, protoform)?;
        for residue in &desc.residues {
            self.add_residue(residue, protoform)?;
        }

        let mut acting = protoform;
        if let Some(region) = &desc.region {
            acting = self.add_fragment(region.node_data(), region.range(), protoform)?;
            self.add_states(&region.states, acting)?;
            if !region.tags.is_empty() {
                self.tags
                    .entry(acting)
                    .or_default()
                    .extend(region.tags.iter().copied());
            }
        }
        if let Some(site) = &desc.site {
            let site_node = self.add_fragment(site.node_data(), site.range(), acting)?;
            self.add_states(&site.states, site_node)?;
            acting = site_node;
        }
        Ok((protoform, acting))
    }

    fn add_fragment(
        &mut self,
        data: NodeData,
        range: Option<(i64, i64)>,
        owner: NodeId,
    ) -> GraphResult<NodeId> {
        let node = self.graph.add_node(data);
        let attrs = range.map_or_else(EdgeAttrs::default, |(s, e)| EdgeAttrs::range(s, e));
        self.graph.add_edge(node, owner, attrs)?;
        Ok(node)
    }

    fn add_residue(&mut self, desc: &ResidueDesc, owner: NodeId) -> GraphResult<NodeId> {
        let residue = self
            .graph
            .add_node(NodeData::Residue(ResidueAttrs::new(desc.aa)));
        let attrs = desc.loc.map_or_else(EdgeAttrs::default, EdgeAttrs::at);
        self.graph.add_edge(residue, owner, attrs)?;
        if let Some(state) = &desc.state {
            self.add_states(std::slice::from_ref(state), residue)?;
        }
        Ok(residue)
    }

    fn add_states(&mut self, states: &[StateDesc], owner: NodeId) -> GraphResult<()> {
        for state in states {
            let node = self
                .graph
                .add_node(NodeData::state(state.name.clone(), state.test));
            self.graph.add_edge(node, owner, EdgeAttrs::default())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::identify::EntityIdentifier;

    fn egfr_phosphorylation() -> Interaction {
        Interaction::Mod(ModInteraction {
            enzyme: ActorDesc::protoform("P00533").with_region(RegionDesc::default().at(712, 979)),
            substrate: ActorDesc::protoform("P00533"),
            target: TargetDesc {
                residue: Some(ResidueDesc::new('Y', 1092)),
                state: StateDesc::new("phosphorylation", false),
            },
            value: true,
            desc: Some("EGFR autophosphorylation".into()),
        })
    }

    #[test]
    fn mod_nugget_has_enzyme_region_and_target_residue() {
        let nugget = NuggetGenerator::generate("n1", &egfr_phosphorylation()).unwrap();
        assert_eq!(nugget.kind, NuggetKind::Mod);
        assert_eq!(nugget.protoforms().len(), 2);

        let template = EntityIdentifier::new(&nugget.graph)
            .identify_mod_template(nugget.action)
            .unwrap();
        let enzyme = template.enzyme().unwrap();
        assert!(enzyme.region.is_some());
        let target = template.target().unwrap();
        let residue = target.residue.unwrap();
        assert_eq!(nugget.graph.node(target.state).unwrap().name(), Some("phosphorylation"));
        assert_eq!(
            nugget.graph.node(target.state).unwrap().test(),
            Some(&BTreeSet::from([false]))
        );
        assert_eq!(
            nugget.graph.get_edge_attrs(residue, target.substrate.protoform).unwrap().loc(),
            Some(1092)
        );
    }

    #[test]
    fn bnd_nugget_links_both_acting_components() {
        let interaction = Interaction::Bnd(BndInteraction {
            left: ActorDesc::protoform("P62993").with_region(RegionDesc::named("SH2")),
            right: ActorDesc::protoform("P00533")
                .with_residue(ResidueDesc::new('Y', 1068).with_state(StateDesc::new("phosphorylation", true))),
            test: true,
            desc: None,
        });
        let nugget = NuggetGenerator::generate("n2", &interaction).unwrap();
        let preds = nugget.graph.predecessors(nugget.action).unwrap();
        assert_eq!(preds.len(), 2);
        let types: Vec<_> = preds
            .iter()
            .map(|p| nugget.graph.meta_type(*p).unwrap())
            .collect();
        assert!(types.contains(&MetaType::Region));
        assert!(types.contains(&MetaType::Protoform));
    }

    #[test]
    fn interaction_deserialises_from_tagged_json() {
        let json = r#"{
            "type": "bnd",
            "left": {"protoform": {"uniprot_id": "P62993"}, "region": {"name": "SH2", "tags": ["sh2_domain"]}},
            "right": {"protoform": {"uniprot_id": "P00533"}}
        }"#;
        let interaction: Interaction = serde_json::from_str(json).unwrap();
        let Interaction::Bnd(bnd) = &interaction else {
            panic!("expected a binding");
        };
        assert!(bnd.test);
        assert_eq!(
            bnd.left.region.as_ref().unwrap().tags,
            vec![SemanticRole::Sh2Domain]
        );

        let nugget = NuggetGenerator::generate("n3", &interaction).unwrap();
        let region = nugget.graph.nodes_of_type(MetaType::Region)[0];
        assert_eq!(nugget.tags[&region], BTreeSet::from([SemanticRole::Sh2Domain]));
    }

    #[test]
    fn invalid_interactions_are_rejected() {
        let mut interaction = egfr_phosphorylation();
        if let Interaction::Mod(m) = &mut interaction {
            m.enzyme.protoform.uniprot_id = " ".into();
        }
        assert!(matches!(
            interaction.validate(),
            Err(CorpusError::InvalidInteraction { .. })
        ));

        let reversed = Interaction::Bnd(BndInteraction {
            left: ActorDesc::protoform("A").with_region(RegionDesc::named("x").at(50, 10)),
            right: ActorDesc::protoform("B"),
            test: true,
            desc: None,
        });
        assert!(reversed.validate().is_err());
        assert!(egfr_phosphorylation().validate().is_ok());
    }
}
