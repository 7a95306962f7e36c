//! The corpus: owner of the action graph and the caller of the core.
//!
//! A [`Corpus`] registers protoforms with their known domains, turns each
//! interaction into a nugget, identifies the nugget in the action graph,
//! runs bookkeeping over the touched nodes and finally motif recognition.
//! Every step takes the corpus by `&mut`; there is no shared global state.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::attrs::{EdgeAttrs, MetaType, NodeData, ProtoformAttrs};
use crate::bookkeeping::{Bookkeeper, BookkeepingReport};
use crate::config::CorpusConfig;
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{CorpusError, GraphError, GraphResult, KbResult};
use crate::identify::{EntityIdentifier, FragmentQuery};
use crate::nugget::{
    Interaction, Nugget, NuggetGenerator, NuggetKind, RegionDesc, SiteDesc, StateDesc,
};
use crate::semantics::{
    Motif, SemanticEngine, SemanticOutcome, SemanticRegistry, SemanticRole,
};
use crate::store::{GraphSnapshot, MemoryGraphStore, NodeId, TypedGraphStore};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// A protoform with the domains and sites known before any interaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtoformEntry {
    pub uniprot_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub regions: Vec<RegionDesc>,
    #[serde(default)]
    pub sites: Vec<SiteDesc>,
    #[serde(default)]
    pub states: Vec<StateDesc>,
}

impl ProtoformEntry {
    pub fn new(uniprot_id: impl Into<String>) -> Self {
        Self {
            uniprot_id: uniprot_id.into(),
            ..Default::default()
        }
    }

    pub fn with_region(mut self, region: RegionDesc) -> Self {
        self.regions.push(region);
        self
    }

    pub fn with_site(mut self, site: SiteDesc) -> Self {
        self.sites.push(site);
        self
    }
}

/// On-disk corpus description: protoforms first, then interactions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusInput {
    #[serde(default)]
    pub protoforms: Vec<ProtoformEntry>,
    #[serde(default)]
    pub interactions: Vec<Interaction>,
}

impl CorpusInput {
    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self, CorpusError> {
        let content = std::fs::read_to_string(path).map_err(|e| CorpusError::Input {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    pub fn from_json_str(content: &str) -> Result<Self, CorpusError> {
        Self::parse(content, "<inline>")
    }

    fn parse(content: &str, origin: &str) -> Result<Self, CorpusError> {
        serde_json::from_str(content).map_err(|e| CorpusError::Input {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Result of inserting one interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsertReport {
    pub nugget_id: String,
    pub kind: NuggetKind,
    pub outcome: SemanticOutcome,
    pub bookkeeping: BookkeepingReport,
    pub warnings: Vec<Warning>,
}

/// Result of ingesting a whole [`CorpusInput`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub protoforms: Vec<NodeId>,
    /// Warnings raised while registering protoforms.
    pub protoform_warnings: Vec<Warning>,
    pub interactions: Vec<InsertReport>,
}

impl IngestReport {
    /// Every warning, protoform registration first.
    pub fn warnings(&self) -> impl Iterator<Item = &Warning> {
        self.protoform_warnings
            .iter()
            .chain(self.interactions.iter().flat_map(|r| r.warnings.iter()))
    }

    pub fn registered(&self) -> usize {
        self.interactions
            .iter()
            .filter(|r| matches!(r.outcome, SemanticOutcome::Registered(_)))
            .count()
    }
}

/// Summary counts of a corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorpusInfo {
    pub nodes_by_type: Vec<(MetaType, usize)>,
    pub edges: usize,
    pub transitive_edges: usize,
    pub nuggets: usize,
    pub relations: usize,
    pub tagged: usize,
}

impl CorpusInfo {
    pub fn count(&self, meta_type: MetaType) -> usize {
        self.nodes_by_type
            .iter()
            .find(|(t, _)| *t == meta_type)
            .map_or(0, |(_, n)| *n)
    }
}

impl std::fmt::Display for CorpusInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "actiongraph corpus info")?;
        for (meta_type, count) in &self.nodes_by_type {
            writeln!(f, "  {:<13} {}", format!("{meta_type}:"), count)?;
        }
        writeln!(
            f,
            "  edges:        {} ({} transitive)",
            self.edges, self.transitive_edges
        )?;
        writeln!(f, "  nuggets:      {}", self.nuggets)?;
        writeln!(f, "  relations:    {}", self.relations)?;
        writeln!(f, "  tagged:       {}", self.tagged)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TagRecord {
    pub node: NodeId,
    pub roles: BTreeSet<SemanticRole>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelationRecord {
    pub nugget: String,
    pub motif: Motif,
    pub roles: Vec<TagRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NuggetRecord {
    pub id: String,
    pub kind: NuggetKind,
    pub desc: Option<String>,
    /// `(nugget node, action-graph node)` pairs.
    pub typing: Vec<(NodeId, NodeId)>,
}

/// Serialisable dump of the action graph, its tags and the nugget typings.
#[derive(Debug, Clone, Serialize)]
pub struct CorpusExport {
    pub graph: GraphSnapshot,
    pub tags: Vec<TagRecord>,
    pub relations: Vec<RelationRecord>,
    pub nuggets: Vec<NuggetRecord>,
}

fn tag_records(roles: &BTreeMap<NodeId, BTreeSet<SemanticRole>>) -> Vec<TagRecord> {
    roles
        .iter()
        .map(|(node, roles)| TagRecord {
            node: *node,
            roles: roles.clone(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Corpus
// ---------------------------------------------------------------------------

fn fragment_query(data: &NodeData, range: Option<(i64, i64)>) -> FragmentQuery {
    let mut query = FragmentQuery {
        range,
        ..Default::default()
    };
    if let Some(attrs) = data.fragment() {
        query.name = attrs.names.first().cloned();
        query.interpro_ids = attrs.interpro_ids.clone();
        query.order = attrs.order.first().copied();
    }
    query
}

fn range_attrs(range: Option<(i64, i64)>) -> EdgeAttrs {
    range.map_or_else(EdgeAttrs::default, |(s, e)| EdgeAttrs::range(s, e))
}

/// An action graph plus the nuggets merged into it.
#[derive(Debug, Default)]
pub struct Corpus {
    config: CorpusConfig,
    action_graph: MemoryGraphStore,
    nuggets: BTreeMap<String, Nugget>,
    registry: SemanticRegistry,
    next_nugget: usize,
}

impl Corpus {
    pub fn new(config: CorpusConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &CorpusConfig {
        &self.config
    }

    pub fn action_graph(&self) -> &MemoryGraphStore {
        &self.action_graph
    }

    pub fn registry(&self) -> &SemanticRegistry {
        &self.registry
    }

    pub fn nugget(&self, id: &str) -> Option<&Nugget> {
        self.nuggets.get(id)
    }

    pub fn nugget_ids(&self) -> Vec<&str> {
        self.nuggets.keys().map(String::as_str).collect()
    }

    /// Read-only identification queries over the action graph, honouring the
    /// configured attachment mode.
    pub fn identifier(&self) -> EntityIdentifier<'_, MemoryGraphStore> {
        EntityIdentifier::new(&self.action_graph)
            .immediate(self.config.identification.use_transitive_edges)
    }

    fn rekey(&mut self) {
        for nugget in self.nuggets.values_mut() {
            nugget.rekey(&self.action_graph);
        }
        self.registry.rekey(&self.action_graph);
    }

    fn tag_region(&mut self, region: NodeId, declared: &[SemanticRole]) -> GraphResult<()> {
        let mut roles = declared.to_vec();
        if let Some(attrs) = self.action_graph.node(region)?.fragment() {
            roles.extend(self.config.semantics.tags_for(attrs));
        }
        for role in roles {
            self.registry.tag(region, role);
        }
        Ok(())
    }

    fn add_states(&mut self, states: &[StateDesc], owner: NodeId) -> GraphResult<()> {
        for state in states {
            let existing = self.identifier().identify_state(&state.name, owner)?;
            let data = NodeData::state(state.name.clone(), state.test);
            match existing {
                Some(found) => self.action_graph.add_node_attrs(found, &data.attrs())?,
                None => {
                    let node = self.action_graph.add_node(data);
                    self.action_graph.add_edge(node, owner, EdgeAttrs::default())?;
                }
            }
        }
        Ok(())
    }

    /// Identify `query` among the fragments of `protoform`, or create it.
    fn upsert_fragment(
        &mut self,
        query: &FragmentQuery,
        data: NodeData,
        protoform: NodeId,
        diagnostics: &mut Diagnostics,
    ) -> KbResult<NodeId> {
        let existing = match data.meta_type() {
            MetaType::Region => self.identifier().identify_region(query, protoform, diagnostics)?,
            _ => self.identifier().identify_site(query, protoform, diagnostics)?,
        };
        if let Some(found) = existing {
            self.action_graph.add_node_attrs(found, &data.attrs())?;
            return Ok(found);
        }
        let node = self.action_graph.add_node(data);
        self.action_graph
            .add_edge(node, protoform, range_attrs(query.range))?;
        Ok(node)
    }

    /// Register a protoform and its declared regions and sites.
    ///
    /// The protoform is unique by accession; fragments are identified against
    /// the ones already known and tagged from their declared roles and the
    /// configured InterPro ids and name patterns.
    pub fn add_protoform(
        &mut self,
        entry: &ProtoformEntry,
        diagnostics: &mut Diagnostics,
    ) -> KbResult<NodeId> {
        if entry.uniprot_id.trim().is_empty() {
            return Err(CorpusError::InvalidInteraction {
                message: "protoform without uniprot accession".into(),
            }
            .into());
        }
        let mut attrs = ProtoformAttrs::new(entry.uniprot_id.clone());
        if let Some(name) = &entry.name {
            attrs = attrs.with_name(name.clone());
        }
        let data = NodeData::Protoform(attrs);
        let protoform = match self.identifier().identify_protoform(&entry.uniprot_id) {
            Some(found) => {
                self.action_graph.add_node_attrs(found, &data.attrs())?;
                found
            }
            None => self.action_graph.add_node(data),
        };
        self.add_states(&entry.states, protoform)?;

        let mut touched = BTreeSet::from([protoform]);
        for region in &entry.regions {
            let node =
                self.upsert_fragment(&region.query(), region.node_data(), protoform, diagnostics)?;
            self.add_states(&region.states, node)?;
            self.tag_region(node, &region.tags)?;
            touched.insert(node);
        }
        for site in &entry.sites {
            let node =
                self.upsert_fragment(&site.query(), site.node_data(), protoform, diagnostics)?;
            self.add_states(&site.states, node)?;
            touched.insert(node);
        }

        if self.config.bookkeeping.enabled {
            self.apply_bookkeeping(&touched, &BTreeSet::from([protoform]))?;
        }
        tracing::debug!(
            uniprot = %entry.uniprot_id,
            node = %protoform,
            regions = entry.regions.len(),
            sites = entry.sites.len(),
            "protoform registered"
        );
        Ok(protoform)
    }

    /// Existing action-graph node denoted by a nugget node, if any.
    fn find_existing(
        &self,
        nugget: &Nugget,
        node: NodeId,
        data: &NodeData,
        diagnostics: &mut Diagnostics,
    ) -> KbResult<Option<NodeId>> {
        let local = EntityIdentifier::new(&nugget.graph);
        let ident = self.identifier();
        let image_of = |n: NodeId| {
            nugget.image(n).ok_or_else(|| GraphError::NodeNotFound {
                node: n.to_string(),
            })
        };

        let found = match data.meta_type() {
            MetaType::Protoform => data
                .uniprot_id()
                .and_then(|acc| ident.identify_protoform(acc)),
            meta_type @ (MetaType::Region | MetaType::Site) => {
                let protoform = local.get_protoform_of(node)?;
                let query = fragment_query(data, local.fragment_range(node, protoform)?);
                let target = image_of(protoform)?;
                if meta_type == MetaType::Region {
                    ident.identify_region(&query, target, diagnostics)?
                } else {
                    ident.identify_site(&query, target, diagnostics)?
                }
            }
            MetaType::Residue => {
                let protoform = local.get_protoform_of(node)?;
                match local.residue_loc(node, protoform)? {
                    Some(loc) => ident.identify_residue(loc, image_of(protoform)?)?,
                    None => None,
                }
            }
            MetaType::State => {
                let owner = nugget
                    .graph
                    .successors(node)?
                    .into_iter()
                    .find(|s| nugget.graph.meta_type(*s).is_ok_and(MetaType::is_structural));
                match (owner, data.name()) {
                    (Some(owner), Some(name)) => ident.identify_state(name, image_of(owner)?)?,
                    _ => None,
                }
            }
            MetaType::Mod | MetaType::Bnd => None,
        };
        Ok(found)
    }

    /// Copy the edges between `node` and already identified nugget nodes.
    /// Edges the action graph already has are left untouched.
    fn mirror_edges(&mut self, nugget: &Nugget, node: NodeId, image: NodeId) -> GraphResult<()> {
        let mut pending = Vec::new();
        for succ in nugget.graph.successors(node)? {
            if let Some(target) = nugget.image(succ) {
                pending.push((image, target, nugget.graph.get_edge_attrs(node, succ)?));
            }
        }
        for pred in nugget.graph.predecessors(node)? {
            if let Some(source) = nugget.image(pred) {
                pending.push((source, image, nugget.graph.get_edge_attrs(pred, node)?));
            }
        }
        for (source, target, attrs) in pending {
            if source != target && !self.action_graph.exists_edge(source, target) {
                self.action_graph.add_edge(source, target, attrs)?;
            }
        }
        Ok(())
    }

    /// Type every nugget node into the action graph, creating what is missing.
    ///
    /// Nodes are visited in meta-type order so that owners are always
    /// identified before their components.
    fn identify_nugget(
        &mut self,
        nugget: &mut Nugget,
        diagnostics: &mut Diagnostics,
    ) -> KbResult<()> {
        for meta_type in MetaType::ALL {
            for node in nugget.graph.nodes_of_type(meta_type) {
                let data = nugget.graph.node(node)?.clone();
                let image = match self.find_existing(nugget, node, &data, diagnostics)? {
                    Some(found) => {
                        self.action_graph.add_node_attrs(found, &data.attrs())?;
                        tracing::debug!(nugget = %nugget.id, %node, image = %found, "identified");
                        found
                    }
                    None => self.action_graph.add_node(data),
                };
                nugget.typing.insert(node, image);
                self.mirror_edges(nugget, node, image)?;
            }
        }

        for (node, roles) in &nugget.tags {
            if let Some(image) = nugget.image(*node) {
                for role in roles {
                    self.registry.tag(image, *role);
                }
            }
        }
        for region in nugget.graph.nodes_of_type(MetaType::Region) {
            if let Some(image) = nugget.image(region) {
                self.tag_region(image, &[])?;
            }
        }
        Ok(())
    }

    /// Insert one interaction: generate its nugget, merge it into the action
    /// graph, bookkeep and run motif recognition.
    pub fn add_interaction(&mut self, interaction: &Interaction) -> KbResult<InsertReport> {
        interaction.validate()?;
        self.next_nugget += 1;
        let id = format!("nugget_{}", self.next_nugget);
        let mut diagnostics = Diagnostics::new();

        let mut nugget = NuggetGenerator::generate(id.clone(), interaction)?;
        self.identify_nugget(&mut nugget, &mut diagnostics)?;

        let bookkeeping = if self.config.bookkeeping.enabled {
            let touched: BTreeSet<NodeId> = nugget.typing.values().copied().collect();
            let protoforms: BTreeSet<NodeId> = nugget
                .protoforms()
                .into_iter()
                .filter_map(|p| nugget.image(p))
                .collect();
            Bookkeeper::new(&mut self.action_graph).apply_bookkeeping(&touched, &protoforms)?
        } else {
            BookkeepingReport::default()
        };

        let kind = nugget.kind;
        self.nuggets.insert(id.clone(), nugget);
        self.rekey();

        let outcome = if self.config.semantics.enabled {
            self.with_semantics(&id, |engine, nugget| match nugget.kind {
                NuggetKind::Mod => engine.apply_mod_semantics(nugget, &mut diagnostics),
                NuggetKind::Bnd => engine.apply_bnd_semantics(nugget, &mut diagnostics),
            })?
        } else {
            SemanticOutcome::NotRecognized
        };

        tracing::info!(
            nugget = %id,
            ?kind,
            ?outcome,
            edges_added = bookkeeping.edges_added,
            warnings = diagnostics.len(),
            "nugget inserted"
        );
        Ok(InsertReport {
            nugget_id: id,
            kind,
            outcome,
            bookkeeping,
            warnings: diagnostics.into_warnings(),
        })
    }

    /// Register every protoform, then insert every interaction in order.
    pub fn ingest(&mut self, input: &CorpusInput) -> KbResult<IngestReport> {
        let mut report = IngestReport::default();
        let mut diagnostics = Diagnostics::new();
        for entry in &input.protoforms {
            report
                .protoforms
                .push(self.add_protoform(entry, &mut diagnostics)?);
        }
        report.protoform_warnings = diagnostics.into_warnings();
        for interaction in &input.interactions {
            report.interactions.push(self.add_interaction(interaction)?);
        }
        Ok(report)
    }

    /// Bookkeep the action graph around `touched`. Handles that went stale
    /// are followed to their merge survivors.
    pub fn apply_bookkeeping(
        &mut self,
        touched: &BTreeSet<NodeId>,
        protoforms: &BTreeSet<NodeId>,
    ) -> KbResult<BookkeepingReport> {
        let report =
            Bookkeeper::new(&mut self.action_graph).apply_bookkeeping(touched, protoforms)?;
        if report.residues_merged > 0 {
            self.rekey();
        }
        Ok(report)
    }

    fn with_semantics<F>(&mut self, id: &str, apply: F) -> KbResult<SemanticOutcome>
    where
        F: FnOnce(&mut SemanticEngine<'_, MemoryGraphStore>, &mut Nugget) -> KbResult<SemanticOutcome>,
    {
        let nugget = self
            .nuggets
            .get_mut(id)
            .ok_or_else(|| CorpusError::UnknownNugget { id: id.to_string() })?;
        let mut engine = SemanticEngine::new(&mut self.action_graph, &mut self.registry);
        let outcome = apply(&mut engine, nugget)?;
        self.rekey();
        Ok(outcome)
    }

    /// Run phosphorylation recognition on a stored nugget.
    pub fn apply_mod_semantics(
        &mut self,
        nugget_id: &str,
        diagnostics: &mut Diagnostics,
    ) -> KbResult<SemanticOutcome> {
        self.with_semantics(nugget_id, |engine, nugget| {
            engine.apply_mod_semantics(nugget, diagnostics)
        })
    }

    /// Run SH2–pY recognition on a stored nugget.
    pub fn apply_bnd_semantics(
        &mut self,
        nugget_id: &str,
        diagnostics: &mut Diagnostics,
    ) -> KbResult<SemanticOutcome> {
        self.with_semantics(nugget_id, |engine, nugget| {
            engine.apply_bnd_semantics(nugget, diagnostics)
        })
    }

    /// Drop every node, nugget and tag.
    pub fn clear(&mut self) {
        self.action_graph.clear();
        self.nuggets.clear();
        self.registry.clear();
        self.next_nugget = 0;
        tracing::info!("corpus cleared");
    }

    pub fn info(&self) -> CorpusInfo {
        let graph = &self.action_graph;
        let transitive_edges = graph
            .edges()
            .into_iter()
            .filter(|(s, t)| graph.get_edge_attrs(*s, *t).is_ok_and(|a| a.is_transitive()))
            .count();
        CorpusInfo {
            nodes_by_type: MetaType::ALL
                .into_iter()
                .map(|t| (t, graph.nodes_of_type(t).len()))
                .collect(),
            edges: graph.edge_count(),
            transitive_edges,
            nuggets: self.nuggets.len(),
            relations: self.registry.relations().len(),
            tagged: self.registry.tags().len(),
        }
    }

    pub fn export(&self) -> CorpusExport {
        CorpusExport {
            graph: self.action_graph.snapshot(),
            tags: tag_records(self.registry.tags()),
            relations: self
                .registry
                .relations()
                .iter()
                .map(|(nugget, relation)| RelationRecord {
                    nugget: nugget.clone(),
                    motif: relation.motif,
                    roles: tag_records(&relation.action_graph_roles),
                })
                .collect(),
            nuggets: self
                .nuggets
                .values()
                .map(|n| NuggetRecord {
                    id: n.id.clone(),
                    kind: n.kind,
                    desc: n.desc.clone(),
                    typing: n.typing.iter().map(|(a, b)| (*a, *b)).collect(),
                })
                .collect(),
        }
    }
}
