//! Corpus configuration, read from TOML.
//!
//! ```toml
//! [identification]
//! use_transitive_edges = true
//!
//! [bookkeeping]
//! enabled = true
//!
//! [semantics]
//! enabled = true
//! kinase_interpro_ids = ["IPR000719"]
//! kinase_name_patterns = ["kinase"]
//! sh2_interpro_ids = ["IPR000980"]
//! sh2_name_patterns = ["sh2"]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::attrs::FragmentAttrs;
use crate::error::ConfigError;
use crate::semantics::SemanticRole;

/// Top-level configuration of a [`Corpus`](crate::corpus::Corpus).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusConfig {
    #[serde(default)]
    pub identification: IdentificationConfig,
    #[serde(default)]
    pub bookkeeping: BookkeepingConfig,
    #[serde(default)]
    pub semantics: SemanticsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentificationConfig {
    /// Answer attachment queries from direct and transitive edges instead of
    /// walking containment chains.
    #[serde(default)]
    pub use_transitive_edges: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookkeepingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for BookkeepingConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Motif recognition switch and the rules that tag regions on registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_kinase_interpro_ids")]
    pub kinase_interpro_ids: Vec<String>,
    #[serde(default)]
    pub kinase_name_patterns: Vec<String>,
    #[serde(default = "default_sh2_interpro_ids")]
    pub sh2_interpro_ids: Vec<String>,
    #[serde(default)]
    pub sh2_name_patterns: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_kinase_interpro_ids() -> Vec<String> {
    vec!["IPR000719".into()]
}

fn default_sh2_interpro_ids() -> Vec<String> {
    vec!["IPR000980".into()]
}

impl Default for SemanticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kinase_interpro_ids: default_kinase_interpro_ids(),
            kinase_name_patterns: Vec::new(),
            sh2_interpro_ids: default_sh2_interpro_ids(),
            sh2_name_patterns: Vec::new(),
        }
    }
}

fn matches_rule(fragment: &FragmentAttrs, interpro_ids: &[String], patterns: &[String]) -> bool {
    let by_id = interpro_ids
        .iter()
        .any(|id| fragment.interpro_ids.contains(id));
    let by_name = patterns.iter().any(|pattern| {
        let pattern = pattern.to_lowercase();
        fragment
            .names
            .iter()
            .any(|name| name.to_lowercase().contains(&pattern))
    });
    by_id || by_name
}

impl SemanticsConfig {
    /// Roles a region earns from its InterPro ids and names.
    pub fn tags_for(&self, fragment: &FragmentAttrs) -> Vec<SemanticRole> {
        let mut roles = Vec::new();
        if matches_rule(fragment, &self.kinase_interpro_ids, &self.kinase_name_patterns) {
            roles.push(SemanticRole::ProteinKinase);
        }
        if matches_rule(fragment, &self.sh2_interpro_ids, &self.sh2_name_patterns) {
            roles.push(SemanticRole::Sh2Domain);
        }
        roles
    }
}

impl CorpusConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, "<inline>")
    }

    fn parse(content: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }
}
