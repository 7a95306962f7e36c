//! Non-fatal warnings raised during identification and motif recognition.
//!
//! Ambiguity never fails an insertion. It resolves to "no match" or "skip"
//! and leaves a [`Warning`] in the caller-provided [`Diagnostics`] collector,
//! which also forwards it to `tracing`.

use std::fmt;

use serde::Serialize;

use crate::store::NodeId;

/// A recoverable anomaly found while processing a nugget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Several existing fragments fit the query and nothing disambiguates them.
    AmbiguousFragment {
        query: String,
        candidates: Vec<NodeId>,
    },
    /// The enzyme region named by a phosphorylation is not a known kinase, or
    /// the enzyme site named lies in no kinase region.
    UntaggedEnzymeRegion { region: NodeId },
    /// The enzyme has several kinase regions and the nugget names none.
    AmbiguousKinase {
        protoform: NodeId,
        candidates: Vec<NodeId>,
    },
    /// The enzyme has no kinase region at all.
    MissingKinase { protoform: NodeId },
    /// Binding partners cannot be split into exactly two sides.
    UngroupablePartners { bnd: NodeId, partners: Vec<NodeId> },
    /// A binding partner has several SH2 domains and the nugget names none.
    AmbiguousSh2Domain {
        protoform: NodeId,
        candidates: Vec<NodeId>,
    },
    /// An SH2 binding whose partner carries no phosphorylated tyrosine.
    MissingPhosphoTyrosine { bnd: NodeId },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AmbiguousFragment { query, candidates } => write!(
                f,
                "fragment '{query}' matches {} existing fragments; creating a new one",
                candidates.len()
            ),
            Self::UntaggedEnzymeRegion { region } => write!(
                f,
                "enzyme component {region} is not within a protein kinase region; phosphorylation not recognised"
            ),
            Self::AmbiguousKinase {
                protoform,
                candidates,
            } => write!(
                f,
                "protoform {protoform} has {} protein kinase regions; cannot pick the enzyme",
                candidates.len()
            ),
            Self::MissingKinase { protoform } => {
                write!(f, "protoform {protoform} has no protein kinase region")
            }
            Self::UngroupablePartners { bnd, partners } => write!(
                f,
                "binding {bnd}: {} partners cannot be grouped into two sides",
                partners.len()
            ),
            Self::AmbiguousSh2Domain {
                protoform,
                candidates,
            } => write!(
                f,
                "protoform {protoform} has {} SH2 domains; cannot pick the binding one",
                candidates.len()
            ),
            Self::MissingPhosphoTyrosine { bnd } => write!(
                f,
                "binding {bnd} involves an SH2 domain but no phosphorylated tyrosine"
            ),
        }
    }
}

/// Collector for warnings raised during one operation.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning and emit it on the `tracing` channel.
    pub fn push(&mut self, warning: Warning) {
        tracing::warn!(warning = %warning, "ambiguity during nugget processing");
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.warnings.extend(other.warnings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_in_order() {
        let mut diag = Diagnostics::new();
        let node = NodeId::new(1, 0);
        diag.push(Warning::MissingKinase { protoform: node });
        diag.push(Warning::UntaggedEnzymeRegion { region: node });
        assert_eq!(diag.len(), 2);
        assert!(matches!(diag.warnings()[0], Warning::MissingKinase { .. }));
    }

    #[test]
    fn warning_serialises_with_kind_tag() {
        let w = Warning::MissingPhosphoTyrosine {
            bnd: NodeId::new(4, 2),
        };
        let json = serde_json::to_string(&w).unwrap();
        assert!(json.contains("\"kind\":\"missing_phospho_tyrosine\""));
        assert!(w.to_string().contains("node:4v2"));
    }
}
