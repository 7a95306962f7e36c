//! Rich diagnostic error types for the action-graph engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. Ambiguity during identification is never
//! an error: it is reported as a [`Warning`](crate::diagnostics::Warning) instead.

use miette::Diagnostic;
use thiserror::Error;

use crate::attrs::MetaType;

/// Top-level error type for the engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum KbError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Identify(#[from] IdentifyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Corpus(#[from] CorpusError),
}

// ---------------------------------------------------------------------------
// Graph store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("node {node} does not exist in the graph")]
    #[diagnostic(
        code(actiongraph::graph::node_not_found),
        help(
            "The handle was never issued by this store, or the node was removed \
             by a corpus clear. Use `resolve()` to look up handles across merges."
        )
    )]
    NodeNotFound { node: String },

    #[error("stale handle {node}: the node was merged or removed")]
    #[diagnostic(
        code(actiongraph::graph::stale_node),
        help(
            "Merges issue a fresh handle for the surviving node. \
             Call `resolve()` on the old handle to obtain the live one."
        )
    )]
    StaleNode { node: String },

    #[error("edge {source_node} -> {target} does not exist")]
    #[diagnostic(
        code(actiongraph::graph::edge_not_found),
        help("Add the edge with `add_edge` before attaching attributes to it.")
    )]
    EdgeNotFound { source_node: String, target: String },

    #[error("meta-type mismatch: expected {expected}, found {actual}")]
    #[diagnostic(
        code(actiongraph::graph::meta_type_mismatch),
        help(
            "Only nodes of the same meta-type can be merged or have their \
             attributes combined. Check the typing of the rule or merge set."
        )
    )]
    MetaTypeMismatch { expected: MetaType, actual: MetaType },

    #[error("rewrite rule references unbound node '{key}'")]
    #[diagnostic(
        code(actiongraph::graph::unbound_rule_node),
        help(
            "Every key used by a rewrite operation must either be bound by the \
             instance or introduced by an earlier `AddNode` operation."
        )
    )]
    UnboundRuleNode { key: String },

    #[error("invalid merge: {message}")]
    #[diagnostic(
        code(actiongraph::graph::invalid_merge),
        help("A merge needs at least one live node.")
    )]
    InvalidMerge { message: String },
}

/// Result type for graph store operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

// ---------------------------------------------------------------------------
// Identification errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum IdentifyError {
    #[error("no protoform reachable from {node}")]
    #[diagnostic(
        code(actiongraph::identify::protoform_not_found),
        help(
            "Every region, site, residue and state must be attached (directly or \
             through its owners) to a protoform. The graph is incomplete or corrupted."
        )
    )]
    ProtoformNotFound { node: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),
}

/// Result type for identification queries.
pub type IdentifyResult<T> = std::result::Result<T, IdentifyError>;

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    #[diagnostic(
        code(actiongraph::config::read),
        help("Check that the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(actiongraph::config::parse),
        help(
            "The configuration is TOML with optional [identification], \
             [bookkeeping] and [semantics] tables."
        )
    )]
    Parse { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Corpus errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum CorpusError {
    #[error("unknown nugget: {id}")]
    #[diagnostic(
        code(actiongraph::corpus::unknown_nugget),
        help("Nugget ids are issued by `add_interaction`. List them with `nugget_ids()`.")
    )]
    UnknownNugget { id: String },

    #[error("invalid interaction: {message}")]
    #[diagnostic(
        code(actiongraph::corpus::invalid_interaction),
        help(
            "An interaction needs a protoform with a uniprot accession on every \
             side, and a modification needs a target state."
        )
    )]
    InvalidInteraction { message: String },

    #[error("failed to load corpus input {path}: {message}")]
    #[diagnostic(
        code(actiongraph::corpus::input),
        help("The input is JSON with `protoforms` and `interactions` arrays.")
    )]
    Input { path: String, message: String },
}

/// Convenience alias for functions returning engine results.
pub type KbResult<T> = std::result::Result<T, KbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_error_converts_to_kb_error() {
        let err = GraphError::StaleNode {
            node: "node:3v1".into(),
        };
        let kb: KbError = err.into();
        assert!(matches!(kb, KbError::Graph(GraphError::StaleNode { .. })));
    }

    #[test]
    fn identify_error_wraps_graph_error() {
        let graph_err = GraphError::NodeNotFound {
            node: "node:9v0".into(),
        };
        let err: IdentifyError = graph_err.into();
        assert!(matches!(err, IdentifyError::Graph(GraphError::NodeNotFound { .. })));
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = GraphError::MetaTypeMismatch {
            expected: MetaType::Residue,
            actual: MetaType::State,
        };
        let msg = format!("{err}");
        assert!(msg.contains("residue"));
        assert!(msg.contains("state"));
    }
}
