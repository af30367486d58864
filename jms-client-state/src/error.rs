//! Error types for the state tree, message access and configuration.
//!
//! COW bookkeeping failures are not represented here: an aliasing violation
//! is an invariant failure and panics through `debug_assert!` instead of
//! being returned.

use thiserror::Error;

use crate::state::node::{NodeId, NodeKindTag};

/// Failures raised by state-tree operations and session construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The resource manager could not hand out a local transaction id.
    #[error("resource manager could not allocate a local transaction id: {reason}")]
    ResourceAllocation { reason: String },

    /// A node was not where the tree said it should be.
    #[error("tree consistency violated at node {node}: {detail}")]
    TreeConsistency { node: NodeId, detail: String },

    /// Attaching the child would close a loop in the parent chain.
    #[error("attaching node {child} under {parent} would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },

    /// The parent is closing or closed and no longer accepts children.
    #[error("node {parent} is closed and cannot accept child {child}")]
    ParentClosed { parent: NodeId, child: NodeId },

    /// The child is already attached and the duplicate policy rejects it.
    #[error("node {child} is already a child of {parent}")]
    DuplicateChild { parent: NodeId, child: NodeId },

    /// A typed child was requested from a node of the wrong kind.
    #[error("a {child} cannot be created under a {parent}")]
    WrongParentKind {
        parent: NodeKindTag,
        child: NodeKindTag,
    },

    /// The connection's client id can be set once.
    #[error("client id is already set to {current:?}")]
    ClientIdAlreadySet { current: String },
}

impl StateError {
    /// Shorthand for a [`StateError::TreeConsistency`] error.
    pub fn inconsistent(node: NodeId, detail: impl Into<String>) -> Self {
        Self::TreeConsistency {
            node,
            detail: detail.into(),
        }
    }
}

/// Failures raised by typed property and body access.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// The name is not a legal property identifier.
    #[error("invalid property name {name:?}: {reason}")]
    InvalidPropertyName { name: String, reason: &'static str },

    /// A stored value cannot be read as the requested type.
    #[error("cannot read {name:?} as {requested}: stored value is {actual}")]
    Format {
        name: String,
        requested: &'static str,
        actual: String,
    },

    /// The body holds a different kind of payload than the operation needs.
    #[error("expected a {expected} body, found {actual}")]
    WrongBodyKind {
        expected: &'static str,
        actual: &'static str,
    },

    /// JMS priorities run from 0 to 9.
    #[error("priority {0} is outside 0..=9")]
    InvalidPriority(u8),

    /// The producer has no default destination and none was given.
    #[error("no destination given and the producer has no default")]
    NoDestination,
}

/// Failures raised while loading or validating [`ClientStateConfig`](crate::config::ClientStateConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
