//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors produced by the scenario engine (graph edits, execution state
/// changes, reads).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Lookup / state errors ------

    /// A referenced scenario, node, connection or execution does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// A connection already exists for this ordered node pair.
    #[error("connection from '{source_node_id}' to '{target_node_id}' already exists")]
    Conflict {
        source_node_id: Uuid,
        target_node_id: Uuid,
    },

    /// The requested transition is not allowed from the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A stored row could not be decoded into its domain type.
    #[error("corrupt {entity} record '{id}': {reason}")]
    CorruptRecord {
        entity: &'static str,
        id: Uuid,
        reason: String,
    },

    // ------ Graph validation errors ------

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(Uuid),

    /// A connection references a node ID that doesn't exist in the graph.
    #[error("connection references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference { node_id: Uuid, side: &'static str },

    /// Topological sort detected a cycle.
    #[error("scenario graph contains a cycle")]
    CycleDetected,

    // ------ Storage ------

    /// Persistence error from the db crate, propagated unmodified.
    #[error("storage failure: {0}")]
    Storage(#[from] db::DbError),
}

impl EngineError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
