//! Core domain models for the scenario engine.
//!
//! These are the typed views the engine hands to callers. They are decoded
//! from the `db` crate's row structs, which keep statuses and levels as
//! plain strings and payloads as raw JSON.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use db::models::{ConnectionRow, ExecutionEventRow, ExecutionRow, NodeRow, ScenarioRow};

use crate::{EngineError, metrics::ExecutionMetrics};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Well-known event type tags. The tag set is open: callers may append any
/// string, these are the ones the engine itself writes or interprets.
pub mod event_types {
    pub const EXECUTION_STARTED: &str = "execution_started";
    pub const NODE_STARTED: &str = "node_started";
    pub const NODE_COMPLETED: &str = "node_completed";
    pub const NODE_FAILED: &str = "node_failed";
    pub const NODE_SKIPPED: &str = "node_skipped";
    pub const RETRY_ATTEMPTED: &str = "retry_attempted";
    pub const PROGRESS_UPDATED: &str = "progress_updated";
    pub const EXECUTION_COMPLETED: &str = "execution_completed";
    pub const EXECUTION_FAILED: &str = "execution_failed";

    /// Tags that mark the run itself starting or ending. Only the
    /// coordinator's own transitions may write these.
    pub fn is_execution_lifecycle(event_type: &str) -> bool {
        matches!(event_type, EXECUTION_STARTED | EXECUTION_COMPLETED | EXECUTION_FAILED)
    }
}

// ---------------------------------------------------------------------------
// EventLevel
// ---------------------------------------------------------------------------

/// Event severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl EventLevel {
    /// Severity the engine assigns when the caller gives none.
    pub fn infer(event_type: &str) -> Self {
        match event_type {
            event_types::NODE_FAILED | event_types::EXECUTION_FAILED => Self::Error,
            event_types::RETRY_ATTEMPTED => Self::Warning,
            event_types::PROGRESS_UPDATED => Self::Debug,
            _ => Self::Info,
        }
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for EventLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown event level: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionStatus
// ---------------------------------------------------------------------------

/// Execution state. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Scenario graph
// ---------------------------------------------------------------------------

/// A named automation; the membership boundary for nodes and connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: Uuid,
    pub name: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
}

impl From<ScenarioRow> for Scenario {
    fn from(row: ScenarioRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            owner: row.owner,
            created_at: row.created_at,
        }
    }
}

/// A configured unit of work inside a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    pub scenario_id: Uuid,
    /// Connector identifier.
    pub node_type: String,
    pub label: String,
    pub config: Value,
    pub position: Value,
    pub order: i32,
    pub output_schema: Option<Value>,
    pub sample_data: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<NodeRow> for Node {
    fn from(row: NodeRow) -> Self {
        Self {
            id: row.id,
            scenario_id: row.scenario_id,
            node_type: row.node_type,
            label: row.label,
            config: row.config,
            position: row.position,
            order: row.sort_order,
            output_schema: row.output_schema,
            sample_data: row.sample_data,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Caller-supplied fields for a new node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNode {
    pub node_type: String,
    pub label: String,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub position: Value,
    #[serde(default)]
    pub order: i32,
}

/// Partial node edit; `None` keeps the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub node_type: Option<String>,
    pub label: Option<String>,
    pub config: Option<Value>,
    pub position: Option<Value>,
    pub order: Option<i32>,
}

/// Directed edge between two nodes of the same scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub scenario_id: Uuid,
    pub source_node_id: Uuid,
    pub target_node_id: Uuid,
    pub mapping: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ConnectionRow> for Connection {
    fn from(row: ConnectionRow) -> Self {
        Self {
            id: row.id,
            scenario_id: row.scenario_id,
            source_node_id: row.source_node_id,
            target_node_id: row.target_node_id,
            mapping: row.mapping,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Caller-supplied fields for a new connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConnection {
    pub scenario_id: Uuid,
    pub source_node_id: Uuid,
    pub target_node_id: Uuid,
    #[serde(default)]
    pub mapping: Option<Value>,
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// One run of a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub scenario_id: Uuid,
    pub status: ExecutionStatus,
    /// Percentage in `[0, 100]`.
    pub progress: f64,
    pub current_node_id: Option<Uuid>,
    pub estimated_time_remaining_ms: Option<i64>,
    pub trigger: Value,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub failed_node_id: Option<Uuid>,
    /// Write-once metrics cache.
    pub metrics: Option<ExecutionMetrics>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

impl TryFrom<ExecutionRow> for Execution {
    type Error = EngineError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| EngineError::CorruptRecord {
            entity: "execution",
            id: row.id,
            reason,
        };

        let status = row.status.parse::<ExecutionStatus>().map_err(corrupt)?;
        let metrics = match row.metrics {
            Some(raw) => Some(
                serde_json::from_value::<ExecutionMetrics>(raw)
                    .map_err(|e| corrupt(format!("metrics: {e}")))?,
            ),
            None => None,
        };

        Ok(Self {
            id: row.id,
            scenario_id: row.scenario_id,
            status,
            progress: row.progress,
            current_node_id: row.current_node_id,
            estimated_time_remaining_ms: row.estimated_time_remaining_ms,
            trigger: row.trigger,
            output: row.output,
            error: row.error,
            failed_node_id: row.failed_node_id,
            metrics,
            start_time: row.start_time,
            end_time: row.end_time,
            last_updated: row.last_updated,
        })
    }
}

// ---------------------------------------------------------------------------
// ExecutionEvent
// ---------------------------------------------------------------------------

/// An immutable fact appended to an execution's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub event_type: String,
    pub node_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub details: Value,
    pub level: EventLevel,
}

impl TryFrom<ExecutionEventRow> for ExecutionEvent {
    type Error = EngineError;

    fn try_from(row: ExecutionEventRow) -> Result<Self, Self::Error> {
        let level = row
            .level
            .parse::<EventLevel>()
            .map_err(|reason| EngineError::CorruptRecord {
                entity: "execution event",
                id: row.id,
                reason,
            })?;

        Ok(Self {
            id: row.id,
            execution_id: row.execution_id,
            event_type: row.event_type,
            node_id: row.node_id,
            timestamp: row.timestamp,
            details: row.details,
            level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inferred_levels_follow_event_type() {
        assert_eq!(EventLevel::infer(event_types::NODE_FAILED), EventLevel::Error);
        assert_eq!(EventLevel::infer(event_types::RETRY_ATTEMPTED), EventLevel::Warning);
        assert_eq!(EventLevel::infer(event_types::NODE_STARTED), EventLevel::Info);
        assert_eq!(EventLevel::infer("custom_tag"), EventLevel::Info);
    }

    #[test]
    fn lifecycle_tags_are_recognised() {
        for tag in [
            event_types::EXECUTION_STARTED,
            event_types::EXECUTION_COMPLETED,
            event_types::EXECUTION_FAILED,
        ] {
            assert!(event_types::is_execution_lifecycle(tag));
        }
        assert!(!event_types::is_execution_lifecycle(event_types::NODE_COMPLETED));
        assert!(!event_types::is_execution_lifecycle("execution_paused"));
    }

    #[test]
    fn levels_are_ordered_by_severity() {
        assert!(EventLevel::Debug < EventLevel::Info);
        assert!(EventLevel::Warning < EventLevel::Error);
        assert!(EventLevel::Error < EventLevel::Critical);
    }

    #[test]
    fn level_and_status_strings_round_trip() {
        for level in ["debug", "info", "warning", "error", "critical"] {
            assert_eq!(level.parse::<EventLevel>().unwrap().to_string(), level);
        }
        for status in ["running", "completed", "failed"] {
            assert_eq!(status.parse::<ExecutionStatus>().unwrap().to_string(), status);
        }
        assert!("queued".parse::<ExecutionStatus>().is_err());
    }

    #[test]
    fn unknown_status_in_row_is_a_corrupt_record() {
        let now = Utc::now();
        let row = ExecutionRow {
            id: Uuid::new_v4(),
            scenario_id: Uuid::new_v4(),
            status: "paused".into(),
            progress: 0.0,
            current_node_id: None,
            estimated_time_remaining_ms: None,
            trigger: json!({}),
            output: None,
            error: None,
            failed_node_id: None,
            metrics: None,
            start_time: now,
            end_time: None,
            last_updated: now,
        };

        assert!(matches!(
            Execution::try_from(row),
            Err(EngineError::CorruptRecord { entity: "execution", .. })
        ));
    }
}
