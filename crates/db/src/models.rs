//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models — they carry no domain behaviour.
//! Domain types live in the `engine` crate, which converts rows into
//! typed values (status enums, severity levels, metrics) on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// scenarios
// ---------------------------------------------------------------------------

/// A persisted scenario row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScenarioRow {
    pub id: Uuid,
    pub name: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// nodes
// ---------------------------------------------------------------------------

/// A persisted node row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NodeRow {
    pub id: Uuid,
    pub scenario_id: Uuid,
    /// Connector identifier, e.g. `"http_request"`.
    pub node_type: String,
    pub label: String,
    pub config: serde_json::Value,
    /// Opaque UI hint (canvas coordinates or similar).
    pub position: serde_json::Value,
    pub sort_order: i32,
    pub output_schema: Option<serde_json::Value>,
    pub sample_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// connections
// ---------------------------------------------------------------------------

/// A persisted connection (directed edge) row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConnectionRow {
    pub id: Uuid,
    pub scenario_id: Uuid,
    pub source_node_id: Uuid,
    pub target_node_id: Uuid,
    /// Optional field-transform specification.
    pub mapping: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// executions
// ---------------------------------------------------------------------------

/// A persisted execution row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionRow {
    pub id: Uuid,
    pub scenario_id: Uuid,
    /// One of `running`, `completed`, `failed`.
    pub status: String,
    pub progress: f64,
    pub current_node_id: Option<Uuid>,
    pub estimated_time_remaining_ms: Option<i64>,
    pub trigger: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Node blamed for a failed run, when the executor named one.
    pub failed_node_id: Option<Uuid>,
    /// Cached metrics, written at most once.
    pub metrics: Option<serde_json::Value>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

/// Partial update of an execution row. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPatch {
    pub status: Option<String>,
    pub progress: Option<f64>,
    pub current_node_id: Option<Uuid>,
    /// `Some(None)` clears the stored estimate.
    pub estimated_time_remaining_ms: Option<Option<i64>>,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub failed_node_id: Option<Uuid>,
    pub metrics: Option<serde_json::Value>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ExecutionPatch {
    /// Apply the patch in place. Used by stores that hold rows in memory.
    pub fn apply(&self, row: &mut ExecutionRow) {
        if let Some(status) = &self.status {
            row.status = status.clone();
        }
        if let Some(progress) = self.progress {
            row.progress = progress;
        }
        if let Some(node_id) = self.current_node_id {
            row.current_node_id = Some(node_id);
        }
        if let Some(eta) = self.estimated_time_remaining_ms {
            row.estimated_time_remaining_ms = eta;
        }
        if let Some(output) = &self.output {
            row.output = Some(output.clone());
        }
        if let Some(error) = &self.error {
            row.error = Some(error.clone());
        }
        if let Some(node_id) = self.failed_node_id {
            row.failed_node_id = Some(node_id);
        }
        if let Some(metrics) = &self.metrics {
            row.metrics = Some(metrics.clone());
        }
        if let Some(end_time) = self.end_time {
            row.end_time = Some(end_time);
        }
        if let Some(last_updated) = self.last_updated {
            row.last_updated = last_updated;
        }
    }
}

// ---------------------------------------------------------------------------
// execution_events
// ---------------------------------------------------------------------------

/// A persisted execution event row. Rows are never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionEventRow {
    pub id: Uuid,
    /// Storage-assigned insertion sequence; breaks timestamp ties.
    pub seq: i64,
    pub execution_id: Uuid,
    pub event_type: String,
    pub node_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub details: serde_json::Value,
    /// One of `debug`, `info`, `warning`, `error`, `critical`.
    pub level: String,
}

/// Sort direction for time-ordered event reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrder {
    /// Oldest first.
    Ascending,
    /// Newest first.
    Descending,
}
