//! `MetricsAggregator` — execution and per-node statistics derived from the
//! event history.
//!
//! Once an execution carries cached metrics they are returned as-is forever,
//! even if more events are appended later. Deriving never writes; caching is
//! the caller's explicit `ExecutionCoordinator::record_metrics` call.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use db::Store;

use crate::{
    EngineError, EventLog,
    models::{Execution, ExecutionEvent, event_types},
};

/// Outcome of a single node as seen in the event history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRunStatus {
    /// Observed, but never started.
    Pending,
    /// Started with no terminal event yet.
    Running,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    /// Milliseconds from the first `node_started` to the first terminal event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    pub status: NodeRunStatus,
    pub retry_count: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    /// Milliseconds from `execution_started` to the first terminal event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration_ms: Option<i64>,
    pub event_counts: BTreeMap<String, u64>,
    pub node_metrics: BTreeMap<Uuid, NodeMetrics>,
}

/// Derive metrics from an ascending event snapshot.
///
/// Partial or out-of-place sequences never fail: a node missing its start or
/// terminal event simply has no duration.
pub fn derive_metrics(events: &[ExecutionEvent]) -> ExecutionMetrics {
    let mut metrics = ExecutionMetrics::default();

    let mut started_at = None;
    let mut finished_at = None;

    #[derive(Default)]
    struct NodeTrack {
        started: Option<chrono::DateTime<chrono::Utc>>,
        terminal: Option<(chrono::DateTime<chrono::Utc>, NodeRunStatus)>,
        skipped: bool,
        retries: u32,
    }
    let mut nodes: BTreeMap<Uuid, NodeTrack> = BTreeMap::new();

    for event in events {
        *metrics.event_counts.entry(event.event_type.clone()).or_insert(0) += 1;

        match event.event_type.as_str() {
            event_types::EXECUTION_STARTED => {
                started_at.get_or_insert(event.timestamp);
            }
            event_types::EXECUTION_COMPLETED | event_types::EXECUTION_FAILED => {
                finished_at.get_or_insert(event.timestamp);
            }
            _ => {}
        }

        let Some(node_id) = event.node_id else {
            continue;
        };
        let track = nodes.entry(node_id).or_default();
        match event.event_type.as_str() {
            event_types::NODE_STARTED => {
                track.started.get_or_insert(event.timestamp);
            }
            event_types::NODE_COMPLETED => {
                track
                    .terminal
                    .get_or_insert((event.timestamp, NodeRunStatus::Completed));
            }
            event_types::NODE_FAILED => {
                track
                    .terminal
                    .get_or_insert((event.timestamp, NodeRunStatus::Failed));
            }
            event_types::NODE_SKIPPED => track.skipped = true,
            event_types::RETRY_ATTEMPTED => track.retries += 1,
            _ => {}
        }
    }

    metrics.total_duration_ms = match (started_at, finished_at) {
        (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
        _ => None,
    };

    metrics.node_metrics = nodes
        .into_iter()
        .map(|(node_id, track)| {
            let status = match (&track.terminal, track.started) {
                (Some((_, status)), _) => *status,
                (None, _) if track.skipped => NodeRunStatus::Skipped,
                (None, Some(_)) => NodeRunStatus::Running,
                (None, None) => NodeRunStatus::Pending,
            };
            let duration_ms = match (track.started, track.terminal) {
                (Some(start), Some((end, _))) => Some((end - start).num_milliseconds()),
                _ => None,
            };
            (
                node_id,
                NodeMetrics {
                    duration_ms,
                    status,
                    retry_count: track.retries,
                },
            )
        })
        .collect();

    metrics
}

#[derive(Clone)]
pub struct MetricsAggregator {
    store: Arc<dyn Store>,
    events: EventLog,
}

impl MetricsAggregator {
    pub fn new(store: Arc<dyn Store>, events: EventLog) -> Self {
        Self { store, events }
    }

    /// Cached metrics when present, otherwise freshly derived ones.
    pub async fn compute_metrics(
        &self,
        execution_id: Uuid,
    ) -> Result<ExecutionMetrics, EngineError> {
        let row = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| EngineError::not_found("execution", execution_id))?;
        let execution = Execution::try_from(row)?;

        if let Some(cached) = execution.metrics {
            debug!(%execution_id, "returning cached metrics");
            return Ok(cached);
        }

        let history = self.events.history(execution_id).await?;
        debug!(%execution_id, events = history.len(), "deriving metrics");
        Ok(derive_metrics(&history))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use serde_json::json;

    use crate::models::EventLevel;

    struct Timeline {
        execution_id: Uuid,
        origin: DateTime<Utc>,
        events: Vec<ExecutionEvent>,
    }

    impl Timeline {
        fn new() -> Self {
            Self { execution_id: Uuid::new_v4(), origin: Utc::now(), events: Vec::new() }
        }

        fn at(mut self, ms: i64, event_type: &str, node_id: Option<Uuid>) -> Self {
            self.events.push(ExecutionEvent {
                id: Uuid::new_v4(),
                execution_id: self.execution_id,
                event_type: event_type.into(),
                node_id,
                timestamp: self.origin + Duration::milliseconds(ms),
                details: json!({}),
                level: EventLevel::infer(event_type),
            });
            self
        }
    }

    #[test]
    fn full_run_yields_durations_and_counts() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let t = Timeline::new()
            .at(0, event_types::EXECUTION_STARTED, None)
            .at(10, event_types::NODE_STARTED, Some(a))
            .at(40, event_types::NODE_COMPLETED, Some(a))
            .at(45, event_types::NODE_STARTED, Some(b))
            .at(60, event_types::RETRY_ATTEMPTED, Some(b))
            .at(70, event_types::RETRY_ATTEMPTED, Some(b))
            .at(95, event_types::NODE_COMPLETED, Some(b))
            .at(100, event_types::EXECUTION_COMPLETED, None);

        let m = derive_metrics(&t.events);
        assert_eq!(m.total_duration_ms, Some(100));
        assert_eq!(m.event_counts["node_started"], 2);
        assert_eq!(m.event_counts["retry_attempted"], 2);

        assert_eq!(
            m.node_metrics[&a],
            NodeMetrics { duration_ms: Some(30), status: NodeRunStatus::Completed, retry_count: 0 }
        );
        assert_eq!(
            m.node_metrics[&b],
            NodeMetrics { duration_ms: Some(50), status: NodeRunStatus::Completed, retry_count: 2 }
        );
    }

    #[test]
    fn first_terminal_event_wins() {
        let a = Uuid::new_v4();
        let t = Timeline::new()
            .at(0, event_types::NODE_STARTED, Some(a))
            .at(5, event_types::NODE_FAILED, Some(a))
            .at(9, event_types::NODE_COMPLETED, Some(a));

        let m = derive_metrics(&t.events);
        assert_eq!(m.node_metrics[&a].status, NodeRunStatus::Failed);
        assert_eq!(m.node_metrics[&a].duration_ms, Some(5));
    }

    #[test]
    fn partial_sequences_omit_durations() {
        let (running, orphan, skipped) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let t = Timeline::new()
            .at(0, event_types::EXECUTION_STARTED, None)
            .at(1, event_types::NODE_STARTED, Some(running))
            .at(2, event_types::NODE_COMPLETED, Some(orphan))
            .at(3, event_types::NODE_SKIPPED, Some(skipped));

        let m = derive_metrics(&t.events);
        assert_eq!(m.total_duration_ms, None);
        assert_eq!(m.node_metrics[&running].status, NodeRunStatus::Running);
        assert_eq!(m.node_metrics[&running].duration_ms, None);
        assert_eq!(m.node_metrics[&orphan].status, NodeRunStatus::Completed);
        assert_eq!(m.node_metrics[&orphan].duration_ms, None);
        assert_eq!(m.node_metrics[&skipped].status, NodeRunStatus::Skipped);
    }

    #[test]
    fn empty_history_is_empty_metrics() {
        assert_eq!(derive_metrics(&[]), ExecutionMetrics::default());
    }

    #[test]
    fn metrics_survive_a_json_round_trip() {
        let a = Uuid::new_v4();
        let t = Timeline::new()
            .at(0, event_types::EXECUTION_STARTED, None)
            .at(3, event_types::NODE_STARTED, Some(a));
        let m = derive_metrics(&t.events);

        let stored = serde_json::to_value(&m).unwrap();
        assert!(stored.get("total_duration_ms").is_none());
        assert_eq!(serde_json::from_value::<ExecutionMetrics>(stored).unwrap(), m);
    }
}
