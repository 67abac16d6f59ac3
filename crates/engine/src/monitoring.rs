//! `MonitoringFacade` — read-only projections for polling clients.
//!
//! Nothing here writes. Results may lag the latest write slightly; callers
//! poll again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use db::Store;

use crate::{
    EngineConfig, EngineError, EventLog, GraphStore,
    metrics::{NodeRunStatus, derive_metrics},
    models::{Execution, ExecutionStatus, Node},
    payload::Payload,
};

/// Lightweight status for high-frequency polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatusView {
    pub status: ExecutionStatus,
    pub progress: f64,
    pub estimated_time_remaining_ms: Option<i64>,
    pub error: Option<String>,
    pub failed_node_id: Option<Uuid>,
    pub is_complete: bool,
}

/// Last-known facts about the node an execution is on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentNode {
    pub node_id: Uuid,
    /// `"unknown"` when neither the event nor the graph knows it.
    pub node_type: String,
    pub operation: Option<String>,
    pub position: Value,
    pub label: Option<String>,
    /// Error carried by the node's latest event, if it reported one.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub running: usize,
    pub pending: usize,
}

impl NodeStats {
    /// Percentage of nodes that reached a final state, in `[0, 100]`.
    pub fn settled_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let settled = self.completed + self.failed + self.skipped;
        settled as f64 * 100.0 / self.total as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionDetails {
    pub id: Uuid,
    pub scenario_id: Uuid,
    pub status: ExecutionStatus,
    pub progress: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
    pub current_node: Option<CurrentNode>,
    /// Present only once the execution is terminal.
    pub output: Option<Value>,
    pub error: Option<String>,
    pub failed_node_id: Option<Uuid>,
    pub node_stats: NodeStats,
}

/// A running execution as listed for a scenario dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveExecution {
    pub id: Uuid,
    pub scenario_id: Uuid,
    /// Progress as last reported by the executor.
    pub progress: f64,
    /// Progress implied by node outcomes so far.
    pub node_progress: f64,
    pub current_node_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Milliseconds since the run started.
    pub duration_ms: i64,
    pub node_stats: NodeStats,
}

#[derive(Clone)]
pub struct MonitoringFacade {
    store: Arc<dyn Store>,
    graph: GraphStore,
    events: EventLog,
    config: EngineConfig,
}

impl MonitoringFacade {
    pub fn new(
        store: Arc<dyn Store>,
        graph: GraphStore,
        events: EventLog,
        config: EngineConfig,
    ) -> Self {
        Self { store, graph, events, config }
    }

    pub async fn get_status(
        &self,
        execution_id: Uuid,
    ) -> Result<ExecutionStatusView, EngineError> {
        let execution = self.load(execution_id).await?;
        Ok(ExecutionStatusView {
            status: execution.status,
            progress: execution.progress,
            estimated_time_remaining_ms: execution.estimated_time_remaining_ms,
            error: execution.error,
            failed_node_id: execution.failed_node_id,
            is_complete: execution.status != ExecutionStatus::Running,
        })
    }

    pub async fn get_details(&self, execution_id: Uuid) -> Result<ExecutionDetails, EngineError> {
        let execution = self.load(execution_id).await?;

        let current_node = match execution.current_node_id {
            Some(node_id) => Some(self.resolve_current_node(execution_id, node_id).await?),
            None => None,
        };
        let nodes = self.graph.list_nodes(execution.scenario_id).await?;
        let node_stats = self.node_stats(&nodes, execution.id).await?;

        debug!(%execution_id, status = %execution.status, "execution details resolved");
        Ok(ExecutionDetails {
            id: execution.id,
            scenario_id: execution.scenario_id,
            status: execution.status,
            progress: execution.progress,
            start_time: execution.start_time,
            end_time: execution.end_time,
            last_updated: execution.last_updated,
            current_node,
            output: if execution.status.is_terminal() {
                execution.output
            } else {
                None
            },
            error: execution.error,
            failed_node_id: execution.failed_node_id,
            node_stats,
        })
    }

    /// Executions of a scenario, most recently started first.
    pub async fn list_executions(
        &self,
        scenario_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<Execution>, EngineError> {
        let limit = limit.unwrap_or(self.config.execution_list_limit);
        self.store
            .list_executions_by_scenario(scenario_id, limit)
            .await?
            .into_iter()
            .map(Execution::try_from)
            .collect()
    }

    /// Running executions of a scenario, most recently started first, with
    /// node outcomes so far. `limit` defaults to the configured list limit.
    pub async fn active_executions(
        &self,
        scenario_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<ActiveExecution>, EngineError> {
        let limit = limit.unwrap_or(self.config.execution_list_limit);
        let rows = self
            .store
            .list_executions_by_status(
                scenario_id,
                &ExecutionStatus::Running.to_string(),
                limit,
            )
            .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let nodes = self.graph.list_nodes(scenario_id).await?;
        let now = Utc::now();
        let mut active = Vec::with_capacity(rows.len());
        for row in rows {
            let execution = Execution::try_from(row)?;
            let node_stats = self.node_stats(&nodes, execution.id).await?;
            active.push(ActiveExecution {
                id: execution.id,
                scenario_id: execution.scenario_id,
                progress: execution.progress,
                node_progress: node_stats.settled_percent(),
                current_node_id: execution.current_node_id,
                start_time: execution.start_time,
                last_updated: execution.last_updated,
                duration_ms: (now - execution.start_time).num_milliseconds().max(0),
                node_stats,
            });
        }
        debug!(%scenario_id, active = active.len(), "active executions listed");
        Ok(active)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    async fn load(&self, execution_id: Uuid) -> Result<Execution, EngineError> {
        let row = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| EngineError::not_found("execution", execution_id))?;
        Execution::try_from(row)
    }

    /// Join the node's latest event in this execution with its graph record.
    /// Event details win; the graph fills the gaps. A node deleted since the
    /// run started still resolves from the event alone.
    async fn resolve_current_node(
        &self,
        execution_id: Uuid,
        node_id: Uuid,
    ) -> Result<CurrentNode, EngineError> {
        let latest = self
            .events
            .list_for_node(node_id, Some(execution_id), Some(1))
            .await?
            .into_iter()
            .next();
        let node = match self.graph.get_node(node_id).await {
            Ok(node) => Some(node),
            Err(EngineError::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };

        let details = latest.as_ref().map(|e| Payload::new(&e.details));
        let config = node.as_ref().map(|n| Payload::new(&n.config));

        let node_type = details
            .and_then(|d| d.node_type())
            .or(node.as_ref().map(|n| n.node_type.as_str()))
            .unwrap_or("unknown")
            .to_owned();
        let operation = details
            .and_then(|d| d.operation())
            .or(config.and_then(|c| c.operation()))
            .map(str::to_owned);
        let position = details
            .and_then(|d| d.position())
            .or(node.as_ref().map(|n| &n.position))
            .cloned()
            .unwrap_or(Value::Null);

        let error = details.and_then(|d| d.error()).map(str::to_owned);

        Ok(CurrentNode {
            node_id,
            node_type,
            operation,
            position,
            label: node.map(|n| n.label),
            error,
        })
    }

    async fn node_stats(
        &self,
        nodes: &[Node],
        execution_id: Uuid,
    ) -> Result<NodeStats, EngineError> {
        let history = self.events.history(execution_id).await?;
        let metrics = derive_metrics(&history);

        let mut stats = NodeStats {
            total: nodes.len(),
            ..Default::default()
        };
        for node in nodes {
            let status = metrics
                .node_metrics
                .get(&node.id)
                .map_or(NodeRunStatus::Pending, |m| m.status);
            match status {
                NodeRunStatus::Completed => stats.completed += 1,
                NodeRunStatus::Failed => stats.failed += 1,
                NodeRunStatus::Skipped => stats.skipped += 1,
                NodeRunStatus::Running => stats.running += 1,
                NodeRunStatus::Pending => stats.pending += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::MemoryStore;
    use serde_json::json;

    use crate::{
        ExecutionCoordinator,
        models::{NewNode, NodeUpdate, event_types},
    };

    struct Fixture {
        monitoring: MonitoringFacade,
        coordinator: ExecutionCoordinator,
        graph: GraphStore,
        scenario_id: Uuid,
        nodes: Vec<Uuid>,
    }

    async fn fixture(node_count: usize) -> Fixture {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let config = EngineConfig::default();
        let events = EventLog::new(store.clone(), config.clone());
        let graph = GraphStore::new(store.clone());
        let scenario = graph.create_scenario("crm import", "sales").await.unwrap();

        let mut nodes = Vec::new();
        for i in 0..node_count {
            let node = graph
                .create_node(
                    scenario.id,
                    NewNode {
                        node_type: "sheets".into(),
                        label: format!("step {i}"),
                        config: json!({ "operation": "append_row" }),
                        position: json!({ "x": i, "y": 0 }),
                        order: i as i32,
                    },
                )
                .await
                .unwrap();
            nodes.push(node.id);
        }

        Fixture {
            monitoring: MonitoringFacade::new(store.clone(), graph.clone(), events.clone(), config),
            coordinator: ExecutionCoordinator::new(store, events),
            graph,
            scenario_id: scenario.id,
            nodes,
        }
    }

    #[tokio::test]
    async fn status_reflects_progress_and_completion() {
        let f = fixture(1).await;
        let id = f.coordinator.start_execution(f.scenario_id, json!({})).await.unwrap();

        f.coordinator.update_progress(id, 42.0, None, Some(9_000)).await.unwrap();
        let status = f.monitoring.get_status(id).await.unwrap();
        assert_eq!(status.progress, 42.0);
        assert_eq!(status.estimated_time_remaining_ms, Some(9_000));
        assert!(!status.is_complete);

        f.coordinator
            .fail_execution(id, "quota exceeded", Some(f.nodes[0]))
            .await
            .unwrap();
        let status = f.monitoring.get_status(id).await.unwrap();
        assert_eq!(status.status, ExecutionStatus::Failed);
        assert_eq!(status.error.as_deref(), Some("quota exceeded"));
        assert_eq!(status.failed_node_id, Some(f.nodes[0]));
        assert!(status.is_complete);

        let details = f.monitoring.get_details(id).await.unwrap();
        assert_eq!(details.failed_node_id, Some(f.nodes[0]));
    }

    #[tokio::test]
    async fn status_of_unknown_execution_is_not_found() {
        let f = fixture(0).await;
        assert!(matches!(
            f.monitoring.get_status(Uuid::new_v4()).await,
            Err(EngineError::NotFound { entity: "execution", .. })
        ));
    }

    #[tokio::test]
    async fn details_join_event_and_graph_for_current_node() {
        let f = fixture(1).await;
        let node = f.nodes[0];
        let id = f.coordinator.start_execution(f.scenario_id, json!({})).await.unwrap();

        f.coordinator
            .advance_node(id, node, event_types::NODE_STARTED, json!({ "operation": "upsert" }))
            .await
            .unwrap();

        let details = f.monitoring.get_details(id).await.unwrap();
        let current = details.current_node.expect("current node");
        assert_eq!(current.node_id, node);
        assert_eq!(current.node_type, "sheets");
        assert_eq!(current.operation.as_deref(), Some("upsert"));
        assert_eq!(current.error, None);
        assert_eq!(current.position, json!({ "x": 0, "y": 0 }));
        assert_eq!(current.label.as_deref(), Some("step 0"));
        assert!(details.output.is_none());

        f.coordinator
            .advance_node(id, node, event_types::NODE_FAILED, json!({ "error": "429 from API" }))
            .await
            .unwrap();
        let current = f.monitoring.get_details(id).await.unwrap().current_node.unwrap();
        assert_eq!(current.error.as_deref(), Some("429 from API"));
    }

    #[tokio::test]
    async fn details_fall_back_to_node_config_and_survive_deleted_nodes() {
        let f = fixture(1).await;
        let node = f.nodes[0];
        let id = f.coordinator.start_execution(f.scenario_id, json!({})).await.unwrap();
        f.coordinator
            .advance_node(id, node, event_types::NODE_STARTED, json!("not an object"))
            .await
            .unwrap();

        let current = f.monitoring.get_details(id).await.unwrap().current_node.unwrap();
        assert_eq!(current.operation.as_deref(), Some("append_row"));

        f.graph
            .update_node(node, NodeUpdate { label: Some("renamed".into()), ..Default::default() })
            .await
            .unwrap();
        f.graph.delete_node(node).await.unwrap();

        let current = f.monitoring.get_details(id).await.unwrap().current_node.unwrap();
        assert_eq!(current.node_type, "unknown");
        assert_eq!(current.operation, None);
        assert_eq!(current.position, Value::Null);
        assert_eq!(current.label, None);
    }

    #[tokio::test]
    async fn output_is_exposed_once_terminal() {
        let f = fixture(0).await;
        let id = f.coordinator.start_execution(f.scenario_id, json!({})).await.unwrap();
        f.coordinator.complete_execution(id, json!({ "rows": 12 })).await.unwrap();

        let details = f.monitoring.get_details(id).await.unwrap();
        assert_eq!(details.status, ExecutionStatus::Completed);
        assert_eq!(details.output, Some(json!({ "rows": 12 })));
        assert!(details.end_time.is_some());
    }

    #[tokio::test]
    async fn node_stats_count_every_scenario_node() {
        let f = fixture(4).await;
        let id = f.coordinator.start_execution(f.scenario_id, json!({})).await.unwrap();
        let c = &f.coordinator;

        c.advance_node(id, f.nodes[0], event_types::NODE_STARTED, json!({})).await.unwrap();
        c.advance_node(id, f.nodes[0], event_types::NODE_COMPLETED, json!({})).await.unwrap();
        c.advance_node(id, f.nodes[1], event_types::NODE_SKIPPED, json!({})).await.unwrap();
        c.advance_node(id, f.nodes[2], event_types::NODE_STARTED, json!({})).await.unwrap();

        let stats = f.monitoring.get_details(id).await.unwrap().node_stats;
        assert_eq!(
            stats,
            NodeStats { total: 4, completed: 1, failed: 0, skipped: 1, running: 1, pending: 1 }
        );
    }

    #[tokio::test]
    async fn listing_and_active_executions() {
        let f = fixture(0).await;
        let first = f.coordinator.start_execution(f.scenario_id, json!({})).await.unwrap();
        let second = f.coordinator.start_execution(f.scenario_id, json!({})).await.unwrap();
        f.coordinator.complete_execution(first, json!(null)).await.unwrap();

        let listed = f.monitoring.list_executions(f.scenario_id, None).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].start_time >= listed[1].start_time);

        let active = f.monitoring.active_executions(f.scenario_id, None).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second);
        assert!(active[0].duration_ms >= 0);
    }

    #[tokio::test]
    async fn active_executions_carry_node_outcomes() {
        let f = fixture(4).await;
        let id = f.coordinator.start_execution(f.scenario_id, json!({})).await.unwrap();
        let c = &f.coordinator;

        c.advance_node(id, f.nodes[0], event_types::NODE_STARTED, json!({})).await.unwrap();
        c.advance_node(id, f.nodes[0], event_types::NODE_COMPLETED, json!({})).await.unwrap();
        c.advance_node(id, f.nodes[1], event_types::NODE_SKIPPED, json!({})).await.unwrap();
        c.advance_node(id, f.nodes[2], event_types::NODE_STARTED, json!({})).await.unwrap();
        c.update_progress(id, 30.0, Some(f.nodes[2]), None).await.unwrap();

        let active = f.monitoring.active_executions(f.scenario_id, None).await.unwrap();
        assert_eq!(active.len(), 1);
        let run = &active[0];
        assert_eq!(run.progress, 30.0);
        assert_eq!(run.node_progress, 50.0);
        assert_eq!(run.current_node_id, Some(f.nodes[2]));
        assert_eq!(
            run.node_stats,
            NodeStats { total: 4, completed: 1, failed: 0, skipped: 1, running: 1, pending: 1 }
        );
    }

    #[tokio::test]
    async fn active_executions_are_capped() {
        let f = fixture(1).await;
        for _ in 0..12 {
            f.coordinator.start_execution(f.scenario_id, json!({})).await.unwrap();
        }

        let default_cap = f.monitoring.active_executions(f.scenario_id, None).await.unwrap();
        assert_eq!(default_cap.len(), EngineConfig::default().execution_list_limit);

        let explicit = f.monitoring.active_executions(f.scenario_id, Some(3)).await.unwrap();
        assert_eq!(explicit.len(), 3);

        let elsewhere = f.monitoring.active_executions(Uuid::new_v4(), None).await.unwrap();
        assert!(elsewhere.is_empty());
    }

    #[test]
    fn settled_share_of_an_empty_scenario_is_zero() {
        assert_eq!(NodeStats::default().settled_percent(), 0.0);
        let stats = NodeStats {
            total: 3,
            completed: 1,
            failed: 1,
            skipped: 1,
            ..Default::default()
        };
        assert_eq!(stats.settled_percent(), 100.0);
    }
}
