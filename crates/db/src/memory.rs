//! In-process [`Store`] backed by hash maps behind a single `RwLock`.
//!
//! Used by the engine's tests and by embedders that do not need durability.
//! Each trait call takes the lock once, so every individual write is atomic
//! with respect to other calls on the same store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    DbError, Store,
    models::{
        ConnectionRow, EventOrder, ExecutionEventRow, ExecutionPatch, ExecutionRow, NodeRow,
        ScenarioRow,
    },
};

#[derive(Default)]
struct Tables {
    scenarios: HashMap<Uuid, ScenarioRow>,
    nodes: HashMap<Uuid, NodeRow>,
    connections: HashMap<Uuid, ConnectionRow>,
    executions: HashMap<Uuid, ExecutionRow>,
    /// Insertion order == `seq` order.
    events: Vec<ExecutionEventRow>,
    next_seq: i64,
}

/// Volatile store; all data is lost when the value is dropped.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sort_events(events: &mut [ExecutionEventRow], order: EventOrder) {
    events.sort_by_key(|e| (e.timestamp, e.seq));
    if order == EventOrder::Descending {
        events.reverse();
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_scenario(&self, scenario: &ScenarioRow) -> Result<(), DbError> {
        let mut t = self.tables.write().await;
        t.scenarios.insert(scenario.id, scenario.clone());
        Ok(())
    }

    async fn get_scenario(&self, id: Uuid) -> Result<Option<ScenarioRow>, DbError> {
        Ok(self.tables.read().await.scenarios.get(&id).cloned())
    }

    async fn insert_node(&self, node: &NodeRow) -> Result<(), DbError> {
        let mut t = self.tables.write().await;
        t.nodes.insert(node.id, node.clone());
        Ok(())
    }

    async fn get_node(&self, id: Uuid) -> Result<Option<NodeRow>, DbError> {
        Ok(self.tables.read().await.nodes.get(&id).cloned())
    }

    async fn update_node(&self, node: &NodeRow) -> Result<(), DbError> {
        let mut t = self.tables.write().await;
        let slot = t.nodes.get_mut(&node.id).ok_or(DbError::NotFound("nodes"))?;
        *slot = node.clone();
        Ok(())
    }

    async fn delete_node(&self, id: Uuid) -> Result<(), DbError> {
        let mut t = self.tables.write().await;
        t.nodes.remove(&id).map(|_| ()).ok_or(DbError::NotFound("nodes"))
    }

    async fn list_nodes_by_scenario(&self, scenario_id: Uuid) -> Result<Vec<NodeRow>, DbError> {
        let t = self.tables.read().await;
        let mut nodes: Vec<NodeRow> = t
            .nodes
            .values()
            .filter(|n| n.scenario_id == scenario_id)
            .cloned()
            .collect();
        nodes.sort_by_key(|n| (n.sort_order, n.created_at));
        Ok(nodes)
    }

    async fn insert_connection(&self, connection: &ConnectionRow) -> Result<(), DbError> {
        let mut t = self.tables.write().await;
        t.connections.insert(connection.id, connection.clone());
        Ok(())
    }

    async fn get_connection(&self, id: Uuid) -> Result<Option<ConnectionRow>, DbError> {
        Ok(self.tables.read().await.connections.get(&id).cloned())
    }

    async fn update_connection(&self, connection: &ConnectionRow) -> Result<(), DbError> {
        let mut t = self.tables.write().await;
        let slot = t
            .connections
            .get_mut(&connection.id)
            .ok_or(DbError::NotFound("connections"))?;
        *slot = connection.clone();
        Ok(())
    }

    async fn delete_connection(&self, id: Uuid) -> Result<(), DbError> {
        let mut t = self.tables.write().await;
        t.connections.remove(&id).map(|_| ()).ok_or(DbError::NotFound("connections"))
    }

    async fn list_connections_by_scenario(
        &self,
        scenario_id: Uuid,
    ) -> Result<Vec<ConnectionRow>, DbError> {
        let t = self.tables.read().await;
        let mut rows: Vec<ConnectionRow> = t
            .connections
            .values()
            .filter(|c| c.scenario_id == scenario_id)
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.created_at);
        Ok(rows)
    }

    async fn list_connections_by_source(
        &self,
        source_node_id: Uuid,
    ) -> Result<Vec<ConnectionRow>, DbError> {
        let t = self.tables.read().await;
        Ok(t.connections
            .values()
            .filter(|c| c.source_node_id == source_node_id)
            .cloned()
            .collect())
    }

    async fn list_connections_by_target(
        &self,
        target_node_id: Uuid,
    ) -> Result<Vec<ConnectionRow>, DbError> {
        let t = self.tables.read().await;
        Ok(t.connections
            .values()
            .filter(|c| c.target_node_id == target_node_id)
            .cloned()
            .collect())
    }

    async fn find_connection_by_endpoints(
        &self,
        scenario_id: Uuid,
        source_node_id: Uuid,
        target_node_id: Uuid,
    ) -> Result<Option<ConnectionRow>, DbError> {
        let t = self.tables.read().await;
        Ok(t.connections
            .values()
            .find(|c| {
                c.scenario_id == scenario_id
                    && c.source_node_id == source_node_id
                    && c.target_node_id == target_node_id
            })
            .cloned())
    }

    async fn delete_node_with_connections(
        &self,
        node_id: Uuid,
        connection_ids: &[Uuid],
    ) -> Result<(), DbError> {
        // Single lock acquisition: both phases are applied together.
        let mut t = self.tables.write().await;
        if !t.nodes.contains_key(&node_id) {
            return Err(DbError::NotFound("nodes"));
        }
        for id in connection_ids {
            t.connections.remove(id);
        }
        t.nodes.remove(&node_id);
        Ok(())
    }

    async fn insert_execution(&self, execution: &ExecutionRow) -> Result<(), DbError> {
        let mut t = self.tables.write().await;
        t.executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: Uuid) -> Result<Option<ExecutionRow>, DbError> {
        Ok(self.tables.read().await.executions.get(&id).cloned())
    }

    async fn patch_execution(&self, id: Uuid, patch: &ExecutionPatch) -> Result<(), DbError> {
        let mut t = self.tables.write().await;
        let row = t.executions.get_mut(&id).ok_or(DbError::NotFound("executions"))?;
        patch.apply(row);
        Ok(())
    }

    async fn list_executions_by_scenario(
        &self,
        scenario_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ExecutionRow>, DbError> {
        let t = self.tables.read().await;
        let mut rows: Vec<ExecutionRow> = t
            .executions
            .values()
            .filter(|e| e.scenario_id == scenario_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn list_executions_by_status(
        &self,
        scenario_id: Uuid,
        status: &str,
        limit: usize,
    ) -> Result<Vec<ExecutionRow>, DbError> {
        let t = self.tables.read().await;
        let mut rows: Vec<ExecutionRow> = t
            .executions
            .values()
            .filter(|e| e.scenario_id == scenario_id && e.status == status)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn insert_event(&self, event: &ExecutionEventRow) -> Result<ExecutionEventRow, DbError> {
        let mut t = self.tables.write().await;
        t.next_seq += 1;
        let stored = ExecutionEventRow {
            seq: t.next_seq,
            ..event.clone()
        };
        t.events.push(stored.clone());
        Ok(stored)
    }

    async fn list_events_by_execution(
        &self,
        execution_id: Uuid,
        order: EventOrder,
        limit: Option<usize>,
    ) -> Result<Vec<ExecutionEventRow>, DbError> {
        let t = self.tables.read().await;
        let mut rows: Vec<ExecutionEventRow> = t
            .events
            .iter()
            .filter(|e| e.execution_id == execution_id)
            .cloned()
            .collect();
        sort_events(&mut rows, order);
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn list_events_by_node(
        &self,
        node_id: Uuid,
        execution_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<ExecutionEventRow>, DbError> {
        let t = self.tables.read().await;
        let mut rows: Vec<ExecutionEventRow> = t
            .events
            .iter()
            .filter(|e| e.node_id == Some(node_id))
            .filter(|e| execution_id.map_or(true, |x| e.execution_id == x))
            .cloned()
            .collect();
        sort_events(&mut rows, EventOrder::Descending);
        rows.truncate(limit);
        Ok(rows)
    }
}
