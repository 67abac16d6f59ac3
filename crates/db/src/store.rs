//! The `Store` trait — the storage contract the engine is written against.
//!
//! Every lookup that returns a single row yields `Ok(None)` when the row is
//! absent; deciding whether absence is an error belongs to the caller.
//! Mutations on a missing row return [`DbError::NotFound`].

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    DbError,
    models::{
        ConnectionRow, EventOrder, ExecutionEventRow, ExecutionPatch, ExecutionRow, NodeRow,
        ScenarioRow,
    },
};

/// Document-style storage with the secondary indexes the engine relies on:
/// nodes and connections by scenario, connections by endpoint and by ordered
/// endpoint pair, events by execution and by node.
#[async_trait]
pub trait Store: Send + Sync {
    // ------ scenarios ------

    async fn insert_scenario(&self, scenario: &ScenarioRow) -> Result<(), DbError>;

    async fn get_scenario(&self, id: Uuid) -> Result<Option<ScenarioRow>, DbError>;

    // ------ nodes ------

    async fn insert_node(&self, node: &NodeRow) -> Result<(), DbError>;

    async fn get_node(&self, id: Uuid) -> Result<Option<NodeRow>, DbError>;

    /// Replace every mutable column of an existing node.
    async fn update_node(&self, node: &NodeRow) -> Result<(), DbError>;

    async fn delete_node(&self, id: Uuid) -> Result<(), DbError>;

    /// Nodes of a scenario ordered by `sort_order`.
    async fn list_nodes_by_scenario(&self, scenario_id: Uuid) -> Result<Vec<NodeRow>, DbError>;

    // ------ connections ------

    async fn insert_connection(&self, connection: &ConnectionRow) -> Result<(), DbError>;

    async fn get_connection(&self, id: Uuid) -> Result<Option<ConnectionRow>, DbError>;

    async fn update_connection(&self, connection: &ConnectionRow) -> Result<(), DbError>;

    async fn delete_connection(&self, id: Uuid) -> Result<(), DbError>;

    async fn list_connections_by_scenario(
        &self,
        scenario_id: Uuid,
    ) -> Result<Vec<ConnectionRow>, DbError>;

    async fn list_connections_by_source(
        &self,
        source_node_id: Uuid,
    ) -> Result<Vec<ConnectionRow>, DbError>;

    async fn list_connections_by_target(
        &self,
        target_node_id: Uuid,
    ) -> Result<Vec<ConnectionRow>, DbError>;

    /// Dedupe lookup on the ordered `(scenario, source, target)` index.
    async fn find_connection_by_endpoints(
        &self,
        scenario_id: Uuid,
        source_node_id: Uuid,
        target_node_id: Uuid,
    ) -> Result<Option<ConnectionRow>, DbError>;

    /// Delete the given connections, then the node.
    ///
    /// The default runs the two phases as independent writes: an interruption
    /// can leave the node in place with its connections already gone, never a
    /// connection pointing at a deleted node. Stores with transactions
    /// override this to make both phases atomic.
    async fn delete_node_with_connections(
        &self,
        node_id: Uuid,
        connection_ids: &[Uuid],
    ) -> Result<(), DbError> {
        for id in connection_ids {
            self.delete_connection(*id).await?;
        }
        self.delete_node(node_id).await
    }

    // ------ executions ------

    async fn insert_execution(&self, execution: &ExecutionRow) -> Result<(), DbError>;

    async fn get_execution(&self, id: Uuid) -> Result<Option<ExecutionRow>, DbError>;

    async fn patch_execution(&self, id: Uuid, patch: &ExecutionPatch) -> Result<(), DbError>;

    /// Executions of a scenario, newest `start_time` first.
    async fn list_executions_by_scenario(
        &self,
        scenario_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ExecutionRow>, DbError>;

    /// Executions of a scenario in `status`, newest `start_time` first.
    async fn list_executions_by_status(
        &self,
        scenario_id: Uuid,
        status: &str,
        limit: usize,
    ) -> Result<Vec<ExecutionRow>, DbError>;

    // ------ events ------

    /// Append an event. The store assigns `seq`; the stored row is returned.
    async fn insert_event(&self, event: &ExecutionEventRow) -> Result<ExecutionEventRow, DbError>;

    /// Events of one execution ordered by `(timestamp, seq)`.
    async fn list_events_by_execution(
        &self,
        execution_id: Uuid,
        order: EventOrder,
        limit: Option<usize>,
    ) -> Result<Vec<ExecutionEventRow>, DbError>;

    /// Newest-first events for one node, optionally scoped to an execution.
    async fn list_events_by_node(
        &self,
        node_id: Uuid,
        execution_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<ExecutionEventRow>, DbError>;
}
