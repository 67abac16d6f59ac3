//! Postgres-backed [`Store`] delegating to the repository functions.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    DbError, DbPool, Store,
    pool::{PoolConfig, create_pool, run_migrations},
    models::{
        ConnectionRow, EventOrder, ExecutionEventRow, ExecutionPatch, ExecutionRow, NodeRow,
        ScenarioRow,
    },
    repository::{connections, events, executions, nodes, scenarios},
};

/// Durable store over a shared connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open a pool and, when `migrate` is set, bring the schema up to date.
    pub async fn connect(config: &PoolConfig, migrate: bool) -> Result<Self, DbError> {
        let pool = create_pool(config).await?;
        if migrate {
            run_migrations(&pool).await?;
        }
        Ok(Self::new(pool))
    }
}

fn as_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl Store for PgStore {
    async fn insert_scenario(&self, scenario: &ScenarioRow) -> Result<(), DbError> {
        scenarios::insert_scenario(&self.pool, scenario).await
    }

    async fn get_scenario(&self, id: Uuid) -> Result<Option<ScenarioRow>, DbError> {
        scenarios::get_scenario(&self.pool, id).await
    }

    async fn insert_node(&self, node: &NodeRow) -> Result<(), DbError> {
        nodes::insert_node(&self.pool, node).await
    }

    async fn get_node(&self, id: Uuid) -> Result<Option<NodeRow>, DbError> {
        nodes::get_node(&self.pool, id).await
    }

    async fn update_node(&self, node: &NodeRow) -> Result<(), DbError> {
        nodes::update_node(&self.pool, node).await
    }

    async fn delete_node(&self, id: Uuid) -> Result<(), DbError> {
        nodes::delete_node(&self.pool, id).await
    }

    async fn list_nodes_by_scenario(&self, scenario_id: Uuid) -> Result<Vec<NodeRow>, DbError> {
        nodes::list_nodes_by_scenario(&self.pool, scenario_id).await
    }

    async fn insert_connection(&self, connection: &ConnectionRow) -> Result<(), DbError> {
        connections::insert_connection(&self.pool, connection).await
    }

    async fn get_connection(&self, id: Uuid) -> Result<Option<ConnectionRow>, DbError> {
        connections::get_connection(&self.pool, id).await
    }

    async fn update_connection(&self, connection: &ConnectionRow) -> Result<(), DbError> {
        connections::update_connection(&self.pool, connection).await
    }

    async fn delete_connection(&self, id: Uuid) -> Result<(), DbError> {
        connections::delete_connection(&self.pool, id).await
    }

    async fn list_connections_by_scenario(
        &self,
        scenario_id: Uuid,
    ) -> Result<Vec<ConnectionRow>, DbError> {
        connections::list_connections_by_scenario(&self.pool, scenario_id).await
    }

    async fn list_connections_by_source(
        &self,
        source_node_id: Uuid,
    ) -> Result<Vec<ConnectionRow>, DbError> {
        connections::list_connections_by_source(&self.pool, source_node_id).await
    }

    async fn list_connections_by_target(
        &self,
        target_node_id: Uuid,
    ) -> Result<Vec<ConnectionRow>, DbError> {
        connections::list_connections_by_target(&self.pool, target_node_id).await
    }

    async fn find_connection_by_endpoints(
        &self,
        scenario_id: Uuid,
        source_node_id: Uuid,
        target_node_id: Uuid,
    ) -> Result<Option<ConnectionRow>, DbError> {
        connections::find_connection_by_endpoints(
            &self.pool,
            scenario_id,
            source_node_id,
            target_node_id,
        )
        .await
    }

    async fn delete_node_with_connections(
        &self,
        node_id: Uuid,
        connection_ids: &[Uuid],
    ) -> Result<(), DbError> {
        connections::delete_node_with_connections(&self.pool, node_id, connection_ids).await
    }

    async fn insert_execution(&self, execution: &ExecutionRow) -> Result<(), DbError> {
        executions::insert_execution(&self.pool, execution).await
    }

    async fn get_execution(&self, id: Uuid) -> Result<Option<ExecutionRow>, DbError> {
        executions::get_execution(&self.pool, id).await
    }

    async fn patch_execution(&self, id: Uuid, patch: &ExecutionPatch) -> Result<(), DbError> {
        executions::patch_execution(&self.pool, id, patch).await
    }

    async fn list_executions_by_scenario(
        &self,
        scenario_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ExecutionRow>, DbError> {
        executions::list_executions_by_scenario(&self.pool, scenario_id, as_limit(limit)).await
    }

    async fn list_executions_by_status(
        &self,
        scenario_id: Uuid,
        status: &str,
        limit: usize,
    ) -> Result<Vec<ExecutionRow>, DbError> {
        executions::list_executions_by_status(&self.pool, scenario_id, status, as_limit(limit))
            .await
    }

    async fn insert_event(&self, event: &ExecutionEventRow) -> Result<ExecutionEventRow, DbError> {
        events::insert_event(&self.pool, event).await
    }

    async fn list_events_by_execution(
        &self,
        execution_id: Uuid,
        order: EventOrder,
        limit: Option<usize>,
    ) -> Result<Vec<ExecutionEventRow>, DbError> {
        events::list_events_by_execution(&self.pool, execution_id, order, limit.map(as_limit))
            .await
    }

    async fn list_events_by_node(
        &self,
        node_id: Uuid,
        execution_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<ExecutionEventRow>, DbError> {
        events::list_events_by_node(&self.pool, node_id, execution_id, as_limit(limit)).await
    }
}
