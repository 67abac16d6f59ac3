//! `EventLog` — the append-only history of an execution.
//!
//! `append` is the only write path for events and it always touches the
//! owning execution's `last_updated`, which is what external watchdogs
//! compare against the clock to spot stuck executions.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use db::{
    Store,
    models::{EventOrder, ExecutionEventRow, ExecutionPatch},
};

use crate::{
    EngineConfig, EngineError,
    models::{EventLevel, ExecutionEvent},
};

#[derive(Clone)]
pub struct EventLog {
    store: Arc<dyn Store>,
    config: EngineConfig,
}

impl EventLog {
    pub fn new(store: Arc<dyn Store>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Append an event to an existing execution.
    ///
    /// `level` defaults to [`EventLevel::infer`] for the event type.
    pub async fn append(
        &self,
        execution_id: Uuid,
        event_type: &str,
        node_id: Option<Uuid>,
        details: Value,
        level: Option<EventLevel>,
    ) -> Result<ExecutionEvent, EngineError> {
        if self.store.get_execution(execution_id).await?.is_none() {
            return Err(EngineError::not_found("execution", execution_id));
        }

        let level = level.unwrap_or_else(|| EventLevel::infer(event_type));
        let row = ExecutionEventRow {
            id: Uuid::new_v4(),
            seq: 0,
            execution_id,
            event_type: event_type.to_owned(),
            node_id,
            timestamp: Utc::now(),
            details,
            level: level.to_string(),
        };
        let stored = self.store.insert_event(&row).await?;

        self.store
            .patch_execution(
                execution_id,
                &ExecutionPatch {
                    last_updated: Some(stored.timestamp),
                    ..Default::default()
                },
            )
            .await?;

        debug!(%execution_id, event_type, %level, "event appended");
        ExecutionEvent::try_from(stored)
    }

    /// Newest-first events of an execution.
    ///
    /// The fetch is truncated to `limit` *before* `min_level` is applied, so
    /// a strict level filter only sees the newest `limit` events and may
    /// return fewer rows than exist at that level further back.
    pub async fn list(
        &self,
        execution_id: Uuid,
        limit: Option<usize>,
        min_level: Option<EventLevel>,
    ) -> Result<Vec<ExecutionEvent>, EngineError> {
        let limit = limit.unwrap_or(self.config.event_list_limit);
        let rows = self
            .store
            .list_events_by_execution(execution_id, EventOrder::Descending, Some(limit))
            .await?;

        let events = decode(rows)?;
        Ok(match min_level {
            Some(min) => events.into_iter().filter(|e| e.level >= min).collect(),
            None => events,
        })
    }

    /// Newest-first events for one node, scoped to `execution_id` when given,
    /// otherwise across every execution of the node.
    pub async fn list_for_node(
        &self,
        node_id: Uuid,
        execution_id: Option<Uuid>,
        limit: Option<usize>,
    ) -> Result<Vec<ExecutionEvent>, EngineError> {
        let limit = limit.unwrap_or(self.config.node_event_list_limit);
        let rows = self
            .store
            .list_events_by_node(node_id, execution_id, limit)
            .await?;
        decode(rows)
    }

    /// The complete history of an execution, oldest first.
    pub async fn history(&self, execution_id: Uuid) -> Result<Vec<ExecutionEvent>, EngineError> {
        let rows = self
            .store
            .list_events_by_execution(execution_id, EventOrder::Ascending, None)
            .await?;
        decode(rows)
    }
}

fn decode(rows: Vec<ExecutionEventRow>) -> Result<Vec<ExecutionEvent>, EngineError> {
    rows.into_iter().map(ExecutionEvent::try_from).collect()
}
