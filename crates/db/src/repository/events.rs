//! Append-only execution event log.
//!
//! Events are immutable once written: no UPDATE or DELETE. Severity
//! filtering happens in the engine, after the fetch.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    DbError,
    models::{EventOrder, ExecutionEventRow},
};

const EVENT_COLUMNS: &str =
    r#"id, seq, execution_id, event_type, node_id, "timestamp", details, level"#;

/// Append one event. `seq` is assigned by the database.
pub async fn insert_event(
    pool: &PgPool,
    event: &ExecutionEventRow,
) -> Result<ExecutionEventRow, DbError> {
    let sql = format!(
        r#"
        INSERT INTO execution_events
            (id, execution_id, event_type, node_id, "timestamp", details, level)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {EVENT_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, ExecutionEventRow>(&sql)
        .bind(event.id)
        .bind(event.execution_id)
        .bind(&event.event_type)
        .bind(event.node_id)
        .bind(event.timestamp)
        .bind(&event.details)
        .bind(&event.level)
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// Events of one execution in time order. `limit = None` fetches all.
pub async fn list_events_by_execution(
    pool: &PgPool,
    execution_id: Uuid,
    order: EventOrder,
    limit: Option<i64>,
) -> Result<Vec<ExecutionEventRow>, DbError> {
    let direction = match order {
        EventOrder::Ascending => "ASC",
        EventOrder::Descending => "DESC",
    };
    // LIMIT NULL means "no limit" in Postgres.
    let sql = format!(
        r#"SELECT {EVENT_COLUMNS} FROM execution_events
           WHERE execution_id = $1
           ORDER BY "timestamp" {direction}, seq {direction}
           LIMIT $2"#
    );
    let rows = sqlx::query_as::<_, ExecutionEventRow>(&sql)
        .bind(execution_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Newest-first events for a node, optionally scoped to one execution.
pub async fn list_events_by_node(
    pool: &PgPool,
    node_id: Uuid,
    execution_id: Option<Uuid>,
    limit: i64,
) -> Result<Vec<ExecutionEventRow>, DbError> {
    let sql = format!(
        r#"SELECT {EVENT_COLUMNS} FROM execution_events
           WHERE node_id = $1 AND ($2::uuid IS NULL OR execution_id = $2)
           ORDER BY "timestamp" DESC, seq DESC
           LIMIT $3"#
    );
    let rows = sqlx::query_as::<_, ExecutionEventRow>(&sql)
        .bind(node_id)
        .bind(execution_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
