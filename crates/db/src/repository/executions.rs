//! Execution persistence.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    DbError,
    models::{ExecutionPatch, ExecutionRow},
};

const EXECUTION_COLUMNS: &str = r#"id, scenario_id, status, progress, current_node_id,
    estimated_time_remaining_ms, "trigger", output, error, failed_node_id, metrics, start_time,
    end_time, last_updated"#;

/// Insert a new execution row.
pub async fn insert_execution(pool: &PgPool, execution: &ExecutionRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO executions
            (id, scenario_id, status, progress, current_node_id, estimated_time_remaining_ms,
             "trigger", output, error, failed_node_id, metrics, start_time, end_time,
             last_updated)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(execution.id)
    .bind(execution.scenario_id)
    .bind(&execution.status)
    .bind(execution.progress)
    .bind(execution.current_node_id)
    .bind(execution.estimated_time_remaining_ms)
    .bind(&execution.trigger)
    .bind(&execution.output)
    .bind(&execution.error)
    .bind(execution.failed_node_id)
    .bind(&execution.metrics)
    .bind(execution.start_time)
    .bind(execution.end_time)
    .bind(execution.last_updated)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a single execution by its primary key.
pub async fn get_execution(pool: &PgPool, id: Uuid) -> Result<Option<ExecutionRow>, DbError> {
    let sql = format!("SELECT {EXECUTION_COLUMNS} FROM executions WHERE id = $1");
    let row = sqlx::query_as::<_, ExecutionRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Apply a partial update. Every `None` field keeps its stored value; the
/// estimate is written whenever the patch carries one, including a clear.
pub async fn patch_execution(
    pool: &PgPool,
    id: Uuid,
    patch: &ExecutionPatch,
) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE executions
        SET status = COALESCE($1, status),
            progress = COALESCE($2, progress),
            current_node_id = COALESCE($3, current_node_id),
            estimated_time_remaining_ms =
                CASE WHEN $4 THEN $5 ELSE estimated_time_remaining_ms END,
            output = COALESCE($6, output),
            error = COALESCE($7, error),
            failed_node_id = COALESCE($8, failed_node_id),
            metrics = COALESCE($9, metrics),
            end_time = COALESCE($10, end_time),
            last_updated = COALESCE($11, last_updated)
        WHERE id = $12
        "#,
    )
    .bind(&patch.status)
    .bind(patch.progress)
    .bind(patch.current_node_id)
    .bind(patch.estimated_time_remaining_ms.is_some())
    .bind(patch.estimated_time_remaining_ms.flatten())
    .bind(&patch.output)
    .bind(&patch.error)
    .bind(patch.failed_node_id)
    .bind(&patch.metrics)
    .bind(patch.end_time)
    .bind(patch.last_updated)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound("executions"));
    }

    Ok(())
}

/// Executions of a scenario, most recently started first.
pub async fn list_executions_by_scenario(
    pool: &PgPool,
    scenario_id: Uuid,
    limit: i64,
) -> Result<Vec<ExecutionRow>, DbError> {
    let sql = format!(
        "SELECT {EXECUTION_COLUMNS} FROM executions WHERE scenario_id = $1 \
         ORDER BY start_time DESC LIMIT $2"
    );
    let rows = sqlx::query_as::<_, ExecutionRow>(&sql)
        .bind(scenario_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Executions of a scenario in one status, most recently started first.
pub async fn list_executions_by_status(
    pool: &PgPool,
    scenario_id: Uuid,
    status: &str,
    limit: i64,
) -> Result<Vec<ExecutionRow>, DbError> {
    let sql = format!(
        "SELECT {EXECUTION_COLUMNS} FROM executions WHERE scenario_id = $1 AND status = $2 \
         ORDER BY start_time DESC LIMIT $3"
    );
    let rows = sqlx::query_as::<_, ExecutionRow>(&sql)
        .bind(scenario_id)
        .bind(status)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
