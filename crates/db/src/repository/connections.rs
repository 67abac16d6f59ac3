//! Connection CRUD operations and endpoint lookups.

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{DbError, models::ConnectionRow};

const CONNECTION_COLUMNS: &str =
    "id, scenario_id, source_node_id, target_node_id, mapping, created_at, updated_at";

/// Insert a new connection row.
pub async fn insert_connection(pool: &PgPool, connection: &ConnectionRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO connections
            (id, scenario_id, source_node_id, target_node_id, mapping, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(connection.id)
    .bind(connection.scenario_id)
    .bind(connection.source_node_id)
    .bind(connection.target_node_id)
    .bind(&connection.mapping)
    .bind(connection.created_at)
    .bind(connection.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a single connection by its primary key.
pub async fn get_connection(pool: &PgPool, id: Uuid) -> Result<Option<ConnectionRow>, DbError> {
    let sql = format!("SELECT {CONNECTION_COLUMNS} FROM connections WHERE id = $1");
    let row = sqlx::query_as::<_, ConnectionRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Overwrite the mapping of a connection. Endpoints never change.
pub async fn update_connection(pool: &PgPool, connection: &ConnectionRow) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"UPDATE connections SET mapping = $1, updated_at = $2 WHERE id = $3"#,
    )
    .bind(&connection.mapping)
    .bind(connection.updated_at)
    .bind(connection.id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound("connections"));
    }

    Ok(())
}

/// Permanently delete a connection by its primary key.
pub async fn delete_connection(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM connections WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound("connections"));
    }

    Ok(())
}

/// Delete the given connections and then the node inside one transaction.
pub async fn delete_node_with_connections(
    pool: &PgPool,
    node_id: Uuid,
    connection_ids: &[Uuid],
) -> Result<(), DbError> {
    let mut tx: Transaction<'_, Postgres> = pool.begin().await?;

    for id in connection_ids {
        sqlx::query("DELETE FROM connections WHERE id = $1")
            .bind(*id)
            .execute(&mut *tx)
            .await?;
    }

    let result = sqlx::query("DELETE FROM nodes WHERE id = $1")
        .bind(node_id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(DbError::NotFound("nodes"));
    }

    tx.commit().await?;
    Ok(())
}

/// All connections of a scenario, oldest first.
pub async fn list_connections_by_scenario(
    pool: &PgPool,
    scenario_id: Uuid,
) -> Result<Vec<ConnectionRow>, DbError> {
    let sql = format!(
        "SELECT {CONNECTION_COLUMNS} FROM connections WHERE scenario_id = $1 \
         ORDER BY created_at ASC"
    );
    let rows = sqlx::query_as::<_, ConnectionRow>(&sql)
        .bind(scenario_id)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Connections leaving `source_node_id`.
pub async fn list_connections_by_source(
    pool: &PgPool,
    source_node_id: Uuid,
) -> Result<Vec<ConnectionRow>, DbError> {
    let sql = format!("SELECT {CONNECTION_COLUMNS} FROM connections WHERE source_node_id = $1");
    let rows = sqlx::query_as::<_, ConnectionRow>(&sql)
        .bind(source_node_id)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Connections arriving at `target_node_id`.
pub async fn list_connections_by_target(
    pool: &PgPool,
    target_node_id: Uuid,
) -> Result<Vec<ConnectionRow>, DbError> {
    let sql = format!("SELECT {CONNECTION_COLUMNS} FROM connections WHERE target_node_id = $1");
    let rows = sqlx::query_as::<_, ConnectionRow>(&sql)
        .bind(target_node_id)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Look up the connection for an ordered `(source, target)` pair.
pub async fn find_connection_by_endpoints(
    pool: &PgPool,
    scenario_id: Uuid,
    source_node_id: Uuid,
    target_node_id: Uuid,
) -> Result<Option<ConnectionRow>, DbError> {
    let sql = format!(
        "SELECT {CONNECTION_COLUMNS} FROM connections \
         WHERE scenario_id = $1 AND source_node_id = $2 AND target_node_id = $3"
    );
    let row = sqlx::query_as::<_, ConnectionRow>(&sql)
        .bind(scenario_id)
        .bind(source_node_id)
        .bind(target_node_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}
