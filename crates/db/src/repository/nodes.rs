//! Node CRUD operations.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::NodeRow};

const NODE_COLUMNS: &str = r#"id, scenario_id, node_type, label, config, "position", sort_order,
    output_schema, sample_data, created_at, updated_at"#;

/// Insert a new node row.
pub async fn insert_node(pool: &PgPool, node: &NodeRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO nodes
            (id, scenario_id, node_type, label, config, "position", sort_order,
             output_schema, sample_data, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(node.id)
    .bind(node.scenario_id)
    .bind(&node.node_type)
    .bind(&node.label)
    .bind(&node.config)
    .bind(&node.position)
    .bind(node.sort_order)
    .bind(&node.output_schema)
    .bind(&node.sample_data)
    .bind(node.created_at)
    .bind(node.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a single node by its primary key.
pub async fn get_node(pool: &PgPool, id: Uuid) -> Result<Option<NodeRow>, DbError> {
    let sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = $1");
    let row = sqlx::query_as::<_, NodeRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Overwrite the mutable columns of a node.
///
/// Returns `DbError::NotFound` if no row was updated.
pub async fn update_node(pool: &PgPool, node: &NodeRow) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE nodes
        SET node_type = $1, label = $2, config = $3, "position" = $4, sort_order = $5,
            output_schema = $6, sample_data = $7, updated_at = $8
        WHERE id = $9
        "#,
    )
    .bind(&node.node_type)
    .bind(&node.label)
    .bind(&node.config)
    .bind(&node.position)
    .bind(node.sort_order)
    .bind(&node.output_schema)
    .bind(&node.sample_data)
    .bind(node.updated_at)
    .bind(node.id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound("nodes"));
    }

    Ok(())
}

/// Permanently delete a node by its primary key.
///
/// Returns `DbError::NotFound` if no row was deleted.
pub async fn delete_node(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM nodes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound("nodes"));
    }

    Ok(())
}

/// Return all nodes of a scenario in display order.
pub async fn list_nodes_by_scenario(
    pool: &PgPool,
    scenario_id: Uuid,
) -> Result<Vec<NodeRow>, DbError> {
    let sql = format!(
        "SELECT {NODE_COLUMNS} FROM nodes WHERE scenario_id = $1 \
         ORDER BY sort_order ASC, created_at ASC"
    );
    let rows = sqlx::query_as::<_, NodeRow>(&sql)
        .bind(scenario_id)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
