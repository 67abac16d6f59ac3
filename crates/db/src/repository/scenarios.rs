//! Scenario persistence.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::ScenarioRow};

/// Insert a new scenario row.
pub async fn insert_scenario(pool: &PgPool, scenario: &ScenarioRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO scenarios (id, name, owner, created_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(scenario.id)
    .bind(&scenario.name)
    .bind(&scenario.owner)
    .bind(scenario.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a single scenario by its primary key.
pub async fn get_scenario(pool: &PgPool, id: Uuid) -> Result<Option<ScenarioRow>, DbError> {
    let row = sqlx::query_as::<_, ScenarioRow>(
        r#"SELECT id, name, owner, created_at FROM scenarios WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
