// Shared helpers for transformers running inside a write transaction.

use anyhow::Result;
use sqlx::PgConnection;
use std::collections::HashMap;

/// external_id -> internal id map read through the transaction, so rows
/// inserted earlier in the same transaction are visible.
pub async fn id_map_tx(
    conn: &mut PgConnection,
    table: IdTable,
    integration_id: i64,
) -> Result<HashMap<String, i64>> {
    let sql = format!(
        "SELECT external_id, id FROM {} WHERE integration_id = $1",
        table.name()
    );
    let rows: Vec<(String, i64)> = sqlx::query_as(&sql)
        .bind(integration_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().collect())
}

/// Tables addressable by id_map_tx; a closed set keeps table names static
#[derive(Debug, Clone, Copy)]
pub enum IdTable {
    Projects,
    Wits,
    Statuses,
    CustomFields,
    WorkItems,
}

impl IdTable {
    fn name(&self) -> &'static str {
        match self {
            IdTable::Projects => "projects",
            IdTable::Wits => "wits",
            IdTable::Statuses => "statuses",
            IdTable::CustomFields => "custom_fields",
            IdTable::WorkItems => "work_items",
        }
    }
}

/// Sprint upsert executed on the transformer's transaction
pub async fn upsert_sprint_tx(
    conn: &mut PgConnection,
    tenant_id: i64,
    integration_id: i64,
    external_id: &str,
    board_id: Option<i64>,
    name: Option<&str>,
    state: Option<&str>,
) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO sprints (tenant_id, integration_id, external_id, board_id, name, state)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (tenant_id, integration_id, external_id)
        DO UPDATE SET
            board_id = EXCLUDED.board_id,
            name = EXCLUDED.name,
            state = EXCLUDED.state,
            last_updated_at = NOW()
        RETURNING id
        "#,
    )
    .bind(tenant_id)
    .bind(integration_id)
    .bind(external_id)
    .bind(board_id)
    .bind(name)
    .bind(state)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}
