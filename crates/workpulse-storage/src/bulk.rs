// Bulk INSERT/UPDATE primitives for the transform stage.
//
// Rows are column-name + value lists rather than typed structs so one helper
// serves every entity table. Values pass through sanitize_text before binding
// so provider payloads with replacement-needing bytes or NULs cannot poison a
// whole batch.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgConnection, Postgres};

/// Dynamically-typed SQL parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    NullableTimestamp(Option<DateTime<Utc>>),
    NullableI64(Option<i64>),
    NullableF64(Option<f64>),
    NullableText(Option<String>),
    Json(serde_json::Value),
}

impl SqlValue {
    pub fn text(s: impl Into<String>) -> Self {
        SqlValue::Text(s.into())
    }

    pub fn opt_text(s: Option<String>) -> Self {
        SqlValue::NullableText(s)
    }
}

/// Re-encode a string so it can always be bound as a Postgres TEXT value:
/// lossy UTF-8 plus NUL stripping (Postgres rejects embedded NULs).
pub fn sanitize_text(s: &str) -> String {
    let sanitized = String::from_utf8_lossy(s.as_bytes());
    if sanitized.contains('\0') {
        sanitized.replace('\0', "\u{FFFD}")
    } else {
        sanitized.into_owned()
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: SqlValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Null => query.bind(Option::<String>::None),
        SqlValue::Bool(b) => query.bind(b),
        SqlValue::I32(n) => query.bind(n),
        SqlValue::I64(n) => query.bind(n),
        SqlValue::F64(n) => query.bind(n),
        SqlValue::Text(s) => query.bind(sanitize_text(&s)),
        SqlValue::Timestamp(ts) => query.bind(ts),
        SqlValue::NullableTimestamp(ts) => query.bind(ts),
        SqlValue::NullableI64(n) => query.bind(n),
        SqlValue::NullableF64(n) => query.bind(n),
        SqlValue::NullableText(s) => query.bind(s.map(|s| sanitize_text(&s))),
        SqlValue::Json(v) => query.bind(v),
    }
}

/// Multi-row parameterized INSERT statement text
fn build_insert_sql(table: &str, columns: &[&str], row_count: usize) -> String {
    let mut sql = format!("INSERT INTO {} ({}) VALUES ", table, columns.join(", "));
    let mut placeholder = 1usize;
    for row in 0..row_count {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for col in 0..columns.len() {
            if col > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&format!("${}", placeholder));
            placeholder += 1;
        }
        sql.push(')');
    }
    sql
}

/// Per-row UPDATE statement text, pk bound last
fn build_update_sql(table: &str, columns: &[&str]) -> String {
    let assignments: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{} = ${}", col, i + 1))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE id = ${}",
        table,
        assignments.join(", "),
        columns.len() + 1
    )
}

fn build_relationship_sql(
    table: &str,
    columns: &[&str],
    conflict_columns: &[&str],
    row_count: usize,
) -> String {
    let mut sql = build_insert_sql(table, columns, row_count);
    sql.push_str(&format!(
        " ON CONFLICT ({}) DO NOTHING",
        conflict_columns.join(", ")
    ));
    sql
}

/// Bulk database operations helper
pub struct BulkOperations;

impl BulkOperations {
    /// Chunked multi-row INSERT. Every row must match `columns` in length.
    pub async fn bulk_insert(
        conn: &mut PgConnection,
        table: &str,
        columns: &[&str],
        rows: Vec<Vec<SqlValue>>,
        batch_size: usize,
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        tracing::debug!(table, rows = rows.len(), "bulk insert");

        for chunk in rows.chunks(batch_size.max(1)) {
            let sql = build_insert_sql(table, columns, chunk.len());
            let mut query = sqlx::query(&sql);
            for row in chunk {
                if row.len() != columns.len() {
                    bail!(
                        "bulk_insert into {}: row has {} values for {} columns",
                        table,
                        row.len(),
                        columns.len()
                    );
                }
                for value in row {
                    query = bind_value(query, value.clone());
                }
            }
            query.execute(&mut *conn).await?;
        }
        Ok(())
    }

    /// Chunked per-row UPDATE by primary key
    pub async fn bulk_update(
        conn: &mut PgConnection,
        table: &str,
        columns: &[&str],
        rows: Vec<(i64, Vec<SqlValue>)>,
        batch_size: usize,
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        tracing::debug!(table, rows = rows.len(), "bulk update");

        let sql = build_update_sql(table, columns);
        for chunk in rows.chunks(batch_size.max(1)) {
            for (id, row) in chunk {
                if row.len() != columns.len() {
                    bail!(
                        "bulk_update of {}: row has {} values for {} columns",
                        table,
                        row.len(),
                        columns.len()
                    );
                }
                let mut query = sqlx::query(&sql);
                for value in row {
                    query = bind_value(query, value.clone());
                }
                query = query.bind(*id);
                query.execute(&mut *conn).await?;
            }
        }
        Ok(())
    }

    /// Many-row INSERT ... ON CONFLICT (cols) DO NOTHING, for edge tables
    /// written concurrently by workers of the same tenant.
    pub async fn bulk_insert_relationships(
        conn: &mut PgConnection,
        table: &str,
        columns: &[&str],
        conflict_columns: &[&str],
        rows: Vec<Vec<SqlValue>>,
        batch_size: usize,
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        tracing::debug!(table, rows = rows.len(), "bulk insert relationships");

        for chunk in rows.chunks(batch_size.max(1)) {
            let sql = build_relationship_sql(table, columns, conflict_columns, chunk.len());
            let mut query = sqlx::query(&sql);
            for row in chunk {
                if row.len() != columns.len() {
                    bail!(
                        "bulk_insert_relationships into {}: row has {} values for {} columns",
                        table,
                        row.len(),
                        columns.len()
                    );
                }
                for value in row {
                    query = bind_value(query, value.clone());
                }
            }
            query.execute(&mut *conn).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_sql_shape() {
        let sql = build_insert_sql("projects", &["a", "b"], 2);
        assert_eq!(
            sql,
            "INSERT INTO projects (a, b) VALUES ($1, $2), ($3, $4)"
        );
    }

    #[test]
    fn test_update_sql_shape() {
        let sql = build_update_sql("work_items", &["summary", "status_id"]);
        assert_eq!(
            sql,
            "UPDATE work_items SET summary = $1, status_id = $2 WHERE id = $3"
        );
    }

    #[test]
    fn test_relationship_sql_shape() {
        let sql = build_relationship_sql(
            "projects_wits",
            &["project_id", "wit_id"],
            &["project_id", "wit_id"],
            1,
        );
        assert_eq!(
            sql,
            "INSERT INTO projects_wits (project_id, wit_id) VALUES ($1, $2) \
             ON CONFLICT (project_id, wit_id) DO NOTHING"
        );
    }

    #[test]
    fn test_sanitize_text_strips_nul() {
        assert_eq!(sanitize_text("plain"), "plain");
        assert_eq!(sanitize_text("a\0b"), "a\u{FFFD}b");
    }
}
