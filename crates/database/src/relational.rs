//! Relational backend: generic row mapping on PostgreSQL.
//!
//! Records travel as JSONB. Writes expand the JSON object into a typed row with
//! `jsonb_populate_record(NULL::<table>, $1)`, reads fold the row back with
//! `to_jsonb`, so no per-model SQL is needed. Table and column names only ever
//! come from `Model` constants and are always quoted.

use crate::error::DbError;
use core_types::RelationKind;
use serde_json::{Map, Value};
use sqlx::postgres::{PgConnection, PgPool};
use uuid::Uuid;

/// Quotes an SQL identifier.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn column_list(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Columns of `candidates` that the serialized record actually carries.
fn present_columns<'a>(candidates: &[&'a str], fields: &Map<String, Value>) -> Vec<&'a str> {
    candidates
        .iter()
        .copied()
        .filter(|column| fields.contains_key(*column))
        .collect()
}

const ORDER_BY_CREATION: &str = "ORDER BY t.\"created_at\" NULLS FIRST, t.\"id\"";

pub(crate) fn insert_sql(table: &str, columns: &[&str]) -> String {
    let table = quote_ident(table);
    if columns.is_empty() {
        return format!("INSERT INTO {table} DEFAULT VALUES RETURNING \"id\"");
    }
    let columns = column_list(columns);
    format!(
        "INSERT INTO {table} ({columns}) SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1) RETURNING \"id\""
    )
}

pub(crate) fn update_sql(table: &str, columns: &[&str]) -> String {
    let table = quote_ident(table);
    let assignment = match columns {
        [column] => {
            let column = quote_ident(column);
            format!("{column} = (SELECT {column} FROM jsonb_populate_record(NULL::{table}, $2))")
        }
        _ => {
            let columns = column_list(columns);
            format!("({columns}) = (SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $2))")
        }
    };
    format!("UPDATE {table} SET {assignment} WHERE \"id\" = $1")
}

/// How a caller's raw statement is run.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RawStatement {
    /// Yields rows, each folded into one JSON object by the wrapping query.
    Rows(String),
    /// Runs verbatim and yields no rows.
    Execute(String),
}

/// Wraps statements that produce rows. The caller's text sits on its own
/// lines so a trailing `--` comment cannot swallow the closing parenthesis.
pub(crate) fn plan_raw_query(raw: &str) -> RawStatement {
    let raw = raw.trim().trim_end_matches(';').trim_end();
    let lowered = raw.to_ascii_lowercase();
    match leading_keyword(&lowered) {
        "select" | "with" | "values" | "table" => {
            RawStatement::Rows(format!("SELECT to_jsonb(q) FROM (\n{raw}\n) AS q"))
        }
        "insert" | "update" | "delete" if lowered.contains("returning") => {
            RawStatement::Rows(format!("WITH q AS (\n{raw}\n) SELECT to_jsonb(q) FROM q"))
        }
        _ => RawStatement::Execute(raw.to_string()),
    }
}

fn leading_keyword(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    while let Some(comment) = rest.strip_prefix("--") {
        rest = comment.split_once('\n').map_or("", |(_, tail)| tail).trim_start();
    }
    let rest = rest.trim_start_matches(|c: char| c == '(' || c.is_whitespace());
    let end = rest.find(|c: char| !c.is_ascii_alphabetic()).unwrap_or(rest.len());
    &rest[..end]
}

/// Inserts a record and returns the id the database assigned (or the one it carried).
pub(crate) async fn insert(
    pool: &PgPool,
    table: &'static str,
    writable: &[&str],
    fields: &Map<String, Value>,
) -> Result<Uuid, DbError> {
    let mut columns = present_columns(writable, fields);
    if fields.get("id").is_some_and(|id| !id.is_null()) {
        columns.insert(0, "id");
    }
    let sql = insert_sql(table, &columns);
    let result = sqlx::query_scalar::<_, Uuid>(&sql)
        .bind(Value::Object(fields.clone()))
        .fetch_one(pool)
        .await;
    match result {
        Ok(id) => Ok(id),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            match fields.get("id").and_then(Value::as_str).and_then(|raw| Uuid::parse_str(raw).ok()) {
                Some(id) => Err(DbError::Conflict { table, id }),
                None => Err(sqlx::Error::Database(e).into()),
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Pushes every writable column the record carries. False when no row has that id.
pub(crate) async fn update(
    pool: &PgPool,
    table: &str,
    writable: &[&str],
    id: Uuid,
    fields: &Map<String, Value>,
) -> Result<bool, DbError> {
    let columns = present_columns(writable, fields);
    if columns.is_empty() {
        let mut conn = pool.acquire().await?;
        return exists(&mut conn, table, id).await;
    }
    let sql = update_sql(table, &columns);
    let result = sqlx::query(&sql)
        .bind(id)
        .bind(Value::Object(fields.clone()))
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn find(pool: &PgPool, table: &str, id: Uuid) -> Result<Option<Value>, DbError> {
    let sql = format!("SELECT to_jsonb(t) FROM {} AS t WHERE t.\"id\" = $1", quote_ident(table));
    let row = sqlx::query_scalar::<_, Value>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub(crate) async fn find_all(pool: &PgPool, table: &str) -> Result<Vec<Value>, DbError> {
    let sql = format!("SELECT to_jsonb(t) FROM {} AS t {ORDER_BY_CREATION}", quote_ident(table));
    let rows = sqlx::query_scalar::<_, Value>(&sql).fetch_all(pool).await?;
    Ok(rows)
}

/// Deletes by id; true when a row was affected.
pub(crate) async fn delete(pool: &PgPool, table: &str, id: Uuid) -> Result<bool, DbError> {
    let sql = format!("DELETE FROM {} WHERE \"id\" = $1", quote_ident(table));
    let result = sqlx::query(&sql).bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

/// Executes caller-supplied SQL as is. The string is not parameterized.
pub(crate) async fn raw_query(pool: &PgPool, raw: &str) -> Result<Vec<Value>, DbError> {
    match plan_raw_query(raw) {
        RawStatement::Rows(sql) => {
            let rows = sqlx::query_scalar::<_, Value>(&sql).fetch_all(pool).await?;
            Ok(rows)
        }
        RawStatement::Execute(sql) => {
            let result = sqlx::raw_sql(&sql).execute(pool).await?;
            tracing::debug!(rows_affected = result.rows_affected(), "Executed raw statement.");
            Ok(Vec::new())
        }
    }
}

async fn exists(conn: &mut PgConnection, table: &str, id: Uuid) -> Result<bool, DbError> {
    let sql = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE \"id\" = $1)", quote_ident(table));
    let found = sqlx::query_scalar::<_, bool>(&sql)
        .bind(id)
        .fetch_one(conn)
        .await?;
    Ok(found)
}

/// The first of `ids` with no row in `table`, if any.
async fn first_missing(
    conn: &mut PgConnection,
    table: &str,
    ids: &[Uuid],
) -> Result<Option<Uuid>, DbError> {
    if ids.is_empty() {
        return Ok(None);
    }
    let sql = format!("SELECT \"id\" FROM {} WHERE \"id\" = ANY($1)", quote_ident(table));
    let found = sqlx::query_scalar::<_, Uuid>(&sql)
        .bind(ids.to_vec())
        .fetch_all(conn)
        .await?;
    Ok(ids.iter().copied().find(|id| !found.contains(id)))
}

/// Loads the rows an association points at, oldest first.
pub(crate) async fn related(
    pool: &PgPool,
    table: &'static str,
    target: &'static str,
    kind: RelationKind,
    id: Uuid,
) -> Result<Vec<Value>, DbError> {
    let source = quote_ident(table);
    let target_table = quote_ident(target);
    let mut conn = pool.acquire().await?;

    match kind {
        RelationKind::BelongsTo { foreign_key } => {
            let sql = format!(
                "SELECT {} FROM {source} WHERE \"id\" = $1",
                quote_ident(foreign_key)
            );
            let target_id = sqlx::query_scalar::<_, Option<Uuid>>(&sql)
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?
                .ok_or(DbError::NotFound { table, id })?;
            let Some(target_id) = target_id else {
                return Ok(Vec::new());
            };
            let sql = format!("SELECT to_jsonb(t) FROM {target_table} AS t WHERE t.\"id\" = $1");
            let row = sqlx::query_scalar::<_, Value>(&sql)
                .bind(target_id)
                .fetch_optional(&mut *conn)
                .await?;
            Ok(row.into_iter().collect())
        }
        RelationKind::HasMany { foreign_key } => {
            if !exists(&mut conn, table, id).await? {
                return Err(DbError::NotFound { table, id });
            }
            let sql = format!(
                "SELECT to_jsonb(t) FROM {target_table} AS t WHERE t.{} = $1 {ORDER_BY_CREATION}",
                quote_ident(foreign_key)
            );
            let rows = sqlx::query_scalar::<_, Value>(&sql)
                .bind(id)
                .fetch_all(&mut *conn)
                .await?;
            Ok(rows)
        }
        RelationKind::ManyToMany {
            join_table,
            source_key,
            target_key,
        } => {
            if !exists(&mut conn, table, id).await? {
                return Err(DbError::NotFound { table, id });
            }
            let sql = format!(
                "SELECT to_jsonb(t) FROM {target_table} AS t \
                 JOIN {} AS j ON j.{} = t.\"id\" \
                 WHERE j.{} = $1 {ORDER_BY_CREATION}",
                quote_ident(join_table),
                quote_ident(target_key),
                quote_ident(source_key),
            );
            let rows = sqlx::query_scalar::<_, Value>(&sql)
                .bind(id)
                .fetch_all(&mut *conn)
                .await?;
            Ok(rows)
        }
    }
}

/// Replaces an association so it points at exactly `ids`, in one transaction.
pub(crate) async fn set_related(
    pool: &PgPool,
    table: &'static str,
    target: &'static str,
    kind: RelationKind,
    id: Uuid,
    ids: &[Uuid],
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    if !exists(&mut tx, table, id).await? {
        return Err(DbError::NotFound { table, id });
    }
    if let Some(missing) = first_missing(&mut tx, target, ids).await? {
        return Err(DbError::NotFound {
            table: target,
            id: missing,
        });
    }

    let source = quote_ident(table);
    let target_table = quote_ident(target);

    match kind {
        RelationKind::BelongsTo { foreign_key } => {
            let sql = format!("UPDATE {source} SET {} = $2 WHERE \"id\" = $1", quote_ident(foreign_key));
            sqlx::query(&sql)
                .bind(id)
                .bind(ids.first().copied())
                .execute(&mut *tx)
                .await?;
        }
        RelationKind::HasMany { foreign_key } => {
            let foreign_key = quote_ident(foreign_key);
            let detach = format!("UPDATE {target_table} SET {foreign_key} = NULL WHERE {foreign_key} = $1");
            sqlx::query(&detach).bind(id).execute(&mut *tx).await?;

            let attach = format!("UPDATE {target_table} SET {foreign_key} = $1 WHERE \"id\" = ANY($2)");
            sqlx::query(&attach)
                .bind(id)
                .bind(ids.to_vec())
                .execute(&mut *tx)
                .await?;
        }
        RelationKind::ManyToMany {
            join_table,
            source_key,
            target_key,
        } => {
            let join_table = quote_ident(join_table);
            let source_key = quote_ident(source_key);
            let target_key = quote_ident(target_key);

            let clear = format!("DELETE FROM {join_table} WHERE {source_key} = $1");
            sqlx::query(&clear).bind(id).execute(&mut *tx).await?;

            let link = format!(
                "INSERT INTO {join_table} ({source_key}, {target_key}) \
                 SELECT $1, target_id FROM unnest($2::uuid[]) AS target_id \
                 ON CONFLICT DO NOTHING"
            );
            sqlx::query(&link)
                .bind(id)
                .bind(ids.to_vec())
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    Ok(())
}
