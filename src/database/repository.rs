use serde_json::{Map, Value};
use sqlx::postgres::PgArguments;
use sqlx::{PgConnection, PgPool, Row};
use std::collections::HashSet;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::entity::EntityRecord;
use crate::filter::{Filter, FilterData};
use crate::schema::EntityDescriptor;

/// Generic row access for registered entities. Rows travel as JSON maps
/// (`row_to_json`) so one code path serves every entity table.

pub async fn find_by_id(
    pool: &PgPool,
    descriptor: &EntityDescriptor,
    id: Uuid,
) -> Result<Option<Map<String, Value>>, DatabaseError> {
    let sql = format!(
        "SELECT row_to_json(t) AS row FROM (SELECT * FROM \"{}\" WHERE \"id\" = $1) t",
        descriptor.table_name
    );

    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    match row {
        Some(row) => {
            let value: Value = row.try_get("row")?;
            Ok(Some(value_to_map(value)?))
        }
        None => Ok(None),
    }
}

/// Which of the given ids exist in the table. One query per target type is
/// the contract the reference resolver builds on.
pub async fn select_existing_ids(
    pool: &PgPool,
    table_name: &str,
    ids: &[Uuid],
) -> Result<HashSet<Uuid>, DatabaseError> {
    if ids.is_empty() {
        return Ok(HashSet::new());
    }

    let sql = format!("SELECT \"id\" FROM \"{}\" WHERE \"id\" = ANY($1)", table_name);
    let rows = sqlx::query(&sql).bind(ids.to_vec()).fetch_all(pool).await?;

    let mut found = HashSet::with_capacity(rows.len());
    for row in rows {
        found.insert(row.try_get::<Uuid, _>("id")?);
    }
    Ok(found)
}

/// Rows matching a prepared predicate (placeholders already numbered and
/// cast). Used by the uniqueness probe.
pub async fn select_where(
    pool: &PgPool,
    table_name: &str,
    where_sql: &str,
    params: &[Value],
) -> Result<Vec<Map<String, Value>>, DatabaseError> {
    let sql = format!(
        "SELECT row_to_json(t) AS row FROM (SELECT * FROM \"{}\" WHERE {}) t",
        table_name, where_sql
    );

    let mut query = sqlx::query(&sql);
    for param in params {
        query = bind_value(query, param);
    }

    let rows = query.fetch_all(pool).await?;
    rows.into_iter()
        .map(|row| {
            let value: Value = row.try_get("row")?;
            value_to_map(value)
        })
        .collect()
}

/// Filtered select through the filter module.
pub async fn select_filtered(
    pool: &PgPool,
    descriptor: &EntityDescriptor,
    filter_data: FilterData,
) -> Result<Vec<Map<String, Value>>, DatabaseError> {
    let mut filter =
        Filter::new(descriptor.table_name).map_err(|e| DatabaseError::QueryError(e.to_string()))?;
    filter.assign(filter_data).map_err(|e| DatabaseError::QueryError(e.to_string()))?;
    let inner = filter.to_sql().map_err(|e| DatabaseError::QueryError(e.to_string()))?;

    let sql = format!("SELECT row_to_json(t) AS row FROM ({}) t", inner.query);
    let mut query = sqlx::query(&sql);
    for param in &inner.params {
        query = bind_value(query, param);
    }

    let rows = query.fetch_all(pool).await?;
    rows.into_iter()
        .map(|row| {
            let value: Value = row.try_get("row")?;
            value_to_map(value)
        })
        .collect()
}

/// Count matching the same predicate as `select_filtered`, for page math.
pub async fn count_filtered(
    pool: &PgPool,
    descriptor: &EntityDescriptor,
    filter_data: FilterData,
) -> Result<i64, DatabaseError> {
    let mut filter =
        Filter::new(descriptor.table_name).map_err(|e| DatabaseError::QueryError(e.to_string()))?;
    filter.assign(filter_data).map_err(|e| DatabaseError::QueryError(e.to_string()))?;
    let sql_result =
        filter.to_count_sql().map_err(|e| DatabaseError::QueryError(e.to_string()))?;

    let mut query = sqlx::query(&sql_result.query);
    for param in &sql_result.params {
        query = bind_value(query, param);
    }

    let row = query.fetch_one(pool).await?;
    Ok(row.try_get("count")?)
}

/// Inserts the full record. Column order is sorted for deterministic SQL.
pub async fn insert(
    conn: &mut PgConnection,
    descriptor: &EntityDescriptor,
    record: &EntityRecord,
) -> Result<(), DatabaseError> {
    let mut columns: Vec<&String> = record.fields().keys().collect();
    columns.sort();

    let column_list =
        columns.iter().map(|c| format!("\"{}\"", c)).collect::<Vec<_>>().join(", ");
    let placeholders = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("${}::{}", i + 1, descriptor.column_cast(c)))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "INSERT INTO \"{}\" ({}) VALUES ({})",
        descriptor.table_name, column_list, placeholders
    );

    let null = Value::Null;
    let mut query = sqlx::query(&sql);
    for column in &columns {
        let value = record.get(column).unwrap_or(&null);
        query = bind_value(query, value);
    }

    query.execute(conn).await?;
    Ok(())
}

/// Updates the given columns guarded by the expected version (optimistic
/// locking); bumps the version. Returns the number of affected rows - zero
/// means a concurrent writer won.
pub async fn update(
    conn: &mut PgConnection,
    descriptor: &EntityDescriptor,
    id: Uuid,
    expected_version: i64,
    columns: &[(String, Value)],
) -> Result<u64, DatabaseError> {
    let mut assignments: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, (name, _))| format!("\"{}\" = ${}::{}", name, i + 1, descriptor.column_cast(name)))
        .collect();
    assignments.push("\"version\" = \"version\" + 1".to_string());

    let sql = format!(
        "UPDATE \"{}\" SET {} WHERE \"id\" = ${}::uuid AND \"version\" = ${}::int8",
        descriptor.table_name,
        assignments.join(", "),
        columns.len() + 1,
        columns.len() + 2,
    );

    let mut query = sqlx::query(&sql);
    for (_, value) in columns {
        query = bind_value(query, value);
    }
    query = query.bind(id.to_string()).bind(expected_version);

    let result = query.execute(conn).await?;
    Ok(result.rows_affected())
}

fn value_to_map(value: Value) -> Result<Map<String, Value>, DatabaseError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DatabaseError::QueryError(format!(
            "expected row object from row_to_json, got {}",
            other
        ))),
    }
}

/// Binds a JSON value onto a query. String lists bind as text arrays; every
/// placeholder carries an explicit cast, so text bindings are safe for
/// typed columns.
pub fn bind_value<'q>(
    q: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    v: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s),
        Value::Array(items) => {
            let strings: Vec<String> =
                items.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect();
            q.bind(strings)
        }
        Value::Object(_) => q.bind(v.clone()),
    }
}
