use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::api::PageInfo;
use crate::config;
use crate::database::manager::DatabaseManager;
use crate::database::repository;
use crate::entity::EntityRecord;
use crate::error::ApiError;
use crate::filter::{Filter, FilterData};
use crate::middleware::AuthUser;
use crate::patch::engine;
use crate::schema::{registry, EntityDescriptor};

fn descriptor_for(entity: &str) -> Result<&'static EntityDescriptor, ApiError> {
    registry()
        .get(entity)
        .ok_or_else(|| ApiError::not_found(format!("unknown entity type: {}", entity)))
}

fn object_payload(payload: Value) -> Result<Map<String, Value>, ApiError> {
    match payload {
        Value::Object(map) if !map.is_empty() => Ok(map),
        Value::Object(_) => Err(ApiError::bad_request("payload must not be empty")),
        _ => Err(ApiError::bad_request("payload must be a JSON object")),
    }
}

/// POST /api/:entity - create a new entity from a property-bag payload
pub async fn post_item(
    Path(entity): Path<String>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let descriptor = descriptor_for(&entity)?;
    let payload = object_payload(payload)?;
    let pool = DatabaseManager::pool().await?;

    let outcome = engine::create_item(descriptor, &payload, &user, pool).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": outcome.record.to_api_output(descriptor) })),
    ))
}

/// PATCH /api/:entity/:id - partial update of an existing entity
pub async fn patch_item(
    Path((entity, id)): Path<(String, Uuid)>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let descriptor = descriptor_for(&entity)?;
    let payload = object_payload(payload)?;
    let pool = DatabaseManager::pool().await?;

    let outcome = engine::patch_item(descriptor, id, &payload, &user, pool).await?;

    Ok(Json(json!({ "success": true, "data": outcome.record.to_api_output(descriptor) })))
}

/// GET /api/:entity/:id - fetch a single entity by primary key
pub async fn get_item(
    Path((entity, id)): Path<(String, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let descriptor = descriptor_for(&entity)?;
    let pool = DatabaseManager::pool().await?;

    let row = repository::find_by_id(pool, descriptor, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{} {} not found", descriptor.name, id)))?;
    let record = EntityRecord::from_row(descriptor.name, row);

    Ok(Json(json!({ "success": true, "data": record.to_api_output(descriptor) })))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Zero-based page index
    pub page: Option<i32>,
    pub size: Option<i32>,
    /// `column` or `column,desc`
    pub sort: Option<String>,
    /// Free-text filter matched case-insensitively against string columns
    pub filter: Option<String>,
}

/// GET /api/:entity/search - filtered, paged search
pub async fn search(
    Path(entity): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let descriptor = descriptor_for(&entity)?;
    let pool = DatabaseManager::pool().await?;

    let pagination = &config::config().pagination;
    let page = query.page.unwrap_or(0).max(0);
    let size = query.size.unwrap_or(pagination.default_size).clamp(1, pagination.max_size);

    let where_clause = query
        .filter
        .as_deref()
        .filter(|f| !f.trim().is_empty())
        .and_then(|f| free_text_where(descriptor, f));
    let order = query.sort.as_deref().map(sort_to_order);

    let filter_data = FilterData {
        select: None,
        where_clause: where_clause.clone(),
        order: order.map(Value::String),
        limit: Some(size),
        offset: Some(page * size),
    };
    let count_filter = FilterData { where_clause, ..Default::default() };

    // surface filter problems as a client error before touching the pool
    Filter::new(descriptor.table_name)?.assign(filter_data.clone())?;

    let rows = repository::select_filtered(pool, descriptor, filter_data).await?;
    let total = repository::count_filtered(pool, descriptor, count_filter).await?;

    let content: Vec<Value> = rows
        .into_iter()
        .map(|row| EntityRecord::from_row(descriptor.name, row).to_api_output(descriptor))
        .collect();

    Ok(Json(json!({
        "success": true,
        "data": content,
        "page": PageInfo::new(page, size, total),
    })))
}

/// POST /api/:entity/find - search with a structured filter document
pub async fn find(
    Path(entity): Path<String>,
    Json(filter_data): Json<FilterData>,
) -> Result<impl IntoResponse, ApiError> {
    let descriptor = descriptor_for(&entity)?;
    let pool = DatabaseManager::pool().await?;

    // validate the filter document up front so errors come back as 400
    Filter::new(descriptor.table_name)?.assign(filter_data.clone())?;

    let rows = repository::select_filtered(pool, descriptor, filter_data).await?;
    let content: Vec<Value> = rows
        .into_iter()
        .map(|row| EntityRecord::from_row(descriptor.name, row).to_api_output(descriptor))
        .collect();

    Ok(Json(json!({ "success": true, "data": content })))
}

/// ILIKE branch per searchable string column; `None` when the entity has
/// no searchable columns.
fn free_text_where(descriptor: &EntityDescriptor, filter: &str) -> Option<Value> {
    let pattern = format!("%{}%", filter.trim());
    let mut branches: Vec<Value> = descriptor
        .searchable_columns()
        .into_iter()
        .map(|col| json!({ col: { "$ilike": pattern.clone() } }))
        .collect();

    match branches.len() {
        0 => None,
        1 => Some(branches.remove(0)),
        _ => Some(json!({ "$or": branches })),
    }
}

/// Spring-style `column,desc` into the filter module's `column desc` form.
fn sort_to_order(sort: &str) -> String {
    sort.replace(',', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn free_text_where_covers_searchable_columns() {
        let labs = registry().get("laboratories").unwrap();
        let clause = free_text_where(labs, "acme").unwrap();
        let branches = clause["$or"].as_array().unwrap();
        assert!(branches.iter().any(|b| b.get("name").is_some()));
        assert!(branches.iter().any(|b| b.get("short_name").is_some()));
        assert!(branches
            .iter()
            .all(|b| b.as_object().unwrap().values().all(|v| v["$ilike"] == json!("%acme%"))));
    }

    #[test]
    fn hidden_columns_are_not_searched() {
        let users = registry().get("users").unwrap();
        let clause = free_text_where(users, "alice").unwrap();
        let rendered = clause.to_string();
        assert!(!rendered.contains("password"));
    }

    #[test]
    fn sort_parameter_translates_to_order_string() {
        assert_eq!(sort_to_order("name,desc"), "name desc");
        assert_eq!(sort_to_order("name"), "name");
    }

    #[test]
    fn payload_must_be_a_non_empty_object() {
        assert!(object_payload(json!({"a": 1})).is_ok());
        assert!(object_payload(json!({})).is_err());
        assert!(object_payload(json!([1, 2])).is_err());
        assert!(object_payload(json!("x")).is_err());
    }
}
