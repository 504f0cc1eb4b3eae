//! Root CRUD handlers: create, count, list, search, and by-id operations.

use crate::auth::OperationKind;
use crate::error::ApiError;
use crate::handlers::{
    authorize, body_to_map, build_query, null_fill, parse_id, project_attributes,
    reject_unknown_fields, resolve_includes, search_reply, strip_for_create, strip_references,
    validate::validate_body, ModelContext,
};
use crate::query::{QueryDescriptor, QueryParams};
use crate::response::Reply;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;

pub async fn create(
    State(ctx): State<ModelContext>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Reply, ApiError> {
    let model = &ctx.model;
    authorize(
        &ctx.policies,
        OperationKind::Create,
        &model.name,
        Method::POST,
        format!("/{}", model.route),
        &headers,
    )
    .await?;
    let body = strip_for_create(model, body_to_map(body)?);
    validate_body(model, &body, false)?;
    let row = ctx.app.store.create(model, &body).await?;
    Ok(Reply::created(strip_references(model, row)))
}

pub async fn count(
    State(ctx): State<ModelContext>,
    headers: HeaderMap,
) -> Result<Reply, ApiError> {
    let model = &ctx.model;
    authorize(
        &ctx.policies,
        OperationKind::Read,
        &model.name,
        Method::GET,
        format!("/{}/count", model.route),
        &headers,
    )
    .await?;
    let total = ctx
        .app
        .store
        .count(model, &QueryDescriptor::unbounded(), &[])
        .await?;
    Ok(Reply::ok(json!({ "count": total })))
}

pub async fn list(
    State(ctx): State<ModelContext>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Reply, ApiError> {
    let model = &ctx.model;
    authorize(
        &ctx.policies,
        OperationKind::Read,
        &model.name,
        Method::GET,
        format!("/{}", model.route),
        &headers,
    )
    .await?;
    let params = QueryParams::from_query_map(&params);
    let query = build_query(&ctx.app.config, &ctx.app.registry, &params, false)?;
    let rows = ctx.app.store.find_all(model, &query, &[]).await?;
    Ok(Reply::ok(Value::Array(rows)))
}

/// Shared by the POST search route and its deprecated GET alias.
async fn run_search(ctx: &ModelContext, params: QueryParams) -> Result<Reply, ApiError> {
    let model = &ctx.model;
    let query = build_query(&ctx.app.config, &ctx.app.registry, &params, true)?;
    let includes = resolve_includes(&ctx.app.registry, model, query.include.as_deref())?;
    let rows = ctx.app.store.find_all(model, &query, &includes).await?;
    let total = ctx.app.store.count(model, &query, &includes).await?;
    Ok(search_reply(rows, total))
}

pub async fn search(
    State(ctx): State<ModelContext>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Reply, ApiError> {
    authorize(
        &ctx.policies,
        OperationKind::Search,
        &ctx.model.name,
        Method::POST,
        format!("/{}/search", ctx.model.route),
        &headers,
    )
    .await?;
    let params: QueryParams = serde_json::from_value(body)
        .map_err(|_| ApiError::BadRequest("body must be a search parameter object".into()))?;
    run_search(&ctx, params).await
}

pub async fn search_get(
    State(ctx): State<ModelContext>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Reply, ApiError> {
    authorize(
        &ctx.policies,
        OperationKind::Search,
        &ctx.model.name,
        Method::GET,
        format!("/{}/search", ctx.model.route),
        &headers,
    )
    .await?;
    run_search(&ctx, QueryParams::from_query_map(&params)).await
}

pub async fn read(
    State(ctx): State<ModelContext>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Reply, ApiError> {
    let model = &ctx.model;
    authorize(
        &ctx.policies,
        OperationKind::Read,
        &model.name,
        Method::GET,
        format!("/{}/:id", model.route),
        &headers,
    )
    .await?;
    let id = parse_id(model, &id)?;
    let row = ctx
        .app
        .store
        .find_by_id(model, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("record not found.".into()))?;
    let attributes = QueryParams::from_query_map(&params).a.map(|a| {
        a.split('|')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>()
    });
    Ok(Reply::ok(project_attributes(
        model,
        row,
        attributes.as_deref(),
    )))
}

pub async fn update(
    State(ctx): State<ModelContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Reply, ApiError> {
    let model = &ctx.model;
    authorize(
        &ctx.policies,
        OperationKind::Update,
        &model.name,
        Method::PUT,
        format!("/{}/:id", model.route),
        &headers,
    )
    .await?;
    let id = parse_id(model, &id)?;
    let mut body = body_to_map(body)?;
    reject_unknown_fields(model, &body)?;
    null_fill(model, &mut body);
    validate_body(model, &body, false)?;
    ctx.app
        .store
        .update(model, &id, &body)
        .await?
        .ok_or_else(|| ApiError::NotFound("record not found.".into()))?;
    Ok(Reply::no_content())
}

pub async fn update_partial(
    State(ctx): State<ModelContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Reply, ApiError> {
    let model = &ctx.model;
    authorize(
        &ctx.policies,
        OperationKind::UpdatePartial,
        &model.name,
        Method::PATCH,
        format!("/{}/:id", model.route),
        &headers,
    )
    .await?;
    let id = parse_id(model, &id)?;
    let body = body_to_map(body)?;
    reject_unknown_fields(model, &body)?;
    validate_body(model, &body, true)?;
    ctx.app
        .store
        .update(model, &id, &body)
        .await?
        .ok_or_else(|| ApiError::NotFound("record not found.".into()))?;
    Ok(Reply::no_content())
}

pub async fn delete(
    State(ctx): State<ModelContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Reply, ApiError> {
    let model = &ctx.model;
    authorize(
        &ctx.policies,
        OperationKind::Delete,
        &model.name,
        Method::DELETE,
        format!("/{}/:id", model.route),
        &headers,
    )
    .await?;
    let id = parse_id(model, &id)?;
    if !ctx.app.store.destroy(model, &id).await? {
        return Err(ApiError::NotFound("record not found.".into()));
    }
    Ok(Reply::no_content())
}
