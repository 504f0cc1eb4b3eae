//! Relationship sub-route handlers: singular (HasOne/BelongsTo) and plural
//! (HasMany/BelongsToMany) variants under `/{route}/:id/{alias}`.

use crate::association::JoinSpec;
use crate::auth::OperationKind;
use crate::error::ApiError;
use crate::handlers::{
    authorize, body_to_map, build_query, parse_id, project_attributes, reject_unknown_fields,
    resolve_includes, search_reply, strip_for_create, strip_references, validate::validate_body,
    RelationContext,
};
use crate::model::AssociationKind;
use crate::query::{QueryDescriptor, QueryParams};
use crate::response::Reply;
use crate::store::Row;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Method},
    Json,
};
use serde_json::Value;
use std::collections::HashMap;

fn alias_segment(ctx: &RelationContext) -> &str {
    if ctx.assoc.kind.is_singular() {
        &ctx.assoc.alias.singular
    } else {
        &ctx.assoc.alias.plural
    }
}

fn route_path(ctx: &RelationContext, suffix: &str) -> String {
    format!("/{}/:id/{}{}", ctx.source.route, alias_segment(ctx), suffix)
}

/// Parse the source id and require the source instance to exist.
async fn require_source(ctx: &RelationContext, raw_id: &str) -> Result<Value, ApiError> {
    let id = parse_id(&ctx.source, raw_id)?;
    ctx.app
        .store
        .find_by_id(&ctx.source, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("record not found.".into()))?;
    Ok(id)
}

/// When the target holds the association's foreign key and the body omits
/// it, fill it from the source id.
fn fill_foreign_key(ctx: &RelationContext, body: &mut Row, source_id: &Value) {
    if let JoinSpec::RelatedKey { fk } = ctx.assoc.join_from(&ctx.source.name) {
        let missing = body.get(&fk).map(Value::is_null).unwrap_or(true);
        if missing && ctx.target.has_attribute(&fk) {
            body.insert(fk, source_id.clone());
        }
    }
}

fn attribute_filter(params: &HashMap<String, String>) -> Option<Vec<String>> {
    params.get("a").map(|a| {
        a.split('|')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}

// Singular relations (HasOne / BelongsTo).

pub async fn get_single(
    State(ctx): State<RelationContext>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Reply, ApiError> {
    authorize(
        &ctx.policies,
        OperationKind::Read,
        &ctx.source.name,
        Method::GET,
        route_path(&ctx, ""),
        &headers,
    )
    .await?;
    let source_id = require_source(&ctx, &id).await?;
    let rows = ctx
        .app
        .store
        .relation_get(
            &ctx.source,
            &ctx.assoc,
            &source_id,
            &ctx.target,
            &QueryDescriptor::unbounded(),
            &[],
        )
        .await?;
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::NotFound("target not found.".into()))?;
    Ok(Reply::ok(project_attributes(
        &ctx.target,
        row,
        attribute_filter(&params).as_deref(),
    )))
}

pub async fn create_single(
    State(ctx): State<RelationContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Reply, ApiError> {
    authorize(
        &ctx.policies,
        OperationKind::Create,
        &ctx.source.name,
        Method::POST,
        route_path(&ctx, ""),
        &headers,
    )
    .await?;
    let source_id = require_source(&ctx, &id).await?;
    let body = strip_for_create(&ctx.target, body_to_map(body)?);
    validate_body(&ctx.target, &body, false)?;
    let created = ctx
        .app
        .store
        .relation_create(&ctx.source, &ctx.assoc, &source_id, &ctx.target, &body)
        .await?;
    // BelongsTo replies with the instance as seen through the relation
    // accessor, not the raw insert result.
    let row = if ctx.assoc.kind_viewed_from(&ctx.source.name) == AssociationKind::BelongsTo {
        ctx.app
            .store
            .relation_get(
                &ctx.source,
                &ctx.assoc,
                &source_id,
                &ctx.target,
                &QueryDescriptor::unbounded(),
                &[],
            )
            .await?
            .into_iter()
            .next()
            .unwrap_or(created)
    } else {
        created
    };
    Ok(Reply::created(strip_references(&ctx.target, row)))
}

async fn update_single_inner(
    ctx: &RelationContext,
    raw_id: &str,
    headers: &HeaderMap,
    body: Value,
    partial: bool,
) -> Result<Reply, ApiError> {
    let (op, method) = if partial {
        (OperationKind::UpdatePartial, Method::PATCH)
    } else {
        (OperationKind::Update, Method::PUT)
    };
    authorize(
        &ctx.policies,
        op,
        &ctx.source.name,
        method,
        route_path(ctx, ""),
        headers,
    )
    .await?;
    let source_id = require_source(ctx, raw_id).await?;
    let related = ctx
        .app
        .store
        .relation_get(
            &ctx.source,
            &ctx.assoc,
            &source_id,
            &ctx.target,
            &QueryDescriptor::unbounded(),
            &[],
        )
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::NotFound("target not found.".into()))?;
    let target_id = related
        .get(&ctx.target.primary_key)
        .cloned()
        .ok_or_else(|| ApiError::Internal("related row has no primary key".into()))?;
    let mut body = body_to_map(body)?;
    fill_foreign_key(ctx, &mut body, &source_id);
    reject_unknown_fields(&ctx.target, &body)?;
    validate_body(&ctx.target, &body, true)?;
    ctx.app
        .store
        .update(&ctx.target, &target_id, &body)
        .await?
        .ok_or_else(|| ApiError::NotFound("target not found.".into()))?;
    Ok(Reply::no_content())
}

pub async fn update_single(
    State(ctx): State<RelationContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Reply, ApiError> {
    update_single_inner(&ctx, &id, &headers, body, false).await
}

pub async fn update_single_partial(
    State(ctx): State<RelationContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Reply, ApiError> {
    update_single_inner(&ctx, &id, &headers, body, true).await
}

pub async fn delete_single(
    State(ctx): State<RelationContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Reply, ApiError> {
    authorize(
        &ctx.policies,
        OperationKind::Associate,
        &ctx.source.name,
        Method::DELETE,
        route_path(&ctx, ""),
        &headers,
    )
    .await?;
    let source_id = require_source(&ctx, &id).await?;
    let unlinked = ctx
        .app
        .store
        .relation_unlink(&ctx.source, &ctx.assoc, &source_id, &ctx.target, None)
        .await?;
    if !unlinked {
        return Err(ApiError::NotFound("target not found.".into()));
    }
    Ok(Reply::no_content())
}

// Plural relations (HasMany / BelongsToMany).

pub async fn list(
    State(ctx): State<RelationContext>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Reply, ApiError> {
    authorize(
        &ctx.policies,
        OperationKind::Read,
        &ctx.source.name,
        Method::GET,
        route_path(&ctx, ""),
        &headers,
    )
    .await?;
    let source_id = require_source(&ctx, &id).await?;
    let params = QueryParams::from_query_map(&params);
    let query = build_query(&ctx.app.config, &ctx.app.registry, &params, false)?;
    let rows = ctx
        .app
        .store
        .relation_get(&ctx.source, &ctx.assoc, &source_id, &ctx.target, &query, &[])
        .await?;
    Ok(Reply::ok(Value::Array(rows)))
}

pub async fn count(
    State(ctx): State<RelationContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Reply, ApiError> {
    authorize(
        &ctx.policies,
        OperationKind::Read,
        &ctx.source.name,
        Method::GET,
        route_path(&ctx, "/count"),
        &headers,
    )
    .await?;
    let source_id = require_source(&ctx, &id).await?;
    let total = ctx
        .app
        .store
        .relation_count(
            &ctx.source,
            &ctx.assoc,
            &source_id,
            &ctx.target,
            &QueryDescriptor::unbounded(),
            &[],
        )
        .await?;
    Ok(Reply::ok(serde_json::json!({ "count": total })))
}

pub async fn search(
    State(ctx): State<RelationContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Reply, ApiError> {
    authorize(
        &ctx.policies,
        OperationKind::Search,
        &ctx.source.name,
        Method::POST,
        route_path(&ctx, "/search"),
        &headers,
    )
    .await?;
    let source_id = require_source(&ctx, &id).await?;
    let params: QueryParams = serde_json::from_value(body)
        .map_err(|_| ApiError::BadRequest("body must be a search parameter object".into()))?;
    let query = build_query(&ctx.app.config, &ctx.app.registry, &params, true)?;
    let includes = resolve_includes(&ctx.app.registry, &ctx.target, query.include.as_deref())?;
    let rows = ctx
        .app
        .store
        .relation_get(
            &ctx.source,
            &ctx.assoc,
            &source_id,
            &ctx.target,
            &query,
            &includes,
        )
        .await?;
    let total = ctx
        .app
        .store
        .relation_count(
            &ctx.source,
            &ctx.assoc,
            &source_id,
            &ctx.target,
            &query,
            &includes,
        )
        .await?;
    Ok(search_reply(rows, total))
}

pub async fn create_one(
    State(ctx): State<RelationContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Reply, ApiError> {
    authorize(
        &ctx.policies,
        OperationKind::Create,
        &ctx.source.name,
        Method::POST,
        route_path(&ctx, ""),
        &headers,
    )
    .await?;
    let source_id = require_source(&ctx, &id).await?;
    let body = strip_for_create(&ctx.target, body_to_map(body)?);
    validate_body(&ctx.target, &body, false)?;
    let created = ctx
        .app
        .store
        .relation_create(&ctx.source, &ctx.assoc, &source_id, &ctx.target, &body)
        .await?;
    Ok(Reply::created(strip_references(&ctx.target, created)))
}

/// DELETE on the collection path: unset every link, never destroy rows.
pub async fn unlink_all(
    State(ctx): State<RelationContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Reply, ApiError> {
    authorize(
        &ctx.policies,
        OperationKind::Associate,
        &ctx.source.name,
        Method::DELETE,
        route_path(&ctx, ""),
        &headers,
    )
    .await?;
    let source_id = require_source(&ctx, &id).await?;
    ctx.app
        .store
        .relation_unlink(&ctx.source, &ctx.assoc, &source_id, &ctx.target, None)
        .await?;
    Ok(Reply::no_content())
}

pub async fn get_one(
    State(ctx): State<RelationContext>,
    Path((id, target_id)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Reply, ApiError> {
    authorize(
        &ctx.policies,
        OperationKind::Read,
        &ctx.source.name,
        Method::GET,
        route_path(&ctx, "/:targetId"),
        &headers,
    )
    .await?;
    let source_id = require_source(&ctx, &id).await?;
    let target_id = parse_id(&ctx.target, &target_id)?;
    let linked = ctx
        .app
        .store
        .relation_has(&ctx.source, &ctx.assoc, &source_id, &ctx.target, &target_id)
        .await?;
    if !linked {
        return Err(ApiError::NotFound("target not found.".into()));
    }
    let row = ctx
        .app
        .store
        .find_by_id(&ctx.target, &target_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("target not found.".into()))?;
    Ok(Reply::ok(project_attributes(
        &ctx.target,
        row,
        attribute_filter(&params).as_deref(),
    )))
}

async fn update_one_inner(
    ctx: &RelationContext,
    raw_id: &str,
    raw_target_id: &str,
    headers: &HeaderMap,
    body: Value,
    partial: bool,
) -> Result<Reply, ApiError> {
    let (op, method) = if partial {
        (OperationKind::UpdatePartial, Method::PATCH)
    } else {
        (OperationKind::Update, Method::PUT)
    };
    authorize(
        &ctx.policies,
        op,
        &ctx.source.name,
        method,
        route_path(ctx, "/:targetId"),
        headers,
    )
    .await?;
    let source_id = require_source(ctx, raw_id).await?;
    let target_id = parse_id(&ctx.target, raw_target_id)?;
    let linked = ctx
        .app
        .store
        .relation_has(&ctx.source, &ctx.assoc, &source_id, &ctx.target, &target_id)
        .await?;
    if !linked {
        return Err(ApiError::NotFound("target not found.".into()));
    }
    let mut body = body_to_map(body)?;
    fill_foreign_key(ctx, &mut body, &source_id);
    reject_unknown_fields(&ctx.target, &body)?;
    validate_body(&ctx.target, &body, true)?;
    ctx.app
        .store
        .update(&ctx.target, &target_id, &body)
        .await?
        .ok_or_else(|| ApiError::NotFound("target not found.".into()))?;
    Ok(Reply::no_content())
}

pub async fn update_one(
    State(ctx): State<RelationContext>,
    Path((id, target_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Reply, ApiError> {
    update_one_inner(&ctx, &id, &target_id, &headers, body, false).await
}

pub async fn update_one_partial(
    State(ctx): State<RelationContext>,
    Path((id, target_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Reply, ApiError> {
    update_one_inner(&ctx, &id, &target_id, &headers, body, true).await
}

/// DELETE on the instance path: remove one association link.
pub async fn unlink_one(
    State(ctx): State<RelationContext>,
    Path((id, target_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Reply, ApiError> {
    authorize(
        &ctx.policies,
        OperationKind::Associate,
        &ctx.source.name,
        Method::DELETE,
        route_path(&ctx, "/:targetId"),
        &headers,
    )
    .await?;
    let source_id = require_source(&ctx, &id).await?;
    let target_id = parse_id(&ctx.target, &target_id)?;
    let unlinked = ctx
        .app
        .store
        .relation_unlink(
            &ctx.source,
            &ctx.assoc,
            &source_id,
            &ctx.target,
            Some(&target_id),
        )
        .await?;
    if !unlinked {
        return Err(ApiError::NotFound("target not found.".into()));
    }
    Ok(Reply::no_content())
}
