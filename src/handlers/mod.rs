//! Request handlers for generated routes, plus the helpers they share.

pub mod model;
pub mod relation;
pub mod validate;

use crate::association::Association;
use crate::auth::{allow_all, OperationKind, PolicyFn, PolicyRequest};
use crate::error::{ApiError, FieldViolation, QueryError};
use crate::model::{AttrKind, EnhancedModel, ModelRegistry};
use crate::query::{QueryBuilder, QueryDescriptor, QueryParams, SubInclude};
use crate::routes::RestConfig;
use crate::state::AppState;
use crate::store::{ResolvedInclude, Row};
use axum::http::{HeaderMap, Method};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-model routing context: shared state plus the model and its resolved
/// policies, captured at registration.
#[derive(Clone)]
pub struct ModelContext {
    pub app: AppState,
    pub model: Arc<EnhancedModel>,
    pub policies: Arc<HashMap<OperationKind, PolicyFn>>,
}

/// Per-association routing context.
#[derive(Clone)]
pub struct RelationContext {
    pub app: AppState,
    pub source: Arc<EnhancedModel>,
    pub target: Arc<EnhancedModel>,
    pub assoc: Arc<Association>,
    pub policies: Arc<HashMap<OperationKind, PolicyFn>>,
}

/// Run the route's resolved policy; a denial becomes a classified error.
pub(crate) async fn authorize(
    policies: &HashMap<OperationKind, PolicyFn>,
    op: OperationKind,
    model: &str,
    method: Method,
    path: String,
    headers: &HeaderMap,
) -> Result<(), ApiError> {
    let policy = policies.get(&op).cloned().unwrap_or_else(allow_all);
    policy(PolicyRequest {
        model: model.to_string(),
        operation: op,
        method,
        path,
        headers: headers.clone(),
    })
    .await
    .map_err(ApiError::from)
}

pub(crate) fn parse_id(model: &EnhancedModel, raw: &str) -> Result<Value, ApiError> {
    match model.pk_attribute().kind {
        AttrKind::Integer | AttrKind::BigInt => raw
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .map_err(|_| ApiError::BadRequest("invalid id".into())),
        AttrKind::Uuid => uuid::Uuid::parse_str(raw)
            .map(|u| Value::String(u.to_string()))
            .map_err(|_| ApiError::BadRequest("invalid id".into())),
        _ => Ok(Value::String(raw.to_string())),
    }
}

pub(crate) fn body_to_map(value: Value) -> Result<Row, ApiError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::BadRequest("body must be a JSON object".into())),
    }
}

/// Create bodies: unknown and server-managed fields are silently stripped.
pub(crate) fn strip_for_create(model: &EnhancedModel, mut body: Row) -> Row {
    body.retain(|name, _| model.has_attribute(name) && !model.is_auto(name));
    body
}

/// Update bodies: unknown and server-managed fields are rejected.
pub(crate) fn reject_unknown_fields(model: &EnhancedModel, body: &Row) -> Result<(), ApiError> {
    let violations: Vec<FieldViolation> = body
        .iter()
        .filter(|(name, _)| !model.has_attribute(name) || model.is_auto(name))
        .map(|(name, value)| FieldViolation::invalid(name, value.clone()))
        .collect();
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(violations))
    }
}

/// Replace semantics: any omitted updatable field is written as null.
pub(crate) fn null_fill(model: &EnhancedModel, body: &mut Row) {
    let missing: Vec<String> = model
        .updatable_names()
        .filter(|name| !body.contains_key(*name))
        .map(str::to_string)
        .collect();
    for name in missing {
        body.insert(name, Value::Null);
    }
}

/// Create responses exclude attributes that implement declared associations.
pub(crate) fn strip_references(model: &EnhancedModel, value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            map.retain(|name, _| !model.is_reference(name));
            Value::Object(map)
        }
        other => other,
    }
}

pub(crate) fn project_attributes(
    model: &EnhancedModel,
    value: Value,
    attributes: Option<&[String]>,
) -> Value {
    let Some(attributes) = attributes else {
        return value;
    };
    let Value::Object(map) = value else {
        return value;
    };
    let picked: serde_json::Map<String, Value> = attributes
        .iter()
        .filter(|a| model.has_attribute(a))
        .filter_map(|a| map.get(a).map(|v| (a.clone(), v.clone())))
        .collect();
    if picked.is_empty() {
        Value::Object(map)
    } else {
        Value::Object(picked)
    }
}

/// The dual search contract: 200 with rows, or 204 with an empty result;
/// the total-count header is attached in both cases.
pub(crate) fn search_reply(rows: Vec<Value>, total: u64) -> crate::response::Reply {
    use axum::http::StatusCode;
    let reply = if rows.is_empty() {
        crate::response::Reply {
            status: StatusCode::NO_CONTENT,
            result: Some(Value::Array(Vec::new())),
            message: None,
            total_count: None,
        }
    } else {
        crate::response::Reply::ok(Value::Array(rows))
    };
    reply.with_total_count(total)
}

/// Run the full query-builder lifecycle for one request.
pub(crate) fn build_query(
    config: &RestConfig,
    registry: &ModelRegistry,
    params: &QueryParams,
    search: bool,
) -> Result<QueryDescriptor, ApiError> {
    let mut builder = QueryBuilder::new(config.query.clone())
        .with_operator_whitelist(config.operator_whitelist.clone())
        .with_known_models(registry.model_names().map(str::to_string));
    builder.create(params)?;
    if search {
        builder.attach_search(params)?;
    }
    builder.prepare()?;
    Ok(builder.into_query()?)
}

/// Resolve wire-level includes against the registry: each referenced model
/// must be associated with `model`, recursively.
pub(crate) fn resolve_includes(
    registry: &ModelRegistry,
    model: &EnhancedModel,
    specs: Option<&[SubInclude]>,
) -> Result<Vec<ResolvedInclude>, ApiError> {
    let Some(specs) = specs else {
        return Ok(Vec::new());
    };
    specs
        .iter()
        .map(|spec| resolve_include(registry, model, spec))
        .collect()
}

fn resolve_include(
    registry: &ModelRegistry,
    model: &EnhancedModel,
    spec: &SubInclude,
) -> Result<ResolvedInclude, ApiError> {
    let assoc = registry
        .index()
        .lookup_model_name(&model.name)
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .iter()
        .find(|a| a.other_end(&model.name) == spec.model)
        .cloned()
        .ok_or_else(|| ApiError::Query(QueryError::ModelNotFound(spec.model.clone())))?;
    let target = registry
        .by_name(&spec.model)
        .cloned()
        .ok_or_else(|| ApiError::Query(QueryError::ModelNotFound(spec.model.clone())))?;
    let include = resolve_includes(registry, &target, Some(&spec.include))?;
    Ok(ResolvedInclude {
        assoc,
        target,
        where_clause: spec.where_clause.clone(),
        include,
    })
}
