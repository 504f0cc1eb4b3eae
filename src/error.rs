//! Typed errors and HTTP mapping.
//!
//! Split the same way the failure surfaces are split at runtime:
//! [`SetupError`] is raised while routes are being generated and aborts
//! startup; [`ApiError`] is raised while serving a request and maps to an
//! HTTP response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Startup-time failures: invalid model sets, authorization misconfiguration,
/// OpenAPI collisions. These are programmer errors and fail fast.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("route '{0}' is already registered")]
    RouteAlreadyRegistered(String),
    #[error("model '{source_model}' declares an association to unregistered model '{target}'")]
    UnknownAssociationTarget { source_model: String, target: String },
    #[error("invalid model: {0}")]
    InvalidModel(String),
    #[error("duplicate association alias '{alias}' on model '{model}'")]
    DuplicateAlias { model: String, alias: String },
    #[error("more than one model claims authorization for child '{child}'")]
    MultipleAuthorizationClaims { child: String },
    #[error("parent authorization for '{0}' requires an associated model")]
    MissingAssociatedModel(String),
    #[error("no association between '{model}' and '{associated}'")]
    NoAssociation { model: String, associated: String },
    #[error("'{model}' cannot delegate authorization to '{associated}': not a parent relation")]
    InvalidParentRelation { model: String, associated: String },
    #[error("unknown operation kind '{0}'")]
    UnknownOperation(String),
    #[error("duplicate OpenAPI operation: {method} {path}")]
    DuplicateOperation { method: String, path: String },
    #[error("conflicting OpenAPI schema definition for '{0}'")]
    SchemaConflict(String),
    #[error(transparent)]
    Association(#[from] AssociationError),
}

/// Association extraction and index lookup failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssociationError {
    #[error("association index has not been built")]
    NotInitialized,
    #[error("invalid model: {0}")]
    InvalidModel(String),
}

/// Query-builder failures. Messages are part of the wire contract: they are
/// returned verbatim as 400 bodies when triggered by request input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("sort order must be one of ASC, DESC.")]
    InvalidSortOrder,
    #[error("p or i must be both undefined or both defined.")]
    PaginationMismatch,
    #[error("p and i must be non-negative integers within the configured limit.")]
    InvalidPagination,
    #[error("an unlimited page size is not allowed.")]
    NoneNotAllowed,
    #[error("query was already created.")]
    AlreadyCreated,
    #[error("query has not been created.")]
    NotCreated,
    #[error("search was already attached.")]
    SearchAlreadyAttached,
    #[error("query was already prepared.")]
    AlreadyPrepared,
    #[error("query has not been prepared.")]
    NotPrepared,
    #[error("s must be a valid JSON object.")]
    InvalidSearch,
    #[error("model '{0}' could not be resolved.")]
    ModelNotFound(String),
    #[error("illegal operators: {}", .0.join(", "))]
    IllegalOperators(Vec<String>),
}

/// Datastore failures, classified per the error contract: `NotFound` becomes
/// 404 at the point of detection, everything else is an unexpected 500.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found.")]
    NotFound,
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("unsupported query construct: {0}")]
    Unsupported(String),
    #[error("{0}")]
    Backend(String),
}

/// One entry of a validation failure list: `{type, path, value}`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FieldViolation {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    pub value: Value,
}

impl FieldViolation {
    pub fn invalid(path: impl Into<String>, value: Value) -> Self {
        FieldViolation {
            kind: "Validation error".into(),
            path: path.into(),
            value,
        }
    }

    pub fn not_null(path: impl Into<String>) -> Self {
        FieldViolation {
            kind: "notNull Violation".into(),
            path: path.into(),
            value: Value::Null,
        }
    }
}

/// Request-time failures. Every handler funnels errors through this type;
/// `IntoResponse` is the single classification point.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(Vec<FieldViolation>),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Explicitly constructed domain error carrying its own status and
    /// message; passed through unchanged.
    #[error("classified: {status}")]
    Classified { status: StatusCode, message: Value },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("internal: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, diagnostic) = match self {
            ApiError::Validation(violations) => (
                StatusCode::BAD_REQUEST,
                serde_json::to_value(&violations).unwrap_or(Value::Null),
                None,
            ),
            ApiError::Query(e) => (StatusCode::BAD_REQUEST, Value::String(e.to_string()), None),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, Value::String(m), None),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, Value::String(m), None),
            ApiError::Classified { status, message } => (status, message, None),
            ApiError::Store(StoreError::NotFound) => (
                StatusCode::NOT_FOUND,
                Value::String(StoreError::NotFound.to_string()),
                None,
            ),
            ApiError::Store(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Value::String("unexpected error.".into()),
                Some(e.to_string()),
            ),
            ApiError::Internal(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Value::String("unexpected error.".into()),
                Some(e),
            ),
        };
        let body = match diagnostic {
            Some(d) => json!({ "message": message, "error": d }),
            None => json!({ "message": message }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_error_messages_are_wire_stable() {
        assert_eq!(
            QueryError::PaginationMismatch.to_string(),
            "p or i must be both undefined or both defined."
        );
        assert_eq!(
            QueryError::IllegalOperators(vec!["$like".into(), "$or".into()]).to_string(),
            "illegal operators: $like, $or"
        );
    }

    #[test]
    fn violation_serializes_with_type_key() {
        let v = FieldViolation::invalid("value2", json!(101));
        let s = serde_json::to_value(&v).unwrap();
        assert_eq!(
            s,
            json!({ "type": "Validation error", "path": "value2", "value": 101 })
        );
    }
}
