//! Restforge: model-driven REST route and OpenAPI generation for axum.
//!
//! Declare models and their associations, hand them to [`generate`], and get
//! back one mountable router per model plus a merged OpenAPI 3 document.

pub mod association;
pub mod auth;
pub mod error;
pub mod exposure;
pub mod handlers;
pub mod model;
pub mod openapi;
pub mod query;
pub mod response;
pub mod routes;
pub mod state;
pub mod store;

pub use association::{Association, AssociationIndex};
pub use auth::{allow_all, policy, AuthorizationSpec, OperationKind, PolicyDenial, PolicyFn};
pub use error::{ApiError, QueryError, SetupError, StoreError};
pub use exposure::RouteExposureMap;
pub use model::{
    AttrKind, AttributeDef, ModelDefinition, ModelRegistry, ModelSchema, ValidationRule,
};
pub use query::{OperatorWhitelist, PageLimit, QueryBuilder, QueryConfig, SearchOperator};
pub use response::{Reply, TOTAL_COUNT_HEADER};
pub use routes::{generate, GeneratedApi, MountPoint, RestConfig};
pub use state::AppState;
pub use store::{Datastore, MemoryStore, PostgresStore};
