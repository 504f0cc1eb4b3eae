//! The route generator: turns a set of model definitions into mountable
//! axum routers plus one merged OpenAPI document.

mod model;
mod relation;

pub use model::model_routes;
pub use relation::relation_routes;

use crate::auth::{self, OperationKind, PolicyFn};
use crate::error::SetupError;
use crate::model::{ModelDefinition, ModelRegistry};
use crate::openapi::{self, ApiInfo};
use crate::query::{OperatorWhitelist, QueryConfig};
use crate::state::AppState;
use crate::store::Datastore;
use axum::{routing::get, Json, Router};
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::openapi::OpenApi;

/// Generation-time configuration: pagination policy, the optional search
/// operator whitelist, and OpenAPI document metadata.
#[derive(Clone)]
pub struct RestConfig {
    pub query: QueryConfig,
    pub operator_whitelist: Option<Arc<OperatorWhitelist>>,
    pub title: String,
    pub version: String,
    pub description: Option<String>,
}

impl Default for RestConfig {
    fn default() -> Self {
        RestConfig {
            query: QueryConfig::default(),
            operator_whitelist: None,
            title: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: None,
        }
    }
}

/// One model's mountable router: mount `router` at `route`.
pub struct MountPoint {
    pub route: String,
    pub router: Router,
}

pub struct GeneratedApi {
    pub mounts: Vec<MountPoint>,
    pub document: OpenApi,
}

impl GeneratedApi {
    /// Nest every mount point into one router and serve the merged document
    /// at `GET /openapi.json`.
    pub fn into_router(self) -> Router {
        let mut router = Router::new();
        for mount in self.mounts {
            router = router.nest(&mount.route, mount.router);
        }
        let document = Arc::new(self.document);
        router.route(
            "/openapi.json",
            get(move || {
                let document = document.clone();
                async move { Json((*document).clone()) }
            }),
        )
    }
}

/// Generate routers and the OpenAPI document for the full definition set.
/// Registration runs once, synchronously, in registration order; every
/// misconfiguration fails here rather than at request time.
pub fn generate(
    definitions: Vec<ModelDefinition>,
    store: Arc<dyn Datastore>,
    config: RestConfig,
) -> Result<GeneratedApi, SetupError> {
    let registry = Arc::new(ModelRegistry::build(definitions)?);
    let info = ApiInfo {
        title: config.title.clone(),
        version: config.version.clone(),
        description: config.description.clone(),
    };
    let state = AppState {
        store,
        registry: registry.clone(),
        config: Arc::new(config),
    };

    let mut fragments = Vec::new();
    let mut mounts = Vec::new();
    for (def, enhanced) in registry.iter() {
        let mut router = model_routes(&state, def, enhanced, &mut fragments)?;
        for assoc in &enhanced.associations {
            router = router.merge(relation_routes(&state, def, enhanced, assoc, &mut fragments)?);
        }
        tracing::info!(route = %enhanced.route, model = %enhanced.name, "registered model routes");
        mounts.push(MountPoint {
            route: format!("/{}", enhanced.route),
            router,
        });
    }

    let document = openapi::merge(&info, fragments)?;
    Ok(GeneratedApi { mounts, document })
}

/// Resolve the policy for every operation kind once, at registration.
pub(crate) fn resolve_policies(
    registry: &ModelRegistry,
    model: &str,
    associated: Option<&str>,
) -> Result<Arc<HashMap<OperationKind, PolicyFn>>, SetupError> {
    let mut policies = HashMap::new();
    for op in OperationKind::ALL {
        policies.insert(*op, auth::resolve(registry, model, associated, *op)?);
    }
    Ok(Arc::new(policies))
}
