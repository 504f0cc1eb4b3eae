//! A model registered for route generation: the schema handle plus
//! per-model options (route name, exposure map, authorization, OpenAPI
//! extras). Supplied once at generation time; immutable thereafter.

use crate::auth::AuthorizationSpec;
use crate::exposure::RouteExposureMap;
use crate::model::ModelSchema;
use serde_json::Value;

#[derive(Clone, Default)]
pub struct ModelOpts {
    /// Explicit route name; defaults to the lower-cased model name.
    pub route: Option<String>,
    pub exposed: Option<RouteExposureMap>,
    pub authorize_with: Option<AuthorizationSpec>,
    /// Extra OpenAPI info merged into the model's tag description.
    pub openapi: Option<Value>,
}

#[derive(Clone)]
pub struct ModelDefinition {
    pub model: ModelSchema,
    pub opts: ModelOpts,
}

impl ModelDefinition {
    pub fn new(model: ModelSchema) -> Self {
        ModelDefinition {
            model,
            opts: ModelOpts::default(),
        }
    }

    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.opts.route = Some(route.into());
        self
    }

    pub fn exposed(mut self, map: RouteExposureMap) -> Self {
        self.opts.exposed = Some(map);
        self
    }

    pub fn authorize_with(mut self, spec: AuthorizationSpec) -> Self {
        self.opts.authorize_with = Some(spec);
        self
    }

    pub fn openapi(mut self, extra: Value) -> Self {
        self.opts.openapi = Some(extra);
        self
    }
}
