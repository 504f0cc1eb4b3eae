//! Root CRUD route wiring for one model.

use crate::error::SetupError;
use crate::handlers::{model as handlers, ModelContext};
use crate::model::{AssociationKind, EnhancedModel, ModelDefinition};
use crate::openapi::{paths, schema, ApiFragment};
use crate::routes::resolve_policies;
use crate::state::AppState;
use axum::http::Method;
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use std::sync::Arc;
use utoipa::openapi::HttpMethod;

pub fn model_routes(
    state: &AppState,
    def: &ModelDefinition,
    model: &Arc<EnhancedModel>,
    fragments: &mut Vec<ApiFragment>,
) -> Result<Router, SetupError> {
    // A parent-delegating model resolves its root routes against its first
    // declared parent association.
    let parent = def
        .opts
        .authorize_with
        .as_ref()
        .filter(|spec| spec.use_parent_for_authorization)
        .and_then(|_| {
            model
                .associations
                .iter()
                .find(|a| {
                    matches!(
                        a.kind,
                        AssociationKind::BelongsTo | AssociationKind::BelongsToMany
                    )
                })
                .map(|a| a.target.clone())
        });
    let policies = resolve_policies(&state.registry, &model.name, parent.as_deref())?;
    let ctx = ModelContext {
        app: state.clone(),
        model: model.clone(),
        policies,
    };
    let exposure = def.opts.exposed.clone().unwrap_or_default();
    let base = format!("/{}", model.route);
    let schemas = schema::fragment_schemas(model);

    let mut router: Router<ModelContext> = Router::new();
    let mut push = |path: &str, method: HttpMethod, operation| {
        fragments.push(ApiFragment::new(path, method, operation, schemas.clone()));
    };

    if exposure.is_exposed(&Method::POST, "/") {
        router = router.route("/", post(handlers::create));
        push(&base, HttpMethod::Post, paths::create(model));
    }
    if exposure.is_exposed(&Method::GET, "/") {
        router = router.route("/", get(handlers::list));
        push(&base, HttpMethod::Get, paths::list(model));
    }
    if exposure.is_exposed(&Method::GET, "/count") {
        router = router.route("/count", get(handlers::count));
        push(&format!("{}/count", base), HttpMethod::Get, paths::count(model));
    }
    if exposure.is_exposed(&Method::POST, "/search") {
        router = router.route("/search", post(handlers::search));
        push(&format!("{}/search", base), HttpMethod::Post, paths::search(model));
    }
    if exposure.is_exposed(&Method::GET, "/search") {
        router = router.route("/search", get(handlers::search_get));
        push(
            &format!("{}/search", base),
            HttpMethod::Get,
            paths::search_get(model),
        );
    }
    if exposure.is_exposed(&Method::GET, "/:id") {
        router = router.route("/:id", get(handlers::read));
        push(&format!("{}/{{id}}", base), HttpMethod::Get, paths::read(model));
    }
    if exposure.is_exposed(&Method::PUT, "/:id") {
        router = router.route("/:id", put(handlers::update));
        push(
            &format!("{}/{{id}}", base),
            HttpMethod::Put,
            paths::update(model, false),
        );
    }
    if exposure.is_exposed(&Method::PATCH, "/:id") {
        router = router.route("/:id", patch(handlers::update_partial));
        push(
            &format!("{}/{{id}}", base),
            HttpMethod::Patch,
            paths::update(model, true),
        );
    }
    if exposure.is_exposed(&Method::DELETE, "/:id") {
        router = router.route("/:id", delete(handlers::delete));
        push(
            &format!("{}/{{id}}", base),
            HttpMethod::Delete,
            paths::delete(model),
        );
    }

    Ok(router.with_state(ctx))
}
