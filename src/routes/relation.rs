//! Relationship sub-route wiring for one association of one model.

use crate::association::Association;
use crate::error::SetupError;
use crate::handlers::{relation as handlers, RelationContext};
use crate::model::{EnhancedModel, ModelDefinition};
use crate::openapi::{paths, ApiFragment};
use crate::routes::resolve_policies;
use crate::state::AppState;
use axum::http::Method;
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use std::sync::Arc;
use utoipa::openapi::HttpMethod;

pub fn relation_routes(
    state: &AppState,
    def: &ModelDefinition,
    source: &Arc<EnhancedModel>,
    assoc: &Arc<Association>,
    fragments: &mut Vec<ApiFragment>,
) -> Result<Router, SetupError> {
    let target = state
        .registry
        .by_name(&assoc.target)
        .cloned()
        .ok_or_else(|| SetupError::UnknownAssociationTarget {
            source_model: source.name.clone(),
            target: assoc.target.clone(),
        })?;
    let policies = resolve_policies(&state.registry, &source.name, Some(&assoc.target))?;
    let ctx = RelationContext {
        app: state.clone(),
        source: source.clone(),
        target: target.clone(),
        assoc: assoc.clone(),
        policies,
    };
    let exposure = def.opts.exposed.clone().unwrap_or_default();

    let singular = assoc.kind.is_singular();
    let segment = if singular {
        assoc.alias.singular.clone()
    } else {
        assoc.alias.plural.clone()
    };
    let rel = format!("/:id/{}", segment);
    let rel_instance = format!("{}/:targetId", rel);
    let doc = format!("/{}/{{id}}/{}", source.route, segment);
    let doc_instance = format!("{}/{{targetId}}", doc);

    let mut router: Router<RelationContext> = Router::new();
    let mut push = |path: &str, method: HttpMethod, operation| {
        fragments.push(ApiFragment::new(path, method, operation, Vec::new()));
    };

    if singular {
        if exposure.is_exposed(&Method::GET, &rel) {
            router = router.route(&rel, get(handlers::get_single));
            push(&doc, HttpMethod::Get, paths::relation_get_single(source, &target, &segment));
        }
        if exposure.is_exposed(&Method::POST, &rel) {
            router = router.route(&rel, post(handlers::create_single));
            push(&doc, HttpMethod::Post, paths::relation_create(source, &target, &segment));
        }
        if exposure.is_exposed(&Method::PUT, &rel) {
            router = router.route(&rel, put(handlers::update_single));
            push(
                &doc,
                HttpMethod::Put,
                paths::relation_update(source, &target, &segment, false),
            );
        }
        if exposure.is_exposed(&Method::PATCH, &rel) {
            router = router.route(&rel, patch(handlers::update_single_partial));
            push(
                &doc,
                HttpMethod::Patch,
                paths::relation_update(source, &target, &segment, true),
            );
        }
        if exposure.is_exposed(&Method::DELETE, &rel) {
            router = router.route(&rel, delete(handlers::delete_single));
            push(&doc, HttpMethod::Delete, paths::relation_unset(source, &segment));
        }
    } else {
        if exposure.is_exposed(&Method::GET, &rel) {
            router = router.route(&rel, get(handlers::list));
            push(&doc, HttpMethod::Get, paths::relation_list(source, &target, &segment));
        }
        if exposure.is_exposed(&Method::POST, &rel) {
            router = router.route(&rel, post(handlers::create_one));
            push(&doc, HttpMethod::Post, paths::relation_create(source, &target, &segment));
        }
        if exposure.is_exposed(&Method::DELETE, &rel) {
            router = router.route(&rel, delete(handlers::unlink_all));
            push(&doc, HttpMethod::Delete, paths::relation_unlink_all(source, &segment));
        }
        let rel_count = format!("{}/count", rel);
        if exposure.is_exposed(&Method::GET, &rel_count) {
            router = router.route(&rel_count, get(handlers::count));
            push(
                &format!("{}/count", doc),
                HttpMethod::Get,
                paths::relation_count(source, &segment),
            );
        }
        let rel_search = format!("{}/search", rel);
        if exposure.is_exposed(&Method::POST, &rel_search) {
            router = router.route(&rel_search, post(handlers::search));
            push(
                &format!("{}/search", doc),
                HttpMethod::Post,
                paths::relation_search(source, &target, &segment),
            );
        }
        // The literal segment `count` is reserved: the static route above
        // wins over `:targetId`.
        if exposure.is_exposed(&Method::GET, &rel_instance) {
            router = router.route(&rel_instance, get(handlers::get_one));
            push(
                &doc_instance,
                HttpMethod::Get,
                paths::relation_get_one(source, &target, &segment),
            );
        }
        if exposure.is_exposed(&Method::PUT, &rel_instance) {
            router = router.route(&rel_instance, put(handlers::update_one));
            push(
                &doc_instance,
                HttpMethod::Put,
                paths::relation_update_one(source, &target, &segment, false),
            );
        }
        if exposure.is_exposed(&Method::PATCH, &rel_instance) {
            router = router.route(&rel_instance, patch(handlers::update_one_partial));
            push(
                &doc_instance,
                HttpMethod::Patch,
                paths::relation_update_one(source, &target, &segment, true),
            );
        }
        if exposure.is_exposed(&Method::DELETE, &rel_instance) {
            router = router.route(&rel_instance, delete(handlers::unlink_one));
            push(
                &doc_instance,
                HttpMethod::Delete,
                paths::relation_unlink_one(source, &target, &segment),
            );
        }
    }

    Ok(router.with_state(ctx))
}
