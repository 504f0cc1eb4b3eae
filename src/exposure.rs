//! Per-route, per-verb exposure policy.
//!
//! A route is suppressed only when explicitly configured `false` for that
//! exact verb and path; anything else is exposed. Paths are relative to the
//! model's mount point and use the registered pattern (`"/"`, `"/count"`,
//! `"/search"`, `"/:id"`, `"/:id/tasks/:targetId"`, ...).

use axum::http::Method;
use std::collections::HashMap;
use std::sync::Once;

static SEARCH_GET_ADVISORY: Once = Once::new();

#[derive(Clone, Debug, Default)]
pub struct RouteExposureMap {
    routes: HashMap<String, HashMap<Method, bool>>,
}

impl RouteExposureMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<String>, method: Method, exposed: bool) -> Self {
        self.routes
            .entry(path.into())
            .or_default()
            .insert(method, exposed);
        self
    }

    /// Suppress a route (shorthand for `set(path, method, false)`).
    pub fn suppress(self, path: impl Into<String>, method: Method) -> Self {
        self.set(path, method, false)
    }

    pub fn is_exposed(&self, method: &Method, path: &str) -> bool {
        let exposed = !matches!(
            self.routes.get(path).and_then(|verbs| verbs.get(method)),
            Some(false)
        );
        if exposed && *method == Method::GET && path.ends_with("/search") {
            SEARCH_GET_ADVISORY.call_once(|| {
                tracing::warn!("exposing /search via GET is deprecated; prefer POST /search");
            });
        }
        exposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_explicit_false_suppresses() {
        let map = RouteExposureMap::new()
            .suppress("/:id", Method::DELETE)
            .set("/", Method::GET, true);
        assert!(!map.is_exposed(&Method::DELETE, "/:id"));
        assert!(map.is_exposed(&Method::GET, "/"));
        assert!(map.is_exposed(&Method::PUT, "/:id"));
        assert!(map.is_exposed(&Method::POST, "/never-mentioned"));
    }

    #[test]
    fn deprecated_search_get_still_reports_exposed() {
        let map = RouteExposureMap::new();
        assert!(map.is_exposed(&Method::GET, "/search"));
        assert!(!map
            .clone()
            .suppress("/search", Method::GET)
            .is_exposed(&Method::GET, "/search"));
    }
}
