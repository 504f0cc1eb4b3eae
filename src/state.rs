//! Shared application state for generated routes. Everything here is built
//! once at startup and read-only afterwards.

use crate::model::ModelRegistry;
use crate::routes::RestConfig;
use crate::store::Datastore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Datastore>,
    pub registry: Arc<ModelRegistry>,
    pub config: Arc<RestConfig>,
}
