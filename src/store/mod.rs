//! The narrow datastore interface the generated routes consume, and the
//! concrete adapters behind it.
//!
//! Adapter selection is an explicit startup decision: construct a
//! [`PostgresStore`] or a [`MemoryStore`] and hand it to the generator as
//! `Arc<dyn Datastore>`.

pub mod memory;
pub mod postgres;
mod sql;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::association::Association;
use crate::error::StoreError;
use crate::model::EnhancedModel;
use crate::query::QueryDescriptor;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Row shape moved across the interface: a JSON object keyed by attribute
/// name.
pub type Row = Map<String, Value>;

/// A search include resolved against the registry: the association to walk
/// and the target model, with the (already canonicalized) nested predicate.
#[derive(Clone)]
pub struct ResolvedInclude {
    pub assoc: Arc<Association>,
    pub target: Arc<EnhancedModel>,
    pub where_clause: Option<Value>,
    pub include: Vec<ResolvedInclude>,
}

/// Everything the route layer needs from the underlying storage engine:
/// model-level CRUD plus per-association accessors. Implementations must be
/// safe to share across concurrent requests.
#[async_trait]
pub trait Datastore: Send + Sync {
    async fn find_all(
        &self,
        model: &EnhancedModel,
        query: &QueryDescriptor,
        includes: &[ResolvedInclude],
    ) -> Result<Vec<Value>, StoreError>;

    async fn find_by_id(
        &self,
        model: &EnhancedModel,
        id: &Value,
    ) -> Result<Option<Value>, StoreError>;

    /// Count matches for the descriptor's predicate, ignoring pagination.
    async fn count(
        &self,
        model: &EnhancedModel,
        query: &QueryDescriptor,
        includes: &[ResolvedInclude],
    ) -> Result<u64, StoreError>;

    async fn create(&self, model: &EnhancedModel, body: &Row) -> Result<Value, StoreError>;

    async fn update(
        &self,
        model: &EnhancedModel,
        id: &Value,
        body: &Row,
    ) -> Result<Option<Value>, StoreError>;

    /// Remove a row; `false` when the id did not resolve.
    async fn destroy(&self, model: &EnhancedModel, id: &Value) -> Result<bool, StoreError>;

    /// Related instances of `source_id` through `assoc`, filtered by the
    /// descriptor. At most one element for HasOne/BelongsTo.
    async fn relation_get(
        &self,
        source: &EnhancedModel,
        assoc: &Association,
        source_id: &Value,
        target: &EnhancedModel,
        query: &QueryDescriptor,
        includes: &[ResolvedInclude],
    ) -> Result<Vec<Value>, StoreError>;

    async fn relation_count(
        &self,
        source: &EnhancedModel,
        assoc: &Association,
        source_id: &Value,
        target: &EnhancedModel,
        query: &QueryDescriptor,
        includes: &[ResolvedInclude],
    ) -> Result<u64, StoreError>;

    /// Create a new target instance and associate it with `source_id`.
    async fn relation_create(
        &self,
        source: &EnhancedModel,
        assoc: &Association,
        source_id: &Value,
        target: &EnhancedModel,
        body: &Row,
    ) -> Result<Value, StoreError>;

    /// Link an existing target instance.
    async fn relation_link(
        &self,
        source: &EnhancedModel,
        assoc: &Association,
        source_id: &Value,
        target: &EnhancedModel,
        target_id: &Value,
    ) -> Result<(), StoreError>;

    /// Unset one link (`Some(target_id)`) or all links (`None`) without
    /// destroying the related rows. `false` when nothing was linked.
    async fn relation_unlink(
        &self,
        source: &EnhancedModel,
        assoc: &Association,
        source_id: &Value,
        target: &EnhancedModel,
        target_id: Option<&Value>,
    ) -> Result<bool, StoreError>;

    /// Whether `target_id` is currently linked to `source_id`.
    async fn relation_has(
        &self,
        source: &EnhancedModel,
        assoc: &Association,
        source_id: &Value,
        target: &EnhancedModel,
        target_id: &Value,
    ) -> Result<bool, StoreError>;
}
