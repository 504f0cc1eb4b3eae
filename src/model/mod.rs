//! Model declarations, registration options, and the validated registry.

pub mod definition;
pub mod registry;
pub mod types;

pub use definition::{ModelDefinition, ModelOpts};
pub use registry::{EnhancedModel, ModelRegistry};
pub use types::{
    AliasPair, AssociationKind, AttrKind, AttributeDef, ModelLike, ModelSchema, RawAssociation,
    ValidationRule,
};
