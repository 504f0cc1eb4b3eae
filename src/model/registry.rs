//! Validated model set: registration-order definitions, the built
//! association index, and one [`EnhancedModel`] per model.

use crate::association::{Association, AssociationIndex};
use crate::error::SetupError;
use crate::model::{AssociationKind, AttrKind, AttributeDef, ModelDefinition, ModelLike, ModelSchema};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Immutable derived view of a registered model: the schema handle plus the
/// capability data route handlers need (a wrapper, not a mutation of the
/// declared schema).
#[derive(Clone, Debug)]
pub struct EnhancedModel {
    schema: ModelSchema,
    pub name: String,
    pub route: String,
    /// Storage table name; always the lower-cased model name, independent of
    /// any custom route.
    pub table: String,
    pub primary_key: String,
    /// Associations declared by this model, in declaration order.
    pub associations: Vec<Arc<Association>>,
    attribute_names: HashSet<String>,
    auto_attributes: HashSet<String>,
    reference_attributes: HashSet<String>,
}

impl EnhancedModel {
    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    pub fn attributes(&self) -> &[AttributeDef] {
        self.schema.attributes()
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.schema.attributes().iter().find(|a| a.name == name)
    }

    pub fn pk_attribute(&self) -> &AttributeDef {
        self.schema
            .attributes()
            .iter()
            .find(|a| a.name == self.primary_key)
            .expect("registry guarantees a primary key attribute")
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute_names.contains(name)
    }

    pub fn is_auto(&self, name: &str) -> bool {
        self.auto_attributes.contains(name)
    }

    pub fn is_reference(&self, name: &str) -> bool {
        self.reference_attributes.contains(name)
    }

    /// Attribute names a client may write (everything not server-managed).
    pub fn updatable_names(&self) -> impl Iterator<Item = &str> {
        self.schema
            .attributes()
            .iter()
            .filter(|a| !a.auto)
            .map(|a| a.name.as_str())
    }

    pub fn association_with_target(&self, target: &str) -> Option<&Arc<Association>> {
        self.associations.iter().find(|a| a.target == target)
    }
}

impl ModelLike for EnhancedModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn attributes(&self) -> &[AttributeDef] {
        self.schema.attributes()
    }

    fn associations(&self) -> &[crate::model::RawAssociation] {
        self.schema.associations()
    }
}

pub struct ModelRegistry {
    defs: Vec<ModelDefinition>,
    models: Vec<Arc<EnhancedModel>>,
    by_name: HashMap<String, usize>,
    by_route: HashMap<String, usize>,
    index: AssociationIndex,
}

impl ModelRegistry {
    /// Validate and index the full definition set. Runs once at startup;
    /// every failure here is fatal.
    pub fn build(mut defs: Vec<ModelDefinition>) -> Result<Self, SetupError> {
        let mut by_name = HashMap::new();
        let mut by_route = HashMap::new();

        for (i, def) in defs.iter().enumerate() {
            let name = def.model.name().to_string();
            let route = effective_route(def);
            if by_route.contains_key(&route) {
                return Err(SetupError::RouteAlreadyRegistered(route));
            }
            if by_name.insert(name.clone(), i).is_some() {
                return Err(SetupError::InvalidModel(format!(
                    "model '{}' is declared twice",
                    name
                )));
            }
            by_route.insert(route, i);
        }

        for def in &defs {
            for raw in def.model.associations() {
                if !by_name.contains_key(&raw.target) {
                    return Err(SetupError::UnknownAssociationTarget {
                        source_model: def.model.name().to_string(),
                        target: raw.target.clone(),
                    });
                }
            }
        }

        for def in &mut defs {
            ensure_primary_key(&mut def.model);
        }

        let mut index = AssociationIndex::new();
        {
            let refs: Vec<&dyn ModelLike> =
                defs.iter().map(|d| &d.model as &dyn ModelLike).collect();
            index.build(&refs)?;
        }

        let mut models = Vec::with_capacity(defs.len());
        for def in &defs {
            let name = def.model.name().to_string();
            let declared = index.declared_by(&name)?;

            let mut used_segments = HashSet::new();
            for assoc in &declared {
                let segment = if assoc.kind.is_singular() {
                    &assoc.alias.singular
                } else {
                    &assoc.alias.plural
                };
                if !used_segments.insert(segment.clone()) {
                    return Err(SetupError::DuplicateAlias {
                        model: name.clone(),
                        alias: segment.clone(),
                    });
                }
            }

            let mut schema = def.model.clone();
            mark_reference_attributes(&mut schema, &name, &index)?;

            let primary_key = schema
                .attributes()
                .iter()
                .find(|a| a.primary_key)
                .map(|a| a.name.clone())
                .expect("primary key was synthesized above");
            let attribute_names = schema
                .attributes()
                .iter()
                .map(|a| a.name.clone())
                .collect();
            let auto_attributes = schema
                .attributes()
                .iter()
                .filter(|a| a.auto)
                .map(|a| a.name.clone())
                .collect();
            let reference_attributes = schema
                .attributes()
                .iter()
                .filter(|a| a.reference)
                .map(|a| a.name.clone())
                .collect();

            models.push(Arc::new(EnhancedModel {
                name: name.clone(),
                route: effective_route(def),
                table: name.to_lowercase(),
                primary_key,
                associations: declared,
                attribute_names,
                auto_attributes,
                reference_attributes,
                schema,
            }));
        }

        tracing::debug!(models = models.len(), "model registry built");
        Ok(ModelRegistry {
            defs,
            models,
            by_name,
            by_route,
            index,
        })
    }

    pub fn definitions(&self) -> &[ModelDefinition] {
        &self.defs
    }

    pub fn definition_by_name(&self, name: &str) -> Option<&ModelDefinition> {
        self.by_name.get(name).map(|&i| &self.defs[i])
    }

    pub fn models(&self) -> &[Arc<EnhancedModel>] {
        &self.models
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<EnhancedModel>> {
        self.by_name.get(name).map(|&i| &self.models[i])
    }

    pub fn by_route(&self, route: &str) -> Option<&Arc<EnhancedModel>> {
        self.by_route.get(route).map(|&i| &self.models[i])
    }

    pub fn index(&self) -> &AssociationIndex {
        &self.index
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.defs.iter().map(|d| d.model.name())
    }

    /// Definitions and enhanced models, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&ModelDefinition, &Arc<EnhancedModel>)> {
        self.defs.iter().zip(self.models.iter())
    }
}

fn effective_route(def: &ModelDefinition) -> String {
    def.opts
        .route
        .clone()
        .unwrap_or_else(|| def.model.name().to_lowercase())
}

/// Models without a declared primary key get a server-managed integer `id`,
/// matching what the backing stores generate.
fn ensure_primary_key(schema: &mut ModelSchema) {
    if schema.attributes().iter().any(|a| a.primary_key) {
        return;
    }
    schema.attributes_mut().insert(
        0,
        AttributeDef::new("id", AttrKind::Integer).auto().primary_key(),
    );
}

/// Flag every attribute that implements a declared association: the fk of a
/// BelongsTo this model declares, and the fk of a HasOne/HasMany pointing at
/// this model. Junction keys live on the through table, not here.
fn mark_reference_attributes(
    schema: &mut ModelSchema,
    name: &str,
    index: &AssociationIndex,
) -> Result<(), SetupError> {
    let mut keys = HashSet::new();
    for assoc in index.lookup_model_name(name).map_err(SetupError::Association)? {
        let owns_key = match assoc.kind {
            AssociationKind::BelongsTo => assoc.source == *name,
            AssociationKind::HasOne | AssociationKind::HasMany => assoc.target == *name,
            AssociationKind::BelongsToMany => false,
        };
        if owns_key {
            if let Some(fk) = assoc.single_key() {
                keys.insert(fk.to_string());
            }
        }
    }
    for attr in schema.attributes_mut() {
        if keys.contains(&attr.name) {
            attr.reference = true;
            keys.remove(&attr.name);
        }
    }
    // Foreign keys the association demands but the schema never declared are
    // added as nullable reference columns, the way an ORM injects them.
    for fk in keys {
        schema
            .attributes_mut()
            .push(AttributeDef::new(fk, AttrKind::Integer).reference());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelSchema;

    #[test]
    fn duplicate_route_names_fail_fast() {
        let defs = vec![
            ModelDefinition::new(ModelSchema::new("User")),
            ModelDefinition::new(ModelSchema::new("Account")).route("user"),
        ];
        assert!(matches!(
            ModelRegistry::build(defs),
            Err(SetupError::RouteAlreadyRegistered(route)) if route == "user"
        ));
    }

    #[test]
    fn unknown_association_target_fails_fast() {
        let defs = vec![ModelDefinition::new(
            ModelSchema::new("User").has_many("Ghost", "user_id"),
        )];
        assert!(matches!(
            ModelRegistry::build(defs),
            Err(SetupError::UnknownAssociationTarget { .. })
        ));
    }

    #[test]
    fn synthesizes_a_primary_key_when_missing() {
        let registry =
            ModelRegistry::build(vec![ModelDefinition::new(ModelSchema::new("Note"))]).unwrap();
        let note = registry.by_name("Note").unwrap();
        assert_eq!(note.primary_key, "id");
        assert!(note.is_auto("id"));
    }

    #[test]
    fn marks_foreign_keys_as_references() {
        let defs = vec![
            ModelDefinition::new(ModelSchema::new("User").has_many("Task", "user_id")),
            ModelDefinition::new(
                ModelSchema::new("Task")
                    .attribute(AttributeDef::new("user_id", AttrKind::Integer))
                    .belongs_to("User", "user_id"),
            ),
        ];
        let registry = ModelRegistry::build(defs).unwrap();
        let task = registry.by_name("Task").unwrap();
        assert!(task.is_reference("user_id"));
        let user = registry.by_name("User").unwrap();
        assert!(!user.is_reference("id"));
    }

    #[test]
    fn registration_order_is_preserved() {
        let defs = vec![
            ModelDefinition::new(ModelSchema::new("B")),
            ModelDefinition::new(ModelSchema::new("A")),
        ];
        let registry = ModelRegistry::build(defs).unwrap();
        let order: Vec<&str> = registry.model_names().collect();
        assert_eq!(order, vec!["B", "A"]);
    }

    #[test]
    fn colliding_aliases_on_one_model_fail() {
        let defs = vec![
            ModelDefinition::new(
                ModelSchema::new("User")
                    .has_many("Task", "owner_id")
                    .belongs_to_many("Task", "Assignment", "user_id", "task_id"),
            ),
            ModelDefinition::new(ModelSchema::new("Task")),
        ];
        assert!(matches!(
            ModelRegistry::build(defs),
            Err(SetupError::DuplicateAlias { .. })
        ));
    }
}
