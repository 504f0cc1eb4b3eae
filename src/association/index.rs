//! Bidirectional association lookup: model name -> associations, and
//! foreign-key name -> associations across the whole model set.

use crate::association::{extract, Association};
use crate::error::AssociationError;
use crate::model::ModelLike;
use std::collections::HashMap;
use std::sync::Arc;

/// Built once from the full model set; read-only and shareable afterwards.
/// Querying before [`AssociationIndex::build`] is an error state.
#[derive(Debug, Default)]
pub struct AssociationIndex {
    by_model: HashMap<String, Vec<Arc<Association>>>,
    by_foreign_key: HashMap<String, Vec<Arc<Association>>>,
    initialized: bool,
}

impl AssociationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the index. Rebuilding replaces all previous state.
    pub fn build(&mut self, models: &[&dyn ModelLike]) -> Result<(), AssociationError> {
        self.by_model.clear();
        self.by_foreign_key.clear();
        for model in models {
            self.by_model.entry(model.name().to_string()).or_default();
        }
        for model in models {
            for assoc in extract(*model)? {
                let assoc = Arc::new(assoc);
                self.by_model
                    .entry(assoc.source.clone())
                    .or_default()
                    .push(assoc.clone());
                if assoc.target != assoc.source {
                    self.by_model
                        .entry(assoc.target.clone())
                        .or_default()
                        .push(assoc.clone());
                }
                for fk in assoc.foreign_keys() {
                    let entry = self.by_foreign_key.entry(fk.to_string()).or_default();
                    if !entry.iter().any(|a| Arc::ptr_eq(a, &assoc)) {
                        entry.push(assoc.clone());
                    }
                }
            }
        }
        self.initialized = true;
        tracing::debug!(
            models = self.by_model.len(),
            foreign_keys = self.by_foreign_key.len(),
            "association index built"
        );
        Ok(())
    }

    /// All associations a model participates in, as source or target.
    pub fn lookup_model(&self, model: &dyn ModelLike) -> Result<&[Arc<Association>], AssociationError> {
        self.lookup_model_name(model.name())
    }

    pub fn lookup_model_name(&self, name: &str) -> Result<&[Arc<Association>], AssociationError> {
        if !self.initialized {
            return Err(AssociationError::NotInitialized);
        }
        self.by_model
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| AssociationError::InvalidModel(name.to_string()))
    }

    /// All associations implemented by a foreign-key column name, matching
    /// single keys and both junction keys. Zero or several matches are valid
    /// results; ambiguity is preserved, not resolved.
    pub fn lookup_foreign_key(&self, name: &str) -> Result<Vec<Arc<Association>>, AssociationError> {
        if !self.initialized {
            return Err(AssociationError::NotInitialized);
        }
        Ok(self
            .by_foreign_key
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    /// Associations declared by `model` (where it is the source).
    pub fn declared_by(&self, name: &str) -> Result<Vec<Arc<Association>>, AssociationError> {
        Ok(self
            .lookup_model_name(name)?
            .iter()
            .filter(|a| a.source == name)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssociationKind, ModelSchema};

    fn sample_models() -> Vec<ModelSchema> {
        vec![
            ModelSchema::new("User")
                .has_many("Task", "user_id")
                .belongs_to_many("Team", "Membership", "user_id", "team_id"),
            ModelSchema::new("Task").belongs_to("User", "user_id"),
            ModelSchema::new("Team"),
        ]
    }

    #[test]
    fn lookup_before_build_is_an_error() {
        let index = AssociationIndex::new();
        let model = ModelSchema::new("User");
        assert_eq!(
            index.lookup_model(&model).unwrap_err(),
            AssociationError::NotInitialized
        );
        assert_eq!(
            index.lookup_foreign_key("user_id").unwrap_err(),
            AssociationError::NotInitialized
        );
    }

    #[test]
    fn model_lookup_sees_both_directions() {
        let models = sample_models();
        let refs: Vec<&dyn ModelLike> = models.iter().map(|m| m as &dyn ModelLike).collect();
        let mut index = AssociationIndex::new();
        index.build(&refs).unwrap();

        // Task declares one association but is the target of User's has_many
        // as well; both sides index the same object.
        let task = index.lookup_model_name("Task").unwrap();
        assert_eq!(task.len(), 2);
        let team = index.lookup_model_name("Team").unwrap();
        assert_eq!(team.len(), 1);
        assert_eq!(team[0].kind, AssociationKind::BelongsToMany);

        assert!(matches!(
            index.lookup_model_name("Nope"),
            Err(AssociationError::InvalidModel(_))
        ));
    }

    #[test]
    fn foreign_key_lookup_preserves_ambiguity() {
        let models = sample_models();
        let refs: Vec<&dyn ModelLike> = models.iter().map(|m| m as &dyn ModelLike).collect();
        let mut index = AssociationIndex::new();
        index.build(&refs).unwrap();

        // user_id implements User.has_many(Task), Task.belongs_to(User) and
        // the Membership junction: all matches are returned.
        let hits = index.lookup_foreign_key("user_id").unwrap();
        assert_eq!(hits.len(), 3);
        let team_key = index.lookup_foreign_key("team_id").unwrap();
        assert_eq!(team_key.len(), 1);
        assert!(index.lookup_foreign_key("unknown").unwrap().is_empty());
    }

    #[test]
    fn rebuild_replaces_state() {
        let models = sample_models();
        let refs: Vec<&dyn ModelLike> = models.iter().map(|m| m as &dyn ModelLike).collect();
        let mut index = AssociationIndex::new();
        index.build(&refs).unwrap();

        let solo = [ModelSchema::new("Solo")];
        let solo_refs: Vec<&dyn ModelLike> = solo.iter().map(|m| m as &dyn ModelLike).collect();
        index.build(&solo_refs).unwrap();
        assert!(index.lookup_model_name("User").is_err());
        assert!(index.lookup_foreign_key("user_id").unwrap().is_empty());
    }
}
