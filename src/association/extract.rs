//! Normalizes a model's raw association metadata into canonical
//! [`Association`] values.

use crate::association::{Association, AssociationKeys};
use crate::error::AssociationError;
use crate::model::{AliasPair, AssociationKind, ModelLike};

/// Derive the default alias from a target model name: lower-cased singular,
/// naive plural.
pub fn default_alias(target: &str) -> AliasPair {
    let singular = target.to_lowercase();
    let plural = pluralize(&singular);
    AliasPair { singular, plural }
}

fn pluralize(word: &str) -> String {
    if word.ends_with('s') || word.ends_with('x') || word.ends_with("ch") || word.ends_with("sh") {
        format!("{}es", word)
    } else if let Some(stem) = word.strip_suffix('y') {
        if stem
            .chars()
            .last()
            .map(|c| !"aeiou".contains(c))
            .unwrap_or(false)
        {
            format!("{}ies", stem)
        } else {
            format!("{}s", word)
        }
    } else {
        format!("{}s", word)
    }
}

/// Extract the normalized association list of a model. Fails when the
/// metadata is structurally invalid: an empty target, or a BelongsToMany
/// without its junction table or second key.
pub fn extract(model: &dyn ModelLike) -> Result<Vec<Association>, AssociationError> {
    let mut out = Vec::with_capacity(model.associations().len());
    for raw in model.associations() {
        if raw.target.is_empty() {
            return Err(AssociationError::InvalidModel(format!(
                "association on '{}' has an empty target",
                model.name()
            )));
        }
        let keys = match raw.kind {
            AssociationKind::BelongsToMany => {
                let through = raw.through.clone().ok_or_else(|| {
                    AssociationError::InvalidModel(format!(
                        "BelongsToMany '{}' -> '{}' is missing a through model",
                        model.name(),
                        raw.target
                    ))
                })?;
                let target_key = raw.other_key.clone().ok_or_else(|| {
                    AssociationError::InvalidModel(format!(
                        "BelongsToMany '{}' -> '{}' is missing the target foreign key",
                        model.name(),
                        raw.target
                    ))
                })?;
                AssociationKeys::Junction {
                    source_key: raw.foreign_key.clone(),
                    target_key,
                    through,
                }
            }
            _ => AssociationKeys::Single(raw.foreign_key.clone()),
        };
        out.push(Association {
            source: model.name().to_string(),
            target: raw.target.clone(),
            kind: raw.kind,
            keys,
            alias: raw.alias.clone().unwrap_or_else(|| default_alias(&raw.target)),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelSchema, RawAssociation};

    #[test]
    fn derives_aliases_from_target_names() {
        assert_eq!(default_alias("Task").singular, "task");
        assert_eq!(default_alias("Task").plural, "tasks");
        assert_eq!(default_alias("Company").plural, "companies");
        assert_eq!(default_alias("Box").plural, "boxes");
    }

    #[test]
    fn belongs_to_many_requires_junction_metadata() {
        let broken = ModelSchema::new("User").association(RawAssociation {
            kind: AssociationKind::BelongsToMany,
            target: "Team".into(),
            foreign_key: "user_id".into(),
            other_key: None,
            through: Some("Membership".into()),
            alias: None,
        });
        assert!(matches!(
            extract(&broken),
            Err(AssociationError::InvalidModel(_))
        ));
    }

    #[test]
    fn normalizes_declared_associations() {
        let model = ModelSchema::new("User")
            .has_many("Task", "user_id")
            .belongs_to_many("Team", "Membership", "user_id", "team_id");
        let assocs = extract(&model).unwrap();
        assert_eq!(assocs.len(), 2);
        assert_eq!(assocs[0].alias.plural, "tasks");
        assert_eq!(
            assocs[1].keys,
            AssociationKeys::Junction {
                source_key: "user_id".into(),
                target_key: "team_id".into(),
                through: "Membership".into(),
            }
        );
    }
}
