//! Association graph: extraction from model metadata and the bidirectional
//! lookup index.

pub mod extract;
pub mod index;

pub use extract::extract;
pub use index::AssociationIndex;

use crate::model::{AliasPair, AssociationKind};

/// Foreign-key shape: one column for HasOne/HasMany/BelongsTo, a junction
/// table with two columns for BelongsToMany.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssociationKeys {
    Single(String),
    Junction {
        source_key: String,
        target_key: String,
        through: String,
    },
}

/// An association's join shape as seen from one side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinSpec {
    /// The viewer holds the foreign key: `related.pk = viewer[fk]`.
    ViewerKey { fk: String },
    /// The related model holds the foreign key: `related[fk] = viewer.pk`.
    RelatedKey { fk: String },
    /// A junction table links both primary keys.
    Junction {
        through: String,
        viewer_key: String,
        related_key: String,
    },
}

/// A normalized association. One instance is shared (via `Arc`) between the
/// source and target entries of the index.
#[derive(Clone, Debug)]
pub struct Association {
    pub source: String,
    pub target: String,
    pub kind: AssociationKind,
    pub keys: AssociationKeys,
    pub alias: AliasPair,
}

impl Association {
    /// Foreign-key column(s) implementing this association.
    pub fn foreign_keys(&self) -> Vec<&str> {
        match &self.keys {
            AssociationKeys::Single(fk) => vec![fk.as_str()],
            AssociationKeys::Junction {
                source_key,
                target_key,
                ..
            } => vec![source_key.as_str(), target_key.as_str()],
        }
    }

    pub fn single_key(&self) -> Option<&str> {
        match &self.keys {
            AssociationKeys::Single(fk) => Some(fk.as_str()),
            AssociationKeys::Junction { .. } => None,
        }
    }

    /// The model on the other end, as seen from `model`.
    pub fn other_end(&self, model: &str) -> &str {
        if self.source == model {
            &self.target
        } else {
            &self.source
        }
    }

    /// How to reach the related rows from `viewer`'s side.
    pub fn join_from(&self, viewer: &str) -> JoinSpec {
        match &self.keys {
            AssociationKeys::Single(fk) => {
                let viewer_holds_key = match self.kind {
                    AssociationKind::BelongsTo => self.source == viewer,
                    AssociationKind::HasOne | AssociationKind::HasMany => self.target == viewer,
                    AssociationKind::BelongsToMany => unreachable!("junction keys are not single"),
                };
                if viewer_holds_key {
                    JoinSpec::ViewerKey { fk: fk.clone() }
                } else {
                    JoinSpec::RelatedKey { fk: fk.clone() }
                }
            }
            AssociationKeys::Junction {
                source_key,
                target_key,
                through,
            } => {
                let (viewer_key, related_key) = if self.source == viewer {
                    (source_key.clone(), target_key.clone())
                } else {
                    (target_key.clone(), source_key.clone())
                };
                JoinSpec::Junction {
                    through: through.clone(),
                    viewer_key,
                    related_key,
                }
            }
        }
    }

    /// The association kind as seen from `model`. The declared kind applies
    /// to the source; the target sees the inverse.
    pub fn kind_viewed_from(&self, model: &str) -> AssociationKind {
        if self.source == model {
            self.kind
        } else {
            match self.kind {
                AssociationKind::HasOne | AssociationKind::HasMany => AssociationKind::BelongsTo,
                AssociationKind::BelongsTo => AssociationKind::HasMany,
                AssociationKind::BelongsToMany => AssociationKind::BelongsToMany,
            }
        }
    }
}
