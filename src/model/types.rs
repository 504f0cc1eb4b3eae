//! Model declarations: attributes, validation rules, raw association
//! metadata, and the capability surface a registrable model must expose.

use serde_json::Value;

/// Attribute value kinds, mapped to wire/schema types by the stores and the
/// OpenAPI synthesizer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttrKind {
    String,
    Text,
    Integer,
    BigInt,
    Float,
    Boolean,
    Date,
    Uuid,
    Json,
}

/// Per-attribute validation rules, checked against create/update bodies.
#[derive(Clone, Debug, Default)]
pub struct ValidationRule {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub min_length: Option<u32>,
    pub max_length: Option<u32>,
    pub pattern: Option<String>,
    pub allowed: Option<Vec<Value>>,
    pub format: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AttributeDef {
    pub name: String,
    pub kind: AttrKind,
    pub nullable: bool,
    /// Server-managed: stripped from create bodies, rejected in updates
    /// (auto-increment keys, timestamps).
    pub auto: bool,
    /// Implements an association foreign key; excluded from create responses.
    pub reference: bool,
    pub primary_key: bool,
    pub validate: Option<ValidationRule>,
}

impl AttributeDef {
    pub fn new(name: impl Into<String>, kind: AttrKind) -> Self {
        AttributeDef {
            name: name.into(),
            kind,
            nullable: true,
            auto: false,
            reference: false,
            primary_key: false,
            validate: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn auto(mut self) -> Self {
        self.auto = true;
        self
    }

    pub fn reference(mut self) -> Self {
        self.reference = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn validate(mut self, rule: ValidationRule) -> Self {
        self.validate = Some(rule);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssociationKind {
    HasOne,
    HasMany,
    BelongsTo,
    BelongsToMany,
}

impl AssociationKind {
    /// Whether routes for this association address a single related instance.
    pub fn is_singular(&self) -> bool {
        matches!(self, AssociationKind::HasOne | AssociationKind::BelongsTo)
    }
}

/// Singular/plural names used to address an association in routes and
/// payload keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AliasPair {
    pub singular: String,
    pub plural: String,
}

/// Association metadata as declared on a model, before normalization.
/// `other_key` and `through` are only meaningful for `BelongsToMany`.
#[derive(Clone, Debug)]
pub struct RawAssociation {
    pub kind: AssociationKind,
    pub target: String,
    pub foreign_key: String,
    pub other_key: Option<String>,
    pub through: Option<String>,
    pub alias: Option<AliasPair>,
}

/// Capability surface a registrable model must expose: attribute enumeration
/// and association enumeration. Checked structurally at registration instead
/// of duck-typing the handle at call sites.
pub trait ModelLike {
    fn name(&self) -> &str;
    fn attributes(&self) -> &[AttributeDef];
    fn associations(&self) -> &[RawAssociation];
}

/// Concrete model declaration with a fluent builder.
#[derive(Clone, Debug, Default)]
pub struct ModelSchema {
    name: String,
    attributes: Vec<AttributeDef>,
    associations: Vec<RawAssociation>,
}

impl ModelSchema {
    pub fn new(name: impl Into<String>) -> Self {
        ModelSchema {
            name: name.into(),
            attributes: Vec::new(),
            associations: Vec::new(),
        }
    }

    pub fn attribute(mut self, attr: AttributeDef) -> Self {
        self.attributes.push(attr);
        self
    }

    pub fn has_one(mut self, target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        self.associations.push(RawAssociation {
            kind: AssociationKind::HasOne,
            target: target.into(),
            foreign_key: foreign_key.into(),
            other_key: None,
            through: None,
            alias: None,
        });
        self
    }

    pub fn has_many(mut self, target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        self.associations.push(RawAssociation {
            kind: AssociationKind::HasMany,
            target: target.into(),
            foreign_key: foreign_key.into(),
            other_key: None,
            through: None,
            alias: None,
        });
        self
    }

    pub fn belongs_to(mut self, target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        self.associations.push(RawAssociation {
            kind: AssociationKind::BelongsTo,
            target: target.into(),
            foreign_key: foreign_key.into(),
            other_key: None,
            through: None,
            alias: None,
        });
        self
    }

    pub fn belongs_to_many(
        mut self,
        target: impl Into<String>,
        through: impl Into<String>,
        foreign_key: impl Into<String>,
        other_key: impl Into<String>,
    ) -> Self {
        self.associations.push(RawAssociation {
            kind: AssociationKind::BelongsToMany,
            target: target.into(),
            foreign_key: foreign_key.into(),
            other_key: Some(other_key.into()),
            through: Some(through.into()),
            alias: None,
        });
        self
    }

    /// Push a fully specified association (custom alias, etc.).
    pub fn association(mut self, raw: RawAssociation) -> Self {
        self.associations.push(raw);
        self
    }

    pub(crate) fn attributes_mut(&mut self) -> &mut Vec<AttributeDef> {
        &mut self.attributes
    }

    /// Override the alias of the most recently declared association.
    pub fn aliased(mut self, singular: impl Into<String>, plural: impl Into<String>) -> Self {
        if let Some(last) = self.associations.last_mut() {
            last.alias = Some(AliasPair {
                singular: singular.into(),
                plural: plural.into(),
            });
        }
        self
    }
}

impl ModelLike for ModelSchema {
    fn name(&self) -> &str {
        &self.name
    }

    fn attributes(&self) -> &[AttributeDef] {
        &self.attributes
    }

    fn associations(&self) -> &[RawAssociation] {
        &self.associations
    }
}
