//! Component-schema generation: one object schema per model (by name), plus
//! the create/update input schema and the shared error body.

use crate::model::{AttrKind, AttributeDef, EnhancedModel};
use utoipa::openapi::schema::{
    ArrayBuilder, KnownFormat, ObjectBuilder, SchemaFormat, SchemaType, Type,
};
use utoipa::openapi::{Ref, RefOr, Schema};

pub fn attribute_schema(attr: &AttributeDef) -> RefOr<Schema> {
    let builder = match attr.kind {
        AttrKind::String | AttrKind::Text => ObjectBuilder::new().schema_type(Type::String),
        AttrKind::Integer => ObjectBuilder::new()
            .schema_type(Type::Integer)
            .format(Some(SchemaFormat::KnownFormat(KnownFormat::Int32))),
        AttrKind::BigInt => ObjectBuilder::new()
            .schema_type(Type::Integer)
            .format(Some(SchemaFormat::KnownFormat(KnownFormat::Int64))),
        AttrKind::Float => ObjectBuilder::new().schema_type(Type::Number),
        AttrKind::Boolean => ObjectBuilder::new().schema_type(Type::Boolean),
        AttrKind::Date => ObjectBuilder::new()
            .schema_type(Type::String)
            .format(Some(SchemaFormat::KnownFormat(KnownFormat::DateTime))),
        AttrKind::Uuid => ObjectBuilder::new()
            .schema_type(Type::String)
            .format(Some(SchemaFormat::KnownFormat(KnownFormat::Uuid))),
        AttrKind::Json => ObjectBuilder::new().schema_type(SchemaType::AnyValue),
    };
    builder.into()
}

/// The model's component schema: every attribute, plus one property per
/// declared association referencing the target's schema.
pub fn model_schema(model: &EnhancedModel) -> RefOr<Schema> {
    let mut builder = ObjectBuilder::new().schema_type(Type::Object);
    for attr in model.attributes() {
        builder = builder.property(&attr.name, attribute_schema(attr));
        if !attr.nullable && !attr.auto {
            builder = builder.required(&attr.name);
        }
    }
    for assoc in &model.associations {
        if assoc.kind.is_singular() {
            builder = builder.property(
                &assoc.alias.singular,
                Ref::from_schema_name(assoc.target.clone()),
            );
        } else {
            builder = builder.property(
                &assoc.alias.plural,
                ArrayBuilder::new().items(Ref::from_schema_name(assoc.target.clone())),
            );
        }
    }
    builder.into()
}

/// The writable subset used for create and update request bodies.
pub fn input_schema(model: &EnhancedModel) -> RefOr<Schema> {
    let mut builder = ObjectBuilder::new().schema_type(Type::Object);
    for attr in model.attributes() {
        if attr.auto {
            continue;
        }
        builder = builder.property(&attr.name, attribute_schema(attr));
        if !attr.nullable {
            builder = builder.required(&attr.name);
        }
    }
    builder.into()
}

pub fn input_schema_name(model: &EnhancedModel) -> String {
    format!("{}Input", model.name)
}

pub const ERROR_SCHEMA_NAME: &str = "ErrorMessage";

/// Error body shape: `{"message": <string or violation list>}`.
pub fn error_schema() -> RefOr<Schema> {
    ObjectBuilder::new()
        .schema_type(Type::Object)
        .property(
            "message",
            ObjectBuilder::new().schema_type(SchemaType::AnyValue),
        )
        .required("message")
        .into()
}

pub const SEARCH_SCHEMA_NAME: &str = "SearchParameters";

/// The search request body: pagination/sort/attribute parameters plus the
/// `s` predicate.
pub fn search_schema() -> RefOr<Schema> {
    ObjectBuilder::new()
        .schema_type(Type::Object)
        .property("i", ObjectBuilder::new().schema_type(Type::Integer))
        .property("p", ObjectBuilder::new().schema_type(Type::Integer))
        .property("a", ObjectBuilder::new().schema_type(Type::String))
        .property("f", ObjectBuilder::new().schema_type(Type::String))
        .property("o", ObjectBuilder::new().schema_type(Type::String))
        .property("s", ObjectBuilder::new().schema_type(SchemaType::AnyValue))
        .into()
}

/// Schemas a model's routes reference: the model itself, its input shape,
/// and the shared error/search bodies. Association targets are registered
/// models and contribute their own schemas; the merge step dedupes.
pub fn fragment_schemas(model: &EnhancedModel) -> Vec<(String, RefOr<Schema>)> {
    vec![
        (model.name.clone(), model_schema(model)),
        (input_schema_name(model), input_schema(model)),
        (ERROR_SCHEMA_NAME.to_string(), error_schema()),
        (SEARCH_SCHEMA_NAME.to_string(), search_schema()),
    ]
}
