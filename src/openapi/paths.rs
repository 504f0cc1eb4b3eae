//! Per-route operation objects mirroring the route generator's enumeration.

use crate::model::{AttrKind, EnhancedModel};
use crate::openapi::schema::{input_schema_name, ERROR_SCHEMA_NAME, SEARCH_SCHEMA_NAME};
use utoipa::openapi::header::Header;
use utoipa::openapi::path::{Operation, OperationBuilder, Parameter, ParameterBuilder, ParameterIn};
use utoipa::openapi::request_body::{RequestBody, RequestBodyBuilder};
use utoipa::openapi::schema::{ArrayBuilder, ObjectBuilder, Type};
use utoipa::openapi::{Content, Deprecated, Ref, RefOr, Required, Response, ResponseBuilder, Schema};

pub const JSON: &str = "application/json";

pub const VALIDATION_RESPONSE: &str = "ValidationError";
pub const UNAUTHORIZED_RESPONSE: &str = "Unauthorized";
pub const NOT_FOUND_RESPONSE: &str = "NotFound";
pub const INTERNAL_RESPONSE: &str = "InternalError";

fn response_ref(name: &str) -> Ref {
    Ref::new(format!("#/components/responses/{}", name))
}

/// The shared component responses every operation references.
pub fn shared_responses() -> Vec<(String, Response)> {
    let error_body = || Content::new(Some(Ref::from_schema_name(ERROR_SCHEMA_NAME)));
    vec![
        (
            VALIDATION_RESPONSE.to_string(),
            ResponseBuilder::new()
                .description("validation error")
                .content(JSON, error_body())
                .build(),
        ),
        (
            UNAUTHORIZED_RESPONSE.to_string(),
            ResponseBuilder::new()
                .description("unauthorized")
                .content(JSON, error_body())
                .build(),
        ),
        (
            NOT_FOUND_RESPONSE.to_string(),
            ResponseBuilder::new()
                .description("not found")
                .content(JSON, error_body())
                .build(),
        ),
        (
            INTERNAL_RESPONSE.to_string(),
            ResponseBuilder::new()
                .description("unexpected error")
                .content(JSON, error_body())
                .build(),
        ),
    ]
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn operation(tag: &str, id: String, summary: String) -> OperationBuilder {
    OperationBuilder::new()
        .tag(tag)
        .operation_id(Some(id))
        .summary(Some(summary))
        .response("401", response_ref(UNAUTHORIZED_RESPONSE))
        .response("500", response_ref(INTERNAL_RESPONSE))
}

fn pk_schema(model: &EnhancedModel) -> RefOr<Schema> {
    match model.pk_attribute().kind {
        AttrKind::Integer | AttrKind::BigInt => {
            ObjectBuilder::new().schema_type(Type::Integer).into()
        }
        _ => ObjectBuilder::new().schema_type(Type::String).into(),
    }
}

fn path_param(name: &str, model: &EnhancedModel) -> Parameter {
    ParameterBuilder::new()
        .name(name)
        .parameter_in(ParameterIn::Path)
        .required(Required::True)
        .schema(Some(pk_schema(model)))
        .build()
}

fn query_param(name: &str, description: &str) -> Parameter {
    ParameterBuilder::new()
        .name(name)
        .parameter_in(ParameterIn::Query)
        .required(Required::False)
        .description(Some(description))
        .schema(Some(ObjectBuilder::new().schema_type(Type::String)))
        .build()
}

/// The list/search query vocabulary: i, p, a, f, o.
fn page_params(mut builder: OperationBuilder) -> OperationBuilder {
    for (name, description) in [
        ("i", "items per page"),
        ("p", "page index; requires i"),
        ("a", "pipe-delimited attribute whitelist"),
        ("f", "sort field"),
        ("o", "sort order: ASC or DESC"),
    ] {
        builder = builder.parameter(query_param(name, description));
    }
    builder
}

fn json_body(schema_name: String) -> RequestBody {
    RequestBodyBuilder::new()
        .content(JSON, Content::new(Some(Ref::from_schema_name(schema_name))))
        .required(Some(Required::True))
        .build()
}

fn model_response(description: &str, schema_name: String) -> Response {
    ResponseBuilder::new()
        .description(description)
        .content(JSON, Content::new(Some(Ref::from_schema_name(schema_name))))
        .build()
}

fn array_response(description: &str, schema_name: String) -> Response {
    ResponseBuilder::new()
        .description(description)
        .content(
            JSON,
            Content::new(Some(Schema::from(
                ArrayBuilder::new().items(Ref::from_schema_name(schema_name)),
            ))),
        )
        .build()
}

fn count_response() -> Response {
    ResponseBuilder::new()
        .description("row count")
        .content(
            JSON,
            Content::new(Some(Schema::from(
                ObjectBuilder::new()
                    .schema_type(Type::Object)
                    .property("count", ObjectBuilder::new().schema_type(Type::Integer))
                    .required("count"),
            ))),
        )
        .build()
}

fn total_count_header() -> Header {
    Header::new(ObjectBuilder::new().schema_type(Type::Integer))
}

fn search_responses(builder: OperationBuilder, schema_name: String) -> OperationBuilder {
    builder
        .response(
            "200",
            ResponseBuilder::new()
                .description("matching rows")
                .header("X-Total-Count", total_count_header())
                .content(
                    JSON,
                    Content::new(Some(Schema::from(
                        ArrayBuilder::new().items(Ref::from_schema_name(schema_name)),
                    ))),
                )
                .build(),
        )
        .response(
            "204",
            ResponseBuilder::new()
                .description("no matches")
                .header("X-Total-Count", total_count_header())
                .build(),
        )
        .response("400", response_ref(VALIDATION_RESPONSE))
}

// Root operations.

pub fn create(model: &EnhancedModel) -> Operation {
    operation(
        &model.name,
        format!("create{}", model.name),
        format!("Create a {}", model.name),
    )
    .request_body(Some(json_body(input_schema_name(model))))
    .response("201", model_response("created", model.name.clone()))
    .response("400", response_ref(VALIDATION_RESPONSE))
    .build()
}

pub fn list(model: &EnhancedModel) -> Operation {
    page_params(operation(
        &model.name,
        format!("list{}", model.name),
        format!("List {} rows", model.name),
    ))
    .response("200", array_response("rows", model.name.clone()))
    .response("400", response_ref(VALIDATION_RESPONSE))
    .build()
}

pub fn count(model: &EnhancedModel) -> Operation {
    operation(
        &model.name,
        format!("count{}", model.name),
        format!("Count {} rows", model.name),
    )
    .response("200", count_response())
    .build()
}

pub fn search(model: &EnhancedModel) -> Operation {
    search_responses(
        operation(
            &model.name,
            format!("search{}", model.name),
            format!("Search {} rows", model.name),
        )
        .request_body(Some(json_body(SEARCH_SCHEMA_NAME.to_string()))),
        model.name.clone(),
    )
    .build()
}

pub fn search_get(model: &EnhancedModel) -> Operation {
    let builder = page_params(operation(
        &model.name,
        format!("searchGet{}", model.name),
        format!("Search {} rows (deprecated GET form)", model.name),
    ))
    .parameter(query_param("s", "JSON search predicate"))
    .deprecated(Some(Deprecated::True));
    search_responses(builder, model.name.clone()).build()
}

pub fn read(model: &EnhancedModel) -> Operation {
    operation(
        &model.name,
        format!("read{}", model.name),
        format!("Fetch one {}", model.name),
    )
    .parameter(path_param("id", model))
    .parameter(query_param("a", "pipe-delimited attribute whitelist"))
    .response("200", model_response("row", model.name.clone()))
    .response("404", response_ref(NOT_FOUND_RESPONSE))
    .build()
}

pub fn update(model: &EnhancedModel, partial: bool) -> Operation {
    let verb = if partial { "patch" } else { "update" };
    operation(
        &model.name,
        format!("{}{}", verb, model.name),
        format!("Update one {}", model.name),
    )
    .parameter(path_param("id", model))
    .request_body(Some(json_body(input_schema_name(model))))
    .response("204", ResponseBuilder::new().description("updated").build())
    .response("400", response_ref(VALIDATION_RESPONSE))
    .response("404", response_ref(NOT_FOUND_RESPONSE))
    .build()
}

pub fn delete(model: &EnhancedModel) -> Operation {
    operation(
        &model.name,
        format!("delete{}", model.name),
        format!("Delete one {}", model.name),
    )
    .parameter(path_param("id", model))
    .response("204", ResponseBuilder::new().description("deleted").build())
    .response("404", response_ref(NOT_FOUND_RESPONSE))
    .build()
}

// Relation operations.

fn relation_operation(
    op: &str,
    source: &EnhancedModel,
    segment: &str,
    summary: String,
) -> OperationBuilder {
    let id = format!("{}{}{}", op, source.name, capitalize(segment));
    operation(&source.name, id, summary)
        .parameter(path_param("id", source))
        .response("404", response_ref(NOT_FOUND_RESPONSE))
}

pub fn relation_get_single(
    source: &EnhancedModel,
    target: &EnhancedModel,
    segment: &str,
) -> Operation {
    relation_operation(
        "read",
        source,
        segment,
        format!("Fetch the {} of a {}", segment, source.name),
    )
    .parameter(query_param("a", "pipe-delimited attribute whitelist"))
    .response("200", model_response("related row", target.name.clone()))
    .build()
}

pub fn relation_create(
    source: &EnhancedModel,
    target: &EnhancedModel,
    segment: &str,
) -> Operation {
    relation_operation(
        "create",
        source,
        segment,
        format!("Create and associate a {} with a {}", target.name, source.name),
    )
    .request_body(Some(json_body(input_schema_name(target))))
    .response("201", model_response("created", target.name.clone()))
    .response("400", response_ref(VALIDATION_RESPONSE))
    .build()
}

pub fn relation_update(
    source: &EnhancedModel,
    target: &EnhancedModel,
    segment: &str,
    partial: bool,
) -> Operation {
    let verb = if partial { "patch" } else { "update" };
    relation_operation(
        verb,
        source,
        segment,
        format!("Update the {} of a {}", segment, source.name),
    )
    .request_body(Some(json_body(input_schema_name(target))))
    .response("204", ResponseBuilder::new().description("updated").build())
    .response("400", response_ref(VALIDATION_RESPONSE))
    .build()
}

pub fn relation_unset(source: &EnhancedModel, segment: &str) -> Operation {
    relation_operation(
        "unset",
        source,
        segment,
        format!("Unset the {} of a {}", segment, source.name),
    )
    .response("204", ResponseBuilder::new().description("unset").build())
    .build()
}

pub fn relation_list(
    source: &EnhancedModel,
    target: &EnhancedModel,
    segment: &str,
) -> Operation {
    page_params(relation_operation(
        "list",
        source,
        segment,
        format!("List the {} of a {}", segment, source.name),
    ))
    .response("200", array_response("related rows", target.name.clone()))
    .response("400", response_ref(VALIDATION_RESPONSE))
    .build()
}

pub fn relation_count(source: &EnhancedModel, segment: &str) -> Operation {
    relation_operation(
        "count",
        source,
        segment,
        format!("Count the {} of a {}", segment, source.name),
    )
    .response("200", count_response())
    .build()
}

pub fn relation_search(
    source: &EnhancedModel,
    target: &EnhancedModel,
    segment: &str,
) -> Operation {
    search_responses(
        relation_operation(
            "search",
            source,
            segment,
            format!("Search the {} of a {}", segment, source.name),
        )
        .request_body(Some(json_body(SEARCH_SCHEMA_NAME.to_string()))),
        target.name.clone(),
    )
    .build()
}

pub fn relation_get_one(
    source: &EnhancedModel,
    target: &EnhancedModel,
    segment: &str,
) -> Operation {
    relation_operation(
        "readOne",
        source,
        segment,
        format!("Fetch one of the {} of a {}", segment, source.name),
    )
    .parameter(path_param("targetId", target))
    .parameter(query_param("a", "pipe-delimited attribute whitelist"))
    .response("200", model_response("related row", target.name.clone()))
    .build()
}

pub fn relation_update_one(
    source: &EnhancedModel,
    target: &EnhancedModel,
    segment: &str,
    partial: bool,
) -> Operation {
    let verb = if partial { "patchOne" } else { "updateOne" };
    relation_operation(
        verb,
        source,
        segment,
        format!("Update one of the {} of a {}", segment, source.name),
    )
    .parameter(path_param("targetId", target))
    .request_body(Some(json_body(input_schema_name(target))))
    .response("204", ResponseBuilder::new().description("updated").build())
    .response("400", response_ref(VALIDATION_RESPONSE))
    .build()
}

pub fn relation_unlink_all(source: &EnhancedModel, segment: &str) -> Operation {
    relation_operation(
        "unlinkAll",
        source,
        segment,
        format!("Unset all {} of a {}", segment, source.name),
    )
    .response("204", ResponseBuilder::new().description("unlinked").build())
    .build()
}

pub fn relation_unlink_one(
    source: &EnhancedModel,
    target: &EnhancedModel,
    segment: &str,
) -> Operation {
    relation_operation(
        "unlinkOne",
        source,
        segment,
        format!("Remove one {} link from a {}", segment, source.name),
    )
    .parameter(path_param("targetId", target))
    .response("204", ResponseBuilder::new().description("unlinked").build())
    .build()
}
