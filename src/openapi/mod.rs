//! OpenAPI synthesis by immutable accumulation: each emitted route returns a
//! fragment; one merge pass builds the document, detecting collisions
//! explicitly instead of mutating a shared accumulator during iteration.

pub mod paths;
pub mod schema;

use crate::error::SetupError;
use std::collections::BTreeMap;
use utoipa::openapi::path::Operation;
use utoipa::openapi::{
    ComponentsBuilder, HttpMethod, InfoBuilder, OpenApi, OpenApiBuilder, PathItem, PathsBuilder,
    RefOr, Schema,
};

/// Document metadata supplied at generation time.
#[derive(Clone, Debug)]
pub struct ApiInfo {
    pub title: String,
    pub version: String,
    pub description: Option<String>,
}

/// One route's contribution to the document.
pub struct ApiFragment {
    pub path: String,
    pub method: HttpMethod,
    pub operation: Operation,
    pub schemas: Vec<(String, RefOr<Schema>)>,
}

impl ApiFragment {
    pub fn new(
        path: impl Into<String>,
        method: HttpMethod,
        operation: Operation,
        schemas: Vec<(String, RefOr<Schema>)>,
    ) -> Self {
        ApiFragment {
            path: path.into(),
            method,
            operation,
            schemas,
        }
    }
}

fn method_name(method: &HttpMethod) -> &'static str {
    match method {
        HttpMethod::Get => "GET",
        HttpMethod::Post => "POST",
        HttpMethod::Put => "PUT",
        HttpMethod::Delete => "DELETE",
        HttpMethod::Options => "OPTIONS",
        HttpMethod::Head => "HEAD",
        HttpMethod::Patch => "PATCH",
        HttpMethod::Trace => "TRACE",
    }
}

fn operation_slot<'a>(item: &'a mut PathItem, method: &HttpMethod) -> &'a mut Option<Operation> {
    match method {
        HttpMethod::Get => &mut item.get,
        HttpMethod::Post => &mut item.post,
        HttpMethod::Put => &mut item.put,
        HttpMethod::Delete => &mut item.delete,
        HttpMethod::Options => &mut item.options,
        HttpMethod::Head => &mut item.head,
        HttpMethod::Patch => &mut item.patch,
        HttpMethod::Trace => &mut item.trace,
    }
}

/// Merge all fragments into one document. Registering the same (path,
/// method) twice is an error; schemas dedupe by name, and a conflicting
/// redefinition under an existing name is an error.
pub fn merge(info: &ApiInfo, fragments: Vec<ApiFragment>) -> Result<OpenApi, SetupError> {
    let mut path_items: BTreeMap<String, PathItem> = BTreeMap::new();
    let mut schemas: BTreeMap<String, RefOr<Schema>> = BTreeMap::new();

    for fragment in fragments {
        match path_items.entry(fragment.path.clone()) {
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(PathItem::new(fragment.method, fragment.operation));
            }
            std::collections::btree_map::Entry::Occupied(mut entry) => {
                let slot = operation_slot(entry.get_mut(), &fragment.method);
                if slot.is_some() {
                    return Err(SetupError::DuplicateOperation {
                        method: method_name(&fragment.method).to_string(),
                        path: fragment.path,
                    });
                }
                *slot = Some(fragment.operation);
            }
        }
        for (name, new_schema) in fragment.schemas {
            match schemas.get(&name) {
                None => {
                    schemas.insert(name, new_schema);
                }
                Some(existing) => {
                    let same = serde_json::to_value(existing).ok()
                        == serde_json::to_value(&new_schema).ok();
                    if !same {
                        return Err(SetupError::SchemaConflict(name));
                    }
                }
            }
        }
    }

    let mut paths_builder = PathsBuilder::new();
    for (path, item) in path_items {
        paths_builder = paths_builder.path(path, item);
    }

    let mut components = ComponentsBuilder::new();
    for (name, component_schema) in schemas {
        components = components.schema(name, component_schema);
    }
    for (name, response) in paths::shared_responses() {
        components = components.response(name, response);
    }

    Ok(OpenApiBuilder::new()
        .info(
            InfoBuilder::new()
                .title(info.title.clone())
                .version(info.version.clone())
                .description(info.description.clone())
                .build(),
        )
        .paths(paths_builder.build())
        .components(Some(components.build()))
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use utoipa::openapi::path::OperationBuilder;

    fn info() -> ApiInfo {
        ApiInfo {
            title: "test".into(),
            version: "0.0.0".into(),
            description: None,
        }
    }

    fn op(id: &str) -> Operation {
        OperationBuilder::new()
            .operation_id(Some(id.to_string()))
            .build()
    }

    #[test]
    fn merges_methods_under_one_path_item() {
        let doc = merge(
            &info(),
            vec![
                ApiFragment::new("/task", HttpMethod::Get, op("list"), Vec::new()),
                ApiFragment::new("/task", HttpMethod::Post, op("create"), Vec::new()),
            ],
        )
        .unwrap();
        let item = doc.paths.paths.get("/task").unwrap();
        assert!(item.get.is_some());
        assert!(item.post.is_some());
    }

    #[test]
    fn duplicate_operation_is_an_error() {
        let result = merge(
            &info(),
            vec![
                ApiFragment::new("/task", HttpMethod::Get, op("a"), Vec::new()),
                ApiFragment::new("/task", HttpMethod::Get, op("b"), Vec::new()),
            ],
        );
        assert!(matches!(
            result,
            Err(SetupError::DuplicateOperation { .. })
        ));
    }

    #[test]
    fn identical_schema_redefinition_dedupes() {
        let schema = || crate::openapi::schema::error_schema();
        let doc = merge(
            &info(),
            vec![
                ApiFragment::new(
                    "/a",
                    HttpMethod::Get,
                    op("a"),
                    vec![("E".to_string(), schema())],
                ),
                ApiFragment::new(
                    "/b",
                    HttpMethod::Get,
                    op("b"),
                    vec![("E".to_string(), schema())],
                ),
            ],
        )
        .unwrap();
        let components = doc.components.unwrap();
        assert!(components.schemas.contains_key("E"));
    }

    #[test]
    fn conflicting_schema_redefinition_is_an_error() {
        let result = merge(
            &info(),
            vec![
                ApiFragment::new(
                    "/a",
                    HttpMethod::Get,
                    op("a"),
                    vec![("E".to_string(), crate::openapi::schema::error_schema())],
                ),
                ApiFragment::new(
                    "/b",
                    HttpMethod::Get,
                    op("b"),
                    vec![("E".to_string(), crate::openapi::schema::search_schema())],
                ),
            ],
        );
        assert!(matches!(result, Err(SetupError::SchemaConflict(name)) if name == "E"));
    }
}
