use restforge::{
    generate, AttrKind, AttributeDef, MemoryStore, ModelDefinition, ModelSchema, RestConfig,
};
use serde_json::Value;
use std::sync::Arc;

fn document() -> Value {
    let defs = vec![
        ModelDefinition::new(
            ModelSchema::new("User")
                .attribute(AttributeDef::new("name", AttrKind::String).not_null())
                .has_many("Task", "user_id"),
        ),
        ModelDefinition::new(
            ModelSchema::new("Task")
                .attribute(AttributeDef::new("title", AttrKind::String).not_null())
                .belongs_to("User", "user_id"),
        ),
    ];
    let api = generate(defs, Arc::new(MemoryStore::new()), RestConfig::default()).unwrap();
    serde_json::to_value(&api.document).unwrap()
}

#[test]
fn document_mirrors_the_emitted_routes() {
    let doc = document();
    let paths = doc["paths"].as_object().unwrap();

    for path in [
        "/user",
        "/user/count",
        "/user/search",
        "/user/{id}",
        "/user/{id}/tasks",
        "/user/{id}/tasks/count",
        "/user/{id}/tasks/search",
        "/user/{id}/tasks/{targetId}",
        "/task",
        "/task/{id}",
        "/task/{id}/user",
    ] {
        assert!(paths.contains_key(path), "missing path {}", path);
    }

    let root = &paths["/user"];
    assert!(root.get("get").is_some());
    assert!(root.get("post").is_some());
    let by_id = &paths["/user/{id}"];
    for method in ["get", "put", "patch", "delete"] {
        assert!(by_id.get(method).is_some(), "missing {} on /user/{{id}}", method);
    }

    // The GET form of /search is present but deprecated.
    let search = &paths["/user/search"];
    assert!(search.get("post").is_some());
    assert_eq!(search["get"]["deprecated"], Value::Bool(true));
}

#[test]
fn component_schemas_are_deduplicated_by_model() {
    let doc = document();
    let schemas = doc["components"]["schemas"].as_object().unwrap();
    for name in ["User", "UserInput", "Task", "TaskInput", "ErrorMessage", "SearchParameters"] {
        assert!(schemas.contains_key(name), "missing schema {}", name);
    }

    // The User schema references its association target.
    let tasks_prop = &schemas["User"]["properties"]["tasks"];
    assert_eq!(
        tasks_prop["items"]["$ref"],
        Value::String("#/components/schemas/Task".into())
    );

    // Input schemas exclude server-managed attributes.
    assert!(schemas["UserInput"]["properties"].get("id").is_none());

    let responses = doc["components"]["responses"].as_object().unwrap();
    for name in ["ValidationError", "Unauthorized", "NotFound", "InternalError"] {
        assert!(responses.contains_key(name), "missing response {}", name);
    }
}

#[test]
fn operations_reference_shared_error_responses() {
    let doc = document();
    let create = &doc["paths"]["/user"]["post"];
    assert_eq!(
        create["responses"]["400"]["$ref"],
        Value::String("#/components/responses/ValidationError".into())
    );
    assert_eq!(
        create["responses"]["401"]["$ref"],
        Value::String("#/components/responses/Unauthorized".into())
    );
    assert!(create["responses"]["201"].get("$ref").is_none());

    let search = &doc["paths"]["/user/search"]["post"];
    assert!(search["responses"]["200"]["headers"]
        .as_object()
        .unwrap()
        .contains_key("X-Total-Count"));
}
