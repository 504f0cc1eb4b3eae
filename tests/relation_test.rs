use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use restforge::{
    generate, policy, AttrKind, AttributeDef, AuthorizationSpec, MemoryStore, ModelDefinition,
    ModelSchema, OperationKind, PolicyDenial, RestConfig, RouteExposureMap,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

fn models() -> Vec<ModelDefinition> {
    vec![
        ModelDefinition::new(
            ModelSchema::new("User")
                .attribute(AttributeDef::new("name", AttrKind::String).not_null())
                .has_many("Task", "user_id")
                .has_one("Profile", "user_id")
                .belongs_to_many("Team", "Membership", "user_id", "team_id"),
        ),
        ModelDefinition::new(
            ModelSchema::new("Task")
                .attribute(AttributeDef::new("title", AttrKind::String).not_null())
                .attribute(AttributeDef::new("done", AttrKind::Boolean))
                .belongs_to("User", "user_id"),
        ),
        ModelDefinition::new(
            ModelSchema::new("Profile")
                .attribute(AttributeDef::new("bio", AttrKind::Text)),
        ),
        ModelDefinition::new(
            ModelSchema::new("Team")
                .attribute(AttributeDef::new("name", AttrKind::String).not_null()),
        ),
    ]
}

fn api() -> Router {
    generate(models(), Arc::new(MemoryStore::new()), RestConfig::default())
        .unwrap()
        .into_router()
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&v).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn seed_user(app: &Router, name: &str) -> i64 {
    let response = app
        .clone()
        .oneshot(request("POST", "/user", Some(json!({ "name": name }))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["id"].as_i64().unwrap()
}

#[tokio::test]
async fn has_many_create_list_count_and_scoped_fetch() {
    let app = api();
    let user_id = seed_user(&app, "ada").await;

    for title in ["one", "two"] {
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                &format!("/user/{}/tasks", user_id),
                Some(json!({ "title": title })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        // Create responses exclude association foreign keys.
        assert!(body_json(response).await.get("user_id").is_none());
    }
    // A task belonging to someone else must stay invisible here.
    let other = seed_user(&app, "eve").await;
    app.clone()
        .oneshot(request(
            "POST",
            &format!("/user/{}/tasks", other),
            Some(json!({ "title": "theirs" })),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(request("GET", &format!("/user/{}/tasks", user_id), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 2);

    let response = app
        .clone()
        .oneshot(request("GET", &format!("/user/{}/tasks/count", user_id), None))
        .await
        .unwrap();
    assert_eq!(body_json(response).await, json!({ "count": 2 }));

    let response = app
        .clone()
        .oneshot(request("GET", &format!("/user/{}/tasks/1", user_id), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["title"], json!("one"));

    // Scoped fetch of an unlinked task id is a missing target.
    let response = app
        .clone()
        .oneshot(request("GET", &format!("/user/{}/tasks/3", user_id), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(request("GET", "/user/999/tasks", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn relation_search_shares_the_dual_reply_contract() {
    let app = api();
    let user_id = seed_user(&app, "ada").await;
    for (title, done) in [("write", true), ("review", false)] {
        app.clone()
            .oneshot(request(
                "POST",
                &format!("/user/{}/tasks", user_id),
                Some(json!({ "title": title, "done": done })),
            ))
            .await
            .unwrap();
    }

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/user/{}/tasks/search", user_id),
            Some(json!({ "s": { "done": true } })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-total-count").unwrap(), "1");

    let response = app
        .oneshot(request(
            "POST",
            &format!("/user/{}/tasks/search", user_id),
            Some(json!({ "s": { "title": "nothing" } })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers().get("x-total-count").unwrap(), "0");
}

#[tokio::test]
async fn missing_link_unlink_is_target_not_found() {
    let app = api();
    let user_id = seed_user(&app, "ada").await;
    let response = app
        .oneshot(request(
            "DELETE",
            &format!("/user/{}/tasks/5", user_id),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["message"], json!("target not found."));
}

#[tokio::test]
async fn unlink_removes_the_link_but_not_the_row() {
    let app = api();
    let user_id = seed_user(&app, "ada").await;
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/user/{}/tasks", user_id),
            Some(json!({ "title": "keep me" })),
        ))
        .await
        .unwrap();
    let task_id = body_json(response).await["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(request(
            "DELETE",
            &format!("/user/{}/tasks/{}", user_id, task_id),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Gone from the relation...
    let response = app
        .clone()
        .oneshot(request("GET", &format!("/user/{}/tasks/count", user_id), None))
        .await
        .unwrap();
    assert_eq!(body_json(response).await, json!({ "count": 0 }));
    // ...but the row itself survives.
    let response = app
        .oneshot(request("GET", &format!("/task/{}", task_id), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn belongs_to_get_unset_and_survival() {
    let app = api();
    let user_id = seed_user(&app, "ada").await;
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/task",
            Some(json!({ "title": "t", "user_id": user_id })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(request("GET", "/task/1/user", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["name"], json!("ada"));

    // Unset the relation; the parent row must survive.
    let response = app
        .clone()
        .oneshot(request("DELETE", "/task/1/user", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(request("GET", "/task/1/user", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(request("GET", &format!("/user/{}", user_id), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn has_one_create_and_update_fills_the_foreign_key() {
    let app = api();
    let user_id = seed_user(&app, "ada").await;
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/user/{}/profile", user_id),
            Some(json!({ "bio": "hello" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(request(
            "PATCH",
            &format!("/user/{}/profile", user_id),
            Some(json!({ "bio": "updated" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(request("GET", &format!("/user/{}/profile", user_id), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["bio"], json!("updated"));
}

#[tokio::test]
async fn belongs_to_many_links_through_the_junction() {
    let app = api();
    let user_id = seed_user(&app, "ada").await;

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/user/{}/teams", user_id),
            Some(json!({ "name": "builders" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let team_id = body_json(response).await["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(request("GET", &format!("/user/{}/teams", user_id), None))
        .await
        .unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(request(
            "DELETE",
            &format!("/user/{}/teams/{}", user_id, team_id),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(request("GET", &format!("/user/{}/teams/count", user_id), None))
        .await
        .unwrap();
    assert_eq!(body_json(response).await, json!({ "count": 0 }));

    // The team row itself is untouched.
    let response = app
        .oneshot(request("GET", &format!("/team/{}", team_id), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn search_includes_filter_by_related_models() {
    let app = api();
    let with_match = seed_user(&app, "ada").await;
    let without = seed_user(&app, "eve").await;
    app.clone()
        .oneshot(request(
            "POST",
            &format!("/user/{}/tasks", with_match),
            Some(json!({ "title": "special" })),
        ))
        .await
        .unwrap();
    app.clone()
        .oneshot(request(
            "POST",
            &format!("/user/{}/tasks", without),
            Some(json!({ "title": "plain" })),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/user/search",
            Some(json!({
                "s": { "include": [{ "model": "Task", "where": { "title": "special" } }] }
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rows = body_json(response).await;
    assert_eq!(rows.as_array().unwrap().len(), 1);
    assert_eq!(rows[0]["name"], json!("ada"));

    // Unresolvable include references fail.
    let response = app
        .oneshot(request(
            "POST",
            "/user/search",
            Some(json!({ "s": { "include": ["Ghost"] } })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn suppressed_routes_disappear() {
    let mut defs = models();
    defs[0] = ModelDefinition::new(
        ModelSchema::new("User")
            .attribute(AttributeDef::new("name", AttrKind::String).not_null())
            .has_many("Task", "user_id")
            .has_one("Profile", "user_id")
            .belongs_to_many("Team", "Membership", "user_id", "team_id"),
    )
    .exposed(RouteExposureMap::new().suppress("/:id", axum::http::Method::DELETE));
    let app = generate(defs, Arc::new(MemoryStore::new()), RestConfig::default())
        .unwrap()
        .into_router();

    let user_id = seed_user(&app, "ada").await;
    let response = app
        .clone()
        .oneshot(request("DELETE", &format!("/user/{}", user_id), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let response = app
        .oneshot(request("GET", &format!("/user/{}", user_id), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn parent_delegation_guards_child_routes() {
    let defs = vec![
        ModelDefinition::new(
            ModelSchema::new("User")
                .attribute(AttributeDef::new("name", AttrKind::String))
                .has_many("Task", "user_id"),
        )
        .authorize_with(AuthorizationSpec::new().rule(
            OperationKind::Delete,
            policy(|req| async move {
                if req.headers.contains_key("x-admin") {
                    Ok(())
                } else {
                    Err(PolicyDenial::unauthorized("admin only"))
                }
            }),
        )),
        ModelDefinition::new(
            ModelSchema::new("Task")
                .attribute(AttributeDef::new("title", AttrKind::String))
                .belongs_to("User", "user_id"),
        )
        .authorize_with(AuthorizationSpec::new().use_parent()),
    ];
    let app = generate(defs, Arc::new(MemoryStore::new()), RestConfig::default())
        .unwrap()
        .into_router();

    app.clone()
        .oneshot(request("POST", "/task", Some(json!({ "title": "t" }))))
        .await
        .unwrap();

    // Task deletion is governed by User's Delete rule.
    let response = app
        .clone()
        .oneshot(request("DELETE", "/task/1", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["message"], json!("admin only"));

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/task/1")
                .header("x-admin", "1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
