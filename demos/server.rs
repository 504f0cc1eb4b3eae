//! Demo server: declares a small model set, generates routes and the OpenAPI
//! document, and serves them. Uses PostgreSQL when DATABASE_URL is set and
//! falls back to the in-memory store otherwise.

use restforge::{
    allow_all, generate, policy, AttrKind, AttributeDef, AuthorizationSpec, Datastore,
    MemoryStore, ModelDefinition, ModelSchema, OperationKind, PolicyDenial, PostgresStore,
    RestConfig, ValidationRule,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("restforge=debug".parse()?))
        .init();

    let store: Arc<dyn Datastore> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(&url)
                .await?;
            Arc::new(PostgresStore::new(pool))
        }
        Err(_) => Arc::new(MemoryStore::new()),
    };

    let user = ModelDefinition::new(
        ModelSchema::new("User")
            .attribute(AttributeDef::new("name", AttrKind::String).not_null())
            .attribute(AttributeDef::new("email", AttrKind::String).validate(ValidationRule {
                format: Some("email".into()),
                ..Default::default()
            }))
            .has_many("Task", "user_id")
            .belongs_to_many("Team", "Membership", "user_id", "team_id"),
    )
    .authorize_with(
        AuthorizationSpec::new()
            .rule(
                OperationKind::Delete,
                policy(|req| async move {
                    if req.headers.contains_key("x-admin") {
                        Ok(())
                    } else {
                        Err(PolicyDenial::unauthorized("admin header required"))
                    }
                }),
            )
            .rule(OperationKind::Other, allow_all()),
    );

    let task = ModelDefinition::new(
        ModelSchema::new("Task")
            .attribute(AttributeDef::new("title", AttrKind::String).not_null())
            .attribute(AttributeDef::new("done", AttrKind::Boolean))
            .belongs_to("User", "user_id"),
    );

    let team = ModelDefinition::new(
        ModelSchema::new("Team")
            .attribute(AttributeDef::new("name", AttrKind::String).not_null()),
    );

    let api = generate(vec![user, task, team], store, RestConfig::default())?;
    let app = api
        .into_router()
        .layer(RequestBodyLimitLayer::new(1024 * 1024));

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
