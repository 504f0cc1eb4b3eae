//! Authorization policy resolution across the model graph.
//!
//! Each route resolves to exactly one policy function at registration time,
//! following parent-delegation (`use_parent_for_authorization`) and
//! child-delegation (`authorize_for_children`) rules. Misconfiguration is a
//! startup failure, never a per-request one.

use crate::error::{ApiError, SetupError};
use crate::model::registry::ModelRegistry;
use crate::model::AssociationKind;
use axum::http::{HeaderMap, Method, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

/// The fixed operation vocabulary routes authorize against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    Read,
    Update,
    UpdatePartial,
    Delete,
    Search,
    Associate,
    Other,
}

impl OperationKind {
    pub const ALL: &'static [OperationKind] = &[
        OperationKind::Create,
        OperationKind::Read,
        OperationKind::Update,
        OperationKind::UpdatePartial,
        OperationKind::Delete,
        OperationKind::Search,
        OperationKind::Associate,
        OperationKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "CREATE",
            OperationKind::Read => "READ",
            OperationKind::Update => "UPDATE",
            OperationKind::UpdatePartial => "UPDATE_PARTIAL",
            OperationKind::Delete => "DELETE",
            OperationKind::Search => "SEARCH",
            OperationKind::Associate => "ASSOCIATE",
            OperationKind::Other => "OTHER",
        }
    }
}

impl FromStr for OperationKind {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| SetupError::UnknownOperation(s.to_string()))
    }
}

/// Request facts handed to a policy function.
#[derive(Clone, Debug)]
pub struct PolicyRequest {
    pub model: String,
    pub operation: OperationKind,
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
}

/// A policy denial: carries its own status (401 unless the policy says
/// otherwise) and message, passed through the error contract unchanged.
#[derive(Clone, Debug)]
pub struct PolicyDenial {
    pub status: StatusCode,
    pub message: String,
}

impl PolicyDenial {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        PolicyDenial {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        PolicyDenial {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
        }
    }
}

impl From<PolicyDenial> for ApiError {
    fn from(denial: PolicyDenial) -> Self {
        ApiError::Classified {
            status: denial.status,
            message: Value::String(denial.message),
        }
    }
}

pub type PolicyFuture = Pin<Box<dyn Future<Output = Result<(), PolicyDenial>> + Send>>;
pub type PolicyFn = Arc<dyn Fn(PolicyRequest) -> PolicyFuture + Send + Sync>;

/// Wrap an async closure as a [`PolicyFn`].
pub fn policy<F, Fut>(f: F) -> PolicyFn
where
    F: Fn(PolicyRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), PolicyDenial>> + Send + 'static,
{
    Arc::new(move |req| Box::pin(f(req)))
}

/// The default when no rule applies: every request passes.
pub fn allow_all() -> PolicyFn {
    policy(|_| async { Ok(()) })
}

/// Delegation of a child model's authorization to this model.
#[derive(Clone, Debug)]
pub struct ChildAuthorization {
    pub child: String,
    pub authorize_for_child: bool,
}

/// Per-model authorization: operation rules plus delegation options.
#[derive(Clone, Default)]
pub struct AuthorizationSpec {
    rules: HashMap<OperationKind, PolicyFn>,
    pub use_parent_for_authorization: bool,
    pub authorize_for_children: Vec<ChildAuthorization>,
}

impl AuthorizationSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, op: OperationKind, policy: PolicyFn) -> Self {
        self.rules.insert(op, policy);
        self
    }

    pub fn use_parent(mut self) -> Self {
        self.use_parent_for_authorization = true;
        self
    }

    pub fn authorize_for_child(mut self, child: impl Into<String>, enabled: bool) -> Self {
        self.authorize_for_children.push(ChildAuthorization {
            child: child.into(),
            authorize_for_child: enabled,
        });
        self
    }

    pub fn rule_for(&self, op: OperationKind) -> Option<&PolicyFn> {
        self.rules.get(&op)
    }
}

/// Resolve the policy function governing (model, associated, operation).
///
/// Order matters: parent delegation substitutes the parent's spec first, but
/// a child-delegation claim scanned across the whole definition set runs
/// afterwards and therefore wins.
pub fn resolve(
    registry: &ModelRegistry,
    model: &str,
    associated: Option<&str>,
    op: OperationKind,
) -> Result<PolicyFn, SetupError> {
    let own = registry
        .definition_by_name(model)
        .and_then(|def| def.opts.authorize_with.as_ref());

    let mut effective = own;

    if own.map(|s| s.use_parent_for_authorization).unwrap_or(false) {
        let associated =
            associated.ok_or_else(|| SetupError::MissingAssociatedModel(model.to_string()))?;
        let association = registry
            .index()
            .lookup_model_name(model)
            .map_err(SetupError::Association)?
            .iter()
            .find(|a| a.other_end(model) == associated)
            .cloned()
            .ok_or_else(|| SetupError::NoAssociation {
                model: model.to_string(),
                associated: associated.to_string(),
            })?;
        let viewed = association.kind_viewed_from(model);
        if !matches!(
            viewed,
            AssociationKind::BelongsTo | AssociationKind::BelongsToMany
        ) {
            return Err(SetupError::InvalidParentRelation {
                model: model.to_string(),
                associated: associated.to_string(),
            });
        }
        effective = registry
            .definition_by_name(associated)
            .and_then(|def| def.opts.authorize_with.as_ref());
    }

    let mut claimant = None;
    for def in registry.definitions() {
        let Some(spec) = def.opts.authorize_with.as_ref() else {
            continue;
        };
        let claims = spec
            .authorize_for_children
            .iter()
            .any(|c| c.child == model && c.authorize_for_child);
        if claims {
            if claimant.is_some() {
                return Err(SetupError::MultipleAuthorizationClaims {
                    child: model.to_string(),
                });
            }
            claimant = Some(spec);
        }
    }
    if let Some(spec) = claimant {
        effective = Some(spec);
    }

    Ok(effective
        .and_then(|spec| spec.rule_for(op).or_else(|| spec.rule_for(OperationKind::Other)))
        .cloned()
        .unwrap_or_else(allow_all))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelDefinition, ModelSchema};

    fn deny(message: &'static str) -> PolicyFn {
        policy(move |_| async move { Err(PolicyDenial::unauthorized(message)) })
    }

    async fn denial_message(policy: &PolicyFn) -> Option<String> {
        let request = PolicyRequest {
            model: "X".into(),
            operation: OperationKind::Read,
            method: Method::GET,
            path: "/x".into(),
            headers: HeaderMap::new(),
        };
        policy(request).await.err().map(|d| d.message)
    }

    #[tokio::test]
    async fn missing_spec_resolves_to_allow_all() {
        let registry = ModelRegistry::build(vec![ModelDefinition::new(ModelSchema::new("Plain"))])
            .unwrap();
        let resolved = resolve(&registry, "Plain", None, OperationKind::Delete).unwrap();
        assert_eq!(denial_message(&resolved).await, None);
    }

    #[tokio::test]
    async fn falls_back_to_other_rule() {
        let spec = AuthorizationSpec::new().rule(OperationKind::Other, deny("other"));
        let registry = ModelRegistry::build(vec![
            ModelDefinition::new(ModelSchema::new("Doc")).authorize_with(spec),
        ])
        .unwrap();
        let resolved = resolve(&registry, "Doc", None, OperationKind::Update).unwrap();
        assert_eq!(denial_message(&resolved).await.as_deref(), Some("other"));
    }

    #[tokio::test]
    async fn parent_delegation_substitutes_parent_rules() {
        let parent = ModelDefinition::new(ModelSchema::new("User").has_many("Task", "user_id"))
            .authorize_with(AuthorizationSpec::new().rule(OperationKind::Read, deny("parent")));
        let child = ModelDefinition::new(ModelSchema::new("Task").belongs_to("User", "user_id"))
            .authorize_with(AuthorizationSpec::new().use_parent());
        let registry = ModelRegistry::build(vec![parent, child]).unwrap();

        let resolved = resolve(&registry, "Task", Some("User"), OperationKind::Read).unwrap();
        assert_eq!(denial_message(&resolved).await.as_deref(), Some("parent"));

        assert!(matches!(
            resolve(&registry, "Task", None, OperationKind::Read),
            Err(SetupError::MissingAssociatedModel(_))
        ));
    }

    #[tokio::test]
    async fn parent_delegation_requires_a_parent_relation() {
        let owner = ModelDefinition::new(ModelSchema::new("User").has_many("Task", "user_id"))
            .authorize_with(AuthorizationSpec::new().use_parent());
        let task = ModelDefinition::new(ModelSchema::new("Task"));
        let registry = ModelRegistry::build(vec![owner, task]).unwrap();

        // User -> Task is HasMany from User's side: not a parent relation.
        assert!(matches!(
            resolve(&registry, "User", Some("Task"), OperationKind::Read),
            Err(SetupError::InvalidParentRelation { .. })
        ));
        assert!(matches!(
            resolve(&registry, "User", Some("Ghost"), OperationKind::Read),
            Err(SetupError::NoAssociation { .. })
        ));
    }

    #[test]
    fn two_claimants_for_one_child_are_rejected() {
        let a = ModelDefinition::new(ModelSchema::new("A"))
            .authorize_with(AuthorizationSpec::new().authorize_for_child("Doc", true));
        let b = ModelDefinition::new(ModelSchema::new("B"))
            .authorize_with(AuthorizationSpec::new().authorize_for_child("Doc", true));
        let doc = ModelDefinition::new(ModelSchema::new("Doc"));
        let registry = ModelRegistry::build(vec![a, b, doc]).unwrap();
        assert!(matches!(
            resolve(&registry, "Doc", None, OperationKind::Read),
            Err(SetupError::MultipleAuthorizationClaims { child }) if child == "Doc"
        ));
    }

    #[tokio::test]
    async fn child_claim_overrides_parent_delegation() {
        let parent = ModelDefinition::new(ModelSchema::new("User").has_many("Task", "user_id"))
            .authorize_with(AuthorizationSpec::new().rule(OperationKind::Read, deny("parent")));
        let guardian = ModelDefinition::new(ModelSchema::new("Audit")).authorize_with(
            AuthorizationSpec::new()
                .rule(OperationKind::Read, deny("guardian"))
                .authorize_for_child("Task", true),
        );
        let child = ModelDefinition::new(ModelSchema::new("Task").belongs_to("User", "user_id"))
            .authorize_with(AuthorizationSpec::new().use_parent());
        let registry = ModelRegistry::build(vec![parent, guardian, child]).unwrap();

        let resolved = resolve(&registry, "Task", Some("User"), OperationKind::Read).unwrap();
        assert_eq!(denial_message(&resolved).await.as_deref(), Some("guardian"));
    }

    #[test]
    fn operation_kind_round_trips_through_strings() {
        for op in OperationKind::ALL {
            assert_eq!(OperationKind::from_str(op.as_str()).unwrap(), *op);
        }
        assert!(matches!(
            OperationKind::from_str("DESTROY"),
            Err(SetupError::UnknownOperation(_))
        ));
    }
}
