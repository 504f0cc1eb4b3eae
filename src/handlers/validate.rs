//! Body validation against model constraints. All violations are collected
//! into one list, not just the first.

use crate::error::{ApiError, FieldViolation};
use crate::model::{AttrKind, AttributeDef, EnhancedModel, ValidationRule};
use crate::store::Row;
use regex::Regex;
use serde_json::Value;

/// Validate a create/replace body (`partial = false`: non-nullable
/// attributes must be present) or a partial-update body (`partial = true`:
/// only present fields are checked).
pub fn validate_body(model: &EnhancedModel, body: &Row, partial: bool) -> Result<(), ApiError> {
    let mut violations = Vec::new();
    for attr in model.attributes() {
        if attr.auto {
            continue;
        }
        let value = body.get(&attr.name);
        match value {
            None | Some(Value::Null) => {
                if !partial && !attr.nullable {
                    violations.push(FieldViolation::not_null(&attr.name));
                }
            }
            Some(v) => validate_value(attr, v, &mut violations),
        }
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(violations))
    }
}

fn validate_value(attr: &AttributeDef, value: &Value, violations: &mut Vec<FieldViolation>) {
    if !kind_accepts(attr.kind, value) {
        violations.push(FieldViolation::invalid(&attr.name, value.clone()));
        return;
    }
    let Some(rule) = &attr.validate else {
        return;
    };
    if !rule_accepts(rule, value) {
        violations.push(FieldViolation::invalid(&attr.name, value.clone()));
    }
}

fn kind_accepts(kind: AttrKind, value: &Value) -> bool {
    match kind {
        AttrKind::String | AttrKind::Text => value.is_string(),
        AttrKind::Integer | AttrKind::BigInt => value.as_i64().is_some(),
        AttrKind::Float => value.is_number(),
        AttrKind::Boolean => value.is_boolean(),
        AttrKind::Date => value.is_string(),
        AttrKind::Uuid => value
            .as_str()
            .map(|s| uuid::Uuid::parse_str(s).is_ok())
            .unwrap_or(false),
        AttrKind::Json => true,
    }
}

fn rule_accepts(rule: &ValidationRule, value: &Value) -> bool {
    if let Some(min) = rule.minimum {
        if value.as_f64().map(|n| n < min).unwrap_or(false) {
            return false;
        }
    }
    if let Some(max) = rule.maximum {
        if value.as_f64().map(|n| n > max).unwrap_or(false) {
            return false;
        }
    }
    if let Some(s) = value.as_str() {
        if let Some(min) = rule.min_length {
            if s.chars().count() < min as usize {
                return false;
            }
        }
        if let Some(max) = rule.max_length {
            if s.chars().count() > max as usize {
                return false;
            }
        }
        if let Some(pattern) = &rule.pattern {
            match Regex::new(pattern) {
                Ok(re) => {
                    if !re.is_match(s) {
                        return false;
                    }
                }
                Err(_) => return false,
            }
        }
        if let Some(format) = &rule.format {
            if !format_accepts(format, s) {
                return false;
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.contains(value) {
            return false;
        }
    }
    true
}

fn format_accepts(format: &str, s: &str) -> bool {
    match format.to_lowercase().as_str() {
        "email" => s.contains('@') && s.len() >= 3,
        "uuid" => uuid::Uuid::parse_str(s).is_ok(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelDefinition, ModelRegistry, ModelSchema};
    use serde_json::json;

    fn test_model() -> ModelRegistry {
        ModelRegistry::build(vec![ModelDefinition::new(
            ModelSchema::new("TestModel")
                .attribute(AttributeDef::new("value1", AttrKind::String))
                .attribute(AttributeDef::new("value2", AttrKind::Integer).validate(
                    ValidationRule {
                        maximum: Some(100.0),
                        ..Default::default()
                    },
                ))
                .attribute(AttributeDef::new("value3", AttrKind::String).not_null()),
        )])
        .unwrap()
    }

    fn body(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("body fixtures must be objects"),
        }
    }

    #[test]
    fn rule_breach_reports_path_and_value() {
        let registry = test_model();
        let model = registry.by_name("TestModel").unwrap();
        let err = validate_body(
            model,
            &body(json!({ "value2": 101, "value3": "ok" })),
            false,
        )
        .unwrap_err();
        match err {
            ApiError::Validation(violations) => {
                assert_eq!(
                    violations,
                    vec![FieldViolation::invalid("value2", json!(101))]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_non_nullable_fails_unless_partial() {
        let registry = test_model();
        let model = registry.by_name("TestModel").unwrap();
        let empty = body(json!({}));
        assert!(matches!(
            validate_body(model, &empty, false),
            Err(ApiError::Validation(v)) if v == vec![FieldViolation::not_null("value3")]
        ));
        assert!(validate_body(model, &empty, true).is_ok());
    }

    #[test]
    fn kind_mismatch_is_a_violation() {
        let registry = test_model();
        let model = registry.by_name("TestModel").unwrap();
        let err = validate_body(
            model,
            &body(json!({ "value2": "not a number", "value3": "ok" })),
            false,
        );
        assert!(matches!(err, Err(ApiError::Validation(_))));
    }
}
