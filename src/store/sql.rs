//! Builds parameterized PostgreSQL statements from enhanced models and
//! canonicalized where-trees.

use crate::association::JoinSpec;
use crate::error::StoreError;
use crate::model::{AttrKind, EnhancedModel};
use crate::query::{PageLimit, QueryDescriptor, SortOrder};
use crate::store::ResolvedInclude;
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

/// Quote identifier for PostgreSQL (identifiers only ever come from model
/// metadata, never from request input).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    pub fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub(crate) fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

/// A value that can be bound to a PostgreSQL query, converted from
/// `serde_json::Value`.
#[derive(Clone, Debug)]
pub enum PgBindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Uuid(uuid::Uuid),
    Json(Value),
}

impl PgBindValue {
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => PgBindValue::Null,
            Value::Bool(b) => PgBindValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    PgBindValue::I64(i)
                } else {
                    PgBindValue::F64(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => {
                if let Ok(u) = uuid::Uuid::parse_str(s) {
                    PgBindValue::Uuid(u)
                } else {
                    PgBindValue::String(s.clone())
                }
            }
            Value::Array(_) | Value::Object(_) => PgBindValue::Json(v.clone()),
        }
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            PgBindValue::Null => <Option<i32> as Encode<Postgres>>::encode_by_ref(&None, buf)?,
            PgBindValue::Bool(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf)?,
            PgBindValue::I64(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::F64(n) => <f64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::String(s) => {
                let s_ref: &str = s.as_str();
                <&str as Encode<Postgres>>::encode_by_ref(&s_ref, buf)?
            }
            PgBindValue::Uuid(u) => {
                let u_str = u.to_string();
                <&str as Encode<Postgres>>::encode_by_ref(&u_str.as_str(), buf)?
            }
            PgBindValue::Json(v) => <Value as Encode<Postgres>>::encode_by_ref(v, buf)?,
        })
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}

/// SQL cast appended to a placeholder when text values bind into typed
/// columns.
fn pg_cast(kind: AttrKind) -> Option<&'static str> {
    match kind {
        AttrKind::Uuid => Some("uuid"),
        AttrKind::Date => Some("timestamptz"),
        AttrKind::Json => Some("jsonb"),
        _ => None,
    }
}

fn bind(q: &mut QueryBuf, model: &EnhancedModel, column: &str, value: &Value) -> String {
    let n = q.push_param(value.clone());
    match model.attribute(column).and_then(|a| pg_cast(a.kind)) {
        Some(cast) => format!("${}::{}", n, cast),
        None => format!("${}", n),
    }
}

/// Projection list: requested attributes intersected with the model's, all
/// columns otherwise.
pub fn select_columns(model: &EnhancedModel, attributes: Option<&[String]>) -> String {
    let names: Vec<String> = match attributes {
        Some(attrs) => {
            let picked: Vec<String> = attrs
                .iter()
                .filter(|a| model.has_attribute(a))
                .map(|a| quoted(a))
                .collect();
            if picked.is_empty() {
                model.attributes().iter().map(|a| quoted(&a.name)).collect()
            } else {
                picked
            }
        }
        None => model.attributes().iter().map(|a| quoted(&a.name)).collect(),
    };
    names.join(", ")
}

pub fn order_clause(model: &EnhancedModel, order: Option<&[(String, SortOrder)]>) -> String {
    if let Some(order) = order {
        let parts: Vec<String> = order
            .iter()
            .filter(|(field, _)| model.has_attribute(field))
            .map(|(field, dir)| format!("{} {}", quoted(field), dir.as_str()))
            .collect();
        if !parts.is_empty() {
            return format!(" ORDER BY {}", parts.join(", "));
        }
    }
    format!(" ORDER BY {}", quoted(&model.primary_key))
}

pub fn page_clause(query: &QueryDescriptor) -> String {
    let mut clause = String::new();
    if let PageLimit::Limited(n) = query.limit {
        clause.push_str(&format!(" LIMIT {}", n));
    }
    if query.offset > 0 {
        clause.push_str(&format!(" OFFSET {}", query.offset));
    }
    clause
}

/// Render a canonicalized where-tree into a SQL condition over `alias`.
/// Fields that are not attributes of the model render as TRUE, the same way
/// unknown filter columns are ignored on plain list queries.
pub fn render_where(
    q: &mut QueryBuf,
    model: &EnhancedModel,
    alias: &str,
    node: &Value,
) -> Result<String, StoreError> {
    let Value::Object(map) = node else {
        return Err(StoreError::Unsupported("where must be an object".into()));
    };
    if map.is_empty() {
        return Ok("TRUE".into());
    }
    let mut parts = Vec::with_capacity(map.len());
    for (key, value) in map {
        match key.as_str() {
            "$and" => parts.push(render_logical(q, model, alias, value, " AND ")?),
            "$or" => parts.push(render_logical(q, model, alias, value, " OR ")?),
            field => parts.push(render_field(q, model, alias, field, value)?),
        }
    }
    Ok(format!("({})", parts.join(" AND ")))
}

fn render_logical(
    q: &mut QueryBuf,
    model: &EnhancedModel,
    alias: &str,
    value: &Value,
    joiner: &str,
) -> Result<String, StoreError> {
    let clauses: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .map(|item| render_where(q, model, alias, item))
            .collect::<Result<_, _>>()?,
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| {
                let single = Value::Object([(k.clone(), v.clone())].into_iter().collect());
                render_where(q, model, alias, &single)
            })
            .collect::<Result<_, _>>()?,
        _ => {
            return Err(StoreError::Unsupported(
                "logical operator expects an object or array".into(),
            ))
        }
    };
    if clauses.is_empty() {
        return Ok("TRUE".into());
    }
    Ok(format!("({})", clauses.join(joiner)))
}

fn render_field(
    q: &mut QueryBuf,
    model: &EnhancedModel,
    alias: &str,
    field: &str,
    value: &Value,
) -> Result<String, StoreError> {
    if !model.has_attribute(field) {
        tracing::debug!(field, model = %model.name, "ignoring unknown filter attribute");
        return Ok("TRUE".into());
    }
    let col = format!("{}.{}", alias, quoted(field));
    match value {
        Value::Null => Ok(format!("{} IS NULL", col)),
        Value::Object(conditions) => {
            let mut parts = Vec::with_capacity(conditions.len());
            for (op, operand) in conditions {
                parts.push(render_operator(q, model, &col, field, op, operand)?);
            }
            if parts.is_empty() {
                Ok("TRUE".into())
            } else {
                Ok(format!("({})", parts.join(" AND ")))
            }
        }
        Value::Array(_) => render_operator(q, model, &col, field, "$in", value),
        _ => Ok(format!("{} = {}", col, bind(q, model, field, value))),
    }
}

fn render_operator(
    q: &mut QueryBuf,
    model: &EnhancedModel,
    col: &str,
    field: &str,
    op: &str,
    operand: &Value,
) -> Result<String, StoreError> {
    let comparison = |q: &mut QueryBuf, sql_op: &str, operand: &Value| {
        format!("{} {} {}", col, sql_op, bind(q, model, field, operand))
    };
    Ok(match op {
        "$eq" => match operand {
            Value::Null => format!("{} IS NULL", col),
            _ => comparison(q, "=", operand),
        },
        "$ne" => match operand {
            Value::Null => format!("{} IS NOT NULL", col),
            _ => comparison(q, "<>", operand),
        },
        "$gt" => comparison(q, ">", operand),
        "$gte" => comparison(q, ">=", operand),
        "$lt" => comparison(q, "<", operand),
        "$lte" => comparison(q, "<=", operand),
        "$like" => comparison(q, "LIKE", operand),
        "$notLike" => comparison(q, "NOT LIKE", operand),
        "$iLike" => comparison(q, "ILIKE", operand),
        "$notILike" => comparison(q, "NOT ILIKE", operand),
        "$startsWith" => format!("{} LIKE {} || '%'", col, bind(q, model, field, operand)),
        "$endsWith" => format!("{} LIKE '%' || {}", col, bind(q, model, field, operand)),
        "$substring" => format!("{} LIKE '%' || {} || '%'", col, bind(q, model, field, operand)),
        "$regexp" => comparison(q, "~", operand),
        "$notRegexp" => comparison(q, "!~", operand),
        "$iRegexp" => comparison(q, "~*", operand),
        "$notIRegexp" => comparison(q, "!~*", operand),
        "$in" | "$any" => render_in(q, model, col, field, operand, false)?,
        "$notIn" => render_in(q, model, col, field, operand, true)?,
        "$between" | "$notBetween" => {
            let Value::Array(bounds) = operand else {
                return Err(StoreError::Unsupported(format!(
                    "{} expects a two-element array",
                    op
                )));
            };
            let [low, high] = bounds.as_slice() else {
                return Err(StoreError::Unsupported(format!(
                    "{} expects a two-element array",
                    op
                )));
            };
            let negate = if op == "$notBetween" { "NOT " } else { "" };
            let low = bind(q, model, field, low);
            let high = bind(q, model, field, high);
            format!("{} {}BETWEEN {} AND {}", col, negate, low, high)
        }
        "$is" => match operand {
            Value::Null => format!("{} IS NULL", col),
            Value::Bool(true) => format!("{} IS TRUE", col),
            Value::Bool(false) => format!("{} IS FALSE", col),
            _ => return Err(StoreError::Unsupported("$is expects null or boolean".into())),
        },
        "$not" => match operand {
            Value::Null => format!("{} IS NOT NULL", col),
            Value::Bool(true) => format!("{} IS NOT TRUE", col),
            Value::Bool(false) => format!("{} IS NOT FALSE", col),
            _ => comparison(q, "<>", operand),
        },
        "$col" => {
            let Value::String(other) = operand else {
                return Err(StoreError::Unsupported("$col expects a column name".into()));
            };
            format!("{} = {}", col, quoted(other))
        }
        "$contains" => comparison(q, "@>", operand),
        "$contained" => comparison(q, "<@", operand),
        "$overlap" => comparison(q, "&&", operand),
        "$adjacent" => comparison(q, "-|-", operand),
        "$strictLeft" => comparison(q, "<<", operand),
        "$strictRight" => comparison(q, ">>", operand),
        "$noExtendRight" => comparison(q, "&<", operand),
        "$noExtendLeft" => comparison(q, "&>", operand),
        other => {
            return Err(StoreError::Unsupported(format!(
                "operator '{}' is not supported by the postgres adapter",
                other
            )))
        }
    })
}

fn render_in(
    q: &mut QueryBuf,
    model: &EnhancedModel,
    col: &str,
    field: &str,
    operand: &Value,
    negate: bool,
) -> Result<String, StoreError> {
    let Value::Array(items) = operand else {
        return Err(StoreError::Unsupported("$in expects an array".into()));
    };
    if items.is_empty() {
        return Ok(if negate { "TRUE" } else { "FALSE" }.into());
    }
    let placeholders: Vec<String> = items.iter().map(|v| bind(q, model, field, v)).collect();
    Ok(format!(
        "{} {} ({})",
        col,
        if negate { "NOT IN" } else { "IN" },
        placeholders.join(", ")
    ))
}

/// Render include filters as EXISTS subqueries over `alias`, one per
/// include, recursing through nested includes.
pub fn render_includes(
    q: &mut QueryBuf,
    model: &EnhancedModel,
    alias: &str,
    includes: &[ResolvedInclude],
    depth: &mut usize,
) -> Result<Vec<String>, StoreError> {
    let mut clauses = Vec::with_capacity(includes.len());
    for include in includes {
        *depth += 1;
        let related = format!("r{}", depth);
        let target = &include.target;
        let join = match include.assoc.join_from(&model.name) {
            JoinSpec::ViewerKey { fk } => format!(
                "SELECT 1 FROM {} {} WHERE {}.{} = {}.{}",
                quoted(&target.table),
                related,
                related,
                quoted(&target.primary_key),
                alias,
                quoted(&fk)
            ),
            JoinSpec::RelatedKey { fk } => format!(
                "SELECT 1 FROM {} {} WHERE {}.{} = {}.{}",
                quoted(&target.table),
                related,
                related,
                quoted(&fk),
                alias,
                quoted(&model.primary_key)
            ),
            JoinSpec::Junction {
                through,
                viewer_key,
                related_key,
            } => {
                *depth += 1;
                let junction = format!("r{}", depth);
                format!(
                    "SELECT 1 FROM {} {} JOIN {} {} ON {}.{} = {}.{} WHERE {}.{} = {}.{}",
                    quoted(&through.to_lowercase()),
                    junction,
                    quoted(&target.table),
                    related,
                    related,
                    quoted(&target.primary_key),
                    junction,
                    quoted(&related_key),
                    junction,
                    quoted(&viewer_key),
                    alias,
                    quoted(&model.primary_key)
                )
            }
        };
        let mut conditions = Vec::new();
        if let Some(where_clause) = &include.where_clause {
            conditions.push(render_where(q, target, &related, where_clause)?);
        }
        conditions.extend(render_includes(q, target, &related, &include.include, depth)?);
        let tail = if conditions.is_empty() {
            String::new()
        } else {
            format!(" AND {}", conditions.join(" AND "))
        };
        clauses.push(format!("EXISTS ({}{})", join, tail));
    }
    Ok(clauses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttrKind, AttributeDef, ModelDefinition, ModelRegistry, ModelSchema};
    use serde_json::json;

    fn model() -> ModelRegistry {
        ModelRegistry::build(vec![ModelDefinition::new(
            ModelSchema::new("Doc")
                .attribute(AttributeDef::new("title", AttrKind::String))
                .attribute(AttributeDef::new("score", AttrKind::Integer)),
        )])
        .unwrap()
    }

    #[test]
    fn renders_comparisons_with_positional_params() {
        let registry = model();
        let doc = registry.by_name("Doc").unwrap();
        let mut q = QueryBuf::new();
        let clause = render_where(
            &mut q,
            doc,
            "t",
            &json!({ "title": { "$like": "%a%" }, "score": { "$gte": 2, "$lt": 9 } }),
        )
        .unwrap();
        // serde_json objects iterate in sorted key order: score before title.
        assert_eq!(
            clause,
            "((t.\"score\" >= $1 AND t.\"score\" < $2) AND t.\"title\" LIKE $3)"
        );
        assert_eq!(q.params, vec![json!(2), json!(9), json!("%a%")]);
    }

    #[test]
    fn empty_in_list_never_matches() {
        let registry = model();
        let doc = registry.by_name("Doc").unwrap();
        let mut q = QueryBuf::new();
        let clause = render_where(&mut q, doc, "t", &json!({ "score": { "$in": [] } })).unwrap();
        assert_eq!(clause, "((FALSE))");
        assert!(q.params.is_empty());
    }

    #[test]
    fn or_branches_combine() {
        let registry = model();
        let doc = registry.by_name("Doc").unwrap();
        let mut q = QueryBuf::new();
        let clause = render_where(
            &mut q,
            doc,
            "t",
            &json!({ "$or": [{ "title": "a" }, { "score": 1 }] }),
        )
        .unwrap();
        assert_eq!(clause, "(((t.\"title\" = $1) OR (t.\"score\" = $2)))");
    }

    #[test]
    fn unknown_attributes_are_ignored() {
        let registry = model();
        let doc = registry.by_name("Doc").unwrap();
        let mut q = QueryBuf::new();
        let clause = render_where(&mut q, doc, "t", &json!({ "ghost": 1 })).unwrap();
        assert_eq!(clause, "(TRUE)");
    }
}
