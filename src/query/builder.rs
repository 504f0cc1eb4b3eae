//! Parses pagination/sort/attribute-filter/search parameters into a
//! validated, engine-agnostic [`QueryDescriptor`].
//!
//! A builder instance is single-use: `create` -> optional `attach_search` ->
//! `prepare` -> read `query`. Any out-of-order or repeated call is an error;
//! `reset` returns the instance to its pre-`create` state.

use crate::error::QueryError;
use crate::query::operators::{replace_operators, OperatorWhitelist};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Page size, with an explicit "no limit" sentinel distinct from zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageLimit {
    None,
    Limited(u64),
}

impl PageLimit {
    pub fn is_none_sentinel(&self) -> bool {
        matches!(self, PageLimit::None)
    }
}

/// Pagination policy supplied at generation time.
#[derive(Clone, Debug)]
pub struct QueryConfig {
    pub default_limit: PageLimit,
    pub max_limit: PageLimit,
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            default_limit: PageLimit::Limited(100),
            max_limit: PageLimit::Limited(1000),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Result<Self, QueryError> {
        match s {
            "ASC" => Ok(SortOrder::Asc),
            "DESC" => Ok(SortOrder::Desc),
            _ => Err(QueryError::InvalidSortOrder),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// A resolved sub-model include inside a search predicate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubInclude {
    pub model: String,
    pub where_clause: Option<Value>,
    pub attributes: Option<Vec<String>>,
    pub include: Vec<SubInclude>,
}

/// The validated query shape handed to the datastore.
#[derive(Clone, Debug)]
pub struct QueryDescriptor {
    pub limit: PageLimit,
    pub offset: u64,
    pub attributes: Option<Vec<String>>,
    pub order: Option<Vec<(String, SortOrder)>>,
    pub where_clause: Option<Value>,
    pub include: Option<Vec<SubInclude>>,
}

impl QueryDescriptor {
    /// An unconstrained descriptor (no pagination, no filters).
    pub fn unbounded() -> Self {
        QueryDescriptor {
            limit: PageLimit::None,
            offset: 0,
            attributes: None,
            order: None,
            where_clause: None,
            include: None,
        }
    }
}

/// Wire parameters: `i` items per page, `p` page index, `a` pipe-delimited
/// attribute whitelist, `f` sort field, `o` sort order, `s` search predicate.
/// `i`/`p` arrive as strings on the query string and as numbers in search
/// bodies, so both shapes are accepted and coerced.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct QueryParams {
    pub i: Option<Value>,
    pub p: Option<Value>,
    pub a: Option<String>,
    pub f: Option<String>,
    pub o: Option<String>,
    pub s: Option<Value>,
}

impl QueryParams {
    pub fn from_query_map(map: &HashMap<String, String>) -> Self {
        QueryParams {
            i: map.get("i").map(|v| Value::String(v.clone())),
            p: map.get("p").map(|v| Value::String(v.clone())),
            a: map.get("a").cloned(),
            f: map.get("f").cloned(),
            o: map.get("o").cloned(),
            s: map.get("s").map(|v| Value::String(v.clone())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BuilderState {
    Empty,
    Created,
    SearchAttached,
    Prepared,
}

pub struct QueryBuilder {
    config: QueryConfig,
    whitelist: Option<Arc<OperatorWhitelist>>,
    known_models: HashSet<String>,
    state: BuilderState,
    query: Option<QueryDescriptor>,
}

impl QueryBuilder {
    pub fn new(config: QueryConfig) -> Self {
        QueryBuilder {
            config,
            whitelist: None,
            known_models: HashSet::new(),
            state: BuilderState::Empty,
            query: None,
        }
    }

    pub fn with_operator_whitelist(mut self, whitelist: Option<Arc<OperatorWhitelist>>) -> Self {
        self.whitelist = whitelist;
        self
    }

    pub fn with_known_models<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_models = names.into_iter().map(Into::into).collect();
        self
    }

    /// Back to the pre-`create` state.
    pub fn reset(&mut self) {
        self.state = BuilderState::Empty;
        self.query = None;
    }

    pub fn create(&mut self, params: &QueryParams) -> Result<(), QueryError> {
        if self.state != BuilderState::Empty {
            return Err(QueryError::AlreadyCreated);
        }

        let order = match params.o.as_deref() {
            None => SortOrder::Desc,
            Some(o) => SortOrder::parse(o)?,
        };

        if params.i.is_some() != params.p.is_some() {
            return Err(QueryError::PaginationMismatch);
        }

        let limit = match &params.i {
            Some(v) => PageLimit::Limited(coerce_page_number(v)?),
            None => self.config.default_limit,
        };
        if limit.is_none_sentinel() && !self.config.max_limit.is_none_sentinel() {
            return Err(QueryError::NoneNotAllowed);
        }
        if let (PageLimit::Limited(l), PageLimit::Limited(max)) = (limit, self.config.max_limit) {
            if l > max {
                return Err(QueryError::InvalidPagination);
            }
        }

        let page = match &params.p {
            Some(v) => coerce_page_number(v)?,
            None => 0,
        };
        let offset = match limit {
            PageLimit::Limited(l) => l * page,
            PageLimit::None => 0,
        };

        let attributes = params.a.as_deref().map(|a| {
            a.split('|')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        });

        self.query = Some(QueryDescriptor {
            limit,
            offset,
            attributes,
            order: params.f.clone().map(|field| vec![(field, order)]),
            where_clause: None,
            include: None,
        });
        self.state = BuilderState::Created;
        Ok(())
    }

    /// Attach a search predicate (`s`): a nested condition object, optionally
    /// carrying `include` arrays naming other registered models.
    pub fn attach_search(&mut self, params: &QueryParams) -> Result<(), QueryError> {
        match self.state {
            BuilderState::Empty => return Err(QueryError::NotCreated),
            BuilderState::SearchAttached => return Err(QueryError::SearchAlreadyAttached),
            BuilderState::Prepared => return Err(QueryError::AlreadyPrepared),
            BuilderState::Created => {}
        }

        let mut predicate = match &params.s {
            None => Value::Object(Default::default()),
            Some(Value::String(raw)) => {
                serde_json::from_str(raw).map_err(|_| QueryError::InvalidSearch)?
            }
            Some(v) => v.clone(),
        };
        let Value::Object(ref mut map) = predicate else {
            return Err(QueryError::InvalidSearch);
        };

        let include = match map.remove("include") {
            Some(spec) => Some(self.resolve_includes(&spec)?),
            None => None,
        };

        let query = self.query.as_mut().ok_or(QueryError::NotCreated)?;
        query.where_clause = Some(predicate);
        query.include = include;
        self.state = BuilderState::SearchAttached;
        Ok(())
    }

    /// Validate operators against the whitelist, then rewrite every alias to
    /// its canonical form, recursively through the where and include trees.
    pub fn prepare(&mut self) -> Result<(), QueryError> {
        match self.state {
            BuilderState::Empty => return Err(QueryError::NotCreated),
            BuilderState::Prepared => return Err(QueryError::AlreadyPrepared),
            BuilderState::Created | BuilderState::SearchAttached => {}
        }
        let query = self.query.as_mut().ok_or(QueryError::NotCreated)?;

        if let Some(whitelist) = &self.whitelist {
            let mut disallowed: Vec<String> = Vec::new();
            if let Some(where_clause) = &query.where_clause {
                collect_disallowed(whitelist, where_clause, &mut disallowed);
            }
            if let Some(includes) = &query.include {
                for inc in includes {
                    collect_disallowed_includes(whitelist, inc, &mut disallowed);
                }
            }
            if !disallowed.is_empty() {
                return Err(QueryError::IllegalOperators(disallowed));
            }
        }

        if let Some(where_clause) = &mut query.where_clause {
            replace_operators(where_clause);
        }
        if let Some(includes) = &mut query.include {
            for inc in includes {
                replace_include_operators(inc);
            }
        }
        self.state = BuilderState::Prepared;
        Ok(())
    }

    /// The prepared descriptor; an error before `prepare` has run.
    pub fn query(&self) -> Result<&QueryDescriptor, QueryError> {
        if self.state != BuilderState::Prepared {
            return Err(QueryError::NotPrepared);
        }
        self.query.as_ref().ok_or(QueryError::NotPrepared)
    }

    pub fn into_query(self) -> Result<QueryDescriptor, QueryError> {
        if self.state != BuilderState::Prepared {
            return Err(QueryError::NotPrepared);
        }
        self.query.ok_or(QueryError::NotPrepared)
    }

    /// Resolve an `include` array: each entry is a model name string or an
    /// object `{model, where, attributes, include}`. Unresolvable model
    /// references fail, recursively.
    fn resolve_includes(&self, spec: &Value) -> Result<Vec<SubInclude>, QueryError> {
        let Value::Array(entries) = spec else {
            return Err(QueryError::InvalidSearch);
        };
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            out.push(self.resolve_include(entry)?);
        }
        Ok(out)
    }

    fn resolve_include(&self, entry: &Value) -> Result<SubInclude, QueryError> {
        match entry {
            Value::String(name) => {
                self.require_model(name)?;
                Ok(SubInclude {
                    model: name.clone(),
                    ..Default::default()
                })
            }
            Value::Object(obj) => {
                let name = obj
                    .get("model")
                    .and_then(Value::as_str)
                    .ok_or(QueryError::InvalidSearch)?;
                self.require_model(name)?;
                let nested = match obj.get("include") {
                    Some(spec) => self.resolve_includes(spec)?,
                    None => Vec::new(),
                };
                let attributes = obj.get("attributes").and_then(Value::as_array).map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                });
                Ok(SubInclude {
                    model: name.to_string(),
                    where_clause: obj.get("where").cloned(),
                    attributes,
                    include: nested,
                })
            }
            _ => Err(QueryError::InvalidSearch),
        }
    }

    fn require_model(&self, name: &str) -> Result<(), QueryError> {
        if self.known_models.contains(name) {
            Ok(())
        } else {
            Err(QueryError::ModelNotFound(name.to_string()))
        }
    }
}

fn collect_disallowed(whitelist: &OperatorWhitelist, tree: &Value, out: &mut Vec<String>) {
    for op in whitelist.check(tree).operators {
        if !out.contains(&op) {
            out.push(op);
        }
    }
}

fn collect_disallowed_includes(
    whitelist: &OperatorWhitelist,
    include: &SubInclude,
    out: &mut Vec<String>,
) {
    if let Some(where_clause) = &include.where_clause {
        collect_disallowed(whitelist, where_clause, out);
    }
    for nested in &include.include {
        collect_disallowed_includes(whitelist, nested, out);
    }
}

fn replace_include_operators(include: &mut SubInclude) {
    if let Some(where_clause) = &mut include.where_clause {
        replace_operators(where_clause);
    }
    for nested in &mut include.include {
        replace_include_operators(nested);
    }
}

/// Page numbers must be non-negative integers; they arrive as JSON numbers or
/// as query-string text.
fn coerce_page_number(v: &Value) -> Result<u64, QueryError> {
    match v {
        Value::Number(n) => n.as_u64().ok_or(QueryError::InvalidPagination),
        Value::String(s) => s.trim().parse().map_err(|_| QueryError::InvalidPagination),
        _ => Err(QueryError::InvalidPagination),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        QueryParams::from_query_map(&map)
    }

    #[test]
    fn lifecycle_must_be_followed_in_order() {
        let mut builder = QueryBuilder::new(QueryConfig::default());
        assert_eq!(builder.prepare().unwrap_err(), QueryError::NotCreated);
        assert_eq!(builder.query().unwrap_err(), QueryError::NotPrepared);

        builder.create(&QueryParams::default()).unwrap();
        assert_eq!(
            builder.create(&QueryParams::default()).unwrap_err(),
            QueryError::AlreadyCreated
        );

        builder.prepare().unwrap();
        assert_eq!(builder.prepare().unwrap_err(), QueryError::AlreadyPrepared);
        assert!(builder.query().is_ok());

        builder.reset();
        assert!(builder.create(&QueryParams::default()).is_ok());
    }

    #[test]
    fn pagination_must_come_in_pairs() {
        let mut builder = QueryBuilder::new(QueryConfig::default());
        assert_eq!(
            builder.create(&params(&[("p", "1")])).unwrap_err(),
            QueryError::PaginationMismatch
        );
        builder.reset();
        assert_eq!(
            builder.create(&params(&[("i", "10")])).unwrap_err(),
            QueryError::PaginationMismatch
        );
    }

    #[test]
    fn offset_is_limit_times_page() {
        let mut builder = QueryBuilder::new(QueryConfig::default());
        builder.create(&params(&[("i", "25"), ("p", "3")])).unwrap();
        builder.prepare().unwrap();
        let q = builder.query().unwrap();
        assert_eq!(q.limit, PageLimit::Limited(25));
        assert_eq!(q.offset, 75);
    }

    #[test]
    fn rejects_bad_pagination_values() {
        let mut builder = QueryBuilder::new(QueryConfig::default());
        assert_eq!(
            builder.create(&params(&[("i", "-1"), ("p", "0")])).unwrap_err(),
            QueryError::InvalidPagination
        );
        builder.reset();
        assert_eq!(
            builder.create(&params(&[("i", "ten"), ("p", "0")])).unwrap_err(),
            QueryError::InvalidPagination
        );
        builder.reset();
        // exceeds the configured max of 1000
        assert_eq!(
            builder.create(&params(&[("i", "5000"), ("p", "0")])).unwrap_err(),
            QueryError::InvalidPagination
        );
    }

    #[test]
    fn unlimited_default_with_capped_max_is_rejected() {
        let config = QueryConfig {
            default_limit: PageLimit::None,
            max_limit: PageLimit::Limited(100),
        };
        let mut builder = QueryBuilder::new(config);
        assert_eq!(
            builder.create(&QueryParams::default()).unwrap_err(),
            QueryError::NoneNotAllowed
        );
    }

    #[test]
    fn sort_order_is_validated_and_defaults_to_desc() {
        let mut builder = QueryBuilder::new(QueryConfig::default());
        assert_eq!(
            builder.create(&params(&[("o", "SIDEWAYS")])).unwrap_err(),
            QueryError::InvalidSortOrder
        );
        builder.reset();
        builder.create(&params(&[("f", "name")])).unwrap();
        builder.prepare().unwrap();
        assert_eq!(
            builder.query().unwrap().order,
            Some(vec![("name".to_string(), SortOrder::Desc)])
        );
    }

    #[test]
    fn attribute_list_is_pipe_delimited() {
        let mut builder = QueryBuilder::new(QueryConfig::default());
        builder.create(&params(&[("a", "value1|value2")])).unwrap();
        builder.prepare().unwrap();
        assert_eq!(
            builder.query().unwrap().attributes,
            Some(vec!["value1".to_string(), "value2".to_string()])
        );
    }

    #[test]
    fn search_resolves_include_references() {
        let mut builder =
            QueryBuilder::new(QueryConfig::default()).with_known_models(["User", "Task"]);
        let mut p = QueryParams::default();
        p.s = Some(json!({
            "value1": "x",
            "include": [
                { "model": "Task", "where": { "done": true }, "include": ["User"] }
            ]
        }));
        builder.create(&QueryParams::default()).unwrap();
        builder.attach_search(&p).unwrap();
        builder.prepare().unwrap();
        let q = builder.query().unwrap();
        assert_eq!(q.where_clause, Some(json!({ "value1": "x" })));
        let includes = q.include.as_ref().unwrap();
        assert_eq!(includes[0].model, "Task");
        assert_eq!(includes[0].include[0].model, "User");
    }

    #[test]
    fn unresolvable_include_reference_fails() {
        let mut builder = QueryBuilder::new(QueryConfig::default()).with_known_models(["User"]);
        let mut p = QueryParams::default();
        p.s = Some(json!({ "include": ["Ghost"] }));
        builder.create(&QueryParams::default()).unwrap();
        assert_eq!(
            builder.attach_search(&p).unwrap_err(),
            QueryError::ModelNotFound("Ghost".to_string())
        );
    }

    #[test]
    fn search_may_only_attach_once_and_before_prepare() {
        let mut builder = QueryBuilder::new(QueryConfig::default());
        let mut p = QueryParams::default();
        p.s = Some(json!({ "x": 1 }));
        assert_eq!(builder.attach_search(&p).unwrap_err(), QueryError::NotCreated);
        builder.create(&QueryParams::default()).unwrap();
        builder.attach_search(&p).unwrap();
        assert_eq!(
            builder.attach_search(&p).unwrap_err(),
            QueryError::SearchAlreadyAttached
        );
        builder.prepare().unwrap();
        assert_eq!(builder.attach_search(&p).unwrap_err(), QueryError::AlreadyPrepared);
    }

    #[test]
    fn prepare_rewrites_aliases_and_enforces_whitelist() {
        let whitelist = Arc::new(OperatorWhitelist::allowing(["eq", "like"]));
        let mut builder = QueryBuilder::new(QueryConfig::default())
            .with_operator_whitelist(Some(whitelist.clone()));
        let mut p = QueryParams::default();
        p.s = Some(json!({ "name": { "like": "%a%" } }));
        builder.create(&QueryParams::default()).unwrap();
        builder.attach_search(&p).unwrap();
        builder.prepare().unwrap();
        assert_eq!(
            builder.query().unwrap().where_clause,
            Some(json!({ "name": { "$like": "%a%" } }))
        );

        let mut builder =
            QueryBuilder::new(QueryConfig::default()).with_operator_whitelist(Some(whitelist));
        let mut p = QueryParams::default();
        p.s = Some(json!({ "name": { "gt": 3 }, "$or": [{ "a": 1 }] }));
        builder.create(&QueryParams::default()).unwrap();
        builder.attach_search(&p).unwrap();
        match builder.prepare().unwrap_err() {
            QueryError::IllegalOperators(mut ops) => {
                ops.sort();
                assert_eq!(ops, vec!["$gt", "$or"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn string_predicate_is_parsed_as_json() {
        let mut builder = QueryBuilder::new(QueryConfig::default());
        builder.create(&QueryParams::default()).unwrap();
        builder
            .attach_search(&params(&[("s", r#"{"value1":"test"}"#)]))
            .unwrap();
        builder.prepare().unwrap();
        assert_eq!(
            builder.query().unwrap().where_clause,
            Some(json!({ "value1": "test" }))
        );
    }
}
