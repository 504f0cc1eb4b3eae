//! In-memory datastore adapter: `RwLock` tables keyed by table name, integer
//! auto-increment keys, and an in-process evaluator for the canonical
//! operator vocabulary. Backs tests and demos; mirrors the semantics of the
//! postgres adapter.

use crate::association::{Association, JoinSpec};
use crate::error::StoreError;
use crate::model::EnhancedModel;
use crate::query::{PageLimit, QueryDescriptor, SortOrder};
use crate::store::{Datastore, ResolvedInclude, Row};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct Table {
    rows: Vec<Row>,
    next_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_tables<R>(&self, f: impl FnOnce(&HashMap<String, Table>) -> R) -> R {
        f(&self.tables.read().expect("memory store lock poisoned"))
    }

    fn with_tables_mut<R>(&self, f: impl FnOnce(&mut HashMap<String, Table>) -> R) -> R {
        f(&mut self.tables.write().expect("memory store lock poisoned"))
    }

    fn select(
        tables: &HashMap<String, Table>,
        model: &EnhancedModel,
        query: &QueryDescriptor,
        includes: &[ResolvedInclude],
        restrict: Option<&dyn Fn(&Row) -> bool>,
        paginate: bool,
    ) -> Result<Vec<Value>, StoreError> {
        let rows = tables.get(&model.table).map(|t| t.rows.as_slice()).unwrap_or(&[]);
        let mut matched: Vec<&Row> = Vec::new();
        for row in rows {
            if let Some(restrict) = restrict {
                if !restrict(row) {
                    continue;
                }
            }
            if let Some(where_clause) = &query.where_clause {
                if !matches_where(row, where_clause)? {
                    continue;
                }
            }
            if !includes_match(tables, model, row, includes)? {
                continue;
            }
            matched.push(row);
        }

        sort_rows(&mut matched, model, query.order.as_deref());

        let mut selected: Vec<Value> = matched
            .into_iter()
            .map(|row| project(row, query.attributes.as_deref(), model))
            .collect();
        if paginate {
            let offset = query.offset as usize;
            selected = if offset >= selected.len() {
                Vec::new()
            } else {
                selected.split_off(offset)
            };
            if let PageLimit::Limited(limit) = query.limit {
                selected.truncate(limit as usize);
            }
        }
        Ok(selected)
    }

    /// Row filter restricting target rows to those related to `source_id`.
    fn relation_filter(
        tables: &HashMap<String, Table>,
        source: &EnhancedModel,
        assoc: &Association,
        source_id: &Value,
        target: &EnhancedModel,
    ) -> Box<dyn Fn(&Row) -> bool> {
        match assoc.join_from(&source.name) {
            JoinSpec::ViewerKey { fk } => {
                let linked = tables
                    .get(&source.table)
                    .and_then(|t| find_row(t, &source.primary_key, source_id))
                    .and_then(|row| row.get(&fk).cloned())
                    .unwrap_or(Value::Null);
                let pk = target.primary_key.clone();
                Box::new(move |row| {
                    !linked.is_null() && loose_eq(row.get(&pk).unwrap_or(&Value::Null), &linked)
                })
            }
            JoinSpec::RelatedKey { fk } => {
                let source_id = source_id.clone();
                Box::new(move |row| loose_eq(row.get(&fk).unwrap_or(&Value::Null), &source_id))
            }
            JoinSpec::Junction {
                through,
                viewer_key,
                related_key,
            } => {
                let linked: Vec<Value> = tables
                    .get(&through.to_lowercase())
                    .map(|t| {
                        t.rows
                            .iter()
                            .filter(|row| {
                                loose_eq(row.get(&viewer_key).unwrap_or(&Value::Null), source_id)
                            })
                            .filter_map(|row| row.get(&related_key).cloned())
                            .collect()
                    })
                    .unwrap_or_default();
                let pk = target.primary_key.clone();
                Box::new(move |row| {
                    let id = row.get(&pk).unwrap_or(&Value::Null);
                    linked.iter().any(|l| loose_eq(id, l))
                })
            }
        }
    }

    fn insert_row(
        tables: &mut HashMap<String, Table>,
        model: &EnhancedModel,
        body: &Row,
    ) -> Value {
        let table = tables.entry(model.table.clone()).or_default();
        let mut row = Map::new();
        for attr in model.attributes() {
            match body.get(&attr.name) {
                Some(v) => {
                    row.insert(attr.name.clone(), v.clone());
                }
                None => {
                    row.insert(attr.name.clone(), Value::Null);
                }
            }
        }
        let pk = &model.primary_key;
        if row.get(pk).map(Value::is_null).unwrap_or(true) {
            table.next_id += 1;
            row.insert(pk.clone(), Value::Number(table.next_id.into()));
        } else if let Some(n) = row.get(pk).and_then(Value::as_i64) {
            table.next_id = table.next_id.max(n);
        }
        table.rows.push(row.clone());
        Value::Object(row)
    }
}

#[async_trait]
impl Datastore for MemoryStore {
    async fn find_all(
        &self,
        model: &EnhancedModel,
        query: &QueryDescriptor,
        includes: &[ResolvedInclude],
    ) -> Result<Vec<Value>, StoreError> {
        self.with_tables(|tables| Self::select(tables, model, query, includes, None, true))
    }

    async fn find_by_id(
        &self,
        model: &EnhancedModel,
        id: &Value,
    ) -> Result<Option<Value>, StoreError> {
        self.with_tables(|tables| {
            Ok(tables
                .get(&model.table)
                .and_then(|t| find_row(t, &model.primary_key, id))
                .map(|row| Value::Object(row.clone())))
        })
    }

    async fn count(
        &self,
        model: &EnhancedModel,
        query: &QueryDescriptor,
        includes: &[ResolvedInclude],
    ) -> Result<u64, StoreError> {
        self.with_tables(|tables| {
            Self::select(tables, model, query, includes, None, false).map(|rows| rows.len() as u64)
        })
    }

    async fn create(&self, model: &EnhancedModel, body: &Row) -> Result<Value, StoreError> {
        Ok(self.with_tables_mut(|tables| Self::insert_row(tables, model, body)))
    }

    async fn update(
        &self,
        model: &EnhancedModel,
        id: &Value,
        body: &Row,
    ) -> Result<Option<Value>, StoreError> {
        self.with_tables_mut(|tables| {
            let Some(table) = tables.get_mut(&model.table) else {
                return Ok(None);
            };
            let pk = &model.primary_key;
            let Some(row) = table
                .rows
                .iter_mut()
                .find(|row| loose_eq(row.get(pk).unwrap_or(&Value::Null), id))
            else {
                return Ok(None);
            };
            for (name, value) in body {
                if name == pk {
                    continue;
                }
                if row.contains_key(name) {
                    row.insert(name.clone(), value.clone());
                }
            }
            Ok(Some(Value::Object(row.clone())))
        })
    }

    async fn destroy(&self, model: &EnhancedModel, id: &Value) -> Result<bool, StoreError> {
        self.with_tables_mut(|tables| {
            let Some(table) = tables.get_mut(&model.table) else {
                return Ok(false);
            };
            let pk = &model.primary_key;
            let before = table.rows.len();
            table
                .rows
                .retain(|row| !loose_eq(row.get(pk).unwrap_or(&Value::Null), id));
            Ok(table.rows.len() < before)
        })
    }

    async fn relation_get(
        &self,
        source: &EnhancedModel,
        assoc: &Association,
        source_id: &Value,
        target: &EnhancedModel,
        query: &QueryDescriptor,
        includes: &[ResolvedInclude],
    ) -> Result<Vec<Value>, StoreError> {
        self.with_tables(|tables| {
            let filter = Self::relation_filter(tables, source, assoc, source_id, target);
            Self::select(tables, target, query, includes, Some(&*filter), true)
        })
    }

    async fn relation_count(
        &self,
        source: &EnhancedModel,
        assoc: &Association,
        source_id: &Value,
        target: &EnhancedModel,
        query: &QueryDescriptor,
        includes: &[ResolvedInclude],
    ) -> Result<u64, StoreError> {
        self.with_tables(|tables| {
            let filter = Self::relation_filter(tables, source, assoc, source_id, target);
            Self::select(tables, target, query, includes, Some(&*filter), false)
                .map(|rows| rows.len() as u64)
        })
    }

    async fn relation_create(
        &self,
        source: &EnhancedModel,
        assoc: &Association,
        source_id: &Value,
        target: &EnhancedModel,
        body: &Row,
    ) -> Result<Value, StoreError> {
        self.with_tables_mut(|tables| match assoc.join_from(&source.name) {
            JoinSpec::RelatedKey { fk } => {
                let mut body = body.clone();
                body.insert(fk, source_id.clone());
                Ok(Self::insert_row(tables, target, &body))
            }
            JoinSpec::ViewerKey { fk } => {
                let created = Self::insert_row(tables, target, body);
                let new_id = created
                    .get(&target.primary_key)
                    .cloned()
                    .ok_or(StoreError::NotFound)?;
                let table = tables.get_mut(&source.table).ok_or(StoreError::NotFound)?;
                let row = find_row_mut(table, &source.primary_key, source_id)
                    .ok_or(StoreError::NotFound)?;
                row.insert(fk, new_id);
                Ok(created)
            }
            JoinSpec::Junction {
                through,
                viewer_key,
                related_key,
            } => {
                let created = Self::insert_row(tables, target, body);
                let new_id = created
                    .get(&target.primary_key)
                    .cloned()
                    .ok_or(StoreError::NotFound)?;
                let junction = tables.entry(through.to_lowercase()).or_default();
                let mut link = Map::new();
                link.insert(viewer_key, source_id.clone());
                link.insert(related_key, new_id);
                junction.rows.push(link);
                Ok(created)
            }
        })
    }

    async fn relation_link(
        &self,
        source: &EnhancedModel,
        assoc: &Association,
        source_id: &Value,
        target: &EnhancedModel,
        target_id: &Value,
    ) -> Result<(), StoreError> {
        self.with_tables_mut(|tables| match assoc.join_from(&source.name) {
            JoinSpec::ViewerKey { fk } => {
                let table = tables.get_mut(&source.table).ok_or(StoreError::NotFound)?;
                let row = find_row_mut(table, &source.primary_key, source_id)
                    .ok_or(StoreError::NotFound)?;
                row.insert(fk, target_id.clone());
                Ok(())
            }
            JoinSpec::RelatedKey { fk } => {
                let table = tables.get_mut(&target.table).ok_or(StoreError::NotFound)?;
                let row = find_row_mut(table, &target.primary_key, target_id)
                    .ok_or(StoreError::NotFound)?;
                row.insert(fk, source_id.clone());
                Ok(())
            }
            JoinSpec::Junction {
                through,
                viewer_key,
                related_key,
            } => {
                let junction = tables.entry(through.to_lowercase()).or_default();
                let exists = junction.rows.iter().any(|row| {
                    loose_eq(row.get(&viewer_key).unwrap_or(&Value::Null), source_id)
                        && loose_eq(row.get(&related_key).unwrap_or(&Value::Null), target_id)
                });
                if !exists {
                    let mut link = Map::new();
                    link.insert(viewer_key, source_id.clone());
                    link.insert(related_key, target_id.clone());
                    junction.rows.push(link);
                }
                Ok(())
            }
        })
    }

    async fn relation_unlink(
        &self,
        source: &EnhancedModel,
        assoc: &Association,
        source_id: &Value,
        target: &EnhancedModel,
        target_id: Option<&Value>,
    ) -> Result<bool, StoreError> {
        self.with_tables_mut(|tables| match assoc.join_from(&source.name) {
            JoinSpec::ViewerKey { fk } => {
                let Some(table) = tables.get_mut(&source.table) else {
                    return Ok(false);
                };
                let Some(row) = find_row_mut(table, &source.primary_key, source_id) else {
                    return Ok(false);
                };
                let current = row.get(&fk).cloned().unwrap_or(Value::Null);
                let matched = match target_id {
                    Some(tid) => loose_eq(&current, tid),
                    None => !current.is_null(),
                };
                if matched {
                    row.insert(fk, Value::Null);
                }
                Ok(matched)
            }
            JoinSpec::RelatedKey { fk } => {
                let Some(table) = tables.get_mut(&target.table) else {
                    return Ok(false);
                };
                let mut unlinked = false;
                for row in table.rows.iter_mut() {
                    if !loose_eq(row.get(&fk).unwrap_or(&Value::Null), source_id) {
                        continue;
                    }
                    if let Some(tid) = target_id {
                        if !loose_eq(row.get(&target.primary_key).unwrap_or(&Value::Null), tid) {
                            continue;
                        }
                    }
                    row.insert(fk.clone(), Value::Null);
                    unlinked = true;
                }
                Ok(unlinked)
            }
            JoinSpec::Junction {
                through,
                viewer_key,
                related_key,
            } => {
                let Some(junction) = tables.get_mut(&through.to_lowercase()) else {
                    return Ok(false);
                };
                let before = junction.rows.len();
                junction.rows.retain(|row| {
                    let ours = loose_eq(row.get(&viewer_key).unwrap_or(&Value::Null), source_id);
                    let hit = match target_id {
                        Some(tid) => {
                            ours && loose_eq(row.get(&related_key).unwrap_or(&Value::Null), tid)
                        }
                        None => ours,
                    };
                    !hit
                });
                Ok(junction.rows.len() < before)
            }
        })
    }

    async fn relation_has(
        &self,
        source: &EnhancedModel,
        assoc: &Association,
        source_id: &Value,
        target: &EnhancedModel,
        target_id: &Value,
    ) -> Result<bool, StoreError> {
        self.with_tables(|tables| {
            let filter = Self::relation_filter(tables, source, assoc, source_id, target);
            let rows = tables.get(&target.table).map(|t| t.rows.as_slice()).unwrap_or(&[]);
            Ok(rows.iter().any(|row| {
                filter(row)
                    && loose_eq(row.get(&target.primary_key).unwrap_or(&Value::Null), target_id)
            }))
        })
    }
}

fn find_row<'a>(table: &'a Table, pk: &str, id: &Value) -> Option<&'a Row> {
    table
        .rows
        .iter()
        .find(|row| loose_eq(row.get(pk).unwrap_or(&Value::Null), id))
}

fn find_row_mut<'a>(table: &'a mut Table, pk: &str, id: &Value) -> Option<&'a mut Row> {
    table
        .rows
        .iter_mut()
        .find(|row| loose_eq(row.get(pk).unwrap_or(&Value::Null), id))
}

fn project(row: &Row, attributes: Option<&[String]>, model: &EnhancedModel) -> Value {
    match attributes {
        Some(attrs) => {
            let picked: Map<String, Value> = attrs
                .iter()
                .filter(|a| model.has_attribute(a))
                .filter_map(|a| row.get(a).map(|v| (a.clone(), v.clone())))
                .collect();
            if picked.is_empty() {
                Value::Object(row.clone())
            } else {
                Value::Object(picked)
            }
        }
        None => Value::Object(row.clone()),
    }
}

fn sort_rows(rows: &mut [&Row], model: &EnhancedModel, order: Option<&[(String, SortOrder)]>) {
    let fields: Vec<(String, SortOrder)> = order
        .map(|o| {
            o.iter()
                .filter(|(f, _)| model.has_attribute(f))
                .cloned()
                .collect()
        })
        .filter(|o: &Vec<_>| !o.is_empty())
        .unwrap_or_else(|| vec![(model.primary_key.clone(), SortOrder::Asc)]);
    rows.sort_by(|a, b| {
        for (field, dir) in &fields {
            let left = a.get(field).unwrap_or(&Value::Null);
            let right = b.get(field).unwrap_or(&Value::Null);
            let ordering = compare(left, right).unwrap_or(Ordering::Equal);
            let ordering = match dir {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn includes_match(
    tables: &HashMap<String, Table>,
    model: &EnhancedModel,
    row: &Row,
    includes: &[ResolvedInclude],
) -> Result<bool, StoreError> {
    for include in includes {
        let target = &include.target;
        let related_rows = tables
            .get(&target.table)
            .map(|t| t.rows.as_slice())
            .unwrap_or(&[]);
        let passes = |related: &Row| -> Result<bool, StoreError> {
            if let Some(where_clause) = &include.where_clause {
                if !matches_where(related, where_clause)? {
                    return Ok(false);
                }
            }
            includes_match(tables, target, related, &include.include)
        };
        let related_to_row: Box<dyn Fn(&Row) -> bool> = match include.assoc.join_from(&model.name) {
            JoinSpec::ViewerKey { fk } => {
                let linked = row.get(&fk).cloned().unwrap_or(Value::Null);
                let pk = target.primary_key.clone();
                Box::new(move |related| {
                    !linked.is_null()
                        && loose_eq(related.get(&pk).unwrap_or(&Value::Null), &linked)
                })
            }
            JoinSpec::RelatedKey { fk } => {
                let our_id = row.get(&model.primary_key).cloned().unwrap_or(Value::Null);
                Box::new(move |related| {
                    loose_eq(related.get(&fk).unwrap_or(&Value::Null), &our_id)
                })
            }
            JoinSpec::Junction {
                through,
                viewer_key,
                related_key,
            } => {
                let our_id = row.get(&model.primary_key).cloned().unwrap_or(Value::Null);
                let linked: Vec<Value> = tables
                    .get(&through.to_lowercase())
                    .map(|t| {
                        t.rows
                            .iter()
                            .filter(|j| {
                                loose_eq(j.get(&viewer_key).unwrap_or(&Value::Null), &our_id)
                            })
                            .filter_map(|j| j.get(&related_key).cloned())
                            .collect()
                    })
                    .unwrap_or_default();
                let pk = target.primary_key.clone();
                Box::new(move |related| {
                    let id = related.get(&pk).unwrap_or(&Value::Null);
                    linked.iter().any(|l| loose_eq(id, l))
                })
            }
        };
        let mut any = false;
        for related in related_rows {
            if related_to_row(related) && passes(related)? {
                any = true;
                break;
            }
        }
        if !any {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Evaluate a canonicalized where-tree against a row. Unknown attributes are
/// treated as null, matching the SQL adapter's leniency.
fn matches_where(row: &Row, node: &Value) -> Result<bool, StoreError> {
    let Value::Object(map) = node else {
        return Err(StoreError::Unsupported("where must be an object".into()));
    };
    for (key, value) in map {
        let passed = match key.as_str() {
            "$and" => logical(row, value, true)?,
            "$or" => logical(row, value, false)?,
            field => field_matches(row, field, value)?,
        };
        if !passed {
            return Ok(false);
        }
    }
    Ok(true)
}

fn logical(row: &Row, value: &Value, all: bool) -> Result<bool, StoreError> {
    let clauses: Vec<Value> = match value {
        Value::Array(items) => items.clone(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Value::Object([(k.clone(), v.clone())].into_iter().collect()))
            .collect(),
        _ => {
            return Err(StoreError::Unsupported(
                "logical operator expects an object or array".into(),
            ))
        }
    };
    if clauses.is_empty() {
        return Ok(true);
    }
    let mut results = clauses.iter().map(|c| matches_where(row, c));
    if all {
        results.try_fold(true, |acc, r| Ok(acc && r?))
    } else {
        results.try_fold(false, |acc, r| Ok(acc || r?))
    }
}

fn field_matches(row: &Row, field: &str, condition: &Value) -> Result<bool, StoreError> {
    let value = row.get(field).unwrap_or(&Value::Null);
    match condition {
        Value::Null => Ok(value.is_null()),
        Value::Object(ops) => {
            for (op, operand) in ops {
                if !operator_matches(row, value, op, operand)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Value::Array(_) => operator_matches(row, value, "$in", condition),
        _ => Ok(loose_eq(value, condition)),
    }
}

fn operator_matches(
    row: &Row,
    value: &Value,
    op: &str,
    operand: &Value,
) -> Result<bool, StoreError> {
    Ok(match op {
        "$eq" => match operand {
            Value::Null => value.is_null(),
            _ => loose_eq(value, operand),
        },
        "$ne" => match operand {
            Value::Null => !value.is_null(),
            _ => !loose_eq(value, operand),
        },
        "$gt" => compare(value, operand) == Some(Ordering::Greater),
        "$gte" => matches!(
            compare(value, operand),
            Some(Ordering::Greater) | Some(Ordering::Equal)
        ),
        "$lt" => compare(value, operand) == Some(Ordering::Less),
        "$lte" => matches!(
            compare(value, operand),
            Some(Ordering::Less) | Some(Ordering::Equal)
        ),
        "$like" => like_matches(value, operand, false)?,
        "$notLike" => !like_matches(value, operand, false)?,
        "$iLike" => like_matches(value, operand, true)?,
        "$notILike" => !like_matches(value, operand, true)?,
        "$startsWith" => text_pair(value, operand)
            .map(|(v, o)| v.starts_with(&o))
            .unwrap_or(false),
        "$endsWith" => text_pair(value, operand)
            .map(|(v, o)| v.ends_with(&o))
            .unwrap_or(false),
        "$substring" => text_pair(value, operand)
            .map(|(v, o)| v.contains(&o))
            .unwrap_or(false),
        "$regexp" => regex_matches(value, operand, false)?,
        "$notRegexp" => !regex_matches(value, operand, false)?,
        "$iRegexp" => regex_matches(value, operand, true)?,
        "$notIRegexp" => !regex_matches(value, operand, true)?,
        "$in" => match operand {
            Value::Array(items) => items.iter().any(|item| loose_eq(value, item)),
            _ => return Err(StoreError::Unsupported("$in expects an array".into())),
        },
        "$notIn" => match operand {
            Value::Array(items) => !items.iter().any(|item| loose_eq(value, item)),
            _ => return Err(StoreError::Unsupported("$notIn expects an array".into())),
        },
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
            let inside = matches!(
                compare(value, low),
                Some(Ordering::Greater) | Some(Ordering::Equal)
            ) && matches!(
                compare(value, high),
                Some(Ordering::Less) | Some(Ordering::Equal)
            );
            if op == "$between" {
                inside
            } else {
                !inside
            }
        }
        "$is" => match operand {
            Value::Null => value.is_null(),
            Value::Bool(b) => value.as_bool() == Some(*b),
            _ => return Err(StoreError::Unsupported("$is expects null or boolean".into())),
        },
        "$not" => match operand {
            Value::Null => !value.is_null(),
            Value::Bool(b) => value.as_bool() != Some(*b),
            _ => !loose_eq(value, operand),
        },
        "$col" => {
            let Value::String(other) = operand else {
                return Err(StoreError::Unsupported("$col expects a column name".into()));
            };
            loose_eq(value, row.get(other).unwrap_or(&Value::Null))
        }
        "$contains" => match (value, operand) {
            (Value::Array(hay), Value::Array(needles)) => {
                needles.iter().all(|n| hay.iter().any(|h| loose_eq(h, n)))
            }
            (Value::Array(hay), needle) => hay.iter().any(|h| loose_eq(h, needle)),
            (Value::String(hay), Value::String(needle)) => hay.contains(needle.as_str()),
            _ => false,
        },
        "$contained" => match (value, operand) {
            (Value::Array(items), Value::Array(hay)) => {
                items.iter().all(|i| hay.iter().any(|h| loose_eq(h, i)))
            }
            _ => false,
        },
        "$overlap" => match (value, operand) {
            (Value::Array(a), Value::Array(b)) => {
                a.iter().any(|x| b.iter().any(|y| loose_eq(x, y)))
            }
            _ => false,
        },
        "$any" => match operand {
            Value::Array(items) => items.iter().any(|item| loose_eq(value, item)),
            _ => return Err(StoreError::Unsupported("$any expects an array".into())),
        },
        other => {
            return Err(StoreError::Unsupported(format!(
                "operator '{}' is not supported by the memory adapter",
                other
            )))
        }
    })
}

fn text_pair(value: &Value, operand: &Value) -> Option<(String, String)> {
    Some((value.as_str()?.to_string(), operand.as_str()?.to_string()))
}

fn like_matches(value: &Value, pattern: &Value, case_insensitive: bool) -> Result<bool, StoreError> {
    let Some((value, pattern)) = text_pair(value, pattern) else {
        return Ok(false);
    };
    let mut regex = String::with_capacity(pattern.len() + 4);
    if case_insensitive {
        regex.push_str("(?i)");
    }
    regex.push('^');
    for c in pattern.chars() {
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }
    regex.push('$');
    let re = Regex::new(&regex)
        .map_err(|e| StoreError::Unsupported(format!("bad LIKE pattern: {}", e)))?;
    Ok(re.is_match(&value))
}

fn regex_matches(value: &Value, pattern: &Value, case_insensitive: bool) -> Result<bool, StoreError> {
    let Some((value, pattern)) = text_pair(value, pattern) else {
        return Ok(false);
    };
    let pattern = if case_insensitive {
        format!("(?i){}", pattern)
    } else {
        pattern
    };
    let re = Regex::new(&pattern)
        .map_err(|e| StoreError::Unsupported(format!("bad regexp pattern: {}", e)))?;
    Ok(re.is_match(&value))
}

/// Equality with the looseness of wire data: numbers compare numerically,
/// numeric strings compare against numbers.
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x.as_f64().zip(y.as_f64()).map(|(x, y)| x == y).unwrap_or(false)
        }
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .zip(n.as_f64())
            .map(|(x, y)| x == y)
            .unwrap_or(false),
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::String(s), Value::Number(n)) => {
            s.trim().parse::<f64>().ok()?.partial_cmp(&n.as_f64()?)
        }
        (Value::Number(n), Value::String(s)) => {
            n.as_f64()?.partial_cmp(&s.trim().parse::<f64>().ok()?)
        }
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("row fixtures must be objects"),
        }
    }

    #[test]
    fn evaluates_canonical_operators() {
        let r = row(json!({ "name": "alpha", "score": 7, "tags": ["a", "b"] }));
        assert!(matches_where(&r, &json!({ "name": { "$like": "al%" } })).unwrap());
        assert!(matches_where(&r, &json!({ "score": { "$between": [5, 10] } })).unwrap());
        assert!(matches_where(&r, &json!({ "score": { "$notIn": [1, 2] } })).unwrap());
        assert!(matches_where(&r, &json!({ "tags": { "$contains": "a" } })).unwrap());
        assert!(matches_where(&r, &json!({ "name": { "$iLike": "%PH%" } })).unwrap());
        assert!(!matches_where(&r, &json!({ "name": { "$startsWith": "ph" } })).unwrap());
    }

    #[test]
    fn logical_operators_combine() {
        let r = row(json!({ "a": 1, "b": 2 }));
        assert!(matches_where(&r, &json!({ "$or": [{ "a": 5 }, { "b": 2 }] })).unwrap());
        assert!(!matches_where(&r, &json!({ "$and": [{ "a": 1 }, { "b": 3 }] })).unwrap());
    }

    #[test]
    fn loose_equality_bridges_strings_and_numbers() {
        assert!(loose_eq(&json!("5"), &json!(5)));
        assert!(loose_eq(&json!(5), &json!(5.0)));
        assert!(!loose_eq(&json!("5a"), &json!(5)));
    }
}
