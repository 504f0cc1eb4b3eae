//! PostgreSQL datastore adapter over sqlx. Rows travel as JSON objects; all
//! statements are parameterized through [`QueryBuf`].

use crate::association::{Association, JoinSpec};
use crate::error::StoreError;
use crate::model::EnhancedModel;
use crate::query::QueryDescriptor;
use crate::store::sql::{
    order_clause, page_clause, quoted, render_includes, render_where, select_columns, PgBindValue,
    QueryBuf,
};
use crate::store::{Datastore, ResolvedInclude, Row};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        PostgresStore { pool }
    }

    async fn query_many(&self, q: &QueryBuf) -> Result<Vec<Value>, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn query_one(&self, q: &QueryBuf) -> Result<Option<Value>, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let row = query.fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(row_to_json))
    }

    async fn query_count(&self, q: &QueryBuf) -> Result<u64, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar::<_, i64>(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let n = query.fetch_one(&self.pool).await?;
        Ok(n.max(0) as u64)
    }

    async fn execute(&self, q: &QueryBuf) -> Result<u64, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// WHERE tail from descriptor predicate plus include EXISTS clauses; the
    /// source-row condition is already in `conditions`.
    fn filter_conditions(
        q: &mut QueryBuf,
        model: &EnhancedModel,
        alias: &str,
        query: &QueryDescriptor,
        includes: &[ResolvedInclude],
        conditions: &mut Vec<String>,
    ) -> Result<(), StoreError> {
        if let Some(where_clause) = &query.where_clause {
            conditions.push(render_where(q, model, alias, where_clause)?);
        }
        let mut depth = 0;
        conditions.extend(render_includes(q, model, alias, includes, &mut depth)?);
        Ok(())
    }

    /// Condition restricting target rows to those related to `source_id`.
    fn relation_condition(
        q: &mut QueryBuf,
        source: &EnhancedModel,
        assoc: &Association,
        source_id: &Value,
        target: &EnhancedModel,
        alias: &str,
    ) -> String {
        let n = q.push_param(source_id.clone());
        match assoc.join_from(&source.name) {
            JoinSpec::ViewerKey { fk } => format!(
                "{}.{} = (SELECT s.{} FROM {} s WHERE s.{} = ${})",
                alias,
                quoted(&target.primary_key),
                quoted(&fk),
                quoted(&source.table),
                quoted(&source.primary_key),
                n
            ),
            JoinSpec::RelatedKey { fk } => format!("{}.{} = ${}", alias, quoted(&fk), n),
            JoinSpec::Junction {
                through,
                viewer_key,
                related_key,
            } => format!(
                "{}.{} IN (SELECT j.{} FROM {} j WHERE j.{} = ${})",
                alias,
                quoted(&target.primary_key),
                quoted(&related_key),
                quoted(&through.to_lowercase()),
                quoted(&viewer_key),
                n
            ),
        }
    }
}

#[async_trait]
impl Datastore for PostgresStore {
    async fn find_all(
        &self,
        model: &EnhancedModel,
        query: &QueryDescriptor,
        includes: &[ResolvedInclude],
    ) -> Result<Vec<Value>, StoreError> {
        let mut q = QueryBuf::new();
        let mut conditions = Vec::new();
        Self::filter_conditions(&mut q, model, "t", query, includes, &mut conditions)?;
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        q.sql = format!(
            "SELECT {} FROM {} t{}{}{}",
            select_columns(model, query.attributes.as_deref()),
            quoted(&model.table),
            where_clause,
            order_clause(model, query.order.as_deref()),
            page_clause(query)
        );
        self.query_many(&q).await
    }

    async fn find_by_id(
        &self,
        model: &EnhancedModel,
        id: &Value,
    ) -> Result<Option<Value>, StoreError> {
        let mut q = QueryBuf::new();
        q.params.push(id.clone());
        q.sql = format!(
            "SELECT {} FROM {} t WHERE t.{} = $1",
            select_columns(model, None),
            quoted(&model.table),
            quoted(&model.primary_key)
        );
        self.query_one(&q).await
    }

    async fn count(
        &self,
        model: &EnhancedModel,
        query: &QueryDescriptor,
        includes: &[ResolvedInclude],
    ) -> Result<u64, StoreError> {
        let mut q = QueryBuf::new();
        let mut conditions = Vec::new();
        Self::filter_conditions(&mut q, model, "t", query, includes, &mut conditions)?;
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        q.sql = format!(
            "SELECT COUNT(*) FROM {} t{}",
            quoted(&model.table),
            where_clause
        );
        self.query_count(&q).await
    }

    async fn create(&self, model: &EnhancedModel, body: &Row) -> Result<Value, StoreError> {
        let mut q = QueryBuf::new();
        let mut cols = Vec::new();
        let mut placeholders = Vec::new();
        for attr in model.attributes() {
            let Some(value) = body.get(&attr.name) else {
                continue;
            };
            let n = q.push_param(value.clone());
            cols.push(quoted(&attr.name));
            placeholders.push(format!("${}", n));
        }
        let returning = select_columns(model, None);
        q.sql = if cols.is_empty() {
            format!(
                "INSERT INTO {} DEFAULT VALUES RETURNING {}",
                quoted(&model.table),
                returning
            )
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                quoted(&model.table),
                cols.join(", "),
                placeholders.join(", "),
                returning
            )
        };
        self.query_one(&q).await?.ok_or(StoreError::NotFound)
    }

    async fn update(
        &self,
        model: &EnhancedModel,
        id: &Value,
        body: &Row,
    ) -> Result<Option<Value>, StoreError> {
        let mut q = QueryBuf::new();
        let mut sets = Vec::new();
        for (name, value) in body {
            if *name == model.primary_key || !model.has_attribute(name) {
                continue;
            }
            let n = q.push_param(value.clone());
            sets.push(format!("{} = ${}", quoted(name), n));
        }
        let returning = select_columns(model, None);
        if sets.is_empty() {
            q.params.push(id.clone());
            q.sql = format!(
                "SELECT {} FROM {} t WHERE t.{} = $1",
                returning,
                quoted(&model.table),
                quoted(&model.primary_key)
            );
            return self.query_one(&q).await;
        }
        let id_param = q.push_param(id.clone());
        q.sql = format!(
            "UPDATE {} SET {} WHERE {} = ${} RETURNING {}",
            quoted(&model.table),
            sets.join(", "),
            quoted(&model.primary_key),
            id_param,
            returning
        );
        self.query_one(&q).await
    }

    async fn destroy(&self, model: &EnhancedModel, id: &Value) -> Result<bool, StoreError> {
        let mut q = QueryBuf::new();
        q.params.push(id.clone());
        q.sql = format!(
            "DELETE FROM {} WHERE {} = $1",
            quoted(&model.table),
            quoted(&model.primary_key)
        );
        Ok(self.execute(&q).await? > 0)
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
        let mut q = QueryBuf::new();
        let mut conditions = vec![Self::relation_condition(
            &mut q, source, assoc, source_id, target, "t",
        )];
        Self::filter_conditions(&mut q, target, "t", query, includes, &mut conditions)?;
        q.sql = format!(
            "SELECT {} FROM {} t WHERE {}{}{}",
            select_columns(target, query.attributes.as_deref()),
            quoted(&target.table),
            conditions.join(" AND "),
            order_clause(target, query.order.as_deref()),
            page_clause(query)
        );
        self.query_many(&q).await
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
        let mut q = QueryBuf::new();
        let mut conditions = vec![Self::relation_condition(
            &mut q, source, assoc, source_id, target, "t",
        )];
        Self::filter_conditions(&mut q, target, "t", query, includes, &mut conditions)?;
        q.sql = format!(
            "SELECT COUNT(*) FROM {} t WHERE {}",
            quoted(&target.table),
            conditions.join(" AND ")
        );
        self.query_count(&q).await
    }

    async fn relation_create(
        &self,
        source: &EnhancedModel,
        assoc: &Association,
        source_id: &Value,
        target: &EnhancedModel,
        body: &Row,
    ) -> Result<Value, StoreError> {
        match assoc.join_from(&source.name) {
            JoinSpec::RelatedKey { fk } => {
                let mut body = body.clone();
                body.insert(fk, source_id.clone());
                self.create(target, &body).await
            }
            JoinSpec::ViewerKey { fk } => {
                let created = self.create(target, body).await?;
                let new_id = created
                    .get(&target.primary_key)
                    .cloned()
                    .ok_or(StoreError::NotFound)?;
                let mut q = QueryBuf::new();
                let id_param = q.push_param(new_id);
                let src_param = q.push_param(source_id.clone());
                q.sql = format!(
                    "UPDATE {} SET {} = ${} WHERE {} = ${}",
                    quoted(&source.table),
                    quoted(&fk),
                    id_param,
                    quoted(&source.primary_key),
                    src_param
                );
                if self.execute(&q).await? == 0 {
                    return Err(StoreError::NotFound);
                }
                Ok(created)
            }
            JoinSpec::Junction {
                through,
                viewer_key,
                related_key,
            } => {
                let created = self.create(target, body).await?;
                let new_id = created
                    .get(&target.primary_key)
                    .cloned()
                    .ok_or(StoreError::NotFound)?;
                let mut q = QueryBuf::new();
                let src_param = q.push_param(source_id.clone());
                let tgt_param = q.push_param(new_id);
                q.sql = format!(
                    "INSERT INTO {} ({}, {}) VALUES (${}, ${})",
                    quoted(&through.to_lowercase()),
                    quoted(&viewer_key),
                    quoted(&related_key),
                    src_param,
                    tgt_param
                );
                self.execute(&q).await?;
                Ok(created)
            }
        }
    }

    async fn relation_link(
        &self,
        source: &EnhancedModel,
        assoc: &Association,
        source_id: &Value,
        target: &EnhancedModel,
        target_id: &Value,
    ) -> Result<(), StoreError> {
        let mut q = QueryBuf::new();
        match assoc.join_from(&source.name) {
            JoinSpec::ViewerKey { fk } => {
                let tgt = q.push_param(target_id.clone());
                let src = q.push_param(source_id.clone());
                q.sql = format!(
                    "UPDATE {} SET {} = ${} WHERE {} = ${}",
                    quoted(&source.table),
                    quoted(&fk),
                    tgt,
                    quoted(&source.primary_key),
                    src
                );
            }
            JoinSpec::RelatedKey { fk } => {
                let src = q.push_param(source_id.clone());
                let tgt = q.push_param(target_id.clone());
                q.sql = format!(
                    "UPDATE {} SET {} = ${} WHERE {} = ${}",
                    quoted(&target.table),
                    quoted(&fk),
                    src,
                    quoted(&target.primary_key),
                    tgt
                );
            }
            JoinSpec::Junction {
                through,
                viewer_key,
                related_key,
            } => {
                let src = q.push_param(source_id.clone());
                let tgt = q.push_param(target_id.clone());
                let table = quoted(&through.to_lowercase());
                q.sql = format!(
                    "INSERT INTO {table} ({vk}, {rk}) SELECT ${src}, ${tgt} \
                     WHERE NOT EXISTS (SELECT 1 FROM {table} WHERE {vk} = ${src} AND {rk} = ${tgt})",
                    table = table,
                    vk = quoted(&viewer_key),
                    rk = quoted(&related_key),
                    src = src,
                    tgt = tgt
                );
            }
        }
        self.execute(&q).await?;
        Ok(())
    }

    async fn relation_unlink(
        &self,
        source: &EnhancedModel,
        assoc: &Association,
        source_id: &Value,
        target: &EnhancedModel,
        target_id: Option<&Value>,
    ) -> Result<bool, StoreError> {
        let mut q = QueryBuf::new();
        match assoc.join_from(&source.name) {
            JoinSpec::ViewerKey { fk } => {
                let src = q.push_param(source_id.clone());
                match target_id {
                    Some(tid) => {
                        let tgt = q.push_param(tid.clone());
                        q.sql = format!(
                            "UPDATE {} SET {} = NULL WHERE {} = ${} AND {} = ${}",
                            quoted(&source.table),
                            quoted(&fk),
                            quoted(&source.primary_key),
                            src,
                            quoted(&fk),
                            tgt
                        );
                    }
                    None => {
                        q.sql = format!(
                            "UPDATE {} SET {} = NULL WHERE {} = ${} AND {} IS NOT NULL",
                            quoted(&source.table),
                            quoted(&fk),
                            quoted(&source.primary_key),
                            src,
                            quoted(&fk)
                        );
                    }
                }
            }
            JoinSpec::RelatedKey { fk } => {
                let src = q.push_param(source_id.clone());
                match target_id {
                    Some(tid) => {
                        let tgt = q.push_param(tid.clone());
                        q.sql = format!(
                            "UPDATE {} SET {} = NULL WHERE {} = ${} AND {} = ${}",
                            quoted(&target.table),
                            quoted(&fk),
                            quoted(&fk),
                            src,
                            quoted(&target.primary_key),
                            tgt
                        );
                    }
                    None => {
                        q.sql = format!(
                            "UPDATE {} SET {} = NULL WHERE {} = ${}",
                            quoted(&target.table),
                            quoted(&fk),
                            quoted(&fk),
                            src
                        );
                    }
                }
            }
            JoinSpec::Junction {
                through,
                viewer_key,
                related_key,
            } => {
                let src = q.push_param(source_id.clone());
                match target_id {
                    Some(tid) => {
                        let tgt = q.push_param(tid.clone());
                        q.sql = format!(
                            "DELETE FROM {} WHERE {} = ${} AND {} = ${}",
                            quoted(&through.to_lowercase()),
                            quoted(&viewer_key),
                            src,
                            quoted(&related_key),
                            tgt
                        );
                    }
                    None => {
                        q.sql = format!(
                            "DELETE FROM {} WHERE {} = ${}",
                            quoted(&through.to_lowercase()),
                            quoted(&viewer_key),
                            src
                        );
                    }
                }
            }
        }
        Ok(self.execute(&q).await? > 0)
    }

    async fn relation_has(
        &self,
        source: &EnhancedModel,
        assoc: &Association,
        source_id: &Value,
        target: &EnhancedModel,
        target_id: &Value,
    ) -> Result<bool, StoreError> {
        let mut q = QueryBuf::new();
        let condition = Self::relation_condition(&mut q, source, assoc, source_id, target, "t");
        let tgt = q.push_param(target_id.clone());
        q.sql = format!(
            "SELECT COUNT(*) FROM {} t WHERE {} AND t.{} = ${}",
            quoted(&target.table),
            condition,
            quoted(&target.primary_key),
            tgt
        );
        Ok(self.query_count(&q).await? > 0)
    }
}

fn row_to_json(row: &sqlx::postgres::PgRow) -> Value {
    use sqlx::Column;
    use sqlx::Row as _;
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

fn cell_to_value(row: &sqlx::postgres::PgRow, name: &str) -> Value {
    use sqlx::Row as _;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
