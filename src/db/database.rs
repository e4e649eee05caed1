use futures::future::{join_all, try_join_all, BoxFuture};
use futures::FutureExt;
use serde_json::Value;
use tracing::warn;

use super::executor::{Executor, Record, RowSet};
use super::relation::RelationTarget;
use crate::ast::{
    compile_query, count_statement, select_statement, Bindings, Condition, Dialect, OrderBy, Query,
    RelationFetch, SqlParam, Statement,
};
use crate::error::{AdapterError, Result};
use crate::model::{
    list_table, translation_table, Field, FieldKind, FieldType, ModelRegistry, Schema,
    LIST_OWNER_COLUMN,
};

/// Rows returned by a read or write operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub items: Vec<Record>,
}

impl QueryResult {
    pub fn first(&self) -> Option<&Record> {
        self.items.first()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Keys of the rows a delete removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteResult {
    pub ids: Vec<Value>,
}

/// Read options for the lookups that build their own condition.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub fields: Vec<String>,
    pub relations: Vec<RelationFetch>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub page: Option<u64>,
}

impl QueryOptions {
    pub fn fetch(mut self, relation: impl Into<String>) -> Self {
        self.relations.push(RelationFetch::Name(relation.into()));
        self
    }

    fn into_query(self, model: &str, condition: Option<Condition>) -> Query {
        Query {
            model: model.to_string(),
            fields: self.fields,
            condition,
            relations: self.relations,
            joins: Vec::new(),
            order_by: self.order_by,
            limit: self.limit,
            offset: self.offset,
            page: self.page,
        }
    }
}

/// A write value split by where each part is stored.
#[derive(Default)]
pub(crate) struct ValueParts<'a> {
    pub scalars: Vec<(&'a Field, &'a Value)>,
    pub relations: Vec<(&'a Field, &'a Value)>,
    pub lists: Vec<(&'a Field, &'a Value)>,
    pub translations: Vec<(&'a Field, &'a Value)>,
}

pub(crate) fn split_value<'a>(schema: &'a Schema, value: &'a Record) -> ValueParts<'a> {
    let mut parts = ValueParts::default();
    for field in &schema.fields {
        let Some(v) = value.get(&field.name) else {
            continue;
        };
        match field.kind() {
            FieldKind::Scalar(_) if field.is_translated() => parts.translations.push((field, v)),
            FieldKind::Scalar(_) => parts.scalars.push((field, v)),
            FieldKind::List(_) => parts.lists.push((field, v)),
            FieldKind::OneToOne(_) | FieldKind::OneToMany(_) | FieldKind::ManyToMany(_) => {
                parts.relations.push((field, v))
            }
        }
    }
    parts
}

/// Parameter for a scalar column value.
pub(crate) fn bind_value(field: &Field, value: &Value) -> SqlParam {
    match field.field_type() {
        FieldType::Object => SqlParam::object(value),
        _ => SqlParam::from_json(value),
    }
}

/// Whether `value` can stand for a stored row's key.
pub(crate) fn usable_id(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_i64().is_some_and(|i| i > 0) || n.as_u64().is_some_and(|u| u > 0),
        Value::String(s) => s.trim().parse::<i64>().is_ok_and(|i| i > 0),
        _ => false,
    }
}

/// Keys produced by an INSERT: the `RETURNING` rows, or the consecutive
/// range starting at the reported insert id.
pub(crate) fn inserted_ids(result: &RowSet, pk: &str) -> Vec<Value> {
    if !result.rows.is_empty() {
        return result
            .rows
            .iter()
            .filter_map(|row| row.get(pk).cloned())
            .collect();
    }
    match result.insert_id {
        Some(first) => (0..result.affected_rows as i64)
            .map(|offset| Value::from(first + offset))
            .collect(),
        None => Vec::new(),
    }
}

fn count_value(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or_default(),
        Some(Value::String(s)) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    }
}

/// Relational storage adapter: registered models persisted through an
/// [`Executor`] in one SQL dialect.
pub struct Database<E> {
    pub(crate) executor: E,
    pub(crate) registry: ModelRegistry,
    pub(crate) dialect: Dialect,
}

impl<E: Executor> Database<E> {
    pub fn new(executor: E, registry: ModelRegistry, dialect: Dialect) -> Self {
        Self {
            executor,
            registry,
            dialect,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub(crate) fn bindings(&self) -> Bindings {
        Bindings::new(self.dialect)
    }

    pub(crate) fn quote(&self, ident: &str) -> String {
        self.dialect.quote(ident)
    }

    pub(crate) async fn run(&self, statement: Statement) -> Result<RowSet> {
        Ok(self
            .executor
            .execute(&statement.sql, &statement.params)
            .await?)
    }

    /// Run raw SQL.
    pub async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<RowSet> {
        Ok(self.executor.execute(sql, params).await?)
    }

    /// Close the pool.
    pub async fn close(&self) -> bool {
        self.executor.close().await
    }

    // --- reads ---

    pub async fn find_by_id(
        &self,
        model: &str,
        id: &Value,
        options: QueryOptions,
    ) -> Result<QueryResult> {
        let pk = self.registry.require(model)?.primary_key();
        let query = options.into_query(model, Some(Condition::eq(pk, id.clone())));
        self.find_by_query(&query).await
    }

    /// Rows whose fields equal every entry of `values`.
    pub async fn find_by_model_values(
        &self,
        model: &str,
        values: &Record,
        options: QueryOptions,
    ) -> Result<QueryResult> {
        let query = options.into_query(model, values_condition(values));
        self.find_by_query(&query).await
    }

    pub async fn find_by_query(&self, query: &Query) -> Result<QueryResult> {
        async {
            let statement = select_statement(&self.registry, query, self.dialect)?;
            let rows = self.run(statement).await?.rows;
            let items = self.normalize(query, rows).await?;
            Ok::<_, AdapterError>(QueryResult { items })
        }
        .await
        .map_err(|e| e.within(AdapterError::Query))
    }

    /// Number of rows matching the query's condition and joins.
    pub async fn count(&self, query: &Query) -> Result<u64> {
        async {
            let statement = count_statement(&self.registry, query, self.dialect)?;
            let result = self.run(statement).await?;
            Ok::<_, AdapterError>(count_value(result.rows.first().and_then(|row| row.get("total"))))
        }
        .await
        .map_err(|e| e.within(AdapterError::Query))
    }

    pub async fn count_by_model_values(&self, model: &str, values: &Record) -> Result<u64> {
        self.count(&QueryOptions::default().into_query(model, values_condition(values)))
            .await
    }

    /// Fetch rows by key, in key order. No keys means no rows.
    pub(crate) async fn find_by_ids(&self, model: &str, ids: &[Value]) -> Result<QueryResult> {
        if ids.is_empty() {
            return Ok(QueryResult::default());
        }
        let pk = self.registry.primary_key(model);
        let condition = Condition::or(ids.iter().map(|id| Condition::eq(pk, id.clone())).collect());
        let query = Query::new(model).filter(condition).order_by(pk, true);
        self.find_by_query(&query).await
    }

    /// Keys of the rows matching `condition`. Fields the model does not
    /// store are elided, so an empty condition matches every row.
    async fn matching_ids(&self, model: &str, condition: &Condition) -> Result<Vec<Value>> {
        let pk = self.registry.require(model)?.primary_key();
        let query = Query::new(model).select([pk]).filter(condition.clone());
        let parts = compile_query(&self.registry, &query, self.dialect)?;
        if parts.condition.is_empty() {
            warn!(model, "condition references no stored field, matching every row");
        }
        let rows = self.run(parts.select()).await?.rows;
        Ok(rows.into_iter().filter_map(|mut row| row.remove(pk)).collect())
    }

    // --- writes ---

    /// Insert one entity with its relations, lists and translations, then
    /// return it as stored.
    pub fn insert_one<'a>(
        &'a self,
        model: &'a str,
        value: &'a Record,
    ) -> BoxFuture<'a, Result<QueryResult>> {
        async move {
            let schema = self.registry.require(model)?;
            let pk = schema.primary_key();
            let parts = split_value(schema, value);

            let columns: Vec<&(&Field, &Value)> = parts
                .scalars
                .iter()
                .filter(|(field, v)| !(field.name == pk && v.is_null()))
                .collect();
            let mut binds = self.bindings();
            let mut sql = if columns.is_empty() {
                self.dialect.insert_defaults(model)
            } else {
                let names: Vec<String> = columns.iter().map(|(f, _)| self.quote(&f.name)).collect();
                let values = binds.push_all(columns.iter().map(|(f, v)| bind_value(f, v)));
                format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    self.quote(model),
                    names.join(", "),
                    values
                )
            };
            if let Some(returning) = self.dialect.returning(pk) {
                sql = format!("{} {}", sql, returning);
            }

            let result = self.run(Statement::new(sql, binds)).await?;
            let id = inserted_ids(&result, pk)
                .into_iter()
                .next()
                .or_else(|| value.get(pk).filter(|v| !v.is_null()).cloned())
                .ok_or_else(|| AdapterError::Insert(format!("no key was generated for {}", model)))?;

            let mut writes: Vec<BoxFuture<'_, Result<()>>> = Vec::new();
            for (field, related) in &parts.relations {
                writes.push(self.add_relation(model, &id, &field.name, related));
            }
            for (field, values) in &parts.lists {
                writes.push(self.update_list(model, &id, &field.name, values).boxed());
            }
            if !parts.translations.is_empty() {
                writes.push(self.write_translations(model, &id, &parts.translations).boxed());
            }
            try_join_all(writes).await?;

            self.find_by_id(model, &id, QueryOptions::default()).await
        }
        .map(|result| result.map_err(|e| e.within(AdapterError::Insert)))
        .boxed()
    }

    /// Insert several rows with one statement. Only scalar columns are
    /// written; every provided column is filled for every row, falling back
    /// to the field default and then NULL.
    pub fn insert_all<'a>(
        &'a self,
        model: &'a str,
        values: &'a [Record],
    ) -> BoxFuture<'a, Result<QueryResult>> {
        async move {
            let schema = self.registry.require(model)?;
            if values.is_empty() {
                return Ok(QueryResult::default());
            }
            let pk = schema.primary_key();
            let keyed = values
                .iter()
                .all(|row| row.get(pk).is_some_and(|v| !v.is_null()));
            let columns: Vec<&Field> = schema
                .own_columns()
                .filter(|f| matches!(f.kind(), FieldKind::Scalar(_)))
                .filter(|f| if f.name == pk { keyed } else { values.iter().any(|row| row.contains_key(&f.name)) })
                .collect();

            if columns.is_empty() {
                let mut ids = Vec::new();
                for _ in values {
                    let mut sql = self.dialect.insert_defaults(model);
                    if let Some(returning) = self.dialect.returning(pk) {
                        sql = format!("{} {}", sql, returning);
                    }
                    ids.extend(inserted_ids(&self.run(Statement::raw(sql)).await?, pk));
                }
                return self.find_by_ids(model, &ids).await;
            }

            let null = Value::Null;
            let mut binds = self.bindings();
            let rows: Vec<String> = values
                .iter()
                .map(|row| {
                    let placeholders: Vec<String> = columns
                        .iter()
                        .map(|field| {
                            let value = row
                                .get(&field.name)
                                .or(field.properties.default.as_ref())
                                .unwrap_or(&null);
                            binds.push(bind_value(field, value))
                        })
                        .collect();
                    format!("({})", placeholders.join(", "))
                })
                .collect();
            let names: Vec<String> = columns.iter().map(|f| self.quote(&f.name)).collect();
            let mut sql = format!(
                "INSERT INTO {} ({}) VALUES {}",
                self.quote(model),
                names.join(", "),
                rows.join(", ")
            );
            if let Some(returning) = self.dialect.returning(pk) {
                sql = format!("{} {}", sql, returning);
            }

            let result = self.run(Statement::new(sql, binds)).await?;
            let ids = inserted_ids(&result, pk);
            self.find_by_ids(model, &ids).await
        }
        .map(|result| result.map_err(|e| e.within(AdapterError::Insert)))
        .boxed()
    }

    /// Update the entity identified by the value's primary key. Relation,
    /// list and translation writes run first, then the row itself.
    pub async fn update_one(&self, model: &str, value: &Record) -> Result<QueryResult> {
        self.update_one_inner(model, value)
            .await
            .map_err(|e| e.within(AdapterError::Update))
    }

    async fn update_one_inner(&self, model: &str, value: &Record) -> Result<QueryResult> {
        let schema = self.registry.require(model)?;
        let pk = schema.primary_key();
        let id = value
            .get(pk)
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| AdapterError::Validation(format!("{} value has no {}", model, pk)))?;
        let parts = split_value(schema, value);

        let mut writes: Vec<BoxFuture<'_, Result<()>>> = Vec::new();
        for (field, related) in &parts.relations {
            match field.kind() {
                FieldKind::ManyToMany(_) => {
                    writes.push(self.replace_links(model, &id, &field.name, related).boxed())
                }
                _ => writes.push(self.add_relation(model, &id, &field.name, related)),
            }
        }
        for (field, values) in &parts.lists {
            writes.push(self.update_list(model, &id, &field.name, values).boxed());
        }
        if !parts.translations.is_empty() {
            writes.push(self.write_translations(model, &id, &parts.translations).boxed());
        }
        try_join_all(writes).await?;

        let assigned: Vec<&(&Field, &Value)> =
            parts.scalars.iter().filter(|(f, _)| f.name != pk).collect();
        if !assigned.is_empty() {
            let mut binds = self.bindings();
            let assignments: Vec<String> = assigned
                .iter()
                .map(|(f, v)| format!("{} = {}", self.quote(&f.name), binds.push(bind_value(f, v))))
                .collect();
            let sql = format!(
                "UPDATE {} SET {} WHERE {} = {}",
                self.quote(model),
                assignments.join(", "),
                self.quote(pk),
                binds.push(SqlParam::id(&id))
            );
            self.run(Statement::new(sql, binds)).await?;
        }

        self.find_by_id(model, &id, QueryOptions::default()).await
    }

    /// Set the scalar columns of `values` on every row matching `condition`
    /// and return the updated rows.
    pub async fn update_all(
        &self,
        model: &str,
        values: &Record,
        condition: &Condition,
    ) -> Result<QueryResult> {
        async {
            let schema = self.registry.require(model)?;
            let pk = schema.primary_key();
            let ids = self.matching_ids(model, condition).await?;
            if ids.is_empty() {
                return Ok(QueryResult::default());
            }

            let parts = split_value(schema, values);
            let assigned: Vec<&(&Field, &Value)> =
                parts.scalars.iter().filter(|(f, _)| f.name != pk).collect();
            if !assigned.is_empty() {
                let mut binds = self.bindings();
                let assignments: Vec<String> = assigned
                    .iter()
                    .map(|(f, v)| format!("{} = {}", self.quote(&f.name), binds.push(bind_value(f, v))))
                    .collect();
                let keys = binds.push_all(ids.iter().map(SqlParam::id));
                let sql = format!(
                    "UPDATE {} SET {} WHERE {} IN ({})",
                    self.quote(model),
                    assignments.join(", "),
                    self.quote(pk),
                    keys
                );
                self.run(Statement::new(sql, binds)).await?;
            }
            self.find_by_ids(model, &ids).await
        }
        .await
        .map_err(|e| e.within(AdapterError::Update))
    }

    /// Add `delta` to a numeric column and return the updated row.
    pub async fn increase(
        &self,
        model: &str,
        id: &Value,
        field: &str,
        delta: impl Into<Value>,
    ) -> Result<QueryResult> {
        let delta = delta.into();
        async {
            let schema = self.registry.require(model)?;
            let numeric = schema.get_field(field).is_some_and(|f| {
                !f.is_translated() && (f.field_type().is_integral() || f.field_type().is_decimal())
            });
            if !numeric || !delta.is_number() {
                return Err(AdapterError::Validation(format!(
                    "{}.{} cannot be increased by {}",
                    model, field, delta
                )));
            }
            let mut binds = self.bindings();
            let column = self.quote(field);
            let sql = format!(
                "UPDATE {} SET {} = {} + {} WHERE {} = {}",
                self.quote(model),
                column,
                column,
                binds.push(SqlParam::from_json(&delta)),
                self.quote(schema.primary_key()),
                binds.push(SqlParam::id(id))
            );
            self.run(Statement::new(sql, binds)).await?;
            self.find_by_id(model, id, QueryOptions::default()).await
        }
        .await
        .map_err(|e| e.within(AdapterError::Update))
    }

    // --- deletes ---

    /// Delete one entity, then clear its relations, lists and translation.
    /// Cleanup failures are logged and do not fail the delete.
    pub fn delete_one<'a>(
        &'a self,
        model: &'a str,
        id: &'a Value,
    ) -> BoxFuture<'a, Result<DeleteResult>> {
        async move {
            let schema = self.registry.require(model)?;
            let pk = schema.primary_key();

            // Weak one-to-one/one-to-many targets live in the row itself.
            let weak_columns: Vec<&Field> = schema
                .relation_fields()
                .filter(|f| {
                    matches!(f.kind(), FieldKind::OneToOne(r) | FieldKind::OneToMany(r) if r.weak)
                })
                .collect();
            let mut owned = Record::new();
            if !weak_columns.is_empty() {
                let mut binds = self.bindings();
                let names: Vec<String> = weak_columns.iter().map(|f| self.quote(&f.name)).collect();
                let sql = format!(
                    "SELECT {} FROM {} WHERE {} = {}",
                    names.join(", "),
                    self.quote(model),
                    self.quote(pk),
                    binds.push(SqlParam::id(id))
                );
                if let Some(row) = self.run(Statement::new(sql, binds)).await?.rows.pop() {
                    owned = row;
                }
            }

            let mut binds = self.bindings();
            let sql = format!(
                "DELETE FROM {} WHERE {} = {}",
                self.quote(model),
                self.quote(pk),
                binds.push(SqlParam::id(id))
            );
            let deleted = self.run(Statement::new(sql, binds)).await?.affected_rows;
            if deleted == 0 {
                return Ok(DeleteResult::default());
            }

            let mut cleanup: Vec<BoxFuture<'_, Result<()>>> = Vec::new();
            for field in schema.relation_fields() {
                match field.kind() {
                    FieldKind::ManyToMany(_) => cleanup.push(self.remove_relation(
                        model,
                        id,
                        &field.name,
                        RelationTarget::All,
                    )),
                    _ => match owned.get(&field.name) {
                        Some(current) if usable_id(current) => cleanup.push(self.remove_relation(
                            model,
                            id,
                            &field.name,
                            RelationTarget::Ids(vec![current.clone()]),
                        )),
                        _ => {}
                    },
                }
            }
            for field in schema.list_fields() {
                cleanup.push(self.delete_owned_rows(list_table(model, &field.name), LIST_OWNER_COLUMN, id).boxed());
            }
            if schema.translated_fields().next().is_some() {
                cleanup.push(self.delete_owned_rows(translation_table(model), pk, id).boxed());
            }
            for result in join_all(cleanup).await {
                if let Err(err) = result {
                    warn!(model, error = %err, "relation cleanup after delete failed");
                }
            }

            Ok::<_, AdapterError>(DeleteResult {
                ids: vec![id.clone()],
            })
        }
        .map(|result| result.map_err(|e| e.within(AdapterError::Delete)))
        .boxed()
    }

    /// Delete every row matching `condition`. Relations of the deleted rows
    /// are left untouched.
    pub async fn delete_all(&self, model: &str, condition: &Condition) -> Result<DeleteResult> {
        async {
            let pk = self.registry.require(model)?.primary_key();
            let ids = self.matching_ids(model, condition).await?;
            if ids.is_empty() {
                return Ok(DeleteResult::default());
            }
            let mut binds = self.bindings();
            let keys = binds.push_all(ids.iter().map(SqlParam::id));
            let sql = format!(
                "DELETE FROM {} WHERE {} IN ({})",
                self.quote(model),
                self.quote(pk),
                keys
            );
            self.run(Statement::new(sql, binds)).await?;
            Ok::<_, AdapterError>(DeleteResult { ids })
        }
        .await
        .map_err(|e| e.within(AdapterError::Delete))
    }

    async fn delete_owned_rows(&self, table: String, column: &str, id: &Value) -> Result<()> {
        let mut binds = self.bindings();
        let sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            self.quote(&table),
            self.quote(column),
            binds.push(SqlParam::id(id))
        );
        self.run(Statement::new(sql, binds)).await?;
        Ok(())
    }
}

fn values_condition(values: &Record) -> Option<Condition> {
    if values.is_empty() {
        return None;
    }
    Some(Condition::and(
        values
            .iter()
            .map(|(field, value)| Condition::eq(field.clone(), value.clone()))
            .collect(),
    ))
}
