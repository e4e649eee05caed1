//! Relation engine: writes that maintain foreign-key columns, join tables,
//! list tables and translation rows around an owning entity.
//!
//! One-to-one and one-to-many relations store the related key in the
//! owner's own column. Many-to-many relations store one row per link in the
//! `<Model>Has<Field>` join table.

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use serde_json::Value;

use super::database::{bind_value, usable_id, Database};
use super::executor::{Executor, Record};
use crate::ast::{select_statement, Condition, Query, SqlParam, Statement};
use crate::error::{AdapterError, Result};
use crate::model::{
    list_table, translation_table, Field, FieldKind, JoinTable, Relation, LIST_OWNER_COLUMN,
    LIST_VALUE_COLUMN,
};

/// Which related entities a removal applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationTarget {
    All,
    Ids(Vec<Value>),
    /// Related rows matching a condition on the related model.
    Matching(Condition),
}

impl<E: Executor> Database<E> {
    fn relation_field<'a>(&'a self, model: &str, field: &str) -> Result<(&'a Field, &'a Relation)> {
        let schema = self.registry.require(model)?;
        let field = schema.get_field(field).ok_or_else(|| {
            AdapterError::Validation(format!("{} has no field {}", model, field))
        })?;
        let relation = field.kind().relation().ok_or_else(|| {
            AdapterError::Validation(format!("{}.{} is not a relation", model, field.name))
        })?;
        Ok((field, relation))
    }

    /// Link `value` to the entity `owner_id` of `model` through `field`.
    ///
    /// `value` is a key, an object carrying the related key, or (many-to-many)
    /// an array of either. Weak relations insert key-less objects first.
    pub fn add_relation<'a>(
        &'a self,
        model: &'a str,
        owner_id: &'a Value,
        field: &'a str,
        value: &'a Value,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            if value.is_null() {
                return Ok(());
            }
            let (field, relation) = self.relation_field(model, field)?;
            let pk = self.registry.primary_key(model);

            match field.kind() {
                FieldKind::OneToOne(_) | FieldKind::OneToMany(_) => {
                    let related_id = self.resolve_related_id(relation, &field.name, value).await?;
                    let mut binds = self.bindings();
                    let sql = format!(
                        "UPDATE {} SET {} = {} WHERE {} = {}",
                        self.quote(model),
                        self.quote(&field.name),
                        binds.push(SqlParam::id(&related_id)),
                        self.quote(pk),
                        binds.push(SqlParam::id(owner_id))
                    );
                    self.run(Statement::new(sql, binds)).await?;
                    Ok(())
                }
                _ => {
                    let ids = self.resolve_related_ids(relation, &field.name, value).await?;
                    if ids.is_empty() {
                        return Ok(());
                    }
                    let join = JoinTable::new(model, &field.name, &relation.model);
                    let mut binds = self.bindings();
                    let rows: Vec<String> = ids
                        .iter()
                        .map(|id| {
                            format!(
                                "({}, {})",
                                binds.push(SqlParam::id(owner_id)),
                                binds.push(SqlParam::id(id))
                            )
                        })
                        .collect();
                    let sql = format!(
                        "INSERT INTO {} ({}, {}) VALUES {}",
                        self.quote(&join.name),
                        self.quote(&join.owner_column),
                        self.quote(&join.related_column),
                        rows.join(", ")
                    );
                    self.run(Statement::new(sql, binds)).await?;
                    Ok(())
                }
            }
        }
        .boxed()
    }

    async fn resolve_related_id(&self, relation: &Relation, field: &str, value: &Value) -> Result<Value> {
        let related_pk = self.registry.primary_key(&relation.model);
        match value {
            Value::Object(object) => match object.get(related_pk) {
                Some(id) if usable_id(id) => Ok(id.clone()),
                _ if relation.weak => {
                    let inserted = self.insert_one(&relation.model, object).await?;
                    inserted
                        .first()
                        .and_then(|row| row.get(related_pk))
                        .cloned()
                        .ok_or_else(|| {
                            AdapterError::Insert(format!("{} was not stored for {}", relation.model, field))
                        })
                }
                _ => Err(AdapterError::Validation(format!("invalid {} related model id", field))),
            },
            id if usable_id(id) => Ok(id.clone()),
            _ => Err(AdapterError::Validation(format!("invalid {} related model id", field))),
        }
    }

    async fn resolve_related_ids(
        &self,
        relation: &Relation,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>> {
        let related_pk = self.registry.primary_key(&relation.model);
        let items: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };

        let mut ids = Vec::new();
        let mut fresh: Vec<Record> = Vec::new();
        for item in items {
            match item {
                Value::Null => {}
                Value::Object(object) => match object.get(related_pk) {
                    Some(id) if usable_id(id) => ids.push(id.clone()),
                    _ if relation.weak => fresh.push(object.clone()),
                    _ => {
                        return Err(AdapterError::Validation(format!(
                            "invalid {} related model id",
                            field
                        )))
                    }
                },
                id if usable_id(id) => ids.push(id.clone()),
                _ => {
                    return Err(AdapterError::Validation(format!(
                        "invalid {} related model id",
                        field
                    )))
                }
            }
        }

        if !fresh.is_empty() {
            let inserted = self.insert_all(&relation.model, &fresh).await?;
            ids.extend(
                inserted
                    .items
                    .into_iter()
                    .filter_map(|mut row| row.remove(related_pk)),
            );
        }
        Ok(ids)
    }

    /// Unlink related entities of `owner_id`. Weak relations also delete
    /// the unlinked entities.
    pub fn remove_relation<'a>(
        &'a self,
        model: &'a str,
        owner_id: &'a Value,
        field: &'a str,
        target: RelationTarget,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let (field, relation) = self.relation_field(model, field)?;
            let pk = self.registry.primary_key(model);

            match field.kind() {
                FieldKind::OneToOne(_) | FieldKind::OneToMany(_) => {
                    if relation.weak {
                        let current = match target {
                            RelationTarget::Ids(ids) if !ids.is_empty() => ids.into_iter().next(),
                            _ => self.current_related_id(model, owner_id, &field.name).await?,
                        };
                        if let Some(current) = current.filter(usable_id) {
                            self.delete_one(&relation.model, &current).await?;
                        }
                    }
                    let mut binds = self.bindings();
                    let sql = format!(
                        "UPDATE {} SET {} = 0 WHERE {} = {}",
                        self.quote(model),
                        self.quote(&field.name),
                        self.quote(pk),
                        binds.push(SqlParam::id(owner_id))
                    );
                    self.run(Statement::new(sql, binds)).await?;
                    Ok(())
                }
                _ => {
                    let related_pk = self.registry.primary_key(&relation.model);
                    let filter = match target {
                        RelationTarget::All => None,
                        RelationTarget::Ids(ids) => Some(ids),
                        RelationTarget::Matching(condition) => {
                            let query = Query::new(&relation.model)
                                .select([related_pk])
                                .filter(condition);
                            let statement = select_statement(&self.registry, &query, self.dialect)?;
                            let rows = self.run(statement).await?.rows;
                            Some(rows.into_iter().filter_map(|mut row| row.remove(related_pk)).collect())
                        }
                    };
                    if filter.as_ref().is_some_and(Vec::is_empty) {
                        return Ok(());
                    }

                    let join = JoinTable::new(model, &field.name, &relation.model);
                    let linked = self.linked_ids(&join, owner_id, filter.as_deref()).await?;
                    if linked.is_empty() {
                        return Ok(());
                    }

                    let mut binds = self.bindings();
                    let sql = format!(
                        "DELETE FROM {} WHERE {} = {} AND {} IN ({})",
                        self.quote(&join.name),
                        self.quote(&join.owner_column),
                        binds.push(SqlParam::id(owner_id)),
                        self.quote(&join.related_column),
                        binds.push_all(linked.iter().map(SqlParam::id))
                    );
                    self.run(Statement::new(sql, binds)).await?;

                    if relation.weak {
                        try_join_all(linked.iter().map(|id| self.delete_one(&relation.model, id))).await?;
                    }
                    Ok(())
                }
            }
        }
        .boxed()
    }

    async fn current_related_id(&self, model: &str, owner_id: &Value, field: &str) -> Result<Option<Value>> {
        let mut binds = self.bindings();
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            self.quote(field),
            self.quote(model),
            self.quote(self.registry.primary_key(model)),
            binds.push(SqlParam::id(owner_id))
        );
        let mut rows = self.run(Statement::new(sql, binds)).await?.rows;
        Ok(rows.pop().and_then(|mut row| row.remove(field)))
    }

    /// Related keys linked to `owner_id`, optionally restricted to `within`.
    async fn linked_ids(
        &self,
        join: &JoinTable,
        owner_id: &Value,
        within: Option<&[Value]>,
    ) -> Result<Vec<Value>> {
        let mut binds = self.bindings();
        let mut sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            self.quote(&join.related_column),
            self.quote(&join.name),
            self.quote(&join.owner_column),
            binds.push(SqlParam::id(owner_id))
        );
        if let Some(ids) = within {
            sql.push_str(&format!(
                " AND {} IN ({})",
                self.quote(&join.related_column),
                binds.push_all(ids.iter().map(SqlParam::id))
            ));
        }
        let rows = self.run(Statement::new(sql, binds)).await?.rows;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| row.remove(&join.related_column))
            .collect())
    }

    /// Replace every many-to-many link of `owner_id` with `value`. Previously
    /// linked entities are unlinked, never deleted.
    pub(crate) async fn replace_links(
        &self,
        model: &str,
        owner_id: &Value,
        field: &str,
        value: &Value,
    ) -> Result<()> {
        let (field, relation) = self.relation_field(model, field)?;
        let join = JoinTable::new(model, &field.name, &relation.model);
        let mut binds = self.bindings();
        let sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            self.quote(&join.name),
            self.quote(&join.owner_column),
            binds.push(SqlParam::id(owner_id))
        );
        self.run(Statement::new(sql, binds)).await?;
        self.add_relation(model, owner_id, &field.name, value).await
    }

    /// Replace the elements of a list field with `values`, keeping order.
    pub async fn update_list(
        &self,
        model: &str,
        owner_id: &Value,
        field: &str,
        values: &Value,
    ) -> Result<()> {
        let table = list_table(model, field);
        let mut binds = self.bindings();
        let sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            self.quote(&table),
            self.quote(LIST_OWNER_COLUMN),
            binds.push(SqlParam::id(owner_id))
        );
        self.run(Statement::new(sql, binds)).await?;

        let items: Vec<&Value> = match values {
            Value::Null => Vec::new(),
            Value::Array(items) => items.iter().filter(|v| !v.is_null()).collect(),
            other => vec![other],
        };
        if items.is_empty() {
            return Ok(());
        }

        let mut binds = self.bindings();
        let rows: Vec<String> = items
            .iter()
            .map(|item| {
                format!(
                    "({}, {})",
                    binds.push(SqlParam::id(owner_id)),
                    binds.push(SqlParam::from_json(item))
                )
            })
            .collect();
        let sql = format!(
            "INSERT INTO {} ({}, {}) VALUES {}",
            self.quote(&table),
            self.quote(LIST_OWNER_COLUMN),
            self.quote(LIST_VALUE_COLUMN),
            rows.join(", ")
        );
        self.run(Statement::new(sql, binds)).await?;
        Ok(())
    }

    /// Store multilingual values in the translation row of `id`, creating
    /// the row when it does not exist yet.
    pub(crate) async fn write_translations(
        &self,
        model: &str,
        id: &Value,
        values: &[(&Field, &Value)],
    ) -> Result<()> {
        let table = translation_table(model);
        let pk = self.registry.primary_key(model);

        let mut binds = self.bindings();
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            self.quote(pk),
            self.quote(&table),
            self.quote(pk),
            binds.push(SqlParam::id(id))
        );
        let exists = !self.run(Statement::new(sql, binds)).await?.rows.is_empty();

        let mut binds = self.bindings();
        let sql = if exists {
            let assignments: Vec<String> = values
                .iter()
                .map(|(f, v)| format!("{} = {}", self.quote(&f.name), binds.push(bind_value(f, v))))
                .collect();
            format!(
                "UPDATE {} SET {} WHERE {} = {}",
                self.quote(&table),
                assignments.join(", "),
                self.quote(pk),
                binds.push(SqlParam::id(id))
            )
        } else {
            let mut columns = vec![self.quote(pk)];
            let mut placeholders = vec![binds.push(SqlParam::id(id))];
            for (f, v) in values {
                columns.push(self.quote(&f.name));
                placeholders.push(binds.push(bind_value(f, v)));
            }
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.quote(&table),
                columns.join(", "),
                placeholders.join(", ")
            )
        };
        self.run(Statement::new(sql, binds)).await?;
        Ok(())
    }
}

