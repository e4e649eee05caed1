//! Turning raw rows into entity records.
//!
//! After the main SELECT, many-to-many relations and list fields are read
//! with one extra query each and attached as arrays. Column values are then
//! decoded: JSON text back into objects, integer booleans into booleans.

use std::collections::HashMap;

use futures::future::try_join_all;
use serde_json::Value;

use super::database::Database;
use super::executor::{Executor, Record};
use crate::ast::condition::field_expr;
use crate::ast::{Query, RelationFetch, SqlParam, Statement};
use crate::error::Result;
use crate::model::{
    list_table, FieldKind, FieldType, JoinTable, ModelRegistry, Relation, Schema,
    LIST_OWNER_COLUMN, LIST_VALUE_COLUMN,
};

const OWNER_ALIAS: &str = "__owner";
const RELATED_ALIAS: &str = "__related";

type Groups = HashMap<String, Vec<Value>>;

/// Parse JSON read back from a column.
///
/// Text columns may hold raw control characters inside string literals,
/// which strict JSON rejects; those are escaped and parsing retried. Text
/// that is not JSON at all is kept as a string.
pub fn parse_json(raw: &str) -> Value {
    if let Ok(value) = serde_json::from_str(raw) {
        return value;
    }
    serde_json::from_str(&escape_control_chars(raw)).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn escape_control_chars(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '\u{8}' => escaped.push_str("\\b"),
            '\u{c}' => escaped.push_str("\\f"),
            c if (c as u32) < 0x20 => escaped.push_str(&format!("\\u{:04x}", c as u32)),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Convert a stored value to the JSON shape of `field_type`.
///
/// Engines without a boolean type return 0/1, and embedded relation objects
/// carry every value as text.
pub fn coerce_scalar(field_type: FieldType, value: Value) -> Value {
    match (field_type, value) {
        (FieldType::Boolean, Value::Number(n)) => Value::Bool(n.as_f64().unwrap_or_default() != 0.0),
        (FieldType::Boolean, Value::String(s)) => match s.as_str() {
            "1" | "true" | "t" => Value::Bool(true),
            "0" | "false" | "f" => Value::Bool(false),
            "" => Value::Null,
            _ => Value::String(s),
        },
        (t, Value::String(s)) if t.is_integral() => match s.trim().parse::<i64>() {
            Ok(i) => Value::from(i),
            Err(_) if s.is_empty() => Value::Null,
            Err(_) => Value::String(s),
        },
        (t, Value::String(s)) if t.is_decimal() => match s.trim().parse::<f64>() {
            Ok(f) => serde_json::Number::from_f64(f).map_or(Value::String(s), Value::Number),
            Err(_) if s.is_empty() => Value::Null,
            Err(_) => Value::String(s),
        },
        (FieldType::Object, Value::String(s)) => parse_json(&s),
        (_, value) => value,
    }
}

/// Decode the columns of one row of `schema` in place.
pub fn decode_row(registry: &ModelRegistry, schema: &Schema, row: &mut Record) {
    for field in &schema.fields {
        let Some(value) = row.get_mut(&field.name) else {
            continue;
        };
        match field.kind() {
            FieldKind::Scalar(field_type) => *value = coerce_scalar(field_type, value.take()),
            FieldKind::OneToOne(relation) | FieldKind::OneToMany(relation) => {
                if let Value::String(text) = value {
                    let mut embedded = parse_json(text);
                    if let (Value::Object(object), Some(related)) =
                        (&mut embedded, registry.schema(&relation.model))
                    {
                        decode_embedded(related, object);
                    }
                    *value = embedded;
                }
            }
            FieldKind::ManyToMany(_) | FieldKind::List(_) => {}
        }
    }
}

fn decode_embedded(schema: &Schema, object: &mut Record) {
    for field in &schema.fields {
        let Some(value) = object.get_mut(&field.name) else {
            continue;
        };
        let field_type = match field.kind() {
            FieldKind::Scalar(field_type) => field_type,
            FieldKind::OneToOne(_) | FieldKind::OneToMany(_) => FieldType::Integer,
            FieldKind::ManyToMany(_) | FieldKind::List(_) => continue,
        };
        *value = coerce_scalar(field_type, value.take());
    }
}

/// Grouping key of a primary or foreign key value.
fn id_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().parse::<i64>().map_or_else(|_| s.clone(), |i| i.to_string()),
        Value::Number(n) => n
            .as_i64()
            .map(|i| i.to_string())
            .unwrap_or_else(|| n.to_string()),
        other => other.to_string(),
    }
}

/// Attach `groups` under `field` to every row; rows without a group get an
/// empty array.
fn attach(rows: &mut [Record], pk: &str, field: &str, groups: &Groups) {
    for row in rows {
        let items = row
            .get(pk)
            .and_then(|id| groups.get(&id_key(id)))
            .cloned()
            .unwrap_or_default();
        row.insert(field.to_string(), Value::Array(items));
    }
}

impl<E: Executor> Database<E> {
    /// Decode `rows` read for `query` and attach many-to-many relations and
    /// list fields.
    pub(crate) async fn normalize(&self, query: &Query, mut rows: Vec<Record>) -> Result<Vec<Record>> {
        let schema = self.registry.require(&query.model)?;
        for row in &mut rows {
            decode_row(&self.registry, schema, row);
        }
        if rows.is_empty() {
            return Ok(rows);
        }

        let pk = schema.primary_key();
        let ids: Vec<Value> = rows
            .iter()
            .filter_map(|row| row.get(pk))
            .filter(|id| !id.is_null())
            .cloned()
            .collect();

        let mut fetches = Vec::new();
        for fetch in &query.relations {
            if let Some(field) = schema.get_field(fetch.name()) {
                if let FieldKind::ManyToMany(relation) = field.kind() {
                    fetches.push(self.fetch_links(schema, &field.name, relation, fetch, &ids));
                }
            }
        }
        let lists: Vec<_> = schema
            .list_fields()
            .filter(|f| query.fields.is_empty() || query.fields.contains(&f.name))
            .map(|f| self.fetch_list(&schema.name, &f.name, f.properties.items, &ids))
            .collect();

        let (links, lists) = futures::try_join!(try_join_all(fetches), try_join_all(lists))?;
        for (field, groups) in links.iter().chain(lists.iter()) {
            attach(&mut rows, pk, field, groups);
        }
        Ok(rows)
    }

    /// Related rows of a many-to-many field, grouped by owner key.
    async fn fetch_links(
        &self,
        schema: &Schema,
        field: &str,
        relation: &Relation,
        fetch: &RelationFetch,
        ids: &[Value],
    ) -> Result<(String, Groups)> {
        let mut groups = Groups::new();
        if ids.is_empty() {
            return Ok((field.to_string(), groups));
        }
        let related = self.registry.require(&relation.model)?;
        let related_pk = related.primary_key();
        let join = JoinTable::new(&schema.name, field, &relation.model);

        let names: Vec<&str> = match fetch.fields() {
            Some(fields) => fields.iter().map(String::as_str).collect(),
            None => related.fields.iter().map(|f| f.name.as_str()).collect(),
        };
        let mut columns: Vec<String> = names
            .into_iter()
            .filter(|name| *name != related_pk)
            .filter_map(|name| {
                let expr = field_expr(related, "m", name, self.dialect)?;
                Some(format!("{} AS {}", expr, self.quote(name)))
            })
            .collect();
        columns.push(format!(
            "{} AS {}",
            self.dialect.qualified("r", &join.owner_column),
            self.quote(OWNER_ALIAS)
        ));
        columns.push(format!(
            "{} AS {}",
            self.dialect.qualified("r", &join.related_column),
            self.quote(RELATED_ALIAS)
        ));

        let mut binds = self.bindings();
        let sql = format!(
            "SELECT {} FROM {} AS {} LEFT JOIN {} AS {} ON ({} = {}) WHERE {} IN ({}) ORDER BY {}",
            columns.join(", "),
            self.quote(&join.name),
            self.quote("r"),
            self.quote(&relation.model),
            self.quote("m"),
            self.dialect.qualified("m", related_pk),
            self.dialect.qualified("r", &join.related_column),
            self.dialect.qualified("r", &join.owner_column),
            binds.push_all(ids.iter().map(SqlParam::id)),
            self.dialect.qualified("r", "id"),
        );

        for mut row in self.run(Statement::new(sql, binds)).await?.rows {
            let owner = row.remove(OWNER_ALIAS).unwrap_or(Value::Null);
            let related_id = row.remove(RELATED_ALIAS).unwrap_or(Value::Null);
            row.insert(related_pk.to_string(), related_id);
            decode_row(&self.registry, related, &mut row);
            groups
                .entry(id_key(&owner))
                .or_default()
                .push(Value::Object(row));
        }
        Ok((field.to_string(), groups))
    }

    /// Elements of a list field, grouped by owner key in insertion order.
    async fn fetch_list(
        &self,
        model: &str,
        field: &str,
        items: Option<FieldType>,
        ids: &[Value],
    ) -> Result<(String, Groups)> {
        let mut groups = Groups::new();
        if ids.is_empty() {
            return Ok((field.to_string(), groups));
        }
        let mut binds = self.bindings();
        let sql = format!(
            "SELECT {}, {} FROM {} WHERE {} IN ({}) ORDER BY {}",
            self.quote(LIST_OWNER_COLUMN),
            self.quote(LIST_VALUE_COLUMN),
            self.quote(&list_table(model, field)),
            self.quote(LIST_OWNER_COLUMN),
            binds.push_all(ids.iter().map(SqlParam::id)),
            self.quote("id"),
        );
        for mut row in self.run(Statement::new(sql, binds)).await?.rows {
            let owner = row.remove(LIST_OWNER_COLUMN).unwrap_or(Value::Null);
            let value = row.remove(LIST_VALUE_COLUMN).unwrap_or(Value::Null);
            let value = match items {
                Some(item_type) => coerce_scalar(item_type, value),
                None => value,
            };
            groups.entry(id_key(&owner)).or_default().push(value);
        }
        Ok((field.to_string(), groups))
    }
}
