//! Condition tree → SQL predicate.
//!
//! Compilation is permissive: a leaf naming a field its model does not store
//! compiles to nothing, and a connector whose children all vanish vanishes
//! too. Callers treat an empty string as "no predicate".

use serde_json::Value;

use super::dialect::{Bindings, Dialect, SqlParam};
use super::types::Condition;
use crate::model::{translation_table, FieldKind, ModelRegistry, Schema};

/// SQL expression reading `field` of `alias`, or `None` when the model has
/// no such stored field. Multilingual fields read through the translation
/// table.
pub fn column_expr(
    registry: &ModelRegistry,
    alias: &str,
    field: &str,
    dialect: Dialect,
) -> Option<String> {
    let schema = registry.schema(alias)?;
    field_expr(schema, alias, field, dialect)
}

/// Like [`column_expr`], for a schema addressed under an arbitrary alias.
pub fn field_expr(schema: &Schema, alias: &str, field: &str, dialect: Dialect) -> Option<String> {
    let Some(field) = schema.get_field(field) else {
        // A synthesized key is stored although no field declares it.
        if schema.primary_field().is_none() && field == schema.primary_key() {
            return Some(dialect.qualified(alias, field));
        }
        return None;
    };
    if !field.has_column() {
        return None;
    }
    if field.is_translated() {
        let pk = schema.primary_key();
        return Some(format!(
            "(SELECT {} FROM {} AS {} WHERE {} = {})",
            dialect.qualified("t", &field.name),
            dialect.quote(&translation_table(&schema.name)),
            dialect.quote("t"),
            dialect.qualified("t", pk),
            dialect.qualified(alias, pk),
        ));
    }
    Some(dialect.qualified(alias, &field.name))
}

/// Bind a leaf value the way its column stores it. Keys, relation columns
/// and integral fields take numeric strings as integers.
fn leaf_param(registry: &ModelRegistry, alias: &str, field: &str, value: &Value) -> SqlParam {
    let integral = registry.schema(alias).is_some_and(|schema| {
        field == schema.primary_key()
            || schema.get_field(field).is_some_and(|f| match f.kind() {
                FieldKind::OneToOne(_) | FieldKind::OneToMany(_) => true,
                FieldKind::Scalar(field_type) => field_type.is_integral(),
                FieldKind::ManyToMany(_) | FieldKind::List(_) => false,
            })
    });
    if integral {
        SqlParam::id(value)
    } else {
        SqlParam::from_json(value)
    }
}

/// Compile `condition` against `alias`, binding values into `binds`.
pub fn compile_condition(
    registry: &ModelRegistry,
    alias: &str,
    condition: &Condition,
    binds: &mut Bindings,
) -> String {
    let dialect = binds.dialect();
    let alias = condition.model().unwrap_or(alias);

    match condition {
        Condition::Comparison {
            field,
            operator,
            value,
            value_is_field,
            ..
        } => {
            let Some(lhs) = column_expr(registry, alias, field, dialect) else {
                return String::new();
            };
            let rhs = if *value_is_field {
                let other = value.as_str().unwrap_or_default();
                match column_expr(registry, alias, other, dialect) {
                    Some(expr) => expr,
                    None => return String::new(),
                }
            } else {
                binds.push(leaf_param(registry, alias, field, value))
            };
            format!("({} {} {})", lhs, operator.symbol(), rhs)
        }
        Condition::Connector {
            operator, children, ..
        } => {
            let parts: Vec<String> = children
                .iter()
                .map(|child| compile_condition(registry, alias, child, binds))
                .filter(|part| !part.is_empty())
                .collect();
            if parts.is_empty() {
                return String::new();
            }
            format!("({})", parts.join(&format!(" {} ", operator.symbol())))
        }
    }
}
