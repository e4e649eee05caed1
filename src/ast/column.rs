//! Field → column type mapping.
use serde_json::Value;

use super::dialect::Dialect;
use crate::model::{Field, FieldKind, FieldType};

/// SQL column type for a field, or `None` when the field has no column of
/// its own (many-to-many relations and lists).
pub fn column_type(field: &Field, dialect: Dialect) -> Option<String> {
    let props = &field.properties;
    match field.kind() {
        FieldKind::OneToOne(_) | FieldKind::OneToMany(_) => Some(big_integer(dialect)),
        FieldKind::ManyToMany(_) | FieldKind::List(_) => None,
        FieldKind::Scalar(FieldType::Relation) => None,
        FieldKind::Scalar(field_type) if props.primary && dialect == Dialect::Sqlite => {
            // Only an INTEGER primary key aliases the rowid and auto-increments.
            if field_type.is_string_like() || field_type.is_integral() {
                Some("INTEGER".to_string())
            } else {
                Some(scalar_type(field_type, props.max_length, props.max, dialect))
            }
        }
        FieldKind::Scalar(field_type) if props.primary && field_type.is_string_like() => {
            Some(big_integer(dialect))
        }
        FieldKind::Scalar(FieldType::Integer) if props.primary && dialect == Dialect::Postgres => {
            Some("BIGINT".to_string())
        }
        FieldKind::Scalar(field_type) => {
            Some(scalar_type(field_type, props.max_length, props.max, dialect))
        }
    }
}

fn big_integer(dialect: Dialect) -> String {
    match dialect {
        Dialect::Sqlite => "INTEGER".to_string(),
        Dialect::MySql | Dialect::Postgres => "BIGINT".to_string(),
    }
}

fn scalar_type(
    field_type: FieldType,
    max_length: Option<u32>,
    max: Option<f64>,
    dialect: Dialect,
) -> String {
    let max = max.filter(|m| *m != 0.0);
    match field_type {
        FieldType::Boolean => "BOOLEAN".to_string(),
        t if t.is_string_like() => format!("VARCHAR({})", max_length.unwrap_or(255)),
        FieldType::Float | FieldType::Number => {
            let precision = max.map(|m| m.to_string().len() + 10).unwrap_or(20);
            format!("DECIMAL({},10)", precision)
        }
        FieldType::Integer | FieldType::Enum => {
            let bits = max.map(bit_length);
            match dialect {
                Dialect::MySql => format!("INT({})", bits.unwrap_or(20)),
                Dialect::Postgres => match bits {
                    Some(b) if b < 32 => "INTEGER".to_string(),
                    _ => "BIGINT".to_string(),
                },
                Dialect::Sqlite => "INTEGER".to_string(),
            }
        }
        FieldType::Object => match dialect {
            Dialect::Postgres => "BYTEA".to_string(),
            Dialect::MySql | Dialect::Sqlite => "BLOB".to_string(),
        },
        FieldType::Text => "TEXT".to_string(),
        FieldType::Timestamp => "BIGINT".to_string(),
        // Lists and relations never reach here; string-like types matched above.
        _ => "TEXT".to_string(),
    }
}

/// Number of binary digits of the integer part of `max`.
fn bit_length(max: f64) -> u32 {
    let n = max.abs().trunc() as u64;
    (64 - n.leading_zeros()).max(1)
}

/// Literal for a column default. Booleans render bare, everything else quoted.
pub fn default_literal(field_type: FieldType, value: &Value) -> Option<String> {
    if value.is_null() {
        return None;
    }
    if field_type == FieldType::Boolean {
        let truthy = match value {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Value::String(s) => !s.is_empty(),
            _ => true,
        };
        return Some(if truthy { "TRUE" } else { "FALSE" }.to_string());
    }
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Some(format!("'{}'", text.replace('\'', "''")))
}

/// Full column definition of a field in its model's table.
pub fn column_definition(field: &Field, dialect: Dialect) -> Option<String> {
    render_column(field, dialect, field.is_primary())
}

/// Primary-key column as copied into the translation table: same type,
/// never auto-generated.
pub fn key_column_definition(field: &Field, dialect: Dialect) -> Option<String> {
    render_column(field, dialect, false)
}

fn render_column(field: &Field, dialect: Dialect, generated: bool) -> Option<String> {
    let props = &field.properties;
    let sql_type = column_type(field, dialect)?;
    let mut column = format!("{} {}", dialect.quote(&field.name), sql_type);

    let is_relation = props.field_type == FieldType::Relation;
    if (props.required && !is_relation) || props.primary {
        column.push_str(" NOT NULL");
    }
    if let Some(literal) = props
        .default
        .as_ref()
        .and_then(|v| default_literal(props.field_type, v))
    {
        column.push_str(" DEFAULT ");
        column.push_str(&literal);
    }
    if props.unique {
        column.push_str(" UNIQUE");
    }
    let integral_key = sql_type.contains("INT");
    if generated && integral_key {
        match dialect {
            Dialect::MySql => column.push_str(" AUTO_INCREMENT"),
            Dialect::Postgres => column.push_str(" GENERATED BY DEFAULT AS IDENTITY"),
            Dialect::Sqlite => {}
        }
    }
    Some(column)
}
