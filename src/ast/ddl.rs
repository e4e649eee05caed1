//! Schema → DDL compiler.
//!
//! A model compiles to up to three kinds of tables: its own table, the
//! `<Model>_translation` table for multilingual columns, and one auxiliary
//! table per many-to-many or list field. Sync is destructive: every table is
//! dropped and recreated.

use super::column::{column_definition, key_column_definition};
use super::dialect::{Dialect, Statement};
use crate::model::{auxiliary_schemas, translation_table, Field, FieldType, Schema};

/// Column definitions of one model, split by target table.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateDefinition {
    pub primary_key: String,
    pub own_columns: Vec<String>,
    /// Empty when the model has no multilingual fields.
    pub lingual_columns: Vec<String>,
    pub auxiliary: Vec<Schema>,
}

pub fn compile_create(schema: &Schema, dialect: Dialect) -> CreateDefinition {
    let mut own_columns = Vec::new();
    let mut lingual_columns = Vec::new();

    for field in &schema.fields {
        let Some(column) = column_definition(field, dialect) else {
            continue;
        };
        if field.is_translated() {
            lingual_columns.push(column);
        } else {
            own_columns.push(column);
        }
    }

    let synthetic;
    let key_field = match schema.primary_field() {
        Some(field) => field,
        None => {
            synthetic = Field::new(schema.primary_key(), FieldType::Integer).primary();
            if let Some(column) = column_definition(&synthetic, dialect) {
                own_columns.insert(0, column);
            }
            &synthetic
        }
    };
    let key_syntax = format!("PRIMARY KEY ({})", dialect.quote(&key_field.name));
    own_columns.push(key_syntax.clone());

    if !lingual_columns.is_empty() {
        if let Some(column) = key_column_definition(key_field, dialect) {
            lingual_columns.insert(0, column);
        }
        lingual_columns.push(key_syntax);
    }

    CreateDefinition {
        primary_key: key_field.name.clone(),
        own_columns,
        lingual_columns,
        auxiliary: auxiliary_schemas(schema),
    }
}

pub fn create_table_sql(table: &str, columns: &[String], dialect: Dialect) -> String {
    format!(
        "CREATE TABLE {} (\n  {}\n){}",
        dialect.quote(table),
        columns.join(",\n  "),
        dialect.table_options()
    )
}

pub fn drop_table_sql(table: &str, dialect: Dialect) -> String {
    format!("DROP TABLE IF EXISTS {}", dialect.quote(table))
}

/// Drop/create pairs for every table a model needs, own table first.
pub fn create_statements(schema: &Schema, dialect: Dialect) -> Vec<Statement> {
    let definition = compile_create(schema, dialect);
    let mut statements = vec![
        Statement::raw(drop_table_sql(&schema.name, dialect)),
        Statement::raw(create_table_sql(
            &schema.name,
            &definition.own_columns,
            dialect,
        )),
    ];

    if !definition.lingual_columns.is_empty() {
        let table = translation_table(&schema.name);
        statements.push(Statement::raw(drop_table_sql(&table, dialect)));
        statements.push(Statement::raw(create_table_sql(
            &table,
            &definition.lingual_columns,
            dialect,
        )));
    }

    for auxiliary in &definition.auxiliary {
        statements.extend(create_statements(auxiliary, dialect));
    }
    statements
}
