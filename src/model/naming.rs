//! Table and column naming for the tables a model owns besides its own.
//!
//! Names are derived from the model and field names only, so they are
//! stable across dialects and across runs.

use super::field::{Field, FieldKind, FieldType};
use super::schema::Schema;

/// Lower-case the first character: `RoleGroup` → `roleGroup`.
pub fn camel_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Upper-case the first character: `permissions` → `Permissions`.
pub fn pascal_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn translation_table(model: &str) -> String {
    format!("{}_translation", model)
}

pub fn list_table(model: &str, field: &str) -> String {
    format!("{}{}List", model, pascal_case(field))
}

/// Column holding the owner id in a list table.
pub const LIST_OWNER_COLUMN: &str = "fk";
/// Column holding the element in a list table.
pub const LIST_VALUE_COLUMN: &str = "value";

/// Layout of the table backing one many-to-many field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTable {
    pub name: String,
    /// Column referencing the owning model's primary key.
    pub owner_column: String,
    /// Column referencing the related model's primary key.
    pub related_column: String,
}

impl JoinTable {
    pub fn new(model: &str, field: &str, related_model: &str) -> Self {
        let owner_column = camel_case(model);
        let mut related_column = camel_case(related_model);
        // Self-referencing relations would otherwise name both columns alike.
        if related_column == owner_column {
            related_column = format!("related{}", pascal_case(related_model));
        }
        Self {
            name: format!("{}Has{}", model, pascal_case(field)),
            owner_column,
            related_column,
        }
    }
}

/// Schemas of the auxiliary tables a model needs: one join table per
/// many-to-many field and one list table per list field.
pub fn auxiliary_schemas(schema: &Schema) -> Vec<Schema> {
    let mut tables = Vec::new();
    for field in &schema.fields {
        match field.kind() {
            FieldKind::ManyToMany(relation) => {
                let join = JoinTable::new(&schema.name, &field.name, &relation.model);
                tables.push(
                    Schema::new(join.name)
                        .field(Field::new("id", FieldType::Integer).primary().required())
                        .field(Field::new(join.owner_column, FieldType::Integer).required())
                        .field(Field::new(join.related_column, FieldType::Integer).required()),
                );
            }
            FieldKind::List(items) => {
                tables.push(
                    Schema::new(list_table(&schema.name, &field.name))
                        .field(Field::new("id", FieldType::Integer).primary().required())
                        .field(Field::new(LIST_OWNER_COLUMN, FieldType::Integer).required())
                        .field(Field::new(LIST_VALUE_COLUMN, items).required()),
                );
            }
            FieldKind::Scalar(_) | FieldKind::OneToOne(_) | FieldKind::OneToMany(_) => {}
        }
    }
    tables
}
