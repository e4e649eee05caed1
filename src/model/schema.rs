use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::field::{Field, FieldKind, FieldType};
use super::naming::auxiliary_schemas;
use crate::error::{AdapterError, Result};

/// Primary key used when a schema declares none.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// A named, ordered list of fields describing one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn primary_field(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.is_primary())
    }

    pub fn primary_key(&self) -> &str {
        self.primary_field()
            .map(|f| f.name.as_str())
            .unwrap_or(DEFAULT_PRIMARY_KEY)
    }

    /// Fields stored as columns of the model's own table.
    pub fn own_columns(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .filter(|f| f.has_column() && !f.is_translated())
    }

    /// Fields stored in the translation table.
    pub fn translated_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_translated())
    }

    pub fn list_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .filter(|f| matches!(f.kind(), FieldKind::List(_)))
    }

    pub fn relation_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.kind().relation().is_some())
    }
}

/// Registered models of one adapter instance.
///
/// Built once, then read-only: primary keys and auxiliary table schemas are
/// resolved at construction so lookups never mutate shared state.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    schemas: Vec<Schema>,
    index: HashMap<String, usize>,
    primary_keys: HashMap<String, String>,
    auxiliary: Vec<Schema>,
}

impl ModelRegistry {
    pub fn new(schemas: impl IntoIterator<Item = Schema>) -> Result<Self> {
        let mut registry = Self::default();
        for schema in schemas {
            if registry.index.contains_key(&schema.name) {
                return Err(AdapterError::Validation(format!(
                    "model {} is registered twice",
                    schema.name
                )));
            }
            if schema.fields.iter().filter(|f| f.is_primary()).count() > 1 {
                return Err(AdapterError::Validation(format!(
                    "model {} declares more than one primary field",
                    schema.name
                )));
            }
            registry
                .primary_keys
                .insert(schema.name.clone(), schema.primary_key().to_string());
            registry.auxiliary.extend(auxiliary_schemas(&schema));
            registry
                .index
                .insert(schema.name.clone(), registry.schemas.len());
            registry.schemas.push(schema);
        }
        registry.validate_fields()?;
        Ok(registry)
    }

    fn validate_fields(&self) -> Result<()> {
        for schema in &self.schemas {
            for field in &schema.fields {
                let props = &field.properties;
                match props.field_type {
                    FieldType::Relation => {
                        let relation = props.relation.as_ref().ok_or_else(|| {
                            AdapterError::Validation(format!(
                                "relation field {}.{} has no relation descriptor",
                                schema.name, field.name
                            ))
                        })?;
                        if !self.index.contains_key(&relation.model) {
                            return Err(AdapterError::Validation(format!(
                                "relation field {}.{} targets unknown model {}",
                                schema.name, field.name, relation.model
                            )));
                        }
                    }
                    FieldType::List => match props.items {
                        None => {
                            return Err(AdapterError::Validation(format!(
                                "list field {}.{} has no item type",
                                schema.name, field.name
                            )))
                        }
                        Some(FieldType::Relation | FieldType::List) => {
                            return Err(AdapterError::Validation(format!(
                                "list field {}.{} must hold scalar items",
                                schema.name, field.name
                            )))
                        }
                        Some(_) => {}
                    },
                    _ => {}
                }
            }
        }
        Ok(())
    }

    pub fn schema(&self, model: &str) -> Option<&Schema> {
        self.index.get(model).map(|&i| &self.schemas[i])
    }

    /// Look up a model, failing with a validation error when unknown.
    pub fn require(&self, model: &str) -> Result<&Schema> {
        self.schema(model)
            .ok_or_else(|| AdapterError::Validation(format!("model {} is not registered", model)))
    }

    pub fn primary_key(&self, model: &str) -> &str {
        self.primary_keys
            .get(model)
            .map(String::as_str)
            .unwrap_or(DEFAULT_PRIMARY_KEY)
    }

    /// Registered schemas in registration order.
    pub fn schemas(&self) -> &[Schema] {
        &self.schemas
    }

    /// Join and list table schemas derived from the registered models.
    pub fn auxiliary(&self) -> &[Schema] {
        &self.auxiliary
    }
}
