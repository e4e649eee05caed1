//! Field metadata for registered models.
//!
//! A field is a name plus a set of properties. The properties decide how the
//! field is stored: as a primary-table column, as a column of the
//! `<Model>_translation` shadow table, or in an auxiliary join/list table.
//! [`FieldKind`] is the single place where that decision is made; everything
//! downstream matches on it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared value type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Text,
    Integer,
    Float,
    Number,
    Boolean,
    Enum,
    Timestamp,
    Object,
    EMail,
    File,
    Password,
    Tel,
    Url,
    Relation,
    List,
}

impl FieldType {
    /// Types stored as bounded character columns.
    pub fn is_string_like(self) -> bool {
        matches!(
            self,
            FieldType::String
                | FieldType::EMail
                | FieldType::File
                | FieldType::Password
                | FieldType::Tel
                | FieldType::Url
        )
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::Enum | FieldType::Timestamp
        )
    }

    pub fn is_decimal(self) -> bool {
        matches!(self, FieldType::Float | FieldType::Number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    #[serde(rename = "one2one")]
    OneToOne,
    #[serde(rename = "one2many")]
    OneToMany,
    #[serde(rename = "many2many")]
    ManyToMany,
}

/// Relation descriptor carried by `Relation`-typed fields.
///
/// A weak relation owns its related rows: they are created on demand when the
/// owner is written with id-less objects and deleted when the link is removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub model: String,
    pub kind: RelationKind,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub weak: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldProperties {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub primary: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub multilingual: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(
        default,
        rename = "maxLength",
        alias = "max_length",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<Relation>,
    /// Element type of a `List` field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<FieldType>,
}

impl FieldProperties {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            primary: false,
            required: false,
            unique: false,
            multilingual: false,
            default: None,
            max_length: None,
            max: None,
            relation: None,
            items: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(flatten)]
    pub properties: FieldProperties,
}

/// Storage classification of a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind<'a> {
    Scalar(FieldType),
    OneToOne(&'a Relation),
    OneToMany(&'a Relation),
    ManyToMany(&'a Relation),
    List(FieldType),
}

impl<'a> FieldKind<'a> {
    /// The relation descriptor for any relation kind.
    pub fn relation(self) -> Option<&'a Relation> {
        match self {
            FieldKind::OneToOne(r) | FieldKind::OneToMany(r) | FieldKind::ManyToMany(r) => Some(r),
            FieldKind::Scalar(_) | FieldKind::List(_) => None,
        }
    }
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            properties: FieldProperties::new(field_type),
        }
    }

    pub fn relation(name: impl Into<String>, model: impl Into<String>, kind: RelationKind) -> Self {
        let mut field = Self::new(name, FieldType::Relation);
        field.properties.relation = Some(Relation {
            model: model.into(),
            kind,
            weak: false,
        });
        field
    }

    pub fn list(name: impl Into<String>, items: FieldType) -> Self {
        let mut field = Self::new(name, FieldType::List);
        field.properties.items = Some(items);
        field
    }

    pub fn primary(mut self) -> Self {
        self.properties.primary = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.properties.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.properties.unique = true;
        self
    }

    pub fn multilingual(mut self) -> Self {
        self.properties.multilingual = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.properties.default = Some(value.into());
        self
    }

    pub fn max_length(mut self, max_length: u32) -> Self {
        self.properties.max_length = Some(max_length);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.properties.max = Some(max);
        self
    }

    /// Mark the relation as owning its related rows.
    pub fn weak(mut self) -> Self {
        if let Some(relation) = self.properties.relation.as_mut() {
            relation.weak = true;
        }
        self
    }

    pub fn field_type(&self) -> FieldType {
        self.properties.field_type
    }

    pub fn is_primary(&self) -> bool {
        self.properties.primary
    }

    pub fn kind(&self) -> FieldKind<'_> {
        match (self.properties.field_type, &self.properties.relation) {
            (FieldType::Relation, Some(relation)) => match relation.kind {
                RelationKind::OneToOne => FieldKind::OneToOne(relation),
                RelationKind::OneToMany => FieldKind::OneToMany(relation),
                RelationKind::ManyToMany => FieldKind::ManyToMany(relation),
            },
            (FieldType::List, _) => {
                FieldKind::List(self.properties.items.unwrap_or(FieldType::String))
            }
            (field_type, _) => FieldKind::Scalar(field_type),
        }
    }

    /// Whether the field occupies a column of its model's own tables.
    pub fn has_column(&self) -> bool {
        match self.kind() {
            FieldKind::Scalar(FieldType::Relation) => false,
            FieldKind::Scalar(_) | FieldKind::OneToOne(_) | FieldKind::OneToMany(_) => true,
            FieldKind::ManyToMany(_) | FieldKind::List(_) => false,
        }
    }

    /// Whether the column lives in the `<Model>_translation` table.
    pub fn is_translated(&self) -> bool {
        self.properties.multilingual
            && !self.properties.primary
            && matches!(self.kind(), FieldKind::Scalar(t) if t != FieldType::Relation)
    }
}
