//! Query and condition algebra.
//!
//! These types describe *what* to read; the compiler turns them into SQL for a
//! given dialect. All of them deserialize from JSON so queries can be passed
//! on the command line.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operators of a condition leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = "=")]
    EqualTo,
    #[serde(rename = "<>")]
    NotEqualTo,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterThanOrEqualTo,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessThanOrEqualTo,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "NOT LIKE")]
    NotLike,
}

impl ComparisonOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOperator::EqualTo => "=",
            ComparisonOperator::NotEqualTo => "<>",
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::GreaterThanOrEqualTo => ">=",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::LessThanOrEqualTo => "<=",
            ComparisonOperator::Like => "LIKE",
            ComparisonOperator::NotLike => "NOT LIKE",
        }
    }
}

/// Boolean connectors of a condition node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Connector {
    And,
    Or,
}

impl Connector {
    pub fn symbol(self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
        }
    }
}

/// Recursive predicate tree.
///
/// Either variant may carry a `model` override naming the alias its fields
/// resolve against; otherwise the alias of the enclosing query is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Comparison {
        field: String,
        #[serde(rename = "op")]
        operator: ComparisonOperator,
        value: Value,
        /// Treat `value` as the name of another field on the same alias.
        #[serde(default, rename = "isField", skip_serializing_if = "std::ops::Not::not")]
        value_is_field: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    Connector {
        #[serde(rename = "op")]
        operator: Connector,
        children: Vec<Condition>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
}

impl Condition {
    pub fn compare(
        field: impl Into<String>,
        operator: ComparisonOperator,
        value: impl Into<Value>,
    ) -> Self {
        Condition::Comparison {
            field: field.into(),
            operator,
            value: value.into(),
            value_is_field: false,
            model: None,
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, ComparisonOperator::EqualTo, value)
    }

    /// Compare two fields of the same alias.
    pub fn fields(
        field: impl Into<String>,
        operator: ComparisonOperator,
        other: impl Into<String>,
    ) -> Self {
        Condition::Comparison {
            field: field.into(),
            operator,
            value: Value::String(other.into()),
            value_is_field: true,
            model: None,
        }
    }

    pub fn and(children: Vec<Condition>) -> Self {
        Condition::Connector {
            operator: Connector::And,
            children,
            model: None,
        }
    }

    pub fn or(children: Vec<Condition>) -> Self {
        Condition::Connector {
            operator: Connector::Or,
            children,
            model: None,
        }
    }

    /// Resolve this node's fields against `model` instead of the query alias.
    pub fn on_model(mut self, alias: impl Into<String>) -> Self {
        match &mut self {
            Condition::Comparison { model, .. } | Condition::Connector { model, .. } => {
                *model = Some(alias.into())
            }
        }
        self
    }

    pub fn model(&self) -> Option<&str> {
        match self {
            Condition::Comparison { model, .. } | Condition::Connector { model, .. } => {
                model.as_deref()
            }
        }
    }
}

/// A relation to embed in the result: by name, or with a field subset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationFetch {
    Name(String),
    Fields { name: String, fields: Vec<String> },
}

impl RelationFetch {
    pub fn name(&self) -> &str {
        match self {
            RelationFetch::Name(name) | RelationFetch::Fields { name, .. } => name,
        }
    }

    /// Requested sub-fields; `None` means every field.
    pub fn fields(&self) -> Option<&[String]> {
        match self {
            RelationFetch::Name(_) => None,
            RelationFetch::Fields { fields, .. } => Some(fields),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JoinKind {
    Inner,
    #[default]
    Left,
    Right,
    Full,
}

impl JoinKind {
    /// Parse a join kind name; anything unrecognized joins as `Left`.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "inner" => JoinKind::Inner,
            "right" => JoinKind::Right,
            "full" | "full outer" => JoinKind::Full,
            _ => JoinKind::Left,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Full => "FULL OUTER",
        }
    }
}

impl From<String> for JoinKind {
    fn from(s: String) -> Self {
        JoinKind::parse(&s)
    }
}

impl From<JoinKind> for String {
    fn from(kind: JoinKind) -> Self {
        match kind {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
            JoinKind::Right => "right",
            JoinKind::Full => "full",
        }
        .to_string()
    }
}

/// Join through a one-to-one/one-to-many column of the enclosing query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    #[serde(default)]
    pub kind: JoinKind,
    /// Local field holding the related primary key.
    pub field: String,
    /// Query against the related model; its model name is the join alias.
    pub query: Query,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

/// Read request against one model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    pub model: String,
    /// Explicit projection; empty selects every stored field.
    pub fields: Vec<String>,
    pub condition: Option<Condition>,
    pub relations: Vec<RelationFetch>,
    pub joins: Vec<Join>,
    #[serde(rename = "orderBy", alias = "order_by")]
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// 1-based page, used when no offset is given.
    pub page: Option<u64>,
}

impl Query {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn fetch(mut self, relation: impl Into<String>) -> Self {
        self.relations.push(RelationFetch::Name(relation.into()));
        self
    }

    pub fn fetch_fields<I, S>(mut self, relation: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relations.push(RelationFetch::Fields {
            name: relation.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn join(mut self, kind: JoinKind, field: impl Into<String>, query: Query) -> Self {
        self.joins.push(Join {
            kind,
            field: field.into(),
            query,
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn page(mut self, page: u64) -> Self {
        self.page = Some(page);
        self
    }

    /// Rows to skip: the explicit offset, else `(page - 1) * limit`.
    /// Rows to skip. Page offsets saturate at the largest offset every
    /// engine accepts as a signed 64-bit value.
    pub fn effective_offset(&self) -> u64 {
        let limit = self.limit.unwrap_or(0);
        match (self.offset, self.page) {
            (Some(offset), _) if offset > 0 => offset,
            (_, Some(page)) if page > 0 => (page - 1).saturating_mul(limit).min(i64::MAX as u64),
            _ => 0,
        }
    }
}
