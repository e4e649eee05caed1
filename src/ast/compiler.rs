/// Query → SQL compiler.
///
/// Turns a [`Query`] into the clauses of a SELECT against one model:
/// projection (including embedded one-to-one/one-to-many relations as JSON
/// subselects), joins, WHERE, ORDER BY and LIMIT. Joined queries are compiled
/// recursively under their own model alias and merged into the parent.
use std::collections::HashSet;

use super::condition::{column_expr, compile_condition, field_expr};
use super::dialect::{Bindings, Dialect, SqlParam, Statement};
use super::types::{Query, RelationFetch};
use crate::error::{AdapterError, Result};
use crate::model::{FieldKind, ModelRegistry, Schema};

/// Alias of the related table inside an embedded relation subselect.
const EMBED_ALIAS: &str = "c";

/// Compiled clauses of a query, without their keywords.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParts {
    pub dialect: Dialect,
    pub table: String,
    pub projection: String,
    pub join: String,
    pub condition: String,
    pub order_by: String,
    pub limit: String,
    pub params: Vec<SqlParam>,
}

impl QueryParts {
    pub fn select(&self) -> Statement {
        let mut parts = vec![
            format!("SELECT {}", self.projection),
            format!("FROM {}", self.dialect.quote(&self.table)),
        ];
        self.push_filters(&mut parts);
        if !self.order_by.is_empty() {
            parts.push(format!("ORDER BY {}", self.order_by));
        }
        if !self.limit.is_empty() {
            parts.push(self.limit.clone());
        }
        Statement {
            sql: parts.join(" "),
            params: self.params.clone(),
        }
    }

    /// Row count with the same joins and filter.
    pub fn count(&self) -> Statement {
        let mut parts = vec![
            format!("SELECT COUNT(*) AS {}", self.dialect.quote("total")),
            format!("FROM {}", self.dialect.quote(&self.table)),
        ];
        self.push_filters(&mut parts);
        Statement {
            sql: parts.join(" "),
            params: self.params.clone(),
        }
    }

    fn push_filters(&self, parts: &mut Vec<String>) {
        if !self.join.is_empty() {
            parts.push(self.join.clone());
        }
        if !self.condition.is_empty() {
            parts.push(format!("WHERE {}", self.condition));
        }
    }
}

#[derive(Debug, Default)]
struct Clauses {
    projection: Vec<String>,
    joins: Vec<String>,
    conditions: Vec<String>,
    order_by: Vec<String>,
}

/// Compile `query` against its own model.
pub fn compile_query(
    registry: &ModelRegistry,
    query: &Query,
    dialect: Dialect,
) -> Result<QueryParts> {
    registry.require(&query.model)?;
    let mut binds = Bindings::new(dialect);
    let clauses = compile_clauses(registry, query, &query.model, &mut binds, true)?;

    let limit = match query.limit {
        Some(limit) if limit > 0 => dialect.limit(query.effective_offset(), limit),
        _ => String::new(),
    };

    Ok(QueryParts {
        dialect,
        table: query.model.clone(),
        projection: clauses.projection.join(", "),
        join: clauses.joins.join(" "),
        condition: clauses.conditions.join(" AND "),
        order_by: clauses.order_by.join(", "),
        limit,
        params: binds.into_params(),
    })
}

pub fn select_statement(
    registry: &ModelRegistry,
    query: &Query,
    dialect: Dialect,
) -> Result<Statement> {
    Ok(compile_query(registry, query, dialect)?.select())
}

pub fn count_statement(
    registry: &ModelRegistry,
    query: &Query,
    dialect: Dialect,
) -> Result<Statement> {
    Ok(compile_query(registry, query, dialect)?.count())
}

fn compile_clauses(
    registry: &ModelRegistry,
    query: &Query,
    alias: &str,
    binds: &mut Bindings,
    root: bool,
) -> Result<Clauses> {
    let dialect = binds.dialect();
    let schema = registry.require(alias)?;
    let mut clauses = Clauses::default();

    for order in &query.order_by {
        if let Some(expr) = column_expr(registry, alias, &order.field, dialect) {
            let direction = if order.ascending { "ASC" } else { "DESC" };
            clauses.order_by.push(format!("{} {}", expr, direction));
        }
    }

    let embedded = embedded_relations(schema, &query.relations);
    clauses.projection = projection(schema, query, alias, &embedded, dialect, root);

    for fetch in &query.relations {
        let field = schema.get_field(fetch.name()).ok_or_else(|| {
            AdapterError::Validation(format!(
                "relation {} is not a field of model {} (as {})",
                fetch.name(),
                query.model,
                alias
            ))
        })?;
        let relation = match field.kind() {
            FieldKind::OneToOne(relation) | FieldKind::OneToMany(relation) => relation,
            // Many-to-many relations are attached after the read.
            _ => continue,
        };
        let related = registry.require(&relation.model)?;
        if let Some(subselect) = embedded_subselect(registry, related, fetch, alias, &field.name, dialect) {
            clauses.projection.push(subselect);
        }
    }

    if let Some(condition) = &query.condition {
        let compiled = compile_condition(registry, alias, condition, binds);
        if !compiled.is_empty() {
            clauses.conditions.push(compiled);
        }
    }

    for join in &query.joins {
        let target = join.query.model.as_str();
        let Some(target_schema) = registry.schema(target) else {
            continue;
        };
        let joinable = schema
            .get_field(&join.field)
            .is_some_and(|f| f.has_column() && !f.is_translated());
        if !joinable {
            continue;
        }
        clauses.joins.push(format!(
            "{} JOIN {} ON ({} = {})",
            join.kind.keyword(),
            dialect.quote(target),
            dialect.qualified(alias, &join.field),
            dialect.qualified(target, target_schema.primary_key()),
        ));

        let nested = compile_clauses(registry, &join.query, target, binds, false)?;
        clauses.projection.extend(nested.projection);
        clauses.joins.extend(nested.joins);
        clauses.conditions.extend(nested.conditions);
        clauses.order_by.extend(nested.order_by);
    }

    Ok(clauses)
}

/// Names of requested relations that are embedded as JSON columns.
fn embedded_relations<'a>(schema: &Schema, relations: &'a [RelationFetch]) -> HashSet<&'a str> {
    relations
        .iter()
        .map(RelationFetch::name)
        .filter(|name| {
            schema.get_field(name).is_some_and(|f| {
                matches!(f.kind(), FieldKind::OneToOne(_) | FieldKind::OneToMany(_))
            })
        })
        .collect()
}

fn projection(
    schema: &Schema,
    query: &Query,
    alias: &str,
    embedded: &HashSet<&str>,
    dialect: Dialect,
    root: bool,
) -> Vec<String> {
    let names: Vec<&str> = if query.fields.is_empty() {
        schema.fields.iter().map(|f| f.name.as_str()).collect()
    } else {
        query.fields.iter().map(String::as_str).collect()
    };

    let mut columns = Vec::new();
    let mut seen = HashSet::new();
    for name in names {
        if embedded.contains(name) || !seen.insert(name) {
            continue;
        }
        let Some(field) = schema.get_field(name) else {
            continue;
        };
        let Some(expr) = field_expr(schema, alias, name, dialect) else {
            continue;
        };
        if field.is_translated() {
            columns.push(format!("{} AS {}", expr, dialect.quote(name)));
        } else {
            columns.push(expr);
        }
    }

    // The root row always carries its key so relations can be attached.
    let pk = schema.primary_key();
    if root && !seen.contains(pk) {
        columns.insert(0, dialect.qualified(alias, pk));
    }
    columns
}

/// `(SELECT <json object of c.f, ...> FROM related AS c WHERE ...) AS field`
fn embedded_subselect(
    registry: &ModelRegistry,
    related: &Schema,
    fetch: &RelationFetch,
    alias: &str,
    field: &str,
    dialect: Dialect,
) -> Option<String> {
    let requested: Vec<&str> = match fetch.fields() {
        Some(fields) => fields.iter().map(String::as_str).collect(),
        None => related.fields.iter().map(|f| f.name.as_str()).collect(),
    };

    let pairs: Vec<(&str, String)> = requested
        .into_iter()
        .filter_map(|name| field_expr(related, EMBED_ALIAS, name, dialect).map(|expr| (name, expr)))
        .collect();
    if pairs.is_empty() {
        return None;
    }

    let related_pk = registry.primary_key(&related.name);
    Some(format!(
        "(SELECT {} FROM {} AS {} WHERE {} = {} LIMIT 1) AS {}",
        dialect.json_object(&pairs),
        dialect.quote(&related.name),
        dialect.quote(EMBED_ALIAS),
        dialect.qualified(EMBED_ALIAS, related_pk),
        dialect.qualified(alias, field),
        dialect.quote(field),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::{Condition, JoinKind};
    use crate::model::{Field, FieldType, RelationKind};
    use pretty_assertions::assert_eq;

    fn registry() -> ModelRegistry {
        ModelRegistry::new(vec![
            Schema::new("Permission")
                .field(Field::new("id", FieldType::Integer).primary())
                .field(Field::new("resource", FieldType::String).required())
                .field(Field::new("action", FieldType::String).required()),
            Schema::new("User")
                .field(Field::new("id", FieldType::Integer).primary())
                .field(Field::new("name", FieldType::String)),
            Schema::new("Role")
                .field(Field::new("id", FieldType::Integer).primary())
                .field(Field::new("name", FieldType::String).required().unique())
                .field(Field::relation("permissions", "Permission", RelationKind::ManyToMany))
                .field(Field::relation("owner", "User", RelationKind::OneToOne))
                .field(Field::list("labels", FieldType::String))
                .field(Field::new("status", FieldType::Boolean)),
        ])
        .unwrap()
    }

    fn select(query: &Query, dialect: Dialect) -> Statement {
        select_statement(&registry(), query, dialect).unwrap()
    }

    // --- pagination ---

    #[test]
    fn test_page_pagination() {
        let sql = select(&Query::new("User").limit(10).page(3), Dialect::MySql).sql;
        assert!(sql.ends_with("LIMIT 20, 10"), "{}", sql);
    }

    #[test]
    fn test_offset_pagination() {
        let sql = select(&Query::new("User").limit(10).offset(5), Dialect::MySql).sql;
        assert!(sql.ends_with("LIMIT 5, 10"), "{}", sql);
        let sql = select(&Query::new("User").limit(10).offset(5), Dialect::Postgres).sql;
        assert!(sql.ends_with("LIMIT 10 OFFSET 5"), "{}", sql);
    }

    #[test]
    fn test_no_limit() {
        let sql = select(&Query::new("User").limit(0).page(2), Dialect::MySql).sql;
        assert!(!sql.contains("LIMIT"));
        let sql = select(&Query::new("User"), Dialect::MySql).sql;
        assert!(!sql.contains("LIMIT"));
    }

    // --- projection ---

    #[test]
    fn test_default_projection() {
        let stmt = select(&Query::new("Role"), Dialect::MySql);
        assert_eq!(
            stmt.sql,
            "SELECT `Role`.`id`, `Role`.`name`, `Role`.`owner`, `Role`.`status` FROM `Role`"
        );
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_explicit_projection_filters_and_keeps_key() {
        let query = Query::new("Role").select(["name", "labels", "permissions", "bogus", "name"]);
        let stmt = select(&query, Dialect::MySql);
        assert_eq!(stmt.sql, "SELECT `Role`.`id`, `Role`.`name` FROM `Role`");
    }

    #[test]
    fn test_embedded_relation() {
        let query = Query::new("Role").fetch_fields("owner", ["id", "name"]);
        let stmt = select(&query, Dialect::MySql);
        assert_eq!(
            stmt.sql,
            "SELECT `Role`.`id`, `Role`.`name`, `Role`.`status`, \
             (SELECT JSON_OBJECT('id', CAST(`c`.`id` AS CHAR), 'name', CAST(`c`.`name` AS CHAR)) \
             FROM `User` AS `c` WHERE `c`.`id` = `Role`.`owner` LIMIT 1) AS `owner` \
             FROM `Role`"
        );
    }

    #[test]
    fn test_unknown_relation_is_an_error() {
        let err = select_statement(&registry(), &Query::new("Role").fetch("nope"), Dialect::MySql)
            .unwrap_err();
        assert!(matches!(err, AdapterError::Validation(_)));
    }

    #[test]
    fn test_many_to_many_fetch_adds_no_column() {
        let plain = select(&Query::new("Role"), Dialect::MySql);
        let fetched = select(&Query::new("Role").fetch("permissions"), Dialect::MySql);
        assert_eq!(plain, fetched);
    }

    #[test]
    fn test_unknown_model_is_an_error() {
        assert!(select_statement(&registry(), &Query::new("Ghost"), Dialect::MySql).is_err());
    }

    // --- ordering and filtering ---

    #[test]
    fn test_order_by_drops_unknown_fields() {
        let query = Query::new("User")
            .order_by("name", false)
            .order_by("bogus", true)
            .order_by("id", true);
        let sql = select(&query, Dialect::MySql).sql;
        assert!(sql.ends_with("ORDER BY `User`.`name` DESC, `User`.`id` ASC"), "{}", sql);
    }

    #[test]
    fn test_where_clause() {
        let query = Query::new("User")
            .filter(Condition::eq("name", "ann"))
            .limit(5);
        let stmt = select(&query, Dialect::Postgres);
        assert_eq!(
            stmt.sql,
            "SELECT \"User\".\"id\", \"User\".\"name\" FROM \"User\" \
             WHERE (\"User\".\"name\" = $1::TEXT) LIMIT 5 OFFSET 0"
        );
        assert_eq!(stmt.params, vec![SqlParam::Text("ann".into())]);
    }

    // --- joins ---

    #[test]
    fn test_join_merges_nested_query() {
        let query = Query::new("Role")
            .select(["name"])
            .filter(Condition::eq("status", true))
            .join(
                JoinKind::Inner,
                "owner",
                Query::new("User")
                    .select(["name"])
                    .filter(Condition::eq("name", "ann"))
                    .order_by("name", true),
            );
        let stmt = select(&query, Dialect::MySql);
        assert_eq!(
            stmt.sql,
            "SELECT `Role`.`id`, `Role`.`name`, `User`.`name` FROM `Role` \
             INNER JOIN `User` ON (`Role`.`owner` = `User`.`id`) \
             WHERE (`Role`.`status` = ?) AND (`User`.`name` = ?) \
             ORDER BY `User`.`name` ASC"
        );
        assert_eq!(
            stmt.params,
            vec![SqlParam::Bool(true), SqlParam::Text("ann".into())]
        );
    }

    #[test]
    fn test_full_join_keyword_and_skipped_joins() {
        let query = Query::new("Role")
            .select(["name"])
            .join(JoinKind::Full, "owner", Query::new("User").select(["name"]))
            .join(JoinKind::Inner, "bogus", Query::new("User"))
            .join(JoinKind::Inner, "owner", Query::new("Ghost"));
        let sql = select(&query, Dialect::Postgres).sql;
        assert!(sql.contains("FULL OUTER JOIN \"User\" ON"));
        assert_eq!(sql.matches("JOIN").count(), 1);
    }

    #[test]
    fn test_count_reuses_filters() {
        let query = Query::new("Role")
            .filter(Condition::eq("name", "admin"))
            .order_by("name", true)
            .limit(10);
        let stmt = count_statement(&registry(), &query, Dialect::MySql).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT COUNT(*) AS `total` FROM `Role` WHERE (`Role`.`name` = ?)"
        );
        assert_eq!(stmt.params.len(), 1);
    }

    #[test]
    fn test_recompilation_is_identical() {
        let query = Query::new("Role")
            .filter(Condition::or(vec![
                Condition::eq("name", "a"),
                Condition::eq("status", false),
            ]))
            .fetch("owner")
            .order_by("name", true)
            .limit(3)
            .page(2);
        let first = compile_query(&registry(), &query, Dialect::Postgres).unwrap();
        let second = compile_query(&registry(), &query, Dialect::Postgres).unwrap();
        assert_eq!(first, second);
    }
}
