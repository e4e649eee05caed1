use serde::{Deserialize, Serialize};
use tracing::info;

use super::database::Database;
use super::executor::Executor;
use crate::ast::{create_statements, Dialect, Statement};
use crate::error::{AdapterError, Result};
use crate::model::ModelRegistry;

/// Database-level settings applied before the tables are recreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Database whose defaults are altered (MySQL only).
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default = "default_charset")]
    pub charset: String,
    #[serde(default = "default_collation")]
    pub collation: String,
}

fn default_charset() -> String {
    String::from("utf8mb4")
}

fn default_collation() -> String {
    String::from("utf8mb4_unicode_ci")
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            database: None,
            charset: default_charset(),
            collation: default_collation(),
        }
    }
}

/// Statements that drop and recreate every table of the registered models,
/// in registration order.
pub fn sync_statements(registry: &ModelRegistry, dialect: Dialect) -> Vec<Statement> {
    registry
        .schemas()
        .iter()
        .flat_map(|schema| create_statements(schema, dialect))
        .collect()
}

/// `ALTER DATABASE` for the charset settings, when the dialect has them.
pub fn charset_statement(options: &SyncOptions, dialect: Dialect) -> Result<Option<Statement>> {
    let Some(database) = &options.database else {
        return Ok(None);
    };
    if dialect != Dialect::MySql {
        return Ok(None);
    }
    for setting in [&options.charset, &options.collation] {
        if setting.is_empty() || !setting.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AdapterError::Validation(format!(
                "invalid charset setting: {:?}",
                setting
            )));
        }
    }
    Ok(Some(Statement::raw(format!(
        "ALTER DATABASE {} CHARACTER SET {} COLLATE {}",
        dialect.quote(database),
        options.charset,
        options.collation
    ))))
}

impl<E: Executor> Database<E> {
    /// Recreate every table from the registered schemas. Existing data is
    /// dropped.
    pub async fn init(&self, options: &SyncOptions) -> Result<()> {
        if let Some(statement) = charset_statement(options, self.dialect)? {
            self.run(statement).await?;
        }
        for schema in self.registry.schemas() {
            let statements = create_statements(schema, self.dialect);
            let count = statements.len();
            for statement in statements {
                self.run(statement).await?;
            }
            info!(model = %schema.name, statements = count, "synchronized model tables");
        }
        Ok(())
    }
}
