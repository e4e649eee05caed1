use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use relsql::config::{load_models, AdapterConfig};
use relsql::db::{sync_statements, Database, PgExecutor};
use relsql::{Dialect, ModelRegistry, Query};

/// Relational storage adapter for declarative model schemas
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the statements that recreate every table
    Ddl {
        #[arg(long)]
        models: Option<PathBuf>,
        /// mysql, postgres or sqlite
        #[arg(long)]
        dialect: Option<Dialect>,
    },
    /// Drop and recreate every table of the models
    Sync {
        #[arg(long)]
        models: Option<PathBuf>,
    },
    /// Run a query and print the matching items as JSON
    Find {
        model: String,
        /// Query as JSON, e.g. '{"condition": {"field": "name", "op": "=", "value": "x"}}'
        #[arg(long)]
        query: Option<String>,
    },
    /// Count the rows matching a query
    Count {
        model: String,
        #[arg(long)]
        query: Option<String>,
    },
}

fn registry(config: &AdapterConfig, models: Option<&Path>) -> Result<ModelRegistry> {
    let path = models
        .or(config.models.as_deref())
        .context("No models file given (use --models or set `models` in the config)")?;
    load_models(path)
}

fn parse_query(model: &str, json: Option<&str>) -> Result<Query> {
    let mut query = match json {
        Some(json) => serde_json::from_str::<Query>(json).context("Invalid --query JSON")?,
        None => Query::default(),
    };
    query.model = model.to_string();
    Ok(query)
}

async fn connect(mut config: AdapterConfig, registry: ModelRegistry) -> Result<Database<PgExecutor>> {
    if config.dialect != Dialect::Postgres {
        bail!("only PostgreSQL connections are supported by this binary");
    }

    // Resolve password: PGPASSWORD env var, then interactive prompt
    if config.connection.password.is_empty() {
        if let Ok(pw) = std::env::var("PGPASSWORD") {
            config.connection.password = pw;
        } else {
            let prompt = format!("Password for {}: ", config.connection.display_string());
            config.connection.password = rpassword::read_password_from_tty(Some(&prompt))?;
        }
    }

    let executor = PgExecutor::connect(&config.connection)?;
    Ok(Database::new(executor, registry, config.dialect))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = AdapterConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Ddl { models, dialect } => {
            let registry = registry(&config, models.as_deref())?;
            for statement in sync_statements(&registry, dialect.unwrap_or(config.dialect)) {
                println!("{};\n", statement.sql);
            }
        }
        Command::Sync { models } => {
            let registry = registry(&config, models.as_deref())?;
            let options = config.sync.clone();
            let db = connect(config, registry).await?;
            db.init(&options).await?;
            db.close().await;
        }
        Command::Find { model, query } => {
            let query = parse_query(&model, query.as_deref())?;
            let registry = registry(&config, None)?;
            let db = connect(config, registry).await?;
            let result = db.find_by_query(&query).await?;
            println!("{}", serde_json::to_string_pretty(&result.items)?);
            db.close().await;
        }
        Command::Count { model, query } => {
            let query = parse_query(&model, query.as_deref())?;
            let registry = registry(&config, None)?;
            let db = connect(config, registry).await?;
            println!("{}", db.count(&query).await?);
            db.close().await;
        }
    }

    Ok(())
}
