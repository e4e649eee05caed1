use anyhow::{Context, Result};
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use postgres_native_tls::MakeTlsConnector;
use serde::{Deserialize, Serialize};
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;
use tracing::{debug, warn};

use super::executor::{ExecError, Executor, RowSet};
use super::query::rows_to_records;
use crate::ast::SqlParam;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    #[serde(default)]
    pub ssl_mode: SslMode,
    /// Accept invalid/self-signed certificates. Use with caution.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Optional path to a custom CA certificate file (PEM format).
    /// If not set, the system CA store is used.
    #[serde(default)]
    pub ca_cert_path: Option<String>,
    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// SSL/TLS connection modes for PostgreSQL.
///
/// These match the standard PostgreSQL sslmode parameter:
/// - `Disable`: No SSL (unencrypted)
/// - `Prefer`: Try SSL first, fall back to non-SSL (default)
/// - `Require`: Require SSL but don't verify certificate
/// - `VerifyCa`: Require SSL and verify the server certificate is signed by a trusted CA
/// - `VerifyFull`: Like VerifyCa, but also verify the server hostname matches the certificate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl ConnectionConfig {
    pub fn connection_string(&self) -> String {
        // tokio-postgres only knows disable/prefer/require; certificate
        // verification is configured on the TLS connector instead.
        let sslmode = match self.ssl_mode {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => "require",
        };
        format!(
            "host={} port={} dbname={} user={} password={} sslmode={} connect_timeout=10",
            quote_conn_value(&self.host),
            self.port,
            quote_conn_value(&self.database),
            quote_conn_value(&self.username),
            quote_conn_value(&self.password),
            sslmode
        )
    }

    pub fn display_string(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: 5432,
            database: String::from("postgres"),
            username: String::from("postgres"),
            password: String::new(),
            ssl_mode: SslMode::default(),
            accept_invalid_certs: false,
            ca_cert_path: None,
            pool_size: default_pool_size(),
        }
    }
}

/// Build a connection pool for `config`. Connections are opened lazily.
pub fn create_pool(config: &ConnectionConfig) -> Result<Pool> {
    let pg_config: tokio_postgres::Config = config
        .connection_string()
        .parse()
        .context("Invalid PostgreSQL connection settings")?;
    let manager_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };

    let manager = match config.ssl_mode {
        SslMode::Disable => Manager::from_config(pg_config, NoTls, manager_config),
        SslMode::Prefer | SslMode::Require => {
            let tls = build_tls_connector(config, false)?;
            Manager::from_config(pg_config, tls, manager_config)
        }
        SslMode::VerifyCa | SslMode::VerifyFull => {
            let tls = build_tls_connector(config, true)?;
            Manager::from_config(pg_config, tls, manager_config)
        }
    };

    Pool::builder(manager)
        .max_size(config.pool_size.max(1))
        .build()
        .context("Failed to build PostgreSQL connection pool")
}

/// Build a TLS connector with appropriate certificate configuration.
///
/// # Arguments
/// * `config` - Connection configuration
/// * `strict_verify` - If true, always verify certificates (for verify-ca/verify-full modes)
fn build_tls_connector(config: &ConnectionConfig, strict_verify: bool) -> Result<MakeTlsConnector> {
    let mut builder = native_tls::TlsConnector::builder();

    if config.accept_invalid_certs && !strict_verify {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    } else if let Some(ca_path) = &config.ca_cert_path {
        let ca_data = std::fs::read(ca_path)
            .with_context(|| format!("Failed to read CA certificate file: {}", ca_path))?;
        let cert = native_tls::Certificate::from_pem(&ca_data)
            .with_context(|| format!("Failed to parse CA certificate: {}", ca_path))?;
        builder.add_root_certificate(cert);
    }
    if config.ssl_mode == SslMode::VerifyCa {
        builder.danger_accept_invalid_hostnames(true);
    }

    let connector = builder.build().context("Failed to build TLS connector")?;

    Ok(MakeTlsConnector::new(connector))
}

/// Quote a value for use in a libpq key=value connection string.
/// Wraps in single quotes and escapes backslashes and single quotes.
fn quote_conn_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

/// [`Executor`] over a deadpool-managed PostgreSQL pool.
pub struct PgExecutor {
    pool: Pool,
}

impl PgExecutor {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn connect(config: &ConnectionConfig) -> Result<Self> {
        Ok(Self::new(create_pool(config)?))
    }
}

fn to_pg_param(param: &SqlParam) -> Box<dyn ToSql + Sync + Send> {
    match param {
        SqlParam::Null => Box::new(Option::<String>::None),
        SqlParam::Bool(v) => Box::new(*v),
        SqlParam::Int(v) => Box::new(*v),
        SqlParam::Float(v) => Box::new(*v),
        SqlParam::Text(v) => Box::new(v.clone()),
        SqlParam::Bytes(v) => Box::new(v.clone()),
    }
}

async fn run(
    client: &Object,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<RowSet, tokio_postgres::Error> {
    let statement = client.prepare_cached(sql).await?;
    if statement.columns().is_empty() {
        let affected = client.execute(&statement, params).await?;
        Ok(RowSet::affected(affected))
    } else {
        let rows = client.query(&statement, params).await?;
        Ok(RowSet::rows(rows_to_records(&rows)))
    }
}

#[async_trait]
impl Executor for PgExecutor {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<RowSet, ExecError> {
        debug!(sql, params = params.len(), "executing statement");
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| ExecError::connection(format!("failed to acquire connection: {}", e), false))?;

        let values: Vec<Box<dyn ToSql + Sync + Send>> = params.iter().map(to_pg_param).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = values
            .iter()
            .map(|v| v.as_ref() as &(dyn ToSql + Sync))
            .collect();

        match run(&client, sql, &refs).await {
            Ok(result) => Ok(result),
            Err(err) => {
                let err = ExecError::from_pg_error(&err, sql);
                if err.fatal {
                    warn!(error = %err.message, "discarding broken connection");
                    drop(Object::take(client));
                }
                Err(err)
            }
        }
    }

    async fn close(&self) -> bool {
        self.pool.close();
        true
    }
}
