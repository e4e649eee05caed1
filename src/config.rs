use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ast::Dialect;
use crate::db::{ConnectionConfig, SyncOptions};
use crate::model::{ModelRegistry, Schema};

/// Settings of the `relsql` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    #[serde(default = "default_dialect")]
    pub dialect: Dialect,
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Model definitions file (TOML or JSON).
    #[serde(default)]
    pub models: Option<PathBuf>,
    #[serde(default)]
    pub sync: SyncOptions,
}

fn default_dialect() -> Dialect {
    Dialect::Postgres
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            dialect: default_dialect(),
            connection: ConnectionConfig::default(),
            models: None,
            sync: SyncOptions::default(),
        }
    }
}

impl AdapterConfig {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("relsql")
            .join("config.toml")
    }

    /// Load `path`, or the default location when `None`. A missing default
    /// file yields the default settings; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let path = Self::default_path();
                if !path.exists() {
                    return Ok(Self::default());
                }
                path
            }
        };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsFile {
    #[serde(default)]
    pub models: Vec<Schema>,
}

/// Read model definitions and build the registry. Files ending in `.json`
/// are read as JSON, everything else as TOML.
pub fn load_models(path: &Path) -> Result<ModelRegistry> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read models file: {}", path.display()))?;
    let file: ModelsFile = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse models file: {}", path.display()))?
    } else {
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse models file: {}", path.display()))?
    };
    let registry = ModelRegistry::new(file.models)
        .with_context(|| format!("Invalid models in {}", path.display()))?;
    Ok(registry)
}
