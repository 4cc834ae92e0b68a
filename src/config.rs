//! JSON configuration file.

use crate::render::RenderOptions;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    5432
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub include_tables: Vec<String>,
    #[serde(default)]
    pub exclude_tables: Vec<String>,
    #[serde(default = "default_true")]
    pub include_types: bool,
    #[serde(default)]
    pub pure_markdown: bool,
    #[serde(default = "default_true")]
    pub include_rls: bool,
    #[serde(default)]
    pub include_toc: bool,
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("\"host\" must not be empty".to_string()));
        }
        if self.database.trim().is_empty() {
            return Err(ConfigError::Invalid("\"database\" must not be empty".to_string()));
        }
        Ok(())
    }

    /// Connection string in the key/value form `tokio_postgres` accepts.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={}",
            quote_value(&self.host),
            self.port,
            quote_value(&self.user),
            quote_value(&self.password),
            quote_value(&self.database)
        )
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            include_types: self.include_types,
            pure_markdown: self.pure_markdown,
            include_rls: self.include_rls,
            include_toc: self.include_toc,
            ..Default::default()
        }
    }
}

fn quote_value(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
