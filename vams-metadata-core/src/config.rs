use crate::entity::DEFAULT_FALLBACK_DATABASE;
use anyhow::{Context, Result};
use opendal::Operator;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_IMPORT_BYTES: u64 = 5 * 1024 * 1024;
pub const DEFAULT_REPLACE_ALL_LIMIT: usize = 500;

fn default_fallback_database_id() -> String {
    DEFAULT_FALLBACK_DATABASE.to_string()
}

fn default_max_import_bytes() -> u64 {
    DEFAULT_MAX_IMPORT_BYTES
}

fn default_replace_all_limit() -> usize {
    DEFAULT_REPLACE_ALL_LIMIT
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EditorConfig {
    #[serde(default = "default_fallback_database_id")]
    pub fallback_database_id: String,
    #[serde(default = "default_max_import_bytes")]
    pub max_import_bytes: u64,
    #[serde(default = "default_replace_all_limit")]
    pub replace_all_limit: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub storage_uri: Option<String>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            fallback_database_id: default_fallback_database_id(),
            max_import_bytes: default_max_import_bytes(),
            replace_all_limit: default_replace_all_limit(),
            log_level: default_log_level(),
            storage_uri: None,
        }
    }
}

impl EditorConfig {
    /// Parse YAML (JSON is accepted too, being a subset).
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).context("Failed to parse editor config")
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub async fn load(op: &Operator, path: &str) -> Result<Self> {
        if !op.exists(path).await? {
            return Ok(Self::default());
        }
        let bytes = op.read(path).await?;
        let content =
            String::from_utf8(bytes.to_vec()).context(format!("Config {} is not UTF-8", path))?;
        Self::from_yaml_str(&content)
    }
}
