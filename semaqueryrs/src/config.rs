//! Configuration for the query compiler.
//!
//! TOML-based; every field has a built-in default so an empty file is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dialect::DialectKind;
use crate::error::{Result, SemaqueryError};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SemaqueryConfig {
    pub compiler: CompilerConfig,
}

/// Compilation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Target SQL dialect (default: bigquery).
    pub dialect: DialectKind,
    /// CTE name of the raw mega table.
    pub mega_table_alias: String,
    /// CTE name of the aggregated mega table.
    pub aggregated_alias: String,
    /// Row limit applied when the request sets none (0 = no default limit).
    pub default_row_limit: u64,
    /// Upper bound on any limit (0 = unlimited).
    pub max_row_limit: u64,
    /// Maximum metrics + dimensions in one request (0 = unlimited).
    pub max_requested_items: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            dialect: DialectKind::default(),
            mega_table_alias: "mega_table".to_string(),
            aggregated_alias: "mega_table_aggregated".to_string(),
            default_row_limit: 0, // 0 = pass the request's limit through
            max_row_limit: 0, // 0 = unlimited
            max_requested_items: 64,
        }
    }
}

impl CompilerConfig {
    /// LIMIT for a request: its own limit or the default, capped by the maximum.
    pub fn effective_limit(&self, requested: Option<u64>) -> Option<u64> {
        let limit = requested.or((self.default_row_limit > 0).then_some(self.default_row_limit));
        match (limit, self.max_row_limit) {
            (limit, 0) => limit,
            (Some(limit), max) => Some(limit.min(max)),
            (None, max) => Some(max),
        }
    }
}

impl SemaqueryConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SemaqueryError::Config(format!("failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(toml_str)
            .map_err(|e| SemaqueryError::Config(format!("failed to parse config: {e}")))?;
        if cfg.compiler.mega_table_alias == cfg.compiler.aggregated_alias {
            return Err(SemaqueryError::Config(
                "mega_table_alias and aggregated_alias must differ".to_string(),
            ));
        }
        Ok(cfg)
    }

    /// Load from default locations (env var, cwd, user config dir, or defaults).
    ///
    /// Search order:
    /// 1. `SEMAQUERY_CONFIG` environment variable
    /// 2. `./semaquery.toml` (current directory)
    /// 3. `~/.config/semaquery/config.toml` (user config dir)
    /// 4. Built-in defaults
    pub fn load_default() -> Self {
        if let Ok(path) = std::env::var("SEMAQUERY_CONFIG") {
            match Self::from_file(&path) {
                Ok(cfg) => {
                    tracing::info!(path = %path, "loaded config from SEMAQUERY_CONFIG");
                    return cfg;
                }
                Err(err) => tracing::warn!(path = %path, error = %err, "ignoring SEMAQUERY_CONFIG"),
            }
        }

        if let Ok(cfg) = Self::from_file("semaquery.toml") {
            tracing::info!("loaded config from ./semaquery.toml");
            return cfg;
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("semaquery").join("config.toml");
            if let Ok(cfg) = Self::from_file(&user_config) {
                tracing::info!(path = %user_config.display(), "loaded config from user config dir");
                return cfg;
            }
        }

        tracing::debug!("no config file found, using defaults");
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = SemaqueryConfig::default();
        assert_eq!(cfg.compiler.dialect, DialectKind::Bigquery);
        assert_eq!(cfg.compiler.mega_table_alias, "mega_table");
        assert_eq!(cfg.compiler.default_row_limit, 0);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[compiler]
dialect = "duckdb"
max_row_limit = 500
"#;
        let cfg = SemaqueryConfig::from_toml(toml).unwrap();
        assert_eq!(cfg.compiler.dialect, DialectKind::Duckdb);
        assert_eq!(cfg.compiler.max_row_limit, 500);
        assert_eq!(cfg.compiler.aggregated_alias, "mega_table_aggregated");
    }

    #[test]
    fn test_alias_clash_rejected() {
        let toml = r#"
[compiler]
mega_table_alias = "t"
aggregated_alias = "t"
"#;
        assert!(SemaqueryConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_effective_limit() {
        let mut cfg = CompilerConfig::default();
        assert_eq!(cfg.effective_limit(None), None);
        assert_eq!(cfg.effective_limit(Some(20)), Some(20));

        cfg.default_row_limit = 1000;
        assert_eq!(cfg.effective_limit(None), Some(1000));

        cfg.max_row_limit = 50;
        assert_eq!(cfg.effective_limit(Some(200)), Some(50));
        assert_eq!(cfg.effective_limit(None), Some(50));
    }
}
