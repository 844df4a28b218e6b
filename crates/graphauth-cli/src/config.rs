//! CLI configuration
//!
//! Loaded from a TOML or JSON file (picked by extension), then overridden by
//! `GRAPHAUTH_*` environment variables and finally by command-line flags.

use anyhow::{anyhow, bail, Context, Result};
use graphauth_rules::config::DEFAULT_DIRECTIVE;
use graphauth_rules::RegistryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

const ENV_PREFIX: &str = "GRAPHAUTH_";
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// How command results are printed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human readable text with DQL snippets
    #[default]
    Text,
    /// Pretty printed JSON
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(anyhow!("Unknown output format: {other}")),
        }
    }
}

/// Settings shared by every subcommand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Default tracing filter
    pub log_level: String,
    /// Output format
    pub format: OutputFormat,
    /// Directive carrying authorization rules
    pub directive: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: OutputFormat::Text,
            directive: DEFAULT_DIRECTIVE.to_string(),
        }
    }
}

impl CliConfig {
    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content).context("Invalid TOML config"),
            Some("json") => serde_json::from_str(&content).context("Invalid JSON config"),
            _ => bail!("Unsupported config format: {}", path.display()),
        }
    }

    /// Merge with `GRAPHAUTH_*` environment variables
    pub fn merge_with_env(&mut self) -> Result<()> {
        self.merge_vars(std::env::vars())
    }

    fn merge_vars(&mut self, vars: impl IntoIterator<Item = (String, String)>) -> Result<()> {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "LOG_LEVEL" => self.log_level = value,
                "FORMAT" => {
                    self.format = value
                        .parse()
                        .with_context(|| format!("Invalid format in {key}"))?;
                }
                "DIRECTIVE" => self.directive = value,
                _ => {}
            }
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            bail!(
                "Invalid log level `{}`; expected one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            );
        }
        self.registry_config()
            .validate()
            .map_err(|e| anyhow!("Invalid directive setting: {e}"))
    }

    /// Registry options derived from this configuration
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig::with_directive(self.directive.clone())
    }
}
