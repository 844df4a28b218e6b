// Subcommand implementations

pub mod check;
pub mod compile;
pub mod explain;

use anyhow::{Context, Result};
use graphauth_rules::{AuthRegistry, InMemorySchema};
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::config::CliConfig;

/// Load and validate a schema document
pub fn load_schema(path: &Path) -> Result<InMemorySchema> {
    let schema = InMemorySchema::load(path)
        .with_context(|| format!("Failed to load schema {}", path.display()))?;
    info!(path = %path.display(), "Loaded schema");
    Ok(schema)
}

/// Compile the rules of a loaded schema with the configured directive
pub fn build_registry(config: &CliConfig, schema: &InMemorySchema) -> Result<AuthRegistry> {
    AuthRegistry::build(schema, &config.registry_config()).context("Failed to compile auth rules")
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
