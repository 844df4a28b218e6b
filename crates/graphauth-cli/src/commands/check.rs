// Whole-schema rule check

use anyhow::Result;
use graphauth_rules::{AuthContainer, AuthRegistry};
use serde::Serialize;
use std::path::Path;

use super::{build_registry, load_schema, print_json};
use crate::config::{CliConfig, OutputFormat};

#[derive(Debug, Serialize)]
struct TypeReport<'a> {
    type_name: &'a str,
    operations: Vec<&'static str>,
    fields: Vec<&'a str>,
    rules: usize,
}

pub fn run(config: &CliConfig, schema_path: &Path) -> Result<()> {
    let schema = load_schema(schema_path)?;
    let registry = build_registry(config, &schema)?;
    let reports = summarize(&registry);

    match config.format {
        OutputFormat::Json => print_json(&reports)?,
        OutputFormat::Text => {
            println!("Auth rules in {}:", schema_path.display());
            println!();
            for report in &reports {
                println!(
                    "  {:<24} {} rule(s)  type: [{}]  fields: [{}]",
                    report.type_name,
                    report.rules,
                    report.operations.join(", "),
                    report.fields.join(", ")
                );
            }
            println!();
            println!(
                "{} type(s), {} rule tree(s)",
                registry.len(),
                registry.rule_count()
            );
        }
    }
    Ok(())
}

fn summarize(registry: &AuthRegistry) -> Vec<TypeReport<'_>> {
    registry
        .iter()
        .map(|(type_name, auth)| TypeReport {
            type_name,
            operations: auth
                .rules
                .iter()
                .flat_map(AuthContainer::iter)
                .map(|(op, _)| op.as_str())
                .collect(),
            fields: auth.fields.keys().map(String::as_str).collect(),
            rules: auth.rule_count(),
        })
        .collect()
}
