// Single rule walkthrough

use anyhow::{bail, Result};
use graphauth_rules::{tokenize, AtomKind, InMemorySchema, RuleChain, SchemaModel};
use serde::Serialize;
use std::path::Path;

use super::{load_schema, print_json};
use crate::config::{CliConfig, OutputFormat};

#[derive(Debug, Serialize)]
struct Explanation<'a> {
    rule: &'a str,
    tokens: Vec<&'a str>,
    chain: Option<RuleChain>,
    touches_data: bool,
    is_filter: bool,
    emits_query: bool,
}

pub fn run(config: &CliConfig, schema_path: &Path, type_name: &str, rule: &str) -> Result<()> {
    let schema = load_schema(schema_path)?;
    let explanation = explain(&schema, type_name, rule)?;

    match config.format {
        OutputFormat::Json => print_json(&explanation)?,
        OutputFormat::Text => {
            println!("rule:   {rule}");
            println!("tokens: [{}]", explanation.tokens.join(", "));
            let Some(chain) = &explanation.chain else {
                println!("chain:  empty (treated as no rule)");
                return Ok(());
            };
            println!("chain:  {chain}");
            for atom in chain.atoms() {
                let role = match atom.kind() {
                    AtomKind::SchemaField { .. } => "field",
                    AtomKind::Operation(_) => "operation",
                    AtomKind::JwtVariable | AtomKind::Constant => "operand",
                };
                println!("  {role:<9} {atom}");
            }
            let class = if explanation.touches_data {
                "data rule"
            } else {
                "RBAC rule"
            };
            println!("class:  {class}");
            if explanation.emits_query {
                println!("        emits an auxiliary query");
            }
        }
    }
    Ok(())
}

fn explain<'a>(schema: &InMemorySchema, type_name: &str, rule: &'a str) -> Result<Explanation<'a>> {
    if !schema.has_type(type_name) {
        bail!("Unknown type: {type_name}");
    }
    let chain = RuleChain::build(rule, type_name, schema)?;
    Ok(Explanation {
        rule,
        tokens: tokenize(rule),
        touches_data: chain.as_ref().is_some_and(RuleChain::touches_data),
        is_filter: chain.as_ref().is_some_and(RuleChain::is_filter),
        emits_query: chain.as_ref().is_some_and(|c| {
            c.is_filter() && c.touches_data() && c.comparison().is_some() && c.operand().is_some()
        }),
        chain,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphauth_rules::schema::TypeDefinition;

    fn schema() -> InMemorySchema {
        InMemorySchema::new([
            TypeDefinition::object("Author").field("name", "String"),
            TypeDefinition::object("Post").field("author", "Author"),
        ])
        .unwrap()
    }

    #[test]
    fn test_explain_data_rule() {
        let schema = schema();
        let explanation = explain(&schema, "Post", "filter(eq(author, name, $USER))").unwrap();
        assert_eq!(
            explanation.tokens,
            vec!["filter", "eq", "author", "name", "$USER"]
        );
        assert!(explanation.touches_data);
        assert!(explanation.is_filter);
        assert!(explanation.emits_query);
        assert_eq!(explanation.chain.map(|c| c.len()), Some(5));
    }

    #[test]
    fn test_explain_rbac_and_empty_rules() {
        let schema = schema();
        let explanation = explain(&schema, "Post", "eq($ROLE, admin)").unwrap();
        assert!(!explanation.touches_data);

        let explanation = explain(&schema, "Post", " ( ) ").unwrap();
        assert!(explanation.tokens.is_empty());
        assert!(explanation.chain.is_none());
    }

    #[test]
    fn test_incomplete_filter_emits_no_query() {
        let explanation = explain(&schema(), "Post", "filter(author)").unwrap();
        assert!(explanation.is_filter);
        assert!(explanation.touches_data);
        assert!(!explanation.emits_query);
    }

    #[test]
    fn test_unknown_type() {
        assert!(explain(&schema(), "Comment", "$ROLE").is_err());
    }
}
