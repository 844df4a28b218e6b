// Compiled rule output

use anyhow::{bail, Result};
use graphauth_rules::{AuthContainer, AuthOperation, AuthRegistry, CompiledRule, RuleId};
use serde::Serialize;
use std::path::Path;

use super::{build_registry, load_schema, print_json};
use crate::config::{CliConfig, OutputFormat};

/// Which rule trees to print
#[derive(Debug, Default)]
pub struct Selection {
    type_name: Option<String>,
    field: Option<String>,
    operation: Option<AuthOperation>,
}

impl Selection {
    pub fn new(
        type_name: Option<String>,
        field: Option<String>,
        operation: Option<String>,
    ) -> Result<Self> {
        if field.is_some() && type_name.is_none() {
            bail!("--field requires --type");
        }
        let operation = operation.map(|op| op.parse::<AuthOperation>()).transpose()?;
        Ok(Self {
            type_name,
            field,
            operation,
        })
    }

    fn wants_type(&self, type_name: &str) -> bool {
        self.type_name.as_deref().map_or(true, |t| t == type_name)
    }

    fn wants_operation(&self, op: AuthOperation) -> bool {
        self.operation.map_or(true, |o| o == op)
    }
}

#[derive(Debug, Serialize)]
struct CompiledEntry<'a> {
    type_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'a str>,
    operation: AuthOperation,
    rule_id: RuleId,
    #[serde(flatten)]
    compiled: CompiledRule,
}

pub fn run(config: &CliConfig, schema_path: &Path, selection: &Selection) -> Result<()> {
    let schema = load_schema(schema_path)?;
    let registry = build_registry(config, &schema)?;

    if let Some(type_name) = &selection.type_name {
        if registry.get(type_name).is_none() {
            bail!("Unknown type: {type_name}");
        }
    }

    let entries = select(&registry, selection);
    match config.format {
        OutputFormat::Json => print_json(&entries)?,
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No matching auth rules");
            }
            for entry in &entries {
                print_entry(entry);
            }
        }
    }
    Ok(())
}

fn select<'a>(registry: &'a AuthRegistry, selection: &Selection) -> Vec<CompiledEntry<'a>> {
    let mut entries = Vec::new();
    for (type_name, auth) in registry.iter() {
        if !selection.wants_type(type_name) {
            continue;
        }
        match selection.field.as_deref() {
            Some(field) => {
                if let Some((name, container)) = auth.fields.get_key_value(field) {
                    push_container(&mut entries, type_name, Some(name), container, selection);
                }
            }
            None => {
                if let Some(container) = &auth.rules {
                    push_container(&mut entries, type_name, None, container, selection);
                }
                for (name, container) in &auth.fields {
                    push_container(&mut entries, type_name, Some(name), container, selection);
                }
            }
        }
    }
    entries
}

fn push_container<'a>(
    entries: &mut Vec<CompiledEntry<'a>>,
    type_name: &'a str,
    field: Option<&'a String>,
    container: &'a AuthContainer,
    selection: &Selection,
) {
    for (operation, node) in container.iter() {
        if !selection.wants_operation(operation) {
            continue;
        }
        entries.push(CompiledEntry {
            type_name,
            field: field.map(String::as_str),
            operation,
            rule_id: node.rule_id(),
            compiled: CompiledRule::for_node(node),
        });
    }
}

fn print_entry(entry: &CompiledEntry<'_>) {
    let target = match entry.field {
        Some(field) => format!("{}.{}", entry.type_name, field),
        None => entry.type_name.to_string(),
    };
    println!("{target} {} (rule {})", entry.operation, entry.rule_id);

    if entry.compiled.rbac {
        println!("  rbac: decided from claims");
        println!();
        return;
    }
    match &entry.compiled.filter {
        Some(filter) => println!("  filter: {filter}"),
        None => println!("  filter: none"),
    }
    for query in &entry.compiled.queries {
        for line in query.to_string().lines() {
            println!("  {line}");
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphauth_rules::schema::{FieldDefinition, TypeDefinition};
    use graphauth_rules::{DirectiveValue, InMemorySchema, RegistryConfig};
    use serde_json::json;

    fn registry() -> AuthRegistry {
        let post_auth = DirectiveValue::try_from(json!({
            "query": { "rule": "filter(eq(authorId, $USER))" },
            "delete": { "rule": "$admin" }
        }))
        .unwrap();
        let draft_auth =
            DirectiveValue::try_from(json!({ "query": { "rule": "eq(hidden, false)" } })).unwrap();
        let schema = InMemorySchema::new([
            TypeDefinition::object("Post")
                .field("authorId", "String")
                .field("hidden", "Boolean")
                .with_field(FieldDefinition::new("draft", "String").directive("auth", draft_auth))
                .directive("auth", post_auth),
            TypeDefinition::object("Tag").field("name", "String"),
        ])
        .unwrap();
        AuthRegistry::build(&schema, &RegistryConfig::default()).unwrap()
    }

    #[test]
    fn test_select_everything() {
        let registry = registry();
        let entries = select(&registry, &Selection::default());
        let ids: Vec<_> = entries.iter().map(|e| e.rule_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        assert!(!entries[0].compiled.rbac);
        assert_eq!(entries[0].compiled.queries[0].name(), "rule_Post.authorId_1");
        assert!(entries[1].compiled.rbac);
        assert_eq!(entries[2].field, Some("draft"));
        assert!(entries[2].compiled.queries.is_empty());
    }

    #[test]
    fn test_select_by_field_and_operation() {
        let registry = registry();

        let selection =
            Selection::new(Some("Post".into()), None, Some("DELETE".into())).unwrap();
        let entries = select(&registry, &selection);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, AuthOperation::Delete);

        let selection = Selection::new(Some("Post".into()), Some("draft".into()), None).unwrap();
        let entries = select(&registry, &selection);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].rule_id, 3);
    }

    #[test]
    fn test_selection_validation() {
        assert!(Selection::new(None, Some("draft".into()), None).is_err());
        assert!(Selection::new(None, None, Some("publish".into())).is_err());
    }

    #[test]
    fn test_json_entry_shape() {
        let registry = registry();
        let entries = select(&registry, &Selection::default());
        let json = serde_json::to_value(&entries[0]).unwrap();
        assert_eq!(json["type_name"], "Post");
        assert_eq!(json["operation"], "query");
        assert_eq!(json["rbac"], false);
        assert!(json.get("field").is_none());
    }
}
