//! Auth Registry
//!
//! The registry maps each schema type to its compiled rules: one optional
//! container for the type-level directive and one per field that carries its
//! own directive. Each container holds up to four trees, one per lifecycle
//! operation.
//!
//! A registry is built once per schema load and never modified. Reloading
//! builds a fresh registry and publishes it through [`RegistryHandle`];
//! requests keep whichever snapshot they captured at dispatch.

use crate::compile::CompiledRule;
use crate::config::RegistryConfig;
use crate::directive::DirectiveValue;
use crate::errors::{AuthRuleError, Result};
use crate::schema::SchemaModel;
use crate::tree::{ParseContext, RuleNode};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle operation a rule tree guards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthOperation {
    /// Reading nodes
    Query,
    /// Creating nodes
    Add,
    /// Modifying nodes
    Update,
    /// Removing nodes
    Delete,
}

impl AuthOperation {
    /// All operations, in compilation order
    pub const ALL: [AuthOperation; 4] = [Self::Query, Self::Add, Self::Update, Self::Delete];

    /// Directive key for this operation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for AuthOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthOperation {
    type Err = AuthRuleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| AuthRuleError::schema(format!("Unknown auth operation: {s}")))
    }
}

/// Rule trees for the four lifecycle operations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthContainer {
    /// Rule for reads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<RuleNode>,
    /// Rule for creation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add: Option<RuleNode>,
    /// Rule for updates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<RuleNode>,
    /// Rule for deletion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<RuleNode>,
}

impl AuthContainer {
    /// Tree for an operation
    pub fn get(&self, op: AuthOperation) -> Option<&RuleNode> {
        match op {
            AuthOperation::Query => self.query.as_ref(),
            AuthOperation::Add => self.add.as_ref(),
            AuthOperation::Update => self.update.as_ref(),
            AuthOperation::Delete => self.delete.as_ref(),
        }
    }

    fn slot(&mut self, op: AuthOperation) -> &mut Option<RuleNode> {
        match op {
            AuthOperation::Query => &mut self.query,
            AuthOperation::Add => &mut self.add,
            AuthOperation::Update => &mut self.update,
            AuthOperation::Delete => &mut self.delete,
        }
    }

    /// Present trees with their operation
    pub fn iter(&self) -> impl Iterator<Item = (AuthOperation, &RuleNode)> {
        AuthOperation::ALL
            .into_iter()
            .filter_map(move |op| self.get(op).map(|node| (op, node)))
    }

    /// Number of present trees
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// True when no operation has a rule
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when any present tree is decidable from claims alone
    pub fn is_rbac(&self) -> bool {
        self.iter().any(|(_, node)| node.is_rbac())
    }

    /// Classify and compile the tree for an operation
    pub fn compile(&self, op: AuthOperation) -> Option<CompiledRule> {
        self.get(op).map(CompiledRule::for_node)
    }

    /// Compile every operation entry of one directive
    ///
    /// Returns `Ok(None)` when the directive arguments are not an object.
    /// Operation entries that are not objects are left empty.
    pub fn parse<S>(ctx: &mut ParseContext<'_, S>, directive: &DirectiveValue) -> Result<Option<Self>>
    where
        S: SchemaModel + ?Sized,
    {
        if directive.as_object().is_none() {
            warn!(
                type_name = ctx.current_type(),
                shape = directive.shape(),
                "auth directive arguments are not an object; skipping"
            );
            return Ok(None);
        }

        let mut container = Self::default();
        for op in AuthOperation::ALL {
            let Some(entry) = directive.get(op.as_str()) else {
                continue;
            };
            if entry.as_object().is_none() {
                warn!(
                    type_name = ctx.current_type(),
                    operation = %op,
                    shape = entry.shape(),
                    "auth operation entry is not an object; skipping"
                );
                continue;
            }
            *container.slot(op) = Some(ctx.parse_rules(entry)?);
        }
        Ok(Some(container))
    }
}

/// Compiled rules of one schema type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeAuth {
    /// Type-level rules
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<AuthContainer>,
    /// Field-level rules keyed by field name
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub fields: IndexMap<String, AuthContainer>,
}

impl TypeAuth {
    /// Number of rule trees across the type and its fields
    pub fn rule_count(&self) -> usize {
        self.rules.as_ref().map_or(0, AuthContainer::len)
            + self.fields.values().map(AuthContainer::len).sum::<usize>()
    }
}

/// Compiled authorization rules for a whole schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthRegistry {
    types: IndexMap<String, TypeAuth>,
}

impl AuthRegistry {
    /// Compile every authorization directive in `schema`
    ///
    /// Rule ids restart at 1 for each type and continue across the type's own
    /// directive and its field directives.
    pub fn build<S>(schema: &S, config: &RegistryConfig) -> Result<Self>
    where
        S: SchemaModel + ?Sized,
    {
        config.validate()?;
        let directive = config.directive_name.as_str();

        let mut types = IndexMap::new();
        for type_name in schema.type_names() {
            let mut ctx = ParseContext::new(schema, type_name);
            let mut auth = TypeAuth::default();

            if let Some(args) = schema.type_directive(type_name, directive) {
                auth.rules = AuthContainer::parse(&mut ctx, args)?;
            }

            for field_name in schema.field_names(type_name) {
                let Some(args) = schema.field_directive(type_name, field_name, directive) else {
                    continue;
                };
                if let Some(container) = AuthContainer::parse(&mut ctx, args)? {
                    auth.fields.insert(field_name.to_string(), container);
                }
            }

            debug!(type_name, rules = auth.rule_count(), "compiled auth rules");
            types.insert(type_name.to_string(), auth);
        }

        let registry = Self { types };
        info!(
            types = registry.len(),
            rules = registry.rule_count(),
            "built auth registry"
        );
        Ok(registry)
    }

    /// Rules attached to a type itself
    pub fn type_rules(&self, type_name: &str) -> Option<&AuthContainer> {
        self.types.get(type_name)?.rules.as_ref()
    }

    /// Rules attached to one field of a type
    pub fn field_rules(&self, type_name: &str, field_name: &str) -> Option<&AuthContainer> {
        self.types.get(type_name)?.fields.get(field_name)
    }

    /// Type-level tree for one operation
    pub fn rules_for(&self, type_name: &str, op: AuthOperation) -> Option<&RuleNode> {
        self.type_rules(type_name)?.get(op)
    }

    /// Field-level tree for one operation
    pub fn field_rules_for(
        &self,
        type_name: &str,
        field_name: &str,
        op: AuthOperation,
    ) -> Option<&RuleNode> {
        self.field_rules(type_name, field_name)?.get(op)
    }

    /// Record for a type
    pub fn get(&self, type_name: &str) -> Option<&TypeAuth> {
        self.types.get(type_name)
    }

    /// Types in schema order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypeAuth)> {
        self.types.iter().map(|(name, auth)| (name.as_str(), auth))
    }

    /// Number of types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True for a registry built from a schema without types
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Number of rule trees across all types
    pub fn rule_count(&self) -> usize {
        self.types.values().map(TypeAuth::rule_count).sum()
    }
}

/// Publication point for the current registry snapshot
#[derive(Debug, Default)]
pub struct RegistryHandle {
    current: RwLock<Arc<AuthRegistry>>,
}

impl RegistryHandle {
    /// Start with an already built registry
    pub fn new(registry: AuthRegistry) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
        }
    }

    /// Registry to use for the rest of a request
    pub fn snapshot(&self) -> Arc<AuthRegistry> {
        Arc::clone(&self.current.read())
    }

    /// Replace the current registry, returning the previous one
    pub fn publish(&self, registry: AuthRegistry) -> Arc<AuthRegistry> {
        let next = Arc::new(registry);
        let previous = std::mem::replace(&mut *self.current.write(), next);
        info!("published new auth registry snapshot");
        previous
    }

    /// Rebuild from a (re)loaded schema and publish it
    ///
    /// On failure the current snapshot stays in place.
    pub fn reload<S>(&self, schema: &S, config: &RegistryConfig) -> Result<Arc<AuthRegistry>>
    where
        S: SchemaModel + ?Sized,
    {
        let registry = AuthRegistry::build(schema, config).map_err(|err| {
            warn!(error = %err, "auth registry rebuild failed; keeping previous snapshot");
            err
        })?;
        self.publish(registry);
        Ok(self.snapshot())
    }
}
