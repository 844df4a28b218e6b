//! Schema Model
//!
//! The compiler never walks the GraphQL schema AST directly. It reaches the
//! schema through [`SchemaModel`], which exposes type and field lookup, parent
//! interfaces, predicate-name resolution and directive lookup.
//!
//! [`InMemorySchema`] is the implementation used by the CLI and the test
//! suite. It is loaded from a [`SchemaDocument`] (JSON or TOML) and resolves
//! storage predicates the way the graph store names them:
//!
//! 1. a field with an explicit `pred` uses it verbatim;
//! 2. a field inherited from an interface is named `<Interface>.<field>`;
//! 3. otherwise the field is named `<Type>.<field>`.
//!
//! In cases 2 and 3 the owner's `dgraph_type` replaces its GraphQL name when set.

use crate::directive::DirectiveValue;
use crate::errors::{AuthRuleError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use tracing::warn;

/// Scalars every schema knows about without declaring them
pub const BUILTIN_SCALARS: &[&str] = &["ID", "String", "Int", "Float", "Boolean", "DateTime"];

/// Typed accessors the rule compiler needs from the schema
pub trait SchemaModel {
    /// Object and interface types, in schema order
    fn type_names(&self) -> Vec<&str>;

    /// Whether the schema declares (or builds in) this type
    fn has_type(&self, type_name: &str) -> bool;

    /// Fields declared on a type, in declaration order
    fn field_names(&self, type_name: &str) -> Vec<&str>;

    /// Declared (named) type of a field, or `None` if the type has no such field
    fn field_type(&self, type_name: &str, field_name: &str) -> Option<&str>;

    /// Interfaces a type implements
    fn parent_interfaces(&self, type_name: &str) -> &[String];

    /// Storage predicate backing `type_name.field_name`
    fn predicate(&self, type_name: &str, field_name: &str) -> Option<String>;

    /// Arguments of a directive attached to a type
    fn type_directive(&self, type_name: &str, directive: &str) -> Option<&DirectiveValue>;

    /// Arguments of a directive attached to a field
    fn field_directive(
        &self,
        type_name: &str,
        field_name: &str,
        directive: &str,
    ) -> Option<&DirectiveValue>;
}

/// Kind of a schema type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    /// Object type
    #[default]
    Object,
    /// Interface type
    Interface,
    /// Scalar type
    Scalar,
}

/// Serialized schema description
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDocument {
    /// Declared types
    #[serde(default)]
    pub types: Vec<TypeDefinition>,
}

/// A declared type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDefinition {
    /// GraphQL type name
    pub name: String,
    /// Type kind
    #[serde(default)]
    pub kind: TypeKind,
    /// Implemented interfaces
    #[serde(default)]
    pub interfaces: Vec<String>,
    /// Storage type name override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dgraph_type: Option<String>,
    /// Directives keyed by name
    #[serde(
        default,
        deserialize_with = "decode_directives",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub directives: IndexMap<String, DirectiveValue>,
    /// Declared fields
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

/// A declared field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field name
    pub name: String,
    /// Named type of the field (list and non-null wrappers stripped)
    #[serde(rename = "type")]
    pub type_name: String,
    /// Storage predicate override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pred: Option<String>,
    /// Directives keyed by name
    #[serde(
        default,
        deserialize_with = "decode_directives",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub directives: IndexMap<String, DirectiveValue>,
}

impl TypeDefinition {
    /// New object type
    pub fn object(name: impl Into<String>) -> Self {
        Self::with_kind(name, TypeKind::Object)
    }

    /// New interface type
    pub fn interface(name: impl Into<String>) -> Self {
        Self::with_kind(name, TypeKind::Interface)
    }

    fn with_kind(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            interfaces: Vec::new(),
            dgraph_type: None,
            directives: IndexMap::new(),
            fields: Vec::new(),
        }
    }

    /// Add a plain field
    pub fn field(self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.with_field(FieldDefinition::new(name, type_name))
    }

    /// Add a prepared field
    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    /// Declare an implemented interface
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// Attach a directive
    pub fn directive(mut self, name: impl Into<String>, args: DirectiveValue) -> Self {
        self.directives.insert(name.into(), args);
        self
    }

    /// Override the storage type name
    pub fn dgraph_type(mut self, name: impl Into<String>) -> Self {
        self.dgraph_type = Some(name.into());
        self
    }

    fn find_field(&self, field_name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == field_name)
    }

    fn storage_name(&self) -> &str {
        self.dgraph_type.as_deref().unwrap_or(&self.name)
    }
}

impl FieldDefinition {
    /// New field of the given named type
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            pred: None,
            directives: IndexMap::new(),
        }
    }

    /// Override the storage predicate
    pub fn pred(mut self, pred: impl Into<String>) -> Self {
        self.pred = Some(pred.into());
        self
    }

    /// Attach a directive
    pub fn directive(mut self, name: impl Into<String>, args: DirectiveValue) -> Self {
        self.directives.insert(name.into(), args);
        self
    }
}

/// Decode each directive on its own, dropping those whose arguments are not
/// objects, lists and strings
fn decode_directives<'de, D>(
    deserializer: D,
) -> std::result::Result<IndexMap<String, DirectiveValue>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = IndexMap::<String, serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(name, value)| match DirectiveValue::try_from(value) {
            Ok(args) => Some((name, args)),
            Err(err) => {
                warn!(directive = %name, error = %err, "dropping directive with unsupported arguments");
                None
            }
        })
        .collect())
}

/// Schema held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySchema {
    types: IndexMap<String, TypeDefinition>,
}

impl InMemorySchema {
    /// Build a schema from type definitions
    pub fn new(types: impl IntoIterator<Item = TypeDefinition>) -> Result<Self> {
        Self::from_document(SchemaDocument {
            types: types.into_iter().collect(),
        })
    }

    /// Build and validate a schema from a document
    pub fn from_document(document: SchemaDocument) -> Result<Self> {
        let mut types = IndexMap::with_capacity(document.types.len() + BUILTIN_SCALARS.len());
        for scalar in BUILTIN_SCALARS {
            types.insert(
                (*scalar).to_string(),
                TypeDefinition::with_kind(*scalar, TypeKind::Scalar),
            );
        }

        for def in document.types {
            if types.contains_key(&def.name) {
                return Err(AuthRuleError::schema(format!(
                    "type `{}` is declared more than once",
                    def.name
                )));
            }
            types.insert(def.name.clone(), def);
        }

        let schema = Self { types };
        schema.validate()?;
        Ok(schema)
    }

    /// Parse a JSON schema document
    pub fn from_json_str(content: &str) -> Result<Self> {
        let document: SchemaDocument = serde_json::from_str(content)
            .map_err(|e| AuthRuleError::schema(format!("Invalid JSON: {e}")))?;
        Self::from_document(document)
    }

    /// Parse a TOML schema document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let document: SchemaDocument = toml::from_str(content)
            .map_err(|e| AuthRuleError::schema(format!("Invalid TOML: {e}")))?;
        Self::from_document(document)
    }

    /// Load a schema document, picking the format from the file extension
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AuthRuleError::io(format!("Failed to read {}: {e}", path.display())))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            _ => Err(AuthRuleError::schema(format!(
                "Unsupported schema format: {}",
                path.display()
            ))),
        }
    }

    /// Look up a type definition
    pub fn type_definition(&self, type_name: &str) -> Option<&TypeDefinition> {
        self.types.get(type_name)
    }

    fn validate(&self) -> Result<()> {
        for def in self.types.values() {
            for iface in &def.interfaces {
                match self.types.get(iface) {
                    Some(target) if target.kind == TypeKind::Interface => {}
                    Some(_) => {
                        return Err(AuthRuleError::schema(format!(
                            "type `{}` implements `{iface}`, which is not an interface",
                            def.name
                        )))
                    }
                    None => {
                        return Err(AuthRuleError::schema(format!(
                            "type `{}` implements unknown interface `{iface}`",
                            def.name
                        )))
                    }
                }
            }
            for field in &def.fields {
                if !self.types.contains_key(&field.type_name) {
                    return Err(AuthRuleError::schema(format!(
                        "field `{}.{}` has unknown type `{}`",
                        def.name, field.name, field.type_name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Field on the type itself, falling back to its interfaces
    fn resolve_field(&self, type_name: &str, field_name: &str) -> Option<&FieldDefinition> {
        let def = self.types.get(type_name)?;
        def.find_field(field_name).or_else(|| {
            self.parent_interface(type_name, field_name)?
                .find_field(field_name)
        })
    }

    /// First interface of `type_name` that declares `field_name`
    fn parent_interface(&self, type_name: &str, field_name: &str) -> Option<&TypeDefinition> {
        self.parent_interfaces(type_name)
            .iter()
            .filter_map(|iface| self.types.get(iface))
            .find(|iface| iface.find_field(field_name).is_some())
    }
}

impl SchemaModel for InMemorySchema {
    fn type_names(&self) -> Vec<&str> {
        self.types
            .values()
            .filter(|def| def.kind != TypeKind::Scalar)
            .map(|def| def.name.as_str())
            .collect()
    }

    fn has_type(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    fn field_names(&self, type_name: &str) -> Vec<&str> {
        self.types
            .get(type_name)
            .map(|def| def.fields.iter().map(|f| f.name.as_str()).collect())
            .unwrap_or_default()
    }

    fn field_type(&self, type_name: &str, field_name: &str) -> Option<&str> {
        self.resolve_field(type_name, field_name)
            .map(|f| f.type_name.as_str())
    }

    fn parent_interfaces(&self, type_name: &str) -> &[String] {
        self.types
            .get(type_name)
            .map(|def| def.interfaces.as_slice())
            .unwrap_or(&[])
    }

    fn predicate(&self, type_name: &str, field_name: &str) -> Option<String> {
        let def = self.types.get(type_name)?;
        let field = self.resolve_field(type_name, field_name)?;
        if let Some(pred) = &field.pred {
            return Some(pred.clone());
        }

        let owner = self.parent_interface(type_name, field_name).unwrap_or(def);
        Some(format!("{}.{}", owner.storage_name(), field_name))
    }

    fn type_directive(&self, type_name: &str, directive: &str) -> Option<&DirectiveValue> {
        self.types.get(type_name)?.directives.get(directive)
    }

    fn field_directive(
        &self,
        type_name: &str,
        field_name: &str,
        directive: &str,
    ) -> Option<&DirectiveValue> {
        self.types
            .get(type_name)?
            .find_field(field_name)?
            .directives
            .get(directive)
    }
}
