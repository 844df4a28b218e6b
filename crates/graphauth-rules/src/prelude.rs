//! graphauth prelude.
//!
//! Curated re-exports for building a registry and compiling rules at request time.

pub use crate::compile::{AuxQuery, CompiledRule, FilterExpr};
pub use crate::config::RegistryConfig;
pub use crate::errors::{AuthRuleError, Result};
pub use crate::registry::{AuthContainer, AuthOperation, AuthRegistry, RegistryHandle};
pub use crate::schema::{InMemorySchema, SchemaModel};
pub use crate::tree::RuleNode;
