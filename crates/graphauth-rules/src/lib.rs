//! # graphauth-rules - authorization rule compiler
//!
//! Compiles `@auth` directives attached to schema types and fields into:
//!
//! - boolean filter expressions spliced into a caller's query,
//! - auxiliary queries computing the node identifiers a rule admits,
//! - an RBAC classification telling request handling when a rule can be
//!   decided from caller claims without touching stored data.
//!
//! ```text
//! rule string ──Tokenizer──▶ words ──RuleChain──▶ atoms
//! directive   ──ParseContext──▶ RuleNode tree ──▶ is_rbac / build_filter / build_queries
//! schema      ──AuthRegistry::build──▶ TypeAuth per type ──RegistryHandle──▶ snapshots
//! ```
//!
//! Everything here is synchronous and pure. The emitted queries are run by an
//! external executor.

pub mod compile;
pub mod config;
pub mod directive;
pub mod errors;
pub mod prelude;
pub mod registry;
pub mod rule;
pub mod schema;
pub mod tokenizer;
pub mod tree;

pub use compile::{rule_variable, AuxQuery, BoolOp, CompiledRule, FilterArg, FilterExpr, QueryField};
pub use config::RegistryConfig;
pub use directive::DirectiveValue;
pub use errors::{AuthRuleError, Result};
pub use registry::{AuthContainer, AuthOperation, AuthRegistry, RegistryHandle, TypeAuth};
pub use rule::{AtomKind, RuleAtom, RuleChain, RuleOperation};
pub use schema::{InMemorySchema, SchemaModel};
pub use tokenizer::{tokenize, Tokenizer};
pub use tree::{ParseContext, RuleId, RuleNode, RuleNodeKind};
