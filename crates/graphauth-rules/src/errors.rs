//! Error type for rule compilation and schema loading
//!
//! The compiler itself exposes a single failure kind, [`AuthRuleError::InvalidRule`],
//! raised when a rule references schema data that cannot be resolved. The
//! remaining variants belong to the in-memory schema loader and never come
//! out of tokenizing, tree building or filter generation.

use serde::{Deserialize, Serialize};

/// Unified error type for graphauth operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum AuthRuleError {
    /// A rule expression could not be classified against the schema
    #[error("Invalid rule expression: {message}")]
    InvalidRule {
        /// Error message describing the offending rule
        message: String,
    },

    /// The schema document is inconsistent
    #[error("Invalid schema: {message}")]
    Schema {
        /// Error message describing the schema problem
        message: String,
    },

    /// Reading a schema or configuration file failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message describing the I/O failure
        message: String,
    },
}

impl AuthRuleError {
    /// Create an invalid rule error
    pub fn invalid_rule(message: impl Into<String>) -> Self {
        Self::InvalidRule {
            message: message.into(),
        }
    }

    /// Create a schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Whether this error came out of rule compilation
    pub fn is_invalid_rule(&self) -> bool {
        matches!(self, Self::InvalidRule { .. })
    }
}

/// Standard Result type for graphauth operations
pub type Result<T> = std::result::Result<T, AuthRuleError>;

impl From<std::io::Error> for AuthRuleError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}
