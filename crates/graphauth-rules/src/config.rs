//! Registry build configuration

use crate::errors::{AuthRuleError, Result};
use serde::{Deserialize, Serialize};

/// Directive name used when none is configured
pub const DEFAULT_DIRECTIVE: &str = "auth";

/// Options for [`AuthRegistry::build`](crate::AuthRegistry::build)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Name of the directive carrying authorization rules
    pub directive_name: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            directive_name: DEFAULT_DIRECTIVE.to_string(),
        }
    }
}

impl RegistryConfig {
    /// Configuration reading rules from a differently named directive
    pub fn with_directive(name: impl Into<String>) -> Self {
        Self {
            directive_name: name.into(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.directive_name.is_empty() {
            return Err(AuthRuleError::schema("Directive name cannot be empty"));
        }
        if self.directive_name.starts_with('@') {
            return Err(AuthRuleError::schema(
                "Directive name must not include the leading `@`",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        let config = RegistryConfig::default();
        assert_eq!(config.directive_name, "auth");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(RegistryConfig::with_directive("").validate().is_err());
        assert!(RegistryConfig::with_directive("@auth").validate().is_err());
        assert!(RegistryConfig::with_directive("access").validate().is_ok());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: RegistryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RegistryConfig::default());
    }
}
