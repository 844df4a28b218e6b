//! Directive argument values
//!
//! `@auth` arguments arrive from the upstream schema parser as nested
//! key/value data. They are decoded once into [`DirectiveValue`], which only
//! admits the three shapes a rule directive can take: objects, lists and
//! strings. Anything else is rejected with
//! [`AuthRuleError::InvalidRule`](crate::AuthRuleError::InvalidRule) at decode
//! time, so later stages can match on shape instead of asserting it.

use crate::errors::{AuthRuleError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

/// A decoded directive argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DirectiveValue {
    /// Key/value object, in source order
    Object(IndexMap<String, DirectiveValue>),
    /// Ordered list
    List(Vec<DirectiveValue>),
    /// String scalar
    String(String),
}

impl DirectiveValue {
    /// Build an object from key/value pairs
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, DirectiveValue)>,
    {
        Self::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a list
    pub fn list(items: impl IntoIterator<Item = DirectiveValue>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// Build a string value
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// Object entries, if this is an object
    pub fn as_object(&self) -> Option<&IndexMap<String, DirectiveValue>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// List items, if this is a list
    pub fn as_list(&self) -> Option<&[DirectiveValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// String contents, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a key when this is an object
    pub fn get(&self, key: &str) -> Option<&DirectiveValue> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Short shape name used in log and error messages
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Object(_) => "object",
            Self::List(_) => "list",
            Self::String(_) => "string",
        }
    }
}

impl From<&str> for DirectiveValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl TryFrom<serde_json::Value> for DirectiveValue {
    type Error = AuthRuleError;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Object(map) => map
                .into_iter()
                .map(|(key, value)| Ok((key, DirectiveValue::try_from(value)?)))
                .collect::<Result<IndexMap<_, _>>>()
                .map(Self::Object),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(DirectiveValue::try_from)
                .collect::<Result<Vec<_>>>()
                .map(Self::List),
            serde_json::Value::String(s) => Ok(Self::String(s)),
            other => Err(AuthRuleError::invalid_rule(format!(
                "unsupported directive argument `{other}`: expected object, list or string"
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for DirectiveValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        DirectiveValue::try_from(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_nested_directive() {
        let raw = json!({
            "query": {
                "or": [
                    { "rule": "$role" },
                    { "rule": "filter(eq(author, $USER))" }
                ]
            }
        });

        let value = DirectiveValue::try_from(raw).unwrap();
        let or = value.get("query").and_then(|q| q.get("or")).unwrap();
        let items = or.as_list().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].get("rule").and_then(DirectiveValue::as_str), Some("$role"));
    }

    #[test]
    fn test_decode_rejects_scalars() {
        let err = DirectiveValue::try_from(json!({ "rule": 42 })).unwrap_err();
        assert!(err.is_invalid_rule());

        assert!(DirectiveValue::try_from(json!({ "not": null })).is_err());
        assert!(DirectiveValue::try_from(json!([true])).is_err());
    }

    #[test]
    fn test_object_preserves_key_order() {
        let value: DirectiveValue =
            serde_json::from_str(r#"{"update": {"rule": "a"}, "add": {"rule": "b"}}"#).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["update".to_string(), "add".to_string()]);
    }

    #[test]
    fn test_deserialize_from_toml() {
        let value: DirectiveValue = toml::from_str(
            r#"
            [query]
            rule = "eq(hidden, false)"
            "#,
        )
        .unwrap();
        assert_eq!(
            value.get("query").and_then(|q| q.get("rule")),
            Some(&DirectiveValue::string("eq(hidden, false)"))
        );
    }

    #[test]
    fn test_serialize_untagged() {
        let value = DirectiveValue::object([("rule", DirectiveValue::from("$role"))]);
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"rule":"$role"}"#);
    }
}
