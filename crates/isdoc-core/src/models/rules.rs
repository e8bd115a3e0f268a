//! Rule set artifact consumed by the rule engine and produced by inference.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::RulesError;

/// Field-level validation rules keyed by field path.
///
/// Serialized as
/// `{"required_fields": [...], "optional_fields": [...], "expected_values": {...}}`;
/// every key may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    /// Paths that must be present.
    pub required_fields: Vec<String>,

    /// Paths reported when present, `"–"` otherwise.
    pub optional_fields: Vec<String>,

    /// Paths whose trimmed text must equal the literal.
    pub expected_values: IndexMap<String, String>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, path: impl Into<String>) -> Self {
        self.required_fields.push(path.into());
        self
    }

    pub fn optional(mut self, path: impl Into<String>) -> Self {
        self.optional_fields.push(path.into());
        self
    }

    pub fn expect(mut self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.expected_values.insert(path.into(), value.into());
        self
    }

    /// True when the set contains no rule at all.
    pub fn is_empty(&self) -> bool {
        self.required_fields.is_empty()
            && self.optional_fields.is_empty()
            && self.expected_values.is_empty()
    }

    /// Total number of rules.
    pub fn len(&self) -> usize {
        self.required_fields.len() + self.optional_fields.len() + self.expected_values.len()
    }

    pub fn from_json(json: &str) -> Result<Self, RulesError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, RulesError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a rule set from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, RulesError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Save the rule set as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), RulesError> {
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_keys_default_to_empty() {
        let rules = RuleSet::from_json(r#"{"required_fields": ["Body/Total"]}"#).unwrap();
        assert_eq!(rules.required_fields, vec!["Body/Total".to_string()]);
        assert!(rules.optional_fields.is_empty());
        assert!(rules.expected_values.is_empty());
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn test_expected_values_keep_order() {
        let rules = RuleSet::from_json(
            r#"{"expected_values": {"Z/Last": "1", "A/First": "2", "M/Mid": "3"}}"#,
        )
        .unwrap();
        let keys: Vec<&str> = rules.expected_values.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Z/Last", "A/First", "M/Mid"]);
    }

    #[test]
    fn test_json_shape() {
        let rules = RuleSet::new()
            .require("ID")
            .optional("Note")
            .expect("LocalCurrencyCode", "CZK");
        let value: serde_json::Value = serde_json::from_str(&rules.to_json_pretty().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "required_fields": ["ID"],
                "optional_fields": ["Note"],
                "expected_values": {"LocalCurrencyCode": "CZK"}
            })
        );
    }

    #[test]
    fn test_rejects_wrong_shape() {
        assert!(RuleSet::from_json(r#"{"required_fields": "ID"}"#).is_err());
    }
}
