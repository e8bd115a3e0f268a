//! Field rules: evaluation, inference and where rule sets come from.

mod engine;
mod inference;

pub use engine::{
    missing_required, value_mismatch, xml_processing, RuleEngine, RuleOutcome, ABSENT,
};
pub use inference::infer_rules;

pub(crate) use engine::failure_reason;

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::debug;

use crate::error::RulesError;
use crate::models::config::RulesConfig;
use crate::models::rules::RuleSet;
use crate::xml::{DocumentTree, FieldPath};

/// What a rule source may know about a document when picking rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentIdentity {
    company: Option<String>,
}

impl DocumentIdentity {
    pub fn new(company: Option<String>) -> Self {
        Self { company }
    }

    /// Identity read from the element at `company_path`.
    pub fn detect(tree: &DocumentTree<'_>, company_path: &str) -> Self {
        Self::new(detect_company(tree, company_path))
    }

    pub fn company(&self) -> Option<&str> {
        self.company.as_deref()
    }
}

/// Non-empty trimmed text at `company_path`, if any.
pub fn detect_company(tree: &DocumentTree<'_>, company_path: &str) -> Option<String> {
    let company = tree
        .resolve_text(&FieldPath::parse(company_path))
        .filter(|name| !name.is_empty());
    debug!("Detected company: {:?}", company);
    company
}

/// Supplies the rule set for a document.
pub trait RuleSource {
    /// Rules for the identified document, or [`RulesError::NoProfile`] when
    /// this source has none for it.
    fn rules_for(&self, identity: &DocumentIdentity) -> Result<RuleSet, RulesError>;
}

/// The same rule set for every document.
pub struct FixedRules {
    rules: RuleSet,
}

impl FixedRules {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }
}

impl RuleSource for FixedRules {
    fn rules_for(&self, _identity: &DocumentIdentity) -> Result<RuleSet, RulesError> {
        Ok(self.rules.clone())
    }
}

/// Rule set files keyed by company name. Files are read on each lookup.
pub struct RuleProfiles {
    profiles: BTreeMap<String, PathBuf>,
}

impl RuleProfiles {
    pub fn new(profiles: BTreeMap<String, PathBuf>) -> Self {
        Self { profiles }
    }

    pub fn from_config(config: &RulesConfig) -> Self {
        Self::new(config.profiles.clone())
    }
}

impl RuleSource for RuleProfiles {
    fn rules_for(&self, identity: &DocumentIdentity) -> Result<RuleSet, RulesError> {
        let company = identity
            .company()
            .ok_or_else(|| RulesError::NoProfile("unknown company".to_string()))?;
        let path = self
            .profiles
            .get(company)
            .ok_or_else(|| RulesError::NoProfile(company.to_string()))?;

        debug!("Loading rules for {} from {}", company, path.display());
        RuleSet::from_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"<Invoice xmlns="http://isdoc.cz/namespace/2013">
  <AccountingSupplierParty><Party><PartyName><Name>Dodavatel</Name></PartyName></Party></AccountingSupplierParty>
  <AccountingCustomerParty><Party><PartyName><Name> TV Nova s.r.o. </Name></PartyName></Party></AccountingCustomerParty>
</Invoice>"#;

    const COMPANY_PATH: &str = "AccountingCustomerParty/Party/PartyName/Name";

    #[test]
    fn test_detect_company() {
        let tree = DocumentTree::parse(DOCUMENT).unwrap();
        assert_eq!(detect_company(&tree, COMPANY_PATH).as_deref(), Some("TV Nova s.r.o."));
        assert_eq!(detect_company(&tree, "Nope/Name"), None);
    }

    #[test]
    fn test_fixed_rules_ignore_identity() {
        let source = FixedRules::new(RuleSet::new().require("ID"));
        let rules = source.rules_for(&DocumentIdentity::default()).unwrap();
        assert_eq!(rules.required_fields, vec!["ID".to_string()]);
    }

    #[test]
    fn test_profiles_by_company() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nova.json");
        RuleSet::new().expect("ID", "1").save(&path).unwrap();

        let mut profiles = BTreeMap::new();
        profiles.insert("TV Nova s.r.o.".to_string(), path);
        let source = RuleProfiles::new(profiles);

        let tree = DocumentTree::parse(DOCUMENT).unwrap();
        let identity = DocumentIdentity::detect(&tree, COMPANY_PATH);
        let rules = source.rules_for(&identity).unwrap();
        assert_eq!(rules.expected_values["ID"], "1");

        let other = DocumentIdentity::new(Some("Jiná a.s.".to_string()));
        assert!(matches!(source.rules_for(&other), Err(RulesError::NoProfile(name)) if name == "Jiná a.s."));
        assert!(matches!(
            source.rules_for(&DocumentIdentity::default()),
            Err(RulesError::NoProfile(_))
        ));
    }

    #[test]
    fn test_profile_file_unreadable() {
        let mut profiles = BTreeMap::new();
        profiles.insert("X".to_string(), PathBuf::from("/nonexistent/rules.json"));
        let source = RuleProfiles::new(profiles);

        let identity = DocumentIdentity::new(Some("X".to_string()));
        assert!(matches!(source.rules_for(&identity), Err(RulesError::Io(_))));
    }
}
