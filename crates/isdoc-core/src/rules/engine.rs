//! Field-level rule evaluation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::IsdocError;
use crate::models::rules::RuleSet;
use crate::xml::{decode_payload, DocumentTree, FieldPath};

/// Value recorded for a field that has no text in the document.
pub const ABSENT: &str = "–";

/// Error for a required field that does not resolve.
pub fn missing_required(path: &str) -> String {
    format!("Chybí požadované pole: {}", path)
}

/// Error for an expected value that differs from the document.
pub fn value_mismatch(path: &str, expected: &str, found: &str) -> String {
    format!(
        "Neshoda v hodnotě {}: očekáváno {}, nalezeno {}",
        path, expected, found
    )
}

/// Error for a payload that is not well-formed XML.
pub fn xml_processing(reason: &str) -> String {
    format!("Chyba při zpracování XML: {}", reason)
}

/// Errors and per-field values produced by one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub errors: Vec<String>,
    pub values: IndexMap<String, String>,
}

impl RuleOutcome {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Outcome for a payload that could not be parsed.
    pub fn malformed(reason: &str) -> Self {
        Self {
            errors: vec![xml_processing(reason)],
            values: IndexMap::new(),
        }
    }
}

/// Evaluates one rule set against documents.
pub struct RuleEngine<'r> {
    rules: &'r RuleSet,
}

impl<'r> RuleEngine<'r> {
    pub fn new(rules: &'r RuleSet) -> Self {
        Self { rules }
    }

    /// Parse `payload` and evaluate it. A parse failure yields a single
    /// processing error and no values.
    pub fn evaluate_bytes(&self, payload: &[u8]) -> RuleOutcome {
        let text = match decode_payload(payload) {
            Ok(text) => text,
            Err(e) => return RuleOutcome::malformed(&failure_reason(e)),
        };
        match DocumentTree::parse(&text) {
            Ok(tree) => self.evaluate(&tree),
            Err(e) => RuleOutcome::malformed(&failure_reason(e)),
        }
    }

    /// Evaluate required, optional and expected-value rules, in that order.
    pub fn evaluate(&self, tree: &DocumentTree<'_>) -> RuleOutcome {
        let mut outcome = RuleOutcome::default();

        for path in &self.rules.required_fields {
            match tree.resolve_text(&FieldPath::parse(path)) {
                Some(text) => {
                    trace!("Required {} = {:?}", path, text);
                    outcome.values.insert(path.clone(), text);
                }
                None => {
                    debug!("Required field {} is missing", path);
                    outcome.errors.push(missing_required(path));
                }
            }
        }

        for path in &self.rules.optional_fields {
            let value = tree
                .resolve_text(&FieldPath::parse(path))
                .unwrap_or_else(|| ABSENT.to_string());
            outcome.values.insert(path.clone(), value);
        }

        for (path, expected) in &self.rules.expected_values {
            let found = tree.resolve_text(&FieldPath::parse(path));
            let shown = found
                .as_deref()
                .filter(|text| !text.is_empty())
                .unwrap_or(ABSENT)
                .to_string();

            if found.as_deref() != Some(expected.as_str()) {
                debug!("Field {} expected {:?}, found {:?}", path, expected, found);
                outcome.errors.push(value_mismatch(path, expected, &shown));
            }
            outcome.values.insert(path.clone(), shown);
        }

        outcome
    }
}

/// Reason text of a payload that could not be turned into a tree.
pub(crate) fn failure_reason(error: IsdocError) -> String {
    match error {
        IsdocError::Xml(reason) => reason,
        other => other.to_string(),
    }
}
