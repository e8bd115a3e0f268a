//! Validation report for one document.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::container::Provenance;
use crate::rules::{xml_processing, RuleOutcome};
use crate::schema::SchemaOutcome;

/// Shown in place of a company name that could not be detected.
const UNKNOWN_COMPANY: &str = "Neznámá";

/// How the rule stage went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RuleStatus {
    /// No rule source is configured.
    NotConfigured,
    /// The rule source has no rule set for this document.
    NoProfile { company: Option<String> },
    /// The rule set exists but could not be read.
    LoadFailed { reason: String },
    /// A rule set was evaluated.
    Applied,
}

/// One element of the full field listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextField {
    /// Local element name.
    pub name: String,

    /// Trimmed element text.
    pub text: String,
}

/// Everything the pipeline found out about one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Input file name, when the document came from a file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Where the payload came from.
    pub provenance: Provenance,

    /// Whether the payload parsed as XML. When false, `errors` holds the
    /// single processing error and every other stage was skipped.
    pub parsed: bool,

    /// Company detected in the document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,

    /// Schema check result, `None` when schema validation is disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaOutcome>,

    /// Rule stage result.
    pub rules: RuleStatus,

    /// Rule violations in evaluation order.
    pub errors: Vec<String>,

    /// Field values in evaluation order (`"–"` for absent values).
    pub values: IndexMap<String, String>,

    /// Every element with text, when listing was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<TextField>>,
}

impl ValidationReport {
    /// Empty report for a payload that parsed.
    pub fn new(provenance: Provenance) -> Self {
        Self {
            source: None,
            provenance,
            parsed: true,
            company: None,
            schema: None,
            rules: RuleStatus::NotConfigured,
            errors: Vec::new(),
            values: IndexMap::new(),
            fields: None,
        }
    }

    /// Report for a payload that is not well-formed XML.
    pub fn malformed(provenance: Provenance, reason: &str) -> Self {
        Self {
            parsed: false,
            errors: vec![xml_processing(reason)],
            ..Self::new(provenance)
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Record an evaluated rule set.
    pub fn apply_rules(&mut self, outcome: RuleOutcome) {
        self.rules = RuleStatus::Applied;
        self.errors = outcome.errors;
        self.values = outcome.values;
    }

    /// No rule violations and no failed schema check.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.schema.as_ref().map_or(true, SchemaOutcome::is_valid)
    }

    /// Human-readable report, one entry per line.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![self.provenance_line()];

        if !self.parsed {
            lines.extend(self.errors.iter().cloned());
            return lines;
        }

        if let Some(company) = &self.company {
            lines.push(format!("Detekovaná společnost: {}", company));
        }
        if let Some(schema) = &self.schema {
            lines.push(schema.to_string());
        }

        match &self.rules {
            RuleStatus::NotConfigured => {}
            RuleStatus::NoProfile { company } => lines.push(format!(
                "Není k dispozici validační profil pro společnost {} (vytvořte jej příkazem isdoc infer).",
                company.as_deref().unwrap_or(UNKNOWN_COMPANY)
            )),
            RuleStatus::LoadFailed { reason } => {
                lines.push(format!("Chyba při načítání pravidel: {}", reason))
            }
            RuleStatus::Applied if self.errors.is_empty() => {
                lines.push("Faktura splňuje všechny požadavky.".to_string())
            }
            RuleStatus::Applied => lines.push("Faktura nesplňuje požadavky:".to_string()),
        }

        lines.extend(self.errors.iter().cloned());
        lines.extend(self.values.iter().map(|(path, value)| format!("{}: {}", path, value)));

        if let Some(fields) = &self.fields {
            lines.push("Výpis polí z faktury:".to_string());
            lines.extend(fields.iter().map(|f| format!("{}: {}", f.name, f.text)));
        }

        lines
    }

    fn provenance_line(&self) -> String {
        match &self.provenance {
            Provenance::Direct => "ISDOC načten ze souboru XML".to_string(),
            extracted => format!("ISDOC extrahován metodou: {}", extracted),
        }
    }
}
