//! End-to-end processing: container or XML bytes in, validation report out.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::container::{Container, ContainerScanner, Payload};
use crate::error::{Result, RulesError};
use crate::models::config::IsdocConfig;
use crate::models::report::{RuleStatus, TextField, ValidationReport};
use crate::models::rules::RuleSet;
use crate::rules::{failure_reason, DocumentIdentity, FixedRules, RuleEngine, RuleProfiles, RuleSource};
use crate::schema::SchemaValidator;
use crate::xml::{decode_payload, DocumentTree};

/// What kind of bytes are being fed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// A PDF that may carry an ISDOC payload.
    Container,
    /// A bare ISDOC XML document.
    Xml,
}

impl InputKind {
    /// Kind for a file extension (`pdf`, `xml`, `isdoc`, case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(InputKind::Container),
            "xml" | "isdoc" => Some(InputKind::Xml),
            _ => None,
        }
    }

    /// Guess from content: PDF header means container, anything else XML.
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(b"%PDF") {
            InputKind::Container
        } else {
            InputKind::Xml
        }
    }

    /// Kind by extension, falling back to sniffing the content.
    pub fn detect(path: &Path, bytes: &[u8]) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .unwrap_or_else(|| Self::sniff(bytes))
    }
}

/// Extracts, schema-checks and rule-checks ISDOC documents.
pub struct IsdocValidator {
    scanner: ContainerScanner,
    spool_dir: Option<PathBuf>,
    schema: Option<SchemaValidator>,
    rules: Option<Box<dyn RuleSource>>,
    company_path: String,
    list_fields: bool,
}

impl IsdocValidator {
    /// Validator with every extraction strategy, no schema and no rules.
    pub fn new() -> Self {
        Self {
            scanner: ContainerScanner::new(),
            spool_dir: None,
            schema: None,
            rules: None,
            company_path: crate::models::config::RulesConfig::default().company_path,
            list_fields: false,
        }
    }

    /// Validator configured from `config`.
    ///
    /// A configured default rule set wins over company profiles and must be
    /// readable.
    pub fn from_config(config: &IsdocConfig) -> Result<Self> {
        let schema = config
            .schema
            .enabled
            .then(|| SchemaValidator::new(&config.schema.path));

        let rules: Option<Box<dyn RuleSource>> = match &config.rules.default_rules {
            Some(path) => {
                debug!("Using rule set {}", path.display());
                Some(Box::new(FixedRules::new(RuleSet::from_file(path)?)))
            }
            None if !config.rules.profiles.is_empty() => {
                debug!("Using {} company profiles", config.rules.profiles.len());
                Some(Box::new(RuleProfiles::from_config(&config.rules)))
            }
            None => None,
        };

        Ok(Self {
            scanner: ContainerScanner::from_config(&config.scanner),
            spool_dir: config.scanner.spool_dir.clone(),
            schema,
            rules,
            company_path: config.rules.company_path.clone(),
            list_fields: config.report.list_fields,
        })
    }

    pub fn with_schema(mut self, schema: Option<SchemaValidator>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_rules(mut self, rules: Box<dyn RuleSource>) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn with_scanner(mut self, scanner: ContainerScanner) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn list_fields(mut self, enabled: bool) -> Self {
        self.list_fields = enabled;
        self
    }

    /// Locate the payload. Only an exhausted container scan fails.
    pub fn extract(&self, bytes: Vec<u8>, kind: InputKind) -> Result<Payload> {
        match kind {
            InputKind::Xml => Ok(Payload::direct(bytes)),
            InputKind::Container => {
                let container = Container::load(bytes, self.spool_dir.as_deref());
                Ok(self.scanner.scan(&container)?)
            }
        }
    }

    /// Extract and validate one document.
    pub fn validate(&self, bytes: Vec<u8>, kind: InputKind) -> Result<ValidationReport> {
        let payload = self.extract(bytes, kind)?;
        Ok(self.validate_payload(&payload))
    }

    /// Read and validate a file, picking the input kind from its name.
    pub fn validate_file(&self, path: &Path) -> Result<ValidationReport> {
        info!("Validating {}", path.display());
        let bytes = std::fs::read(path)?;
        let kind = InputKind::detect(path, &bytes);

        let report = self.validate(bytes, kind)?;
        Ok(report.with_source(path.display().to_string()))
    }

    /// Validate files one after another. A failure stays with its file.
    pub fn validate_batch(&self, paths: &[PathBuf]) -> Vec<(PathBuf, Result<ValidationReport>)> {
        paths
            .iter()
            .map(|path| {
                let result = self.validate_file(path);
                if let Err(e) = &result {
                    warn!("Failed to validate {}: {}", path.display(), e);
                }
                (path.clone(), result)
            })
            .collect()
    }

    /// Run every check on an already located payload.
    pub fn validate_payload(&self, payload: &Payload) -> ValidationReport {
        let malformed = |e| ValidationReport::malformed(payload.provenance.clone(), &failure_reason(e));
        let text = match decode_payload(&payload.bytes) {
            Ok(text) => text,
            Err(e) => return malformed(e),
        };
        let tree = match DocumentTree::parse(&text) {
            Ok(tree) => tree,
            Err(e) => return malformed(e),
        };

        let mut report = ValidationReport::new(payload.provenance.clone());
        let identity = DocumentIdentity::detect(&tree, &self.company_path);
        report.company = identity.company().map(str::to_string);

        report.schema = self.schema.as_ref().map(|schema| schema.validate(&tree));

        if let Some(source) = &self.rules {
            match source.rules_for(&identity) {
                Ok(rules) => report.apply_rules(RuleEngine::new(&rules).evaluate(&tree)),
                Err(RulesError::NoProfile(company)) => {
                    debug!("No rule profile for {}", company);
                    report.rules = RuleStatus::NoProfile {
                        company: report.company.clone(),
                    };
                }
                Err(e) => {
                    warn!("Could not load rules: {}", e);
                    report.rules = RuleStatus::LoadFailed {
                        reason: e.to_string(),
                    };
                }
            }
        }

        if self.list_fields {
            report.fields = Some(
                tree.text_fields()
                    .into_iter()
                    .map(|(name, text)| TextField { name, text })
                    .collect(),
            );
        }

        report
    }
}

impl Default for IsdocValidator {
    fn default() -> Self {
        Self::new()
    }
}
