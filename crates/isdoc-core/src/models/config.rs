//! Configuration structures for the extraction and validation pipeline.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::container::StrategyKind;

/// Main configuration for the isdoc pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IsdocConfig {
    /// Container scanner configuration.
    pub scanner: ScannerConfig,

    /// XSD validation configuration.
    pub schema: SchemaConfig,

    /// Rule engine configuration.
    pub rules: RulesConfig,

    /// Report configuration.
    pub report: ReportConfig,
}

/// Container scanner configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Strategies to leave out. The remaining ones keep their priority order.
    pub skip_strategies: Vec<StrategyKind>,

    /// Directory for the per-request spool copy (system temp dir if unset).
    pub spool_dir: Option<PathBuf>,
}

/// XSD validation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Run schema validation.
    pub enabled: bool,

    /// Path to the ISDOC XSD.
    pub path: PathBuf,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("ISDOC_2013.xsd"),
        }
    }
}

/// Rule engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Rule set applied to every document (takes precedence over profiles).
    pub default_rules: Option<PathBuf>,

    /// Rule set files keyed by detected company name.
    pub profiles: BTreeMap<String, PathBuf>,

    /// Field path holding the company name used to pick a profile.
    pub company_path: String,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            default_rules: None,
            profiles: BTreeMap::new(),
            company_path: "AccountingCustomerParty/Party/PartyName/Name".to_string(),
        }
    }
}

/// Report configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Append every element with text to the report.
    pub list_fields: bool,
}

impl IsdocConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}
