//! XSD validation of ISDOC documents.
//!
//! Covers the subset of XML Schema 1.0 the ISDOC schema family uses:
//! element and type declarations, model groups, wildcards, derivation by
//! extension and restriction, attribute groups and the common facets.

mod content;
mod model;
mod types;
mod validate;

pub use model::{QName, Schema};
pub use types::Builtin;

use std::cell::OnceCell;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::xml::DocumentTree;

/// Result of checking a document against the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum SchemaOutcome {
    Valid,
    /// The document violates the schema; carries the first violation.
    Invalid(String),
    /// The schema itself could not be loaded.
    Unavailable(String),
}

impl SchemaOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, SchemaOutcome::Valid)
    }
}

impl fmt::Display for SchemaOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaOutcome::Valid => f.write_str("Faktura je validní podle ISDOC XSD."),
            SchemaOutcome::Invalid(reason) | SchemaOutcome::Unavailable(reason) => {
                write!(f, "Validace XSD selhala: {}", reason)
            }
        }
    }
}

/// Validates documents against the XSD at a fixed path.
///
/// The schema is read on first use and reused for later documents. A load
/// failure is remembered too, so every document reports it.
pub struct SchemaValidator {
    path: PathBuf,
    schema: OnceCell<Result<Schema, String>>,
}

impl SchemaValidator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            schema: OnceCell::new(),
        }
    }

    /// Use an already loaded schema.
    pub fn with_schema(schema: Schema) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(Ok(schema));
        Self {
            path: PathBuf::new(),
            schema: cell,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn validate(&self, tree: &DocumentTree<'_>) -> SchemaOutcome {
        let schema = self.schema.get_or_init(|| {
            Schema::load(&self.path).map_err(|e| {
                info!("Schema unavailable: {}", e);
                e.to_string()
            })
        });

        match schema {
            Ok(schema) => match schema.validate(tree) {
                Ok(()) => SchemaOutcome::Valid,
                Err(violation) => {
                    debug!("Schema violation: {}", violation);
                    SchemaOutcome::Invalid(violation)
                }
            },
            Err(reason) => SchemaOutcome::Unavailable(reason.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
        targetNamespace="http://isdoc.cz/namespace/2013"
        elementFormDefault="qualified">
      <xs:element name="Invoice">
        <xs:complexType>
          <xs:sequence><xs:element name="ID" type="xs:string"/></xs:sequence>
        </xs:complexType>
      </xs:element>
    </xs:schema>"#;

    #[test]
    fn test_valid_and_invalid() {
        let validator = SchemaValidator::with_schema(Schema::parse_str(SCHEMA).unwrap());

        let tree = DocumentTree::parse(
            r#"<Invoice xmlns="http://isdoc.cz/namespace/2013"><ID>1</ID></Invoice>"#,
        )
        .unwrap();
        assert_eq!(validator.validate(&tree), SchemaOutcome::Valid);

        let tree = DocumentTree::parse(r#"<Invoice xmlns="http://isdoc.cz/namespace/2013"/>"#).unwrap();
        let outcome = validator.validate(&tree);
        assert!(matches!(outcome, SchemaOutcome::Invalid(_)));
        assert!(outcome.to_string().starts_with("Validace XSD selhala: "));
    }

    #[test]
    fn test_missing_schema_file_is_unavailable() {
        let validator = SchemaValidator::new("/nonexistent/ISDOC_2013.xsd");
        let tree = DocumentTree::parse("<Invoice/>").unwrap();

        let outcome = validator.validate(&tree);
        assert!(matches!(outcome, SchemaOutcome::Unavailable(_)));
        assert!(!outcome.is_valid());
        // the failure is remembered
        assert_eq!(validator.validate(&tree), outcome);
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ISDOC_2013.xsd");
        std::fs::write(&path, SCHEMA).unwrap();

        let validator = SchemaValidator::new(&path);
        let tree = DocumentTree::parse(
            r#"<Invoice xmlns="http://isdoc.cz/namespace/2013"><ID>1</ID></Invoice>"#,
        )
        .unwrap();
        assert!(validator.validate(&tree).is_valid());
        assert_eq!(validator.path(), path.as_path());
    }
}
