//! Core library for ISDOC invoices.
//!
//! This crate provides:
//! - ISDOC payload extraction from PDF containers (attachments, text layer,
//!   raw bytes, streams and object graph walks)
//! - XSD validation against the ISDOC schema
//! - Field-level rule checks and rule inference from sample documents
//! - A pipeline producing per-document validation reports

pub mod container;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod rules;
pub mod schema;
pub mod xml;

pub use container::{ContainerScanner, Payload, Provenance, StrategyKind};
pub use error::{ContainerError, IsdocError, Result, RulesError, SchemaError};
pub use models::config::IsdocConfig;
pub use models::report::{RuleStatus, TextField, ValidationReport};
pub use models::rules::RuleSet;
pub use pipeline::{InputKind, IsdocValidator};
pub use rules::{infer_rules, FixedRules, RuleEngine, RuleOutcome, RuleProfiles, RuleSource};
pub use schema::{SchemaOutcome, SchemaValidator};
pub use xml::{DocumentTree, FieldPath};
