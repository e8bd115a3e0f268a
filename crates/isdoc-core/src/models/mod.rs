//! Data models: configuration, rule sets and validation reports.

pub mod config;
pub mod report;
pub mod rules;
