//! Check command - validate a single PDF or ISDOC file.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use isdoc_core::models::config::IsdocConfig;
use isdoc_core::{IsdocValidator, ValidationReport};

/// Arguments for the check command.
#[derive(Args)]
pub struct CheckArgs {
    /// Input file (PDF, XML or ISDOC)
    #[arg(required = true)]
    input: PathBuf,

    /// Rule set applied instead of the configured profiles
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// XSD schema to validate against
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// Skip XSD validation
    #[arg(long, conflicts_with = "schema")]
    no_schema: bool,

    /// List every field with a value
    #[arg(long)]
    fields: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON report
    Json,
    /// CSV rows (kind, field, value)
    Csv,
    /// Report lines
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

/// Command line overrides shared by `check` and `batch`.
pub(crate) fn apply_overrides(
    config: &mut IsdocConfig,
    rules: Option<PathBuf>,
    schema: Option<PathBuf>,
    no_schema: bool,
) {
    if let Some(rules) = rules {
        config.rules.default_rules = Some(rules);
    }
    if let Some(schema) = schema {
        config.schema.enabled = true;
        config.schema.path = schema;
    }
    if no_schema {
        config.schema.enabled = false;
    }
}

pub fn run(args: CheckArgs, config_path: Option<&str>) -> anyhow::Result<bool> {
    let start = Instant::now();

    let mut config = super::load_config(config_path)?;
    apply_overrides(&mut config, args.rules, args.schema, args.no_schema);
    if args.fields {
        config.report.list_fields = true;
    }

    // Check input file exists
    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let validator = IsdocValidator::from_config(&config)?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!("Validating {}...", args.input.display()));

    let result = validator.validate_file(&args.input);
    pb.finish_and_clear();
    let report = result?;

    info!(
        "{}: {} errors, schema {:?}",
        args.input.display(),
        report.errors.len(),
        report.schema
    );

    let output = format_report(&report, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    if report.is_success() {
        eprintln!("{} {}", style("✓").green(), args.input.display());
    } else {
        eprintln!("{} {}", style("✗").red(), args.input.display());
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(report.is_success())
}

pub(crate) fn format_report(report: &ValidationReport, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Csv => format_csv(report),
        OutputFormat::Text => Ok(report.lines().join("\n")),
    }
}

fn format_csv(report: &ValidationReport) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record(["kind", "field", "value"])?;

    wtr.write_record(["provenance", "", report.provenance.to_string().as_str()])?;
    if let Some(company) = &report.company {
        wtr.write_record(["company", "", company.as_str()])?;
    }
    if let Some(schema) = &report.schema {
        wtr.write_record(["schema", "", schema.to_string().as_str()])?;
    }
    for error in &report.errors {
        wtr.write_record(["error", "", error.as_str()])?;
    }
    for (path, value) in &report.values {
        wtr.write_record(["value", path.as_str(), value.as_str()])?;
    }
    for field in report.fields.iter().flatten() {
        wtr.write_record(["field", field.name.as_str(), field.text.as_str()])?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use isdoc_core::{Provenance, RuleOutcome};

    #[test]
    fn test_csv_rows() {
        let mut report = ValidationReport::new(Provenance::Direct);
        let mut outcome = RuleOutcome::default();
        outcome.errors.push("Chybí požadované pole: ID".to_string());
        outcome.values.insert("Note".to_string(), "a, b".to_string());
        report.apply_rules(outcome);

        let csv = format_report(&report, OutputFormat::Csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines,
            vec![
                "kind,field,value",
                "provenance,,direct file",
                "error,,Chybí požadované pole: ID",
                "value,Note,\"a, b\"",
            ]
        );
    }

    #[test]
    fn test_overrides() {
        let mut config = IsdocConfig::default();
        apply_overrides(&mut config, Some(PathBuf::from("r.json")), None, true);
        assert_eq!(config.rules.default_rules, Some(PathBuf::from("r.json")));
        assert!(!config.schema.enabled);
    }
}
