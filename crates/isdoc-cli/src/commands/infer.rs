//! Infer command - generate a rule set from a sample invoice.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use tracing::info;

use isdoc_core::pipeline::InputKind;
use isdoc_core::rules::{detect_company, infer_rules};
use isdoc_core::xml::decode_payload;
use isdoc_core::{ContainerScanner, DocumentTree, IsdocValidator};

/// Arguments for the infer command.
#[derive(Args)]
pub struct InferArgs {
    /// Sample invoice (PDF, XML or ISDOC)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Register the written rule set as the profile of the detected company
    #[arg(long, requires = "output")]
    register: bool,
}

pub fn run(args: InferArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    // registering may create the config file
    let config = if args.register {
        super::load_or_default(&super::config_path(config_path))?
    } else {
        super::load_config(config_path)?
    };

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let data = fs::read(&args.input)?;
    let kind = InputKind::detect(&args.input, &data);

    let payload = IsdocValidator::new()
        .with_scanner(ContainerScanner::from_config(&config.scanner))
        .extract(data, kind)?;

    let text = decode_payload(&payload.bytes)?;
    let tree = DocumentTree::parse(&text)?;
    let rules = infer_rules(&tree);
    info!("Inferred {} expected values", rules.expected_values.len());

    let json = rules.to_json_pretty()?;

    let Some(output_path) = &args.output else {
        println!("{}", json);
        return Ok(());
    };

    fs::write(output_path, &json)?;
    println!(
        "{} Rule set with {} expected values written to {}",
        style("✓").green(),
        rules.expected_values.len(),
        output_path.display()
    );

    if args.register {
        let company = detect_company(&tree, &config.rules.company_path)
            .ok_or_else(|| anyhow::anyhow!("No company found at {}", config.rules.company_path))?;
        register_profile(config_path, &company, output_path)?;
    }

    Ok(())
}

/// Record `rules_path` as the profile for `company` in the config file.
fn register_profile(config_path: Option<&str>, company: &str, rules_path: &Path) -> anyhow::Result<()> {
    let path = super::config_path(config_path);
    let mut config = super::load_or_default(&path)?;

    let rules_path = fs::canonicalize(rules_path)?;
    config.rules.profiles.insert(company.to_string(), rules_path);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    config.save(&path)?;

    println!(
        "{} Registered profile for {} in {}",
        style("✓").green(),
        company,
        path.display()
    );

    Ok(())
}
