//! Extract command - pull the ISDOC payload out of a PDF.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::info;

use isdoc_core::container::Container;
use isdoc_core::ContainerScanner;

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Input PDF
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

pub fn run(args: ExtractArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let data = fs::read(&args.input)?;
    let container = Container::load(data, config.scanner.spool_dir.as_deref());
    let payload = ContainerScanner::from_config(&config.scanner).scan(&container)?;
    info!("Extracted {} bytes", payload.bytes.len());

    let provenance = format!("ISDOC extrahován metodou: {}", payload.provenance);

    if let Some(output_path) = &args.output {
        fs::write(output_path, &payload.bytes)?;
        println!("{}", provenance);
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        std::io::stdout().write_all(&payload.bytes)?;
        eprintln!("{}", provenance);
    }

    Ok(())
}
