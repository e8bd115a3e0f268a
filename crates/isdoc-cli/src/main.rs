//! CLI application for ISDOC invoice extraction and validation.

mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{batch, check, config, extract, infer};

/// ISDOC toolkit - Extract ISDOC invoices from PDFs and validate them
#[derive(Parser)]
#[command(name = "isdoc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a single PDF or ISDOC file
    Check(check::CheckArgs),

    /// Validate multiple files
    Batch(batch::BatchArgs),

    /// Extract the ISDOC payload from a PDF
    Extract(extract::ExtractArgs),

    /// Generate a rule set from a sample invoice
    Infer(infer::InferArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli.config.as_deref();
    let success = match cli.command {
        Commands::Check(args) => check::run(args, config_path)?,
        Commands::Batch(args) => batch::run(args, config_path)?,
        Commands::Extract(args) => extract::run(args, config_path).map(|_| true)?,
        Commands::Infer(args) => infer::run(args, config_path).map(|_| true)?,
        Commands::Config(args) => config::run(args, config_path).map(|_| true)?,
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
