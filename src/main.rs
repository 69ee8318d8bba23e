//! Policy Review CLI
//!
//! Reviews files against deny rules with bounded concurrency.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use policy_review::{build_runtime, io::patterns_from_csv, run_review, Config};

#[derive(Parser)]
#[command(name = "policy-review")]
#[command(about = "Review files against policy rules", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// Override both reader and reviewer pool sizes
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Override file patterns (comma-separated)
    #[arg(long, global = true)]
    patterns: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Review the configured files (default if no command specified)
    Run,

    /// Validate configuration
    Validate,

    /// Generate a sample configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    // Logs go to stderr so the report on stdout stays parseable
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Commands::Run) => {
            let clean = run_command(cli.config, cli.concurrency, cli.patterns)?;
            if !clean {
                std::process::exit(1);
            }
        }

        Some(Commands::Validate) => {
            validate_command(cli.config, cli.concurrency, cli.patterns)?;
        }

        Some(Commands::GenerateConfig { output }) => {
            generate_config_command(output)?;
        }
    }

    Ok(())
}

fn load_config(
    config_path: &PathBuf,
    concurrency: Option<usize>,
    patterns: Option<String>,
) -> Result<Config> {
    let mut config = Config::from_file(config_path)?;

    // Apply overrides
    if let Some(c) = concurrency {
        config.pipeline.reader_pool_size = c;
        config.pipeline.reviewer_pool_size = c;
    }
    if let Some(csv) = patterns {
        config.input.patterns = patterns_from_csv(&csv);
    }

    config.validate()?;
    Ok(config)
}

/// Returns whether the run finished without pipeline errors.
fn run_command(
    config_path: PathBuf,
    concurrency: Option<usize>,
    patterns: Option<String>,
) -> Result<bool> {
    let config = load_config(&config_path, concurrency, patterns)?;

    let runtime = build_runtime(config.processing.worker_threads)?;
    let report = runtime.block_on(async { run_review(config).await })?;

    println!("{}", report.to_json()?);

    if report.has_pipeline_errors() {
        tracing::error!("{} pipeline errors occurred", report.errors.len());
    }
    Ok(!report.has_pipeline_errors())
}

fn validate_command(
    config_path: PathBuf,
    concurrency: Option<usize>,
    patterns: Option<String>,
) -> Result<()> {
    load_config(&config_path, concurrency, patterns)?;
    println!("Configuration is valid");
    Ok(())
}

fn generate_config_command(output: PathBuf) -> Result<()> {
    // Generate a commented YAML config
    let yaml = r#"# Policy Review Configuration

# === PIPELINE: Concurrency settings ===
pipeline:
  # Maximum concurrent file reads
  reader_pool_size: 100

  # Maximum concurrent evaluations
  reviewer_pool_size: 100

  # Capacity of the channels between stages
  channel_buffer: 16

  # Report a submission error instead of waiting when a pool is full
  nonblocking: false

# === INPUT: Which files to review ===
input:
  # Directory the patterns are matched against
  root: "."

  # Glob patterns (** = any depth, * = within one directory)
  patterns:
    - "**/*.yaml"
    - "**/*.yml"
    - "**/*.json"

# === POLICY: Deny rules ===
policy:
  # Label copied into every verdict
  query: "data.reviewer.cloudformation"

  rules:
    # JSON pointer to the checked values; * matches any key or index
    - name: "no-open-ingress"
      pointer: "/Resources/*/Properties/SecurityGroupIngress/*/CidrIp"
      deny: '^0\.0\.0\.0/0$'

    - name: "no-public-buckets"
      pointer: "/Resources/*/Properties/AccessControl"
      deny: '^Public'

# === PROCESSING: Runtime settings ===
processing:
  # Tokio async worker threads (null = num CPUs)
  # worker_threads: 8

  # Print throughput metrics during processing
  enable_metrics: true

  # Metrics reporting interval in seconds
  metrics_interval_secs: 10

  # Save final metrics as JSON
  # metrics_output_path: "metrics.json"
"#;

    std::fs::write(&output, yaml)?;
    println!("Generated sample configuration at: {}", output.display());

    Ok(())
}
