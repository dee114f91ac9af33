use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use threatlens::config::{LoggingConfig, ThreatLensConfig};
use threatlens::detect::Record;
use threatlens::sentinel::Sentinel;

#[derive(Parser)]
#[command(
    name = "threatlens",
    about = "Event threat detection engine with running threat analytics",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP service
    Serve {
        /// Bind address (overrides api.listen_address)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run the detection pipeline once on a JSON record
    Detect {
        /// File holding the record; reads stdin when omitted
        #[arg(long)]
        input: Option<PathBuf>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,

        /// Seed for the stochastic scorer
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ThreatLensConfig::resolve(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.api.listen_address = bind;
            }
            tracing::info!(bind = %config.api.listen_address, "Starting threatlens daemon");
            threatlens::serve(config).await?;
        }
        Commands::Detect { input, json, seed } => {
            if seed.is_some() {
                config.detection.stochastic_seed = seed;
            }

            let raw = match &input {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read record from {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("failed to read record from stdin")?;
                    buf
                }
            };
            let record = Record::from_json_str(&raw)?;

            let sentinel = Sentinel::new(config.detection, config.analytics);
            let findings = sentinel.detect(&record).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&findings)?);
            } else if findings.is_empty() {
                println!("No threats detected.");
            } else {
                println!("\n{} threat(s) detected", findings.len());
                println!(
                    "{:<20} | {:<8} | {:<10} | Description",
                    "Type", "Severity", "Confidence"
                );
                println!("{:-<20}-|-{:-<8}-|-{:-<10}-|-{:-<40}", "", "", "", "");
                for f in &findings {
                    println!(
                        "{:<20} | {:<8} | {:<10.2} | {}",
                        f.finding_type.as_str(),
                        f.severity.as_str(),
                        f.confidence,
                        f.description
                    );
                }
                println!();
            }
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
