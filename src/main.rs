//! fw-bouncer - firewall bouncer
//!
//! Keeps ban decisions in the tables of the host's packet filter.
//!
//! # Usage
//!
//! ```bash
//! fw-bouncer check                              # Init the engine, then flush and exit
//! fw-bouncer ban 203.0.113.7 --duration 4h      # Ban one address
//! fw-bouncer unban 203.0.113.7                  # Lift a ban
//! fw-bouncer flush                              # Empty every bouncer table
//! decision-feed | fw-bouncer stream             # Apply newline-delimited JSON events
//! ```
//!
//! See [`fw_bouncer::stream`] for the stream event format.

use clap::{Parser, Subcommand};
use fw_bouncer::config::{self, BouncerConfig, LogMode};
use fw_bouncer::core::backend::{AnyBackend, Backend, BackendSupport, Outcome, new_backend};
use fw_bouncer::core::decision::Decision;
use fw_bouncer::{stream, utils, validators};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::BufReader;
use tracing::info;

const DEFAULT_CONFIG: &str = "/etc/fw-bouncer/fw-bouncer.yaml";

#[derive(Parser)]
#[command(name = "fw-bouncer")]
#[command(about = "Firewall bouncer - enforces ban decisions in pf, ipset or nftables tables", long_about = None)]
struct Cli {
    /// Configuration file (a missing file means defaults)
    #[arg(short, long, value_name = "PATH", default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the engine (flush and verify tables), then shut down
    Check,
    /// Ban an address or network
    Ban {
        /// IPv4/IPv6 address or CIDR
        address: String,
        /// Ban duration, e.g. 4h or 1h30m
        #[arg(short, long, default_value = "4h")]
        duration: String,
        /// Scenario recorded in the log line
        #[arg(short, long, default_value = "manual")]
        scenario: String,
    },
    /// Lift the ban on an address or network
    Unban {
        /// IPv4/IPv6 address or CIDR
        address: String,
    },
    /// Remove every address from the bouncer tables
    Flush,
    /// Apply decision events read from stdin until EOF
    Stream,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to create Tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = if tokio::fs::try_exists(&cli.config).await.unwrap_or(false) {
        config::load_config(&cli.config).await?
    } else {
        BouncerConfig::default()
    };
    init_logging(&config)?;

    if !utils::is_root() {
        println!("Note: Not running as root. The firewall tool will likely refuse changes.");
    }

    let mut backend = match new_backend(&config) {
        BackendSupport::Supported(backend) => backend,
        BackendSupport::Unsupported { engine, reason } => {
            eprintln!("Error: {engine} is unsupported: {reason}");
            return Ok(ExitCode::FAILURE);
        }
    };
    info!("using the {} engine", backend.name());

    match cli.command {
        Commands::Check => {
            backend.init().await?;
            backend.shut_down().await?;
            println!("✓ {} tables are in place.", backend.name());
        }
        Commands::Ban {
            address,
            duration,
            scenario,
        } => {
            let value = validators::validate_address(&address)?;
            let scenario = validators::sanitize_scenario(&scenario);
            let decision = Decision::new(value, duration, scenario);
            let outcome = backend.add(&decision).await?;
            backend.commit().await?;
            report(&decision, &outcome);
        }
        Commands::Unban { address } => {
            let value = validators::validate_address(&address)?;
            let decision = Decision::new(value, "0s", "manual");
            let outcome = backend.delete(&decision).await?;
            backend.commit().await?;
            report(&decision, &outcome);
        }
        Commands::Flush => {
            backend.shut_down().await?;
            println!("✓ {} tables flushed.", backend.name());
        }
        Commands::Stream => run_stream(&mut backend).await?,
    }

    Ok(ExitCode::SUCCESS)
}

/// Applies stdin events until EOF, then flushes the tables.
async fn run_stream(backend: &mut AnyBackend) -> Result<(), Box<dyn std::error::Error>> {
    backend.init().await?;

    let result = stream::apply_stream(backend, BufReader::new(tokio::io::stdin())).await;
    backend.shut_down().await?;

    let summary = result?;
    if summary.rejected + summary.malformed > 0 {
        info!(
            "{} event(s) were skipped, see the warnings above",
            summary.rejected + summary.malformed
        );
    }
    Ok(())
}

fn report(decision: &Decision, outcome: &Outcome) {
    match outcome {
        Outcome::Applied | Outcome::Queued => println!("✓ {}: {}", decision.value, outcome.label()),
        Outcome::Skipped => println!("- {}: skipped, its address family is disabled", decision.value),
        Outcome::Tolerated(failure) => {
            let hint = failure.hint();
            eprintln!("✗ {}: {}", decision.value, hint.user_message);
            for suggestion in hint.suggestions {
                eprintln!("  • {suggestion}");
            }
        }
    }
}

fn init_logging(config: &BouncerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let level = config.level()?;

    match config.log_mode {
        LogMode::Stdout => {
            tracing_subscriber::fmt().with_max_level(level).init();
        }
        LogMode::File => {
            let log_path = config.log_dir.join("fw-bouncer.log");
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .map_err(|e| format!("cannot open log file {}: {e}", log_path.display()))?;
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
    }

    Ok(())
}
