use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use swerve_zenoh_runtime::config::SwerveConfig;

/// Swerve drivetrain runtime: zenoh commands in, module actuation and pose out
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON drivetrain configuration (defaults are used for missing fields)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the settle delay before module angles are synced (ms)
    #[arg(long)]
    settle_ms: Option<u64>,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match SwerveConfig::load(path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                eprintln!("Config error: {}", e);
                std::process::exit(1);
            }
        },
        None => SwerveConfig::default(),
    };
    if let Some(settle_ms) = args.settle_ms {
        config.settle_delay_ms = settle_ms;
    }

    if let Err(e) = swerve_zenoh_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
