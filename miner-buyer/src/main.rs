use std::process;

use clap::Parser;
use miner_buyer::cli::Args;
use miner_buyer::commands::CommandExecutor;
use miner_buyer::config::AppConfig;
use miner_buyer::error::Result;
use tracing::{Level, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() {
    // .env is optional
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(args.debug, args.quiet);

    if let Err(e) = run(args).await {
        error!(kind = e.kind(), "Command failed: {}", e);
        eprintln!("Error: {e}");
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = cause.source();
        }
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = AppConfig::from_args(&args)?;
    tracing::debug!(home = %config.paths.home().display(), "Configuration loaded");
    CommandExecutor::new(config).execute(args.command).await
}

fn init_logging(debug: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(debug)
                .with_timer(fmt::time::ChronoLocal::rfc_3339())
                .with_writer(std::io::stderr),
        )
        .init();
}
