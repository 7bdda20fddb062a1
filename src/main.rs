//! Talkwire CLI binary entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use talkwire::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_env("TALKWIRE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = talkwire::cli::run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
