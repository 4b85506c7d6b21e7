use std::process::ExitCode;

use clap::Parser;
use payments::cli::{self, Cli};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Warning: tracing subscriber already installed");
    }

    match cli.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let (message, code) = cli::report(&err);
            eprintln!("Error: {}", message);
            ExitCode::from(code)
        }
    }
}
