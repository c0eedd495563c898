// Entrypoint for the CLI application.
// - Keeps `main` small: set up logging, parse arguments, hand off to `ui::run`.
// - Logs go to stderr so the remote command's stdout stays untouched.

use clap::Parser;
use resh::{cli::Cli, ui};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_env("RESH_LOG").unwrap_or_else(|_| EnvFilter::new("resh=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match ui::run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("resh: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
