// UI layer: runs one invocation from parsed arguments to exit status.
// Remote stdout goes to our stdout; everything else (progress, summary,
// errors) goes to stderr.

use crate::api::ApiClient;
use crate::cli::Cli;
use crate::config::Settings;
use crate::detect::detect_files;
use crate::orchestrator::{RemoteOrchestrator, RunReport};
use crate::progress::TransferProgress;
use crate::resolve::PathResolver;
use anyhow::{Context, Result};
use clap::CommandFactory;
use crossterm::tty::IsTty;
use std::io::Read;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILED: u8 = 1;
/// Exit status after a user interrupt (128 + SIGINT).
pub const EXIT_INTERRUPTED: u8 = 130;

pub fn run(cli: Cli) -> Result<ExitCode> {
    if cli.version && cli.command.is_empty() {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }

    let piped = read_piped_stdin()?;
    let tokens = cli.command_tokens(piped.as_deref());
    if tokens.is_empty() {
        Cli::command().print_help()?;
        return Ok(ExitCode::SUCCESS);
    }

    // Flags are remembered for the next run; environment overrides are not.
    let settings_path = Settings::default_path();
    let stored = Settings::load(&settings_path);
    let remembered = stored.with_flags(cli.server.as_deref(), cli.key.as_deref());
    if remembered != stored {
        if let Err(e) = remembered.save(&settings_path) {
            warn!(error = %e, "could not persist settings");
        }
    }
    let endpoint = stored.endpoint(cli.server.as_deref(), cli.key.as_deref());
    info!(server = %endpoint.base_url, "using service");

    let resolver = PathResolver::from_current_dir().context("Failed to read working directory")?;
    let detection = detect_files(tokens.as_slice(), &resolver);

    let api = ApiClient::new(&endpoint)?;
    let orchestrator =
        RemoteOrchestrator::new(api, resolver).with_progress(TransferProgress::for_stderr());

    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    rt.block_on(async {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });

        let mut stdout = tokio::io::stdout();
        match orchestrator
            .run(&detection.command, &detection.files, &mut stdout, &cancel)
            .await
        {
            Ok(report) => {
                print_summary(&report);
                Ok(ExitCode::from(exit_status(&report)))
            }
            Err(e) if e.is_cancelled() => {
                eprintln!("resh: interrupted");
                Ok(ExitCode::from(EXIT_INTERRUPTED))
            }
            Err(e) => Err(anyhow::Error::new(e)),
        }
    })
}

/// Stdin is read only when something is piped in.
fn read_piped_stdin() -> Result<Option<String>> {
    let stdin = std::io::stdin();
    if stdin.is_tty() {
        return Ok(None);
    }
    let mut data = String::new();
    stdin
        .lock()
        .read_to_string(&mut data)
        .context("Failed to read standard input")?;
    Ok(Some(data))
}

fn print_summary(report: &RunReport) {
    for failure in &report.failures {
        eprintln!("resh: {}", failure.error);
    }
    if !report.skipped.is_empty() {
        eprintln!("resh: interrupted, skipped {} file(s)", report.skipped.len());
    }
    if !report.failures.is_empty() {
        eprintln!(
            "resh: {} file(s) downloaded, {} failed",
            report.downloaded.len(),
            report.failures.len()
        );
    }
}

/// Process status for a finished run: interrupted wins over failed.
pub fn exit_status(report: &RunReport) -> u8 {
    if report.cancelled {
        EXIT_INTERRUPTED
    } else if report.is_success() {
        EXIT_OK
    } else {
        EXIT_FAILED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ReshError, Step};
    use crate::orchestrator::DownloadFailure;
    use std::path::PathBuf;

    fn io_failure(path: &str) -> DownloadFailure {
        DownloadFailure {
            remote_path: path.to_string(),
            error: ReshError::local_io(
                Step::Download,
                path,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            ),
        }
    }

    #[test]
    fn all_downloaded_exits_zero() {
        let report = RunReport {
            command_id: "c1".into(),
            downloaded: vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")],
            ..Default::default()
        };
        assert_eq!(exit_status(&report), EXIT_OK);
    }

    #[test]
    fn nothing_produced_exits_zero() {
        assert_eq!(exit_status(&RunReport::default()), EXIT_OK);
    }

    #[test]
    fn one_failure_one_success_exits_non_zero() {
        let report = RunReport {
            command_id: "c1".into(),
            downloaded: vec![PathBuf::from("second.txt")],
            failures: vec![io_failure("first.txt")],
            ..Default::default()
        };
        assert_eq!(exit_status(&report), EXIT_FAILED);
    }

    #[test]
    fn interrupted_run_exits_130() {
        let report = RunReport {
            command_id: "c1".into(),
            downloaded: vec![PathBuf::from("a.txt")],
            failures: vec![io_failure("b.txt")],
            skipped: vec!["c.txt".into()],
            cancelled: true,
        };
        assert_eq!(exit_status(&report), EXIT_INTERRUPTED);
    }
}
