// create -> output -> list -> download, in that order.
//
// Everything up to and including the listing is fatal on failure. Each
// download stands alone: a failed file is recorded and the next one is
// still attempted. Downloads land in a temporary sibling first and are
// renamed into place only when complete.

use std::future::Future;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{CommandService, CreatedCommand};
use crate::detect::FileSet;
use crate::error::{ReshError, Result, Step};
use crate::progress::TransferProgress;
use crate::resolve::PathResolver;

/// Attempts for idempotent requests (list, download).
pub const MAX_ATTEMPTS: u32 = 2;

/// Longest file name, in bytes, common filesystems accept.
const NAME_MAX: usize = 255;
const PART_SUFFIX: &str = ".resh-part";

#[derive(Debug)]
pub struct DownloadFailure {
    pub remote_path: String,
    pub error: ReshError,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub command_id: String,
    pub downloaded: Vec<PathBuf>,
    pub failures: Vec<DownloadFailure>,
    /// Produced files never attempted because the run was cancelled.
    pub skipped: Vec<String>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

pub struct RemoteOrchestrator<S> {
    service: S,
    resolver: PathResolver,
    progress: TransferProgress,
}

impl<S: CommandService> RemoteOrchestrator<S> {
    pub fn new(service: S, resolver: PathResolver) -> Self {
        RemoteOrchestrator {
            service,
            resolver,
            progress: TransferProgress::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: TransferProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub async fn run(
        &self,
        command: &str,
        files: &FileSet,
        stdout: &mut (dyn AsyncWrite + Unpin + Send),
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        if cancel.is_cancelled() {
            return Err(ReshError::Cancelled(Step::Create));
        }

        let created = guarded(cancel, Step::Create, self.service.create(command, files)).await?;
        guarded(
            cancel,
            Step::Output,
            self.service.stream_output(&created, stdout),
        )
        .await?;

        let produced = with_retry(cancel, Step::List, || self.service.list_files(&created)).await?;
        info!(count = produced.len(), "remote command produced files");

        let mut report = RunReport {
            command_id: created.id.clone(),
            ..Default::default()
        };
        for (index, file) in produced.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                report
                    .skipped
                    .extend(produced[index..].iter().map(|f| f.path.clone()));
                break;
            }
            match self.download_one(&created, &file.path, cancel).await {
                Ok(dest) => report.downloaded.push(dest),
                Err(e) if e.is_cancelled() => {
                    report.cancelled = true;
                    report
                        .skipped
                        .extend(produced[index..].iter().map(|f| f.path.clone()));
                    break;
                }
                Err(error) => {
                    warn!(path = %file.path, error = %error, "download failed");
                    report.failures.push(DownloadFailure {
                        remote_path: file.path.clone(),
                        error,
                    });
                }
            }
        }
        Ok(report)
    }

    /// Fetch one produced file to its place under the sandbox root.
    pub async fn download_one(
        &self,
        created: &CreatedCommand,
        remote_path: &str,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let dest = self
            .resolver
            .local_destination(remote_path)
            .ok_or_else(|| ReshError::UnsafeRemotePath(remote_path.to_string()))?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ReshError::local_io(Step::Download, parent, e))?;
        }
        let tmp = temp_sibling(&dest);

        let spinner = self.progress.spinner(format!("Downloading {}", remote_path));
        let mut attempt = 1;
        let outcome = loop {
            match self.fetch_into(created, remote_path, &tmp, cancel).await {
                Ok(bytes) => break Ok(bytes),
                Err(e) => {
                    let _ = tokio::fs::remove_file(&tmp).await;
                    if attempt < MAX_ATTEMPTS && e.is_transient() && !cancel.is_cancelled() {
                        warn!(path = remote_path, error = %e, "retrying download");
                        attempt += 1;
                        continue;
                    }
                    break Err(e);
                }
            }
        };

        let bytes = match outcome {
            Ok(bytes) => bytes,
            Err(e) => {
                spinner.abandon_with_message(format!("Failed {}", remote_path));
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&tmp, &dest).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            spinner.abandon_with_message(format!("Failed {}", remote_path));
            return Err(ReshError::local_io(Step::Download, &dest, e));
        }
        spinner.finish_with_message(format!("Downloaded {} ({} bytes)", remote_path, bytes));
        info!(path = %dest.display(), bytes, "downloaded");
        Ok(dest)
    }

    async fn fetch_into(
        &self,
        created: &CreatedCommand,
        remote_path: &str,
        tmp: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let mut file = tokio::fs::File::create(tmp)
            .await
            .map_err(|e| ReshError::local_io(Step::Download, tmp, e))?;
        let bytes = guarded(
            cancel,
            Step::Download,
            self.service.download(created, remote_path, &mut file),
        )
        .await?;
        file.flush()
            .await
            .map_err(|e| ReshError::local_io(Step::Download, tmp, e))?;
        Ok(bytes)
    }
}

/// `dir/name` -> `dir/.name.resh-part`. Names too long for that fall back
/// to `dir/.<sha256 prefix>.resh-part`.
pub fn temp_sibling(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let candidate = format!(".{}{}", name, PART_SUFFIX);
    if candidate.len() <= NAME_MAX {
        return dest.with_file_name(candidate);
    }
    let digest = hex::encode(Sha256::digest(name.as_bytes()));
    dest.with_file_name(format!(".{}{}", &digest[..32], PART_SUFFIX))
}

/// Race `fut` against cancellation.
async fn guarded<T>(
    cancel: &CancellationToken,
    step: Step,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReshError::Cancelled(step)),
        res = fut => res,
    }
}

async fn with_retry<T, F, Fut>(cancel: &CancellationToken, step: Step, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match guarded(cancel, step, op()).await {
            Err(e) if attempt < MAX_ATTEMPTS && e.is_transient() => {
                warn!(%step, error = %e, "retrying");
                attempt += 1;
            }
            other => return other,
        }
    }
}
