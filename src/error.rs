// Error taxonomy for the remote run. Every variant names the protocol step
// it came from so the user can tell upload, create, list and download apart.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// The protocol step an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Upload,
    Create,
    Output,
    List,
    Download,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Upload => "upload",
            Step::Create => "create",
            Step::Output => "output",
            Step::List => "list",
            Step::Download => "download",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ReshError {
    #[error("{step} failed{}: network error: {source}", file_suffix(.file))]
    NetworkFailure {
        step: Step,
        file: Option<String>,
        #[source]
        source: reqwest::Error,
    },

    #[error("{step} failed{}: service responded {status}: {message}", file_suffix(.file))]
    ServiceError {
        step: Step,
        file: Option<String>,
        status: u16,
        message: String,
    },

    #[error("{step} failed: cannot access {}: {source}", .path.display())]
    LocalIoFailure {
        step: Step,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("download refused: remote path {0:?} escapes the sandbox root")]
    UnsafeRemotePath(String),

    #[error("{0} cancelled")]
    Cancelled(Step),
}

fn file_suffix(file: &Option<String>) -> String {
    match file {
        Some(f) => format!(" for {}", f),
        None => String::new(),
    }
}

impl ReshError {
    pub fn network(step: Step, source: reqwest::Error) -> Self {
        ReshError::NetworkFailure {
            step,
            file: None,
            source,
        }
    }

    pub fn local_io(step: Step, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReshError::LocalIoFailure {
            step,
            path: path.into(),
            source,
        }
    }

    /// Attach the remote/relative file an error belongs to.
    pub fn for_file(self, name: &str) -> Self {
        match self {
            ReshError::NetworkFailure { step, source, .. } => ReshError::NetworkFailure {
                step,
                file: Some(name.to_string()),
                source,
            },
            ReshError::ServiceError {
                step,
                status,
                message,
                ..
            } => ReshError::ServiceError {
                step,
                file: Some(name.to_string()),
                status,
                message,
            },
            other => other,
        }
    }

    /// Transient failures are worth one more attempt on idempotent requests.
    pub fn is_transient(&self) -> bool {
        match self {
            ReshError::NetworkFailure { .. } => true,
            ReshError::ServiceError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReshError::Cancelled(_))
    }
}

pub type Result<T> = std::result::Result<T, ReshError>;
