use crate::job::JobId;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExportError>;

/// Every failure is terminal for the invocation. The only retry anywhere is
/// the single rate-limit grace retry in [`crate::api::retry_once_on_rate_limit`].
#[derive(Debug, Error)]
pub enum ExportError {
    /// The API answered with a status the pipeline cannot continue from.
    #[error("{context}: HTTP {status} from {url}: {body}")]
    Remote {
        context: &'static str,
        status: u16,
        url: String,
        body: String,
    },

    /// No HTTP status at all (DNS, connect, TLS, reset).
    #[error("{context}: transport error calling {url}: {message}")]
    Transport {
        context: &'static str,
        url: String,
        message: String,
    },

    /// A success status whose body did not have the expected shape.
    #[error("{context}: unexpected response from {url}: {message}")]
    Response {
        context: &'static str,
        url: String,
        message: String,
    },

    #[error(
        "export {job_id} not ready after waiting {waited_secs}s (budget {budget_secs}s); \
         re-run with search id {job_id}"
    )]
    Timeout {
        job_id: JobId,
        waited_secs: u64,
        budget_secs: u64,
    },

    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: line {line}: {message}", path.display())]
    Format {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl ExportError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExportError::Io {
            path: path.into(),
            source,
        }
    }

    /// HTTP status carried by a `Remote` error.
    pub fn status(&self) -> Option<u16> {
        match self {
            ExportError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}
