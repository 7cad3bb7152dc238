pub mod http;
pub mod types;

use crate::{
    error::{ExportError, Result},
    job::JobId,
    util::Sleeper,
};
use std::io::Read;
use std::time::Duration;
use tracing::warn;

pub use types::{ExportRequest, ExportSettings, ExportStarted, ExportStatus, StatusReply};

pub const TOO_MANY_REQUESTS: u16 = 429;

/// The three data-export endpoints the pipeline drives.
pub trait ExportApi {
    fn request_export(&self, req: &ExportRequest) -> Result<ExportStarted>;
    fn export_status(&self, job_id: &JobId) -> Result<ExportStatus>;
    /// Opens the compressed payload. The status has already been checked
    /// when this returns, so callers may create files only on `Ok`.
    fn download_export(&self, job_id: &JobId) -> Result<Box<dyn Read>>;
}

/// Runs `call`; on HTTP 429 sleeps `delay` and runs it exactly once more.
/// Whatever the second attempt returns is final.
pub fn retry_once_on_rate_limit<T, S, F>(sleeper: &S, delay: Duration, mut call: F) -> Result<T>
where
    S: Sleeper + ?Sized,
    F: FnMut() -> Result<T>,
{
    match call() {
        Err(ExportError::Remote {
            status: TOO_MANY_REQUESTS,
            url,
            ..
        }) => {
            warn!("rate limited by {url}; retrying once in {}s", delay.as_secs());
            sleeper.sleep(delay);
            call()
        }
        other => other,
    }
}
