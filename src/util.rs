use crate::error::{ExportError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;

pub fn ensure_dir(p: &Path) -> Result<()> {
    std::fs::create_dir_all(p).map_err(|e| ExportError::io(p, e))
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Blocking pause between API calls. Tests swap in a recorder.
pub trait Sleeper {
    fn sleep(&self, d: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

/// Counts lines by newline bytes, reading 1 MiB at a time.
///
/// A final line without a trailing `\n` still counts, so the result is the
/// newline count plus one for such files. An empty file has zero lines.
pub fn count_lines(path: &Path) -> Result<u64> {
    let mut f = File::open(path).map_err(|e| ExportError::io(path, e))?;
    let mut buf = vec![0u8; 1024 * 1024];
    let mut lines = 0u64;
    let mut last = None;
    loop {
        let n = f.read(&mut buf).map_err(|e| ExportError::io(path, e))?;
        if n == 0 {
            break;
        }
        lines += buf[..n].iter().filter(|&&b| b == b'\n').count() as u64;
        last = Some(buf[n - 1]);
    }
    match last {
        Some(b'\n') | None => Ok(lines),
        Some(_) => Ok(lines + 1),
    }
}
