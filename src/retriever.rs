use crate::{
    api::ExportApi,
    error::{ExportError, Result},
    job::JobId,
    util::{count_lines, ensure_dir},
};
use flate2::read::GzDecoder;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_CHUNK_BYTES: usize = 8 * 1024;

/// A downloaded export on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievedArtifact {
    pub compressed_path: PathBuf,
    pub decompressed_path: PathBuf,
    pub line_count: u64,
    /// False when an existing `.jsonl` was reused.
    pub downloaded: bool,
}

/// `<stem>.gz` and `<stem>.jsonl` inside a work directory.
///
/// Decompression writes `<stem>.jsonl.partial` and renames it on success, so
/// the `.jsonl` checkpoint only ever names a complete file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub compressed: PathBuf,
    pub decompressed: PathBuf,
    pub partial: PathBuf,
}

impl ArtifactPaths {
    pub fn new(work_dir: &Path, stem: &str) -> Self {
        Self {
            compressed: work_dir.join(format!("{stem}.gz")),
            decompressed: work_dir.join(format!("{stem}.jsonl")),
            partial: work_dir.join(format!("{stem}.jsonl.partial")),
        }
    }
}

pub struct StreamRetriever {
    work_dir: PathBuf,
    chunk_bytes: usize,
}

impl StreamRetriever {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            chunk_bytes: DEFAULT_CHUNK_BYTES,
        }
    }

    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes.max(1);
        self
    }

    /// Produces `<stem>.jsonl` for `job_id`.
    ///
    /// An existing `.jsonl` is the resume checkpoint and is returned without
    /// touching the network. Failed downloads leave partial files in place.
    pub fn retrieve<A: ExportApi + ?Sized>(
        &self,
        api: &A,
        job_id: &JobId,
        stem: &str,
    ) -> Result<RetrievedArtifact> {
        let paths = ArtifactPaths::new(&self.work_dir, stem);

        if paths.decompressed.exists() {
            info!(
                "{} already exists, so we're using it",
                paths.decompressed.display()
            );
            return self.artifact(paths, false);
        }

        let body = api.download_export(job_id)?;
        ensure_dir(&self.work_dir)?;
        let bytes = write_chunked(body, &paths.compressed, self.chunk_bytes)?;
        info!("downloaded {bytes} bytes to {}", paths.compressed.display());

        gunzip(&paths.compressed, &paths.partial)?;
        std::fs::rename(&paths.partial, &paths.decompressed)
            .map_err(|e| ExportError::io(&paths.decompressed, e))?;
        info!(
            "file {} gunzipped to {}",
            paths.compressed.display(),
            paths.decompressed.display()
        );
        self.artifact(paths, true)
    }

    fn artifact(&self, paths: ArtifactPaths, downloaded: bool) -> Result<RetrievedArtifact> {
        let line_count = count_lines(&paths.decompressed)?;
        Ok(RetrievedArtifact {
            compressed_path: paths.compressed,
            decompressed_path: paths.decompressed,
            line_count,
            downloaded,
        })
    }
}

/// Copies `body` into a new file at `dest`, one fixed-size chunk at a time.
fn write_chunked(mut body: Box<dyn Read>, dest: &Path, chunk_bytes: usize) -> Result<u64> {
    let mut out = File::create(dest).map_err(|e| ExportError::io(dest, e))?;
    let mut buf = vec![0u8; chunk_bytes];
    let mut total = 0u64;
    loop {
        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ExportError::io(dest, e)),
        };
        out.write_all(&buf[..n])
            .map_err(|e| ExportError::io(dest, e))?;
        total += n as u64;
    }
    out.flush().map_err(|e| ExportError::io(dest, e))?;
    debug!("wrote {total} bytes in chunks of {chunk_bytes}");
    Ok(total)
}

pub fn gunzip(src: &Path, dest: &Path) -> Result<u64> {
    let input = File::open(src).map_err(|e| ExportError::io(src, e))?;
    let mut decoder = GzDecoder::new(input);
    let output = File::create(dest).map_err(|e| ExportError::io(dest, e))?;
    let mut writer = BufWriter::new(output);
    let n = std::io::copy(&mut decoder, &mut writer).map_err(|e| ExportError::io(src, e))?;
    writer.flush().map_err(|e| ExportError::io(dest, e))?;
    Ok(n)
}
