use crate::{
    error::{ExportError, Result},
    job::{ExportModel, JobId},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// One output row plus the count it sorts by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub count: u64,
    pub cells: Vec<String>,
}

impl ReportRow {
    pub fn new(count: u64, cells: Vec<String>) -> Self {
        Self { count, cells }
    }
}

/// Anything that can be dumped as a header plus rows in insertion order.
pub trait ReportSource {
    fn header(&self) -> Vec<&'static str>;
    fn rows(&self) -> Vec<ReportRow>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Insertion,
    /// Highest count first; ties keep insertion order.
    CountDesc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSpec {
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl ReportSpec {
    pub fn insertion() -> Self {
        Self {
            order: SortOrder::Insertion,
            limit: None,
        }
    }

    pub fn by_count() -> Self {
        Self {
            order: SortOrder::CountDesc,
            limit: None,
        }
    }

    pub fn top(n: usize) -> Self {
        Self {
            order: SortOrder::CountDesc,
            limit: Some(n),
        }
    }
}

pub fn ordered_rows<S: ReportSource + ?Sized>(source: &S, spec: ReportSpec) -> Vec<ReportRow> {
    let mut rows = source.rows();
    if spec.order == SortOrder::CountDesc {
        rows.sort_by(|a, b| b.count.cmp(&a.count));
    }
    if let Some(limit) = spec.limit {
        rows.truncate(limit);
    }
    rows
}

/// Writes `source` as CSV to `path`; returns the number of data rows.
pub fn write_csv<S: ReportSource + ?Sized>(source: &S, spec: ReportSpec, path: &Path) -> Result<usize> {
    let csv_err = |e: csv::Error| ExportError::io(path, std::io::Error::other(e));

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(csv_err)?;
    writer.write_record(source.header()).map_err(csv_err)?;

    let rows = ordered_rows(source, spec);
    for row in &rows {
        writer.write_record(&row.cells).map_err(csv_err)?;
    }
    writer.flush().map_err(|e| ExportError::io(path, e))?;

    info!("{} is now available", path.display());
    Ok(rows.len())
}

/// Written next to the report when `output.write_summary_json` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub job_id: JobId,
    pub model: ExportModel,
    pub estimated_record_count: u64,
    pub export_file: PathBuf,
    pub downloaded: bool,
    pub lines: u64,
    pub distinct_keys: usize,
    pub report: PathBuf,
    pub rows_written: usize,
    pub started: String,
    pub finished: String,
}
