use crate::error::ExportError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identifier the service assigns to an export. The API hands it out as a
/// number but accepts it back as a query string, so it is kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        JobId(id.into())
    }

    /// Validates an id typed by the user. It becomes part of a file name, so
    /// path separators and `..` are refused.
    pub fn parse(raw: &str) -> Result<Self, ExportError> {
        let id = raw.trim();
        if id.is_empty() {
            return Err(ExportError::Config("search id must not be empty".into()));
        }
        if id.contains(['/', '\\']) || id.contains("..") {
            return Err(ExportError::Config(format!(
                "search id {id:?} must not contain path separators or '..'"
            )));
        }
        Ok(JobId(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => JobId(n.to_string()),
            Raw::Text(s) => JobId(s),
        })
    }
}

/// Entity an export materializes. Also the prefix of the on-disk artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportModel {
    Asset,
    Vulnerability,
}

impl ExportModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportModel::Asset => "asset",
            ExportModel::Vulnerability => "vulnerability",
        }
    }

    /// Artifact prefix: `assets_<id>.jsonl`, `vulns_<id>.jsonl`.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            ExportModel::Asset => "assets",
            ExportModel::Vulnerability => "vulns",
        }
    }
}

impl fmt::Display for ExportModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Ready,
    TimedOut,
}

/// A server-side export this invocation is working on.
#[derive(Debug, Clone, Serialize)]
pub struct ExportJob {
    pub job_id: JobId,
    pub model: ExportModel,
    pub estimated_record_count: u64,
    status: JobStatus,
}

impl ExportJob {
    pub fn new(job_id: JobId, model: ExportModel, estimated_record_count: u64) -> Self {
        Self {
            job_id,
            model,
            estimated_record_count,
            status: JobStatus::Pending,
        }
    }

    /// A job whose export is already on disk from an earlier run; it needs
    /// no polling.
    pub fn from_checkpoint(job_id: JobId, model: ExportModel, estimated_record_count: u64) -> Self {
        Self {
            status: JobStatus::Ready,
            ..Self::new(job_id, model, estimated_record_count)
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn is_ready(&self) -> bool {
        self.status == JobStatus::Ready
    }

    /// Ready is terminal; later transitions are ignored.
    pub(crate) fn transition(&mut self, next: JobStatus) {
        if self.status != JobStatus::Ready {
            self.status = next;
        }
    }

    /// `<prefix>_<job_id>`, the stem shared by the `.gz` and `.jsonl` files.
    pub fn artifact_stem(&self) -> String {
        format!("{}_{}", self.model.file_prefix(), self.job_id)
    }
}
