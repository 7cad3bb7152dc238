use crate::job::{ExportModel, JobId};
use serde::{Deserialize, Serialize};

/// Body of `POST /data_exports`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
    pub status: Vec<String>,
    pub export_settings: ExportSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSettings {
    pub format: String,
    pub model: ExportModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

impl ExportRequest {
    pub fn jsonl(model: ExportModel, status: Vec<String>, fields: Option<Vec<String>>) -> Self {
        Self {
            status,
            export_settings: ExportSettings {
                format: "jsonl".into(),
                model,
                fields,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportStarted {
    pub search_id: JobId,
    pub record_count: u64,
}

/// Body of a 200 from `GET /data_exports/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReply {
    #[serde(default)]
    pub message: String,
}

pub const READY_MESSAGE: &str = "Export ready for download";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStatus {
    Pending,
    Ready,
}

impl StatusReply {
    pub fn status(&self) -> ExportStatus {
        if self.message == READY_MESSAGE {
            ExportStatus::Ready
        } else {
            ExportStatus::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(message: &str) -> StatusReply {
        StatusReply {
            message: message.into(),
        }
    }

    #[test]
    fn only_the_exact_ready_message_means_ready() {
        assert_eq!(reply(READY_MESSAGE).status(), ExportStatus::Ready);
        assert_eq!(reply("Export in progress").status(), ExportStatus::Pending);
        assert_eq!(reply("export ready for download").status(), ExportStatus::Pending);
        assert_eq!(reply("").status(), ExportStatus::Pending);
    }

    #[test]
    fn missing_message_is_pending() {
        let r: StatusReply = serde_json::from_str("{}").unwrap();
        assert_eq!(r.status(), ExportStatus::Pending);
    }
}
