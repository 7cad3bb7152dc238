use crate::{
    api::{ExportApi, ExportRequest},
    config::Config,
    error::Result,
    job::{ExportJob, ExportModel},
};
use tracing::info;

/// Filter and model parameters for one export.
#[derive(Debug, Clone)]
pub struct ExportParams {
    pub model: ExportModel,
    pub status: Vec<String>,
    pub fields: Option<Vec<String>>,
}

impl ExportParams {
    /// Default status filter for `model` from the `[filters]` section.
    pub fn for_model(cfg: &Config, model: ExportModel) -> Self {
        let status = match model {
            ExportModel::Asset => cfg.filters.asset_status.clone(),
            ExportModel::Vulnerability => cfg.filters.vulnerability_status.clone(),
        };
        Self {
            model,
            status,
            fields: None,
        }
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = if fields.is_empty() { None } else { Some(fields) };
        self
    }
}

/// Starts a server-side export. No retry beyond the API's rate-limit grace:
/// a rejected request will not succeed by sending it again.
pub fn request_export<A: ExportApi + ?Sized>(api: &A, params: &ExportParams) -> Result<ExportJob> {
    let req = ExportRequest::jsonl(params.model, params.status.clone(), params.fields.clone());
    let started = api.request_export(&req)?;
    info!(
        "new search id {} with {} {} records",
        started.search_id, started.record_count, params.model
    );
    Ok(ExportJob::new(
        started.search_id,
        params.model,
        started.record_count,
    ))
}
