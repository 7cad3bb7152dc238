use super::{ExportApi, ExportRequest, ExportStarted, ExportStatus, StatusReply, retry_once_on_rate_limit};
use crate::{
    config::Config,
    error::{ExportError, Result},
    job::JobId,
    util::ThreadSleeper,
};
use std::io::Read;
use std::time::Duration;
use tracing::debug;

const HTTP_OK: u16 = 200;
const HTTP_PARTIAL_CONTENT: u16 = 206;

/// Blocking client for the data-export endpoints.
pub struct HttpExportApi {
    agent: ureq::Agent,
    base_url: String,
    token_header: String,
    token: String,
    rate_limit_delay: Duration,
    sleeper: ThreadSleeper,
}

impl HttpExportApi {
    pub fn new(cfg: &Config) -> Result<Self> {
        let token = std::env::var(&cfg.api.token_env).map_err(|_| {
            ExportError::Config(format!(
                "environment variable {} is not set",
                cfg.api.token_env
            ))
        })?;
        Ok(Self::with_token(cfg, token))
    }

    pub fn with_token(cfg: &Config, token: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(cfg.api.connect_timeout_seconds))
            .timeout_read(Duration::from_secs(cfg.api.read_timeout_seconds))
            .user_agent(&cfg.api.user_agent)
            .build();
        Self {
            agent,
            base_url: cfg.api.base_url.trim_end_matches('/').to_string(),
            token_header: cfg.api.token_header.clone(),
            token: token.into(),
            rate_limit_delay: cfg.export.rate_limit_delay(),
            sleeper: ThreadSleeper,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, url: &str, accept: &str) -> ureq::Request {
        self.agent
            .get(url)
            .set(&self.token_header, &self.token)
            .set("Accept", accept)
    }

    /// Issues the request built by `make`, with the one-shot 429 retry.
    fn send<F>(&self, context: &'static str, url: &str, make: F) -> Result<ureq::Response>
    where
        F: Fn() -> std::result::Result<ureq::Response, ureq::Error>,
    {
        retry_once_on_rate_limit(&self.sleeper, self.rate_limit_delay, || {
            debug!("{context}: {url}");
            classify(context, url, make())
        })
    }
}

fn classify(
    context: &'static str,
    url: &str,
    result: std::result::Result<ureq::Response, ureq::Error>,
) -> Result<ureq::Response> {
    match result {
        Ok(resp) => Ok(resp),
        Err(ureq::Error::Status(status, resp)) => Err(ExportError::Remote {
            context,
            status,
            url: url.to_string(),
            body: resp.into_string().unwrap_or_default(),
        }),
        Err(ureq::Error::Transport(transport)) => Err(ExportError::Transport {
            context,
            url: url.to_string(),
            message: transport.to_string(),
        }),
    }
}

/// ureq only errors on 4xx/5xx; anything else but `expected` is still fatal.
fn expect_status(
    context: &'static str,
    url: &str,
    resp: ureq::Response,
    expected: &[u16],
) -> Result<ureq::Response> {
    let status = resp.status();
    if expected.contains(&status) {
        return Ok(resp);
    }
    Err(ExportError::Remote {
        context,
        status,
        url: url.to_string(),
        body: resp.into_string().unwrap_or_default(),
    })
}

impl ExportApi for HttpExportApi {
    fn request_export(&self, req: &ExportRequest) -> Result<ExportStarted> {
        const CONTEXT: &str = "request data export";
        let url = self.url("/data_exports");
        let resp = self.send(CONTEXT, &url, || {
            self.agent
                .post(&url)
                .set(&self.token_header, &self.token)
                .set("Accept", "application/json")
                .send_json(req)
        })?;
        let resp = expect_status(CONTEXT, &url, resp, &[HTTP_OK])?;
        resp.into_json::<ExportStarted>()
            .map_err(|e| ExportError::Response {
                context: CONTEXT,
                url,
                message: format!("failed to parse JSON: {e}"),
            })
    }

    fn export_status(&self, job_id: &JobId) -> Result<ExportStatus> {
        const CONTEXT: &str = "check data export status";
        let url = self.url("/data_exports/status");
        let resp = self.send(CONTEXT, &url, || {
            self.get(&url, "application/json")
                .query("search_id", job_id.as_str())
                .call()
        })?;
        let resp = expect_status(CONTEXT, &url, resp, &[HTTP_OK, HTTP_PARTIAL_CONTENT])?;
        if resp.status() == HTTP_PARTIAL_CONTENT {
            return Ok(ExportStatus::Pending);
        }
        let reply: StatusReply = resp.into_json().map_err(|e| ExportError::Response {
            context: CONTEXT,
            url,
            message: format!("failed to parse JSON: {e}"),
        })?;
        Ok(reply.status())
    }

    fn download_export(&self, job_id: &JobId) -> Result<Box<dyn Read>> {
        const CONTEXT: &str = "retrieve data export";
        let url = self.url("/data_exports/");
        let resp = self.send(CONTEXT, &url, || {
            self.get(&url, "application/gzip; charset=utf-8")
                .query("search_id", job_id.as_str())
                .call()
        })?;
        let resp = expect_status(CONTEXT, &url, resp, &[HTTP_OK])?;
        Ok(Box::new(resp.into_reader()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let mut cfg = Config::default();
        cfg.api.base_url = "https://api.example.test/".into();
        let api = HttpExportApi::with_token(&cfg, "t");
        assert_eq!(api.url("/data_exports"), "https://api.example.test/data_exports");
    }

    #[test]
    fn missing_token_is_a_config_error() {
        let mut cfg = Config::default();
        cfg.api.token_env = "EXPORT_HARVEST_TEST_TOKEN_THAT_IS_NEVER_SET".into();
        let err = HttpExportApi::new(&cfg).err().expect("missing token");
        assert!(matches!(err, ExportError::Config(_)));
    }
}
