use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub export: Export,
    #[serde(default)]
    pub filters: Filters,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub processing: Processing,
    #[serde(default)]
    pub cve: Cve,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Api {
    pub base_url: String,
    /// Environment variable holding the API token.
    pub token_env: String,
    pub token_header: String,
    pub user_agent: String,
    pub connect_timeout_seconds: u64,
    /// Per-read timeout; a slow download is fine as long as bytes keep coming.
    pub read_timeout_seconds: u64,
}
impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: "https://api.kennasecurity.com".into(),
            token_env: "KENNA_API_KEY".into(),
            token_header: "X-Risk-Token".into(),
            user_agent: concat!("export-harvest/", env!("CARGO_PKG_VERSION")).into(),
            connect_timeout_seconds: 30,
            read_timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Export {
    /// Exports estimated below this many records poll on the short interval.
    pub small_export_threshold: u64,
    pub small_poll_interval_seconds: u64,
    pub large_poll_interval_seconds: u64,
    pub throughput_records_per_second: u64,
    pub min_time_budget_seconds: u64,
    /// Record estimate used when resuming a job whose size is unknown.
    pub resume_assumed_record_count: u64,
    pub rate_limit_retry_seconds: u64,
    pub download_chunk_bytes: usize,
}
impl Default for Export {
    fn default() -> Self {
        Self {
            small_export_threshold: 1000,
            small_poll_interval_seconds: 5,
            large_poll_interval_seconds: 10,
            throughput_records_per_second: 16,
            min_time_budget_seconds: 60,
            resume_assumed_record_count: 50_000,
            rate_limit_retry_seconds: 3,
            download_chunk_bytes: 8 * 1024,
        }
    }
}

impl Export {
    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_secs(self.rate_limit_retry_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Filters {
    pub asset_status: Vec<String>,
    pub vulnerability_status: Vec<String>,
}
impl Default for Filters {
    fn default() -> Self {
        Self {
            asset_status: vec!["active".into()],
            vulnerability_status: vec!["open".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Where `.gz` and `.jsonl` export artifacts live between runs.
    pub work_dir: String,
    pub out_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            work_dir: ".".into(),
            out_dir: ".".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Processing {
    pub progress_interval: u64,
}
impl Default for Processing {
    fn default() -> Self {
        Self {
            progress_interval: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Cve {
    pub id_pattern: String,
    pub top_n: usize,
}
impl Default for Cve {
    fn default() -> Self {
        Self {
            id_pattern: "(?i)^CVE-\\d{4}-\\d{4,}$".into(),
            top_n: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub tags_filename: String,
    pub custom_fields_filename: String,
    pub cves_filename: String,
    pub write_summary_json: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            tags_filename: "uniq_asset_tags.csv".into(),
            custom_fields_filename: "uniq_custom_fields.csv".into(),
            cves_filename: "uniq_cve_ids.csv".into(),
            write_summary_json: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}
