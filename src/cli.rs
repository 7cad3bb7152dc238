use crate::{
    accumulate::{CustomFieldDictionary, CveCounter, TagFrequency},
    api::http::HttpExportApi,
    config::Config,
    job::{ExportModel, JobId},
    pipeline::Pipeline,
    report::{ReportSpec, ordered_rows},
    requester::ExportParams,
    util::{ThreadSleeper, ensure_dir},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "export-harvest")]
#[command(about = "Request, poll, download and summarize bulk data exports")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./export-harvest.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Unique asset tags and how many assets carry each.
    Tags {
        /// Search id of an earlier export; omit to start a new one.
        search_id: Option<String>,
    },
    /// Unique vulnerability custom fields with their observed values.
    CustomFields {
        search_id: Option<String>,
    },
    /// CVE ids by number of open vulnerabilities.
    Cves {
        search_id: Option<String>,
        /// How many of the most frequent CVEs to print.
        #[arg(long)]
        top: Option<usize>,
    },
    /// Download and unpack an export without processing it.
    Fetch {
        search_id: Option<String>,
        #[arg(long, value_enum, default_value_t = ModelArg::Asset)]
        model: ModelArg,
        /// Restrict the export to these fields (repeatable).
        #[arg(long = "field")]
        fields: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelArg {
    Asset,
    Vulnerability,
}

impl From<ModelArg> for ExportModel {
    fn from(m: ModelArg) -> Self {
        match m {
            ModelArg::Asset => ExportModel::Asset,
            ModelArg::Vulnerability => ExportModel::Vulnerability,
        }
    }
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = match resolve_config_path(args.config.as_deref()) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };
    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    // Logged here so the file writer is still running.
    run(&args, &cfg).inspect_err(|err| error!("{:#}", err))
}

fn run(args: &Args, cfg: &Config) -> Result<()> {
    let api = HttpExportApi::new(cfg)?;
    let pipeline = Pipeline::new(cfg, api, ThreadSleeper);

    match &args.cmd {
        Command::Tags { search_id } => tags(&pipeline, cfg, parse_search_id(search_id)?),
        Command::CustomFields { search_id } => {
            custom_fields(&pipeline, cfg, parse_search_id(search_id)?)
        }
        Command::Cves { search_id, top } => cves(
            &pipeline,
            cfg,
            parse_search_id(search_id)?,
            top.unwrap_or(cfg.cve.top_n),
        ),
        Command::Fetch {
            search_id,
            model,
            fields,
        } => fetch(
            &pipeline,
            cfg,
            parse_search_id(search_id)?,
            (*model).into(),
            fields.clone(),
        ),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    let default = PathBuf::from("export-harvest.toml");
    default.exists().then_some(default)
}

fn parse_search_id(raw: &Option<String>) -> Result<Option<JobId>> {
    Ok(raw.as_deref().map(JobId::parse).transpose()?)
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    Some(PathBuf::from(&cfg.paths.out_dir).join("export-harvest.log"))
}

type HttpPipeline = Pipeline<HttpExportApi, ThreadSleeper>;

fn tags(pipeline: &HttpPipeline, cfg: &Config, resume: Option<JobId>) -> Result<()> {
    info!("get unique asset tags");
    let params = ExportParams::for_model(cfg, ExportModel::Asset);
    let outcome = pipeline
        .run_report(
            &params,
            resume,
            TagFrequency::new(),
            ReportSpec::insertion(),
            &cfg.output.tags_filename,
        )
        .context("unique asset tags")?;
    println!(
        "{} unique asset tags discovered in {} assets; wrote {}",
        outcome.summary.distinct_keys,
        outcome.summary.lines,
        outcome.report_path.display()
    );
    Ok(())
}

fn custom_fields(pipeline: &HttpPipeline, cfg: &Config, resume: Option<JobId>) -> Result<()> {
    info!("list unique custom fields");
    let params = ExportParams::for_model(cfg, ExportModel::Vulnerability);
    let outcome = pipeline
        .run_report(
            &params,
            resume,
            CustomFieldDictionary::new(),
            ReportSpec::insertion(),
            &cfg.output.custom_fields_filename,
        )
        .context("unique custom fields")?;
    println!(
        "{} unique custom fields discovered in {} vulns; wrote {}",
        outcome.summary.distinct_keys,
        outcome.summary.lines,
        outcome.report_path.display()
    );
    Ok(())
}

fn cves(pipeline: &HttpPipeline, cfg: &Config, resume: Option<JobId>, top: usize) -> Result<()> {
    info!("count unique CVE ids");
    let params = ExportParams::for_model(cfg, ExportModel::Vulnerability);
    let counter = CveCounter::new(&cfg.cve.id_pattern)?;
    let outcome = pipeline
        .run_report(
            &params,
            resume,
            counter,
            ReportSpec::by_count(),
            &cfg.output.cves_filename,
        )
        .context("unique CVE ids")?;

    println!("Top {top} CVE counts");
    for row in ordered_rows(&outcome.accumulator, ReportSpec::top(top)) {
        println!("{}: {}", row.cells[0], row.count);
    }
    println!(
        "{} CVE ids in {} vulns; wrote {}",
        outcome.summary.distinct_keys,
        outcome.summary.lines,
        outcome.report_path.display()
    );
    Ok(())
}

fn fetch(
    pipeline: &HttpPipeline,
    cfg: &Config,
    resume: Option<JobId>,
    model: ExportModel,
    fields: Vec<String>,
) -> Result<()> {
    let params = ExportParams::for_model(cfg, model).with_fields(fields);
    let fetched = pipeline.fetch(&params, resume).context("fetch export")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "search_id": fetched.job.job_id,
            "model": fetched.job.model,
            "file": fetched.artifact.decompressed_path,
            "lines": fetched.artifact.line_count,
            "downloaded": fetched.artifact.downloaded,
        }))?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_id_is_optional_but_validated() {
        assert!(parse_search_id(&None).unwrap().is_none());
        let id = parse_search_id(&Some("4242".into())).unwrap().unwrap();
        assert_eq!(id.as_str(), "4242");
        assert!(parse_search_id(&Some("../etc".into())).is_err());
        assert!(parse_search_id(&Some(" ".into())).is_err());
    }

    #[test]
    fn fatal_error_reaches_the_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("run.log");
        let config = dir.path().join("export-harvest.toml");
        std::fs::write(
            &config,
            format!(
                "[api]\ntoken_env = \"EXPORT_HARVEST_CLI_TEST_TOKEN_NEVER_SET\"\n\n[logging]\nfile_path = {:?}\n",
                log.display().to_string()
            ),
        )
        .unwrap();

        let args = Args::try_parse_from([
            "export-harvest",
            "--config",
            config.to_str().unwrap(),
            "tags",
        ])
        .unwrap();
        assert!(dispatch(args).is_err());

        let written = std::fs::read_to_string(&log).unwrap();
        assert!(
            written.contains("EXPORT_HARVEST_CLI_TEST_TOKEN_NEVER_SET"),
            "{written}"
        );
    }
}
