use crate::{
    accumulate::Accumulator,
    api::ExportApi,
    config::Config,
    error::{ExportError, Result},
    job::{ExportJob, JobId},
    poller::{self, PollSchedule},
    processor::RecordStreamProcessor,
    report::{self, ReportSource, ReportSpec, RunSummary},
    requester::{self, ExportParams},
    retriever::{ArtifactPaths, RetrievedArtifact, StreamRetriever},
    util::{Sleeper, ensure_dir, now_rfc3339},
};
use std::path::{Path, PathBuf};
use tracing::info;

/// Request -> poll -> retrieve -> process -> write, for one export job.
///
/// All state for the run lives here and in the [`ExportJob`] it hands back;
/// nothing is kept in globals, so tests can drive it with fakes.
pub struct Pipeline<A: ExportApi, S: Sleeper> {
    cfg: Config,
    api: A,
    sleeper: S,
}

pub struct Fetched {
    pub job: ExportJob,
    pub artifact: RetrievedArtifact,
}

pub struct ReportOutcome<Acc> {
    pub fetched: Fetched,
    pub accumulator: Acc,
    pub report_path: PathBuf,
    pub summary: RunSummary,
}

impl<A: ExportApi, S: Sleeper> Pipeline<A, S> {
    pub fn new(cfg: &Config, api: A, sleeper: S) -> Self {
        Self {
            cfg: cfg.clone(),
            api,
            sleeper,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    fn work_dir(&self) -> PathBuf {
        PathBuf::from(&self.cfg.paths.work_dir)
    }

    fn checkpoint_exists(&self, job: &ExportJob) -> bool {
        ArtifactPaths::new(&self.work_dir(), &job.artifact_stem())
            .decompressed
            .exists()
    }

    /// Starts a new export, or picks up `resume` from an earlier run, and
    /// waits for it to become downloadable.
    ///
    /// A resumed job whose `.jsonl` is already on disk is not polled at all.
    pub fn acquire(&self, params: &ExportParams, resume: Option<JobId>) -> Result<ExportJob> {
        let mut job = match resume {
            Some(job_id) => {
                info!("using search id {job_id}");
                let job = ExportJob::new(
                    job_id,
                    params.model,
                    self.cfg.export.resume_assumed_record_count,
                );
                if self.checkpoint_exists(&job) {
                    return Ok(ExportJob::from_checkpoint(
                        job.job_id,
                        job.model,
                        job.estimated_record_count,
                    ));
                }
                job
            }
            None => requester::request_export(&self.api, params)?,
        };

        let schedule = PollSchedule::for_records(&self.cfg.export, job.estimated_record_count);
        poller::wait_until_ready(&self.api, &self.sleeper, schedule, &mut job)?;
        Ok(job)
    }

    pub fn fetch(&self, params: &ExportParams, resume: Option<JobId>) -> Result<Fetched> {
        let job = self.acquire(params, resume)?;
        let retriever = StreamRetriever::new(self.work_dir())
            .with_chunk_bytes(self.cfg.export.download_chunk_bytes);
        let artifact = retriever.retrieve(&self.api, &job.job_id, &job.artifact_stem())?;
        info!(
            "file: {} with {} {} records",
            artifact.decompressed_path.display(),
            artifact.line_count,
            job.model
        );
        Ok(Fetched { job, artifact })
    }

    /// Full run: fetch the export, fold it into `acc`, write the CSV report
    /// (and the JSON summary when enabled) into `paths.out_dir`.
    pub fn run_report<Acc>(
        &self,
        params: &ExportParams,
        resume: Option<JobId>,
        acc: Acc,
        spec: ReportSpec,
        report_filename: &str,
    ) -> Result<ReportOutcome<Acc>>
    where
        Acc: Accumulator + ReportSource,
    {
        let started = now_rfc3339();
        let fetched = self.fetch(params, resume)?;

        let processor = RecordStreamProcessor::new(self.cfg.processing.progress_interval);
        let processed = processor.process(&fetched.artifact.decompressed_path, acc)?;
        info!(
            "{} unique keys discovered in {} records",
            processed.accumulator.len(),
            processed.lines
        );

        let out_dir = PathBuf::from(&self.cfg.paths.out_dir);
        ensure_dir(&out_dir)?;
        let report_path = out_dir.join(report_filename);
        let rows_written = report::write_csv(&processed.accumulator, spec, &report_path)?;

        let summary = RunSummary {
            job_id: fetched.job.job_id.clone(),
            model: fetched.job.model,
            estimated_record_count: fetched.job.estimated_record_count,
            export_file: fetched.artifact.decompressed_path.clone(),
            downloaded: fetched.artifact.downloaded,
            lines: processed.lines,
            distinct_keys: processed.accumulator.len(),
            report: report_path.clone(),
            rows_written,
            started,
            finished: now_rfc3339(),
        };
        if self.cfg.output.write_summary_json {
            write_summary(&summary, &report_path)?;
        }

        Ok(ReportOutcome {
            fetched,
            accumulator: processed.accumulator,
            report_path,
            summary,
        })
    }
}

/// `<report>.summary.json` beside the report.
fn write_summary(summary: &RunSummary, report_path: &Path) -> Result<()> {
    let path = report_path.with_extension("summary.json");
    let raw = serde_json::to_string_pretty(summary)
        .map_err(|e| ExportError::io(&path, std::io::Error::other(e)))?;
    std::fs::write(&path, raw).map_err(|e| ExportError::io(&path, e))
}
