mod common;

use common::{FakeApi, RecordingSleeper, Step, gzip};
use export_harvest::{
    accumulate::{CveCounter, TagFrequency},
    config::Config,
    error::ExportError,
    job::{ExportModel, JobId, JobStatus},
    pipeline::Pipeline,
    report::{ReportSpec, RunSummary},
    requester::ExportParams,
};
use tempfile::TempDir;

const ASSETS: &str = concat!(
    "{\"id\":1,\"tags\":[\"prod\",\"linux\"]}\n",
    "{\"id\":2,\"tags\":[\"prod\"]}\n",
    "{\"id\":3,\"tags\":[]}\n",
);

fn config(dir: &TempDir) -> Config {
    let mut cfg = Config::default();
    cfg.paths.work_dir = dir.path().join("work").display().to_string();
    cfg.paths.out_dir = dir.path().join("out").display().to_string();
    cfg
}

#[test]
fn fresh_export_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);
    let api = FakeApi::new()
        .started("1234", 3)
        .steps(&[Step::Pending, Step::Ready])
        .payload(gzip(ASSETS));
    let pipeline = Pipeline::new(&cfg, api, RecordingSleeper::default());

    let params = ExportParams::for_model(&cfg, ExportModel::Asset);
    let outcome = pipeline
        .run_report(
            &params,
            None,
            TagFrequency::new(),
            ReportSpec::insertion(),
            "tags.csv",
        )
        .expect("run");

    let requests = pipeline.api().requests.borrow();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].status, vec!["active".to_string()]);
    assert_eq!(requests[0].export_settings.format, "jsonl");
    assert_eq!(requests[0].export_settings.model, ExportModel::Asset);

    assert_eq!(outcome.fetched.job.job_id, JobId::new("1234"));
    assert!(outcome.fetched.job.is_ready());
    assert_eq!(
        outcome.fetched.artifact.decompressed_path,
        dir.path().join("work").join("assets_1234.jsonl")
    );
    assert_eq!(outcome.summary.lines, 3);
    assert_eq!(outcome.summary.distinct_keys, 2);

    let csv = std::fs::read_to_string(dir.path().join("out").join("tags.csv")).unwrap();
    assert_eq!(csv, "Asset Tag Name,Asset Tag Count\nprod,2\nlinux,1\n");

    let raw = std::fs::read_to_string(dir.path().join("out").join("tags.summary.json")).unwrap();
    let summary: RunSummary = serde_json::from_str(&raw).unwrap();
    assert_eq!(summary.job_id.as_str(), "1234");
    assert!(summary.downloaded);
}

#[test]
fn resumed_job_with_checkpoint_skips_the_api() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);
    let work = dir.path().join("work");
    std::fs::create_dir_all(&work).unwrap();
    std::fs::write(
        work.join("vulns_77.jsonl"),
        "{\"cve_id\":\"CVE-2014-0160\"}\n{\"cve_id\":\"CVE-2014-0160\"}\n{\"cve_id\":\"CVE-2017-5638\"}",
    )
    .unwrap();

    let pipeline = Pipeline::new(&cfg, FakeApi::new(), RecordingSleeper::default());
    let params = ExportParams::for_model(&cfg, ExportModel::Vulnerability);
    let outcome = pipeline
        .run_report(
            &params,
            Some(JobId::new("77")),
            CveCounter::new(&cfg.cve.id_pattern).unwrap(),
            ReportSpec::by_count(),
            "cves.csv",
        )
        .expect("run");

    assert_eq!(pipeline.api().total_calls(), 0);
    assert!(!outcome.fetched.artifact.downloaded);
    assert_eq!(outcome.fetched.job.status(), JobStatus::Ready);
    assert_eq!(outcome.accumulator.count("CVE-2014-0160"), 2);
    let csv = std::fs::read_to_string(dir.path().join("out").join("cves.csv")).unwrap();
    assert_eq!(csv, "CVE,CVE Count\nCVE-2014-0160,2\nCVE-2017-5638,1\n");
}

#[test]
fn resumed_job_polls_with_the_assumed_size() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);
    let api = FakeApi::new()
        .steps(&[Step::Pending, Step::Ready])
        .payload(gzip("{}\n{}\n"));
    let pipeline = Pipeline::new(&cfg, api, RecordingSleeper::default());

    let params = ExportParams::for_model(&cfg, ExportModel::Asset);
    let fetched = pipeline.fetch(&params, Some(JobId::new("55"))).unwrap();

    assert!(pipeline.api().requests.borrow().is_empty());
    assert_eq!(fetched.job.estimated_record_count, 50_000);
    assert_eq!(fetched.artifact.line_count, 2);
}

#[test]
fn timeout_leaves_nothing_to_process() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(&dir);
    cfg.export.min_time_budget_seconds = 0;
    let api = FakeApi::new().started("9", 20).payload(gzip("{}\n{}\n"));
    let pipeline = Pipeline::new(&cfg, api, RecordingSleeper::default());

    let params = ExportParams::for_model(&cfg, ExportModel::Asset);
    let err = pipeline.fetch(&params, None).err().expect("timeout");

    assert!(matches!(err, ExportError::Timeout { budget_secs: 2, .. }));
    assert_eq!(pipeline.api().download_calls.get(), 0);
    assert!(!dir.path().join("work").exists());
}

#[test]
fn single_record_export_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);
    let api = FakeApi::new()
        .started("3", 1)
        .steps(&[Step::Ready])
        .payload(gzip("{\"data\":[{\"id\":1,\"tags\":[\"a\"]}]}"));
    let pipeline = Pipeline::new(&cfg, api, RecordingSleeper::default());

    let params = ExportParams::for_model(&cfg, ExportModel::Asset);
    let err = pipeline
        .run_report(&params, None, TagFrequency::new(), ReportSpec::insertion(), "t.csv")
        .err()
        .expect("format error");

    assert!(matches!(err, ExportError::Format { .. }));
    assert!(!dir.path().join("out").join("t.csv").exists());
}

#[test]
fn field_selection_reaches_the_request() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);
    let api = FakeApi::new()
        .started("8", 2)
        .steps(&[Step::Ready])
        .payload(gzip("{}\n{}"));
    let pipeline = Pipeline::new(&cfg, api, RecordingSleeper::default());

    let params = ExportParams::for_model(&cfg, ExportModel::Vulnerability)
        .with_fields(vec!["id".into(), "cve_id".into()]);
    pipeline.fetch(&params, None).unwrap();

    let body = serde_json::to_value(&pipeline.api().requests.borrow()[0]).unwrap();
    assert_eq!(body["export_settings"]["fields"], serde_json::json!(["id", "cve_id"]));
    assert_eq!(body["export_settings"]["model"], "vulnerability");
    assert_eq!(body["status"], serde_json::json!(["open"]));
}
