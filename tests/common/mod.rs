#![allow(dead_code)]

use export_harvest::{
    api::{ExportApi, ExportRequest, ExportStarted, ExportStatus},
    error::{ExportError, Result},
    job::JobId,
    util::Sleeper,
};
use flate2::{Compression, write::GzEncoder};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::{Cursor, Read, Write};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub enum Step {
    Pending,
    Ready,
    Fail(u16),
}

pub enum Download {
    Payload(Vec<u8>),
    Fail(u16),
}

/// Scripted stand-in for the export endpoints.
pub struct FakeApi {
    started: Option<ExportStarted>,
    steps: RefCell<VecDeque<Step>>,
    download: RefCell<Option<Download>>,
    pub requests: RefCell<Vec<ExportRequest>>,
    pub status_calls: Cell<u32>,
    pub download_calls: Cell<u32>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            started: None,
            steps: RefCell::new(VecDeque::new()),
            download: RefCell::new(None),
            requests: RefCell::new(Vec::new()),
            status_calls: Cell::new(0),
            download_calls: Cell::new(0),
        }
    }

    pub fn started(mut self, search_id: &str, record_count: u64) -> Self {
        self.started = Some(ExportStarted {
            search_id: JobId::new(search_id),
            record_count,
        });
        self
    }

    /// Status replies in order; once exhausted every check is Pending.
    pub fn steps(self, steps: &[Step]) -> Self {
        self.steps.borrow_mut().extend(steps.iter().copied());
        self
    }

    pub fn payload(self, bytes: Vec<u8>) -> Self {
        *self.download.borrow_mut() = Some(Download::Payload(bytes));
        self
    }

    pub fn download_fails(self, status: u16) -> Self {
        *self.download.borrow_mut() = Some(Download::Fail(status));
        self
    }

    pub fn total_calls(&self) -> usize {
        self.requests.borrow().len()
            + self.status_calls.get() as usize
            + self.download_calls.get() as usize
    }
}

pub fn remote(status: u16) -> ExportError {
    ExportError::Remote {
        context: "fake",
        status,
        url: "fake://data_exports".into(),
        body: String::new(),
    }
}

impl ExportApi for FakeApi {
    fn request_export(&self, req: &ExportRequest) -> Result<ExportStarted> {
        self.requests.borrow_mut().push(req.clone());
        self.started.clone().ok_or_else(|| remote(422))
    }

    fn export_status(&self, _job_id: &JobId) -> Result<ExportStatus> {
        self.status_calls.set(self.status_calls.get() + 1);
        match self.steps.borrow_mut().pop_front().unwrap_or(Step::Pending) {
            Step::Pending => Ok(ExportStatus::Pending),
            Step::Ready => Ok(ExportStatus::Ready),
            Step::Fail(status) => Err(remote(status)),
        }
    }

    fn download_export(&self, _job_id: &JobId) -> Result<Box<dyn Read>> {
        self.download_calls.set(self.download_calls.get() + 1);
        match self.download.borrow_mut().take() {
            Some(Download::Payload(bytes)) => Ok(Box::new(Cursor::new(bytes))),
            Some(Download::Fail(status)) => Err(remote(status)),
            None => Err(remote(404)),
        }
    }
}

/// Records requested sleeps instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    pub sleeps: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn total(&self) -> Duration {
        self.sleeps.borrow().iter().sum()
    }

    pub fn count(&self) -> usize {
        self.sleeps.borrow().len()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, d: Duration) {
        self.sleeps.borrow_mut().push(d);
    }
}

pub fn gzip(text: &str) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(text.as_bytes()).unwrap();
    enc.finish().unwrap()
}
