use crate::{
    api::{ExportApi, ExportStatus},
    config::Export,
    error::{ExportError, Result},
    job::{ExportJob, JobStatus},
    util::Sleeper,
};
use std::time::Duration;
use tracing::{debug, info};

/// How often and for how long to poll one export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub interval: Duration,
    pub budget: Duration,
}

impl PollSchedule {
    pub fn for_records(cfg: &Export, estimated_record_count: u64) -> Self {
        let interval_secs = if estimated_record_count < cfg.small_export_threshold {
            cfg.small_poll_interval_seconds
        } else {
            cfg.large_poll_interval_seconds
        };
        let budget_secs = time_budget_secs(
            estimated_record_count,
            cfg.throughput_records_per_second,
            cfg.min_time_budget_seconds,
        );
        Self {
            interval: Duration::from_secs(interval_secs.max(1)),
            budget: Duration::from_secs(budget_secs),
        }
    }
}

/// `ceil(records / throughput)`, floored at `min_secs`.
/// Non-decreasing in `records` for any fixed throughput and floor.
pub fn time_budget_secs(records: u64, throughput_per_sec: u64, min_secs: u64) -> u64 {
    records.div_ceil(throughput_per_sec.max(1)).max(min_secs)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    pub sleeps: u32,
    pub waited: Duration,
}

/// Blocks until `job` is ready or the schedule's budget is used up.
///
/// The status is checked once before any sleep, so an export that is already
/// ready costs a single call. Waited time is the sum of the sleeps.
pub fn wait_until_ready<A, S>(
    api: &A,
    sleeper: &S,
    schedule: PollSchedule,
    job: &mut ExportJob,
) -> Result<PollOutcome>
where
    A: ExportApi + ?Sized,
    S: Sleeper + ?Sized,
{
    log_estimate(schedule.budget);

    let mut outcome = PollOutcome {
        sleeps: 0,
        waited: Duration::ZERO,
    };

    let mut status = api.export_status(&job.job_id)?;
    while status != ExportStatus::Ready {
        if outcome.waited >= schedule.budget {
            job.transition(JobStatus::TimedOut);
            return Err(ExportError::Timeout {
                job_id: job.job_id.clone(),
                waited_secs: outcome.waited.as_secs(),
                budget_secs: schedule.budget.as_secs(),
            });
        }
        debug!(
            "export {} not ready; sleeping {}s ({}s waited)",
            job.job_id,
            schedule.interval.as_secs(),
            outcome.waited.as_secs()
        );
        sleeper.sleep(schedule.interval);
        outcome.sleeps += 1;
        outcome.waited += schedule.interval;
        status = api.export_status(&job.job_id)?;
    }

    job.transition(JobStatus::Ready);
    info!(
        "export {} ready after {}s ({} polls)",
        job.job_id,
        outcome.waited.as_secs(),
        outcome.sleeps + 1
    );
    Ok(outcome)
}

fn log_estimate(budget: Duration) {
    let secs = budget.as_secs();
    let minutes = secs.div_ceil(60);
    if minutes > 2 {
        info!("the export will take up to approximately {minutes} minutes");
    } else {
        info!("the export will take up to approximately {secs} seconds");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_switches_at_threshold() {
        let cfg = Export::default();
        assert_eq!(
            PollSchedule::for_records(&cfg, 999).interval,
            Duration::from_secs(5)
        );
        assert_eq!(
            PollSchedule::for_records(&cfg, 1000).interval,
            Duration::from_secs(10)
        );
    }

    #[test]
    fn budget_rounds_up() {
        assert_eq!(time_budget_secs(17, 16, 0), 2);
        assert_eq!(time_budget_secs(0, 16, 0), 0);
        assert_eq!(time_budget_secs(0, 16, 60), 60);
        assert_eq!(time_budget_secs(5, 0, 0), 5);
    }
}
