//! Daily report scheduling.
//!
//! Computes the next local occurrence of the configured wall-clock time,
//! sleeps until it, and dispatches the report job through a single-flight
//! guard so a slow run is skipped rather than doubled. The loop never exits
//! on job failure; outcome handling lives inside the job itself.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime};

use crate::metrics::{Metric, MetricsSink};

// ─── Job Kinds ──────────────────────────────────────────────────────────────

/// The kinds of background jobs the daemon can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// The scheduled fleet report.
    Report,
}

// ─── Single Flight ──────────────────────────────────────────────────────────

/// Tracks in-flight jobs so a schedule tick never doubles up on a kind.
#[derive(Clone, Default)]
pub struct SingleFlight {
    active: Arc<Mutex<HashSet<JobKind>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `kind`. Returns `None` while a prior claim is live;
    /// the returned guard releases the slot on drop.
    pub fn begin(&self, kind: JobKind) -> Option<FlightGuard> {
        if !lock_active(&self.active).insert(kind) {
            return None;
        }
        Some(FlightGuard {
            active: Arc::clone(&self.active),
            kind,
        })
    }
}

/// Releases its job slot when dropped.
pub struct FlightGuard {
    active: Arc<Mutex<HashSet<JobKind>>>,
    kind: JobKind,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        lock_active(&self.active).remove(&self.kind);
    }
}

/// The membership set has no partial states, so a lock poisoned by a
/// panicking job task is still safe to use.
fn lock_active(active: &Mutex<HashSet<JobKind>>) -> MutexGuard<'_, HashSet<JobKind>> {
    match active.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ─── Schedule Computation ───────────────────────────────────────────────────

/// The next local occurrence of `at` strictly after `after`.
///
/// Skips forward across days where the wall-clock time does not exist (DST
/// spring-forward).
pub fn next_occurrence(after: DateTime<Local>, at: NaiveTime) -> DateTime<Local> {
    let mut date = after.date_naive();
    for _ in 0..4 {
        if let Some(candidate) = date.and_time(at).and_local_timezone(Local).earliest() {
            if candidate > after {
                return candidate;
            }
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }
    // Every zone has a representable time within a few days.
    after + chrono::Duration::days(1)
}

// ─── Scheduler ──────────────────────────────────────────────────────────────

/// Fires the report job once per day at a fixed local time.
pub struct Scheduler {
    time: NaiveTime,
    flights: SingleFlight,
    metrics: Option<MetricsSink>,
}

impl Scheduler {
    pub fn new(time: NaiveTime) -> Self {
        Self {
            time,
            flights: SingleFlight::new(),
            metrics: None,
        }
    }

    /// Record skipped ticks to a metrics sink.
    pub fn with_metrics(mut self, sink: MetricsSink) -> Self {
        self.metrics = Some(sink);
        self
    }

    /// Run `job` at the configured time every day. A tick that arrives while
    /// the previous run is still active logs a skip instead of starting a
    /// second run. Never returns.
    pub async fn run_daily<F, Fut>(&self, mut job: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        loop {
            let now = Local::now();
            let target = next_occurrence(now, self.time);
            let wait = (target - now).to_std().unwrap_or(Duration::ZERO);
            tracing::info!(
                target_time = %target.format("%Y-%m-%d %H:%M:%S %Z"),
                wait_secs = wait.as_secs(),
                "scheduler: next report run"
            );
            tokio::time::sleep(wait).await;

            match self.flights.begin(JobKind::Report) {
                Some(guard) => {
                    let fut = job();
                    tokio::spawn(async move {
                        fut.await;
                        drop(guard);
                    });
                }
                None => {
                    tracing::warn!(job = ?JobKind::Report, "scheduler: previous run still active, skipping");
                    if let Some(sink) = &self.metrics {
                        sink.record(Metric::ScheduleSkipped);
                    }
                }
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn at(h: u32, mi: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, mi, 0).unwrap()
    }

    #[test]
    fn test_next_occurrence_later_today() {
        let next = next_occurrence(local(2026, 2, 11, 5, 0), at(6, 0));
        assert_eq!(next, local(2026, 2, 11, 6, 0));
    }

    #[test]
    fn test_next_occurrence_rolls_to_tomorrow() {
        let next = next_occurrence(local(2026, 2, 11, 7, 30), at(6, 0));
        assert_eq!(next, local(2026, 2, 12, 6, 0));
    }

    #[test]
    fn test_next_occurrence_exact_time_rolls_over() {
        let next = next_occurrence(local(2026, 2, 11, 6, 0), at(6, 0));
        assert_eq!(next, local(2026, 2, 12, 6, 0));
    }

    #[test]
    fn test_single_flight_blocks_second_claim() {
        let flights = SingleFlight::new();
        let guard = flights.begin(JobKind::Report);
        assert!(guard.is_some());
        assert!(flights.begin(JobKind::Report).is_none());

        drop(guard);
        assert!(flights.begin(JobKind::Report).is_some());
    }

    #[test]
    fn test_single_flight_clones_share_state() {
        let flights = SingleFlight::new();
        let clone = flights.clone();
        let _guard = flights.begin(JobKind::Report).unwrap();
        assert!(clone.begin(JobKind::Report).is_none());
    }
}
