//! Best-effort run metrics.
//!
//! Producers push events into a bounded channel without blocking; a drain
//! task folds them into running totals and emits them as structured log
//! lines under the `metrics` target. A full channel drops the event rather
//! than stalling a run.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Channel slots before events start dropping.
const CHANNEL_CAPACITY: usize = 256;

/// Events recorded by the run pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// A report run finished (successfully or not).
    RunCompleted { ok: bool },
    /// Tool invocations issued during a run.
    ToolCalls { count: u32 },
    /// Token usage for a run.
    Tokens { input: u64, output: u64 },
    /// A schedule tick was skipped because the previous run was still active.
    ScheduleSkipped,
}

// ─── Sink ───────────────────────────────────────────────────────────────────

/// Cheap handle for recording metrics from anywhere in the pipeline.
#[derive(Clone)]
pub struct MetricsSink {
    tx: mpsc::Sender<Metric>,
}

impl MetricsSink {
    /// Build a sink plus the receiver its drain task should consume.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Metric>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Build a sink and spawn its drain task on the current runtime.
    pub fn spawn() -> Self {
        let (sink, rx) = Self::bounded(CHANNEL_CAPACITY);
        tokio::spawn(drain(rx));
        sink
    }

    /// Record an event without blocking. Dropped silently when the drain task
    /// is gone, at debug level when the channel is full.
    pub fn record(&self, metric: Metric) {
        match self.tx.try_send(metric) {
            Ok(()) => {}
            Err(TrySendError::Full(metric)) => {
                tracing::debug!(target: "metrics", ?metric, "channel full, event dropped");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

// ─── Drain ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Totals {
    runs: u64,
    failed_runs: u64,
    tool_calls: u64,
    input_tokens: u64,
    output_tokens: u64,
    skipped_ticks: u64,
}

impl Totals {
    fn apply(&mut self, metric: Metric) {
        match metric {
            Metric::RunCompleted { ok } => {
                self.runs += 1;
                if !ok {
                    self.failed_runs += 1;
                }
            }
            Metric::ToolCalls { count } => self.tool_calls += u64::from(count),
            Metric::Tokens { input, output } => {
                self.input_tokens += input;
                self.output_tokens += output;
            }
            Metric::ScheduleSkipped => self.skipped_ticks += 1,
        }
    }
}

async fn drain(mut rx: mpsc::Receiver<Metric>) {
    let mut totals = Totals::default();
    while let Some(metric) = rx.recv().await {
        totals.apply(metric);
        tracing::info!(
            target: "metrics",
            event = ?metric,
            runs = totals.runs,
            failed_runs = totals.failed_runs,
            tool_calls = totals.tool_calls,
            input_tokens = totals.input_tokens,
            output_tokens = totals.output_tokens,
            skipped_ticks = totals.skipped_ticks,
            "metric recorded"
        );
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_fold_events() {
        let mut totals = Totals::default();
        totals.apply(Metric::RunCompleted { ok: true });
        totals.apply(Metric::RunCompleted { ok: false });
        totals.apply(Metric::ToolCalls { count: 3 });
        totals.apply(Metric::ToolCalls { count: 2 });
        totals.apply(Metric::Tokens {
            input: 100,
            output: 40,
        });
        totals.apply(Metric::ScheduleSkipped);

        assert_eq!(totals.runs, 2);
        assert_eq!(totals.failed_runs, 1);
        assert_eq!(totals.tool_calls, 5);
        assert_eq!(totals.input_tokens, 100);
        assert_eq!(totals.output_tokens, 40);
        assert_eq!(totals.skipped_ticks, 1);
    }

    #[tokio::test]
    async fn test_full_channel_drops_without_blocking() {
        let (sink, mut rx) = MetricsSink::bounded(1);
        sink.record(Metric::ScheduleSkipped);
        sink.record(Metric::RunCompleted { ok: true });
        sink.record(Metric::RunCompleted { ok: false });

        assert_eq!(rx.recv().await, Some(Metric::ScheduleSkipped));
        assert!(rx.try_recv().is_err(), "overflow events were dropped");
    }

    #[tokio::test]
    async fn test_record_after_receiver_dropped_is_silent() {
        let (sink, rx) = MetricsSink::bounded(4);
        drop(rx);
        sink.record(Metric::ScheduleSkipped);
    }

    #[tokio::test]
    async fn test_drain_consumes_events() {
        let (sink, rx) = MetricsSink::bounded(8);
        let handle = tokio::spawn(drain(rx));
        sink.record(Metric::RunCompleted { ok: true });
        sink.record(Metric::Tokens {
            input: 10,
            output: 5,
        });
        drop(sink);
        handle.await.unwrap();
    }
}
