/// The poll-and-report loop.
///
/// A `Watcher` owns the probe, the sink and the [`Tracker`] for the whole
/// process lifetime. Each tick it probes the camera once, feeds the result to
/// the tracker and reports at most one event. Probe and report calls are both
/// bounded by timeouts so a stuck call only costs one tick.
use chrono::{DateTime, Utc};
use std::future::Future;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::config::PollConfig;
use crate::error::{ProbeError, SinkError};
use crate::event::ActivityEvent;
use crate::probe::CameraProbe;
use crate::sink::EventSink;
use crate::tracker::Tracker;

/// Counters returned when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub events_opened: u64,
    pub reports_sent: u64,
    pub reports_failed: u64,
}

/// Source of event timestamps.
pub type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct Watcher<P, S> {
    config: PollConfig,
    probe: P,
    sink: S,
    tracker: Tracker,
    clock: Clock,
    summary: RunSummary,
}

impl<P: CameraProbe, S: EventSink> Watcher<P, S> {
    pub fn new(config: PollConfig, probe: P, sink: S) -> Self {
        let tracker = Tracker::new(config.max_consecutive_errors);
        Self {
            config,
            probe,
            sink,
            tracker,
            clock: Box::new(Utc::now),
            summary: RunSummary::default(),
        }
    }

    /// Replaces the wall clock used to timestamp events.
    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Runs ticks every `poll_interval` until `shutdown` resolves, then
    /// reports the open event one last time.
    ///
    /// A tick in progress when `shutdown` resolves is abandoned; no new tick
    /// starts after it.
    pub async fn run<F>(mut self, shutdown: F) -> RunSummary
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.config.poll_interval);
        // Fixed-delay cadence: a slow tick pushes the next one back instead of
        // firing a burst of catch-up ticks.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = async {
                    ticker.tick().await;
                    self.tick().await;
                } => {}
            }
        }

        self.finish().await;
        self.summary
    }

    /// Probes once and reports the resulting event, if any.
    pub async fn tick(&mut self) {
        self.summary.ticks += 1;

        let probe_timeout = self.config.probe_timeout;
        let reading = match timeout(probe_timeout, self.probe.is_camera_active()).await {
            Ok(reading) => reading,
            Err(_) => Err(ProbeError::Timeout(probe_timeout)),
        };

        let now = (self.clock)();
        let opened_before = self.tracker.opened();
        let Some(event) = self.tracker.observe(reading, now).cloned() else {
            return;
        };
        // Counted before the report so a tick cancelled mid-report still counts.
        self.summary.events_opened += self.tracker.opened() - opened_before;
        let result = report(&mut self.sink, &event, &self.config).await;
        self.record(result);
    }

    /// Best-effort final report of the open event. Its end stays at the last
    /// tick; shutdown time is not counted as observed.
    async fn finish(&mut self) {
        let Some(event) = self.tracker.finish() else {
            tracing::info!("no open event at shutdown");
            return;
        };
        tracing::info!(
            state = %event.state,
            start = %event.start,
            end = %event.end,
            "finalizing open event"
        );
        let result = report(&mut self.sink, &event, &self.config).await;
        self.record(result);
    }

    fn record(&mut self, result: Result<(), SinkError>) {
        match result {
            Ok(()) => self.summary.reports_sent += 1,
            Err(e) => {
                self.summary.reports_failed += 1;
                tracing::warn!(
                    bucket = %self.config.bucket_id,
                    error = %e,
                    "failed to report camera event"
                );
            }
        }
    }
}

async fn report<S: EventSink>(
    sink: &mut S,
    event: &ActivityEvent,
    config: &PollConfig,
) -> Result<(), SinkError> {
    tracing::debug!(
        state = %event.state,
        start = %event.start,
        duration_secs = event.duration().num_seconds(),
        "reporting camera event"
    );
    match timeout(config.report_timeout, sink.report(event, &config.bucket_id)).await {
        Ok(result) => result,
        Err(_) => Err(SinkError::Timeout(config.report_timeout)),
    }
}
