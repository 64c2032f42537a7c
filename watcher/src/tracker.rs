/// Change detection for the poll loop.
///
/// Turns one probe result per tick into the single event that should be
/// reported for that tick:
///   - the first successful reading opens an event,
///   - an unchanged reading extends the open event,
///   - a changed reading closes the open event and opens a new one,
///   - a failed reading extends the open event (or does nothing before the
///     first successful reading).
///
/// A closed event needs no extra report: it was already reported with its
/// final end on the previous tick.
use chrono::{DateTime, Utc};

use crate::error::ProbeError;
use crate::event::{ActivityEvent, CameraState};
use crate::probe::Reading;

#[derive(Debug, Default)]
pub struct Tracker {
    open: Option<ActivityEvent>,
    consecutive_errors: u32,
    /// Close the open event after this many failed readings in a row.
    max_consecutive_errors: Option<u32>,
    opened: u64,
}

impl Tracker {
    pub fn new(max_consecutive_errors: Option<u32>) -> Self {
        Self {
            max_consecutive_errors,
            ..Self::default()
        }
    }

    /// Applies one tick's probe result at `now` and returns the event to
    /// report, if any.
    pub fn observe(
        &mut self,
        reading: Result<Reading, ProbeError>,
        now: DateTime<Utc>,
    ) -> Option<&ActivityEvent> {
        match reading {
            Ok(reading) => self.observe_reading(reading, now),
            Err(err) => self.observe_error(&err, now),
        }
    }

    fn observe_reading(&mut self, reading: Reading, now: DateTime<Utc>) -> Option<&ActivityEvent> {
        self.consecutive_errors = 0;
        let state = CameraState::from_active(reading.active);

        match self.current_state() {
            Some(current) if current == state => {
                if let Some(event) = self.open.as_mut() {
                    event.extend_to(now);
                }
            }
            previous => {
                match previous {
                    Some(from) => {
                        tracing::info!(%from, to = %state, source = ?reading.source, "camera state changed")
                    }
                    None => tracing::info!(%state, source = ?reading.source, "initial camera state"),
                }
                self.open = Some(ActivityEvent::open(state, now, reading.source));
                self.opened += 1;
            }
        }
        self.open.as_ref()
    }

    fn observe_error(&mut self, err: &ProbeError, now: DateTime<Utc>) -> Option<&ActivityEvent> {
        if self.open.is_none() {
            tracing::warn!(error = %err, "camera probe failed; no state yet");
            return None;
        }

        self.consecutive_errors += 1;
        tracing::warn!(
            error = %err,
            consecutive = self.consecutive_errors,
            "camera probe failed; keeping current state"
        );

        if let Some(max) = self.max_consecutive_errors {
            if self.consecutive_errors >= max {
                tracing::warn!(max, "too many failed probes; closing open event");
                self.open = None;
                self.consecutive_errors = 0;
                return None;
            }
        }

        let event = self.open.as_mut()?;
        event.extend_to(now);
        Some(&*event)
    }

    /// Takes the open event for a final report on shutdown.
    pub fn finish(&mut self) -> Option<ActivityEvent> {
        self.consecutive_errors = 0;
        self.open.take()
    }

    pub fn current_state(&self) -> Option<CameraState> {
        self.open.as_ref().map(|e| e.state)
    }

    /// Number of events opened since start.
    pub fn opened(&self) -> u64 {
        self.opened
    }
}
