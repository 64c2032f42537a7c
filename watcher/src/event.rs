use chrono::{DateTime, Utc};
use serde::Serialize;

/// Camera-in-use status observed at a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraState {
    Active,
    Inactive,
}

impl CameraState {
    pub fn from_active(active: bool) -> Self {
        if active {
            CameraState::Active
        } else {
            CameraState::Inactive
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CameraState::Active => "active",
            CameraState::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for CameraState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A time-bounded record of one camera state.
///
/// `start` is fixed when the event is opened; `end` moves forward on every tick
/// the state persists. `data` is captured at open time and never changes, so
/// every report of the same interval carries identical payload data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEvent {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub state: CameraState,
    pub data: Option<String>,
}

impl ActivityEvent {
    /// Opens a zero-length event at `at`.
    pub fn open(state: CameraState, at: DateTime<Utc>, data: Option<String>) -> Self {
        Self {
            start: at,
            end: at,
            state,
            data,
        }
    }

    /// Moves the end of the interval to `at`. Never moves it backwards.
    pub fn extend_to(&mut self, at: DateTime<Utc>) {
        if at > self.end {
            self.end = at;
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}
