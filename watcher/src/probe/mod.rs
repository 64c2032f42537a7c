//! Camera probe adapters.
//!
//! Every platform answers the same question, "is a camera in use right now?",
//! through the [`CameraProbe`] trait. The poll loop never branches on the OS.

use async_trait::async_trait;

use crate::error::ProbeError;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(windows)]
mod registry;

/// One successful probe result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub active: bool,
    /// Free-form tag naming what holds the camera (process or app), if known.
    pub source: Option<String>,
}

impl Reading {
    pub fn active(source: impl Into<String>) -> Self {
        Self {
            active: true,
            source: Some(source.into()),
        }
    }

    pub fn inactive() -> Self {
        Self {
            active: false,
            source: None,
        }
    }
}

/// Answers whether the camera is currently in use.
///
/// Implementations must not guess: when the state cannot be determined they
/// return a [`ProbeError`]. The caller bounds each call with a timeout.
#[async_trait]
pub trait CameraProbe: Send {
    async fn is_camera_active(&mut self) -> Result<Reading, ProbeError>;
}

#[async_trait]
impl<P: CameraProbe + ?Sized> CameraProbe for Box<P> {
    async fn is_camera_active(&mut self) -> Result<Reading, ProbeError> {
        (**self).is_camera_active().await
    }
}

/// Runs a synchronous OS query on the blocking pool.
///
/// Probe bodies that call into the OS never yield, so the loop's timeout could
/// not fire while they run. Awaiting the spawned task gives it a yield point.
/// A query that outlives the timeout keeps its blocking thread until it
/// returns; its result is dropped.
pub(crate) async fn run_blocking<F>(query: F) -> Result<Reading, ProbeError>
where
    F: FnOnce() -> Result<Reading, ProbeError> + Send + 'static,
{
    tokio::task::spawn_blocking(query)
        .await
        .map_err(|e| ProbeError::Os(format!("probe task failed: {e}")))?
}

/// Returns the probe for the host OS.
#[cfg(target_os = "linux")]
pub fn platform_probe() -> Result<Box<dyn CameraProbe>, ProbeError> {
    Ok(Box::new(linux::ProcFdProbe::new()?))
}

/// Returns the probe for the host OS.
#[cfg(target_os = "macos")]
pub fn platform_probe() -> Result<Box<dyn CameraProbe>, ProbeError> {
    Ok(Box::new(macos::HelperProcessProbe::new()))
}

/// Returns the probe for the host OS.
#[cfg(windows)]
pub fn platform_probe() -> Result<Box<dyn CameraProbe>, ProbeError> {
    Ok(Box::new(registry::ConsentStoreProbe::new()))
}

/// No camera detection exists for this OS.
#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
pub fn platform_probe() -> Result<Box<dyn CameraProbe>, ProbeError> {
    Err(ProbeError::Unsupported(std::env::consts::OS))
}
