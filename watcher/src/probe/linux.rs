/// Linux camera probe.
///
/// A camera counts as in use when any `/dev/video*` node is held open by some
/// process. Open handles are found by walking `/proc/<pid>/fd` and resolving
/// each descriptor symlink. Processes we are not allowed to inspect are
/// skipped, so without elevated privileges only the user's own processes are
/// seen.
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{CameraProbe, Reading};
use crate::error::ProbeError;

const PROC_ROOT: &str = "/proc";
const DEV_ROOT: &str = "/dev";
const VIDEO_NODE_PREFIX: &str = "video";

pub struct ProcFdProbe {
    proc_root: PathBuf,
    dev_root: PathBuf,
}

impl ProcFdProbe {
    /// Fails with [`ProbeError::Unsupported`] when procfs is not mounted.
    pub fn new() -> Result<Self, ProbeError> {
        Self::with_roots(PROC_ROOT, DEV_ROOT)
    }

    fn with_roots(
        proc_root: impl Into<PathBuf>,
        dev_root: impl Into<PathBuf>,
    ) -> Result<Self, ProbeError> {
        let proc_root = proc_root.into();
        if !proc_root.is_dir() {
            return Err(ProbeError::Unsupported("linux without procfs"));
        }
        Ok(Self {
            proc_root,
            dev_root: dev_root.into(),
        })
    }
}

#[async_trait]
impl CameraProbe for ProcFdProbe {
    async fn is_camera_active(&mut self) -> Result<Reading, ProbeError> {
        let proc_root = self.proc_root.clone();
        let dev_root = self.dev_root.clone();
        // Walking every fd of every process is blocking filesystem work.
        super::run_blocking(move || scan(&proc_root, &dev_root)).await
    }
}

fn scan(proc_root: &Path, dev_root: &Path) -> Result<Reading, ProbeError> {
    let nodes = video_nodes(dev_root)?;
    if nodes.is_empty() {
        return Ok(Reading::inactive());
    }

    for entry in std::fs::read_dir(proc_root)? {
        let Ok(entry) = entry else { continue };
        let Some(pid) = parse_pid(&entry.file_name().to_string_lossy()) else {
            continue;
        };
        let pid_dir = entry.path();
        if holds_any(&pid_dir.join("fd"), &nodes) {
            tracing::debug!(pid, "video device held open");
            return Ok(Reading::active(process_name(&pid_dir, pid)));
        }
    }

    Ok(Reading::inactive())
}

/// Lists `/dev/video*` nodes. A missing `/dev` means no cameras.
fn video_nodes(dev_root: &Path) -> Result<Vec<PathBuf>, ProbeError> {
    let entries = match std::fs::read_dir(dev_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(entries
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with(VIDEO_NODE_PREFIX))
        .map(|e| e.path())
        .collect())
}

/// Returns true if any descriptor under `fd_dir` points at one of `nodes`.
/// Unreadable fd directories (other users' processes, exited pids) count as no.
fn holds_any(fd_dir: &Path, nodes: &[PathBuf]) -> bool {
    let Ok(fds) = std::fs::read_dir(fd_dir) else {
        return false;
    };
    fds.filter_map(Result::ok)
        .filter_map(|fd| std::fs::read_link(fd.path()).ok())
        .any(|target| nodes.iter().any(|node| *node == target))
}

fn parse_pid(name: &str) -> Option<u32> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

fn process_name(pid_dir: &Path, pid: u32) -> String {
    std::fs::read_to_string(pid_dir.join("comm"))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("pid {pid}"))
}
