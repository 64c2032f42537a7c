use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5600;
/// Port used by an ActivityWatch server started in testing mode.
pub const TESTING_PORT: u16 = 5666;
pub const BUCKET_PREFIX: &str = "aw-watcher-camera";
/// Upper bound for the interval and both timeouts: one day.
pub const MAX_SECS: u64 = 86_400;

/// Written on first run so the user has something to review before the real run.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# aw-watcher-camera configuration

[watcher]
# Seconds between camera checks. Between 1 and 86400.
poll_interval_secs = 10

# Bucket that receives camera events. Defaults to "aw-watcher-camera_<hostname>".
# bucket_id = "aw-watcher-camera_my-laptop"

# Seconds a single camera check may take before the tick counts as failed.
probe_timeout_secs = 5

# Close the open event after this many failed checks in a row.
# Leave unset to keep extending the current state for as long as checks fail.
# max_consecutive_errors = 30

[server]
host = "127.0.0.1"
port = 5600

# Seconds a single request to the ActivityWatch server may take.
request_timeout_secs = 5
"#;

/// Root configuration structure. Deserialized from `config.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Polling behaviour of the watcher.
#[derive(Debug, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Target bucket. `None` means `aw-watcher-camera_<hostname>`.
    #[serde(default)]
    pub bucket_id: Option<String>,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Consecutive probe failures after which the open event is closed.
    #[serde(default)]
    pub max_consecutive_errors: Option<u32>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            bucket_id: None,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            max_consecutive_errors: None,
        }
    }
}

/// Location of the ActivityWatch server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ServerConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Immutable settings handed to the poll loop for the process lifetime.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub poll_interval: Duration,
    pub bucket_id: String,
    pub probe_timeout: Duration,
    pub report_timeout: Duration,
    pub max_consecutive_errors: Option<u32>,
}

impl Config {
    /// Checks the values serde cannot reject on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_secs("watcher.poll_interval_secs", self.watcher.poll_interval_secs)?;
        check_secs("watcher.probe_timeout_secs", self.watcher.probe_timeout_secs)?;
        check_secs("server.request_timeout_secs", self.server.request_timeout_secs)?;
        if let Some(bucket) = &self.watcher.bucket_id {
            if bucket.trim().is_empty() {
                return Err(invalid("watcher.bucket_id", "must not be empty"));
            }
        }
        if self.watcher.max_consecutive_errors == Some(0) {
            return Err(invalid("watcher.max_consecutive_errors", "must be at least 1 when set"));
        }
        if self.server.host.trim().is_empty() {
            return Err(invalid("server.host", "must not be empty"));
        }
        Ok(())
    }

    /// Returns the configured bucket, or the per-host default.
    pub fn effective_bucket_id(&self, hostname: &str) -> String {
        self.watcher
            .bucket_id
            .clone()
            .unwrap_or_else(|| format!("{BUCKET_PREFIX}_{hostname}"))
    }

    pub fn poll_config(&self, hostname: &str) -> PollConfig {
        PollConfig {
            poll_interval: Duration::from_secs(self.watcher.poll_interval_secs),
            bucket_id: self.effective_bucket_id(hostname),
            probe_timeout: Duration::from_secs(self.watcher.probe_timeout_secs),
            report_timeout: self.server.request_timeout(),
            max_consecutive_errors: self.watcher.max_consecutive_errors,
        }
    }
}

/// Outcome of [`load_or_create`].
#[derive(Debug)]
pub enum ConfigLoad {
    /// An existing file was read and validated.
    Loaded(Config),
    /// No file existed; a default one was written at this path.
    Created(PathBuf),
}

/// Loads and validates the config at `path`.
///
/// A missing file is not an error: the default template is written there and
/// [`ConfigLoad::Created`] is returned so the caller can exit early.
pub fn load_or_create(path: &Path) -> Result<ConfigLoad, ConfigError> {
    if !path.exists() {
        write_default(path)?;
        return Ok(ConfigLoad::Created(path.to_path_buf()));
    }
    load(path).map(ConfigLoad::Loaded)
}

/// Reads, parses and validates the config file at `path`.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

fn write_default(path: &Path) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE).map_err(write_err)
}

fn check_secs(field: &'static str, secs: u64) -> Result<(), ConfigError> {
    if secs == 0 {
        return Err(invalid(field, "must be greater than zero"));
    }
    if secs > MAX_SECS {
        return Err(invalid(field, &format!("must be at most {MAX_SECS}")));
    }
    Ok(())
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_probe_timeout() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn config_default_values() {
        let c = Config::default();
        assert_eq!(c.watcher.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
        assert_eq!(c.watcher.probe_timeout_secs, DEFAULT_PROBE_TIMEOUT_SECS);
        assert!(c.watcher.bucket_id.is_none());
        assert!(c.watcher.max_consecutive_errors.is_none());
        assert_eq!(c.server.host, DEFAULT_HOST);
        assert_eq!(c.server.port, DEFAULT_PORT);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn template_parses_to_defaults() {
        let c: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert_eq!(c.watcher.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
        assert_eq!(c.watcher.probe_timeout_secs, DEFAULT_PROBE_TIMEOUT_SECS);
        assert!(c.watcher.bucket_id.is_none());
        assert_eq!(c.server.port, DEFAULT_PORT);
        assert_eq!(c.server.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert!(c.validate().is_ok());
    }

    // ── bucket / poll config ──────────────────────────────────────────────────

    #[test]
    fn bucket_defaults_to_hostname() {
        let c = Config::default();
        assert_eq!(c.effective_bucket_id("laptop"), "aw-watcher-camera_laptop");
    }

    #[test]
    fn bucket_override_wins() {
        let mut c = Config::default();
        c.watcher.bucket_id = Some("my-cam".to_string());
        assert_eq!(c.effective_bucket_id("laptop"), "my-cam");
    }

    #[test]
    fn poll_config_converts_seconds() {
        let mut c = Config::default();
        c.watcher.poll_interval_secs = 3;
        c.server.request_timeout_secs = 7;
        let p = c.poll_config("host");
        assert_eq!(p.poll_interval, Duration::from_secs(3));
        assert_eq!(p.report_timeout, Duration::from_secs(7));
        assert_eq!(p.bucket_id, "aw-watcher-camera_host");
    }

    #[test]
    fn base_url_uses_host_and_port() {
        let s = ServerConfig {
            host: "localhost".to_string(),
            port: TESTING_PORT,
            request_timeout_secs: 1,
        };
        assert_eq!(s.base_url(), "http://localhost:5666");
    }

    // ── validate ──────────────────────────────────────────────────────────────

    #[test]
    fn zero_poll_interval_is_invalid() {
        let mut c = Config::default();
        c.watcher.poll_interval_secs = 0;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::Invalid { field: "watcher.poll_interval_secs", .. })
        ));
    }

    #[test]
    fn huge_poll_interval_is_invalid() {
        let mut c = Config::default();
        c.watcher.poll_interval_secs = u64::MAX;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::Invalid { field: "watcher.poll_interval_secs", .. })
        ));

        c.watcher.poll_interval_secs = MAX_SECS;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn huge_timeouts_are_invalid() {
        let mut c = Config::default();
        c.watcher.probe_timeout_secs = MAX_SECS + 1;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::Invalid { field: "watcher.probe_timeout_secs", .. })
        ));

        let mut c = Config::default();
        c.server.request_timeout_secs = u64::MAX;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::Invalid { field: "server.request_timeout_secs", .. })
        ));
    }

    #[test]
    fn blank_bucket_is_invalid() {
        let mut c = Config::default();
        c.watcher.bucket_id = Some("  ".to_string());
        assert!(c.validate().is_err());
    }

    #[test]
    fn zero_error_threshold_is_invalid() {
        let mut c = Config::default();
        c.watcher.max_consecutive_errors = Some(0);
        assert!(c.validate().is_err());
    }

    // ── load_or_create ────────────────────────────────────────────────────────

    #[test]
    fn missing_file_is_created_with_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        match load_or_create(&path).unwrap() {
            ConfigLoad::Created(p) => assert_eq!(p, path),
            ConfigLoad::Loaded(_) => panic!("expected first-run creation"),
        }
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, DEFAULT_CONFIG_TEMPLATE);

        // Second run loads what the first one wrote.
        assert!(matches!(load_or_create(&path).unwrap(), ConfigLoad::Loaded(_)));
    }

    #[test]
    fn parses_valid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[watcher]
poll_interval_secs = 2
bucket_id = "cam-test"
max_consecutive_errors = 4

[server]
host = "10.0.0.2"
port = 5666
"#,
        )
        .unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.watcher.poll_interval_secs, 2);
        assert_eq!(config.watcher.bucket_id.as_deref(), Some("cam-test"));
        assert_eq!(config.watcher.max_consecutive_errors, Some(4));
        assert_eq!(config.watcher.probe_timeout_secs, DEFAULT_PROBE_TIMEOUT_SECS);
        assert_eq!(config.server.host, "10.0.0.2");
        assert_eq!(config.server.port, 5666);
    }

    #[test]
    fn partial_toml_uses_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[watcher]\npoll_interval_secs = 30\n").unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.watcher.poll_interval_secs, 30);
        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.server.port, DEFAULT_PORT);
    }

    #[test]
    fn invalid_toml_returns_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is not valid toml ][[[").unwrap();
        assert!(matches!(load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn zero_interval_in_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[watcher]\npoll_interval_secs = 0\n").unwrap();
        assert!(matches!(load_or_create(&path), Err(ConfigError::Invalid { .. })));
    }
}
