/// Event sink: where finished and in-progress camera events are reported.
///
/// The production sink is the local ActivityWatch server. Each report is sent
/// as a heartbeat; the server merges a heartbeat into the previous event when
/// their data match and they lie within `pulsetime` of each other, so the same
/// open interval can be reported any number of times as its end moves forward.
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::ServerConfig;
use crate::error::SinkError;
use crate::event::{ActivityEvent, CameraState};

pub const CLIENT_NAME: &str = "aw-watcher-camera";
pub const BUCKET_TYPE: &str = "camera.status";

/// Accepts events for a bucket. Reporting the same interval again with a later
/// end must extend it, not duplicate it.
#[async_trait]
pub trait EventSink: Send {
    async fn report(&mut self, event: &ActivityEvent, bucket_id: &str) -> Result<(), SinkError>;
}

/// Body of `POST /api/0/buckets/{id}`.
#[derive(Debug, Serialize)]
struct BucketRequest<'a> {
    client: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    hostname: &'a str,
}

/// Body of `POST /api/0/buckets/{id}/heartbeat`.
#[derive(Debug, Serialize)]
pub struct Heartbeat {
    pub timestamp: DateTime<Utc>,
    /// Seconds.
    pub duration: f64,
    pub data: HeartbeatData,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct HeartbeatData {
    pub status: CameraState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl From<&ActivityEvent> for Heartbeat {
    fn from(event: &ActivityEvent) -> Self {
        Self {
            timestamp: event.start,
            duration: event.duration().num_milliseconds() as f64 / 1000.0,
            data: HeartbeatData {
                status: event.state,
                source: event.data.clone(),
            },
        }
    }
}

/// HTTP client for the ActivityWatch REST API.
pub struct AwClient {
    client: reqwest::Client,
    base_url: String,
    hostname: String,
    pulsetime: f64,
    /// Buckets known to exist on the server.
    ready: HashSet<String>,
}

impl AwClient {
    /// `pulsetime` should be a little longer than the poll interval so that
    /// consecutive heartbeats of one interval always merge.
    pub fn new(
        server: &ServerConfig,
        hostname: &str,
        pulsetime: Duration,
    ) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(server.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: server.base_url(),
            hostname: hostname.to_string(),
            pulsetime: pulsetime.as_secs_f64(),
            ready: HashSet::new(),
        })
    }

    /// Creates `bucket_id` on the server. An existing bucket counts as success.
    pub async fn ensure_bucket(&mut self, bucket_id: &str) -> Result<(), SinkError> {
        if self.ready.contains(bucket_id) {
            return Ok(());
        }
        let body = BucketRequest {
            client: CLIENT_NAME,
            kind: BUCKET_TYPE,
            hostname: &self.hostname,
        };
        let response = self
            .client
            .post(bucket_url(&self.base_url, bucket_id))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        // 304 Not Modified: the bucket already exists.
        if !(status.is_success() || status == reqwest::StatusCode::NOT_MODIFIED) {
            return Err(status_error(response).await);
        }
        tracing::info!(bucket = bucket_id, "bucket ready");
        self.ready.insert(bucket_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl EventSink for AwClient {
    async fn report(&mut self, event: &ActivityEvent, bucket_id: &str) -> Result<(), SinkError> {
        // Bucket creation failed at startup if the server was down; retry lazily.
        self.ensure_bucket(bucket_id).await?;

        let response = self
            .client
            .post(heartbeat_url(&self.base_url, bucket_id, self.pulsetime))
            .json(&Heartbeat::from(event))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(())
    }
}

async fn status_error(response: reqwest::Response) -> SinkError {
    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    SinkError::Status { status, message }
}

fn bucket_url(base_url: &str, bucket_id: &str) -> String {
    format!("{base_url}/api/0/buckets/{bucket_id}")
}

fn heartbeat_url(base_url: &str, bucket_id: &str, pulsetime: f64) -> String {
    format!("{}/heartbeat?pulsetime={pulsetime}", bucket_url(base_url, bucket_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(state: CameraState, secs: i64, data: Option<&str>) -> ActivityEvent {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut e = ActivityEvent::open(state, start, data.map(str::to_string));
        e.extend_to(start + chrono::Duration::milliseconds(secs * 1000 + 500));
        e
    }

    #[test]
    fn heartbeat_json_shape() {
        let hb = Heartbeat::from(&event(CameraState::Active, 20, Some("zoom")));
        let json = serde_json::to_value(&hb).unwrap();
        assert_eq!(json["timestamp"], "2024-03-01T09:00:00Z");
        assert_eq!(json["duration"], 20.5);
        assert_eq!(json["data"]["status"], "active");
        assert_eq!(json["data"]["source"], "zoom");
    }

    #[test]
    fn heartbeat_omits_missing_source() {
        let hb = Heartbeat::from(&event(CameraState::Inactive, 0, None));
        let json = serde_json::to_value(&hb).unwrap();
        assert_eq!(json["data"]["status"], "inactive");
        assert!(json["data"].get("source").is_none());
    }

    #[test]
    fn heartbeat_data_is_stable_while_extending() {
        // The server only merges heartbeats with equal data.
        let mut e = event(CameraState::Active, 0, Some("zoom"));
        let first = Heartbeat::from(&e).data;
        e.extend_to(e.end + chrono::Duration::seconds(10));
        assert_eq!(Heartbeat::from(&e).data, first);
    }

    #[test]
    fn urls() {
        let base = "http://127.0.0.1:5600";
        assert_eq!(
            bucket_url(base, "aw-watcher-camera_host"),
            "http://127.0.0.1:5600/api/0/buckets/aw-watcher-camera_host"
        );
        assert_eq!(
            heartbeat_url(base, "b", 11.0),
            "http://127.0.0.1:5600/api/0/buckets/b/heartbeat?pulsetime=11"
        );
    }

    #[test]
    fn bucket_request_uses_type_key() {
        let body = BucketRequest {
            client: CLIENT_NAME,
            kind: BUCKET_TYPE,
            hostname: "host",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["type"], BUCKET_TYPE);
        assert_eq!(json["client"], CLIENT_NAME);
    }

    #[tokio::test]
    async fn unreachable_server_is_a_sink_error() {
        let server = ServerConfig {
            host: "127.0.0.1".to_string(),
            // Nothing listens on port 1.
            port: 1,
            request_timeout_secs: 2,
        };
        let mut client = AwClient::new(&server, "host", Duration::from_secs(11)).unwrap();
        let result = client.report(&event(CameraState::Active, 1, None), "bucket").await;
        assert!(matches!(result, Err(SinkError::Http(_))));
        assert!(client.ready.is_empty());
    }
}
