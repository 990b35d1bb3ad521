//! Ambient IoT data-channel client ([`TelemetrySink`]).
//!
//! `POST {base}/api/v2/channels/{id}/dataarray` with
//! `{"writeKey": .., "data": [{"created": <UTC ISO-8601>, "d1": .., ...}]}`.
//! The service drops writes closer than 6 s apart on one channel, so sends
//! are spaced per channel, sleeping out any shortfall.

use std::collections::HashMap;
use std::time::Duration;

use log::{debug, trace};
use reqwest::StatusCode;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::app::ports::{BoxFuture, TelemetryRecord, TelemetrySink};
use crate::config::AmbientConfig;
use crate::error::{ApiError, Result};

/// Minimum spacing between writes to one channel.
pub const MIN_SEND_INTERVAL: Duration = Duration::from_secs(6);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ── Throttle ──────────────────────────────────────────────────

/// Last-send bookkeeping keyed by channel id.
#[derive(Debug)]
pub struct ChannelThrottle {
    min_gap: Duration,
    last: Mutex<HashMap<u32, Instant>>,
}

impl ChannelThrottle {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until `channel` may be written again and claim the slot.
    /// Returns how long the caller was held back.
    pub async fn wait_turn(&self, channel: u32) -> Duration {
        let mut last = self.last.lock().await;
        let now = Instant::now();
        let ready = last.get(&channel).map_or(now, |prev| *prev + self.min_gap);
        let waited = ready.saturating_duration_since(now);
        if !waited.is_zero() {
            debug!("ambient: channel {} throttled for {:?}", channel, waited);
            tokio::time::sleep_until(ready).await;
        }
        last.insert(channel, Instant::now());
        waited
    }
}

// ── Payload ───────────────────────────────────────────────────

pub fn build_payload(write_key: &str, record: &TelemetryRecord) -> Value {
    let mut data = Map::new();
    data.insert(
        "created".into(),
        Value::String(record.created.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()),
    );
    for (i, v) in record.values.iter().enumerate() {
        if let Some(v) = v {
            data.insert(format!("d{}", i + 1), json!(v));
        }
    }
    if let Some(c) = &record.comment {
        data.insert("cmnt".into(), Value::String(c.clone()));
    }
    json!({ "writeKey": write_key, "data": [Value::Object(data)] })
}

// ── Client ────────────────────────────────────────────────────

pub struct AmbientClient {
    http: reqwest::Client,
    base_url: String,
    channel_id: u32,
    write_key: String,
    throttle: ChannelThrottle,
}

impl AmbientClient {
    pub fn new(cfg: &AmbientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_http(http, cfg, MIN_SEND_INTERVAL))
    }

    pub fn with_http(http: reqwest::Client, cfg: &AmbientConfig, min_gap: Duration) -> Self {
        Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            channel_id: cfg.channel_id,
            write_key: cfg.write_key.clone(),
            throttle: ChannelThrottle::new(min_gap),
        }
    }

    pub fn url(&self) -> String {
        format!("{}/api/v2/channels/{}/dataarray", self.base_url, self.channel_id)
    }

    async fn post(&self, record: TelemetryRecord) -> Result<()> {
        self.throttle.wait_turn(self.channel_id).await;

        let url = self.url();
        let body = build_payload(&self.write_key, &record);
        trace!("ambient > POST {} {}", url, body);

        let status = self.http.post(&url).json(&body).send().await?.status();
        if status != StatusCode::OK {
            return Err(ApiError::Status {
                service: "ambient",
                code: status.as_u16(),
            }
            .into());
        }
        Ok(())
    }
}

impl TelemetrySink for AmbientClient {
    fn send(&self, record: TelemetryRecord) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.post(record))
    }
}
