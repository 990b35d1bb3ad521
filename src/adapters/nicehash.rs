//! NiceHash rig power-mode backend ([`PowerProfileApi`]).
//!
//! Every private call is signed:
//!
//! ```text
//!   input  = apiKey ␀ time ␀ nonce ␀ ␀ orgId ␀ ␀ METHOD ␀ path ␀ [query] [␀ body]
//!   X-Auth = apiKey ":" hex(HMAC-SHA256(secret, input))
//! ```
//!
//! `time` is the server clock (`GET /api/v2/time`), fetched before each
//! signed call so local clock drift never invalidates a request.

use log::{debug, info};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::app::ports::{BoxFuture, PowerProfileApi};
use crate::config::NicehashConfig;
use crate::control::balancer::ProfileLevel;
use crate::error::{ApiError, Error, Result};

const PATH_TIME: &str = "/api/v2/time";
const PATH_RIGS: &str = "/main/api/v2/mining/rigs2";
const PATH_RIG_STATUS: &str = "/main/api/v2/mining/rigs/status2";

// ── Signing ───────────────────────────────────────────────────

/// Request fields covered by the signature.
#[derive(Debug, Clone, Copy)]
pub struct SignedRequest<'a> {
    pub time: &'a str,
    pub nonce: &'a str,
    pub method: &'a str,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub body: Option<&'a str>,
}

pub fn sign_input(api_key: &str, org_id: &str, req: &SignedRequest<'_>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    for (i, part) in [
        api_key, req.time, req.nonce, "", org_id, "", req.method, req.path,
    ]
    .iter()
    .enumerate()
    {
        if i > 0 {
            buf.push(0);
        }
        buf.extend_from_slice(part.as_bytes());
    }
    buf.push(0);
    if let Some(q) = req.query {
        buf.extend_from_slice(q.as_bytes());
    }
    if let Some(b) = req.body {
        buf.push(0);
        buf.extend_from_slice(b.as_bytes());
    }
    buf
}

/// Lower-case hex HMAC-SHA256 of `input` under `secret`.
pub fn signature(secret: &str, input: &[u8]) -> String {
    hex::encode(hmac_sha256::HMAC::mac(input, secret.as_bytes()))
}

// ── Mode mapping ──────────────────────────────────────────────

pub fn mode_to_level(mode: &str) -> ProfileLevel {
    match mode {
        "HIGH" => ProfileLevel::High,
        "LOW" => ProfileLevel::Low,
        // MEDIUM, MIXED (per-device modes differ) and UNKNOWN.
        _ => ProfileLevel::Medium,
    }
}

pub fn level_to_mode(level: ProfileLevel) -> &'static str {
    match level {
        ProfileLevel::Low => "LOW",
        ProfileLevel::Medium => "MEDIUM",
        ProfileLevel::High => "HIGH",
    }
}

// ── Wire types ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RigsResponse {
    #[serde(default)]
    mining_rigs: Vec<RigEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RigEntry {
    rig_id: String,
    #[serde(default)]
    rig_power_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

/// `serverTime` arrives as a JSON number; accept a string as well.
fn server_time(v: &Value) -> Option<String> {
    match v.get("serverTime")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

// ── Client ────────────────────────────────────────────────────

pub struct NicehashClient {
    http: reqwest::Client,
    cfg: NicehashConfig,
}

impl NicehashClient {
    pub fn new(cfg: &NicehashConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self::with_http(http, cfg))
    }

    pub fn with_http(http: reqwest::Client, cfg: &NicehashConfig) -> Self {
        let mut cfg = cfg.clone();
        cfg.base_url = cfg.base_url.trim_end_matches('/').to_owned();
        Self { http, cfg }
    }

    async fn fetch_server_time(&self) -> Result<String> {
        let resp = self
            .http
            .get(format!("{}{}", self.cfg.base_url, PATH_TIME))
            .send()
            .await?;
        check_status(resp.status())?;
        let v: Value = resp.json().await?;
        server_time(&v).ok_or_else(|| ApiError::Decode("serverTime missing".into()).into())
    }

    async fn signed(&self, method: Method, path: &str, body: Option<String>) -> Result<Value> {
        let time = self.fetch_server_time().await?;
        let nonce = uuid::Uuid::new_v4().to_string();
        let input = sign_input(
            &self.cfg.api_key,
            &self.cfg.org_id,
            &SignedRequest {
                time: &time,
                nonce: &nonce,
                method: method.as_str(),
                path,
                query: None,
                body: body.as_deref(),
            },
        );
        let auth = format!(
            "{}:{}",
            self.cfg.api_key,
            signature(&self.cfg.api_secret, &input)
        );

        debug!("nicehash > {} {}", method, path);
        let mut req = self
            .http
            .request(method, format!("{}{}", self.cfg.base_url, path))
            .header("X-Time", &time)
            .header("X-Nonce", &nonce)
            .header("X-Organization-Id", &self.cfg.org_id)
            .header("X-Request-Id", uuid::Uuid::new_v4().to_string())
            .header("X-Auth", auth);
        if let Some(b) = body {
            req = req
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(b);
        }
        let resp = req.send().await?;
        check_status(resp.status())?;
        Ok(resp.json().await?)
    }

    async fn fetch_mode(&self) -> Result<ProfileLevel> {
        let v = self.signed(Method::GET, PATH_RIGS, None).await?;
        let rigs: RigsResponse =
            serde_json::from_value(v).map_err(|e| ApiError::Decode(e.to_string()))?;
        let rig = rigs
            .mining_rigs
            .into_iter()
            .find(|r| r.rig_id == self.cfg.rig_id)
            .ok_or_else(|| ApiError::Decode(format!("rig '{}' not listed", self.cfg.rig_id)))?;
        let mode = rig.rig_power_mode.unwrap_or_default();
        debug!("nicehash: rig {} power mode {}", self.cfg.rig_id, mode);
        Ok(mode_to_level(&mode))
    }

    async fn set_mode(&self, level: ProfileLevel) -> Result<ProfileLevel> {
        let body = json!({
            "rigId": self.cfg.rig_id,
            "action": "POWER_MODE",
            "options": [level_to_mode(level)],
        })
        .to_string();
        let v = self.signed(Method::POST, PATH_RIG_STATUS, Some(body)).await?;
        let status: StatusResponse =
            serde_json::from_value(v).map_err(|e| ApiError::Decode(e.to_string()))?;
        if !status.success {
            return Err(ApiError::Rejected(status.message.unwrap_or_default()).into());
        }
        info!("nicehash: rig {} set to {}", self.cfg.rig_id, level_to_mode(level));
        Ok(level)
    }
}

fn check_status(code: StatusCode) -> core::result::Result<(), Error> {
    if code.is_success() {
        Ok(())
    } else {
        Err(ApiError::Status {
            service: "nicehash",
            code: code.as_u16(),
        }
        .into())
    }
}

impl PowerProfileApi for NicehashClient {
    fn name(&self) -> &'static str {
        "nicehash"
    }

    fn current_profile(&self) -> BoxFuture<'_, Result<ProfileLevel>> {
        Box::pin(self.fetch_mode())
    }

    fn apply_profile(&self, level: ProfileLevel) -> BoxFuture<'_, Result<ProfileLevel>> {
        Box::pin(self.set_mode(level))
    }
}
