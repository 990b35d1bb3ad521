//! HiveOS overclock-profile backend ([`PowerProfileApi`]).
//!
//! The three power levels map to named OC profiles on the farm:
//!
//! ```text
//!   GET   farms/{farm}/oc                 → data[{id, name}]
//!   GET   farms/{farm}/workers/{worker}   → oc_id
//!   PATCH farms/{farm}/workers/{worker}   ← {"oc_id": id, "oc_apply_mode": "replace"}
//! ```

use log::{debug, info};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::app::ports::{BoxFuture, PowerProfileApi};
use crate::config::{HiveConfig, HiveProfileNames};
use crate::control::balancer::ProfileLevel;
use crate::error::{ApiError, Error, Result};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct OcProfile {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct OcList {
    #[serde(default)]
    data: Vec<OcProfile>,
}

#[derive(Debug, Deserialize)]
struct Worker {
    #[serde(default)]
    oc_id: Option<u64>,
}

pub fn profile_name(names: &HiveProfileNames, level: ProfileLevel) -> &str {
    match level {
        ProfileLevel::Low => &names.low,
        ProfileLevel::Medium => &names.medium,
        ProfileLevel::High => &names.high,
    }
}

/// Level whose configured name matches the profile with `oc_id`.
pub fn level_of(
    names: &HiveProfileNames,
    profiles: &[OcProfile],
    oc_id: u64,
) -> core::result::Result<ProfileLevel, ApiError> {
    let p = profiles
        .iter()
        .find(|p| p.id == oc_id)
        .ok_or_else(|| ApiError::ProfileNotFound(format!("id {oc_id}")))?;
    [ProfileLevel::Low, ProfileLevel::Medium, ProfileLevel::High]
        .into_iter()
        .find(|l| profile_name(names, *l) == p.name)
        .ok_or_else(|| ApiError::ProfileNotFound(p.name.clone()))
}

pub fn id_of(profiles: &[OcProfile], name: &str) -> core::result::Result<u64, ApiError> {
    profiles
        .iter()
        .find(|p| p.name == name)
        .map(|p| p.id)
        .ok_or_else(|| ApiError::ProfileNotFound(name.to_owned()))
}

pub struct HiveClient {
    http: reqwest::Client,
    cfg: HiveConfig,
}

impl HiveClient {
    pub fn new(cfg: &HiveConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self::with_http(http, cfg))
    }

    pub fn with_http(http: reqwest::Client, cfg: &HiveConfig) -> Self {
        let mut cfg = cfg.clone();
        cfg.base_url = cfg.base_url.trim_end_matches('/').to_owned();
        Self { http, cfg }
    }

    fn worker_url(&self) -> String {
        format!(
            "{}/farms/{}/workers/{}",
            self.cfg.base_url, self.cfg.farm_id, self.cfg.worker_id
        )
    }

    async fn profiles(&self) -> Result<Vec<OcProfile>> {
        let url = format!("{}/farms/{}/oc", self.cfg.base_url, self.cfg.farm_id);
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.cfg.personal_token)
            .send()
            .await?;
        check_status(resp.status())?;
        let list: OcList = resp.json().await?;
        debug!("hive: {} OC profiles on farm {}", list.data.len(), self.cfg.farm_id);
        Ok(list.data)
    }

    async fn fetch_level(&self) -> Result<ProfileLevel> {
        let profiles = self.profiles().await?;
        let resp = self
            .http
            .get(self.worker_url())
            .bearer_auth(&self.cfg.personal_token)
            .send()
            .await?;
        check_status(resp.status())?;
        let worker: Worker = resp.json().await?;
        let oc_id = worker
            .oc_id
            .ok_or_else(|| ApiError::ProfileNotFound("worker has no OC profile".into()))?;
        Ok(level_of(&self.cfg.profiles, &profiles, oc_id)?)
    }

    async fn set_level(&self, level: ProfileLevel) -> Result<ProfileLevel> {
        let name = profile_name(&self.cfg.profiles, level);
        let id = id_of(&self.profiles().await?, name)?;
        let resp = self
            .http
            .patch(self.worker_url())
            .bearer_auth(&self.cfg.personal_token)
            .json(&json!({ "oc_id": id, "oc_apply_mode": "replace" }))
            .send()
            .await?;
        check_status(resp.status())?;
        info!("hive: worker {} switched to '{}'", self.cfg.worker_id, name);
        Ok(level)
    }
}

fn check_status(code: StatusCode) -> core::result::Result<(), Error> {
    if code == StatusCode::OK {
        Ok(())
    } else {
        Err(ApiError::Status {
            service: "hive",
            code: code.as_u16(),
        }
        .into())
    }
}

impl PowerProfileApi for HiveClient {
    fn name(&self) -> &'static str {
        "hive"
    }

    fn current_profile(&self) -> BoxFuture<'_, Result<ProfileLevel>> {
        Box::pin(self.fetch_level())
    }

    fn apply_profile(&self, level: ProfileLevel) -> BoxFuture<'_, Result<ProfileLevel>> {
        Box::pin(self.set_level(level))
    }
}
