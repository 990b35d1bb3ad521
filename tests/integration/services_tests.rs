//! HTTP adapters against a loopback stub.

use std::time::Duration;

use chrono::Utc;

use pvrig::adapters::ambient::AmbientClient;
use pvrig::adapters::hive::HiveClient;
use pvrig::adapters::nicehash::NicehashClient;
use pvrig::app::ports::{PowerProfileApi, TelemetryRecord, TelemetrySink};
use pvrig::config::{AmbientConfig, HiveConfig, HiveProfileNames, NicehashConfig};
use pvrig::control::balancer::ProfileLevel;
use pvrig::error::{ApiError, Error};

use crate::http_stub::{Canned, client, serve};

fn record() -> TelemetryRecord {
    TelemetryRecord {
        created: Utc::now(),
        values: [Some(310.0), Some(26.4), Some(250.0), Some(11.0), None, Some(88.0), None, None],
        comment: None,
    }
}

fn ambient(base: &str) -> AmbientClient {
    let cfg = AmbientConfig {
        base_url: base.to_owned(),
        channel_id: 42,
        write_key: "wk".into(),
    };
    AmbientClient::with_http(client(), &cfg, Duration::ZERO)
}

// ── Ambient ──────────────────────────────────────────────────

#[tokio::test]
async fn ambient_posts_data_array() {
    let (base, stub) = serve(vec![Canned::ok("")]).await;
    ambient(&base).send(record()).await.unwrap();

    let seen = stub.await.unwrap();
    assert_eq!(
        seen[0].request_line(),
        "POST /api/v2/channels/42/dataarray HTTP/1.1"
    );
    let body: serde_json::Value = serde_json::from_str(&seen[0].body).unwrap();
    assert_eq!(body["writeKey"], "wk");
    assert_eq!(body["data"][0]["d1"], 310.0);
    assert_eq!(body["data"][0]["d4"], 11.0);
    assert!(body["data"][0].get("d5").is_none());
}

#[tokio::test]
async fn ambient_non_200_is_error() {
    let (base, _stub) = serve(vec![Canned::status(500)]).await;
    assert_eq!(
        ambient(&base).send(record()).await,
        Err(Error::Api(ApiError::Status {
            service: "ambient",
            code: 500
        }))
    );
}

// ── NiceHash ─────────────────────────────────────────────────

fn nicehash(base: &str) -> NicehashClient {
    NicehashClient::with_http(
        client(),
        &NicehashConfig {
            base_url: base.to_owned(),
            org_id: "org-1".into(),
            api_key: "key-1".into(),
            api_secret: "secret-1".into(),
            rig_id: "rig-A".into(),
        },
    )
}

#[tokio::test]
async fn nicehash_reads_rig_mode_with_signed_request() {
    let (base, stub) = serve(vec![
        Canned::ok(r#"{"serverTime":1700000000123}"#),
        Canned::ok(
            r#"{"miningRigs":[{"rigId":"other","rigPowerMode":"HIGH"},{"rigId":"rig-A","rigPowerMode":"LOW"}]}"#,
        ),
    ])
    .await;

    assert_eq!(
        nicehash(&base).current_profile().await.unwrap(),
        ProfileLevel::Low
    );

    let seen = stub.await.unwrap();
    assert!(seen[0].request_line().starts_with("GET /api/v2/time "));
    let signed = &seen[1];
    assert!(signed.request_line().starts_with("GET /main/api/v2/mining/rigs2 "));
    assert_eq!(signed.header("x-time").as_deref(), Some("1700000000123"));
    assert_eq!(signed.header("x-organization-id").as_deref(), Some("org-1"));
    let auth = signed.header("x-auth").unwrap();
    let (key, digest) = auth.split_once(':').unwrap();
    assert_eq!(key, "key-1");
    assert_eq!(digest.len(), 64);
    assert!(signed.header("x-nonce").is_some());
}

#[tokio::test]
async fn nicehash_rejection_surfaces_message() {
    let (base, stub) = serve(vec![
        Canned::ok(r#"{"serverTime":"1700000000123"}"#),
        Canned::ok(r#"{"success":false,"message":"rig offline"}"#),
    ])
    .await;

    assert_eq!(
        nicehash(&base).step_up(ProfileLevel::Medium).await,
        Err(Error::Api(ApiError::Rejected("rig offline".into())))
    );
    let seen = stub.await.unwrap();
    let body: serde_json::Value = serde_json::from_str(&seen[1].body).unwrap();
    assert_eq!(body["rigId"], "rig-A");
    assert_eq!(body["action"], "POWER_MODE");
    assert_eq!(body["options"][0], "HIGH");
}

// ── Hive ─────────────────────────────────────────────────────

const OC_LIST: &str = r#"{"data":[{"id":10,"name":"eco"},{"id":11,"name":"std"},{"id":12,"name":"boost"}]}"#;

fn hive(base: &str) -> HiveClient {
    HiveClient::with_http(
        client(),
        &HiveConfig {
            base_url: base.to_owned(),
            farm_id: 7,
            worker_id: 3,
            personal_token: "tok".into(),
            profiles: HiveProfileNames {
                low: "eco".into(),
                medium: "std".into(),
                high: "boost".into(),
            },
        },
    )
}

#[tokio::test]
async fn hive_maps_worker_oc_to_level() {
    let (base, stub) = serve(vec![Canned::ok(OC_LIST), Canned::ok(r#"{"id":3,"oc_id":11}"#)]).await;

    assert_eq!(hive(&base).current_profile().await.unwrap(), ProfileLevel::Medium);
    let seen = stub.await.unwrap();
    assert!(seen[0].request_line().starts_with("GET /farms/7/oc "));
    assert!(seen[1].request_line().starts_with("GET /farms/7/workers/3 "));
    assert_eq!(seen[1].header("authorization").as_deref(), Some("Bearer tok"));
}

#[tokio::test]
async fn hive_step_down_patches_worker() {
    let (base, stub) = serve(vec![Canned::ok(OC_LIST), Canned::ok("{}")]).await;

    assert_eq!(
        hive(&base).step_down(ProfileLevel::Medium).await.unwrap(),
        ProfileLevel::Low
    );
    let seen = stub.await.unwrap();
    assert!(seen[1].request_line().starts_with("PATCH /farms/7/workers/3 "));
    let body: serde_json::Value = serde_json::from_str(&seen[1].body).unwrap();
    assert_eq!(body["oc_id"], 10);
    assert_eq!(body["oc_apply_mode"], "replace");
}

#[tokio::test]
async fn hive_unknown_profile_name() {
    let (base, _stub) = serve(vec![Canned::ok(r#"{"data":[{"id":1,"name":"manual"}]}"#)]).await;
    assert_eq!(
        hive(&base).step_up(ProfileLevel::Medium).await,
        Err(Error::Api(ApiError::ProfileNotFound("boost".into())))
    );
}
