//! Event feed polling against a mock Linode API.

mod common;

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use common::{client, config, context, disk_event_json, event_json, page};
use linode_provider::error::{ProviderError, WaitError};
use linode_provider::linode::EventToken;
use linode_provider::linode::types::EventStatus;
use linode_provider::provider::OperationContext;
use serde_json::json;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

#[tokio::test]
async fn test_wait_ignores_stale_and_foreign_events() {
    let server = MockServer::start().await;
    let stale = event_json(1, "linode_boot", 100, "failed", "2024-03-01T09:59:00");
    let foreign = event_json(2, "linode_boot", 555, "finished", "2024-03-01T10:02:00");

    Mock::given(method("GET"))
        .and(path("/v4/account/events"))
        .and(header_exists("X-Filter"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(json!([
            stale,
            foreign,
            event_json(3, "linode_boot", 100, "started", "2024-03-01T10:03:00"),
        ]))))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/account/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(json!([
            stale,
            foreign,
            event_json(3, "linode_boot", 100, "finished", "2024-03-01T10:03:00"),
        ]))))
        .mount(&server)
        .await;

    let cfg = config(&server);
    let client = client(&cfg);
    let ctx = context();
    let token = EventToken::capture("linode", 100, "linode_boot").at(at(10, 1));

    let event = client
        .session(&ctx)
        .wait_for_event(&token, Duration::from_millis(10))
        .await
        .unwrap();

    assert_eq!(event.id, 3);
    assert_eq!(event.status, EventStatus::Finished);
    assert!(server.received_requests().await.unwrap_or_default().len() >= 2);
}

#[tokio::test]
async fn test_wait_tells_disks_apart() {
    let server = MockServer::start().await;
    let mut other_disk = disk_event_json(7, "disk_create", 100, 201);
    other_disk["status"] = json!("failed");
    Mock::given(method("GET"))
        .and(path("/v4/account/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(json!([
            other_disk,
            disk_event_json(8, "disk_create", 100, 202),
        ]))))
        .mount(&server)
        .await;

    let cfg = config(&server);
    let client = client(&cfg);
    let ctx = context();
    let token = EventToken::capture("linode", 100, "disk_create")
        .at(at(10, 0))
        .with_secondary(202);

    let event = client
        .session(&ctx)
        .wait_for_event(&token, Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(event.id, 8);
}

#[tokio::test]
async fn test_failed_event_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4/account/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(json!([event_json(
            4,
            "linode_resize",
            100,
            "failed",
            "2024-03-01T10:05:00"
        )]))))
        .mount(&server)
        .await;

    let cfg = config(&server);
    let client = client(&cfg);
    let ctx = context();
    let token = EventToken::capture("linode", 100, "linode_resize").at(at(10, 0));

    let error = client
        .session(&ctx)
        .wait_for_event(&token, Duration::from_millis(10))
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        ProviderError::Wait(WaitError::EventFailed { event_id: 4, .. })
    ));
}

#[tokio::test]
async fn test_wait_times_out_without_matching_event() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4/account/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(json!([]))))
        .mount(&server)
        .await;

    let cfg = config(&server);
    let client = client(&cfg);
    let ctx = OperationContext::new("short", Duration::from_millis(50));
    let token = EventToken::capture("linode", 100, "linode_boot").at(at(10, 0));

    let error = client
        .session(&ctx)
        .wait_for_event(&token, Duration::from_millis(10))
        .await
        .unwrap_err();
    assert!(matches!(error, ProviderError::Wait(WaitError::Timeout { .. })));
}
