//! Shared fixtures for the API-level tests.

#![allow(dead_code)]

use std::time::Duration;

use linode_provider::config::ProviderConfig;
use linode_provider::linode::LinodeClient;
use linode_provider::provider::OperationContext;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Timestamp later than any token captured during a test run.
pub const LATER: &str = "2099-01-01T00:00:00";

/// Provider configuration pointing at the mock server with fast polling.
pub fn config(server: &MockServer) -> ProviderConfig {
    ProviderConfig {
        token: Some("test-token".to_string()),
        url: Some(server.uri()),
        disable_internal_cache: true,
        min_retry_delay_ms: 1,
        max_retry_delay_ms: 5,
        max_retry_attempts: 2,
        event_poll_ms: 10,
        lke_event_poll_ms: 10,
        lke_node_ready_poll_ms: 10,
        request_timeout_secs: 5,
        ..ProviderConfig::default()
    }
}

pub fn client(config: &ProviderConfig) -> LinodeClient {
    LinodeClient::new(config).unwrap()
}

pub fn context() -> OperationContext {
    OperationContext::new("test", Duration::from_secs(10))
}

/// Wraps items in a single list page.
pub fn page(items: Value) -> Value {
    let results = items.as_array().map_or(0, Vec::len);
    json!({"data": items, "page": 1, "pages": 1, "results": results})
}

pub fn not_found() -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({"errors": [{"reason": "Not found"}]}))
}

pub fn instance_json(id: u64, status: &str, plan_type: &str, disk_mb: u64) -> Value {
    json!({
        "id": id,
        "label": "web-1",
        "group": "",
        "status": status,
        "type": plan_type,
        "region": "us-east",
        "image": "linode/debian12",
        "ipv4": ["192.0.2.10"],
        "ipv6": "2600:3c03::f03c:91ff:fe24:3a2f/128",
        "tags": [],
        "watchdog_enabled": true,
        "alerts": {"cpu": 90, "network_in": 10, "network_out": 10, "transfer_quota": 80, "io": 10000},
        "specs": {"disk": disk_mb, "memory": 2048, "vcpus": 1, "transfer": 2000},
        "backups": {"enabled": false, "schedule": {"day": null, "window": null}}
    })
}

pub fn disk_json(id: u64, label: &str, size: u64, filesystem: &str) -> Value {
    json!({"id": id, "label": label, "status": "ready", "size": size, "filesystem": filesystem})
}

pub fn ips_json() -> Value {
    json!({
        "ipv4": {
            "public": [{
                "address": "192.0.2.10",
                "gateway": "192.0.2.1",
                "prefix": 24,
                "subnet_mask": "255.255.255.0",
                "rdns": null,
                "region": "us-east",
                "type": "ipv4",
                "public": true
            }],
            "private": [],
            "shared": [],
            "reserved": []
        },
        "ipv6": null
    })
}

pub fn ip_json(address: &str, public: bool) -> Value {
    json!({
        "address": address,
        "gateway": null,
        "prefix": if public { 24 } else { 17 },
        "subnet_mask": if public { "255.255.255.0" } else { "255.255.128.0" },
        "rdns": null,
        "region": "us-east",
        "type": "ipv4",
        "public": public
    })
}

pub fn event_json(id: u64, action: &str, entity_id: u64, status: &str, created: &str) -> Value {
    json!({
        "id": id,
        "action": action,
        "created": created,
        "status": status,
        "entity": {"id": entity_id, "type": "linode", "label": "web-1"},
        "secondary_entity": null,
        "percent_complete": 100
    })
}

pub fn disk_event_json(id: u64, action: &str, entity_id: u64, disk_id: u64) -> Value {
    let mut event = event_json(id, action, entity_id, "finished", LATER);
    event["secondary_entity"] = json!({"id": disk_id, "type": "disk", "label": "disk"});
    event
}

/// Serves the event feed with a fixed list of events.
pub async fn mount_events(server: &MockServer, events: Value) {
    Mock::given(method("GET"))
        .and(path("/v4/account/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(events)))
        .mount(server)
        .await;
}

/// Serves the read of instance `id`: disks, configs and addresses.
pub async fn mount_instance_children(server: &MockServer, id: u64, disks: Value, configs: Value) {
    mount_instance_children_with_ips(server, id, disks, configs, ips_json()).await;
}

pub async fn mount_instance_children_with_ips(
    server: &MockServer,
    id: u64,
    disks: Value,
    configs: Value,
    ips: Value,
) {
    Mock::given(method("GET"))
        .and(path(format!("/v4/linode/instances/{id}/disks")))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(disks)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v4/linode/instances/{id}/configs")))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(configs)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v4/linode/instances/{id}/ips")))
        .respond_with(ResponseTemplate::new(200).set_body_json(ips))
        .mount(server)
        .await;
}

/// Method and path of every write the server saw, in order.
pub async fn writes(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() != "GET")
        .map(describe)
        .collect()
}

pub fn describe(request: &Request) -> String {
    format!("{} {}", request.method, request.url.path())
}

/// JSON body of the first request to `target`.
pub async fn body_of(server: &MockServer, verb: &str, target: &str) -> Value {
    let requests = server.received_requests().await.unwrap_or_default();
    let request = requests
        .iter()
        .find(|r| r.method.as_str() == verb && r.url.path() == target)
        .unwrap_or_else(|| panic!("no {verb} {target}"));
    serde_json::from_slice(&request.body).unwrap()
}
