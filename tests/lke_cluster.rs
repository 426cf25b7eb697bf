//! LKE cluster reconciliation against a mock Linode API.

mod common;

use common::{body_of, client, config, context, not_found, page, writes};
use linode_provider::flatten::{LkeClusterModel, PoolModel};
use linode_provider::reconciler::LkeReconciler;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn cluster_json() -> Value {
    json!({
        "id": 7,
        "label": "prod",
        "region": "us-east",
        "k8s_version": "1.29",
        "tags": ["prod"],
        "status": "ready",
        "control_plane": {"high_availability": false}
    })
}

fn pool_json(id: u64, plan_type: &str, statuses: &[&str]) -> Value {
    let nodes: Vec<Value> = statuses
        .iter()
        .enumerate()
        .map(|(i, status)| json!({"id": format!("{id}-{i}"), "instance_id": 1000 + i, "status": status}))
        .collect();
    json!({
        "id": id,
        "count": statuses.len(),
        "type": plan_type,
        "tags": [],
        "autoscaler": {"enabled": false, "min": 0, "max": 0},
        "nodes": nodes
    })
}

fn pool(id: Option<u64>, plan_type: &str, count: u32) -> PoolModel {
    PoolModel {
        id,
        plan_type: plan_type.to_string(),
        count: Some(count),
        ..PoolModel::default()
    }
}

fn cluster_state(pools: Vec<PoolModel>) -> LkeClusterModel {
    LkeClusterModel {
        id: Some("7".to_string()),
        label: "prod".to_string(),
        region: "us-east".to_string(),
        k8s_version: "1.29".to_string(),
        tags: vec!["prod".to_string()],
        pool: pools,
        ..LkeClusterModel::default()
    }
}

async fn mount_cluster_read(server: &MockServer, pools: Value, kubeconfig: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/v4/lke/clusters/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cluster_json()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/lke/clusters/7/pools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(pools)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/lke/clusters/7/api-endpoints"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page(json!([{"endpoint": "https://7.us-east-1.linodelke.net:443"}]))),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/lke/clusters/7/kubeconfig"))
        .respond_with(kubeconfig)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_create_waits_for_nodes_and_tolerates_pending_kubeconfig() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v4/lke/clusters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cluster_json()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/lke/clusters/7/pools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(json!([pool_json(
            11,
            "g6-standard-2",
            &["ready", "not_ready", "not_ready"]
        )]))))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_cluster_read(
        &server,
        json!([pool_json(11, "g6-standard-2", &["ready", "ready", "ready"])]),
        ResponseTemplate::new(503).set_body_json(json!({"errors": [{"reason": "Cluster is provisioning"}]})),
    )
    .await;

    let desired = LkeClusterModel {
        id: None,
        pool: vec![pool(None, "g6-standard-2", 3)],
        ..cluster_state(Vec::new())
    };

    let cfg = config(&server);
    let client = client(&cfg);
    let ctx = context();
    let state = LkeReconciler::new(client.session(&ctx), &cfg)
        .create(&desired)
        .await
        .unwrap();

    let request = body_of(&server, "POST", "/v4/lke/clusters").await;
    assert_eq!(request["k8s_version"], json!("1.29"));
    assert_eq!(request["node_pools"][0]["type"], json!("g6-standard-2"));
    assert_eq!(request["node_pools"][0]["count"], json!(3));

    assert_eq!(state.id.as_deref(), Some("7"));
    assert!(state.kubeconfig.is_none());
    assert_eq!(state.api_endpoints.len(), 1);
    assert_eq!(state.pool[0].id, Some(11));
    assert!(state.pool[0].nodes.iter().all(|n| n.status == "ready"));
}

#[tokio::test]
async fn test_pool_shape_change_creates_before_deleting() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v4/lke/clusters/7/pools"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(pool_json(12, "g6-standard-4", &["not_ready"; 3])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v4/lke/clusters/7/pools/11"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    mount_cluster_read(
        &server,
        json!([pool_json(12, "g6-standard-4", &["ready"; 3])]),
        ResponseTemplate::new(200).set_body_json(json!({"kubeconfig": "YXBpVmVyc2lvbjogdjE="})),
    )
    .await;

    let prior = cluster_state(vec![pool(Some(11), "g6-standard-2", 3)]);
    let desired = cluster_state(vec![pool(None, "g6-standard-4", 3)]);

    let cfg = config(&server);
    let client = client(&cfg);
    let ctx = context();
    let state = LkeReconciler::new(client.session(&ctx), &cfg)
        .update(&prior, &desired)
        .await
        .unwrap();

    assert_eq!(
        writes(&server).await,
        vec!["POST /v4/lke/clusters/7/pools", "DELETE /v4/lke/clusters/7/pools/11"]
    );
    let request = body_of(&server, "POST", "/v4/lke/clusters/7/pools").await;
    assert_eq!(request, json!({"count": 3, "type": "g6-standard-4"}));

    assert_eq!(state.pool.len(), 1);
    assert_eq!(state.pool[0].id, Some(12));
    assert_eq!(state.pool[0].plan_type, "g6-standard-4");
    assert_eq!(state.kubeconfig.as_deref(), Some("YXBpVmVyc2lvbjogdjE="));
}

#[tokio::test]
async fn test_unchanged_cluster_update_issues_no_requests() {
    let server = MockServer::start().await;
    let cfg = config(&server);
    let client = client(&cfg);
    let ctx = context();

    let state = cluster_state(vec![pool(Some(11), "g6-standard-2", 3)]);
    let result = LkeReconciler::new(client.session(&ctx), &cfg)
        .update(&state, &state)
        .await
        .unwrap();

    assert_eq!(result, state);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_delete_waits_until_cluster_is_gone() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v4/lke/clusters/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/lke/clusters/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cluster_json()))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/lke/clusters/7"))
        .respond_with(not_found())
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config(&server);
    let client = client(&cfg);
    let ctx = context();
    LkeReconciler::new(client.session(&ctx), &cfg)
        .delete(&cluster_state(Vec::new()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_read_of_missing_cluster_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4/lke/clusters/7"))
        .respond_with(not_found())
        .mount(&server)
        .await;

    let cfg = config(&server);
    let client = client(&cfg);
    let ctx = context();
    let read = LkeReconciler::new(client.session(&ctx), &cfg)
        .read(7, &cluster_state(Vec::new()))
        .await
        .unwrap();
    assert!(read.is_none());
}
