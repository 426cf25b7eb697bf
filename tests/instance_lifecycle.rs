//! Instance reconciliation against a mock Linode API.

mod common;

use common::{
    LATER, body_of, client, config, context, disk_event_json, disk_json, event_json,
    instance_json, ip_json, mount_events, mount_instance_children,
    mount_instance_children_with_ips, not_found, page, writes,
};
use linode_provider::flatten::{
    ConfigModel, DeviceModel, DevicesModel, DiskModel, ExtraIpModel, InstanceModel,
};
use linode_provider::error::{ProviderError, WaitError};
use linode_provider::linode::types::Filesystem;
use linode_provider::planner::plan_instance_update;
use linode_provider::reconciler::InstanceReconciler;
use serde_json::{Value, json};
use wiremock::matchers::{body_json, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROOT_PASS: &str = "S3cure-Passw0rd!";

fn simple_desired() -> InstanceModel {
    InstanceModel {
        label: Some("web-1".to_string()),
        region: "us-east".to_string(),
        plan_type: "g6-standard-1".to_string(),
        image: Some("linode/debian12".to_string()),
        root_pass: Some(ROOT_PASS.to_string()),
        ..InstanceModel::default()
    }
}

fn simple_state() -> InstanceModel {
    InstanceModel {
        id: Some("100".to_string()),
        swap_size: Some(512),
        backups_enabled: Some(false),
        booted: Some(true),
        status: Some("running".to_string()),
        disk: vec![
            DiskModel {
                id: Some(201),
                label: "Debian 12 Disk".to_string(),
                size: 25088,
                filesystem: Some(Filesystem::Ext4),
                ..DiskModel::default()
            },
            DiskModel {
                id: Some(202),
                label: "512 MB Swap Image".to_string(),
                size: 512,
                filesystem: Some(Filesystem::Swap),
                ..DiskModel::default()
            },
        ],
        ..simple_desired()
    }
}

fn implicit_disks(boot_size: u64) -> Value {
    json!([
        disk_json(201, "Debian 12 Disk", boot_size, "ext4"),
        disk_json(202, "512 MB Swap Image", 512, "swap"),
    ])
}

fn config_json(id: u64, label: &str, sda: u64, sdb: u64) -> Value {
    json!({
        "id": id,
        "label": label,
        "kernel": "linode/grub2",
        "run_level": "default",
        "virt_mode": "paravirt",
        "root_device": "/dev/sda",
        "comments": "",
        "memory_limit": 0,
        "devices": {"sda": {"disk_id": sda}, "sdb": {"disk_id": sdb}},
        "helpers": {
            "updatedb_disabled": true,
            "distro": true,
            "modules_dep": true,
            "network": true,
            "devtmpfs_automount": false
        },
        "interfaces": []
    })
}

#[tokio::test]
async fn test_simple_create_read_and_double_delete() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v4/linode/instances"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(instance_json(100, "provisioning", "g6-standard-1", 25600)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/linode/instances/100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance_json(100, "running", "g6-standard-1", 25600)))
        .mount(&server)
        .await;
    mount_instance_children(
        &server,
        100,
        implicit_disks(25088),
        json!([config_json(301, "My Debian 12 Disk Profile", 201, 202)]),
    )
    .await;
    Mock::given(method("DELETE"))
        .and(path("/v4/linode/instances/100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v4/linode/instances/100"))
        .respond_with(not_found())
        .mount(&server)
        .await;
    mount_events(&server, json!([event_json(9, "linode_delete", 100, "finished", LATER)])).await;

    let cfg = config(&server);
    let client = client(&cfg);
    let ctx = context();
    let reconciler = InstanceReconciler::new(client.session(&ctx), &cfg);

    let state = reconciler.create(&simple_desired()).await.unwrap();
    assert_eq!(state.id.as_deref(), Some("100"));
    assert_eq!(state.status.as_deref(), Some("running"));
    assert_eq!(state.booted, Some(true));
    assert_eq!(state.ip_address.as_deref(), Some("192.0.2.10"));
    assert_eq!(state.swap_size, Some(512));
    assert_eq!(state.disk.len(), 2);
    assert_eq!(state.boot_config_label.as_deref(), Some("My Debian 12 Disk Profile"));
    assert_eq!(state.root_pass.as_deref(), Some(ROOT_PASS));

    let request = body_of(&server, "POST", "/v4/linode/instances").await;
    assert_eq!(request["image"], json!("linode/debian12"));
    assert_eq!(request["type"], json!("g6-standard-1"));
    assert_eq!(request["booted"], json!(true));

    let refreshed = reconciler.read(100, &state).await.unwrap().unwrap();
    assert_eq!(refreshed, state);

    reconciler.delete(&state).await.unwrap();
    reconciler.delete(&state).await.unwrap();

    assert_eq!(
        writes(&server).await,
        vec![
            "POST /v4/linode/instances",
            "DELETE /v4/linode/instances/100",
            "DELETE /v4/linode/instances/100",
        ]
    );
}

#[tokio::test]
async fn test_extra_ips_are_recorded_and_not_allocated_again() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v4/linode/instances"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(instance_json(100, "provisioning", "g6-standard-1", 25600)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/linode/instances/100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance_json(100, "running", "g6-standard-1", 25600)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v4/linode/instances/100/ips"))
        .and(body_json(json!({"type": "ipv4", "public": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(ip_json("192.0.2.77", true)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v4/linode/instances/100/ips"))
        .and(body_json(json!({"type": "ipv4", "public": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(ip_json("192.168.140.5", false)))
        .expect(1)
        .mount(&server)
        .await;

    let mut ips = common::ips_json();
    ips["ipv4"]["public"]
        .as_array_mut()
        .unwrap()
        .push(ip_json("192.0.2.77", true));
    ips["ipv4"]["private"] = json!([ip_json("192.168.140.5", false)]);
    mount_instance_children_with_ips(
        &server,
        100,
        implicit_disks(25088),
        json!([config_json(301, "My Debian 12 Disk Profile", 201, 202)]),
        ips,
    )
    .await;

    let desired = InstanceModel {
        extra_ip: vec![
            ExtraIpModel::default(),
            ExtraIpModel {
                public: false,
                ..ExtraIpModel::default()
            },
        ],
        ..simple_desired()
    };

    let cfg = config(&server);
    let client = client(&cfg);
    let ctx = context();
    let state = InstanceReconciler::new(client.session(&ctx), &cfg)
        .create(&desired)
        .await
        .unwrap();

    let addresses: Vec<Option<&str>> = state.extra_ip.iter().map(|ip| ip.address.as_deref()).collect();
    assert_eq!(addresses, vec![Some("192.0.2.77"), Some("192.168.140.5")]);
    assert!(!state.private_ip);
    assert_eq!(state.ip_address.as_deref(), Some("192.0.2.10"));

    let plan = plan_instance_update(&state, &desired, None, false).unwrap();
    assert!(plan.extra_ips.is_empty());
    assert!(!plan.allocate_private_ip);
}

#[tokio::test]
async fn test_composite_create_orders_calls_and_settles() {
    let server = MockServer::start().await;
    let mut bare = instance_json(100, "offline", "g6-standard-1", 25600);
    bare["image"] = Value::Null;
    let mut running = instance_json(100, "running", "g6-standard-1", 25600);
    running["image"] = Value::Null;

    Mock::given(method("POST"))
        .and(path("/v4/linode/instances"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bare))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/linode/instances/100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(running))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v4/linode/instances/100/disks"))
        .and(body_partial_json(json!({"label": "boot"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(disk_json(201, "boot", 25088, "ext4")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v4/linode/instances/100/disks"))
        .and(body_partial_json(json!({"label": "swap"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(disk_json(202, "swap", 512, "swap")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v4/linode/instances/100/configs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(config_json(301, "cfg", 201, 202)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v4/linode/instances/100/boot"))
        .and(body_json(json!({"config_id": 301})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    mount_events(
        &server,
        json!([
            event_json(1, "linode_create", 100, "finished", LATER),
            disk_event_json(2, "disk_create", 100, 201),
            disk_event_json(3, "disk_create", 100, 202),
        ]),
    )
    .await;
    mount_instance_children(
        &server,
        100,
        json!([disk_json(201, "boot", 25088, "ext4"), disk_json(202, "swap", 512, "swap")]),
        json!([config_json(301, "cfg", 201, 202)]),
    )
    .await;

    let device = |label: &str| {
        Some(DeviceModel {
            disk_label: Some(label.to_string()),
            ..DeviceModel::default()
        })
    };
    let desired = InstanceModel {
        label: Some("web-1".to_string()),
        region: "us-east".to_string(),
        plan_type: "g6-standard-1".to_string(),
        disk: vec![
            DiskModel {
                label: "boot".to_string(),
                size: 25088,
                filesystem: Some(Filesystem::Ext4),
                image: Some("linode/debian12".to_string()),
                root_pass: Some(ROOT_PASS.to_string()),
                ..DiskModel::default()
            },
            DiskModel {
                label: "swap".to_string(),
                size: 512,
                filesystem: Some(Filesystem::Swap),
                ..DiskModel::default()
            },
        ],
        config: vec![ConfigModel {
            label: "cfg".to_string(),
            kernel: Some("linode/grub2".to_string()),
            devices: Some(DevicesModel {
                sda: device("boot"),
                sdb: device("swap"),
                ..DevicesModel::default()
            }),
            ..ConfigModel::default()
        }],
        ..InstanceModel::default()
    };

    let cfg = config(&server);
    let client = client(&cfg);
    let ctx = context();
    let state = InstanceReconciler::new(client.session(&ctx), &cfg)
        .create(&desired)
        .await
        .unwrap();

    assert_eq!(
        writes(&server).await,
        vec![
            "POST /v4/linode/instances",
            "POST /v4/linode/instances/100/disks",
            "POST /v4/linode/instances/100/disks",
            "POST /v4/linode/instances/100/configs",
            "POST /v4/linode/instances/100/boot",
        ]
    );

    let request = body_of(&server, "POST", "/v4/linode/instances").await;
    assert_eq!(request["booted"], json!(false));
    assert!(request.get("image").is_none());
    let config_request = body_of(&server, "POST", "/v4/linode/instances/100/configs").await;
    assert_eq!(config_request["devices"]["sda"]["disk_id"], json!(201));
    assert_eq!(config_request["devices"]["sdb"]["disk_id"], json!(202));

    assert_eq!(state.disk[0].id, Some(201));
    assert_eq!(state.config[0].id, Some(301));
    assert_eq!(state.boot_config_label.as_deref(), Some("cfg"));

    let second = plan_instance_update(&state, &desired, None, false).unwrap();
    assert!(second.is_noop(), "unexpected follow-up plan: {second:?}");
}

async fn mount_resize(server: &MockServer, expanded_boot_size: u64, boots: u64) {
    Mock::given(method("GET"))
        .and(path("/v4/linode/types/g6-standard-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "g6-standard-1", "disk": 25600})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/linode/types/g6-standard-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "g6-standard-2", "disk": 51200})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/linode/instances/100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance_json(100, "offline", "g6-standard-1", 25600)))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/linode/instances/100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance_json(100, "running", "g6-standard-2", 51200)))
        .mount(server)
        .await;
    for (action, times) in [("shutdown", 1), ("boot", boots)] {
        Mock::given(method("POST"))
            .and(path(format!("/v4/linode/instances/100/{action}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(times)
            .mount(server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/v4/linode/instances/100/resize"))
        .and(body_json(json!({
            "type": "g6-standard-2",
            "allow_auto_disk_resize": false,
            "migration_type": "cold"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(server)
        .await;
    mount_events(
        server,
        json!([
            event_json(5, "linode_resize", 100, "finished", LATER),
            disk_event_json(6, "disk_resize", 100, 201),
        ]),
    )
    .await;
    mount_instance_children(server, 100, implicit_disks(expanded_boot_size), json!([])).await;
}

async fn mount_disk_settling(server: &MockServer, settled_size: u64) {
    let mut resizing = disk_json(201, "Debian 12 Disk", 25088, "ext4");
    resizing["status"] = json!("resizing");
    Mock::given(method("GET"))
        .and(path("/v4/linode/instances/100/disks/201"))
        .respond_with(ResponseTemplate::new(200).set_body_json(resizing))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/linode/instances/100/disks/201"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(disk_json(201, "Debian 12 Disk", settled_size, "ext4")),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_resize_with_disk_expansion() {
    let server = MockServer::start().await;
    mount_resize(&server, 50688, 1).await;
    Mock::given(method("POST"))
        .and(path("/v4/linode/instances/100/disks/201/resize"))
        .and(body_json(json!({"size": 50688})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    mount_disk_settling(&server, 50688).await;

    let prior = simple_state();
    let desired = InstanceModel {
        plan_type: "g6-standard-2".to_string(),
        disk_expansion: true,
        ..prior.clone()
    };

    let cfg = config(&server);
    let client = client(&cfg);
    let ctx = context();
    let state = InstanceReconciler::new(client.session(&ctx), &cfg)
        .update(&prior, &desired)
        .await
        .unwrap();

    assert_eq!(
        writes(&server).await,
        vec![
            "POST /v4/linode/instances/100/shutdown",
            "POST /v4/linode/instances/100/resize",
            "POST /v4/linode/instances/100/disks/201/resize",
            "POST /v4/linode/instances/100/boot",
        ]
    );
    assert_eq!(state.plan_type, "g6-standard-2");
    assert_eq!(state.disk[0].size, 50688);
    assert_eq!(state.booted, Some(true));
}

#[tokio::test]
async fn test_disk_expansion_that_settles_short_fails() {
    let server = MockServer::start().await;
    mount_resize(&server, 25088, 0).await;
    Mock::given(method("POST"))
        .and(path("/v4/linode/instances/100/disks/201/resize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    mount_disk_settling(&server, 25088).await;

    let prior = simple_state();
    let desired = InstanceModel {
        plan_type: "g6-standard-2".to_string(),
        disk_expansion: true,
        ..prior.clone()
    };

    let cfg = config(&server);
    let client = client(&cfg);
    let ctx = context();
    let failure = InstanceReconciler::new(client.session(&ctx), &cfg)
        .update(&prior, &desired)
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error,
        ProviderError::Wait(WaitError::DiskSizeMismatch {
            disk_id: 201,
            expected: 50688,
            actual: 25088,
            ..
        })
    ));
    assert!(failure.partial.is_some());
}

#[tokio::test]
async fn test_resize_without_disk_expansion_keeps_disks() {
    let server = MockServer::start().await;
    mount_resize(&server, 25088, 1).await;
    Mock::given(method("POST"))
        .and(path("/v4/linode/instances/100/disks/201/resize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let prior = simple_state();
    let desired = InstanceModel {
        plan_type: "g6-standard-2".to_string(),
        ..prior.clone()
    };

    let cfg = config(&server);
    let client = client(&cfg);
    let ctx = context();
    let state = InstanceReconciler::new(client.session(&ctx), &cfg)
        .update(&prior, &desired)
        .await
        .unwrap();

    assert_eq!(
        writes(&server).await,
        vec![
            "POST /v4/linode/instances/100/shutdown",
            "POST /v4/linode/instances/100/resize",
            "POST /v4/linode/instances/100/boot",
        ]
    );
    assert_eq!(state.disk[0].size, 25088);
}

#[tokio::test]
async fn test_unchanged_update_issues_no_requests() {
    let server = MockServer::start().await;
    let cfg = config(&server);
    let client = client(&cfg);
    let ctx = context();

    let state = simple_state();
    let result = InstanceReconciler::new(client.session(&ctx), &cfg)
        .update(&state, &state)
        .await
        .unwrap();

    assert_eq!(result, state);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_read_of_missing_instance_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4/linode/instances/100"))
        .respond_with(not_found())
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/linode/instances/100/disks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(json!([]))))
        .expect(0)
        .mount(&server)
        .await;

    let cfg = config(&server);
    let client = client(&cfg);
    let ctx = context();
    let reconciler = InstanceReconciler::new(client.session(&ctx), &cfg);

    assert!(reconciler.read(100, &simple_state()).await.unwrap().is_none());
    let error = reconciler.import("100").await.unwrap_err();
    assert!(error.is_not_found());
    assert!(reconciler.import("web-1").await.is_err());
}

#[tokio::test]
async fn test_create_is_not_repeated_after_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v4/linode/instances"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = config(&server);
    let client = client(&cfg);
    let ctx = context();
    let failure = InstanceReconciler::new(client.session(&ctx), &cfg)
        .create(&simple_desired())
        .await
        .unwrap_err();

    assert!(matches!(failure.error, ProviderError::Api(_)));
    assert!(failure.partial.is_none());
}
