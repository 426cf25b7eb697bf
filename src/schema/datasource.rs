//! Data source schemas.

use serde_json::json;

use super::lke::node_block;
use super::{Attribute, Block, ResourceSchema, Validator};

fn filter_block() -> Block {
    Block::new(vec![
        Attribute::string("name").required(),
        Attribute::string_list("values").required(),
        Attribute::string("match_by")
            .default_value(json!("exact"))
            .validate(Validator::OneOf(&["exact", "substring", "sub"])),
    ])
}

fn instance_view() -> Block {
    Block::new(vec![
        Attribute::int("id").computed(),
        Attribute::string("label").computed(),
        Attribute::string("group").computed(),
        Attribute::string("region").computed(),
        Attribute::string("type").computed(),
        Attribute::string("image").computed(),
        Attribute::string("status").computed(),
        Attribute::string("ip_address").computed(),
        Attribute::string("private_ip_address").computed(),
        Attribute::string_set("ipv4").computed(),
        Attribute::string("ipv6").computed(),
        Attribute::string_set("tags").computed(),
        Attribute::bool("watchdog_enabled").computed(),
        Attribute::single(
            "specs",
            Block::new(vec![
                Attribute::int("disk").computed(),
                Attribute::int("memory").computed(),
                Attribute::int("vcpus").computed(),
                Attribute::int("transfer").computed(),
            ]),
        )
        .computed(),
        Attribute::single(
            "alerts",
            Block::new(vec![
                Attribute::int("cpu").computed(),
                Attribute::int("network_in").computed(),
                Attribute::int("network_out").computed(),
                Attribute::int("transfer_quota").computed(),
                Attribute::int("io").computed(),
            ]),
        )
        .computed(),
        Attribute::single(
            "backups",
            Block::new(vec![
                Attribute::bool("enabled").computed(),
                Attribute::single(
                    "schedule",
                    Block::new(vec![
                        Attribute::string("day").computed(),
                        Attribute::string("window").computed(),
                    ]),
                )
                .computed(),
            ]),
        )
        .computed(),
    ])
}

/// Schema of the `linode_instances` data source.
#[must_use]
pub fn instances_data_source_schema() -> ResourceSchema {
    ResourceSchema {
        type_name: "linode_instances",
        version: 0,
        description: "Instances matching a set of filters.",
        block: Block::new(vec![
            Attribute::string("id").computed(),
            Attribute::block("filter", filter_block()),
            Attribute::string("order_by"),
            Attribute::string("order")
                .default_value(json!("asc"))
                .validate(Validator::OneOf(&["asc", "desc"])),
            Attribute::block("instances", instance_view()).computed(),
        ]),
    }
}

/// Schema of the `linode_lke_cluster` data source.
#[must_use]
pub fn lke_cluster_data_source_schema() -> ResourceSchema {
    ResourceSchema {
        type_name: "linode_lke_cluster",
        version: 0,
        description: "Read-only view of an LKE cluster.",
        block: Block::new(vec![
            Attribute::int("id").required(),
            Attribute::string("label").computed(),
            Attribute::string("region").computed(),
            Attribute::string("k8s_version").computed(),
            Attribute::string_set("tags").computed(),
            Attribute::string("status").computed(),
            Attribute::string("kubeconfig").computed().sensitive(),
            Attribute::string_list("api_endpoints").computed(),
            Attribute::single(
                "control_plane",
                Block::new(vec![Attribute::bool("high_availability").computed()]),
            )
            .computed(),
            Attribute::block(
                "pools",
                Block::new(vec![
                    Attribute::int("id").computed(),
                    Attribute::string("type").computed(),
                    Attribute::int("count").computed(),
                    Attribute::string_set("tags").computed(),
                    Attribute::single(
                        "autoscaler",
                        Block::new(vec![
                            Attribute::bool("enabled").computed(),
                            Attribute::int("min").computed(),
                            Attribute::int("max").computed(),
                        ]),
                    )
                    .computed(),
                    Attribute::block("nodes", node_block()).computed(),
                ]),
            )
            .computed(),
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_block_validates_match_by() {
        let schema = instances_data_source_schema();
        let ok = json!({"filter": [{"name": "label", "values": ["web"], "match_by": "substring"}]});
        assert!(schema.validate(&ok).is_ok());

        let bad = json!({"filter": [{"name": "label", "values": ["web"], "match_by": "regex"}]});
        assert!(schema.validate(&bad).is_err());
    }

    #[test]
    fn test_lke_data_source_requires_id() {
        assert!(lke_cluster_data_source_schema().validate(&json!({})).is_err());
        assert!(lke_cluster_data_source_schema().validate(&json!({"id": 12})).is_ok());
    }
}
