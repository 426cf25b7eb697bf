//! `linode_lke_cluster` schema.

use serde_json::json;

use super::{Attribute, Block, ResourceSchema, Validator};

/// Nodes of a pool, as read from the API.
pub(super) fn node_block() -> Block {
    Block::new(vec![
        Attribute::string("id").computed(),
        Attribute::int("instance_id").computed(),
        Attribute::string("status").computed(),
    ])
}

fn pool_block() -> Block {
    Block::new(vec![
        Attribute::int("id").computed(),
        Attribute::string("type").required().describe("Plan type of the nodes."),
        Attribute::int("count")
            .optional_computed()
            .validate(Validator::IntRange(1, 100))
            .describe("Node count; defaults to the autoscaler minimum."),
        Attribute::string_set("tags"),
        Attribute::single(
            "autoscaler",
            Block::new(vec![
                Attribute::int("min").required().validate(Validator::IntRange(1, 100)),
                Attribute::int("max").required().validate(Validator::IntRange(1, 100)),
            ]),
        ),
        Attribute::block("nodes", node_block()).computed(),
    ])
}

/// Schema of the LKE cluster resource.
#[must_use]
pub fn lke_cluster_schema() -> ResourceSchema {
    ResourceSchema {
        type_name: "linode_lke_cluster",
        version: 0,
        description: "A managed Kubernetes cluster and its node pools.",
        block: Block::new(vec![
            Attribute::string("id").computed(),
            Attribute::string("label")
                .required()
                .validate(Validator::LengthBetween(1, 32)),
            Attribute::string("region").required().force_new(),
            Attribute::string("k8s_version").required().force_new(),
            Attribute::string_set("tags"),
            Attribute::single(
                "control_plane",
                Block::new(vec![
                    Attribute::bool("high_availability").default_value(json!(false)),
                ]),
            )
            .optional_computed(),
            Attribute::block("pool", pool_block()).required(),
            Attribute::string("status").computed(),
            Attribute::string("kubeconfig").computed().sensitive(),
            Attribute::string_list("api_endpoints").computed(),
        ]),
    }
}
