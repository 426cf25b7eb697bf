//! LKE cluster models.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Result, SchemaError};
use crate::linode::types::{
    LkeAutoscaler, LkeCluster, LkeClusterCreateRequest, LkeControlPlane, LkeNode, LkeNodePool,
    LkeNodePoolCreateRequest,
};

use super::single_block;

/// Typed view of a `linode_lke_cluster` attribute tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct LkeClusterModel {
    /// Remote id as a decimal string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Label.
    pub label: String,
    /// Region.
    pub region: String,
    /// Kubernetes version.
    pub k8s_version: String,
    /// Tags.
    pub tags: Vec<String>,
    /// Control plane settings.
    #[serde(with = "single_block", skip_serializing_if = "Option::is_none")]
    pub control_plane: Option<ControlPlaneModel>,
    /// Node pools in declared order.
    #[validate(nested)]
    pub pool: Vec<PoolModel>,
    /// Readiness.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Base64 kubeconfig.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<String>,
    /// API endpoints.
    pub api_endpoints: Vec<String>,
}

impl LkeClusterModel {
    /// Remote id.
    ///
    /// # Errors
    ///
    /// Returns an error when the id is missing or not numeric.
    pub fn cluster_id(&self) -> Result<u64> {
        parse_cluster_id(self.id.as_deref().unwrap_or_default())
    }
}

/// Control plane block.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ControlPlaneModel {
    /// Highly available control plane.
    pub high_availability: bool,
}

/// One declared node pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_pool_bounds"))]
pub struct PoolModel {
    /// Remote id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Plan type of the nodes.
    #[serde(rename = "type")]
    pub plan_type: String,
    /// Node count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Tags.
    pub tags: Vec<String>,
    /// Autoscaler bounds.
    #[serde(with = "single_block", skip_serializing_if = "Option::is_none")]
    pub autoscaler: Option<AutoscalerModel>,
    /// Nodes, read only.
    pub nodes: Vec<NodeModel>,
}

impl PoolModel {
    /// Declared count, falling back to the autoscaler minimum.
    #[must_use]
    pub fn effective_count(&self) -> Option<u32> {
        self.count.or_else(|| self.autoscaler.map(|a| a.min))
    }

    /// Tags sorted for comparison.
    #[must_use]
    pub fn sorted_tags(&self) -> Vec<String> {
        let mut tags = self.tags.clone();
        tags.sort();
        tags.dedup();
        tags
    }
}

fn validate_pool_bounds(pool: &PoolModel) -> std::result::Result<(), validator::ValidationError> {
    let fail = |message: String| -> std::result::Result<(), validator::ValidationError> {
        let mut err = validator::ValidationError::new("pool_bounds");
        err.message = Some(message.into());
        Err(err)
    };

    let Some(count) = pool.effective_count() else {
        return fail(String::from("count is required without an autoscaler"));
    };
    if count == 0 {
        return fail(String::from("count must be at least 1"));
    }
    if let Some(autoscaler) = pool.autoscaler {
        if autoscaler.min > autoscaler.max {
            return fail(format!(
                "autoscaler min {} exceeds max {}",
                autoscaler.min, autoscaler.max
            ));
        }
        if count < autoscaler.min || count > autoscaler.max {
            return fail(format!(
                "count {count} is outside autoscaler bounds {}..={}",
                autoscaler.min, autoscaler.max
            ));
        }
    }
    Ok(())
}

/// Autoscaler block.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutoscalerModel {
    /// Minimum node count.
    pub min: u32,
    /// Maximum node count.
    pub max: u32,
}

/// One node of a pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NodeModel {
    /// Node id.
    pub id: String,
    /// Backing instance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<u64>,
    /// Readiness.
    pub status: String,
}

impl From<&LkeNode> for NodeModel {
    fn from(node: &LkeNode) -> Self {
        Self {
            id: node.id.clone(),
            instance_id: node.instance_id,
            status: node.status.to_string(),
        }
    }
}

impl From<&LkeNodePool> for PoolModel {
    fn from(pool: &LkeNodePool) -> Self {
        let mut tags = pool.tags.clone();
        tags.sort();
        Self {
            id: Some(pool.id),
            plan_type: pool.plan_type.clone(),
            count: Some(pool.count),
            tags,
            autoscaler: pool.autoscaler.enabled.then_some(AutoscalerModel {
                min: pool.autoscaler.min,
                max: pool.autoscaler.max,
            }),
            nodes: pool.nodes.iter().map(NodeModel::from).collect(),
        }
    }
}

/// Everything Read observes about a cluster.
#[derive(Debug, Clone)]
pub struct ClusterSnapshot {
    /// The cluster.
    pub cluster: LkeCluster,
    /// Its pools.
    pub pools: Vec<LkeNodePool>,
    /// Kubeconfig, unset while provisioning.
    pub kubeconfig: Option<String>,
    /// API endpoint URLs.
    pub api_endpoints: Vec<String>,
}

/// Builds a model from observed state.
///
/// Pools follow the order of `prior`: matched by id first, then by type and
/// count. Unmatched pools are appended in observed order.
#[must_use]
pub fn flatten_cluster(snapshot: &ClusterSnapshot, prior: &LkeClusterModel) -> LkeClusterModel {
    let cluster = &snapshot.cluster;
    let mut remaining: Vec<Option<&LkeNodePool>> = snapshot.pools.iter().map(Some).collect();
    let mut pools = Vec::with_capacity(remaining.len());

    for declared in &prior.pool {
        let by_id = declared.id.and_then(|id| {
            remaining
                .iter()
                .position(|p| p.is_some_and(|p| p.id == id))
        });
        let found = by_id.or_else(|| {
            remaining.iter().position(|p| {
                p.is_some_and(|p| {
                    p.plan_type == declared.plan_type
                        && declared.effective_count().is_none_or(|c| c == p.count)
                })
            })
        });
        if let Some(pool) = found.and_then(|i| remaining[i].take()) {
            pools.push(PoolModel::from(pool));
        }
    }
    pools.extend(remaining.into_iter().flatten().map(PoolModel::from));

    let mut tags = cluster.tags.clone();
    tags.sort();

    LkeClusterModel {
        id: Some(cluster.id.to_string()),
        label: cluster.label.clone(),
        region: cluster.region.clone(),
        k8s_version: cluster.k8s_version.clone(),
        tags,
        control_plane: Some(ControlPlaneModel {
            high_availability: cluster.control_plane.high_availability,
        }),
        pool: pools,
        status: Some(cluster.status.to_string()),
        kubeconfig: snapshot.kubeconfig.clone(),
        api_endpoints: snapshot.api_endpoints.clone(),
    }
}

/// Create request for one pool.
#[must_use]
pub fn expand_pool_request(pool: &PoolModel) -> LkeNodePoolCreateRequest {
    LkeNodePoolCreateRequest {
        count: pool.effective_count().unwrap_or(1),
        plan_type: pool.plan_type.clone(),
        tags: pool.sorted_tags(),
        autoscaler: pool.autoscaler.map(|a| LkeAutoscaler {
            enabled: true,
            min: a.min,
            max: a.max,
        }),
    }
}

/// Create request for a cluster with its initial pools.
#[must_use]
pub fn expand_cluster_create(model: &LkeClusterModel) -> LkeClusterCreateRequest {
    LkeClusterCreateRequest {
        label: model.label.clone(),
        region: model.region.clone(),
        k8s_version: model.k8s_version.clone(),
        tags: model.tags.clone(),
        node_pools: model.pool.iter().map(expand_pool_request).collect(),
        control_plane: model.control_plane.map(|c| LkeControlPlane {
            high_availability: c.high_availability,
        }),
    }
}

/// Parses a cluster id.
///
/// # Errors
///
/// Returns `Invalid` for anything but a positive decimal integer.
pub fn parse_cluster_id(raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| {
            SchemaError::Invalid {
                path: String::from("id"),
                message: format!("'{raw}' is not a valid cluster id"),
            }
            .into()
        })
}
