//! LKE cluster planning and node pool reconciliation.
//!
//! Pools are listed positionally while the API addresses them by id. Pools
//! whose id survived and whose type is unchanged are updated in place; the
//! rest are matched by shape `(type, count, tags)`. Creations always run
//! before deletions so the cluster never loses its last pool.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::debug;
use validator::Validate;

use crate::error::{PlanError, Result};
use crate::flatten::{LkeClusterModel, PoolModel, expand_pool_request};
use crate::linode::types::{
    LkeAutoscaler, LkeClusterUpdateRequest, LkeControlPlane, LkeNodePoolCreateRequest,
    LkeNodePoolUpdateRequest,
};

/// Matching key for pools without a stable id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolShape {
    /// Plan type.
    pub plan_type: String,
    /// Node count.
    pub count: u32,
    /// Sorted tags.
    pub tags: Vec<String>,
}

impl PoolShape {
    /// Shape of a pool.
    #[must_use]
    pub fn of(pool: &PoolModel) -> Self {
        Self {
            plan_type: pool.plan_type.clone(),
            count: pool.effective_count().unwrap_or(0),
            tags: pool.sorted_tags(),
        }
    }
}

impl std::fmt::Display for PoolShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} x{}", self.plan_type, self.count)?;
        if !self.tags.is_empty() {
            write!(f, " [{}]", self.tags.join(","))?;
        }
        Ok(())
    }
}

/// Pool calls in execution order: updates, creations, deletions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReconciliation {
    /// In-place updates by pool id.
    pub update: Vec<(u64, LkeNodePoolUpdateRequest)>,
    /// New pools.
    pub create: Vec<LkeNodePoolCreateRequest>,
    /// Pool ids to delete.
    pub delete: Vec<u64>,
}

impl PoolReconciliation {
    /// True when no pool changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.update.is_empty() && self.create.is_empty() && self.delete.is_empty()
    }
}

/// Cluster update plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterUpdatePlan {
    /// Label, tags and control plane changes.
    pub cluster: Option<LkeClusterUpdateRequest>,
    /// Pool changes.
    pub pools: PoolReconciliation,
}

impl ClusterUpdatePlan {
    /// True when the update issues no writes.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.cluster.is_none() && self.pools.is_empty()
    }
}

/// Checks the declared pools.
///
/// # Errors
///
/// Returns `NoNodePools` for an empty list and `InvalidPool` for bounds
/// problems.
pub fn validate_pools(pools: &[PoolModel]) -> Result<()> {
    if pools.is_empty() {
        return Err(PlanError::NoNodePools.into());
    }
    for (index, pool) in pools.iter().enumerate() {
        if pool.plan_type.is_empty() {
            return Err(PlanError::InvalidPool {
                index,
                message: String::from("type is required"),
            }
            .into());
        }
        if let Err(errors) = pool.validate() {
            return Err(PlanError::InvalidPool {
                index,
                message: errors.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

/// Plans the pool calls turning `current` into `desired`.
///
/// # Errors
///
/// Returns a validation error for the declared pools.
pub fn plan_pools(current: &[PoolModel], desired: &[PoolModel]) -> Result<PoolReconciliation> {
    validate_pools(desired)?;

    let mut plan = PoolReconciliation::default();
    let mut remaining: Vec<Option<&PoolModel>> = current.iter().map(Some).collect();
    let mut unmatched = Vec::new();

    for pool in desired {
        let paired = pool.id.and_then(|id| {
            remaining.iter_mut().find(|slot| {
                slot.is_some_and(|c| c.id == Some(id) && c.plan_type == pool.plan_type)
            })
        });
        match paired.and_then(Option::take) {
            Some(existing) => {
                if let (Some(id), Some(update)) = (existing.id, pool_update(existing, pool)) {
                    plan.update.push((id, update));
                }
            }
            None => unmatched.push(pool),
        }
    }

    let mut have: BTreeMap<PoolShape, Vec<u64>> = BTreeMap::new();
    for pool in remaining.into_iter().flatten() {
        if let Some(id) = pool.id {
            have.entry(PoolShape::of(pool)).or_default().push(id);
        }
    }
    let mut want: BTreeMap<PoolShape, Vec<&PoolModel>> = BTreeMap::new();
    for pool in unmatched {
        want.entry(PoolShape::of(pool)).or_default().push(pool);
    }

    for (shape, pools) in &want {
        let ids = have.remove(shape).unwrap_or_default();
        match pools.len().cmp(&ids.len()) {
            Ordering::Greater => {
                debug!("Creating {} pool(s) of shape {shape}", pools.len() - ids.len());
                plan.create
                    .extend(pools[ids.len()..].iter().map(|p| expand_pool_request(p)));
            }
            Ordering::Less => {
                let surplus = ids.len() - pools.len();
                debug!("Deleting {surplus} pool(s) of shape {shape}");
                plan.delete.extend(ids.into_iter().take(surplus));
            }
            Ordering::Equal => {}
        }
    }
    for (shape, ids) in have {
        debug!("Deleting {} pool(s) of shape {shape}", ids.len());
        plan.delete.extend(ids);
    }

    Ok(plan)
}

fn pool_update(existing: &PoolModel, desired: &PoolModel) -> Option<LkeNodePoolUpdateRequest> {
    let count = desired
        .effective_count()
        .filter(|c| existing.count != Some(*c));
    let tags = Some(desired.sorted_tags()).filter(|t| *t != existing.sorted_tags());
    let autoscaler = (existing.autoscaler != desired.autoscaler).then(|| {
        desired.autoscaler.map_or(
            LkeAutoscaler {
                enabled: false,
                min: 0,
                max: 0,
            },
            |a| LkeAutoscaler {
                enabled: true,
                min: a.min,
                max: a.max,
            },
        )
    });

    let update = LkeNodePoolUpdateRequest {
        count,
        tags,
        autoscaler,
    };
    (update.count.is_some() || update.tags.is_some() || update.autoscaler.is_some())
        .then_some(update)
}

/// Plans a cluster update.
///
/// # Errors
///
/// Returns an error for a region or version change, which need replacement,
/// and for invalid pools.
pub fn plan_cluster_update(prior: &LkeClusterModel, desired: &LkeClusterModel) -> Result<ClusterUpdatePlan> {
    if prior.region != desired.region {
        return Err(PlanError::RegionChange {
            from: prior.region.clone(),
            to: desired.region.clone(),
        }
        .into());
    }
    if prior.k8s_version != desired.k8s_version {
        return Err(PlanError::Invalid {
            path: String::from("k8s_version"),
            message: format!(
                "changing from {} to {} requires replacing the cluster",
                prior.k8s_version, desired.k8s_version
            ),
        }
        .into());
    }

    let mut prior_tags = prior.tags.clone();
    prior_tags.sort();
    let mut desired_tags = desired.tags.clone();
    desired_tags.sort();

    let request = LkeClusterUpdateRequest {
        label: (prior.label != desired.label).then(|| desired.label.clone()),
        tags: (prior_tags != desired_tags).then_some(desired_tags),
        control_plane: desired
            .control_plane
            .filter(|c| prior.control_plane.unwrap_or_default() != *c)
            .map(|c| LkeControlPlane {
                high_availability: c.high_availability,
            }),
    };

    Ok(ClusterUpdatePlan {
        cluster: (!request.is_empty()).then_some(request),
        pools: plan_pools(&prior.pool, &desired.pool)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::AutoscalerModel;

    fn pool(id: Option<u64>, plan_type: &str, count: u32) -> PoolModel {
        PoolModel {
            id,
            plan_type: plan_type.to_string(),
            count: Some(count),
            ..PoolModel::default()
        }
    }

    #[test]
    fn test_shape_change_creates_before_deleting() {
        let current = vec![
            pool(Some(1), "g6-standard-2", 3),
            pool(Some(2), "g6-standard-2", 3),
        ];
        // Ids are merged from state by position.
        let desired = vec![
            pool(Some(1), "g6-standard-2", 3),
            pool(Some(2), "g6-standard-4", 2),
        ];

        let plan = plan_pools(&current, &desired).unwrap();
        assert!(plan.update.is_empty());
        assert_eq!(plan.create.len(), 1);
        assert_eq!(plan.create[0].plan_type, "g6-standard-4");
        assert_eq!(plan.create[0].count, 2);
        assert_eq!(plan.delete, vec![2]);
    }

    #[test]
    fn test_shape_matching_without_ids() {
        let current = vec![
            pool(Some(1), "g6-standard-2", 3),
            pool(Some(2), "g6-standard-2", 3),
            pool(Some(3), "g6-standard-1", 1),
        ];
        let desired = vec![pool(None, "g6-standard-2", 3), pool(None, "g6-standard-4", 2)];

        let plan = plan_pools(&current, &desired).unwrap();
        assert_eq!(plan.create.len(), 1);
        assert_eq!(plan.delete, vec![1, 3]);
    }

    #[test]
    fn test_count_change_updates_in_place() {
        let current = vec![pool(Some(1), "g6-standard-2", 3)];
        let desired = vec![pool(Some(1), "g6-standard-2", 5)];
        let plan = plan_pools(&current, &desired).unwrap();
        assert_eq!(plan.update.len(), 1);
        assert_eq!(plan.update[0].1.count, Some(5));
        assert!(plan.create.is_empty());
        assert!(plan.delete.is_empty());
    }

    #[test]
    fn test_autoscaler_enable_is_an_update() {
        let current = vec![pool(Some(1), "g6-standard-2", 3)];
        let desired = vec![PoolModel {
            autoscaler: Some(AutoscalerModel { min: 2, max: 6 }),
            ..pool(Some(1), "g6-standard-2", 3)
        }];
        let plan = plan_pools(&current, &desired).unwrap();
        let autoscaler = plan.update[0].1.autoscaler.unwrap();
        assert!(autoscaler.enabled);
        assert_eq!(autoscaler.max, 6);
    }

    #[test]
    fn test_unchanged_pools_plan_nothing() {
        let current = vec![pool(Some(1), "g6-standard-2", 3), pool(Some(2), "g6-standard-4", 1)];
        let plan = plan_pools(&current, &current).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_pool_validation() {
        assert!(matches!(
            plan_pools(&[], &[]).unwrap_err(),
            crate::error::ProviderError::Plan(PlanError::NoNodePools)
        ));

        let bad = vec![
            pool(None, "g6-standard-2", 1),
            PoolModel {
                autoscaler: Some(AutoscalerModel { min: 1, max: 2 }),
                ..pool(None, "g6-standard-2", 5)
            },
        ];
        assert!(matches!(
            plan_pools(&[], &bad).unwrap_err(),
            crate::error::ProviderError::Plan(PlanError::InvalidPool { index: 1, .. })
        ));
    }

    #[test]
    fn test_cluster_update_batches_label_and_tags() {
        let prior = LkeClusterModel {
            label: "prod".to_string(),
            region: "us-central".to_string(),
            k8s_version: "1.29".to_string(),
            pool: vec![pool(Some(1), "g6-standard-2", 3)],
            ..LkeClusterModel::default()
        };
        let desired = LkeClusterModel {
            label: "prod-2".to_string(),
            tags: vec!["team".to_string()],
            ..prior.clone()
        };
        let plan = plan_cluster_update(&prior, &desired).unwrap();
        let request = plan.cluster.unwrap();
        assert_eq!(request.label.as_deref(), Some("prod-2"));
        assert_eq!(request.tags, Some(vec!["team".to_string()]));
        assert!(plan.pools.is_empty());

        let moved = LkeClusterModel {
            k8s_version: "1.30".to_string(),
            ..prior.clone()
        };
        assert!(plan_cluster_update(&prior, &moved).is_err());
        assert!(plan_cluster_update(&prior, &prior).unwrap().is_noop());
    }
}
