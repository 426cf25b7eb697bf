//! LKE cluster reconciliation.

use tracing::{debug, info, warn};

use crate::config::ProviderConfig;
use crate::error::{ApiError, ProviderError, Result};
use crate::flatten::{
    ClusterSnapshot, LkeClusterModel, expand_cluster_create, flatten_cluster, parse_cluster_id,
};
use crate::linode::types::{LkeNodePool, LkeStatus};
use crate::linode::{ApiSession, Probe, wait_until};
use crate::planner::{plan_cluster_update, validate_pools};

use super::{PartialFailure, Reconciled};

/// Status the API answers the kubeconfig endpoint with while provisioning.
const KUBECONFIG_PENDING_STATUS: u16 = 503;

/// Counts nodes that are not ready yet.
fn pending_nodes(pools: &[LkeNodePool]) -> usize {
    pools
        .iter()
        .flat_map(|pool| &pool.nodes)
        .filter(|node| node.status != LkeStatus::Ready)
        .count()
}

/// Reconciler for one `linode_lke_cluster` operation.
#[derive(Debug, Clone, Copy)]
pub struct LkeReconciler<'a> {
    session: ApiSession<'a>,
    config: &'a ProviderConfig,
}

impl<'a> LkeReconciler<'a> {
    /// Creates a reconciler bound to an operation session.
    #[must_use]
    pub const fn new(session: ApiSession<'a>, config: &'a ProviderConfig) -> Self {
        Self { session, config }
    }

    /// Creates the cluster and waits for every node to become ready.
    ///
    /// # Errors
    ///
    /// Fails before any write when the pools are invalid. Later failures
    /// carry the state read back at that point.
    pub async fn create(&self, desired: &LkeClusterModel) -> Reconciled<LkeClusterModel> {
        validate_pools(&desired.pool)?;
        let request = expand_cluster_create(desired);
        let cluster = self.session.create_lke_cluster(&request).await?;
        let id = cluster.id;
        info!("LKE cluster {id} created, waiting for nodes");

        if let Err(error) = self.wait_for_nodes_ready(id).await {
            return Err(self.partial(id, desired, error).await);
        }
        self.read_back(id, desired).await
    }

    /// Reads the cluster; `None` when it no longer exists.
    ///
    /// # Errors
    ///
    /// Returns API errors other than 404 on the cluster itself.
    pub async fn read(&self, id: u64, prior: &LkeClusterModel) -> Result<Option<LkeClusterModel>> {
        let cluster = match self.session.get_lke_cluster(id).await {
            Ok(cluster) => cluster,
            Err(e) if e.is_not_found() => {
                info!("LKE cluster {id} is gone");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let (pools, endpoints, kubeconfig) = tokio::try_join!(
            self.session.list_lke_pools(id),
            self.session.list_lke_api_endpoints(id),
            self.kubeconfig(id),
        )?;

        let snapshot = ClusterSnapshot {
            cluster,
            pools,
            kubeconfig,
            api_endpoints: endpoints.into_iter().map(|e| e.endpoint).collect(),
        };
        Ok(Some(flatten_cluster(&snapshot, prior)))
    }

    async fn kubeconfig(&self, id: u64) -> Result<Option<String>> {
        match self.session.get_lke_kubeconfig(id).await {
            Ok(config) => Ok(Some(config.kubeconfig)),
            Err(ProviderError::Api(ApiError::Server { status, .. }))
                if status == KUBECONFIG_PENDING_STATUS =>
            {
                debug!("Kubeconfig of LKE cluster {id} is not available yet");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Imports a cluster by id.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` for a malformed id and `NotFound` when no cluster
    /// has it.
    pub async fn import(&self, raw_id: &str) -> Result<LkeClusterModel> {
        let id = parse_cluster_id(raw_id)?;
        info!("Importing LKE cluster {id}");
        self.read(id, &LkeClusterModel::default())
            .await?
            .ok_or_else(|| {
                ApiError::NotFound {
                    path: format!("/lke/clusters/{id}"),
                }
                .into()
            })
    }

    /// Applies metadata and pool changes.
    ///
    /// # Errors
    ///
    /// Region and version changes are refused before any write. Later
    /// failures carry the state read back after the failure.
    pub async fn update(&self, prior: &LkeClusterModel, desired: &LkeClusterModel) -> Reconciled<LkeClusterModel> {
        let id = prior.cluster_id()?;
        let plan = plan_cluster_update(prior, desired)?;
        if plan.is_noop() {
            debug!("LKE cluster {id} is up to date");
            return Ok(desired.clone());
        }

        let applied = async {
            if let Some(request) = &plan.cluster {
                self.session.update_lke_cluster(id, request).await?;
            }
            for (pool_id, request) in &plan.pools.update {
                self.session.update_lke_pool(id, *pool_id, request).await?;
            }
            for request in &plan.pools.create {
                self.session.create_lke_pool(id, request).await?;
            }
            for pool_id in &plan.pools.delete {
                self.session.delete_lke_pool(id, *pool_id).await?;
            }
            if !plan.pools.is_empty() {
                self.wait_for_nodes_ready(id).await?;
            }
            Ok::<_, ProviderError>(())
        }
        .await;

        if let Err(error) = applied {
            return Err(self.partial(id, desired, error).await);
        }
        self.read_back(id, desired).await
    }

    /// Deletes the cluster and waits until the API no longer returns it.
    ///
    /// # Errors
    ///
    /// Returns API errors other than 404, or a poll failure.
    pub async fn delete(&self, prior: &LkeClusterModel) -> Result<()> {
        let id = prior.cluster_id()?;
        match self.session.delete_lke_cluster(id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!("LKE cluster {id} was already deleted");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let session = self.session;
        wait_until(
            session.context(),
            self.config.lke_event_poll_interval(),
            &format!("LKE cluster {id} deleted"),
            move || async move {
                match session.get_lke_cluster(id).await {
                    Ok(cluster) => Ok(Probe::Pending(cluster.status.to_string())),
                    Err(e) if e.is_not_found() => Ok(Probe::Ready(())),
                    Err(e) => Err(e),
                }
            },
        )
        .await?;
        info!("LKE cluster {id} deleted");
        Ok(())
    }

    async fn wait_for_nodes_ready(&self, id: u64) -> Result<()> {
        let session = self.session;
        wait_until(
            session.context(),
            self.config.lke_node_ready_poll_interval(),
            &format!("LKE cluster {id} nodes ready"),
            move || async move {
                let pools = session.list_lke_pools(id).await?;
                let pending = pending_nodes(&pools);
                let total: usize = pools.iter().map(|p| p.nodes.len()).sum();
                let expected: usize = pools.iter().map(|p| p.count as usize).sum();
                if pending == 0 && total >= expected {
                    Ok(Probe::Ready(()))
                } else {
                    Ok(Probe::Pending(format!(
                        "{} of {expected} node(s) ready",
                        total - pending
                    )))
                }
            },
        )
        .await
    }

    async fn read_back(&self, id: u64, desired: &LkeClusterModel) -> Reconciled<LkeClusterModel> {
        match self.read(id, desired).await {
            Ok(Some(model)) => Ok(model),
            Ok(None) => Err(PartialFailure::new(
                ApiError::NotFound {
                    path: format!("/lke/clusters/{id}"),
                }
                .into(),
                None,
            )),
            Err(error) => Err(self.partial(id, desired, error).await),
        }
    }

    async fn partial(
        &self,
        id: u64,
        desired: &LkeClusterModel,
        error: ProviderError,
    ) -> PartialFailure<LkeClusterModel> {
        warn!("LKE cluster {id} operation failed: {error}");
        let partial = match self.read(id, desired).await {
            Ok(model) => model,
            Err(_) => Some(LkeClusterModel {
                id: Some(id.to_string()),
                ..desired.clone()
            }),
        };
        PartialFailure::new(error, partial)
    }
}
