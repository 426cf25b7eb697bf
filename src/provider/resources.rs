//! Resource and data source handlers backed by the reconcilers.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::Timeouts;
use crate::error::{PlanError, Result, SchemaError};
use crate::flatten::{self, InstanceModel, LkeClusterModel};
use crate::planner::{validate_instance, validate_pools};
use crate::reconciler::{
    InstanceReconciler, InstancesQuery, LkeReconciler, PartialFailure, Reconciled, read_instances,
    read_lke_cluster,
};
use crate::schema::{
    ResourceSchema, instance_schema, instances_data_source_schema, lke_cluster_data_source_schema,
    lke_cluster_schema,
};

use super::{Applied, DataSourceHandler, Diagnostic, Failure, OperationContext, ProviderMeta, ResourceHandler};

fn encode<M: Serialize>(result: Reconciled<M>) -> Applied {
    match result {
        Ok(model) => Ok(flatten::flatten(&model)?),
        Err(PartialFailure { error, partial }) => {
            let state = partial.and_then(|model| flatten::flatten(&model).ok());
            Err(Failure::with_state(error, state))
        }
    }
}

fn encode_read<M: Serialize>(model: Option<M>) -> Result<Option<Value>> {
    model.map(|m| flatten::flatten(&m)).transpose()
}

/// Clears computed attributes so the host treats them as unknown.
fn mark_unknown(planned: &mut Value, keys: &[&str]) {
    if let Some(map) = planned.as_object_mut() {
        for key in keys {
            map.remove(*key);
        }
    }
}

// ---------------------------------------------------------------------------
// linode_instance
// ---------------------------------------------------------------------------

/// The `linode_instance` resource.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstanceResource;

#[async_trait]
impl ResourceHandler for InstanceResource {
    fn schema(&self) -> ResourceSchema {
        instance_schema()
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::INSTANCE
    }

    async fn create(&self, meta: &ProviderMeta, ctx: &OperationContext, config: &Value) -> Applied {
        let desired: InstanceModel = flatten::expand(config, "")?;
        let reconciler = InstanceReconciler::new(meta.client.session(ctx), &meta.config);
        encode(reconciler.create(&desired).await)
    }

    async fn read(&self, meta: &ProviderMeta, ctx: &OperationContext, prior: &Value) -> Result<Option<Value>> {
        let prior: InstanceModel = flatten::expand(prior, "")?;
        let id = prior.instance_id()?;
        let reconciler = InstanceReconciler::new(meta.client.session(ctx), &meta.config);
        encode_read(reconciler.read(id, &prior).await?)
    }

    async fn update(
        &self,
        meta: &ProviderMeta,
        ctx: &OperationContext,
        prior: &Value,
        planned: &Value,
    ) -> Applied {
        let prior: InstanceModel = flatten::expand(prior, "")?;
        let desired: InstanceModel = flatten::expand(planned, "")?;
        let reconciler = InstanceReconciler::new(meta.client.session(ctx), &meta.config);
        encode(reconciler.update(&prior, &desired).await)
    }

    async fn delete(&self, meta: &ProviderMeta, ctx: &OperationContext, prior: &Value) -> Result<()> {
        let prior: InstanceModel = flatten::expand(prior, "")?;
        InstanceReconciler::new(meta.client.session(ctx), &meta.config)
            .delete(&prior)
            .await
    }

    async fn import(&self, meta: &ProviderMeta, ctx: &OperationContext, id: &str) -> Result<Value> {
        let model = InstanceReconciler::new(meta.client.session(ctx), &meta.config)
            .import(id)
            .await?;
        flatten::flatten(&model)
    }

    fn customize_diff(&self, prior: &Value, planned: &mut Value) -> Result<Vec<Diagnostic>> {
        let desired: InstanceModel = flatten::expand(planned, "")?;
        validate_instance(&desired)?;

        if prior.is_null() {
            return Ok(Vec::new());
        }
        if prior.get("private_ip") == Some(&json!(true)) && planned.get("private_ip") == Some(&json!(false)) {
            return Err(PlanError::PrivateIpDisable.into());
        }

        let mut diagnostics = Vec::new();
        if prior.get("type") != planned.get("type") {
            debug!("Plan type changes; addresses and specs will be recomputed");
            mark_unknown(planned, &["ipv4", "status", "specs"]);
            if !desired.is_explicit() && !desired.disk_expansion {
                diagnostics.push(
                    Diagnostic::warning(
                        "Disks keep their size",
                        "disk_expansion is off, so the new plan's extra storage stays unallocated",
                    )
                    .with_path("disk_expansion"),
                );
            }
        }
        Ok(diagnostics)
    }
}

// ---------------------------------------------------------------------------
// linode_lke_cluster
// ---------------------------------------------------------------------------

/// The `linode_lke_cluster` resource.
#[derive(Debug, Default, Clone, Copy)]
pub struct LkeClusterResource;

#[async_trait]
impl ResourceHandler for LkeClusterResource {
    fn schema(&self) -> ResourceSchema {
        lke_cluster_schema()
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::LKE_CLUSTER
    }

    async fn create(&self, meta: &ProviderMeta, ctx: &OperationContext, config: &Value) -> Applied {
        let desired: LkeClusterModel = flatten::expand(config, "")?;
        let reconciler = LkeReconciler::new(meta.client.session(ctx), &meta.config);
        encode(reconciler.create(&desired).await)
    }

    async fn read(&self, meta: &ProviderMeta, ctx: &OperationContext, prior: &Value) -> Result<Option<Value>> {
        let prior: LkeClusterModel = flatten::expand(prior, "")?;
        let id = prior.cluster_id()?;
        let reconciler = LkeReconciler::new(meta.client.session(ctx), &meta.config);
        encode_read(reconciler.read(id, &prior).await?)
    }

    async fn update(
        &self,
        meta: &ProviderMeta,
        ctx: &OperationContext,
        prior: &Value,
        planned: &Value,
    ) -> Applied {
        let prior: LkeClusterModel = flatten::expand(prior, "")?;
        let desired: LkeClusterModel = flatten::expand(planned, "")?;
        let reconciler = LkeReconciler::new(meta.client.session(ctx), &meta.config);
        encode(reconciler.update(&prior, &desired).await)
    }

    async fn delete(&self, meta: &ProviderMeta, ctx: &OperationContext, prior: &Value) -> Result<()> {
        let prior: LkeClusterModel = flatten::expand(prior, "")?;
        LkeReconciler::new(meta.client.session(ctx), &meta.config)
            .delete(&prior)
            .await
    }

    async fn import(&self, meta: &ProviderMeta, ctx: &OperationContext, id: &str) -> Result<Value> {
        let model = LkeReconciler::new(meta.client.session(ctx), &meta.config)
            .import(id)
            .await?;
        flatten::flatten(&model)
    }

    fn customize_diff(&self, prior: &Value, planned: &mut Value) -> Result<Vec<Diagnostic>> {
        let desired: LkeClusterModel = flatten::expand(planned, "")?;
        validate_pools(&desired.pool)?;

        if prior.is_null() {
            return Ok(Vec::new());
        }
        let before = prior.get("pool").and_then(Value::as_array);
        let Some(pools) = planned.get_mut("pool").and_then(Value::as_array_mut) else {
            return Ok(Vec::new());
        };
        for (index, pool) in pools.iter_mut().enumerate() {
            let previous = before.and_then(|b| b.get(index));
            let same_shape = previous.is_some_and(|p| {
                p.get("type") == pool.get("type") && p.get("count") == pool.get("count")
            });
            if !same_shape {
                mark_unknown(pool, &["nodes", "id"]);
            }
        }
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Data sources
// ---------------------------------------------------------------------------

/// The `linode_instances` data source.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstancesDataSource;

#[async_trait]
impl DataSourceHandler for InstancesDataSource {
    fn schema(&self) -> ResourceSchema {
        instances_data_source_schema()
    }

    async fn read(&self, meta: &ProviderMeta, ctx: &OperationContext, config: &Value) -> Result<Value> {
        let query: InstancesQuery = flatten::expand(config, "")?;
        read_instances(meta.client.session(ctx), &query).await
    }
}

/// The `linode_lke_cluster` data source.
#[derive(Debug, Default, Clone, Copy)]
pub struct LkeClusterDataSource;

#[async_trait]
impl DataSourceHandler for LkeClusterDataSource {
    fn schema(&self) -> ResourceSchema {
        lke_cluster_data_source_schema()
    }

    async fn read(&self, meta: &ProviderMeta, ctx: &OperationContext, config: &Value) -> Result<Value> {
        let id = config
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| SchemaError::Missing {
                path: "id".to_string(),
            })?;
        read_lke_cluster(meta.client.session(ctx), &meta.config, id).await
    }
}
