//! Planning module for reconciliation.
//!
//! This module compares stored and planned states and classifies the
//! differences into ordered API steps. Nothing here performs I/O.

mod diff;
mod instance;
mod lke;

pub use diff::{DiffDetail, DiffEngine, DiffType, ResourceDiff};
pub use instance::{
    ConfigChanges, DiskChanges, DiskResize, ExtraIpChanges, InstanceUpdatePlan, PowerAction,
    RebootReason, ResizeStep, TypeChange, plan_instance_update, validate_instance,
};
pub use lke::{
    ClusterUpdatePlan, PoolReconciliation, PoolShape, plan_cluster_update, plan_pools,
    validate_pools,
};
