//! Reconciliation cores.
//!
//! Each reconciler drives the Linode API from a typed model towards the
//! declared state and reads the result back. Errors raised after remote
//! work has started carry the partial state observed at that point.

mod datasources;
mod instance;
mod lke;

pub use datasources::{INSTANCE_FILTER_FIELDS, InstancesQuery, read_instances, read_lke_cluster};
pub use instance::{InstanceReconciler, random_root_password};
pub use lke::LkeReconciler;

use crate::error::ProviderError;

/// A failed operation together with the state that exists remotely.
#[derive(Debug)]
pub struct PartialFailure<M> {
    /// What went wrong.
    pub error: ProviderError,
    /// State observed after the failure, if the resource exists.
    pub partial: Option<M>,
}

impl<M> PartialFailure<M> {
    /// Wraps an error with the partial state.
    #[must_use]
    pub const fn new(error: ProviderError, partial: Option<M>) -> Self {
        Self { error, partial }
    }
}

impl<M> From<ProviderError> for PartialFailure<M> {
    fn from(error: ProviderError) -> Self {
        Self {
            error,
            partial: None,
        }
    }
}

impl<M> std::fmt::Display for PartialFailure<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)?;
        if self.partial.is_some() {
            write!(f, " (partial state kept)")?;
        }
        Ok(())
    }
}

/// Result of an operation that may leave partial state behind.
pub type Reconciled<M> = std::result::Result<M, PartialFailure<M>>;
