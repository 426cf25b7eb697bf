//! Per-operation context: cancellation, deadline and correlation id.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Result, WaitError};

/// Context handed to every callback by the host.
///
/// All sleeps inside an operation go through [`OperationContext::sleep`], so
/// the deadline is the single authority on how long an operation may run.
#[derive(Debug, Clone)]
pub struct OperationContext {
    cancel: CancellationToken,
    started: Instant,
    deadline: Instant,
    operation_id: Uuid,
    label: String,
}

impl OperationContext {
    /// Creates a context with its own cancellation token.
    #[must_use]
    pub fn new(label: impl Into<String>, budget: Duration) -> Self {
        Self::with_cancel(label, budget, CancellationToken::new())
    }

    /// Creates a context bound to an existing cancellation token.
    #[must_use]
    pub fn with_cancel(label: impl Into<String>, budget: Duration, cancel: CancellationToken) -> Self {
        let started = Instant::now();
        Self {
            cancel,
            started,
            deadline: started + budget,
            operation_id: Uuid::new_v4(),
            label: label.into(),
        }
    }

    /// Correlation id for logs.
    #[must_use]
    pub const fn operation_id(&self) -> Uuid {
        self.operation_id
    }

    /// Human readable operation name, e.g. `linode_instance.create`.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The token that cancels this operation.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Time left before the deadline.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Time since the operation started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// True once the host cancelled the operation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fails if the operation was cancelled or its deadline passed.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` or `Timeout` describing `during`.
    pub fn ensure_active(&self, during: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(WaitError::Cancelled {
                during: during.to_string(),
            }
            .into());
        }
        if self.remaining().is_zero() {
            return Err(self.timeout(during, "deadline reached"));
        }
        Ok(())
    }

    /// Sleeps for `delay` unless cancelled first.
    ///
    /// A delay that would run past the deadline fails immediately with a
    /// timeout rather than sleeping out the remaining budget.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` or `Timeout` describing `during`.
    pub async fn sleep(&self, delay: Duration, during: &str, last_observed: &str) -> Result<()> {
        self.ensure_active(during)?;
        if delay >= self.remaining() {
            return Err(self.timeout(during, last_observed));
        }

        tokio::select! {
            () = self.cancel.cancelled() => Err(WaitError::Cancelled {
                during: during.to_string(),
            }
            .into()),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn timeout(&self, condition: &str, last_observed: &str) -> crate::error::ProviderError {
        WaitError::Timeout {
            condition: condition.to_string(),
            last_observed: last_observed.to_string(),
            elapsed_secs: self.elapsed().as_secs(),
        }
        .into()
    }
}
