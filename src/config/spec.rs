//! Provider configuration types.
//!
//! These structs map to the provider configuration file and to the
//! `configure` request sent by the host. Every field has a default so a
//! configuration may be as small as a single `token`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::error::RetryPolicy;

/// Production API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.linode.com";

/// Default API version segment.
pub const DEFAULT_API_VERSION: &str = "v4";

/// Default credential profile.
pub const DEFAULT_PROFILE: &str = "default";

/// Root provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_retry_bounds"))]
pub struct ProviderConfig {
    /// Bearer token for the API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Base API URL without the version segment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// API version segment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Extra text prepended to the User-Agent header.
    pub ua_prefix: String,

    /// Credential file location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<PathBuf>,

    /// Credential file profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_profile: Option<String>,

    /// Return from instance create/boot without waiting for `running`.
    pub skip_instance_ready_poll: bool,

    /// Return from instance delete without waiting for the delete event.
    pub skip_instance_delete_poll: bool,

    /// Do not reboot after config-only updates.
    pub skip_implicit_reboots: bool,

    /// Disable the catalog response cache.
    pub disable_internal_cache: bool,

    /// Backoff floor for transient retries, in milliseconds.
    #[validate(range(min = 1))]
    pub min_retry_delay_ms: u64,

    /// Backoff ceiling for transient retries, in milliseconds.
    #[validate(range(min = 1))]
    pub max_retry_delay_ms: u64,

    /// Attempts allowed for transient failures.
    #[validate(range(min = 1, max = 100))]
    pub max_retry_attempts: u32,

    /// Event poll interval for instance work, in milliseconds.
    #[validate(range(min = 1))]
    pub event_poll_ms: u64,

    /// Event poll interval for LKE work, in milliseconds.
    #[validate(range(min = 1))]
    pub lke_event_poll_ms: u64,

    /// Node readiness poll interval for LKE work, in milliseconds.
    #[validate(range(min = 1))]
    pub lke_node_ready_poll_ms: u64,

    /// Per-request HTTP timeout, in seconds.
    #[validate(range(min = 1, max = 600))]
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            token: None,
            url: None,
            api_version: None,
            ua_prefix: String::new(),
            config_path: None,
            config_profile: None,
            skip_instance_ready_poll: false,
            skip_instance_delete_poll: false,
            skip_implicit_reboots: false,
            disable_internal_cache: false,
            min_retry_delay_ms: 1000,
            max_retry_delay_ms: 30_000,
            max_retry_attempts: 8,
            event_poll_ms: 4000,
            lke_event_poll_ms: 3000,
            lke_node_ready_poll_ms: 3000,
            request_timeout_secs: 60,
        }
    }
}

fn validate_retry_bounds(config: &ProviderConfig) -> Result<(), validator::ValidationError> {
    if config.min_retry_delay_ms > config.max_retry_delay_ms {
        let mut err = validator::ValidationError::new("retry_bounds");
        err.message = Some("min_retry_delay_ms must not exceed max_retry_delay_ms".into());
        return Err(err);
    }
    Ok(())
}

impl ProviderConfig {
    /// Base URL including the version segment, without a trailing slash.
    #[must_use]
    pub fn api_base(&self) -> String {
        let url = self.url.as_deref().unwrap_or(DEFAULT_API_URL).trim_end_matches('/');
        let version = self
            .api_version
            .as_deref()
            .unwrap_or(DEFAULT_API_VERSION)
            .trim_matches('/');
        format!("{url}/{version}")
    }

    /// Credential file path, defaulting to `~/.config/linode`.
    #[must_use]
    pub fn credential_file(&self) -> Option<PathBuf> {
        self.config_path
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config").join("linode")))
    }

    /// Credential profile, defaulting to `default`.
    #[must_use]
    pub fn profile(&self) -> &str {
        self.config_profile.as_deref().unwrap_or(DEFAULT_PROFILE)
    }

    /// User-Agent sent with every request.
    #[must_use]
    pub fn user_agent(&self) -> String {
        let base = format!("linode-provider/{}", env!("CARGO_PKG_VERSION"));
        let prefix = self.ua_prefix.trim();
        if prefix.is_empty() {
            base
        } else {
            format!("{prefix} {base}")
        }
    }

    /// Backoff bounds for transient retries.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            min_delay: Duration::from_millis(self.min_retry_delay_ms),
            max_delay: Duration::from_millis(self.max_retry_delay_ms),
            max_attempts: self.max_retry_attempts,
        }
    }

    /// Event poll interval for instance work.
    #[must_use]
    pub const fn event_poll_interval(&self) -> Duration {
        Duration::from_millis(self.event_poll_ms)
    }

    /// Event poll interval for LKE work.
    #[must_use]
    pub const fn lke_event_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lke_event_poll_ms)
    }

    /// Node readiness poll interval for LKE work.
    #[must_use]
    pub const fn lke_node_ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lke_node_ready_poll_ms)
    }

    /// Per-request HTTP timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Per-operation time budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Budget for Create.
    pub create: Duration,
    /// Budget for Read and Import.
    pub read: Duration,
    /// Budget for Update.
    pub update: Duration,
    /// Budget for Delete.
    pub delete: Duration,
}

impl Timeouts {
    /// Builds budgets from minutes; reads always get five minutes.
    #[must_use]
    pub const fn from_minutes(create: u64, update: u64, delete: u64) -> Self {
        Self {
            create: Duration::from_secs(create * 60),
            read: Duration::from_secs(5 * 60),
            update: Duration::from_secs(update * 60),
            delete: Duration::from_secs(delete * 60),
        }
    }

    /// Compute instance budgets.
    pub const INSTANCE: Self = Self::from_minutes(20, 25, 10);

    /// LKE cluster budgets.
    pub const LKE_CLUSTER: Self = Self::from_minutes(15, 20, 15);

    /// Data source budgets.
    pub const DATA_SOURCE: Self = Self::from_minutes(5, 5, 5);
}
