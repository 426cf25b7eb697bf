//! Linode API integration.
//!
//! This module provides:
//! - The HTTP client with retry, pagination and the catalog cache
//! - Typed request and response structures
//! - Endpoint wrappers for instances and LKE clusters
//! - The event and status poller

mod cache;
mod client;
mod instances;
mod lke;
mod poller;
pub mod types;

pub use cache::{CATALOG_TTL, ResponseCache};
pub use client::{ApiSession, LinodeClient, PAGE_SIZE};
pub use poller::{EventToken, Probe, wait_until};
