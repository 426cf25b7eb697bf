//! Provider configuration.
//!
//! This module handles all configuration-related functionality:
//! - Parsing the provider configuration file and `LINODE_*` overrides
//! - Resolving credentials from the Linode CLI credential file
//! - Validation of configuration values
//! - Hashing of secrets stored in state

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::StateHasher;
pub use parser::{ConfigParser, CredentialProfile};
pub use spec::{
    DEFAULT_API_URL, DEFAULT_API_VERSION, DEFAULT_PROFILE, ProviderConfig, Timeouts,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
