//! Secret store access for mount calls.
//!
//! The fetch engine talks to a [`SecretStore`]: a handle bound to one endpoint
//! and one credential, created per mount call by a [`SecretStoreConnector`].
//! [`DsmConnector`] / [`DsmClient`] implement these for Fortanix DSM.
//!
//! # Security Considerations
//!
//! - Secret values and API keys are never logged or put in error messages
//! - API keys are wrapped in [`SecretString`] and zeroed on drop
//! - Nothing is cached between calls

pub mod dsm;
pub mod store;
pub mod types;

pub use dsm::{DsmClient, DsmConnector};
pub use store::{SecretStore, SecretStoreConnector};
pub use types::{ApiKey, SecretString};
