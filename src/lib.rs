//! # Fortanix CSI Provider
//!
//! A [Secrets Store CSI driver] provider that mounts secrets stored in
//! Fortanix Data Security Manager (DSM) into Kubernetes pods.
//!
//! ## Architecture
//!
//! ```text
//! CSI driver ──gRPC/unix socket──▶ server::service ──▶ provider::MountHandler
//!                                                          │
//!                    config::MountConfig ◀── parse/validate ┤
//!                    secrets::DsmClient  ◀── fetch ─────────┘
//! ```
//!
//! Each `Mount` call is independent: attributes are parsed and validated, a
//! DSM client is bound to the call's endpoint and API key, every declared
//! secret is fetched in order, and the files are returned to the driver
//! together with content-derived object versions.
//!
//! [Secrets Store CSI driver]: https://secrets-store-csi-driver.sigs.k8s.io/

pub mod config;
pub mod errors;
pub mod observability;
pub mod provider;
pub mod secrets;
pub mod server;
pub mod version;

pub use config::{EnvDefaults, MountConfig, ProviderSettings, SecretSpec};
pub use errors::{Error, Result};
pub use provider::{MountHandler, MountRequest, MountResponse};
pub use server::CsiProviderService;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
