//! # Mount Provider
//!
//! The core of the provider: the [`MountHandler`] turns a mount request into
//! files and object versions, using [`fetch_all`] to pull secrets from a
//! store and a [`Versioner`] to derive their versions.

pub mod fetch;
pub mod handler;
pub mod version;

pub use fetch::{fetch_all, fetch_secret, FetchedSecret, MountedSecrets, ResponseFile};
pub use handler::{MountHandler, MountRequest, MountResponse};
pub use version::{content_digest, ObjectVersion, Versioner};
