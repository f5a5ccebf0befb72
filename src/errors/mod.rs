//! # Error Handling
//!
//! Error types for the provider, defined with `thiserror`.

pub mod types;

pub use types::{
    AuthError, ConfigError, Error, FetchError, HandlerError, MountStage, Result,
};
