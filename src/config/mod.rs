//! # Configuration Management
//!
//! Two layers of configuration:
//!
//! - [`ProviderSettings`]: process-wide flags and environment, read once at
//!   startup. The credential/endpoint defaults are captured into
//!   [`EnvDefaults`] and passed down explicitly.
//! - [`MountConfig`]: per-call configuration parsed from the attributes of a
//!   `Mount` request.

pub mod mount;
pub mod objects;
pub mod permission;
pub mod settings;

pub use mount::{check_relative_path, MountConfig, PodInfo, SecretSpec};
pub use objects::parse_objects;
pub use permission::{parse_file_mode, MAX_FILE_MODE};
pub use settings::{
    EnvDefaults, LogFormat, ProviderSettings, DEFAULT_MAX_RESPONSE_BYTES, ENV_API_KEY,
    ENV_DSM_ENDPOINT, ENV_INTEGRITY_KEY,
};
