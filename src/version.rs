//! Build information printed by `--version`.

use serde::Serialize;

/// Oldest Secrets Store CSI driver release this provider works with.
pub const MIN_DRIVER_VERSION: &str = "v0.0.21";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub version: &'static str,
    pub build_date: &'static str,
    pub rustc_version: &'static str,
    pub min_driver_version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: crate::VERSION,
            build_date: option_env!("PROVIDER_BUILD_DATE").unwrap_or("unknown"),
            rustc_version: option_env!("PROVIDER_RUSTC_VERSION").unwrap_or("unknown"),
            min_driver_version: MIN_DRIVER_VERSION,
        }
    }

    pub fn json(&self) -> crate::errors::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::errors::Error::config(format!("failed to encode version information: {}", e))
        })
    }
}
