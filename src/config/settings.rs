//! # Provider Settings
//!
//! Process-level configuration: command line flags with environment fallbacks,
//! and the credential/endpoint defaults captured once at startup.

use crate::errors::{Error, Result};
use crate::secrets::types::{ApiKey, SecretString};
use clap::{Parser, ValueEnum};
use std::time::Duration;
use validator::Validate;

/// Environment variable holding the DSM API key.
pub const ENV_API_KEY: &str = "FORTANIX_API_KEY";

/// Environment variable holding the fallback DSM endpoint.
pub const ENV_DSM_ENDPOINT: &str = "FORTANIX_DSM_ENDPOINT";

/// Environment variable holding the optional object version integrity key.
pub const ENV_INTEGRITY_KEY: &str = "FORTANIX_CSI_INTEGRITY_KEY";

pub const DEFAULT_SOCKET_PATH: &str = "/provider/fortanix-csi-provider.sock";
pub const DEFAULT_HEALTH_ADDRESS: &str = "0.0.0.0:8080";

/// Ceiling the CSI driver places on a single mount response.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Command line settings for the provider binary.
#[derive(Debug, Clone, Parser, Validate)]
#[command(name = "fortanix-csi-provider")]
#[command(about = "Secrets Store CSI driver provider for Fortanix DSM")]
pub struct ProviderSettings {
    /// Path to the unix socket on which to listen for driver gRPC calls
    #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
    #[validate(length(min = 1, message = "Socket path cannot be empty"))]
    pub endpoint: String,

    /// Print version information as JSON and exit
    #[arg(long)]
    pub version: bool,

    /// Fortanix DSM API URL used when a SecretProviderClass has no `dsmEndpoint`
    #[arg(long = "dsm-address", env = ENV_DSM_ENDPOINT)]
    pub dsm_address: Option<String>,

    /// Address of the HTTP listener reporting health
    #[arg(long, default_value = DEFAULT_HEALTH_ADDRESS)]
    #[validate(length(min = 1, message = "Health address cannot be empty"))]
    pub health_address: String,

    /// Upper bound on a single mount call, in seconds
    #[arg(long)]
    #[validate(range(min = 1, max = 3600, message = "Mount timeout must be between 1 and 3600 seconds"))]
    pub mount_timeout_secs: Option<u64>,

    /// Timeout for each request to DSM, in seconds
    #[arg(long, default_value_t = 30)]
    #[validate(range(min = 1, max = 300, message = "DSM timeout must be between 1 and 300 seconds"))]
    pub dsm_timeout_secs: u64,

    /// Aggregate secret size above which a mount response is reported as oversized
    #[arg(long, default_value_t = DEFAULT_MAX_RESPONSE_BYTES)]
    #[validate(range(min = 1, message = "Max response bytes must be positive"))]
    pub max_response_bytes: usize,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Key for HMAC object versions; content digests only when unset
    #[arg(long, env = ENV_INTEGRITY_KEY, hide_env_values = true)]
    pub integrity_key: Option<SecretString>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_SOCKET_PATH.to_string(),
            version: false,
            dsm_address: None,
            health_address: DEFAULT_HEALTH_ADDRESS.to_string(),
            mount_timeout_secs: None,
            dsm_timeout_secs: 30,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            log_format: LogFormat::Text,
            integrity_key: None,
        }
    }
}

impl ProviderSettings {
    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;

        if let Some(key) = &self.integrity_key {
            if key.is_blank() {
                return Err(Error::config("Integrity key cannot be blank when set"));
            }
        }

        Ok(())
    }

    pub fn dsm_timeout(&self) -> Duration {
        Duration::from_secs(self.dsm_timeout_secs)
    }

    pub fn mount_timeout(&self) -> Option<Duration> {
        self.mount_timeout_secs.map(Duration::from_secs)
    }

    /// Capture the request-independent credential and endpoint defaults.
    ///
    /// The API key is read from the environment here, once; the endpoint was
    /// already resolved by clap from `--dsm-address` or `FORTANIX_DSM_ENDPOINT`.
    pub fn env_defaults(&self) -> EnvDefaults {
        EnvDefaults::new(std::env::var(ENV_API_KEY).ok(), self.dsm_address.clone())
    }
}

/// Credential and endpoint defaults applied to every mount call.
#[derive(Debug, Clone, Default)]
pub struct EnvDefaults {
    pub api_key: Option<ApiKey>,
    pub dsm_endpoint: Option<String>,
}

impl EnvDefaults {
    /// Blank values are treated as unset.
    pub fn new(api_key: Option<String>, dsm_endpoint: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()).map(ApiKey::from),
            dsm_endpoint: dsm_endpoint
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = ProviderSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.endpoint, DEFAULT_SOCKET_PATH);
        assert_eq!(settings.dsm_timeout(), Duration::from_secs(30));
        assert!(settings.mount_timeout().is_none());
    }

    #[test]
    fn test_parse_flags() {
        let settings = ProviderSettings::try_parse_from([
            "fortanix-csi-provider",
            "--endpoint",
            "/tmp/provider.sock",
            "--dsm-address",
            "https://eu.smartkey.io",
            "--mount-timeout-secs",
            "20",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(settings.endpoint, "/tmp/provider.sock");
        assert_eq!(settings.dsm_address.as_deref(), Some("https://eu.smartkey.io"));
        assert_eq!(settings.mount_timeout(), Some(Duration::from_secs(20)));
        assert_eq!(settings.log_format, LogFormat::Json);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_timeouts() {
        let settings = ProviderSettings { dsm_timeout_secs: 0, ..Default::default() };
        assert!(settings.validate().is_err());

        let settings = ProviderSettings { mount_timeout_secs: Some(0), ..Default::default() };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_blank_integrity_key() {
        let settings =
            ProviderSettings { integrity_key: Some(" ".into()), ..Default::default() };
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_env_defaults_treat_blank_as_unset() {
        let defaults = EnvDefaults::new(Some("  ".to_string()), Some("".to_string()));
        assert!(defaults.api_key.is_none());
        assert!(defaults.dsm_endpoint.is_none());

        let defaults =
            EnvDefaults::new(Some("key".to_string()), Some(" https://x ".to_string()));
        assert_eq!(defaults.api_key.unwrap().expose_secret(), "key");
        assert_eq!(defaults.dsm_endpoint.as_deref(), Some("https://x"));
    }

    #[test]
    fn test_env_defaults_endpoint_comes_from_flags() {
        let settings = ProviderSettings {
            dsm_address: Some("https://eu.smartkey.io".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.env_defaults().dsm_endpoint.as_deref(), Some("https://eu.smartkey.io"));
        assert!(ProviderSettings::default().env_defaults().dsm_endpoint.is_none());
    }
}
