//! # Mount Configuration
//!
//! Turns the attributes, target path and permission of a `Mount` call into a
//! validated [`MountConfig`].

use super::objects::parse_objects;
use super::permission::parse_file_mode;
use super::settings::EnvDefaults;
use crate::errors::ConfigError;
use crate::secrets::types::ApiKey;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Attribute holding the DSM endpoint for this SecretProviderClass.
pub const ATTR_DSM_ENDPOINT: &str = "dsmEndpoint";
/// Attribute holding the list of secrets to mount.
pub const ATTR_OBJECTS: &str = "objects";

pub const ATTR_POD_NAME: &str = "csi.storage.k8s.io/pod.name";
pub const ATTR_POD_UID: &str = "csi.storage.k8s.io/pod.uid";
pub const ATTR_POD_NAMESPACE: &str = "csi.storage.k8s.io/pod.namespace";
pub const ATTR_SERVICE_ACCOUNT: &str = "csi.storage.k8s.io/serviceAccount.name";

/// A secret requested by a SecretProviderClass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretSpec {
    /// Name of the security object in DSM; also the file path in the mount.
    pub secret_name: String,

    /// Mode override; `0` means "use the request-wide permission".
    #[serde(default)]
    pub file_permission: u32,
}

impl SecretSpec {
    pub fn new(secret_name: impl Into<String>) -> Self {
        Self { secret_name: secret_name.into(), file_permission: 0 }
    }

    pub fn with_file_permission(mut self, mode: u32) -> Self {
        self.file_permission = mode;
        self
    }

    /// Mode the file is written with.
    pub fn effective_mode(&self, default_mode: u32) -> u32 {
        if self.file_permission != 0 {
            self.file_permission
        } else {
            default_mode
        }
    }
}

/// Pod identity passed by the driver. Used for log context only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodInfo {
    pub name: Option<String>,
    pub uid: Option<String>,
    pub namespace: Option<String>,
    pub service_account: Option<String>,
}

/// Structured description of one mount request.
#[derive(Debug, Clone)]
pub struct MountConfig {
    pub target_path: String,
    /// Default mode for every file.
    pub file_permission: u32,
    pub dsm_endpoint: String,
    pub api_key: ApiKey,
    pub secrets: Vec<SecretSpec>,
    pub pod: PodInfo,
}

impl MountConfig {
    /// Decode a mount request without validating it.
    ///
    /// The credential always comes from `defaults`; the endpoint comes from
    /// the `dsmEndpoint` attribute and falls back to `defaults`.
    pub fn parse(
        attributes: &str,
        target_path: &str,
        permission: &str,
        defaults: &EnvDefaults,
    ) -> Result<Self, ConfigError> {
        let attrs: HashMap<String, String> = serde_json::from_str(attributes)
            .map_err(|e| ConfigError::malformed_attributes(e.to_string()))?;

        let dsm_endpoint = attrs
            .get(ATTR_DSM_ENDPOINT)
            .map(|e| e.trim())
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .or_else(|| defaults.dsm_endpoint.clone())
            .unwrap_or_default();

        let secrets = match attrs.get(ATTR_OBJECTS) {
            Some(objects) => parse_objects(objects)?,
            None => Vec::new(),
        };

        let pod = PodInfo {
            name: attrs.get(ATTR_POD_NAME).cloned(),
            uid: attrs.get(ATTR_POD_UID).cloned(),
            namespace: attrs.get(ATTR_POD_NAMESPACE).cloned(),
            service_account: attrs.get(ATTR_SERVICE_ACCOUNT).cloned(),
        };

        let file_permission = parse_file_mode(permission)?;

        Ok(Self {
            target_path: target_path.to_string(),
            file_permission,
            dsm_endpoint,
            api_key: defaults.api_key.clone().unwrap_or_default(),
            secrets,
            pod,
        })
    }

    /// Parse and validate in one step.
    pub fn from_request(
        attributes: &str,
        target_path: &str,
        permission: &str,
        defaults: &EnvDefaults,
    ) -> Result<Self, ConfigError> {
        let config = Self::parse(attributes, target_path, permission, defaults)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation; returns the first failing check.
    ///
    /// Order: target path, credential, endpoint, secret count, name
    /// uniqueness, path safety.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_path.trim().is_empty() {
            return Err(ConfigError::MissingTargetPath);
        }
        if self.api_key.is_blank() {
            return Err(ConfigError::MissingCredential);
        }
        if self.dsm_endpoint.trim().is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }
        if self.secrets.is_empty() {
            return Err(ConfigError::NoSecrets);
        }

        let duplicated = duplicate_names(&self.secrets);
        if !duplicated.is_empty() {
            return Err(ConfigError::DuplicateSecretNames { names: duplicated });
        }

        for secret in &self.secrets {
            check_relative_path(&secret.secret_name)?;
        }

        Ok(())
    }
}

/// Names declared more than once, each reported once in first-repeat order.
fn duplicate_names(secrets: &[SecretSpec]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    let mut duplicated = Vec::new();

    for secret in secrets {
        let name = secret.secret_name.as_str();
        if !seen.insert(name) && reported.insert(name) {
            duplicated.push(name.to_string());
        }
    }

    duplicated
}

/// Reject names the driver would refuse to write under the target path.
pub fn check_relative_path(name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::unsafe_path(name, "path is blank"));
    }
    if name.contains('\0') {
        return Err(ConfigError::unsafe_path(name, "path contains a NUL byte"));
    }
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(ConfigError::unsafe_path(name, "path must be relative"));
    }
    if name.starts_with("..") {
        return Err(ConfigError::unsafe_path(name, "path must not start with '..'"));
    }
    if name.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(ConfigError::unsafe_path(name, "path must not contain a '..' segment"));
    }
    Ok(())
}
