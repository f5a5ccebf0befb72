//! Object version derivation.
//!
//! The driver compares object versions between mounts to detect changed
//! secrets. The id is always the hex SHA-256 of the exact file contents.
//! When an integrity key is configured, the version field additionally
//! carries a keyed MAC over the secret declaration and its contents.

use base64::prelude::{Engine as _, BASE64_URL_SAFE};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::SecretSpec;
use crate::errors::{Error, Result};
use crate::secrets::SecretString;

type HmacSha256 = Hmac<Sha256>;

/// Version record returned for each mounted file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectVersion {
    pub id: String,
    pub version: String,
}

/// Compute the SHA-256 digest of secret contents.
pub fn content_digest(contents: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(contents);
    hasher.finalize().into()
}

/// Strategy for filling [`ObjectVersion`] records.
#[derive(Clone, Default)]
pub enum Versioner {
    /// `id` = content digest, `version` empty.
    #[default]
    ContentDigest,
    /// `id` = content digest, `version` = base64url HMAC-SHA256 over the
    /// JSON secret declaration followed by the contents.
    Keyed(HmacSha256),
}

impl std::fmt::Debug for Versioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContentDigest => write!(f, "Versioner::ContentDigest"),
            Self::Keyed(_) => write!(f, "Versioner::Keyed([REDACTED])"),
        }
    }
}

impl Versioner {
    /// Build the keyed scheme from an integrity key.
    pub fn keyed(key: &SecretString) -> Result<Self> {
        if key.is_empty() {
            return Err(Error::config("Integrity key cannot be empty"));
        }
        let mac = HmacSha256::new_from_slice(key.expose_secret().as_bytes())
            .map_err(|e| Error::config(format!("Invalid integrity key: {}", e)))?;
        Ok(Self::Keyed(mac))
    }

    /// Keyed when an integrity key is configured, content digest otherwise.
    pub fn from_key(key: Option<&SecretString>) -> Result<Self> {
        match key {
            Some(key) => Self::keyed(key),
            None => Ok(Self::ContentDigest),
        }
    }

    pub fn is_keyed(&self) -> bool {
        matches!(self, Self::Keyed(_))
    }

    /// Version record for `secret` whose contents hash to `digest`.
    pub fn object_version(
        &self,
        secret: &SecretSpec,
        contents: &[u8],
        digest: &[u8; 32],
    ) -> ObjectVersion {
        let version = match self {
            Self::ContentDigest => String::new(),
            Self::Keyed(mac) => {
                let tag = mac
                    .clone()
                    .chain_update(declaration_json(secret))
                    .chain_update(contents);
                BASE64_URL_SAFE.encode(tag.finalize().into_bytes())
            }
        };

        ObjectVersion { id: hex::encode(digest), version }
    }
}

/// Declaration bytes covered by the keyed MAC: PascalCase field names in
/// declaration order.
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DeclarationRecord<'a> {
    secret_name: &'a str,
    file_permission: u32,
}

fn declaration_json(secret: &SecretSpec) -> Vec<u8> {
    let record = DeclarationRecord {
        secret_name: &secret.secret_name,
        file_permission: secret.file_permission,
    };
    // Serializing a struct of a str and an integer cannot fail.
    serde_json::to_vec(&record).unwrap_or_default()
}
