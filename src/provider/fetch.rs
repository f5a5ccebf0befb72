//! Secret fetch engine.
//!
//! Fetches every declared secret in order from one [`SecretStore`] and builds
//! the parallel `files` / `object_versions` lists. Any failure aborts the
//! whole call; nothing partial is ever returned.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::version::{content_digest, ObjectVersion, Versioner};
use crate::config::SecretSpec;
use crate::errors::FetchError;
use crate::secrets::SecretStore;

/// A secret as fetched during one mount call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSecret {
    pub name: String,
    pub contents: Vec<u8>,
    pub content_hash: [u8; 32],
}

/// File the driver writes under the target path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFile {
    /// Relative path; equal to the secret name.
    pub path: String,
    pub mode: u32,
    pub contents: Vec<u8>,
}

/// Files and their versions, index-aligned and in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountedSecrets {
    pub files: Vec<ResponseFile>,
    pub object_versions: Vec<ObjectVersion>,
}

impl MountedSecrets {
    fn with_capacity(n: usize) -> Self {
        Self { files: Vec::with_capacity(n), object_versions: Vec::with_capacity(n) }
    }

    fn push(&mut self, file: ResponseFile, version: ObjectVersion) {
        self.files.push(file);
        self.object_versions.push(version);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Sum of all file contents, in bytes.
    pub fn total_content_bytes(&self) -> usize {
        self.files.iter().map(|f| f.contents.len()).sum()
    }

    /// Warn when the aggregate size exceeds the driver's response ceiling.
    ///
    /// Returns `true` when oversized. Contents are never truncated.
    pub fn warn_if_oversized(&self, max_bytes: usize) -> bool {
        let total = self.total_content_bytes();
        if total > max_bytes {
            warn!(
                total_bytes = total,
                max_bytes,
                files = self.len(),
                "Mount response exceeds the driver's size limit; the driver may reject it"
            );
            true
        } else {
            false
        }
    }
}

/// Fetch one secret, racing the store call against cancellation.
pub async fn fetch_secret<S: SecretStore + ?Sized>(
    store: &S,
    name: &str,
    cancel: &CancellationToken,
) -> Result<FetchedSecret, FetchError> {
    if cancel.is_cancelled() {
        return Err(FetchError::cancelled(name));
    }

    let contents = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(FetchError::cancelled(name)),
        result = store.fetch_by_name(name) => result?,
    };

    let content_hash = content_digest(&contents);
    Ok(FetchedSecret { name: name.to_string(), contents, content_hash })
}

/// Fetch every secret in declaration order.
///
/// Each file gets the secret's own mode when non-zero, `default_mode`
/// otherwise. The first error aborts the call.
pub async fn fetch_all<S: SecretStore + ?Sized>(
    store: &S,
    secrets: &[SecretSpec],
    default_mode: u32,
    versioner: &Versioner,
    cancel: &CancellationToken,
) -> Result<MountedSecrets, FetchError> {
    let mut mounted = MountedSecrets::with_capacity(secrets.len());

    for (index, secret) in secrets.iter().enumerate() {
        debug!(secret = %secret.secret_name, index, total = secrets.len(), "Fetching secret");

        let fetched = fetch_secret(store, &secret.secret_name, cancel).await.map_err(|e| {
            warn!(secret = %secret.secret_name, error = %e, "Failed to fetch secret");
            e
        })?;

        let version = versioner.object_version(secret, &fetched.contents, &fetched.content_hash);
        let file = ResponseFile {
            path: fetched.name,
            mode: secret.effective_mode(default_mode),
            contents: fetched.contents,
        };

        info!(
            file = %file.path,
            mode = format!("{:o}", file.mode),
            bytes = file.contents.len(),
            "Secret added to mount response"
        );
        mounted.push(file, version);
    }

    Ok(mounted)
}
