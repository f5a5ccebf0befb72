//! # Mount Handler
//!
//! Runs one `Mount` call end to end:
//!
//! ```text
//! parse_config → validate_config → construct_client → fetch_secrets → assemble_response
//! ```
//!
//! Each stage is terminal on failure. The handler holds no mutable state, so
//! one instance serves any number of concurrent calls.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::fetch::{fetch_all, ResponseFile};
use super::version::{ObjectVersion, Versioner};
use crate::config::{EnvDefaults, MountConfig, DEFAULT_MAX_RESPONSE_BYTES};
use crate::errors::{HandlerError, MountStage};
use crate::secrets::SecretStoreConnector;

/// Transport-independent form of a `Mount` request.
#[derive(Debug, Clone, Default)]
pub struct MountRequest {
    /// JSON object of string attributes from the SecretProviderClass and pod.
    pub attributes: String,
    /// Opaque; credentials are never taken from here.
    pub secrets: String,
    pub target_path: String,
    /// Default file mode, JSON encoded by the driver.
    pub permission: String,
    /// Versions the driver mounted last time, if any.
    pub current_object_versions: Vec<ObjectVersion>,
}

/// Transport-independent form of a `Mount` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountResponse {
    pub files: Vec<ResponseFile>,
    pub object_versions: Vec<ObjectVersion>,
    /// Always `None` from this handler; failures are returned as errors.
    pub error: Option<String>,
}

/// Executes mount calls against stores produced by `C`.
#[derive(Debug)]
pub struct MountHandler<C: SecretStoreConnector> {
    connector: C,
    defaults: EnvDefaults,
    versioner: Versioner,
    max_response_bytes: usize,
}

impl<C: SecretStoreConnector> MountHandler<C> {
    pub fn new(connector: C, defaults: EnvDefaults) -> Self {
        Self {
            connector,
            defaults,
            versioner: Versioner::default(),
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }

    pub fn with_versioner(mut self, versioner: Versioner) -> Self {
        self.versioner = versioner;
        self
    }

    pub fn with_max_response_bytes(mut self, max_response_bytes: usize) -> Self {
        self.max_response_bytes = max_response_bytes;
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Handle one mount call.
    ///
    /// On success `files` and `object_versions` have one entry per declared
    /// secret, in declaration order. On failure nothing is returned.
    pub async fn handle_mount(
        &self,
        request: MountRequest,
        cancel: &CancellationToken,
    ) -> Result<MountResponse, HandlerError> {
        let config = MountConfig::parse(
            &request.attributes,
            &request.target_path,
            &request.permission,
            &self.defaults,
        )
        .map_err(|e| {
            error!(stage = %MountStage::ParseConfig, error = %e, "Failed to parse mount request");
            HandlerError::parse(e)
        })?;

        debug!(
            stage = %MountStage::ParseConfig,
            target_path = %config.target_path,
            secrets = config.secrets.len(),
            pod_name = config.pod.name.as_deref().unwrap_or(""),
            pod_namespace = config.pod.namespace.as_deref().unwrap_or(""),
            "Parsed mount request"
        );

        config.validate().map_err(|e| {
            error!(
                stage = %MountStage::ValidateConfig,
                target_path = %config.target_path,
                error = %e,
                "Mount configuration is invalid"
            );
            HandlerError::validate(e)
        })?;

        let store = self.connector.connect(&config.dsm_endpoint, &config.api_key).map_err(|e| {
            error!(stage = %MountStage::ConstructClient, error = %e, "Failed to construct DSM client");
            HandlerError::from(e)
        })?;

        info!(
            stage = %MountStage::FetchSecrets,
            endpoint = %config.dsm_endpoint,
            secrets = config.secrets.len(),
            "Fetching secrets"
        );

        let mounted =
            fetch_all(&store, &config.secrets, config.file_permission, &self.versioner, cancel)
                .await
                .map_err(|e| {
                    error!(
                        stage = %MountStage::FetchSecrets,
                        secret = %e.secret_name(),
                        error = %e,
                        "Failed to fetch secrets"
                    );
                    HandlerError::from(e)
                })?;

        mounted.warn_if_oversized(self.max_response_bytes);

        let unchanged = count_unchanged(&request.current_object_versions, &mounted.object_versions);
        info!(
            stage = %MountStage::AssembleResponse,
            target_path = %config.target_path,
            files = mounted.len(),
            bytes = mounted.total_content_bytes(),
            unchanged,
            "Mount completed"
        );
        if !request.current_object_versions.is_empty() && unchanged == mounted.len() {
            debug!(target_path = %config.target_path, "All secrets unchanged since last mount");
        }

        Ok(MountResponse {
            files: mounted.files,
            object_versions: mounted.object_versions,
            error: None,
        })
    }
}

/// Number of fetched versions whose id the driver already has.
fn count_unchanged(current: &[ObjectVersion], fetched: &[ObjectVersion]) -> usize {
    if current.is_empty() {
        return 0;
    }
    let known: HashSet<&str> = current.iter().map(|v| v.id.as_str()).collect();
    fetched.iter().filter(|v| known.contains(v.id.as_str())).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{AuthError, ConfigError, FetchError};
    use crate::provider::version::content_digest;
    use crate::secrets::{ApiKey, SecretStore};
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing_test::traced_test;

    #[derive(Debug, Clone)]
    struct FakeStore {
        values: Arc<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl SecretStore for FakeStore {
        async fn fetch_by_name(&self, name: &str) -> Result<Vec<u8>, FetchError> {
            self.values.get(name).cloned().ok_or_else(|| FetchError::not_found(name))
        }
    }

    /// Counts connects so tests can assert that no client was built.
    #[derive(Debug, Default)]
    struct FakeConnector {
        values: Arc<HashMap<String, Vec<u8>>>,
        connects: AtomicUsize,
    }

    impl FakeConnector {
        fn with(entries: &[(&str, &[u8])]) -> Self {
            Self {
                values: Arc::new(
                    entries.iter().map(|(k, v)| (k.to_string(), v.to_vec())).collect(),
                ),
                connects: AtomicUsize::new(0),
            }
        }

        fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }
    }

    impl SecretStoreConnector for FakeConnector {
        type Store = FakeStore;

        fn connect(&self, endpoint: &str, api_key: &ApiKey) -> Result<FakeStore, AuthError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if endpoint.is_empty() {
                return Err(AuthError::MissingEndpoint);
            }
            if api_key.is_blank() {
                return Err(AuthError::MissingCredential);
            }
            Ok(FakeStore { values: self.values.clone() })
        }
    }

    fn handler(connector: FakeConnector) -> MountHandler<FakeConnector> {
        MountHandler::new(connector, EnvDefaults::new(Some("abc".to_string()), None))
    }

    fn request(objects: &str) -> MountRequest {
        let attributes = serde_json::json!({
            "dsmEndpoint": "https://x",
            "objects": objects,
        })
        .to_string();
        MountRequest {
            attributes,
            target_path: "/mnt/secrets".to_string(),
            permission: "0440".to_string(),
            ..Default::default()
        }
    }

    const TWO_SECRETS: &str = "- secretName: \"db-pass\"\n- secretName: \"api-key\"";

    #[tokio::test]
    async fn test_mounts_all_declared_secrets() {
        let handler = handler(FakeConnector::with(&[("db-pass", b"pw1"), ("api-key", b"k2")]));

        let response =
            handler.handle_mount(request(TWO_SECRETS), &CancellationToken::new()).await.unwrap();

        assert_eq!(response.files.len(), 2);
        assert_eq!(response.object_versions.len(), 2);
        assert_eq!(response.files[0].path, "db-pass");
        assert_eq!(response.files[0].mode, 0o440);
        assert_eq!(response.files[0].contents, b"pw1");
        assert_eq!(response.files[1].path, "api-key");
        assert_eq!(response.files[1].mode, 0o440);
        assert_eq!(response.files[1].contents, b"k2");
        assert_eq!(response.object_versions[0].id, hex::encode(content_digest(b"pw1")));
        assert_eq!(response.object_versions[1].id, hex::encode(content_digest(b"k2")));
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected_before_connect() {
        let connector = FakeConnector::with(&[("db-pass", b"pw1")]);
        let handler = handler(connector);

        let err = handler
            .handle_mount(
                request("- secretName: \"db-pass\"\n- secretName: \"db-pass\""),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.stage(), MountStage::ValidateConfig);
        assert!(err.to_string().contains("db-pass"));
        assert_eq!(handler.connector().connects(), 0);
    }

    #[tokio::test]
    async fn test_missing_secret_returns_nothing() {
        let handler = handler(FakeConnector::with(&[("db-pass", b"pw1")]));

        let err = handler
            .handle_mount(request(TWO_SECRETS), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), MountStage::FetchSecrets);
        assert!(matches!(
            err,
            HandlerError::Fetch { source: FetchError::NotFound { ref name }, .. } if name == "api-key"
        ));
    }

    #[tokio::test]
    async fn test_missing_credential_never_connects() {
        let handler = MountHandler::new(
            FakeConnector::with(&[("db-pass", b"pw1")]),
            EnvDefaults::default(),
        );

        let err = handler
            .handle_mount(request(TWO_SECRETS), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HandlerError::Config { stage: MountStage::ValidateConfig, source: ConfigError::MissingCredential }
        ));
        assert_eq!(handler.connector().connects(), 0);
    }

    #[tokio::test]
    async fn test_malformed_attributes_fail_at_parse() {
        let handler = handler(FakeConnector::default());
        let request = MountRequest {
            attributes: "{not json".to_string(),
            target_path: "/mnt".to_string(),
            permission: "420".to_string(),
            ..Default::default()
        };

        let err = handler.handle_mount(request, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.stage(), MountStage::ParseConfig);
        assert_eq!(handler.connector().connects(), 0);
    }

    #[tokio::test]
    async fn test_mount_is_idempotent() {
        let handler = handler(FakeConnector::with(&[("db-pass", b"pw1"), ("api-key", b"k2")]));
        let cancel = CancellationToken::new();

        let first = handler.handle_mount(request(TWO_SECRETS), &cancel).await.unwrap();
        let second = handler.handle_mount(request(TWO_SECRETS), &cancel).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_per_secret_permission_override() {
        let handler = handler(FakeConnector::with(&[("a", b"1"), ("b", b"2")]));
        let objects = "- secretName: a\n  filePermission: \"0600\"\n- secretName: b\n  filePermission: 0";

        let response =
            handler.handle_mount(request(objects), &CancellationToken::new()).await.unwrap();

        assert_eq!(response.files[0].mode, 0o600);
        assert_eq!(response.files[1].mode, 0o440);
    }

    #[tokio::test]
    async fn test_cancelled_call_fails_at_fetch() {
        let handler = handler(FakeConnector::with(&[("db-pass", b"pw1"), ("api-key", b"k2")]));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = handler.handle_mount(request(TWO_SECRETS), &cancel).await.unwrap_err();
        assert!(matches!(err, HandlerError::Fetch { source: FetchError::Cancelled { .. }, .. }));
    }

    #[tokio::test]
    async fn test_keyed_versioner_fills_version() {
        let handler = handler(FakeConnector::with(&[("db-pass", b"pw1"), ("api-key", b"k2")]))
            .with_versioner(Versioner::keyed(&"integrity".into()).unwrap());

        let response =
            handler.handle_mount(request(TWO_SECRETS), &CancellationToken::new()).await.unwrap();

        assert!(response.object_versions.iter().all(|v| !v.version.is_empty()));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_logs_never_contain_secret_material() {
        let handler =
            handler(FakeConnector::with(&[("db-pass", b"hunter2-value"), ("api-key", b"k2")]));

        handler.handle_mount(request(TWO_SECRETS), &CancellationToken::new()).await.unwrap();

        assert!(logs_contain("Mount completed"));
        assert!(logs_contain("db-pass"));
        assert!(!logs_contain("hunter2-value"));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_oversized_response_is_logged_and_returned_whole() {
        let big = vec![b'x'; 64];
        let handler = handler(FakeConnector::with(&[("db-pass", big.as_slice()), ("api-key", b"k2")]))
            .with_max_response_bytes(16);

        let response =
            handler.handle_mount(request(TWO_SECRETS), &CancellationToken::new()).await.unwrap();

        assert!(logs_contain("exceeds"));
        assert_eq!(response.files.len(), 2);
        assert_eq!(response.files[0].contents, big);
        assert_eq!(response.files[1].contents, b"k2");
    }

    #[traced_test]
    #[tokio::test]
    async fn test_response_within_limit_is_not_flagged() {
        let handler = handler(FakeConnector::with(&[("db-pass", b"pw1"), ("api-key", b"k2")]))
            .with_max_response_bytes(5);

        handler.handle_mount(request(TWO_SECRETS), &CancellationToken::new()).await.unwrap();

        assert!(!logs_contain("exceeds"));
    }

    proptest! {
        #[test]
        fn prop_unique_names_mount_in_declaration_order(
            names in prop::collection::hash_set("[a-z][a-z0-9_.-]{0,15}", 1..12)
        ) {
            let names: Vec<String> = names.into_iter().collect();
            let values: HashMap<String, Vec<u8>> =
                names.iter().map(|n| (n.clone(), format!("value-of-{}", n).into_bytes())).collect();
            let handler = handler(FakeConnector {
                values: Arc::new(values),
                connects: AtomicUsize::new(0),
            });
            let objects: String =
                names.iter().map(|n| format!("- secretName: \"{}\"\n", n)).collect();

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let response = runtime
                .block_on(handler.handle_mount(request(&objects), &CancellationToken::new()))
                .unwrap();

            let paths: Vec<String> = response.files.iter().map(|f| f.path.clone()).collect();
            prop_assert_eq!(&paths, &names);
            prop_assert_eq!(response.object_versions.len(), names.len());
            for (file, version) in response.files.iter().zip(&response.object_versions) {
                prop_assert_eq!(&file.contents, &format!("value-of-{}", file.path).into_bytes());
                prop_assert_eq!(&version.id, &hex::encode(content_digest(&file.contents)));
            }
        }
    }

    #[test]
    fn test_count_unchanged() {
        let v = |id: &str| ObjectVersion { id: id.to_string(), version: String::new() };
        assert_eq!(count_unchanged(&[], &[v("a")]), 0);
        assert_eq!(count_unchanged(&[v("a"), v("b")], &[v("a"), v("c")]), 1);
        assert_eq!(count_unchanged(&[v("a"), v("b")], &[v("b"), v("a")]), 2);
    }
}
