//! `v1alpha1.CSIDriverProvider` gRPC service.
//!
//! Thin adapter between the generated tonic types and the [`MountHandler`].
//! Each `Mount` call gets its own [`CancellationToken`], cancelled when the
//! optional per-call timeout elapses.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

use crate::errors::HandlerError;
use crate::provider::{MountHandler, MountRequest, MountResponse, ObjectVersion};
use crate::secrets::SecretStoreConnector;

/// Generated protobuf and gRPC types.
pub mod proto {
    tonic::include_proto!("v1alpha1");
}

use proto::csi_driver_provider_server::{CsiDriverProvider, CsiDriverProviderServer};

/// Protocol version implemented by this provider.
pub const API_VERSION: &str = "v1alpha1";

/// Name reported to the driver in `Version`.
pub const RUNTIME_NAME: &str = "fortanix-csi-provider";

/// gRPC front end of the provider.
#[derive(Debug)]
pub struct CsiProviderService<C: SecretStoreConnector> {
    handler: Arc<MountHandler<C>>,
    mount_timeout: Option<Duration>,
}

impl<C: SecretStoreConnector> Clone for CsiProviderService<C> {
    fn clone(&self) -> Self {
        Self { handler: Arc::clone(&self.handler), mount_timeout: self.mount_timeout }
    }
}

impl<C: SecretStoreConnector + 'static> CsiProviderService<C> {
    pub fn new(handler: MountHandler<C>) -> Self {
        Self { handler: Arc::new(handler), mount_timeout: None }
    }

    /// Bound every mount call; the call fails with `DEADLINE_EXCEEDED` when
    /// the timeout fires during the fetch stage.
    pub fn with_mount_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.mount_timeout = timeout;
        self
    }

    pub fn into_server(self) -> CsiDriverProviderServer<Self> {
        CsiDriverProviderServer::new(self)
    }

    async fn run_mount(&self, request: MountRequest) -> Result<MountResponse, HandlerError> {
        let cancel = CancellationToken::new();
        let work = self.handler.handle_mount(request, &cancel);
        tokio::pin!(work);

        let Some(timeout) = self.mount_timeout else {
            return work.await;
        };

        tokio::select! {
            result = &mut work => result,
            _ = tokio::time::sleep(timeout) => {
                warn!(timeout_secs = timeout.as_secs(), "Mount call timed out, cancelling");
                cancel.cancel();
                (&mut work).await.map_err(HandlerError::with_deadline_exceeded)
            }
        }
    }
}

impl From<proto::MountRequest> for MountRequest {
    fn from(request: proto::MountRequest) -> Self {
        Self {
            attributes: request.attributes,
            secrets: request.secrets,
            target_path: request.target_path,
            permission: request.permission,
            current_object_versions: request
                .current_object_version
                .into_iter()
                .map(|v| ObjectVersion { id: v.id, version: v.version })
                .collect(),
        }
    }
}

impl From<MountResponse> for proto::MountResponse {
    fn from(response: MountResponse) -> Self {
        Self {
            object_version: response
                .object_versions
                .into_iter()
                .map(|v| proto::ObjectVersion { id: v.id, version: v.version })
                .collect(),
            error: response.error.map(|code| proto::Error { code }),
            files: response
                .files
                .into_iter()
                .map(|f| proto::File {
                    path: f.path,
                    // Modes never exceed 0o777.
                    mode: f.mode as i32,
                    contents: f.contents,
                })
                .collect(),
        }
    }
}

#[tonic::async_trait]
impl<C: SecretStoreConnector + 'static> CsiDriverProvider for CsiProviderService<C> {
    async fn version(
        &self,
        request: Request<proto::VersionRequest>,
    ) -> Result<Response<proto::VersionResponse>, Status> {
        debug!(driver_version = %request.get_ref().version, "Version requested");

        Ok(Response::new(proto::VersionResponse {
            version: API_VERSION.to_string(),
            runtime_name: RUNTIME_NAME.to_string(),
            runtime_version: crate::VERSION.to_string(),
        }))
    }

    async fn mount(
        &self,
        request: Request<proto::MountRequest>,
    ) -> Result<Response<proto::MountResponse>, Status> {
        let request = MountRequest::from(request.into_inner());
        info!(target_path = %request.target_path, "Mount requested");

        let response = self.run_mount(request).await.map_err(Status::from)?;
        Ok(Response::new(response.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvDefaults;
    use crate::errors::{AuthError, FetchError};
    use crate::provider::ResponseFile;
    use crate::secrets::{ApiKey, SecretStore};
    use async_trait::async_trait;

    #[derive(Debug, Clone)]
    struct SlowStore {
        delay: Duration,
    }

    #[async_trait]
    impl SecretStore for SlowStore {
        async fn fetch_by_name(&self, name: &str) -> Result<Vec<u8>, FetchError> {
            tokio::time::sleep(self.delay).await;
            Ok(format!("value-of-{}", name).into_bytes())
        }
    }

    #[derive(Debug)]
    struct SlowConnector {
        delay: Duration,
    }

    impl SecretStoreConnector for SlowConnector {
        type Store = SlowStore;

        fn connect(&self, _endpoint: &str, _api_key: &ApiKey) -> Result<SlowStore, AuthError> {
            Ok(SlowStore { delay: self.delay })
        }
    }

    fn service(delay: Duration) -> CsiProviderService<SlowConnector> {
        CsiProviderService::new(MountHandler::new(
            SlowConnector { delay },
            EnvDefaults::new(Some("abc".to_string()), None),
        ))
    }

    fn mount_request(objects: &str) -> proto::MountRequest {
        proto::MountRequest {
            attributes: serde_json::json!({ "dsmEndpoint": "https://x", "objects": objects })
                .to_string(),
            secrets: "{}".to_string(),
            target_path: "/mnt/secrets".to_string(),
            permission: "\"420\"".to_string(),
            current_object_version: vec![],
        }
    }

    #[tokio::test]
    async fn test_version() {
        let response = service(Duration::ZERO)
            .version(Request::new(proto::VersionRequest { version: "v1.4.0".to_string() }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.version, "v1alpha1");
        assert_eq!(response.runtime_name, "fortanix-csi-provider");
        assert_eq!(response.runtime_version, crate::VERSION);
    }

    #[tokio::test]
    async fn test_mount_converts_response() {
        let response = service(Duration::ZERO)
            .mount(Request::new(mount_request("- secretName: a\n- secretName: b")))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.files.len(), 2);
        assert_eq!(response.object_version.len(), 2);
        assert_eq!(response.files[0].path, "a");
        assert_eq!(response.files[0].mode, 0o644);
        assert_eq!(response.files[0].contents, b"value-of-a");
        assert_eq!(response.object_version[1].id, hex::encode(crate::provider::content_digest(b"value-of-b")));
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_invalid_request_maps_to_invalid_argument() {
        let status = service(Duration::ZERO)
            .mount(Request::new(mount_request("- secretName: a\n- secretName: a")))
            .await
            .unwrap_err();

        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert!(status.message().contains("a"));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_deadline_exceeded() {
        let service = service(Duration::from_secs(30))
            .with_mount_timeout(Some(Duration::from_millis(20)));

        let status = service
            .mount(Request::new(mount_request("- secretName: slow")))
            .await
            .unwrap_err();

        assert_eq!(status.code(), tonic::Code::DeadlineExceeded);
    }

    #[test]
    fn test_request_conversion_keeps_current_versions() {
        let mut request = mount_request("- secretName: a");
        request.current_object_version =
            vec![proto::ObjectVersion { id: "abc".to_string(), version: "v".to_string() }];

        let domain = MountRequest::from(request);
        assert_eq!(
            domain.current_object_versions,
            vec![ObjectVersion { id: "abc".to_string(), version: "v".to_string() }]
        );
    }

    #[test]
    fn test_response_conversion() {
        let response = proto::MountResponse::from(MountResponse {
            files: vec![ResponseFile { path: "a".into(), mode: 0o400, contents: b"x".to_vec() }],
            object_versions: vec![ObjectVersion { id: "1".into(), version: String::new() }],
            error: None,
        });
        assert_eq!(response.files[0].mode, 256);
        assert_eq!(response.object_version[0].id, "1");
    }
}
