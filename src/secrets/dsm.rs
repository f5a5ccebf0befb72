//! Fortanix DSM secret store client
//!
//! Exports security objects by name over the DSM REST API.
//!
//! ## Wire contract
//!
//! `POST {endpoint}/crypto/v1/keys/export` with body `{"name": "<secret>"}` and
//! `Authorization: Basic <api key>` (a DSM API key is already the base64
//! encoded `app-id:secret` pair). The response is the exported object; its
//! `value` field carries the base64 encoded secret material.

use async_trait::async_trait;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use super::store::{SecretStore, SecretStoreConnector};
use super::types::ApiKey;
use crate::errors::{AuthError, Error, FetchError};

/// Export endpoint, relative to the DSM base URL.
pub const EXPORT_PATH: &str = "/crypto/v1/keys/export";

/// Longest error body echoed back in a fetch error.
const MAX_ERROR_BODY: usize = 256;

#[derive(Serialize)]
struct SobjectDescriptor<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct ExportedSobject {
    #[serde(default)]
    value: Option<String>,
}

/// DSM client bound to one endpoint and one API key.
#[derive(Clone)]
pub struct DsmClient {
    http: Client,
    export_url: Url,
    authorization: HeaderValue,
}

impl std::fmt::Debug for DsmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DsmClient")
            .field("export_url", &self.export_url.as_str())
            .field("authorization", &"[REDACTED]")
            .finish()
    }
}

impl DsmClient {
    /// Create a client. Fails before any network I/O when the endpoint or
    /// the API key is missing or unusable.
    pub fn new(endpoint: &str, api_key: &ApiKey, http: Client) -> Result<Self, AuthError> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            error!("DSM endpoint is empty");
            return Err(AuthError::MissingEndpoint);
        }
        if api_key.is_blank() {
            error!("DSM API key is empty");
            return Err(AuthError::MissingCredential);
        }

        let export_url = export_url(endpoint)?;

        let mut authorization =
            HeaderValue::from_str(&format!("Basic {}", api_key.expose_secret().trim()))
                .map_err(|_| AuthError::InvalidCredential {
                    reason: "contains characters not allowed in an HTTP header".to_string(),
                })?;
        authorization.set_sensitive(true);

        Ok(Self { http, export_url, authorization })
    }

    /// Full URL of the export call.
    pub fn export_url(&self) -> &Url {
        &self.export_url
    }
}

/// Resolve the export URL, keeping any path prefix of the endpoint.
fn export_url(endpoint: &str) -> Result<Url, AuthError> {
    let invalid = |reason: String| AuthError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };

    let mut url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }

    let path = format!("{}{}", url.path().trim_end_matches('/'), EXPORT_PATH);
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

async fn error_body(response: reqwest::Response) -> String {
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

#[async_trait]
impl SecretStore for DsmClient {
    async fn fetch_by_name(&self, name: &str) -> Result<Vec<u8>, FetchError> {
        debug!(secret = %name, url = %self.export_url, "Exporting security object from DSM");

        let response = self
            .http
            .post(self.export_url.clone())
            .header(AUTHORIZATION, self.authorization.clone())
            .json(&SobjectDescriptor { name })
            .send()
            .await
            .map_err(|e| {
                warn!(secret = %name, error = %e, "DSM request failed");
                FetchError::transport(name, e.to_string())
            })?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => return Err(FetchError::not_found(name)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = error_body(response).await;
                return Err(FetchError::unauthorized(name, format!("{}: {}", status, body)));
            }
            s if !s.is_success() => {
                let body = error_body(response).await;
                return Err(FetchError::transport(
                    name,
                    format!("unexpected status {}: {}", status, body),
                ));
            }
            _ => {}
        }

        let sobject: ExportedSobject = response.json().await.map_err(|e| {
            FetchError::transport(name, format!("invalid export response: {}", e))
        })?;

        let Some(encoded) = sobject.value else {
            debug!(secret = %name, "Security object has no value");
            return Err(FetchError::not_found(name));
        };

        BASE64_STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| FetchError::transport(name, format!("invalid base64 value: {}", e)))
    }
}

/// Hands every mount call a [`DsmClient`] sharing one connection pool.
#[derive(Debug, Clone)]
pub struct DsmConnector {
    http: Client,
}

impl DsmConnector {
    /// Build a connector whose requests time out after `request_timeout`.
    pub fn new(request_timeout: Duration) -> Result<Self, Error> {
        let http = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("fortanix-csi-provider/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build DSM HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

impl SecretStoreConnector for DsmConnector {
    type Store = DsmClient;

    fn connect(&self, endpoint: &str, api_key: &ApiKey) -> Result<DsmClient, AuthError> {
        DsmClient::new(endpoint, api_key, self.http.clone())
    }
}
