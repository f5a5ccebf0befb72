//! Mock Fortanix DSM for integration tests
//!
//! A wiremock server answering `POST /crypto/v1/keys/export` the way DSM
//! does: the exported object carries its material base64 encoded in `value`.

#![allow(dead_code)]

use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const EXPORT_PATH: &str = "/crypto/v1/keys/export";

/// API key used by every test; DSM keys are base64 `app-id:secret` pairs.
pub const TEST_API_KEY: &str = "YXBwLWlkOmFwcC1zZWNyZXQ=";

pub struct MockDsm {
    pub server: MockServer,
}

impl MockDsm {
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Serve `value` for the security object `name`.
    pub async fn with_secret(&self, name: &str, value: &[u8]) -> &Self {
        Mock::given(method("POST"))
            .and(path(EXPORT_PATH))
            .and(header("authorization", format!("Basic {}", TEST_API_KEY).as_str()))
            .and(body_json(json!({ "name": name })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": name,
                "obj_type": "SECRET",
                "value": BASE64_STANDARD.encode(value),
            })))
            .mount(&self.server)
            .await;
        self
    }

    /// Answer requests for `name` with `status` and `body`.
    pub async fn with_response(&self, name: &str, status: u16, body: serde_json::Value) -> &Self {
        Mock::given(method("POST"))
            .and(path(EXPORT_PATH))
            .and(body_json(json!({ "name": name })))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
        self
    }

    /// Answer requests for `name` with `status` and a raw body.
    pub async fn with_raw_response(&self, name: &str, status: u16, body: &str) -> &Self {
        Mock::given(method("POST"))
            .and(path(EXPORT_PATH))
            .and(body_json(json!({ "name": name })))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.server)
            .await;
        self
    }

    /// Number of export calls received so far.
    pub async fn export_calls(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.iter().filter(|r| r.url.path() == EXPORT_PATH).count())
            .unwrap_or(0)
    }
}

/// Attributes JSON as the CSI driver sends it.
pub fn attributes(endpoint: &str, objects: &str) -> String {
    json!({
        "dsmEndpoint": endpoint,
        "objects": objects,
        "csi.storage.k8s.io/pod.name": "web-0",
        "csi.storage.k8s.io/pod.namespace": "default",
    })
    .to_string()
}
