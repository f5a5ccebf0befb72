//! gRPC call logging
//!
//! Tower middleware wrapped around the provider's gRPC service. Every call
//! runs inside a `grpc_call` span carrying a fresh request id, and one event
//! is emitted when the call finishes with its duration and gRPC status.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use http::{HeaderMap, Request, Response};
use tower::{Layer, Service};
use tracing::{Instrument, Span};

/// Tower layer that logs every gRPC call.
#[derive(Debug, Clone, Default)]
pub struct GrpcTracingLayer;

impl GrpcTracingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for GrpcTracingLayer {
    type Service = GrpcTracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GrpcTracingService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct GrpcTracingService<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for GrpcTracingService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::fmt::Display,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let (service_name, method_name) = parse_grpc_path(request.uri().path());
        let span = crate::grpc_span!(service_name, method_name);

        // Take the service that was driven to readiness, leave a fresh clone.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = inner.call(request).await;
                let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

                let span = Span::current();
                span.record("grpc.duration_ms", duration_ms);

                match &result {
                    Ok(response) => {
                        let status = grpc_status(response.headers());
                        span.record("grpc.status", status);
                        if status == "0" {
                            tracing::info!(duration_ms, "gRPC call completed");
                        } else {
                            tracing::warn!(duration_ms, grpc_status = status, "gRPC call failed");
                        }
                    }
                    Err(e) => {
                        span.record("grpc.status", "transport_error");
                        tracing::error!(duration_ms, error = %e, "gRPC call errored");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}

/// Status from a trailers-only response; successful unary calls carry their
/// status in the trailers instead, which is always OK for this service.
fn grpc_status(headers: &HeaderMap) -> &str {
    headers.get("grpc-status").and_then(|v| v.to_str().ok()).unwrap_or("0")
}

/// Split `/package.Service/Method` into service and method.
fn parse_grpc_path(path: &str) -> (String, String) {
    let parts: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    match parts.as_slice() {
        [service, method] => (service.to_string(), method.to_string()),
        [single] if !single.is_empty() => (single.to_string(), "unknown".to_string()),
        _ => ("unknown".to_string(), "unknown".to_string()),
    }
}
