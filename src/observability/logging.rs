//! # Structured Logging
//!
//! `tracing-subscriber` setup for the provider binary. The filter comes from
//! `RUST_LOG` and defaults to `info`; output is human readable text or one
//! JSON object per line.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ProviderSettings};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_LOG_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed (integration tests
/// do this); the existing one is kept.
pub fn init_logging(format: LogFormat) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter());

    let result = match format {
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(false))
            .try_init(),
    };

    result.is_ok()
}

/// Log the effective settings at startup. Never logs key material.
pub fn log_settings(settings: &ProviderSettings) {
    tracing::info!(
        socket = %settings.endpoint,
        health_address = %settings.health_address,
        dsm_address = settings.dsm_address.as_deref().unwrap_or("<per SecretProviderClass>"),
        dsm_timeout_secs = settings.dsm_timeout_secs,
        mount_timeout_secs = ?settings.mount_timeout_secs,
        max_response_bytes = settings.max_response_bytes,
        keyed_versions = settings.integrity_key.is_some(),
        "Fortanix CSI provider configuration"
    );
}

/// Span wrapping one gRPC call.
#[macro_export]
macro_rules! grpc_span {
    ($service:expr, $method:expr) => {
        tracing::info_span!(
            "grpc_call",
            rpc.service = %$service,
            rpc.method = %$method,
            request_id = %uuid::Uuid::new_v4(),
            grpc.status = tracing::field::Empty,
            grpc.duration_ms = tracing::field::Empty
        )
    };
}
