//! # Observability
//!
//! Structured logging, per-call gRPC logging and the HTTP health probe.

pub mod grpc_tracing;
pub mod health;
pub mod logging;

pub use grpc_tracing::GrpcTracingLayer;
pub use health::{health_router, Readiness};
pub use logging::{init_logging, log_settings};
