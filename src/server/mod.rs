//! # Provider Server
//!
//! Process shell around the mount handler: the gRPC service on the driver's
//! Unix socket, the HTTP health probe, and signal-driven shutdown. Both
//! listeners stop when the shared [`CancellationToken`] is cancelled.

pub mod listener;
pub mod service;

use std::path::{Path, PathBuf};

use tokio_stream::wrappers::UnixListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::{info, warn};

use crate::errors::{Error, Result};
use crate::observability::{health_router, GrpcTracingLayer, Readiness};
use crate::secrets::SecretStoreConnector;

pub use listener::bind_unix_socket;
pub use service::{CsiProviderService, API_VERSION, RUNTIME_NAME};

/// Serve the provider gRPC API on an already bound socket until `shutdown`.
pub async fn serve_grpc<C>(
    service: CsiProviderService<C>,
    incoming: UnixListenerStream,
    readiness: Readiness,
    shutdown: CancellationToken,
) -> Result<()>
where
    C: SecretStoreConnector + 'static,
{
    readiness.set_ready(true);
    info!("Starting gRPC server");

    let result = Server::builder()
        .layer(GrpcTracingLayer::new())
        .add_service(service.into_server())
        .serve_with_incoming_shutdown(incoming, shutdown.cancelled_owned())
        .await;

    readiness.set_ready(false);
    result.map_err(|e| Error::transport(format!("error running gRPC server: {}", e)))
}

/// Serve the health probe on `address` until `shutdown`.
pub async fn serve_health(
    address: &str,
    readiness: Readiness,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|e| Error::io(format!("failed to bind health listener on {}", address), e))?;

    info!(addr = %address, "Starting health handler");

    axum::serve(listener, health_router(readiness))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| Error::io("health handler failed", e))
}

/// Run the gRPC and health listeners until `shutdown` is cancelled or either
/// listener fails. The socket file is removed on exit.
pub async fn run<C>(
    service: CsiProviderService<C>,
    socket_path: impl AsRef<Path>,
    health_address: &str,
    shutdown: CancellationToken,
) -> Result<()>
where
    C: SecretStoreConnector + 'static,
{
    let socket_path: PathBuf = socket_path.as_ref().to_path_buf();
    let incoming = bind_unix_socket(&socket_path)?;
    let readiness = Readiness::new();

    let result = tokio::try_join!(
        serve_grpc(service, incoming, readiness.clone(), shutdown.clone()),
        serve_health(health_address, readiness, shutdown.clone()),
    );
    // Stop the surviving listener when the other one failed.
    shutdown.cancel();

    if let Err(e) = std::fs::remove_file(&socket_path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(endpoint = %socket_path.display(), error = %e, "Failed to remove unix socket");
        }
    }

    result.map(|_| ())
}

/// Cancel `shutdown` on SIGTERM or SIGINT.
pub fn cancel_on_signal(shutdown: CancellationToken) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| Error::io("failed to install SIGTERM handler", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| Error::io("failed to install SIGINT handler", e))?;

    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
            _ = shutdown.cancelled() => return,
        };
        info!(signal = name, "Caught signal, shutting down");
        shutdown.cancel();
    });

    Ok(())
}
