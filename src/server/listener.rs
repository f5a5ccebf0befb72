//! Unix domain socket the CSI driver connects to.

use std::path::Path;

use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;
use tracing::info;

use crate::errors::{Error, Result};

/// Bind `path`, removing whatever a previous run left there.
pub fn bind_unix_socket(path: impl AsRef<Path>) -> Result<UnixListenerStream> {
    let path = path.as_ref();

    match std::fs::symlink_metadata(path) {
        Ok(_) => {
            info!(endpoint = %path.display(), "Cleaning up pre-existing file at unix socket location");
            std::fs::remove_file(path).map_err(|e| {
                Error::io(
                    format!("failed to clean up pre-existing file at {}", path.display()),
                    e,
                )
            })?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(Error::io(
                format!("failed to check for existence of unix socket {}", path.display()),
                e,
            ));
        }
    }

    info!(endpoint = %path.display(), "Opening unix socket");
    let listener = UnixListener::bind(path).map_err(|e| {
        Error::io(format!("failed to listen on unix socket at {}", path.display()), e)
    })?;

    Ok(UnixListenerStream::new(listener))
}
