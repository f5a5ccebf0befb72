use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use fortanix_csi_provider::{
    observability::{init_logging, log_settings},
    provider::{MountHandler, Versioner},
    secrets::DsmConnector,
    server::{self, CsiProviderService},
    version::BuildInfo,
    ProviderSettings, APP_NAME, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (optional - won't fail if missing)
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let settings = ProviderSettings::parse();

    if settings.version {
        println!("{}", BuildInfo::current().json()?);
        return Ok(());
    }

    settings.validate().context("invalid provider settings")?;

    init_logging(settings.log_format);
    info!(app_name = APP_NAME, version = VERSION, "Starting Fortanix CSI provider");
    log_settings(&settings);

    let defaults = settings.env_defaults();
    if defaults.api_key.is_none() {
        // Mounts fail validation until the key is provided; the server still starts.
        tracing::warn!("FORTANIX_API_KEY is not set; every mount will be rejected");
    }

    let connector = DsmConnector::new(settings.dsm_timeout())?;
    let versioner = Versioner::from_key(settings.integrity_key.as_ref())?;
    let handler = MountHandler::new(connector, defaults)
        .with_versioner(versioner)
        .with_max_response_bytes(settings.max_response_bytes);
    let service = CsiProviderService::new(handler).with_mount_timeout(settings.mount_timeout());

    let shutdown = CancellationToken::new();
    server::cancel_on_signal(shutdown.clone())?;

    server::run(service, &settings.endpoint, &settings.health_address, shutdown)
        .await
        .context("error running provider")?;

    info!("Provider stopped");
    Ok(())
}
