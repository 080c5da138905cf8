pub mod change;
pub mod config;
pub mod csv;
pub mod events;
pub mod geo;
pub mod routing;
pub mod sheets;
pub mod weather;

pub use config::{Config, load_config};

use crate::error::InitializationError;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub mod error {
    use thiserror::Error;
    use tracing::dispatcher::SetGlobalDefaultError;

    pub use crate::sheets::layout::SchemaError;

    #[derive(Debug, Error)]
    pub enum ConfigError {
        #[error("failed to load configuration: {0}")]
        Figment(#[from] figment::Error),
    }

    #[derive(Debug, Error)]
    pub enum InitializationError {
        #[error(transparent)]
        Tracing(#[from] SetGlobalDefaultError),
        #[error(transparent)]
        Config(#[from] ConfigError),
        #[error("invalid column layout for {source_name}: {error}")]
        Layout {
            source_name: &'static str,
            #[source]
            error: SchemaError,
        },
        #[error(transparent)]
        Http(#[from] reqwest::Error),
    }
}

/// Installs the compact console subscriber, filtered by `RUST_LOG`.
pub fn init_tracing() -> Result<(), InitializationError> {
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_env_filter(EnvFilter::from_default_env())
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

pub async fn shutdown_listener(token: Option<CancellationToken>) {
    let ctrl_c = signal::ctrl_c();
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(name: "signal.sigterm.unavailable", error = ?e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(name: "signal.ctrlc.received", "received Ctrl+C signal, shutting down"),
        () = terminate => info!(name: "signal.sigterm.received", "received SIGTERM signal, shutting down"),
    }

    if let Some(token) = token {
        token.cancel();
    }
}
