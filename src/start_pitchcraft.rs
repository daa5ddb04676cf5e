//! Startup helpers for the `PitchCraft` server.

use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;

use crate::chat::core::config::ChatConfig;
use crate::server::{self, AppState};

/// Run the server (used by the `pitchcraft-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting PitchCraft v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            return ExitCode::from(1);
        }
    };
    tracing::info!(
        store = config.store.backend.as_str(),
        inference = config.inference.provider.as_str(),
        auth = config.auth.backend.as_str(),
        "configuration loaded"
    );

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let result = rt.block_on(async {
        let state = initialize(config).await?;
        server::run_server(state).await
    });
    if let Err(e) = result {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Read `PITCHCRAFT_*` settings from the environment and validate them.
///
/// # Errors
/// Returns an error if a variable cannot be parsed or the result is invalid.
pub fn load_config() -> Result<ChatConfig, Box<dyn std::error::Error + Send + Sync>> {
    let config = ChatConfig::from_env()?;
    config.validate()?;
    Ok(config)
}

/// Initialize application state without starting the server.
///
/// # Errors
/// Returns an error if state creation fails.
pub async fn initialize(
    config: ChatConfig,
) -> Result<Arc<AppState>, Box<dyn std::error::Error + Send + Sync>> {
    AppState::new(config)
        .await
        .map_err(|e| format!("Failed to create state: {e}").into())
}

/// Run server with graceful shutdown.
///
/// # Errors
/// Returns an error if the server fails.
pub async fn run_server_with_shutdown<F>(
    state: Arc<AppState>,
    shutdown_signal: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    server::run_server_with_shutdown(state, shutdown_signal).await
}
