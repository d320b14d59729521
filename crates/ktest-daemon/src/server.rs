//! Server setup and lifecycle management

use crate::api::{create_router, AppState};
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use axum_server::tls_rustls::RustlsConfig;
use std::time::Duration;
use tokio::net::TcpListener;

/// Grace period for in-flight reviews on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// ktest admission webhook server
pub struct Server {
    config: DaemonConfig,
    state: AppState,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: DaemonConfig) -> DaemonResult<Self> {
        config.validate()?;
        let state = AppState::from_config(&config);
        Ok(Self { config, state })
    }

    /// Run the server until a shutdown signal arrives
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let app = create_router(self.state.clone());

        tracing::info!("Policy mode: {}", self.state.mode);
        if self.state.observe_only {
            tracing::warn!("Observe-only mode: every change will be admitted");
        }

        match &self.config.server.tls {
            Some(tls) => {
                let rustls = RustlsConfig::from_pem_file(&tls.cert_file, &tls.key_file)
                    .await
                    .map_err(|e| {
                        DaemonError::Tls(format!(
                            "loading {} / {}: {}",
                            tls.cert_file.display(),
                            tls.key_file.display(),
                            e
                        ))
                    })?;

                let handle = axum_server::Handle::new();
                tokio::spawn({
                    let handle = handle.clone();
                    async move {
                        shutdown_signal().await;
                        handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
                    }
                });

                tracing::info!("ktest webhook listening on https://{}", addr);
                axum_server::bind_rustls(addr, rustls)
                    .handle(handle)
                    .serve(app.into_make_service())
                    .await
                    .map_err(|e| DaemonError::Server(e.to_string()))?;
            }
            None => {
                let listener = TcpListener::bind(addr).await?;
                tracing::info!("ktest webhook listening on http://{}", addr);
                axum::serve(listener, app)
                    .with_graceful_shutdown(shutdown_signal())
                    .await
                    .map_err(|e| DaemonError::Server(e.to_string()))?;
            }
        }

        tracing::info!("ktest webhook shutting down");
        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
