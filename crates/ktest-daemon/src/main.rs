//! ktest Daemon - Admission webhook verifying idempotent controller retries
//!
//! The daemon provides:
//! - `POST /mutate` and `POST /validate` for `AdmissionReview` envelopes
//! - `GET /health` and `GET /status`

use clap::Parser;
use ktest_daemon::error::{DaemonError, DaemonResult};
use ktest_daemon::{DaemonConfig, Server};
use ktest_policy::PolicyMode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// ktest Daemon CLI
#[derive(Parser)]
#[command(name = "ktestd")]
#[command(about = "ktest - Admission webhook verifying idempotent controller retries", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "KTEST_CONFIG")]
    config: Option<String>,

    /// Listen address
    #[arg(short, long, env = "KTEST_LISTEN_ADDR")]
    listen: Option<String>,

    /// Policy mode (streak or delay)
    #[arg(short, long, env = "KTEST_MODE")]
    mode: Option<String>,

    /// Lifetime denial ceiling per resource
    #[arg(long, env = "KTEST_MAX_DENIALS")]
    max_denials: Option<u32>,

    /// Path to the x509 certificate for https
    #[arg(long, env = "KTEST_TLS_CERT_FILE", requires = "tls_key")]
    tls_cert: Option<String>,

    /// Path to the x509 private key matching the certificate
    #[arg(long, env = "KTEST_TLS_KEY_FILE", requires = "tls_cert")]
    tls_key: Option<String>,

    /// Admit every change without evaluating it
    #[arg(long, env = "KTEST_OBSERVE_ONLY")]
    observe_only: bool,

    /// Log level
    #[arg(long, env = "KTEST_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "KTEST_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }

    if let Some(mode) = &cli.mode {
        config.policy.policy.mode = match mode.to_lowercase().as_str() {
            "streak" => PolicyMode::Streak,
            "delay" => PolicyMode::Delay,
            other => {
                return Err(DaemonError::Config(format!(
                    "Unknown policy mode: {}",
                    other
                )));
            }
        };
    }

    if let Some(max_denials) = cli.max_denials {
        config.policy.policy.max_denials = max_denials;
    }

    if let (Some(cert_file), Some(key_file)) = (&cli.tls_cert, &cli.tls_key) {
        config.server.tls = Some(ktest_daemon::config::TlsConfig {
            cert_file: cert_file.into(),
            key_file: key_file.into(),
        });
    }

    if cli.observe_only {
        config.policy.observe_only = true;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        mode = %config.policy.policy.mode,
        max_denials = config.policy.policy.max_denials,
        "Starting ktest webhook"
    );

    let server = Server::new(config)?;
    server.run().await
}
