//! Configuration for ktest-daemon

use crate::error::DaemonError;
use ktest_policy::{PolicyConfig, PolicyMode};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Admission policy configuration
    #[serde(default)]
    pub policy: AdmissionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Budget for a single policy decision in milliseconds
    #[serde(default = "default_decision_timeout")]
    pub decision_timeout_ms: u64,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    /// TLS material; plain HTTP when absent
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            decision_timeout_ms: default_decision_timeout(),
            max_body_size: default_max_body_size(),
            tls: None,
        }
    }
}

impl ServerConfig {
    /// Decision budget as a duration
    pub fn decision_timeout(&self) -> Duration {
        Duration::from_millis(self.decision_timeout_ms)
    }
}

/// TLS certificate and key, both PEM encoded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Path to the x509 certificate chain
    pub cert_file: PathBuf,

    /// Path to the private key matching `cert_file`
    pub key_file: PathBuf,
}

/// Admission policy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdmissionConfig {
    #[serde(flatten)]
    pub policy: PolicyConfig,

    /// Allow every change without consulting the policy
    #[serde(default)]
    pub observe_only: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8443))
}

fn default_decision_timeout() -> u64 {
    2000
}

fn default_max_body_size() -> usize {
    10 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from defaults, an optional file and the environment
    ///
    /// Environment variables use the `KTEST_` prefix and `__` between
    /// sections, e.g. `KTEST_POLICY__MAX_DENIALS=5`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("KTEST")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Reject settings the policies cannot run with
    pub fn validate(&self) -> Result<(), DaemonError> {
        let policy = &self.policy.policy;
        if policy.max_denials == 0 {
            return Err(DaemonError::Config(
                "policy.max_denials must be at least 1".to_string(),
            ));
        }
        if policy.mode == PolicyMode::Delay && policy.max_delay_secs == 0 {
            return Err(DaemonError::Config(
                "policy.max_delay_secs must be at least 1 in delay mode".to_string(),
            ));
        }
        if policy.mode == PolicyMode::Delay && policy.marker_annotation.is_empty() {
            return Err(DaemonError::Config(
                "policy.marker_annotation must not be empty in delay mode".to_string(),
            ));
        }
        if self.server.decision_timeout_ms == 0 {
            return Err(DaemonError::Config(
                "server.decision_timeout_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8443);
        assert!(config.server.tls.is_none());
        assert_eq!(config.policy.policy.mode, PolicyMode::Streak);
        assert_eq!(config.policy.policy.max_denials, 20);
        assert!(!config.policy.observe_only);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.decision_timeout(), Duration::from_secs(2));
        assert_eq!(config.max_body_size, 10 * 1024 * 1024);
    }

    #[test]
    fn test_policy_section_is_flat() {
        let config: DaemonConfig = serde_json::from_str(
            r#"{"policy": {"mode": "delay", "max_delay_secs": 3, "observe_only": true}}"#,
        )
        .unwrap();
        assert_eq!(config.policy.policy.mode, PolicyMode::Delay);
        assert_eq!(config.policy.policy.max_delay_secs, 3);
        assert_eq!(config.policy.policy.marker_annotation, "ktest.ibm.com");
        assert!(config.policy.observe_only);
    }

    #[test]
    fn test_validate_rejects_zero_ceiling() {
        let mut config = DaemonConfig::default();
        config.policy.policy.max_denials = 0;
        assert!(matches!(config.validate(), Err(DaemonError::Config(_))));
    }

    #[test]
    fn test_validate_delay_mode() {
        let mut config = DaemonConfig::default();
        config.policy.policy.mode = PolicyMode::Delay;
        config.policy.policy.max_delay_secs = 0;
        assert!(config.validate().is_err());

        config.policy.policy.max_delay_secs = 5;
        assert!(config.validate().is_ok());

        // Zero delay is fine while the delay policy is not selected
        config.policy.policy.mode = PolicyMode::Streak;
        config.policy.policy.max_delay_secs = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_defaults_without_file() {
        let config = DaemonConfig::load(None).unwrap();
        assert_eq!(config.policy.policy.max_denials, 20);
    }
}
