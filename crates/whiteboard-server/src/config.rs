//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;
use whiteboard_session::{LayoutConfig, OverflowPolicy, SessionConfig, MAX_QUEUE_CAPACITY};

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Per-connection session settings.
    #[serde(default)]
    pub session: SessionSettings,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by CORS. `"*"` allows any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

/// Queue and layout settings applied to every whiteboard session.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_inbound_capacity")]
    pub inbound_capacity: usize,

    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,

    /// `block` or `fail`.
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,

    #[serde(default = "default_apply_timeout_ms")]
    pub apply_timeout_ms: u64,

    #[serde(default)]
    pub layout: LayoutConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "whiteboard_session=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
    ]
}

fn default_inbound_capacity() -> usize {
    64
}

fn default_outbound_capacity() -> usize {
    256
}

fn default_apply_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            inbound_capacity: default_inbound_capacity(),
            outbound_capacity: default_outbound_capacity(),
            overflow_policy: OverflowPolicy::default(),
            apply_timeout_ms: default_apply_timeout_ms(),
            layout: LayoutConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl SessionSettings {
    /// Settings for a freshly started [`whiteboard_session::CommandSession`].
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            inbound_capacity: self.inbound_capacity,
            outbound_capacity: self.outbound_capacity,
            overflow_policy: self.overflow_policy,
            apply_timeout: Duration::from_millis(self.apply_timeout_ms),
            layout: self.layout,
        }
    }
}

impl Config {
    /// Rejects values a session cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.session;
        check_capacity("session.inbound_capacity", session.inbound_capacity)?;
        check_capacity("session.outbound_capacity", session.outbound_capacity)?;
        if session.apply_timeout_ms == 0 {
            return Err(ConfigError::Invalid("session.apply_timeout_ms must be at least 1".into()));
        }
        if session.layout.columns == 0 {
            return Err(ConfigError::Invalid("session.layout.columns must be at least 1".into()));
        }
        Ok(())
    }
}

fn check_capacity(field: &str, value: usize) -> Result<(), ConfigError> {
    if (1..=MAX_QUEUE_CAPACITY).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{field} must be between 1 and {MAX_QUEUE_CAPACITY}, got {value}"
        )))
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration parsed but holds an unusable value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `WHITEBOARD_HOST` overrides `server.host`
/// - `WHITEBOARD_PORT` overrides `server.port`
/// - `WHITEBOARD_LOG_LEVEL` overrides `logging.level`
/// - `WHITEBOARD_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `WHITEBOARD_OUTBOUND_CAPACITY` overrides `session.outbound_capacity`
/// - `WHITEBOARD_OVERFLOW_POLICY` overrides `session.overflow_policy`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed, or
/// if the result fails [`Config::validate`].
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Applies `WHITEBOARD_*` overrides read through `lookup`.
///
/// Values that fail to parse are ignored with a warning.
pub fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("WHITEBOARD_HOST") {
        match host.parse() {
            Ok(parsed) => config.server.host = parsed,
            Err(_) => tracing::warn!(value = %host, "ignoring invalid WHITEBOARD_HOST"),
        }
    }
    if let Some(port) = lookup("WHITEBOARD_PORT") {
        match port.parse() {
            Ok(parsed) => config.server.port = parsed,
            Err(_) => tracing::warn!(value = %port, "ignoring invalid WHITEBOARD_PORT"),
        }
    }
    if let Some(level) = lookup("WHITEBOARD_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("WHITEBOARD_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(capacity) = lookup("WHITEBOARD_OUTBOUND_CAPACITY") {
        match capacity.parse() {
            Ok(parsed) => config.session.outbound_capacity = parsed,
            Err(_) => {
                tracing::warn!(value = %capacity, "ignoring invalid WHITEBOARD_OUTBOUND_CAPACITY")
            }
        }
    }
    if let Some(policy) = lookup("WHITEBOARD_OVERFLOW_POLICY") {
        match policy.parse() {
            Ok(parsed) => config.session.overflow_policy = parsed,
            Err(e) => tracing::warn!(error = %e, "ignoring invalid WHITEBOARD_OVERFLOW_POLICY"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.server.cors_origins.len(), 2);
        assert_eq!(config.session.inbound_capacity, 64);
        assert_eq!(config.session.outbound_capacity, 256);
        assert_eq!(config.session.overflow_policy, OverflowPolicy::Block);
        assert_eq!(config.session.apply_timeout_ms, 5_000);
        assert_eq!(config.session.layout.columns, 4);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.session.outbound_capacity, 256);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9100

[session]
overflow_policy = "fail"
apply_timeout_ms = 250

[session.layout]
columns = 6
"#
        )
        .unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.session.overflow_policy, OverflowPolicy::Fail);
        assert_eq!(config.session.layout.columns, 6);
        assert_eq!(config.session.layout.spacing_x, 200.0);

        let session = config.session.to_session_config();
        assert_eq!(session.apply_timeout, Duration::from_millis(250));
        assert_eq!(session.inbound_capacity, 64);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport = ").unwrap();
        let err = load_config(file.path().to_str()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session]\noutbound_capacity = 0").unwrap();
        let err = load_config(file.path().to_str()).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("outbound_capacity")),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn oversized_inbound_capacity_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session]\ninbound_capacity = {}", MAX_QUEUE_CAPACITY + 1).unwrap();
        let err = load_config(file.path().to_str()).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("inbound_capacity")),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn oversized_outbound_capacity_from_env_is_rejected() {
        let mut config = Config::default();
        apply_overrides(&mut config, |key| {
            (key == "WHITEBOARD_OUTBOUND_CAPACITY").then(|| u64::MAX.to_string())
        });
        let err = config.validate().unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("outbound_capacity")),
            other => panic!("expected Invalid, got {other:?}"),
        }

        config.session.outbound_capacity = MAX_QUEUE_CAPACITY;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_apply_and_bad_values_are_ignored() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("WHITEBOARD_HOST", "0.0.0.0"),
            ("WHITEBOARD_PORT", "not-a-port"),
            ("WHITEBOARD_LOG_JSON", "1"),
            ("WHITEBOARD_OUTBOUND_CAPACITY", "32"),
            ("WHITEBOARD_OVERFLOW_POLICY", "FAIL"),
        ]);
        let mut config = Config::default();
        apply_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.host, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.server.port, 8000);
        assert!(config.logging.json);
        assert_eq!(config.session.outbound_capacity, 32);
        assert_eq!(config.session.overflow_policy, OverflowPolicy::Fail);
    }
}
