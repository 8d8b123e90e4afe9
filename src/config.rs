// src/config.rs

use crate::types::ConnectionParams;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct InstrumentConfig {
    pub symbol: String,
    pub portfolio: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_connection")]
    pub connection: ConnectionParams,
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub disconnect_timeout_ms: u64,
    /// Capacity of the venue -> pump event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    #[serde(default = "default_notice_buffer")]
    pub notice_buffer: usize,
    #[serde(default = "default_quote_poll_ms")]
    pub quote_poll_ms: u64,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    #[serde(default)]
    pub instruments: Vec<InstrumentConfig>,
}

fn default_connection() -> ConnectionParams {
    ConnectionParams {
        host: "127.0.0.1".to_string(),
        port: 8443,
        login: String::new(),
        password: String::new(),
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_event_buffer() -> usize {
    1024
}

fn default_notice_buffer() -> usize {
    256
}

fn default_quote_poll_ms() -> u64 {
    200
}

fn default_state_file() -> String {
    "session_state.json".to_string()
}

impl AppConfig {
    /// `Settings.{toml,json,yaml}` if present, then `APP_*` overrides
    /// (`APP_CONNECTION__HOST`, `APP_CONNECT_TIMEOUT_MS`, ...).
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("Settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            quote_poll: Duration::from_millis(self.quote_poll_ms),
            notice_buffer: self.notice_buffer,
            first_correlation_id: 0,
        }
    }
}

/// Runtime knobs of a [`Session`](crate::core::session::Session).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sleep between checks while waiting for an instrument's first quote.
    pub quote_poll: Duration,
    pub notice_buffer: usize,
    pub first_correlation_id: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            quote_poll: Duration::from_millis(default_quote_poll_ms()),
            notice_buffer: default_notice_buffer(),
            first_correlation_id: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(
                r#"
                [[instruments]]
                symbol = "ABC"
                portfolio = "P1"
                "#,
                FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.connection.port, 8443);
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.session().quote_poll, Duration::from_millis(200));
        assert_eq!(
            config.instruments,
            vec![InstrumentConfig {
                symbol: "ABC".to_string(),
                portfolio: "P1".to_string(),
            }]
        );
    }

    #[test]
    fn test_connection_section_is_read() {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(
                r#"
                connect_timeout_ms = 2500
                [connection]
                host = "venue.example"
                port = 443
                login = "trader"
                password = "secret"
                "#,
                FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.connection.host, "venue.example");
        assert_eq!(config.connection.login, "trader");
        assert_eq!(config.connect_timeout(), Duration::from_millis(2500));
        assert!(config.instruments.is_empty());
    }
}
