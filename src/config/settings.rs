use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub shutdown: ShutdownSettings,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Heartbeat interval in seconds (server sends ping)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
    /// Connection timeout in seconds (disconnect if no activity)
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    /// Cleanup task interval in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
    /// Outbound messages buffered per connection
    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,
    /// Upper bound for a single delivery to a connection's outbound channel
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

fn default_heartbeat_interval() -> u64 {
    30 // 30 seconds
}

fn default_connection_timeout() -> u64 {
    120 // 2 minutes
}

fn default_cleanup_interval() -> u64 {
    60 // 1 minute
}

fn default_channel_buffer_size() -> usize {
    32
}

fn default_send_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Admission check. Connections are accepted without a token when
/// `secret` is unset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JwtConfig {
    pub secret: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl JwtConfig {
    pub fn is_enabled(&self) -> bool {
        self.secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownSettings {
    #[serde(default = "default_client_notification_timeout")]
    pub client_notification_timeout_secs: u64,
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

fn default_client_notification_timeout() -> u64 {
    5
}

fn default_drain_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .set_default("websocket.heartbeat_interval", default_heartbeat_interval())?
            .set_default("websocket.connection_timeout", default_connection_timeout())?
            .set_default("websocket.cleanup_interval", default_cleanup_interval())?
            .set_default("log.format", "pretty")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // SIGNAL__SERVER__PORT, SIGNAL__JWT__SECRET, SIGNAL__WEBSOCKET__CONNECTION_TIMEOUT, etc.
            .add_source(
                Environment::with_prefix("SIGNAL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            connection_timeout: default_connection_timeout(),
            cleanup_interval: default_cleanup_interval(),
            channel_buffer_size: default_channel_buffer_size(),
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            client_notification_timeout_secs: default_client_notification_timeout(),
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 5000);

        let ws = WebSocketConfig::default();
        assert_eq!(ws.heartbeat_interval, 30);
        assert_eq!(ws.connection_timeout, 120);
        assert_eq!(ws.channel_buffer_size, 32);
        assert_eq!(ws.send_timeout_ms, 5000);
    }

    #[test]
    fn test_jwt_disabled_without_secret() {
        assert!(!JwtConfig::default().is_enabled());
        let empty = JwtConfig {
            secret: Some(String::new()),
            ..Default::default()
        };
        assert!(!empty.is_enabled());
        let set = JwtConfig {
            secret: Some("s3cret".to_string()),
            ..Default::default()
        };
        assert!(set.is_enabled());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let settings: Settings = Config::builder()
            .set_override("websocket.connection_timeout", 15)
            .unwrap()
            .set_override("log.format", "json")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.websocket.connection_timeout, 15);
        assert_eq!(settings.websocket.heartbeat_interval, 30);
        assert_eq!(settings.log.format, LogFormat::Json);
        assert_eq!(settings.server.port, 5000);
        assert!(!settings.jwt.is_enabled());
    }
}
