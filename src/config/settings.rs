use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration settings for the relay.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub relay: RelaySettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

/// Bind host and the two listener ports.
///
/// Submissions arrive on `http_port`, subscribers connect on `ws_port`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub ws_port: u16,
    pub http_port: u16,
}

impl ServerSettings {
    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.host, self.ws_port)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

/// Fan-out parameters.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RelaySettings {
    /// Upper bound for a single send to a single subscriber.
    pub send_timeout_ms: u64,
    /// Capacity of each subscriber's outbound queue.
    pub outbound_buffer: usize,
    pub max_subscribers: usize,
    /// Text sent to every subscriber right after it connects. Empty disables it.
    pub greeting: String,
}

impl RelaySettings {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn greeting(&self) -> Option<&str> {
        if self.greeting.is_empty() {
            None
        } else {
            Some(&self.greeting)
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageSettings {
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from [`Settings::default`].
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub relay: Option<PartialRelaySettings>,
    pub storage: Option<PartialStorageSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub ws_port: Option<u16>,
    pub http_port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialRelaySettings {
    pub send_timeout_ms: Option<u64>,
    pub outbound_buffer: Option<usize>,
    pub max_subscribers: Option<usize>,
    pub greeting: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialStorageSettings {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                ws_port: 3000,
                http_port: 3001,
            },
            relay: RelaySettings {
                send_timeout_ms: 1000,
                outbound_buffer: 64,
                max_subscribers: 1000,
                greeting: "Connection Established".to_string(),
            },
            storage: StorageSettings {
                path: "data.db".to_string(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Overlay the values that were provided on top of `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let relay = self.relay.unwrap_or_default();
        let storage = self.storage.unwrap_or_default();
        let logging = self.logging.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(default.server.host),
                ws_port: server.ws_port.unwrap_or(default.server.ws_port),
                http_port: server.http_port.unwrap_or(default.server.http_port),
            },
            relay: RelaySettings {
                send_timeout_ms: relay
                    .send_timeout_ms
                    .unwrap_or(default.relay.send_timeout_ms),
                outbound_buffer: relay
                    .outbound_buffer
                    .unwrap_or(default.relay.outbound_buffer),
                max_subscribers: relay
                    .max_subscribers
                    .unwrap_or(default.relay.max_subscribers),
                greeting: relay.greeting.unwrap_or(default.relay.greeting),
            },
            storage: StorageSettings {
                path: storage.path.unwrap_or(default.storage.path),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(default.logging.level),
            },
        }
    }
}
