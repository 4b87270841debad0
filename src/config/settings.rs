use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Groups the server, broadcaster, simulator and logging configurations.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub broadcaster: BroadcasterSettings,
    pub simulator: SimulatorSettings,
    pub log: LogSettings,
}

/// Configuration settings for the server.
///
/// Defines the host and port the WebSocket listener binds to.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Configuration settings for the channel broadcaster.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BroadcasterSettings {
    /// Channels registered up front. Others are created on first connect.
    pub channels: Vec<String>,
    /// Upper bound on live connections across all channels. `0` disables it.
    pub max_connections: usize,
    /// Outgoing frames buffered per connection before sends start to wait.
    pub send_buffer: usize,
    /// How long a single send may wait on a full buffer before it fails.
    pub send_timeout_ms: u64,
}

/// Configuration for the synthetic telemetry producers.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SimulatorSettings {
    pub enabled: bool,
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broadcaster: Option<PartialBroadcasterSettings>,
    pub simulator: Option<PartialSimulatorSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBroadcasterSettings {
    pub channels: Option<Vec<String>>,
    pub max_connections: Option<usize>,
    pub send_buffer: Option<usize>,
    pub send_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialSimulatorSettings {
    pub enabled: Option<bool>,
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            broadcaster: BroadcasterSettings::default(),
            simulator: SimulatorSettings {
                enabled: true,
                interval_secs: 3,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Default for BroadcasterSettings {
    fn default() -> Self {
        Self {
            channels: crate::broadcaster::DEFAULT_CHANNELS
                .iter()
                .map(|c| c.to_string())
                .collect(),
            max_connections: 100,
            send_buffer: 64,
            send_timeout_ms: 1000,
        }
    }
}

impl PartialSettings {
    /// Fills every missing value from `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let server = self.server;
        let broadcaster = self.broadcaster;
        let simulator = self.simulator;
        let log = self.log;

        Settings {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(default.server.host),
                port: server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(default.server.port),
            },
            broadcaster: BroadcasterSettings {
                channels: broadcaster
                    .as_ref()
                    .and_then(|b| b.channels.clone())
                    .unwrap_or(default.broadcaster.channels),
                max_connections: broadcaster
                    .as_ref()
                    .and_then(|b| b.max_connections)
                    .unwrap_or(default.broadcaster.max_connections),
                send_buffer: broadcaster
                    .as_ref()
                    .and_then(|b| b.send_buffer)
                    .unwrap_or(default.broadcaster.send_buffer),
                send_timeout_ms: broadcaster
                    .as_ref()
                    .and_then(|b| b.send_timeout_ms)
                    .unwrap_or(default.broadcaster.send_timeout_ms),
            },
            simulator: SimulatorSettings {
                enabled: simulator
                    .as_ref()
                    .and_then(|s| s.enabled)
                    .unwrap_or(default.simulator.enabled),
                interval_secs: simulator
                    .as_ref()
                    .and_then(|s| s.interval_secs)
                    .unwrap_or(default.simulator.interval_secs),
            },
            log: LogSettings {
                level: log
                    .and_then(|l| l.level)
                    .unwrap_or(default.log.level),
            },
        }
    }
}
