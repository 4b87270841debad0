//! Telemetry events
//!
//! Each producer publishes one variant of [`TelemetryEvent`]. The wire form is
//! JSON with an adjacent tag, e.g. `{"type":"alert","data":{...}}`, and
//! timestamps are RFC 3339 strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TelemetryEvent {
    Alert(AlertEvent),
    Metrics(MetricsSnapshot),
    Log(LogEntry),
    Traffic(TrafficUpdate),
}

impl TelemetryEvent {
    /// The channel this kind of event is published on.
    pub fn channel(&self) -> &'static str {
        match self {
            TelemetryEvent::Alert(_) => "alerts",
            TelemetryEvent::Metrics(_) => "metrics",
            TelemetryEvent::Log(_) => "logs",
            TelemetryEvent::Traffic(_) => "network_traffic",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TelemetryEvent::Alert(e) => e.timestamp,
            TelemetryEvent::Metrics(e) => e.timestamp,
            TelemetryEvent::Log(e) => e.timestamp,
            TelemetryEvent::Traffic(e) => e.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub alert_id: String,
    pub timestamp: DateTime<Utc>,
    pub level: AlertLevel,
    /// `network`, `security` or `system`.
    pub category: String,
    pub action: String,
    pub message: String,
    pub source_ip: String,
    pub source_port: u16,
    /// 0 to 100.
    pub severity_score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub network_io: f64,
    pub uptime: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatMetrics {
    pub total_detected: u64,
    pub blocked_attacks: u64,
    pub active_threats: u64,
    pub threat_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetrics {
    pub total_connections: u64,
    pub data_processed: String,
    pub bandwidth_usage: f64,
    pub regions_monitored: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub system: SystemMetrics,
    pub threats: ThreatMetrics,
    pub network: NetworkMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub source: String,
}

/// One arc on the traffic globe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkArc {
    pub id: String,
    pub start_lat: f64,
    pub start_lng: f64,
    pub end_lat: f64,
    pub end_lng: f64,
    pub is_attack: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub color: String,
    #[serde(
        rename = "attack_type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub attack_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficUpdate {
    pub timestamp: DateTime<Utc>,
    pub arcs: Vec<NetworkArc>,
}

impl From<AlertEvent> for TelemetryEvent {
    fn from(event: AlertEvent) -> Self {
        TelemetryEvent::Alert(event)
    }
}

impl From<MetricsSnapshot> for TelemetryEvent {
    fn from(event: MetricsSnapshot) -> Self {
        TelemetryEvent::Metrics(event)
    }
}

impl From<LogEntry> for TelemetryEvent {
    fn from(event: LogEntry) -> Self {
        TelemetryEvent::Log(event)
    }
}

impl From<TrafficUpdate> for TelemetryEvent {
    fn from(event: TrafficUpdate) -> Self {
        TelemetryEvent::Traffic(event)
    }
}
