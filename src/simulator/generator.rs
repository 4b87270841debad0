use chrono::{DateTime, Utc};

use crate::broadcaster::event::{
    AlertEvent, AlertLevel, LogEntry, LogLevel, MetricsSnapshot, NetworkArc, NetworkMetrics,
    SystemMetrics, TelemetryEvent, ThreatMetrics, TrafficUpdate,
};

const RESOURCES: [&str; 6] = [
    "web-server-01",
    "db-primary",
    "api-gateway",
    "cache-cluster",
    "firewall-01",
    "monitoring-node",
];

const INFO_MESSAGES: [&str; 5] = [
    "System scan initiated",
    "Firewall rules updated",
    "Database backup completed",
    "Security patch applied",
    "Service health check passed",
];

const WARN_MESSAGES: [&str; 3] = [
    "High memory usage detected on",
    "Disk usage above 80% on",
    "Unusual network activity from",
];

const ERROR_MESSAGES: [&str; 3] = [
    "Service unavailable:",
    "Intrusion attempt blocked at",
    "Database connection timeout on",
];

/// (city, lat, lng)
const LOCATIONS: [(&str, f64, f64); 6] = [
    ("New York", 40.7128, -74.0060),
    ("London", 51.5074, -0.1278),
    ("Tokyo", 35.6762, 139.6503),
    ("Sao Paulo", -23.5505, -46.6333),
    ("Sydney", -33.8688, 151.2093),
    ("Frankfurt", 50.1109, 8.6821),
];

const ATTACK_TYPES: [&str; 4] = ["ddos", "edos", "port_scan", "brute_force"];

fn pick<T: Copy>(items: &[T], seed: u64) -> T {
    items[(seed % items.len() as u64) as usize]
}

/// Smooth value in `[base - swing, base + swing]`, clamped to a percentage.
fn wave(tick: u64, base: f64, swing: f64, period: f64) -> f64 {
    let v = base + swing * (tick as f64 / period * std::f64::consts::TAU).sin();
    (v.clamp(0.0, 100.0) * 10.0).round() / 10.0
}

pub fn alert(tick: u64, now: DateTime<Utc>) -> TelemetryEvent {
    let level = pick(
        &[AlertLevel::Low, AlertLevel::Medium, AlertLevel::High, AlertLevel::Critical],
        tick,
    );
    let severity_score = match level {
        AlertLevel::Critical => 95,
        AlertLevel::High => 80,
        AlertLevel::Medium => 55,
        AlertLevel::Low => 20,
    };
    let attack = pick(&ATTACK_TYPES, tick / 2);
    let (city, _, _) = pick(&LOCATIONS, tick * 7 + 3);

    TelemetryEvent::Alert(AlertEvent {
        alert_id: format!("ALT-{:06}", tick),
        timestamp: now,
        level,
        category: if attack == "brute_force" { "security" } else { "network" }.to_string(),
        action: format!("{attack}_detected"),
        message: format!("Suspicious {attack} traffic from {city}"),
        source_ip: format!("203.0.113.{}", tick % 254 + 1),
        source_port: 1024 + (tick * 37 % 60000) as u16,
        severity_score,
        recommendation: matches!(level, AlertLevel::High | AlertLevel::Critical)
            .then(|| "Block source IP and review firewall rules".to_string()),
    })
}

pub fn metrics(tick: u64, now: DateTime<Utc>) -> TelemetryEvent {
    TelemetryEvent::Metrics(MetricsSnapshot {
        timestamp: now,
        system: SystemMetrics {
            cpu_usage: wave(tick, 45.0, 25.0, 20.0),
            memory_usage: wave(tick, 60.0, 15.0, 35.0),
            disk_usage: wave(tick, 55.0, 5.0, 120.0),
            network_io: wave(tick, 40.0, 30.0, 12.0),
            uptime: 99.9,
        },
        threats: ThreatMetrics {
            total_detected: 1200 + tick * 3,
            blocked_attacks: 1150 + tick * 3,
            active_threats: tick % 7,
            threat_level: match tick % 7 {
                0..=2 => "low",
                3..=5 => "medium",
                _ => "high",
            }
            .to_string(),
        },
        network: NetworkMetrics {
            total_connections: 800 + (tick * 13) % 400,
            data_processed: format!("{:.1} TB", 2.0 + tick as f64 * 0.01),
            bandwidth_usage: wave(tick, 50.0, 20.0, 16.0),
            regions_monitored: LOCATIONS.len() as u32,
        },
    })
}

pub fn log(tick: u64, now: DateTime<Utc>) -> TelemetryEvent {
    let level = pick(&[LogLevel::Info, LogLevel::Info, LogLevel::Warn, LogLevel::Error, LogLevel::Debug], tick);
    let resource = pick(&RESOURCES, tick / 3);

    let message = match level {
        LogLevel::Info => pick(&INFO_MESSAGES, tick).to_string(),
        LogLevel::Warn => format!("{} {resource}", pick(&WARN_MESSAGES, tick)),
        LogLevel::Error => format!("{} {resource}", pick(&ERROR_MESSAGES, tick)),
        LogLevel::Debug => format!("API response time: {}ms", 50 + tick * 17 % 450),
    };

    TelemetryEvent::Log(LogEntry {
        timestamp: now,
        level,
        message,
        source: resource.to_string(),
    })
}

pub fn traffic(tick: u64, now: DateTime<Utc>) -> TelemetryEvent {
    let arcs = (0..3u64)
        .map(|i| {
            let seed = tick * 3 + i;
            let (from_city, start_lat, start_lng) = pick(&LOCATIONS, seed);
            let (to_city, end_lat, end_lng) = pick(&LOCATIONS, seed + 1 + i);
            let is_attack = seed % 4 == 0;

            NetworkArc {
                id: format!("arc-{tick}-{i}"),
                start_lat,
                start_lng,
                end_lat,
                end_lng,
                is_attack,
                label: Some(format!("{from_city} -> {to_city}")),
                color: if is_attack { "#ff4444" } else { "#44aaff" }.to_string(),
                attack_type: is_attack.then(|| pick(&ATTACK_TYPES, seed).to_string()),
            }
        })
        .collect();

    TelemetryEvent::Traffic(TrafficUpdate {
        timestamp: now,
        arcs,
    })
}
