use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde::{Serialize, Serializer};
use serde_json::json;
use tokio::sync::mpsc::Receiver;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::oneshot;
use tungstenite::protocol::Message as WsMessage;

use super::channel::Channel;
use super::event::{AlertEvent, AlertLevel, LogEntry, LogLevel, NetworkArc, TrafficUpdate};
use super::{ChannelBroadcaster, DEFAULT_CHANNELS, TelemetryEvent};
use crate::config::BroadcasterSettings;
use crate::connection::{Connection, ConnectionId};
use crate::utils::error::BroadcastError;

async fn join(broadcaster: &ChannelBroadcaster, channel: &str) -> (ConnectionId, Receiver<WsMessage>) {
    let (conn, rx) = broadcaster.open_connection();
    let id = broadcaster
        .connect(channel, async { Ok(conn) })
        .await
        .expect("connect should succeed");
    (id, rx)
}

fn recv_text(rx: &mut Receiver<WsMessage>) -> String {
    match rx.try_recv() {
        Ok(WsMessage::Text(text)) => text.as_str().to_string(),
        other => panic!("Expected a text message, got {other:?}"),
    }
}

fn sample_alert() -> AlertEvent {
    AlertEvent {
        alert_id: "ALT-1".to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        level: AlertLevel::High,
        category: "network".to_string(),
        action: "edos_attack_detected".to_string(),
        message: "test".to_string(),
        source_ip: "203.0.113.7".to_string(),
        source_port: 443,
        severity_score: 80,
        recommendation: None,
    }
}

#[test]
fn test_channel_join_and_leave() {
    let channel = Channel::new("alerts");
    let (conn, _rx) = Connection::channel(1, Duration::from_millis(10));
    let id = conn.id();

    assert_eq!(channel.name(), "alerts");
    assert_eq!(channel.join(conn.clone()), 1);
    // same identity twice is still one member
    assert_eq!(channel.join(conn), 1);
    assert!(channel.contains(&id));
    assert_eq!(channel.get(&id).map(|c| c.id()), Some(id));

    assert!(channel.leave(&id).is_some());
    assert!(channel.leave(&id).is_none());
    assert!(channel.get(&id).is_none());
    assert!(channel.is_empty());
}

#[test]
fn test_channel_evict_skips_missing() {
    let channel = Channel::new("logs");
    let (a, _ra) = Connection::channel(1, Duration::from_millis(10));
    let (b, _rb) = Connection::channel(1, Duration::from_millis(10));
    let a_id = a.id();
    channel.join(a);
    channel.join(b);

    let evicted = channel.evict(&[a_id, ConnectionId::new()]);
    assert_eq!(evicted.len(), 1);
    assert_eq!(channel.len(), 1);
}

#[test]
fn test_broadcaster_new_registers_defaults() {
    let broadcaster = ChannelBroadcaster::new();
    let mut expected: Vec<String> = DEFAULT_CHANNELS.iter().map(|c| c.to_string()).collect();
    expected.sort();
    assert_eq!(broadcaster.channel_names(), expected);
    assert_eq!(broadcaster.total_connections(), 0);
}

#[tokio::test]
async fn test_broadcast_reaches_every_member() {
    let broadcaster = ChannelBroadcaster::new();
    let mut receivers = Vec::new();
    for _ in 0..3 {
        receivers.push(join(&broadcaster, "alerts").await.1);
    }

    broadcaster
        .broadcast("alerts", &json!({"level": "HIGH", "message": "test"}))
        .await;

    let texts: Vec<String> = receivers.iter_mut().map(recv_text).collect();
    assert!(texts.iter().all(|t| t == &texts[0]));
    let parsed: serde_json::Value = serde_json::from_str(&texts[0]).unwrap();
    assert_eq!(parsed, json!({"level": "HIGH", "message": "test"}));
    assert_eq!(broadcaster.connection_count("alerts"), 3);
}

#[tokio::test]
async fn test_failed_send_is_isolated_and_evicted() {
    let broadcaster = ChannelBroadcaster::new();
    let (a, mut rx_a) = join(&broadcaster, "alerts").await;
    let (b, rx_b) = join(&broadcaster, "alerts").await;
    let (c, mut rx_c) = join(&broadcaster, "alerts").await;

    // B's writer task is gone
    drop(rx_b);

    broadcaster.broadcast("alerts", &json!({"n": 1})).await;

    assert_eq!(recv_text(&mut rx_a), r#"{"n":1}"#);
    assert_eq!(recv_text(&mut rx_c), r#"{"n":1}"#);
    assert!(broadcaster.is_connected(&a, "alerts"));
    assert!(!broadcaster.is_connected(&b, "alerts"));
    assert!(broadcaster.is_connected(&c, "alerts"));
    assert_eq!(broadcaster.connection_count("alerts"), 2);
}

#[tokio::test]
async fn test_failing_log_client_dropped_from_count() {
    let broadcaster = ChannelBroadcaster::new();
    let (_, mut healthy) = join(&broadcaster, "logs").await;
    let (_, broken) = join(&broadcaster, "logs").await;
    drop(broken);
    assert_eq!(broadcaster.connection_count("logs"), 2);

    broadcaster.broadcast("logs", &json!({"message": "disk full"})).await;

    assert!(recv_text(&mut healthy).contains("disk full"));
    assert_eq!(broadcaster.connection_count("logs"), 1);
}

#[tokio::test]
async fn test_hung_client_times_out_without_stalling_others() {
    let broadcaster = ChannelBroadcaster::new()
        .with_send_buffer(1)
        .with_send_timeout(Duration::from_millis(20));
    let (hung, _hung_rx) = join(&broadcaster, "metrics").await;
    let (live, mut live_rx) = join(&broadcaster, "metrics").await;

    broadcaster.broadcast("metrics", &json!({"cpu": 10})).await;
    assert_eq!(recv_text(&mut live_rx), r#"{"cpu":10}"#);

    // hung never drains its single slot, so the second send times out
    broadcaster.broadcast("metrics", &json!({"cpu": 20})).await;
    assert_eq!(recv_text(&mut live_rx), r#"{"cpu":20}"#);

    assert!(!broadcaster.is_connected(&hung, "metrics"));
    assert!(broadcaster.is_connected(&live, "metrics"));
}

#[tokio::test]
async fn test_evicted_client_queue_is_released() {
    let broadcaster = ChannelBroadcaster::new()
        .with_send_buffer(1)
        .with_send_timeout(Duration::from_millis(10));
    let (_, mut rx) = join(&broadcaster, "alerts").await;

    broadcaster.broadcast("alerts", &json!(1)).await;
    broadcaster.broadcast("alerts", &json!(2)).await;
    assert_eq!(broadcaster.connection_count("alerts"), 0);

    // the broadcaster held the last sender, so the writer sees the end
    assert_eq!(recv_text(&mut rx), "1");
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Disconnected)));
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let broadcaster = ChannelBroadcaster::new();
    let (x, _rx_x) = join(&broadcaster, "alerts").await;
    let (_y, _rx_y) = join(&broadcaster, "alerts").await;

    broadcaster.disconnect(&x, "alerts");
    let after_first = broadcaster.all_connection_counts();
    broadcaster.disconnect(&x, "alerts");

    assert_eq!(broadcaster.all_connection_counts(), after_first);
    assert_eq!(broadcaster.connection_count("alerts"), 1);
}

#[tokio::test]
async fn test_disconnect_unknown_channel_creates_nothing() {
    let broadcaster = ChannelBroadcaster::new();
    broadcaster.disconnect(&ConnectionId::new(), "nowhere");
    assert!(!broadcaster.channel_names().contains(&"nowhere".to_string()));
}

#[tokio::test]
async fn test_broadcast_to_unseen_channel_is_noop() {
    let broadcaster = ChannelBroadcaster::new();

    broadcaster.broadcast("newtopic", &json!({"x": 1})).await;
    assert!(!broadcaster.all_connection_counts().contains_key("newtopic"));
    assert_eq!(broadcaster.connection_count("newtopic"), 0);

    let (_, mut rx) = join(&broadcaster, "newtopic").await;
    assert_eq!(broadcaster.connection_count("newtopic"), 1);
    assert_eq!(broadcaster.all_connection_counts()["newtopic"], 1);

    broadcaster.broadcast("newtopic", &json!({"x": 2})).await;
    assert_eq!(recv_text(&mut rx), r#"{"x":2}"#);
}

#[tokio::test]
async fn test_counts_track_membership_through_churn() {
    let broadcaster = ChannelBroadcaster::new();
    let mut live = Vec::new();
    for i in 0..6 {
        let (id, rx) = join(&broadcaster, "metrics").await;
        if i % 2 == 0 {
            live.push((id, rx));
        } else {
            drop(rx);
        }
    }
    assert_eq!(broadcaster.connection_count("metrics"), 6);

    broadcaster.broadcast("metrics", &json!({})).await;
    assert_eq!(broadcaster.connection_count("metrics"), 3);

    let (first, _) = live.remove(0);
    broadcaster.disconnect(&first, "metrics");
    assert_eq!(broadcaster.connection_count("metrics"), 2);
    assert_eq!(broadcaster.total_connections(), 2);
}

#[tokio::test]
async fn test_channels_are_independent() {
    let broadcaster = ChannelBroadcaster::new();
    let (alert_id, alert_rx) = join(&broadcaster, "alerts").await;
    let (_, mut metrics_rx) = join(&broadcaster, "metrics").await;
    let (_, _metrics_rx2) = join(&broadcaster, "metrics").await;

    drop(alert_rx);
    broadcaster.broadcast("alerts", &json!({"level": "LOW"})).await;
    broadcaster.disconnect(&alert_id, "alerts");

    assert_eq!(broadcaster.connection_count("alerts"), 0);
    assert_eq!(broadcaster.connection_count("metrics"), 2);
    assert!(metrics_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_all_connection_counts_lists_registered_channels() {
    let broadcaster = ChannelBroadcaster::with_channels(["alerts", "metrics", "logs"]);
    let _a1 = join(&broadcaster, "alerts").await;
    let _a2 = join(&broadcaster, "alerts").await;
    let _l1 = join(&broadcaster, "logs").await;

    let expected: BTreeMap<String, usize> = [
        ("alerts".to_string(), 2),
        ("metrics".to_string(), 0),
        ("logs".to_string(), 1),
    ]
    .into_iter()
    .collect();
    assert_eq!(broadcaster.all_connection_counts(), expected);
}

#[tokio::test]
async fn test_handshake_failure_registers_nothing() {
    let broadcaster = ChannelBroadcaster::new();

    let result = broadcaster
        .connect("alerts", async {
            Err::<Connection, _>(BroadcastError::handshake("bad upgrade"))
        })
        .await;

    assert!(matches!(result, Err(BroadcastError::Handshake(_))));
    assert_eq!(broadcaster.total_connections(), 0);
}

#[tokio::test]
async fn test_pending_handshake_does_not_block_broadcast() {
    let broadcaster = Arc::new(ChannelBroadcaster::new());
    let (gate_tx, gate_rx) = oneshot::channel::<()>();
    let (slow_conn, mut slow_rx) = broadcaster.open_connection();

    let pending = {
        let broadcaster = broadcaster.clone();
        tokio::spawn(async move {
            broadcaster
                .connect("alerts", async move {
                    gate_rx
                        .await
                        .map_err(|_| BroadcastError::handshake("aborted"))?;
                    Ok(slow_conn)
                })
                .await
        })
    };

    let (_, mut rx) = join(&broadcaster, "alerts").await;
    broadcaster.broadcast("alerts", &json!({"seq": 1})).await;
    assert_eq!(recv_text(&mut rx), r#"{"seq":1}"#);
    assert!(slow_rx.try_recv().is_err());

    gate_tx.send(()).unwrap();
    let slow_id = pending.await.unwrap().unwrap();
    assert!(broadcaster.is_connected(&slow_id, "alerts"));
    assert_eq!(broadcaster.connection_count("alerts"), 2);
}

#[tokio::test]
async fn test_connection_limit_rejects_and_closes() {
    let broadcaster = ChannelBroadcaster::new().with_max_connections(2);
    let _a = join(&broadcaster, "alerts").await;
    let _b = join(&broadcaster, "logs").await;

    let (conn, mut rx) = broadcaster.open_connection();
    let result = broadcaster.connect("metrics", async { Ok(conn) }).await;

    assert!(matches!(
        result,
        Err(BroadcastError::CapacityReached { limit: 2 })
    ));
    assert!(matches!(rx.try_recv(), Ok(WsMessage::Close(None))));
    assert_eq!(broadcaster.total_connections(), 2);
}

#[tokio::test]
async fn test_send_personal_message_targets_one_member() {
    let broadcaster = ChannelBroadcaster::new();
    let (a, mut rx_a) = join(&broadcaster, "alerts").await;
    let (_, mut rx_b) = join(&broadcaster, "alerts").await;

    let outcome = broadcaster
        .send_personal_message("alerts", &a, r#"{"type":"pong"}"#)
        .await;

    assert!(outcome.is_delivered());
    assert_eq!(recv_text(&mut rx_a), r#"{"type":"pong"}"#);
    assert!(rx_b.try_recv().is_err());

    let missing = broadcaster
        .send_personal_message("logs", &a, "hello")
        .await;
    assert!(!missing.is_delivered());
}

#[tokio::test]
async fn test_publish_routes_by_event_kind() {
    let broadcaster = ChannelBroadcaster::new();
    let (_, mut alerts) = join(&broadcaster, "alerts").await;
    let (_, mut logs) = join(&broadcaster, "logs").await;

    broadcaster
        .publish(&TelemetryEvent::Alert(sample_alert()))
        .await;

    let parsed: serde_json::Value = serde_json::from_str(&recv_text(&mut alerts)).unwrap();
    assert_eq!(parsed["type"], "alert");
    assert_eq!(parsed["data"]["level"], "HIGH");
    assert_eq!(parsed["data"]["timestamp"], "2024-05-01T12:00:00Z");
    assert!(logs.try_recv().is_err());
}

#[tokio::test]
async fn test_shutdown_closes_everything() {
    let broadcaster = ChannelBroadcaster::new();
    let (_, mut rx_a) = join(&broadcaster, "alerts").await;
    let (_, mut rx_b) = join(&broadcaster, "network_traffic").await;

    broadcaster.shutdown();

    assert!(broadcaster.is_shut_down());
    assert_eq!(broadcaster.total_connections(), 0);
    assert!(broadcaster.all_connection_counts().is_empty());
    assert!(matches!(rx_a.try_recv(), Ok(WsMessage::Close(None))));
    assert!(matches!(rx_b.try_recv(), Ok(WsMessage::Close(None))));

    let (conn, _rx) = broadcaster.open_connection();
    let result = broadcaster.connect("alerts", async { Ok(conn) }).await;
    assert!(matches!(result, Err(BroadcastError::ShuttingDown)));
}

#[test]
fn test_from_settings_uses_configured_channels() {
    let settings = BroadcasterSettings {
        channels: vec!["alerts".to_string(), "audit".to_string()],
        ..BroadcasterSettings::default()
    };
    let broadcaster = ChannelBroadcaster::from_settings(&settings);
    assert_eq!(broadcaster.channel_names(), vec!["alerts", "audit"]);
}

#[test]
fn test_event_channels() {
    let now = Utc::now();
    let log = TelemetryEvent::from(LogEntry {
        timestamp: now,
        level: LogLevel::Warn,
        message: "High CPU usage".to_string(),
        source: "monitor".to_string(),
    });
    let traffic = TelemetryEvent::from(TrafficUpdate {
        timestamp: now,
        arcs: vec![],
    });
    assert_eq!(log.channel(), "logs");
    assert_eq!(traffic.channel(), "network_traffic");
    assert_eq!(TelemetryEvent::from(sample_alert()).channel(), "alerts");
    assert_eq!(log.timestamp(), now);
}

#[test]
fn test_network_arc_wire_names() {
    let arc = NetworkArc {
        id: "arc-1".to_string(),
        start_lat: 40.7,
        start_lng: -74.0,
        end_lat: 51.5,
        end_lng: -0.1,
        is_attack: true,
        label: None,
        color: "#ff0000".to_string(),
        attack_type: Some("ddos".to_string()),
    };
    let value = serde_json::to_value(&arc).unwrap();
    assert_eq!(value["startLat"], 40.7);
    assert_eq!(value["isAttack"], true);
    assert_eq!(value["attack_type"], "ddos");
    assert!(value.get("label").is_none());
}

/// Counts how often it is serialized.
struct CountingPayload {
    calls: AtomicUsize,
}

impl Serialize for CountingPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        serializer.serialize_str("tick")
    }
}

struct Unserializable;

impl Serialize for Unserializable {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom("refused"))
    }
}

#[tokio::test]
async fn test_broadcast_serializes_payload_once() {
    let broadcaster = ChannelBroadcaster::new();
    let mut receivers = Vec::new();
    for _ in 0..3 {
        receivers.push(join(&broadcaster, "metrics").await.1);
    }

    let payload = CountingPayload {
        calls: AtomicUsize::new(0),
    };
    broadcaster.broadcast("metrics", &payload).await;

    assert_eq!(payload.calls.load(Ordering::SeqCst), 1);
    for rx in &mut receivers {
        assert_eq!(recv_text(rx), r#""tick""#);
    }
}

#[tokio::test]
async fn test_unserializable_payload_is_dropped() {
    let broadcaster = ChannelBroadcaster::new();
    let (a, mut rx_a) = join(&broadcaster, "alerts").await;
    let (b, mut rx_b) = join(&broadcaster, "alerts").await;

    broadcaster.broadcast("alerts", &Unserializable).await;

    assert!(matches!(rx_a.try_recv(), Err(TryRecvError::Empty)));
    assert!(matches!(rx_b.try_recv(), Err(TryRecvError::Empty)));
    assert!(broadcaster.is_connected(&a, "alerts"));
    assert!(broadcaster.is_connected(&b, "alerts"));
    assert_eq!(broadcaster.connection_count("alerts"), 2);
}

#[tokio::test]
async fn test_disconnect_during_broadcast_sweep() {
    let broadcaster = Arc::new(
        ChannelBroadcaster::new()
            .with_send_buffer(1)
            .with_send_timeout(Duration::from_millis(100)),
    );
    let (slow, mut slow_rx) = join(&broadcaster, "metrics").await;
    let (live, mut live_rx) = join(&broadcaster, "metrics").await;

    // fills slow's only slot
    broadcaster.broadcast("metrics", &json!(1)).await;
    assert_eq!(recv_text(&mut live_rx), "1");

    let sweep = tokio::spawn({
        let broadcaster = broadcaster.clone();
        async move { broadcaster.broadcast("metrics", &json!(2)).await }
    });

    // live got the frame, so the sweep is now waiting on slow
    let frame = tokio::time::timeout(Duration::from_secs(1), live_rx.recv())
        .await
        .expect("Sweep never reached the live member");
    assert!(matches!(frame, Some(WsMessage::Text(ref t)) if t.as_str() == "2"));

    broadcaster.disconnect(&slow, "metrics");
    assert_eq!(broadcaster.connection_count("metrics"), 1);

    sweep.await.expect("Broadcast task panicked");

    // the eviction after the sweep finds slow already gone
    assert_eq!(broadcaster.connection_count("metrics"), 1);
    assert!(broadcaster.is_connected(&live, "metrics"));
    assert!(!broadcaster.is_connected(&slow, "metrics"));
    assert_eq!(broadcaster.total_connections(), 1);

    assert_eq!(recv_text(&mut slow_rx), "1");
    assert!(matches!(slow_rx.try_recv(), Err(TryRecvError::Disconnected)));
}
