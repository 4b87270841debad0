//! Synthetic telemetry producers.
//!
//! Stands in for the alert engine, metrics sampler, log generator and
//! traffic simulator of a real deployment. Values are derived from a tick
//! counter so output is reproducible; they only need to look alive on a
//! dashboard.

pub mod generator;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::broadcaster::{ChannelBroadcaster, TelemetryEvent};
use crate::config::SimulatorSettings;

pub struct Simulator {
    broadcaster: Arc<ChannelBroadcaster>,
    interval: Duration,
    tick: u64,
}

impl Simulator {
    pub fn new(broadcaster: Arc<ChannelBroadcaster>, interval: Duration) -> Self {
        Self {
            broadcaster,
            interval,
            tick: 0,
        }
    }

    pub fn from_settings(broadcaster: Arc<ChannelBroadcaster>, settings: &SimulatorSettings) -> Self {
        Self::new(broadcaster, Duration::from_secs(settings.interval_secs.max(1)))
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Publishes one round of events. Channels without listeners are skipped
    /// before their event is built. Returns the number of events published.
    pub async fn step(&mut self) -> usize {
        let now = Utc::now();
        let tick = self.tick;
        self.tick += 1;

        let builders: [(&str, fn(u64, chrono::DateTime<Utc>) -> TelemetryEvent); 4] = [
            ("alerts", generator::alert),
            ("metrics", generator::metrics),
            ("network_traffic", generator::traffic),
            ("logs", generator::log),
        ];

        let mut published = 0;
        for (channel, build) in builders {
            if self.broadcaster.connection_count(channel) == 0 {
                continue;
            }
            self.broadcaster.publish(&build(tick, now)).await;
            published += 1;
        }

        debug!(tick, published, "simulator tick");
        published
    }

    /// Publishes every interval until `shutdown` turns true or its sender
    /// is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval_secs = self.interval.as_secs(), "telemetry simulator started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.step().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(ticks = self.tick, "telemetry simulator stopped");
    }
}
