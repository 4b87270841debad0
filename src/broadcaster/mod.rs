//! Channel broadcaster
//!
//! The broadcaster owns the registry of named channels and fans payloads out
//! to every live connection of a channel. It is constructed explicitly and
//! shared through an `Arc`; the transport registers connections into it and
//! producers publish through it.

pub mod channel;
pub mod engine;
pub mod event;

pub use channel::Channel;
pub use engine::ChannelBroadcaster;
pub use event::TelemetryEvent;

/// Channels the dashboard subscribes to out of the box.
pub const DEFAULT_CHANNELS: [&str; 4] = ["alerts", "metrics", "network_traffic", "logs"];

#[cfg(test)]
mod tests;
