//! # secdash
//!
//! `secdash` is the real-time backend of a security dashboard. It fans out
//! telemetry (alerts, metrics, network traffic, logs) to dashboard clients
//! connected over WebSockets, grouped into named channels.
//!
//! ## Core Modules
//!
//! - `broadcaster`: the channel registry, connection lifecycle and fan-out.
//! - `connection`: the per-client handle the broadcaster sends through.
//! - `config`: loads server, broadcaster and simulator settings.
//! - `simulator`: synthetic producers that publish telemetry periodically.
//! - `transport`: the WebSocket server that feeds connections in.
//! - `utils`: error type and logging setup.

pub mod broadcaster;
pub mod config;
pub mod connection;
pub mod simulator;
pub mod transport;
pub mod utils;
