//! The `connection` module defines the broadcaster's view of one client.
//!
//! A [`Connection`] is the sending half of a bounded queue drained by the
//! transport's writer task. The broadcaster never touches the socket itself;
//! it only learns whether a send went through via [`SendOutcome`].

pub mod handle;

pub use handle::{Connection, ConnectionId, SendOutcome};
