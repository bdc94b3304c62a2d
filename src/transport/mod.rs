//! Outbound transports for normalized positions
//!
//! A transport owns one connection to the broadcast relay and exposes a
//! single fire-and-forget `publish` operation. The connection lifecycle runs
//! in the background and is observed through [`ConnectionState`].

pub mod codec;
pub mod console;
pub mod relay;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use crate::position::Position;

pub use console::ConsoleTransport;
pub use relay::RelayTransport;

/// State of the single outbound connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Result of one publish call. None of these is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Handed to the connection for sending
    Sent,
    /// Connection not open; skipped, the next tick retries
    NotConnected,
    /// Outbound queue full; frame dropped
    Backlogged,
}

/// One remote cursor as relayed by the server
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Cursor {
    pub color: String,
    pub position: Position,
}

/// Transport trait - relay connection and test doubles implement this
///
/// All methods take &self so a transport can be shared as `Arc<dyn Transport>`
/// between the publish loop and the owner of its lifecycle.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for logs (e.g., "relay", "console")
    fn name(&self) -> &str;

    /// Open the connection. Returns once the background task is running;
    /// reaching [`ConnectionState::Open`] happens asynchronously.
    async fn start(&self) -> Result<()>;

    /// Connection state at the time of the call
    fn state(&self) -> ConnectionState;

    /// Watch connection state changes
    fn subscribe_state(&self) -> watch::Receiver<ConnectionState>;

    /// Send one position message. Never blocks; no-op unless open.
    fn publish(&self, position: Position) -> PublishOutcome;

    /// Close the connection and stop reconnecting
    async fn shutdown(&self) -> Result<()>;

    /// Cursor lists pushed by the relay, for a rendering layer.
    ///
    /// Default implementation: none (transport doesn't receive cursors)
    fn subscribe_cursors(&self) -> Option<broadcast::Receiver<Vec<Cursor>>> {
        None
    }
}
