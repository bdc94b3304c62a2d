//! Console transport - logs positions instead of sending them
//!
//! Useful for:
//! - Checking normalization without a relay
//! - Tuning policy constants on a live sensor feed
//! - Development without network access

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

use super::{ConnectionState, PublishOutcome, Transport};
use crate::position::Position;

pub struct ConsoleTransport {
    name: String,
    state_tx: watch::Sender<ConnectionState>,
    /// Last position logged at info level, and publish counter
    last: Mutex<(Option<Position>, u64)>,
}

impl ConsoleTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state_tx: watch::channel(ConnectionState::Closed).0,
            last: Mutex::new((None, 0)),
        }
    }

    /// Number of publishes accepted so far
    pub fn publish_count(&self) -> u64 {
        self.last.lock().1
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<()> {
        self.state_tx.send_replace(ConnectionState::Open);
        info!("🖥️  Console transport '{}' ready (dry run, nothing is sent)", self.name);
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn publish(&self, position: Position) -> PublishOutcome {
        if self.state() != ConnectionState::Open {
            return PublishOutcome::NotConnected;
        }

        let mut last = self.last.lock();
        last.1 += 1;
        let count = last.1;

        // Every frame is published; only changes are worth an info line.
        if last.0 != Some(position) {
            info!(
                "🎯 [{}] position x={:.3} y={:.3} [publish #{}]",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                position.x,
                position.y,
                count
            );
            last.0 = Some(position);
        } else {
            debug!(transport = self.name.as_str(), count, "Unchanged position published");
        }

        PublishOutcome::Sent
    }

    async fn shutdown(&self) -> Result<()> {
        self.state_tx.send_replace(ConnectionState::Closed);
        info!(
            "🔌 Console transport '{}' closed after {} publishes",
            self.name,
            self.publish_count()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_console_lifecycle() {
        let transport = ConsoleTransport::new("dry-run");
        assert_eq!(transport.state(), ConnectionState::Closed);
        assert_eq!(
            transport.publish(Position::ORIGIN),
            PublishOutcome::NotConnected
        );
        assert_eq!(transport.publish_count(), 0);

        transport.start().await.unwrap();
        assert_eq!(transport.state(), ConnectionState::Open);
        assert_eq!(transport.publish(Position::ORIGIN), PublishOutcome::Sent);
        assert_eq!(transport.publish(Position::ORIGIN), PublishOutcome::Sent);
        assert_eq!(transport.publish_count(), 2);

        transport.shutdown().await.unwrap();
        assert_eq!(transport.state(), ConnectionState::Closed);
        assert_eq!(
            transport.publish(Position::clamped(0.5, 0.5)),
            PublishOutcome::NotConnected
        );
    }
}
