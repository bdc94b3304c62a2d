//! Fixed-rate publish loop
//!
//! Reads the position cell once per frame and hands the value to the
//! transport. Input arrives at whatever rate the sensor fires; the relay sees
//! a steady stream at the configured frame rate, repeating the last value
//! when nothing changed and the origin until the first sample lands.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

use crate::position::{Position, PositionReader};
use crate::transport::{PublishOutcome, Transport};

pub struct PublishLoop {
    reader: PositionReader,
    transport: Arc<dyn Transport>,
    frame_interval: Duration,
}

impl PublishLoop {
    pub fn new(reader: PositionReader, transport: Arc<dyn Transport>, frame_interval: Duration) -> Self {
        Self {
            reader,
            transport,
            frame_interval,
        }
    }

    /// One frame: publish whatever the cell holds right now.
    pub fn tick(&self) -> (Position, PublishOutcome) {
        let position = self.reader.current();
        let outcome = self.transport.publish(position);
        trace!("tick {:?} -> {:?}", position, outcome);
        (position, outcome)
    }

    /// Tick forever. Stops only when the task is aborted.
    ///
    /// A late frame is skipped rather than bursted: the relay wants the
    /// current position, not a backlog of identical ones.
    pub async fn run(self) {
        let mut ticker = interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = IntervalStream::new(ticker);

        debug!(
            "Publish loop started ({}ms frames via '{}')",
            self.frame_interval.as_millis(),
            self.transport.name()
        );

        let mut skipped: u64 = 0;
        while ticks.next().await.is_some() {
            match self.tick().1 {
                PublishOutcome::Sent => {
                    if skipped > 0 {
                        debug!("Publishing resumed after {} skipped frames", skipped);
                        skipped = 0;
                    }
                }
                PublishOutcome::NotConnected | PublishOutcome::Backlogged => skipped += 1,
            }
        }
    }
}
