//! Pointer session: feed → normalizer → position cell → publish loop
//!
//! A session runs two tasks. The signal pipeline reacts to feed events and
//! overwrites the position cell; the publish loop reads the cell at frame
//! rate. Starting one requires a [`Capability`] from the permission gate.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::AppConfig;
use crate::error::Rejection;
use crate::input::{FeedEvent, FeedReader, InputKind, RawSample, Viewport};
use crate::normalize::{Normalizer, NormalizerConfig};
use crate::permission::Capability;
use crate::position::{position_cell, Position, PositionReader, PositionWriter};
use crate::publish::PublishLoop;
use crate::transport::Transport;

/// Reactive half of the session. Owns the only writer of the position cell.
#[derive(Debug)]
pub struct SignalPipeline {
    kind: InputKind,
    normalizer: Normalizer,
    viewport: Viewport,
    writer: PositionWriter,
}

impl SignalPipeline {
    pub fn new(
        kind: InputKind,
        config: &NormalizerConfig,
        viewport: Viewport,
        writer: PositionWriter,
    ) -> Self {
        Self {
            kind,
            normalizer: Normalizer::new(config),
            viewport,
            writer,
        }
    }

    /// Apply one feed event.
    ///
    /// Returns the new position when a sample was accepted, `None` for a
    /// resize. A rejected sample leaves the cell untouched.
    pub fn handle(&mut self, event: FeedEvent) -> Result<Option<Position>, Rejection> {
        let sample = match event {
            FeedEvent::Resize(viewport) => {
                debug!("Viewport resized to {}x{}", viewport.width, viewport.height);
                self.viewport = viewport;
                return Ok(None);
            }
            FeedEvent::Sample(sample) => sample,
        };

        if sample.kind() != self.kind {
            return Err(Rejection::OtherVariant);
        }

        let position = match sample {
            RawSample::Orientation(sample) => self.normalizer.normalize(&sample)?,
            RawSample::Pointer(sample) => self.normalizer.normalize_pointer(&sample, &self.viewport)?,
        };

        self.writer.set(position);
        Ok(Some(position))
    }

    pub fn reconfigure(&mut self, config: &NormalizerConfig) {
        self.normalizer.reconfigure(config);
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    async fn run(
        mut self,
        mut feed: FeedReader,
        mut config_rx: watch::Receiver<NormalizerConfig>,
        closed_tx: watch::Sender<bool>,
    ) {
        loop {
            tokio::select! {
                Ok(()) = config_rx.changed() => {
                    let config = *config_rx.borrow_and_update();
                    self.reconfigure(&config);
                }

                event = feed.next_event() => match event {
                    Ok(Some(event)) => match self.handle(event) {
                        Ok(Some(position)) => trace!("→ {:.3}, {:.3}", position.x, position.y),
                        Ok(None) => {}
                        Err(rejection) => trace!("Sample dropped: {:?}", rejection),
                    },
                    Ok(None) => {
                        info!("Input feed closed");
                        break;
                    }
                    Err(e) => {
                        warn!("Input feed failed: {:#}", e);
                        break;
                    }
                },
            }
        }

        closed_tx.send_replace(true);
    }
}

/// A running pointer session
pub struct Session {
    transport: Arc<dyn Transport>,
    reader: PositionReader,
    config_tx: watch::Sender<NormalizerConfig>,
    closed_rx: watch::Receiver<bool>,
    pipeline: JoinHandle<()>,
    publisher: JoinHandle<()>,
}

impl Session {
    /// Subscribe to the feed and start publishing.
    ///
    /// The transport is expected to be started already; the publish loop
    /// skips frames until it is open.
    pub fn start(
        _capability: Capability,
        config: &AppConfig,
        feed: FeedReader,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (writer, reader) = position_cell();
        let pipeline = SignalPipeline::new(
            config.input.kind,
            &config.normalizer,
            config.input.viewport,
            writer,
        );
        let strategy = pipeline.normalizer().strategy_name();

        let (config_tx, config_rx) = watch::channel(config.normalizer);
        let (closed_tx, closed_rx) = watch::channel(false);
        let pipeline = tokio::spawn(pipeline.run(feed, config_rx, closed_tx));

        let publish = PublishLoop::new(
            reader.clone(),
            Arc::clone(&transport),
            config.publish.frame_interval(),
        );
        let publisher = tokio::spawn(publish.run());

        info!(
            "▶️  Session started ({:?} input, '{}' policy, {} fps via {})",
            config.input.kind,
            strategy,
            config.publish.fps,
            transport.name()
        );

        Self {
            transport,
            reader,
            config_tx,
            closed_rx,
            pipeline,
            publisher,
        }
    }

    /// Swap the normalization policy. The baseline survives.
    pub fn reconfigure(&self, config: NormalizerConfig) {
        self.config_tx.send_if_modified(|current| {
            if *current == config {
                return false;
            }
            *current = config;
            true
        });
    }

    /// Latest published-to-be position
    pub fn position(&self) -> Position {
        self.reader.current()
    }

    /// Resolves once the input feed has ended
    pub async fn input_closed(&self) {
        let mut closed = self.closed_rx.clone();
        let _ = closed.wait_for(|closed| *closed).await;
    }

    /// Stop both tasks and close the transport.
    pub async fn teardown(self) -> Result<()> {
        self.pipeline.abort();
        self.publisher.abort();
        let _ = self.pipeline.await;
        let _ = self.publisher.await;

        self.transport.shutdown().await?;
        info!("⏹️  Session stopped at {:.3}, {:.3}", self.reader.current().x, self.reader.current().y);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{OrientationSample, PointerSample};
    use crate::normalize::NormalizationPolicy;
    use crate::transport::testing::RecordingTransport;
    use crate::transport::ConnectionState;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    fn orientation(alpha: f64, beta: f64, gamma: f64) -> FeedEvent {
        FeedEvent::Sample(RawSample::Orientation(OrientationSample::new(alpha, beta, gamma)))
    }

    fn pointer(x: f64, y: f64) -> FeedEvent {
        FeedEvent::Sample(RawSample::Pointer(PointerSample {
            client_x: x,
            client_y: y,
        }))
    }

    fn pipeline(kind: InputKind) -> (SignalPipeline, PositionReader) {
        let (writer, reader) = position_cell();
        let pipeline = SignalPipeline::new(kind, &NormalizerConfig::default(), Viewport::default(), writer);
        (pipeline, reader)
    }

    async fn wait_for_position(session: &Session, expected: Position) {
        let result = tokio::time::timeout(Duration::from_secs(2), async {
            while session.position() != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(
            result.is_ok(),
            "position stuck at {:?}, expected {:?}",
            session.position(),
            expected
        );
    }

    #[test]
    fn test_invalid_sample_leaves_cell_untouched() {
        let (mut pipeline, reader) = pipeline(InputKind::Orientation);

        pipeline.handle(orientation(10.0, 20.0, 0.0)).unwrap();
        pipeline.handle(orientation(46.0, 20.0, 0.0)).unwrap();
        let before = reader.current();
        assert_eq!(before, Position { x: 0.6, y: 0.5 });

        let gap = FeedEvent::Sample(RawSample::Orientation(OrientationSample {
            alpha: None,
            beta: Some(1.0),
            gamma: Some(1.0),
        }));
        assert_eq!(pipeline.handle(gap), Err(Rejection::InvalidSample));
        assert_eq!(reader.current(), before);
    }

    #[test]
    fn test_other_variant_is_dropped() {
        let (mut pipeline, reader) = pipeline(InputKind::Orientation);
        assert_eq!(pipeline.handle(pointer(5.0, 5.0)), Err(Rejection::OtherVariant));
        assert_eq!(reader.current(), Position::ORIGIN);
        assert!(pipeline.normalizer().baseline().is_none());
    }

    #[test]
    fn test_pointer_follows_resize() {
        let (mut pipeline, reader) = pipeline(InputKind::Pointer);

        assert_eq!(pipeline.handle(pointer(0.0, 0.0)), Ok(Some(Position::ORIGIN)));

        let resize = FeedEvent::Resize(Viewport {
            width: 100.0,
            height: 50.0,
        });
        assert_eq!(pipeline.handle(resize), Ok(None));

        pipeline.handle(pointer(99.0, 49.0)).unwrap();
        assert_eq!(reader.current(), Position { x: 0.99, y: 0.98 });

        let empty = FeedEvent::Resize(Viewport {
            width: 0.0,
            height: 50.0,
        });
        pipeline.handle(empty).unwrap();
        assert_eq!(pipeline.handle(pointer(10.0, 10.0)), Err(Rejection::EmptyViewport));
        assert_eq!(reader.current(), Position { x: 0.99, y: 0.98 });
    }

    #[tokio::test]
    async fn test_session_publishes_feed_until_teardown() -> Result<()> {
        let feed = FeedReader::from_reader(
            &b"{\"alpha\":100,\"beta\":10,\"gamma\":0}\nnot json\n{\"alpha\":136,\"beta\":10,\"gamma\":null}\n{\"alpha\":136,\"beta\":46,\"gamma\":0}\n"[..],
        );
        let transport = Arc::new(RecordingTransport::new(ConnectionState::Open));
        let mut config = AppConfig::default();
        config.publish.fps = 100;

        let session = Session::start(
            Capability::granted_for_tests(),
            &config,
            feed,
            transport.clone(),
        );

        tokio::time::timeout(Duration::from_secs(2), session.input_closed()).await?;
        assert_eq!(session.position(), Position { x: 0.6, y: 0.6 });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let published = transport.published();
        assert!(!published.is_empty());
        assert_eq!(published.last(), Some(&Position { x: 0.6, y: 0.6 }));
        assert!(published.iter().all(|p| p.in_unit_square()));

        session.teardown().await?;
        assert_eq!(transport.state(), ConnectionState::Closed);
        Ok(())
    }

    #[tokio::test]
    async fn test_reconfigure_keeps_baseline() -> Result<()> {
        let (mut tx, rx) = tokio::io::duplex(1024);
        let transport = Arc::new(RecordingTransport::new(ConnectionState::Open));
        let session = Session::start(
            Capability::granted_for_tests(),
            &AppConfig::default(),
            FeedReader::from_reader(rx),
            transport,
        );

        tx.write_all(b"{\"alpha\":10,\"beta\":20,\"gamma\":0}\n").await?;
        wait_for_position(&session, Position { x: 0.5, y: 0.5 }).await;

        session.reconfigure(NormalizerConfig {
            policy: NormalizationPolicy::AbsoluteRange,
            precision: Some(3),
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        tx.write_all(b"{\"alpha\":0,\"beta\":-180,\"gamma\":0}\n").await?;
        wait_for_position(&session, Position::ORIGIN).await;

        session.reconfigure(NormalizerConfig::default());
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Baseline is still (10, 20) from the first sample
        tx.write_all(b"{\"alpha\":46,\"beta\":20,\"gamma\":0}\n").await?;
        wait_for_position(&session, Position { x: 0.6, y: 0.5 }).await;

        session.teardown().await?;
        Ok(())
    }
}
