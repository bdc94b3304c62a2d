//! Line-delimited JSON feed of raw input events
//!
//! Phones running a sensor-streaming app typically push one JSON object per
//! UDP datagram; a local tool can also pipe events through stdin. Both end up
//! as a stream of text lines decoded with [`FeedEvent::parse`].

use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::net::UdpSocket;
use tracing::{debug, info, trace};

use super::FeedEvent;
use crate::error::FeedError;

/// Largest datagram accepted from the feed.
const MAX_DATAGRAM: usize = 4096;

/// Source of raw feed events
pub enum FeedReader {
    Udp {
        socket: UdpSocket,
        pending: VecDeque<String>,
        buf: Vec<u8>,
    },
    Lines(Lines<BufReader<Box<dyn AsyncRead + Send + Unpin>>>),
}

impl FeedReader {
    /// Bind a UDP socket for incoming events.
    pub async fn bind_udp(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("Failed to bind input feed on {}", addr))?;
        info!("📡 Listening for input events on udp://{}", socket.local_addr()?);
        Ok(Self::Udp {
            socket,
            pending: VecDeque::new(),
            buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    /// Read events from stdin, one JSON object per line.
    pub fn stdin() -> Self {
        info!("📡 Reading input events from stdin");
        Self::from_reader(tokio::io::stdin())
    }

    /// Read events from any async byte source.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let boxed: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        Self::Lines(BufReader::new(boxed).lines())
    }

    /// Local address of the UDP feed, if any.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Udp { socket, .. } => socket.local_addr().ok(),
            Self::Lines(_) => None,
        }
    }

    /// Wait for the next well-formed event.
    ///
    /// Malformed lines are logged and skipped. Returns `Ok(None)` when a
    /// line-based source reaches end of input; a UDP feed never ends.
    pub async fn next_event(&mut self) -> Result<Option<FeedEvent>> {
        loop {
            let Some(line) = self.next_line().await? else {
                return Ok(None);
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match FeedEvent::parse(line) {
                Ok(event) => {
                    trace!("Feed event: {:?}", event);
                    return Ok(Some(event));
                }
                Err(e) => debug!("Skipping feed line ({}): {}", e, line),
            }
        }
    }

    async fn next_line(&mut self) -> Result<Option<String>> {
        match self {
            Self::Lines(lines) => lines.next_line().await.context("Failed to read input feed"),
            Self::Udp {
                socket,
                pending,
                buf,
            } => loop {
                if let Some(line) = pending.pop_front() {
                    return Ok(Some(line));
                }
                let (len, peer) = socket
                    .recv_from(buf)
                    .await
                    .context("Failed to receive from input feed")?;
                match split_datagram(&buf[..len]) {
                    Ok(lines) => pending.extend(lines),
                    Err(e) => debug!("Dropping datagram from {}: {}", peer, e),
                }
            },
        }
    }
}

/// A datagram may carry several newline-separated events.
fn split_datagram(data: &[u8]) -> Result<Vec<String>, FeedError> {
    let text = std::str::from_utf8(data).map_err(|_| FeedError::Utf8)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect())
}
