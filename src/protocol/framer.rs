//! Stream framer for length-prefixed packets.
//!
//! [`PacketReader`] pulls one complete packet at a time off a byte stream,
//! resuming across short reads, including reads that split the 4-byte
//! length prefix itself. A silent peer (no bytes within `idle_interval`)
//! is tolerated for `idle_retries` consecutive intervals before the read
//! fails. The budget covers the first packet of a stream and any packet
//! already under way; between packets a connected peer may idle for as long
//! as it likes. [`write_packet`] writes a packet in full or reports how far
//! it got.
//!
//! Any failure here is fatal to the connection: callers close the socket,
//! no resynchronization is attempted.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::packet_buffer::{PacketBuffer, DEFAULT_MAX_PACKET_SIZE, LENGTH_PREFIX_SIZE};
use crate::error::{Result, VcamError};

/// Default number of silent intervals tolerated.
pub const DEFAULT_IDLE_RETRIES: u32 = 10;

/// Default length of one silent interval.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(500);

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Framer limits and silence tolerance.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FramerConfig {
    /// Smallest declared length accepted.
    pub min_packet_size: u32,
    /// Largest declared length accepted.
    pub max_packet_size: u32,
    /// Consecutive silent intervals tolerated before giving up.
    pub idle_retries: u32,
    /// Length of one silent interval in milliseconds.
    pub idle_interval_ms: u64,
}

impl FramerConfig {
    /// Silent interval as a `Duration`.
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    /// Same limits with a different minimum packet length.
    pub fn with_min_packet_size(mut self, min: u32) -> Self {
        self.min_packet_size = min;
        self
    }
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            min_packet_size: LENGTH_PREFIX_SIZE as u32,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            idle_retries: DEFAULT_IDLE_RETRIES,
            idle_interval_ms: DEFAULT_IDLE_INTERVAL.as_millis() as u64,
        }
    }
}

/// Reads whole length-prefixed packets from a stream.
///
/// Bytes that arrive ahead of the packet being read (a client pipelining
/// StartData and EndData in one segment, say) stay queued for the next call.
pub struct PacketReader<R> {
    inner: R,
    buffer: PacketBuffer,
    ready: VecDeque<Bytes>,
    config: FramerConfig,
    scratch: Vec<u8>,
    /// At least one packet has been handed out.
    delivered: bool,
}

impl<R: AsyncRead + Unpin> PacketReader<R> {
    /// Wrap a stream.
    pub fn new(inner: R, config: FramerConfig) -> Self {
        Self {
            inner,
            buffer: PacketBuffer::with_limits(config.min_packet_size, config.max_packet_size),
            ready: VecDeque::new(),
            config,
            scratch: vec![0u8; READ_CHUNK_SIZE],
            delivered: false,
        }
    }

    /// Read exactly one packet, length prefix included.
    ///
    /// # Errors
    ///
    /// - `ConnectionClosed` if the stream ends on a packet boundary
    /// - `Framing` if it ends mid-packet, the declared length is out of
    ///   bounds, or the peer stays silent past the retry budget before the
    ///   first packet or partway through one
    /// - `Io` for socket errors
    pub async fn read_packet(&mut self) -> Result<Bytes> {
        let mut idle = 0u32;

        loop {
            if let Some(packet) = self.ready.pop_front() {
                self.delivered = true;
                return Ok(packet);
            }

            let read = if self.delivered && self.buffer.is_empty() {
                // Between packets: block until the peer writes or hangs up.
                Ok(self.inner.read(&mut self.scratch).await)
            } else {
                tokio::time::timeout(self.config.idle_interval(), self.inner.read(&mut self.scratch))
                    .await
            };

            match read {
                Err(_elapsed) => {
                    idle += 1;
                    if idle > self.config.idle_retries {
                        return Err(VcamError::Framing(format!(
                            "peer silent for {} intervals with {} bytes buffered",
                            idle,
                            self.buffer.len()
                        )));
                    }
                    tracing::debug!(
                        "Initiator isn't sending anything, trying again ({}/{})",
                        idle,
                        self.config.idle_retries
                    );
                }
                Ok(Ok(0)) => {
                    if self.buffer.is_empty() {
                        return Err(VcamError::ConnectionClosed);
                    }
                    let wanted = self.buffer.pending_length().unwrap_or(LENGTH_PREFIX_SIZE);
                    return Err(VcamError::Framing(format!(
                        "stream closed after {} of {} bytes",
                        self.buffer.len(),
                        wanted
                    )));
                }
                Ok(Ok(n)) => {
                    idle = 0;
                    let packets = self.buffer.push(&self.scratch[..n])?;
                    self.ready.extend(packets);
                }
                Ok(Err(e)) => return Err(VcamError::Io(e)),
            }
        }
    }

    /// Get a reference to the underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Unwrap the underlying stream, dropping any buffered bytes.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Write one packet in full, then flush.
///
/// # Errors
///
/// Returns `PartialWrite` if the stream stops accepting bytes before the
/// whole packet is written.
pub async fn write_packet<W: AsyncWrite + Unpin>(writer: &mut W, packet: &[u8]) -> Result<()> {
    let mut written = 0;

    while written < packet.len() {
        match writer.write(&packet[written..]).await {
            Ok(0) => {
                return Err(VcamError::PartialWrite {
                    written,
                    expected: packet.len(),
                })
            }
            Ok(n) => written += n,
            Err(e) if written > 0 => {
                tracing::warn!("Write failed mid-packet: {}", e);
                return Err(VcamError::PartialWrite {
                    written,
                    expected: packet.len(),
                });
            }
            Err(e) => return Err(VcamError::Io(e)),
        }
    }

    writer.flush().await?;
    Ok(())
}
