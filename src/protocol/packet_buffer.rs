//! Packet buffer for accumulating partial reads.
//!
//! Both wire representations start with a little-endian `u32` that counts
//! the whole packet, prefix included, so one accumulator serves the TCP
//! framer and the USB bulk loop alike.
//!
//! State machine:
//! - `WaitingForLength`: need at least 4 bytes
//! - `WaitingForBody`: length parsed, need the rest of the packet
//!
//! # Example
//!
//! ```
//! use ptp_vcam::protocol::PacketBuffer;
//!
//! let mut buffer = PacketBuffer::new();
//! assert!(buffer.push(&[8, 0, 0]).unwrap().is_empty());
//! let packets = buffer.push(&[0, 13, 0, 0, 0]).unwrap();
//! assert_eq!(packets.len(), 1);
//! assert_eq!(packets[0].len(), 8);
//! ```

use bytes::{Bytes, BytesMut};

use crate::error::{Result, VcamError};

/// Size of the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum packet size (64 MiB).
pub const DEFAULT_MAX_PACKET_SIZE: u32 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
enum State {
    WaitingForLength,
    WaitingForBody { length: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete packets.
pub struct PacketBuffer {
    buffer: BytesMut,
    state: State,
    min_packet_size: u32,
    max_packet_size: u32,
}

impl PacketBuffer {
    /// Create a buffer accepting any packet of at least the prefix size.
    pub fn new() -> Self {
        Self::with_limits(LENGTH_PREFIX_SIZE as u32, DEFAULT_MAX_PACKET_SIZE)
    }

    /// Create a buffer with custom bounds on the declared packet length.
    pub fn with_limits(min_packet_size: u32, max_packet_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForLength,
            min_packet_size: min_packet_size.max(LENGTH_PREFIX_SIZE as u32),
            max_packet_size,
        }
    }

    /// Push data into the buffer and extract all complete packets.
    ///
    /// Returned packets include their length prefix. Partial data stays
    /// buffered for the next push.
    ///
    /// # Errors
    ///
    /// Returns `Framing` if a declared length is outside the configured bounds.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut packets = Vec::new();
        while let Some(packet) = self.try_extract_one()? {
            packets.push(packet);
        }
        Ok(packets)
    }

    fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        match self.state {
            State::WaitingForLength => {
                if self.buffer.len() < LENGTH_PREFIX_SIZE {
                    return Ok(None);
                }

                let length = u32::from_le_bytes([
                    self.buffer[0],
                    self.buffer[1],
                    self.buffer[2],
                    self.buffer[3],
                ]);

                if length < self.min_packet_size {
                    return Err(VcamError::Framing(format!(
                        "declared packet length {} below minimum {}",
                        length, self.min_packet_size
                    )));
                }
                if length > self.max_packet_size {
                    return Err(VcamError::Framing(format!(
                        "declared packet length {} exceeds maximum {}",
                        length, self.max_packet_size
                    )));
                }

                self.state = State::WaitingForBody {
                    length: length as usize,
                };
                self.try_extract_one()
            }

            State::WaitingForBody { length } => {
                if self.buffer.len() < length {
                    return Ok(None);
                }

                let packet = self.buffer.split_to(length).freeze();
                self.state = State::WaitingForLength;
                Ok(Some(packet))
            }
        }
    }

    /// Bytes still needed to complete the packet in progress, if one is known.
    pub fn pending_length(&self) -> Option<usize> {
        match self.state {
            State::WaitingForLength => None,
            State::WaitingForBody { length } => Some(length),
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForLength;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForLength => "WaitingForLength",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}
