//! Error types for ptp-vcam.

use thiserror::Error;

/// Main error type for all emulator operations.
#[derive(Debug, Error)]
pub enum VcamError {
    /// I/O error during socket or endpoint operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading a configuration file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed or incomplete length-prefixed packet on a stream.
    #[error("Framing error: {0}")]
    Framing(String),

    /// The bridge was handed a container kind it cannot translate.
    #[error("Unsupported container type {kind:#x}")]
    UnsupportedContainer { kind: u32 },

    /// The peer accepted fewer bytes than the packet length.
    #[error("Partial write: {written} of {expected} bytes")]
    PartialWrite { written: usize, expected: usize },

    /// Property-change queue is at capacity.
    #[error("Property change queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// A byte slice was too short for the structure being decoded.
    #[error("Truncated {what}: need {needed} bytes, have {available}")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    /// Two halves of one transaction disagree on the transaction id.
    #[error("Transaction mismatch: expected {expected}, found {found}")]
    TransactionMismatch { expected: u32, found: u32 },

    /// Protocol sequencing error (unexpected packet in this state, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Peer closed the connection on a packet boundary.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl VcamError {
    /// Shorthand for a bounds failure while decoding `what`.
    pub(crate) fn truncated(what: &'static str, needed: usize, available: usize) -> Self {
        Self::Truncated {
            what,
            needed,
            available,
        }
    }

    /// Whether this error means the peer simply went away.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}

/// Result type alias using VcamError.
pub type Result<T> = std::result::Result<T, VcamError>;
