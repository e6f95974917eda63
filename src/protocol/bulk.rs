//! USB bulk container encoding and decoding.
//!
//! Implements the 12-byte PTP/USB container header:
//! ```text
//! ┌──────────┬──────────┬──────────┬────────────────┐
//! │ Length   │ Type     │ Code     │ Transaction ID │ params / payload
//! │ 4 bytes  │ 2 bytes  │ 2 bytes  │ 4 bytes        │
//! │ uint32 LE│ uint16 LE│ uint16 LE│ uint32 LE      │
//! └──────────┴──────────┴──────────┴────────────────┘
//! ```
//!
//! The length field covers the header. For command, response and event
//! containers the body is up to five `u32` parameters; for data containers
//! it is an opaque payload and `code` echoes the operation code.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, VcamError};

/// Bulk container header size in bytes (fixed, exactly 12).
pub const BULK_HEADER_SIZE: usize = 12;

/// Maximum number of parameters in a command/response/event container.
pub const MAX_PARAMS: usize = 5;

/// Container type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BulkKind {
    Command = 1,
    Data = 2,
    Response = 3,
    Event = 4,
}

impl BulkKind {
    /// Parse the wire value of the type field.
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            1 => Ok(Self::Command),
            2 => Ok(Self::Data),
            3 => Ok(Self::Response),
            4 => Ok(Self::Event),
            other => Err(VcamError::UnsupportedContainer {
                kind: u32::from(other),
            }),
        }
    }

    /// Whether the body of this kind is a parameter list.
    #[inline]
    pub fn has_params(self) -> bool {
        !matches!(self, Self::Data)
    }
}

/// One PTP/USB bulk container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkContainer {
    pub kind: BulkKind,
    /// Operation code (Command, Data), response code (Response) or event code (Event).
    pub code: u16,
    pub transaction_id: u32,
    /// Encoded parameters or raw data payload, without the header.
    pub payload: Bytes,
}

impl BulkContainer {
    fn with_params(kind: BulkKind, code: u16, transaction_id: u32, params: &[u32]) -> Self {
        debug_assert!(params.len() <= MAX_PARAMS);
        let mut body = BytesMut::with_capacity(params.len() * 4);
        for p in params {
            body.put_u32_le(*p);
        }
        Self {
            kind,
            code,
            transaction_id,
            payload: body.freeze(),
        }
    }

    /// Create a command container.
    pub fn command(code: u16, transaction_id: u32, params: &[u32]) -> Self {
        Self::with_params(BulkKind::Command, code, transaction_id, params)
    }

    /// Create a response container.
    pub fn response(code: u16, transaction_id: u32, params: &[u32]) -> Self {
        Self::with_params(BulkKind::Response, code, transaction_id, params)
    }

    /// Create an event container.
    pub fn event(code: u16, transaction_id: u32, params: &[u32]) -> Self {
        Self::with_params(BulkKind::Event, code, transaction_id, params)
    }

    /// Create a data container. `code` is the operation this data belongs to.
    pub fn data(code: u16, transaction_id: u32, payload: Bytes) -> Self {
        Self {
            kind: BulkKind::Data,
            code,
            transaction_id,
            payload,
        }
    }

    /// Total length including the header, as written in the length field.
    #[inline]
    pub fn length(&self) -> u32 {
        (BULK_HEADER_SIZE + self.payload.len()) as u32
    }

    /// Number of parameters, derived from the length field.
    #[inline]
    pub fn param_count(&self) -> usize {
        (self.length() as usize - BULK_HEADER_SIZE) / 4
    }

    /// Decode the body as little-endian parameters.
    pub fn params(&self) -> Vec<u32> {
        self.payload
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// Parameter at `index`, or 0 when absent.
    pub fn param(&self, index: usize) -> u32 {
        self.params().get(index).copied().unwrap_or(0)
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.length() as usize);
        buf.put_u32_le(self.length());
        buf.put_u16_le(self.kind as u16);
        buf.put_u16_le(self.code);
        buf.put_u32_le(self.transaction_id);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Decode one container from `buf`.
    ///
    /// `buf` must hold exactly the number of bytes the length field declares.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < BULK_HEADER_SIZE {
            return Err(VcamError::truncated(
                "bulk container header",
                BULK_HEADER_SIZE,
                buf.len(),
            ));
        }

        let length = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if length < BULK_HEADER_SIZE {
            return Err(VcamError::Framing(format!(
                "bulk container length {} shorter than header",
                length
            )));
        }
        if length != buf.len() {
            return Err(VcamError::Framing(format!(
                "bulk container declares {} bytes but {} were supplied",
                length,
                buf.len()
            )));
        }

        let kind = BulkKind::from_u16(u16::from_le_bytes([buf[4], buf[5]]))?;
        let code = u16::from_le_bytes([buf[6], buf[7]]);
        let transaction_id = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let body = &buf[BULK_HEADER_SIZE..];

        if kind.has_params() && (body.len() % 4 != 0 || body.len() > MAX_PARAMS * 4) {
            return Err(VcamError::Protocol(format!(
                "{:?} container with {}-byte parameter block",
                kind,
                body.len()
            )));
        }

        Ok(Self {
            kind,
            code,
            transaction_id,
            payload: Bytes::copy_from_slice(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_layout_is_little_endian() {
        let c = BulkContainer::command(0x1002, 0x0403_0201, &[0xAABB_CCDD]);
        let bytes = c.encode();

        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[0..4], &[16, 0, 0, 0]);
        assert_eq!(&bytes[4..6], &[1, 0]);
        assert_eq!(&bytes[6..8], &[0x02, 0x10]);
        assert_eq!(&bytes[8..12], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[12..16], &[0xDD, 0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn test_decode_round_trip() {
        let c = BulkContainer::response(0x2001, 7, &[1, 2, 3]);
        let decoded = BulkContainer::decode(&c.encode()).unwrap();
        assert_eq!(decoded, c);
        assert_eq!(decoded.param_count(), 3);
        assert_eq!(decoded.params(), vec![1, 2, 3]);
    }

    #[test]
    fn test_data_container_keeps_odd_payload() {
        let c = BulkContainer::data(0x9116, 3, Bytes::from_static(b"abcde"));
        assert_eq!(c.length(), 17);
        let decoded = BulkContainer::decode(&c.encode()).unwrap();
        assert_eq!(decoded.payload, Bytes::from_static(b"abcde"));
    }

    #[test]
    fn test_decode_too_short() {
        let err = BulkContainer::decode(&[0u8; 11]).unwrap_err();
        assert!(matches!(err, VcamError::Truncated { needed: 12, .. }));
    }

    #[test]
    fn test_decode_length_mismatch() {
        let mut bytes = BulkContainer::command(0x1001, 1, &[]).encode().to_vec();
        bytes.push(0);
        assert!(matches!(
            BulkContainer::decode(&bytes),
            Err(VcamError::Framing(_))
        ));
    }

    #[test]
    fn test_decode_unknown_kind() {
        let mut bytes = BulkContainer::command(0x1001, 1, &[]).encode().to_vec();
        bytes[4] = 9;
        assert!(matches!(
            BulkContainer::decode(&bytes),
            Err(VcamError::UnsupportedContainer { kind: 9 })
        ));
    }

    #[test]
    fn test_decode_rejects_six_params() {
        let mut bytes = vec![0u8; BULK_HEADER_SIZE + 24];
        bytes[0] = bytes.len() as u8;
        bytes[4] = 1;
        assert!(matches!(
            BulkContainer::decode(&bytes),
            Err(VcamError::Protocol(_))
        ));
    }

    #[test]
    fn test_param_defaults_to_zero() {
        let c = BulkContainer::command(0x9128, 1, &[2]);
        assert_eq!(c.param(0), 2);
        assert_eq!(c.param(3), 0);
    }
}
