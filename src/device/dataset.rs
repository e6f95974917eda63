//! PTP dataset serialization helpers.
//!
//! Datasets are little-endian. Strings are a `u8` character count (NUL
//! included) followed by UTF-16LE units; the empty string is a single zero
//! byte. Arrays are a `u32` element count followed by the elements.

use bytes::{BufMut, Bytes, BytesMut};

/// Append-only builder for PTP datasets.
#[derive(Default)]
pub struct DatasetWriter {
    buf: BytesMut,
}

impl DatasetWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16_le(value);
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_le(value);
        self
    }

    /// Append a PTP string. Longer strings are cut at 254 characters.
    pub fn string(&mut self, value: &str) -> &mut Self {
        let units: Vec<u16> = value.encode_utf16().take(254).collect();
        if units.is_empty() {
            self.buf.put_u8(0);
            return self;
        }
        self.buf.put_u8(units.len() as u8 + 1);
        for unit in units {
            self.buf.put_u16_le(unit);
        }
        self.buf.put_u16_le(0);
        self
    }

    pub fn u16_array(&mut self, values: &[u16]) -> &mut Self {
        self.buf.put_u32_le(values.len() as u32);
        for v in values {
            self.buf.put_u16_le(*v);
        }
        self
    }

    pub fn u32_array(&mut self, values: &[u32]) -> &mut Self {
        self.buf.put_u32_le(values.len() as u32);
        for v in values {
            self.buf.put_u32_le(*v);
        }
        self
    }

    /// Append raw bytes.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}
