//! Typed device property store.
//!
//! Backs GetDevicePropDesc, GetDevicePropValue and SetDevicePropValue. Each
//! property has a PTP datatype that fixes its wire width and signedness; the
//! value itself is held as an `i64` and narrowed on encode.

use std::collections::BTreeMap;

use bytes::Bytes;

use super::dataset::DatasetWriter;
use crate::protocol::codes::{datatype, prop, rc};

const FORM_NONE: u8 = 0x00;
const FORM_ENUM: u8 = 0x02;

/// One device property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub code: u16,
    pub datatype: u16,
    pub writable: bool,
    pub factory_default: i64,
    pub current: i64,
    /// Allowed values; empty means unconstrained.
    pub allowed: Vec<i64>,
}

impl Property {
    /// Create a read-only property.
    pub fn read_only(code: u16, datatype: u16, value: i64) -> Self {
        Self {
            code,
            datatype,
            writable: false,
            factory_default: value,
            current: value,
            allowed: Vec::new(),
        }
    }

    /// Create a writable property restricted to `allowed`.
    pub fn enumerated(code: u16, datatype: u16, value: i64, allowed: &[i64]) -> Self {
        Self {
            code,
            datatype,
            writable: true,
            factory_default: value,
            current: value,
            allowed: allowed.to_vec(),
        }
    }

    /// Wire width of this property's values.
    pub fn width(&self) -> usize {
        width_of(self.datatype)
    }

    /// Encode the current value.
    pub fn encode_value(&self) -> Bytes {
        let mut w = DatasetWriter::new();
        put_value(&mut w, self.datatype, self.current);
        w.finish()
    }

    /// Encode the DevicePropDesc dataset.
    pub fn encode_desc(&self) -> Bytes {
        let mut w = DatasetWriter::new();
        w.u16(self.code).u16(self.datatype).u8(u8::from(self.writable));
        put_value(&mut w, self.datatype, self.factory_default);
        put_value(&mut w, self.datatype, self.current);

        if self.allowed.is_empty() {
            w.u8(FORM_NONE);
        } else {
            w.u8(FORM_ENUM).u16(self.allowed.len() as u16);
            for v in &self.allowed {
                put_value(&mut w, self.datatype, *v);
            }
        }
        w.finish()
    }

    /// Decode a value sent by the initiator.
    pub fn decode_value(&self, data: &[u8]) -> Option<i64> {
        if data.len() != self.width() {
            return None;
        }
        let value = match self.datatype {
            datatype::INT8 => i64::from(data[0] as i8),
            datatype::UINT8 => i64::from(data[0]),
            datatype::INT16 => i64::from(i16::from_le_bytes([data[0], data[1]])),
            datatype::UINT16 => i64::from(u16::from_le_bytes([data[0], data[1]])),
            datatype::INT32 => i64::from(i32::from_le_bytes([data[0], data[1], data[2], data[3]])),
            _ => i64::from(u32::from_le_bytes([data[0], data[1], data[2], data[3]])),
        };
        Some(value)
    }
}

fn width_of(datatype: u16) -> usize {
    match datatype {
        datatype::INT8 | datatype::UINT8 => 1,
        datatype::INT16 | datatype::UINT16 => 2,
        _ => 4,
    }
}

fn put_value(w: &mut DatasetWriter, datatype: u16, value: i64) {
    match width_of(datatype) {
        1 => w.u8(value as u8),
        2 => w.u16(value as u16),
        _ => w.u32(value as u32),
    };
}

/// Properties of one session, keyed by code.
#[derive(Debug, Clone, Default)]
pub struct PropertyStore {
    props: BTreeMap<u16, Property>,
}

impl PropertyStore {
    /// Store seeded with the standard properties every model exposes.
    pub fn with_defaults() -> Self {
        let mut store = Self::default();
        store.insert(Property::read_only(prop::BATTERY_LEVEL, datatype::UINT8, 100));
        store.insert(Property::enumerated(
            prop::F_NUMBER,
            datatype::UINT16,
            280,
            &[180, 280, 400, 560, 800, 1100, 1600],
        ));
        // Exposure time in units of 0.1 ms.
        store.insert(Property::enumerated(
            prop::EXPOSURE_TIME,
            datatype::UINT32,
            80,
            &[10, 20, 40, 80, 166, 333, 10_000],
        ));
        store.insert(Property::enumerated(
            prop::EXPOSURE_BIAS,
            datatype::INT16,
            0,
            &[-2000, -1000, 0, 1000, 2000],
        ));
        store
    }

    pub fn insert(&mut self, property: Property) {
        self.props.insert(property.code, property);
    }

    pub fn get(&self, code: u16) -> Option<&Property> {
        self.props.get(&code)
    }

    /// Codes in ascending order.
    pub fn codes(&self) -> Vec<u16> {
        self.props.keys().copied().collect()
    }

    /// Apply an initiator-supplied value.
    ///
    /// On rejection returns the PTP response code to send back.
    pub fn set_from_wire(&mut self, code: u16, data: &[u8]) -> Result<i64, u16> {
        let property = self
            .props
            .get_mut(&code)
            .ok_or(rc::DEVICE_PROP_NOT_SUPPORTED)?;
        if !property.writable {
            return Err(rc::ACCESS_DENIED);
        }
        let value = property
            .decode_value(data)
            .ok_or(rc::INVALID_DEVICE_PROP_VALUE)?;
        if !property.allowed.is_empty() && !property.allowed.contains(&value) {
            return Err(rc::INVALID_DEVICE_PROP_VALUE);
        }
        property.current = value;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_present() {
        let store = PropertyStore::with_defaults();
        assert_eq!(
            store.codes(),
            vec![
                prop::BATTERY_LEVEL,
                prop::F_NUMBER,
                prop::EXPOSURE_TIME,
                prop::EXPOSURE_BIAS
            ]
        );
    }

    #[test]
    fn test_set_and_read_back() {
        let mut store = PropertyStore::with_defaults();
        assert_eq!(store.set_from_wire(prop::F_NUMBER, &400u16.to_le_bytes()), Ok(400));
        assert_eq!(
            store.get(prop::F_NUMBER).unwrap().encode_value().as_ref(),
            &400u16.to_le_bytes()
        );
    }

    #[test]
    fn test_signed_value() {
        let mut store = PropertyStore::with_defaults();
        let raw = (-1000i16).to_le_bytes();
        assert_eq!(store.set_from_wire(prop::EXPOSURE_BIAS, &raw), Ok(-1000));
        assert_eq!(
            store.get(prop::EXPOSURE_BIAS).unwrap().encode_value().as_ref(),
            &raw
        );
    }

    #[test]
    fn test_rejections() {
        let mut store = PropertyStore::with_defaults();
        assert_eq!(
            store.set_from_wire(prop::BATTERY_LEVEL, &[50]),
            Err(rc::ACCESS_DENIED)
        );
        assert_eq!(
            store.set_from_wire(prop::F_NUMBER, &[1, 2, 3, 4]),
            Err(rc::INVALID_DEVICE_PROP_VALUE)
        );
        assert_eq!(
            store.set_from_wire(prop::F_NUMBER, &123u16.to_le_bytes()),
            Err(rc::INVALID_DEVICE_PROP_VALUE)
        );
        assert_eq!(
            store.set_from_wire(0x5999, &[0]),
            Err(rc::DEVICE_PROP_NOT_SUPPORTED)
        );
    }

    #[test]
    fn test_desc_layout() {
        let desc = Property::read_only(prop::BATTERY_LEVEL, datatype::UINT8, 100).encode_desc();
        assert_eq!(desc.as_ref(), &[0x01, 0x50, 0x02, 0x00, 0x00, 100, 100, FORM_NONE]);
    }
}
