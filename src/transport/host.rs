//! Host-library surface of an emulated USB camera.
//!
//! A shim standing in for a USB host library (enumeration, descriptors,
//! bulk and control transfers) calls into [`UsbHostCallbacks`]. Transfers
//! are synchronous, as host libraries expose them; simulated hardware
//! delays block the calling thread.

use std::collections::VecDeque;

use bytes::{BufMut, Bytes, BytesMut};

use crate::device::{Device, Model};
use crate::driver::BulkPipe;
use crate::error::{Result, VcamError};
use crate::protocol::codes::rc;

/// Bulk IN endpoint address.
pub const EP_BULK_IN: u8 = 0x81;
/// Bulk OUT endpoint address.
pub const EP_BULK_OUT: u8 = 0x02;
/// Interrupt IN endpoint address.
pub const EP_INTERRUPT: u8 = 0x82;

/// Canon vendor id.
pub const CANON_VENDOR_ID: u16 = 0x04A9;
/// EOS Rebel T6 / 1300D product id.
pub const EOS_REBEL_T6_PRODUCT_ID: u16 = 0x32B4;

const LANGUAGE_EN_US: u16 = 0x0409;
const MAX_PACKET_SIZE_0: u8 = 64;
const BULK_MAX_PACKET_SIZE: u16 = 512;

/// USB descriptor type codes.
pub mod descriptor_type {
    pub const DEVICE: u8 = 0x01;
    pub const CONFIGURATION: u8 = 0x02;
    pub const STRING: u8 = 0x03;
    pub const INTERFACE: u8 = 0x04;
    pub const ENDPOINT: u8 = 0x05;
}

/// Standard and still-image class request codes.
pub mod request {
    pub const GET_STATUS: u8 = 0x00;
    pub const GET_DESCRIPTOR: u8 = 0x06;
    pub const SET_CONFIGURATION: u8 = 0x09;
    pub const SET_INTERFACE: u8 = 0x0B;

    pub const CANCEL: u8 = 0x64;
    pub const GET_EXTENDED_EVENT_DATA: u8 = 0x65;
    pub const DEVICE_RESET: u8 = 0x66;
    pub const GET_DEVICE_STATUS: u8 = 0x67;
}

/// String descriptor indices.
mod string_index {
    pub const MANUFACTURER: u8 = 1;
    pub const PRODUCT: u8 = 2;
    pub const SERIAL: u8 = 3;
    pub const INTERFACE: u8 = 4;
}

const REQUEST_TYPE_MASK: u8 = 0x60;
const REQUEST_TYPE_STANDARD: u8 = 0x00;
const REQUEST_TYPE_CLASS: u8 = 0x20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub bcd_usb: u16,
    pub device_class: u8,
    pub device_subclass: u8,
    pub device_protocol: u8,
    pub max_packet_size0: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub bcd_device: u16,
    pub i_manufacturer: u8,
    pub i_product: u8,
    pub i_serial_number: u8,
    pub num_configurations: u8,
}

impl DeviceDescriptor {
    pub const SIZE: u8 = 18;

    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u8(Self::SIZE);
        buf.put_u8(descriptor_type::DEVICE);
        buf.put_u16_le(self.bcd_usb);
        buf.put_u8(self.device_class);
        buf.put_u8(self.device_subclass);
        buf.put_u8(self.device_protocol);
        buf.put_u8(self.max_packet_size0);
        buf.put_u16_le(self.vendor_id);
        buf.put_u16_le(self.product_id);
        buf.put_u16_le(self.bcd_device);
        buf.put_u8(self.i_manufacturer);
        buf.put_u8(self.i_product);
        buf.put_u8(self.i_serial_number);
        buf.put_u8(self.num_configurations);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub address: u8,
    /// Transfer type in the low two bits: 2 bulk, 3 interrupt.
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

impl EndpointDescriptor {
    pub const SIZE: u8 = 7;

    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u8(Self::SIZE);
        buf.put_u8(descriptor_type::ENDPOINT);
        buf.put_u8(self.address);
        buf.put_u8(self.attributes);
        buf.put_u16_le(self.max_packet_size);
        buf.put_u8(self.interval);
    }
}

/// Interface descriptor with its endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub number: u8,
    pub alternate_setting: u8,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub i_interface: u8,
    pub endpoints: Vec<EndpointDescriptor>,
}

impl InterfaceDescriptor {
    pub const SIZE: u8 = 9;

    /// Bytes of this descriptor plus its endpoints.
    pub fn size(&self) -> usize {
        Self::SIZE as usize + self.endpoints.len() * EndpointDescriptor::SIZE as usize
    }

    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_u8(Self::SIZE);
        buf.put_u8(descriptor_type::INTERFACE);
        buf.put_u8(self.number);
        buf.put_u8(self.alternate_setting);
        buf.put_u8(self.endpoints.len() as u8);
        buf.put_u8(self.class);
        buf.put_u8(self.subclass);
        buf.put_u8(self.protocol);
        buf.put_u8(self.i_interface);
        for ep in &self.endpoints {
            ep.serialize(buf);
        }
    }
}

/// Setup packet of a control transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl ControlRequest {
    /// Device-to-host direction bit.
    pub fn is_device_to_host(&self) -> bool {
        self.request_type & 0x80 != 0
    }
}

/// What a host-library shim needs from an emulated device.
pub trait UsbHostCallbacks {
    /// Number of devices to enumerate.
    fn device_count(&self) -> usize;

    fn get_device_descriptor(&self, devn: usize) -> Result<DeviceDescriptor>;

    fn get_interface_descriptor(&self, devn: usize, interface: u8) -> Result<InterfaceDescriptor>;

    /// String descriptor `index` as text.
    fn get_string_descriptor(&self, devn: usize, index: u8) -> Result<String>;

    /// Run one bulk or interrupt transfer. Returns bytes transferred.
    fn handle_bulk_transfer(&mut self, devn: usize, endpoint: u8, data: &mut [u8]) -> Result<usize>;

    /// Run one control transfer. Returns bytes placed in `data` (IN) or consumed (OUT).
    fn handle_control_request(
        &mut self,
        devn: usize,
        setup: &ControlRequest,
        data: &mut [u8],
    ) -> Result<usize>;
}

/// One emulated PTP camera on a host-library bus.
pub struct EmulatedUsbDevice {
    pipe: BulkPipe,
    outbound: VecDeque<u8>,
    manufacturer: &'static str,
    product: &'static str,
    serial: &'static str,
}

impl EmulatedUsbDevice {
    /// Emulate the Canon body that host-side tools look for.
    pub fn new() -> Self {
        Self::with_device(Device::new(Model::Canon))
    }

    pub fn with_device(device: Device) -> Self {
        Self {
            pipe: BulkPipe::new(device),
            outbound: VecDeque::new(),
            manufacturer: "Canon, Inc.",
            product: "EOS Rebel T6",
            serial: "12345678",
        }
    }

    pub fn device(&self) -> &Device {
        self.pipe.device()
    }

    /// Bytes waiting on bulk IN.
    pub fn pending_in(&self) -> usize {
        self.outbound.len()
    }

    /// Full configuration descriptor set, header included.
    pub fn configuration_descriptor(&self) -> Bytes {
        let interface = self.interface();
        let total = 9 + interface.size();
        let mut buf = BytesMut::with_capacity(total);
        buf.put_u8(9);
        buf.put_u8(descriptor_type::CONFIGURATION);
        buf.put_u16_le(total as u16);
        buf.put_u8(1); // interfaces
        buf.put_u8(1); // configuration value
        buf.put_u8(0); // iConfiguration
        buf.put_u8(0xC0); // self-powered
        buf.put_u8(1); // 2 mA
        interface.serialize(&mut buf);
        buf.freeze()
    }

    fn interface(&self) -> InterfaceDescriptor {
        let bulk = |address| EndpointDescriptor {
            address,
            attributes: 0x02,
            max_packet_size: BULK_MAX_PACKET_SIZE,
            interval: 0,
        };
        InterfaceDescriptor {
            number: 0,
            alternate_setting: 0,
            class: 6,
            subclass: 1,
            protocol: 1,
            i_interface: string_index::INTERFACE,
            endpoints: vec![
                bulk(EP_BULK_IN),
                bulk(EP_BULK_OUT),
                EndpointDescriptor {
                    address: EP_INTERRUPT,
                    attributes: 0x03,
                    max_packet_size: 8,
                    interval: 8,
                },
            ],
        }
    }

    fn string(&self, index: u8) -> Option<&'static str> {
        match index {
            string_index::MANUFACTURER => Some(self.manufacturer),
            string_index::PRODUCT => Some(self.product),
            string_index::SERIAL => Some(self.serial),
            string_index::INTERFACE => Some("PTP"),
            _ => None,
        }
    }

    fn string_descriptor_bytes(&self, index: u8) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        if index == 0 {
            buf.put_u8(4);
            buf.put_u8(descriptor_type::STRING);
            buf.put_u16_le(LANGUAGE_EN_US);
            return Ok(buf.freeze());
        }
        let text = self
            .string(index)
            .ok_or_else(|| VcamError::Protocol(format!("no string descriptor {}", index)))?;
        let units: Vec<u16> = text.encode_utf16().collect();
        buf.put_u8((2 + units.len() * 2) as u8);
        buf.put_u8(descriptor_type::STRING);
        for unit in units {
            buf.put_u16_le(unit);
        }
        Ok(buf.freeze())
    }

    fn descriptor_bytes(&self, value: u16) -> Result<Bytes> {
        let (kind, index) = ((value >> 8) as u8, value as u8);
        match kind {
            descriptor_type::DEVICE => {
                let mut buf = BytesMut::with_capacity(DeviceDescriptor::SIZE as usize);
                self.get_device_descriptor(0)?.serialize(&mut buf);
                Ok(buf.freeze())
            }
            descriptor_type::CONFIGURATION => Ok(self.configuration_descriptor()),
            descriptor_type::STRING => self.string_descriptor_bytes(index),
            other => Err(VcamError::Protocol(format!(
                "unsupported descriptor type {:#04x}",
                other
            ))),
        }
    }

    fn bulk_out(&mut self, data: &[u8]) -> Result<usize> {
        for reply in self.pipe.feed(data)? {
            if !reply.delay.is_zero() {
                std::thread::sleep(reply.delay);
            }
            for transfer in reply.transfers {
                self.outbound.extend(transfer.iter());
            }
        }
        Ok(data.len())
    }

    fn bulk_in(&mut self, data: &mut [u8]) -> usize {
        let n = data.len().min(self.outbound.len());
        for (slot, byte) in data.iter_mut().zip(self.outbound.drain(..n)) {
            *slot = byte;
        }
        n
    }

    fn cancel(&mut self) {
        self.pipe.reset();
        self.outbound.clear();
    }
}

impl Default for EmulatedUsbDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn copy_out(src: &[u8], dst: &mut [u8], requested: u16) -> usize {
    let n = src.len().min(dst.len()).min(requested as usize);
    dst[..n].copy_from_slice(&src[..n]);
    n
}

impl UsbHostCallbacks for EmulatedUsbDevice {
    fn device_count(&self) -> usize {
        1
    }

    fn get_device_descriptor(&self, _devn: usize) -> Result<DeviceDescriptor> {
        Ok(DeviceDescriptor {
            bcd_usb: 0x0200,
            device_class: 0,
            device_subclass: 0,
            device_protocol: 0,
            max_packet_size0: MAX_PACKET_SIZE_0,
            vendor_id: CANON_VENDOR_ID,
            product_id: EOS_REBEL_T6_PRODUCT_ID,
            bcd_device: 0x0002,
            i_manufacturer: string_index::MANUFACTURER,
            i_product: string_index::PRODUCT,
            i_serial_number: string_index::SERIAL,
            num_configurations: 1,
        })
    }

    fn get_interface_descriptor(&self, _devn: usize, interface: u8) -> Result<InterfaceDescriptor> {
        if interface != 0 {
            return Err(VcamError::Protocol(format!("no interface {}", interface)));
        }
        Ok(self.interface())
    }

    fn get_string_descriptor(&self, _devn: usize, index: u8) -> Result<String> {
        self.string(index)
            .map(str::to_owned)
            .ok_or_else(|| VcamError::Protocol(format!("no string descriptor {}", index)))
    }

    fn handle_bulk_transfer(&mut self, _devn: usize, endpoint: u8, data: &mut [u8]) -> Result<usize> {
        match endpoint {
            EP_BULK_OUT => self.bulk_out(data),
            EP_BULK_IN => Ok(self.bulk_in(data)),
            EP_INTERRUPT => Ok(0),
            other => Err(VcamError::Protocol(format!("no endpoint {:#04x}", other))),
        }
    }

    fn handle_control_request(
        &mut self,
        _devn: usize,
        setup: &ControlRequest,
        data: &mut [u8],
    ) -> Result<usize> {
        tracing::debug!(
            "control type={:#04x} request={:#04x} value={:#06x} index={} length={}",
            setup.request_type,
            setup.request,
            setup.value,
            setup.index,
            setup.length
        );

        match (setup.request_type & REQUEST_TYPE_MASK, setup.request) {
            (REQUEST_TYPE_STANDARD, request::GET_STATUS) => {
                Ok(copy_out(&[0, 0], data, setup.length))
            }
            (REQUEST_TYPE_STANDARD, request::GET_DESCRIPTOR) => {
                let bytes = self.descriptor_bytes(setup.value)?;
                Ok(copy_out(&bytes, data, setup.length))
            }
            (REQUEST_TYPE_STANDARD, request::SET_CONFIGURATION | request::SET_INTERFACE) => Ok(0),
            (REQUEST_TYPE_CLASS, request::CANCEL) => {
                tracing::info!("Host cancelled the current transaction");
                self.cancel();
                Ok(0)
            }
            (REQUEST_TYPE_CLASS, request::DEVICE_RESET) => {
                tracing::info!("Host reset the device");
                self.cancel();
                self.pipe.device_mut().session_mut().close();
                Ok(0)
            }
            (REQUEST_TYPE_CLASS, request::GET_DEVICE_STATUS) => {
                let mut status = [0u8; 4];
                status[..2].copy_from_slice(&4u16.to_le_bytes());
                status[2..].copy_from_slice(&rc::OK.to_le_bytes());
                Ok(copy_out(&status, data, setup.length))
            }
            (REQUEST_TYPE_CLASS, request::GET_EXTENDED_EVENT_DATA) => Ok(0),
            (kind, req) => Err(VcamError::Protocol(format!(
                "unsupported control request type={:#04x} request={:#04x}",
                kind, req
            ))),
        }
    }
}
