//! Transport module - sockets and endpoints the drivers talk through.
//!
//! Provides:
//! - TCP listeners with cancellable accept
//! - FunctionFS gadget endpoint files (Linux)
//! - An in-process USB host surface for hosting the device without hardware

mod gadget;
mod host;
pub mod tcp;

pub use gadget::GadgetEndpoints;
pub use host::{
    descriptor_type, request, ControlRequest, DeviceDescriptor, EmulatedUsbDevice,
    EndpointDescriptor, InterfaceDescriptor, UsbHostCallbacks, CANON_VENDOR_ID, EP_BULK_IN,
    EP_BULK_OUT, EP_INTERRUPT, EOS_REBEL_T6_PRODUCT_ID,
};
