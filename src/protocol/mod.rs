//! Protocol module - wire formats and framing.
//!
//! This module implements both wire representations of a PTP transaction:
//! - 12-byte USB bulk containers ([`BulkContainer`])
//! - PTP/IP packets ([`PtpIpPacket`])
//! - Length-prefix accumulation and stream framing shared by every transport

pub mod codes;

mod bulk;
mod framer;
mod packet_buffer;
mod ptpip;

pub use bulk::{BulkContainer, BulkKind, BULK_HEADER_SIZE, MAX_PARAMS};
pub use framer::{
    write_packet, FramerConfig, PacketReader, DEFAULT_IDLE_INTERVAL, DEFAULT_IDLE_RETRIES,
};
pub use packet_buffer::{PacketBuffer, DEFAULT_MAX_PACKET_SIZE, LENGTH_PREFIX_SIZE};
pub use ptpip::{
    data_phase, packet_type, peek_packet_type, InitIdentity, PtpIpPacket,
    COMMAND_REQUEST_HEADER_SIZE, COMMAND_RESPONSE_HEADER_SIZE, END_DATA_HEADER_SIZE, GUID_SIZE,
    PTPIP_HEADER_SIZE, START_DATA_SIZE,
};
