//! Codec module - translation between transport representations.
//!
//! - [`PtpIpBridge`] - USB bulk containers to PTP/IP packets and back
//!
//! # Design
//!
//! The bridge is a marker struct with static methods rather than a trait
//! object. It holds no state and performs no I/O, so byte layouts can be
//! tested directly.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use ptp_vcam::codec::PtpIpBridge;
//! use ptp_vcam::protocol::BulkContainer;
//!
//! let data = BulkContainer::data(0x9116, 7, Bytes::from_static(b"payload"));
//! let packets = PtpIpBridge::bulk_to_ptpip(&data).unwrap();
//! assert_eq!(packets.len(), 2);
//!
//! let joined = PtpIpBridge::ptpip_to_bulk(&packets, 0x9116).unwrap();
//! assert_eq!(joined, data);
//! ```

mod bridge;

pub use bridge::{PtpIpBridge, UNKNOWN_DATA_LENGTH};
