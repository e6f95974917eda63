//! # ptp-vcam
//!
//! A virtual PTP camera. One emulated device answers operation requests
//! from a PTP host over whichever transport the configuration selects.
//!
//! ## Architecture
//!
//! - **Device** ([`device`]): USB bulk containers in, bulk containers out.
//!   Every transport reduces to this.
//! - **Protocol** ([`protocol`]): bulk container and PTP/IP packet codecs,
//!   length-prefixed framing.
//! - **Codec** ([`codec`]): the PTP/IP ⇄ bulk container bridge.
//! - **Drivers** ([`driver`]): USB gadget, PTP/IP and Fujifilm Wi-Fi loops.
//!
//! ## Example
//!
//! ```ignore
//! use ptp_vcam::config::EmulatorConfig;
//! use ptp_vcam::device::Model;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = EmulatorConfig::builder().model(Model::Canon).build();
//!     ptp_vcam::driver::run(config, CancellationToken::new())
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod codec;
pub mod config;
pub mod device;
pub mod driver;
pub mod error;
pub mod protocol;
pub mod transport;

pub use config::EmulatorConfig;
pub use device::{Device, Model};
pub use error::{Result, VcamError};
