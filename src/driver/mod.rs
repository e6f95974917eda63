//! Transport drivers.
//!
//! Each driver owns the I/O for one way of reaching the device:
//!
//! - [`usb`]: bulk containers on gadget endpoints, no translation
//! - [`ptpip`]: PTP/IP on the ISO port, bridged to bulk containers
//! - [`fuji`]: bulk containers over TCP on the Fujifilm Wi-Fi ports
//!
//! [`run`] picks one from the configuration.

pub mod fuji;
pub mod ptpip;
pub mod secondary;
pub mod usb;

pub use fuji::FujiServer;
pub use ptpip::{init_ack, PtpIpServer};
pub use secondary::{ChannelKind, SecondaryChannels};
pub use usb::{run_gadget, serve_bulk, BulkPipe, PendingReply};

use tokio_util::sync::CancellationToken;

use crate::config::EmulatorConfig;
use crate::device::Device;
use crate::error::Result;

/// Run the emulator described by `config` until cancelled.
///
/// USB endpoints win when configured. Otherwise the model decides between
/// the Fuji ports and plain PTP/IP.
pub async fn run(config: EmulatorConfig, token: CancellationToken) -> Result<()> {
    tracing::info!("Emulating {} ({})", config.model, config.model.profile().model);

    if let Some(endpoints) = config.usb.clone() {
        return run_gadget(Device::new(config.model), &endpoints, token).await;
    }

    if config.model.uses_fuji_transport() {
        FujiServer::bind(config).await?.run(token).await
    } else {
        PtpIpServer::bind(config).await?.run(token).await
    }
}
