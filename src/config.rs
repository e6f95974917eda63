//! Emulator configuration.
//!
//! Loaded from a JSON file (every field optional) or assembled with
//! [`EmulatorConfig::builder`]. Command-line flags override file values.
//!
//! # Example
//!
//! ```
//! use ptp_vcam::config::EmulatorConfig;
//! use ptp_vcam::device::Model;
//!
//! let config = EmulatorConfig::builder()
//!     .model(Model::Canon)
//!     .ptpip_port(0)
//!     .serve_forever(false)
//!     .build();
//!
//! assert_eq!(config.model, Model::Canon);
//! assert_eq!(config.command_addr().port(), 0);
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::device::Model;
use crate::error::Result;
use crate::protocol::FramerConfig;

/// ISO 15740 PTP/IP port.
pub const DEFAULT_PTPIP_PORT: u16 = 15740;

/// Address the Fuji camera app expects when joined to the camera's access point.
pub const FUJI_ACCESS_POINT_ADDR: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 1);

/// Default wake period of idle secondary channels.
pub const DEFAULT_SECONDARY_IDLE_TICK: Duration = Duration::from_secs(1);

/// The three sockets of the Fuji transport.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FujiPorts {
    pub command: u16,
    pub event: u16,
    pub liveview: u16,
}

impl Default for FujiPorts {
    fn default() -> Self {
        Self {
            command: 55740,
            event: 55741,
            liveview: 55742,
        }
    }
}

/// USB gadget bulk endpoint files, as exposed by FunctionFS.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct UsbEndpoints {
    /// Bulk IN (device to host), written by the emulator.
    pub bulk_in: PathBuf,
    /// Bulk OUT (host to device), read by the emulator.
    pub bulk_out: PathBuf,
}

/// Top-level emulator configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmulatorConfig {
    pub model: Model,
    pub bind_address: IpAddr,
    pub ptpip_port: u16,
    pub fuji_ports: FujiPorts,
    pub framer: FramerConfig,
    /// Wake period of idle event/liveview channels in milliseconds.
    pub secondary_idle_tick_ms: u64,
    /// Listen again after a connection is torn down.
    pub serve_forever: bool,
    /// Serve the USB gadget endpoints instead of TCP.
    pub usb: Option<UsbEndpoints>,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            model: Model::default(),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            ptpip_port: DEFAULT_PTPIP_PORT,
            fuji_ports: FujiPorts::default(),
            framer: FramerConfig::default(),
            secondary_idle_tick_ms: DEFAULT_SECONDARY_IDLE_TICK.as_millis() as u64,
            serve_forever: true,
            usb: None,
        }
    }
}

impl EmulatorConfig {
    pub fn builder() -> EmulatorConfigBuilder {
        EmulatorConfigBuilder::new()
    }

    /// Parse a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Address of the command listener for the configured model.
    pub fn command_addr(&self) -> SocketAddr {
        let port = if self.model.uses_fuji_transport() {
            self.fuji_ports.command
        } else {
            self.ptpip_port
        };
        SocketAddr::new(self.bind_address, port)
    }

    pub fn secondary_idle_tick(&self) -> Duration {
        Duration::from_millis(self.secondary_idle_tick_ms)
    }
}

/// Builder for [`EmulatorConfig`].
#[derive(Debug, Clone, Default)]
pub struct EmulatorConfigBuilder {
    config: EmulatorConfig,
}

impl EmulatorConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration (e.g. one loaded from a file).
    pub fn from_config(config: EmulatorConfig) -> Self {
        Self { config }
    }

    pub fn model(mut self, model: Model) -> Self {
        self.config.model = model;
        self
    }

    pub fn bind_address(mut self, addr: IpAddr) -> Self {
        self.config.bind_address = addr;
        self
    }

    pub fn ptpip_port(mut self, port: u16) -> Self {
        self.config.ptpip_port = port;
        self
    }

    pub fn fuji_ports(mut self, ports: FujiPorts) -> Self {
        self.config.fuji_ports = ports;
        self
    }

    pub fn framer(mut self, framer: FramerConfig) -> Self {
        self.config.framer = framer;
        self
    }

    /// Set the wake period of idle secondary channels.
    pub fn secondary_idle_tick(mut self, tick: Duration) -> Self {
        self.config.secondary_idle_tick_ms = tick.as_millis() as u64;
        self
    }

    pub fn serve_forever(mut self, serve_forever: bool) -> Self {
        self.config.serve_forever = serve_forever;
        self
    }

    pub fn usb(mut self, endpoints: UsbEndpoints) -> Self {
        self.config.usb = Some(endpoints);
        self
    }

    pub fn build(self) -> EmulatorConfig {
        self.config
    }
}
