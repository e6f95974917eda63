//! Fujifilm Wi-Fi driver.
//!
//! The camera app speaks USB bulk containers over TCP, with no PTP/IP
//! translation. It opens a command socket, sends an init packet that is
//! answered with a canned ack, and later connects to separate event and
//! liveview ports once the device asks for them (InitiateOpenCapture /
//! TerminateOpenCapture).

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use super::ptpip::{PROTOCOL_VERSION, RESPONDER_GUID};
use super::secondary::{ChannelKind, SecondaryChannels};
use crate::config::EmulatorConfig;
use crate::device::{Device, Outcome};
use crate::error::Result;
use crate::protocol::{packet_type, write_packet, BulkContainer, PacketReader};
use crate::transport::tcp;

/// Length of the canned init ack.
pub const FUJI_ACK_PACKET_SIZE: usize = 68;

/// Bytes reserved for the UTF-16 camera name in the init ack.
const NAME_FIELD_SIZE: usize = 36;

/// Canned init ack: header, connection number, GUID, a fixed-width
/// zero-padded UTF-16 name and the protocol version.
pub fn init_ack(name: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(FUJI_ACK_PACKET_SIZE);
    buf.put_u32_le(FUJI_ACK_PACKET_SIZE as u32);
    buf.put_u32_le(packet_type::INIT_COMMAND_ACK);
    buf.put_u32_le(1);
    buf.extend_from_slice(&RESPONDER_GUID);

    let mut field = [0u8; NAME_FIELD_SIZE];
    // Keep at least one NUL unit at the end.
    for (slot, unit) in field
        .chunks_exact_mut(2)
        .zip(name.encode_utf16().take(NAME_FIELD_SIZE / 2 - 1))
    {
        slot.copy_from_slice(&unit.to_le_bytes());
    }
    buf.extend_from_slice(&field);
    buf.put_u32_le(PROTOCOL_VERSION);
    buf.freeze()
}

/// Fuji server with all three listeners bound.
pub struct FujiServer {
    command: TcpListener,
    event: Arc<TcpListener>,
    liveview: Arc<TcpListener>,
    config: EmulatorConfig,
}

impl FujiServer {
    /// Bind the command, event and liveview ports.
    pub async fn bind(config: EmulatorConfig) -> Result<Self> {
        let ports = config.fuji_ports;
        let ip = config.bind_address;
        let command = tcp::bind(SocketAddr::new(ip, ports.command), "Fuji command").await?;
        let event = tcp::bind(SocketAddr::new(ip, ports.event), "Fuji event").await?;
        let liveview = tcp::bind(SocketAddr::new(ip, ports.liveview), "Fuji liveview").await?;
        Ok(Self {
            command,
            event: Arc::new(event),
            liveview: Arc::new(liveview),
            config,
        })
    }

    /// Command, event and liveview addresses.
    pub fn local_addrs(&self) -> Result<[SocketAddr; 3]> {
        Ok([
            self.command.local_addr()?,
            self.event.local_addr()?,
            self.liveview.local_addr()?,
        ])
    }

    /// Serve connections until cancelled, or just one if `serve_forever` is off.
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        loop {
            match self.serve_one(&token).await {
                Ok(false) => return Ok(()),
                Ok(true) => {}
                Err(e) if self.config.serve_forever => {
                    tracing::error!("Connection torn down: {}", e);
                }
                Err(e) => return Err(e),
            }
            if !self.config.serve_forever || token.is_cancelled() {
                return Ok(());
            }
        }
    }

    /// Accept and serve one command connection.
    ///
    /// Returns `Ok(false)` if cancelled before a client connected.
    pub async fn serve_one(&self, token: &CancellationToken) -> Result<bool> {
        let Some((stream, peer)) = tcp::accept(&self.command, token).await? else {
            return Ok(false);
        };
        tracing::info!("Connection accepted from {}", peer);

        let mut connection = Connection::new(stream, self, token);
        let result = tokio::select! {
            result = connection.run() => result,
            _ = token.cancelled() => Ok(()),
        };
        connection.secondary.shutdown().await;

        match result {
            Err(e) if e.is_disconnect() => {
                tracing::info!("Connection from {} closed", peer);
                Ok(true)
            }
            Err(e) => Err(e),
            Ok(()) => Ok(true),
        }
    }
}

struct Connection<'a> {
    server: &'a FujiServer,
    reader: PacketReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    device: Device,
    secondary: SecondaryChannels,
}

impl<'a> Connection<'a> {
    fn new(stream: TcpStream, server: &'a FujiServer, token: &CancellationToken) -> Self {
        let (read_half, writer) = stream.into_split();
        Self {
            server,
            reader: PacketReader::new(read_half, server.config.framer.clone()),
            writer,
            device: Device::new(server.config.model),
            secondary: SecondaryChannels::new(token),
        }
    }

    async fn run(&mut self) -> Result<()> {
        let init = self.reader.read_packet().await?;
        tracing::info!("Init packet ({} bytes)", init.len());
        write_packet(&mut self.writer, &init_ack(self.device.model().profile().model)).await?;

        loop {
            let mut outcome = self.process_next().await?;
            if outcome == Outcome::AwaitData {
                tracing::debug!("Reading data phase");
                outcome = self.process_next().await?;
            }

            if let Outcome::Reply { containers, delay } = outcome {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                for container in &containers {
                    write_packet(&mut self.writer, &container.encode()).await?;
                }
            }

            if self.device.take_secondary_request() && !self.secondary.is_started() {
                self.open_remote_ports();
            }
        }
    }

    async fn process_next(&mut self) -> Result<Outcome> {
        let packet = self.reader.read_packet().await?;
        let container = BulkContainer::decode(&packet)?;
        tracing::debug!(
            "<- {:?} {:#06x} tid={}",
            container.kind,
            container.code,
            container.transaction_id
        );
        self.device.process(container)
    }

    fn open_remote_ports(&mut self) {
        tracing::info!("Opening event and liveview ports");
        let config = &self.server.config;
        for (kind, listener) in [
            (ChannelKind::FujiEvent, &self.server.event),
            (ChannelKind::FujiLiveview, &self.server.liveview),
        ] {
            self.secondary.start(
                kind,
                Arc::clone(listener),
                config.framer.clone(),
                config.secondary_idle_tick(),
            );
        }
    }
}
