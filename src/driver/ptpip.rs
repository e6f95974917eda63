//! Generic PTP/IP driver.
//!
//! One command connection at a time on the ISO port. Per connection:
//!
//! ```text
//! AwaitingInit ──InitCommandRequest──▶ CommandLoop ──error/EOF──▶ Closed
//! ```
//!
//! Once the init ack is out, an event-channel task accepts the client's
//! second connection on the same listener. Command packets are bridged to
//! bulk containers for the device and replies bridged back.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use super::secondary::{ChannelKind, SecondaryChannels};
use crate::codec::PtpIpBridge;
use crate::config::EmulatorConfig;
use crate::device::{Device, Outcome};
use crate::error::{Result, VcamError};
use crate::protocol::{
    data_phase, write_packet, BulkContainer, InitIdentity, PacketReader, PtpIpPacket, GUID_SIZE,
};
use crate::transport::tcp;

/// Responder GUID reported in the init ack.
pub const RESPONDER_GUID: [u8; GUID_SIZE] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0xBB, 0xC1, 0x85, 0x9F, 0xAB,
];

/// Responder friendly name reported in the init ack.
pub const RESPONDER_NAME: &str = "EOST6{";

/// PTP/IP protocol version 1.0.
pub const PROTOCOL_VERSION: u32 = 0x0001_0000;

/// The canned InitCommandAck sent to every initiator.
pub fn init_ack() -> PtpIpPacket {
    PtpIpPacket::InitCommandAck {
        connection_number: 1,
        identity: InitIdentity {
            guid: RESPONDER_GUID,
            name: RESPONDER_NAME.to_string(),
            version: PROTOCOL_VERSION,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingInit,
    CommandLoop,
}

/// PTP/IP server bound to its listener.
pub struct PtpIpServer {
    listener: Arc<TcpListener>,
    config: EmulatorConfig,
}

impl PtpIpServer {
    /// Bind the command listener from `config`.
    pub async fn bind(config: EmulatorConfig) -> Result<Self> {
        let listener = tcp::bind(config.command_addr(), "PTP/IP").await?;
        Ok(Self {
            listener: Arc::new(listener),
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
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
        let Some((stream, peer)) = tcp::accept(&self.listener, token).await? else {
            return Ok(false);
        };
        tracing::info!("Connection accepted from {}", peer);

        let mut connection = Connection::new(stream, self, token);
        let result = tokio::select! {
            result = connection.run() => result,
            _ = token.cancelled() => {
                tracing::info!("Shutting down connection from {}", peer);
                Ok(())
            }
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
    server: &'a PtpIpServer,
    reader: PacketReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    device: Device,
    state: State,
    secondary: SecondaryChannels,
}

impl<'a> Connection<'a> {
    fn new(stream: TcpStream, server: &'a PtpIpServer, token: &CancellationToken) -> Self {
        let (read_half, writer) = stream.into_split();
        Self {
            server,
            reader: PacketReader::new(read_half, server.config.framer.clone()),
            writer,
            device: Device::new(server.config.model),
            state: State::AwaitingInit,
            secondary: SecondaryChannels::new(token),
        }
    }

    async fn run(&mut self) -> Result<()> {
        loop {
            let packet = self.read().await?;
            match self.state {
                State::AwaitingInit => self.init(packet).await?,
                State::CommandLoop => self.command(packet).await?,
            }
        }
    }

    async fn read(&mut self) -> Result<PtpIpPacket> {
        let bytes = self.reader.read_packet().await?;
        let packet = PtpIpPacket::decode(&bytes)?;
        tracing::debug!("<- type {} ({} bytes)", packet.packet_type(), bytes.len());
        Ok(packet)
    }

    async fn send(&mut self, packet: &PtpIpPacket) -> Result<()> {
        let bytes = packet.encode();
        tracing::debug!("-> type {} ({} bytes)", packet.packet_type(), bytes.len());
        write_packet(&mut self.writer, &bytes).await
    }

    async fn init(&mut self, packet: PtpIpPacket) -> Result<()> {
        let PtpIpPacket::InitCommandRequest(identity) = packet else {
            return Err(VcamError::Protocol(format!(
                "expected InitCommandRequest, got type {}",
                packet.packet_type()
            )));
        };
        tracing::info!(
            "Init from '{}' (version {:#010x})",
            identity.name,
            identity.version
        );

        self.send(&init_ack()).await?;
        self.state = State::CommandLoop;

        let config = &self.server.config;
        self.secondary.start(
            ChannelKind::PtpIpEvent,
            Arc::clone(&self.server.listener),
            config.framer.clone(),
            config.secondary_idle_tick(),
        );
        Ok(())
    }

    async fn command(&mut self, packet: PtpIpPacket) -> Result<()> {
        match packet {
            PtpIpPacket::CommandRequest {
                data_phase: phase, ..
            } => {
                let container = PtpIpBridge::ptpip_to_bulk(std::slice::from_ref(&packet), 0)?;
                let code = container.code;

                let mut outcome = self.device.process(container)?;
                if outcome == Outcome::AwaitData {
                    let packets = self.read_data_phase().await?;
                    let data = PtpIpBridge::ptpip_to_bulk(&packets, code)?;
                    outcome = self.device.process(data)?;
                } else if phase == data_phase::OUT {
                    let packets = self.read_data_phase().await?;
                    tracing::warn!(
                        "Discarded {} data packets for {:#06x}, which takes no data",
                        packets.len(),
                        code
                    );
                }

                if let Outcome::Reply { containers, delay } = outcome {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    self.reply(&containers).await?;
                }
                Ok(())
            }
            PtpIpPacket::ProbeRequest => self.send(&PtpIpPacket::ProbeResponse).await,
            PtpIpPacket::Cancel { transaction_id } => {
                tracing::info!("Initiator cancelled transaction {}", transaction_id);
                Ok(())
            }
            other => Err(VcamError::Protocol(format!(
                "unexpected packet type {} in command loop",
                other.packet_type()
            ))),
        }
    }

    /// StartData, any Data, then EndData.
    async fn read_data_phase(&mut self) -> Result<Vec<PtpIpPacket>> {
        let mut packets = Vec::new();
        loop {
            let packet = self.read().await?;
            let done = matches!(packet, PtpIpPacket::EndData { .. });
            let expected = match &packet {
                PtpIpPacket::StartData { .. } => packets.is_empty(),
                PtpIpPacket::Data { .. } | PtpIpPacket::EndData { .. } => !packets.is_empty(),
                _ => false,
            };
            if !expected {
                return Err(VcamError::Protocol(format!(
                    "unexpected packet type {} in data phase",
                    packet.packet_type()
                )));
            }
            packets.push(packet);
            if done {
                return Ok(packets);
            }
        }
    }

    async fn reply(&mut self, containers: &[BulkContainer]) -> Result<()> {
        for container in containers {
            for packet in PtpIpBridge::bulk_to_ptpip(container)? {
                self.send(&packet).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_ack_bytes() {
        let expected: [u8; 46] = [
            0x2e, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0xbb, 0xc1, 0x85, 0x9f, 0xab,
            0x45, 0x00, 0x4f, 0x00, 0x53, 0x00, 0x54, 0x00, 0x36, 0x00, 0x7b, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x01, 0x00,
        ];
        assert_eq!(init_ack().encode().as_ref(), &expected);
    }
}
