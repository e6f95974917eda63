//! USB bulk transport.
//!
//! The host writes bulk containers to bulk OUT and reads replies from bulk
//! IN. There is no handshake and no translation: containers go straight to
//! the device. [`BulkPipe`] holds the reassembly state so both the gadget
//! loop here and the in-process host surface share it.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::device::{Device, Outcome};
use crate::error::{Result, VcamError};
use crate::protocol::{
    write_packet, BulkContainer, PacketBuffer, BULK_HEADER_SIZE, DEFAULT_MAX_PACKET_SIZE,
};

/// Bulk OUT transfers are at most this large on high-speed links.
const BULK_READ_SIZE: usize = 512;

/// Encoded containers ready for bulk IN, to be sent after `delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReply {
    pub delay: Duration,
    /// One entry per container, data before response.
    pub transfers: Vec<Bytes>,
}

/// Reassembles bulk OUT bytes into containers and runs them on the device.
pub struct BulkPipe {
    device: Device,
    inbound: PacketBuffer,
}

impl BulkPipe {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            inbound: PacketBuffer::with_limits(BULK_HEADER_SIZE as u32, DEFAULT_MAX_PACKET_SIZE),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut Device {
        &mut self.device
    }

    /// Feed one bulk OUT transfer. Returns the replies it completed, in order.
    ///
    /// # Errors
    ///
    /// Framing, decode and sequencing errors. The host side is out of step
    /// afterwards; callers should [`reset`](Self::reset) or stop.
    pub fn feed(&mut self, transfer: &[u8]) -> Result<Vec<PendingReply>> {
        let mut replies = Vec::new();
        for packet in self.inbound.push(transfer)? {
            let container = BulkContainer::decode(&packet)?;
            tracing::debug!(
                "bulk OUT {:?} code={:#06x} tid={} ({} bytes)",
                container.kind,
                container.code,
                container.transaction_id,
                packet.len()
            );

            if let Outcome::Reply { containers, delay } = self.device.process(container)? {
                replies.push(PendingReply {
                    delay,
                    transfers: containers.iter().map(BulkContainer::encode).collect(),
                });
            }
        }
        Ok(replies)
    }

    /// Drop any partially received container.
    pub fn reset(&mut self) {
        self.inbound.clear();
    }
}

/// Serve the device over a pair of bulk endpoints until EOF or cancellation.
///
/// Each container is written as its own transfer.
pub async fn serve_bulk<R, W>(
    pipe: &mut BulkPipe,
    mut bulk_out: R,
    mut bulk_in: W,
    token: &CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BULK_READ_SIZE];

    loop {
        let n = tokio::select! {
            _ = token.cancelled() => {
                tracing::info!("USB bulk loop cancelled");
                return Ok(());
            }
            read = bulk_out.read(&mut buf) => read?,
        };
        if n == 0 {
            tracing::info!("Bulk OUT closed");
            return Ok(());
        }

        for reply in pipe.feed(&buf[..n])? {
            if !reply.delay.is_zero() {
                tokio::time::sleep(reply.delay).await;
            }
            for transfer in &reply.transfers {
                write_packet(&mut bulk_in, transfer).await?;
            }
        }
    }
}

/// Open the configured gadget endpoints and serve `device` on them.
pub async fn run_gadget(
    device: Device,
    endpoints: &crate::config::UsbEndpoints,
    token: CancellationToken,
) -> Result<()> {
    let files = crate::transport::GadgetEndpoints::open(endpoints).await?;
    let mut pipe = BulkPipe::new(device);
    match serve_bulk(&mut pipe, files.bulk_out, files.bulk_in, &token).await {
        Err(VcamError::Io(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
            tracing::info!("Host went away: {}", e);
            Ok(())
        }
        other => other,
    }
}
