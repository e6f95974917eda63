//! Event and liveview side channels.
//!
//! The emulated bodies never push anything on these sockets, so each
//! channel accepts one peer, optionally completes the PTP/IP event
//! handshake, then idles until the peer leaves or the connection that
//! spawned it is torn down.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, VcamError};
use crate::protocol::{write_packet, FramerConfig, PacketReader, PtpIpPacket};
use crate::transport::tcp;

const MIN_TICK: Duration = Duration::from_millis(1);

/// Which side channel this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// PTP/IP event channel: InitEventRequest / InitEventAck first.
    PtpIpEvent,
    /// Fuji event socket, no handshake.
    FujiEvent,
    /// Fuji liveview socket, no handshake.
    FujiLiveview,
}

impl ChannelKind {
    fn name(self) -> &'static str {
        match self {
            Self::PtpIpEvent => "PTP/IP event",
            Self::FujiEvent => "Fuji event",
            Self::FujiLiveview => "Fuji liveview",
        }
    }
}

/// Side channels owned by one command connection.
///
/// Dropping the set without [`shutdown`](Self::shutdown) still cancels the
/// tasks; `shutdown` also waits for them.
pub struct SecondaryChannels {
    token: CancellationToken,
    tasks: Vec<JoinHandle<Result<()>>>,
}

impl SecondaryChannels {
    /// Empty set whose tasks stop when `parent` is cancelled.
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            tasks: Vec::new(),
        }
    }

    pub fn is_started(&self) -> bool {
        !self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Start one channel on `listener`.
    pub fn start(
        &mut self,
        kind: ChannelKind,
        listener: Arc<TcpListener>,
        framer: FramerConfig,
        tick: Duration,
    ) {
        self.tasks
            .push(spawn(kind, listener, framer, tick, self.token.clone()));
    }

    /// Cancel every channel and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!("Side channel task failed: {}", e);
            }
        }
    }
}

impl Drop for SecondaryChannels {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Spawn a side channel on `listener`.
pub fn spawn(
    kind: ChannelKind,
    listener: Arc<TcpListener>,
    framer: FramerConfig,
    tick: Duration,
    token: CancellationToken,
) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        let result = serve(kind, &listener, framer, tick, &token).await;
        if let Err(e) = &result {
            tracing::warn!("{} channel closed: {}", kind.name(), e);
        }
        result
    })
}

async fn serve(
    kind: ChannelKind,
    listener: &TcpListener,
    framer: FramerConfig,
    tick: Duration,
    token: &CancellationToken,
) -> Result<()> {
    tracing::info!("Waiting for {} connection", kind.name());
    let Some((stream, peer)) = tcp::accept(listener, token).await? else {
        return Ok(());
    };
    tracing::info!("{} channel accepted from {}", kind.name(), peer);

    let stream = match kind {
        ChannelKind::PtpIpEvent => event_handshake(stream, framer).await?,
        ChannelKind::FujiEvent | ChannelKind::FujiLiveview => stream,
    };

    idle(kind, stream, tick, token).await
}

/// Read InitEventRequest, answer InitEventAck.
async fn event_handshake(stream: TcpStream, framer: FramerConfig) -> Result<TcpStream> {
    let mut reader = PacketReader::new(stream, framer);
    let packet = reader.read_packet().await?;

    match PtpIpPacket::decode(&packet)? {
        PtpIpPacket::InitEventRequest { connection_number } => {
            tracing::info!("Event channel request for connection {}", connection_number);
        }
        other => {
            return Err(VcamError::Protocol(format!(
                "expected InitEventRequest on event channel, got type {}",
                other.packet_type()
            )))
        }
    }

    let mut stream = reader.into_inner();
    write_packet(&mut stream, &PtpIpPacket::InitEventAck.encode()).await?;
    tracing::debug!("Sent InitEventAck");
    Ok(stream)
}

/// Idle until cancelled or the peer hangs up. Anything the peer sends is discarded.
async fn idle(
    kind: ChannelKind,
    mut stream: TcpStream,
    tick: Duration,
    token: &CancellationToken,
) -> Result<()> {
    let mut ticker = tokio::time::interval(tick.max(MIN_TICK));
    let mut sink = [0u8; 512];

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!("{} channel cancelled", kind.name());
                return Ok(());
            }
            _ = ticker.tick() => {
                tracing::trace!("{} channel idle", kind.name());
            }
            read = stream.read(&mut sink) => match read? {
                0 => {
                    tracing::info!("{} channel peer disconnected", kind.name());
                    return Ok(());
                }
                n => tracing::debug!("Ignoring {} bytes on {} channel", n, kind.name()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn listener() -> Arc<TcpListener> {
        Arc::new(TcpListener::bind("127.0.0.1:0").await.unwrap())
    }

    #[tokio::test]
    async fn test_event_handshake_then_cancel() {
        let listener = listener().await;
        let addr = listener.local_addr().unwrap();
        let token = CancellationToken::new();
        let task = spawn(
            ChannelKind::PtpIpEvent,
            listener,
            FramerConfig::default(),
            Duration::from_millis(10),
            token.clone(),
        );

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(&PtpIpPacket::InitEventRequest { connection_number: 1 }.encode())
            .await
            .unwrap();

        let mut ack = [0u8; 8];
        client.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack, [8, 0, 0, 0, 4, 0, 0, 0]);

        token.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_wrong_first_packet() {
        let listener = listener().await;
        let addr = listener.local_addr().unwrap();
        let task = spawn(
            ChannelKind::PtpIpEvent,
            listener,
            FramerConfig::default(),
            Duration::from_millis(10),
            CancellationToken::new(),
        );

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(&PtpIpPacket::ProbeRequest.encode()).await.unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, VcamError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_fuji_channel_ends_on_disconnect() {
        let listener = listener().await;
        let addr = listener.local_addr().unwrap();
        let task = spawn(
            ChannelKind::FujiLiveview,
            listener,
            FramerConfig::default(),
            Duration::from_millis(10),
            CancellationToken::new(),
        );

        let client = TcpStream::connect(addr).await.unwrap();
        drop(client);

        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_joins_channels() {
        let parent = CancellationToken::new();
        let mut channels = SecondaryChannels::new(&parent);
        channels.start(
            ChannelKind::FujiEvent,
            listener().await,
            FramerConfig::default(),
            Duration::from_millis(10),
        );
        channels.start(
            ChannelKind::FujiLiveview,
            listener().await,
            FramerConfig::default(),
            Duration::from_millis(10),
        );

        assert_eq!(channels.len(), 2);
        channels.shutdown().await;
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_before_accept() {
        let token = CancellationToken::new();
        let task = spawn(
            ChannelKind::FujiEvent,
            listener().await,
            FramerConfig::default(),
            Duration::from_millis(10),
            token.clone(),
        );
        token.cancel();
        task.await.unwrap().unwrap();
    }
}
