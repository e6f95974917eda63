//! TCP listener helpers shared by the PTP/IP and Fuji drivers.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Bind a listener, logging the bound address.
pub async fn bind(addr: SocketAddr, role: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening for {} connections on {}", role, listener.local_addr()?);
    Ok(listener)
}

/// Accept one connection, or `None` once `token` is cancelled.
///
/// Accepted streams have Nagle disabled; PTP traffic is small
/// request/response packets.
pub async fn accept(
    listener: &TcpListener,
    token: &CancellationToken,
) -> Result<Option<(TcpStream, SocketAddr)>> {
    tokio::select! {
        _ = token.cancelled() => Ok(None),
        accepted = listener.accept() => {
            let (stream, peer) = accepted?;
            stream.set_nodelay(true)?;
            Ok(Some((stream, peer)))
        }
    }
}
