//! WebSocket transport over tokio TCP.
//!
//! The listener accepts raw TCP connections; the WebSocket handshake runs in
//! the per-connection task so one slow client cannot stall the accept loop.
//! Every frame the relay exchanges is a JSON text frame.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;

use crate::error::ServerError;

/// An upgraded WebSocket connection.
pub type WsConnection = WebSocketStream<TcpStream>;

/// WebSocket listener.
pub struct WsTransport {
    listener: TcpListener,
}

impl WsTransport {
    /// Bind a TCP listener on `address` (e.g. `"0.0.0.0:5000"`).
    pub async fn bind(address: &str) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to bind {addr}: {e}")))?;

        tracing::info!("WebSocket transport bound to {}", addr);

        Ok(Self { listener })
    }

    /// Accept the next TCP connection.
    ///
    /// The returned connection has not completed the WebSocket handshake yet.
    pub async fn accept(&self) -> Result<PendingConnection, ServerError> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| ServerError::Transport(format!("accept failed: {e}")))?;

        // Channel updates are small and latency-sensitive.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("set_nodelay failed for {}: {}", peer, e);
        }

        Ok(PendingConnection { stream, peer })
    }

    /// Local address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}

/// A TCP connection awaiting its WebSocket handshake.
#[derive(Debug)]
pub struct PendingConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl PendingConnection {
    /// Remote peer address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Run the server side of the WebSocket handshake.
    pub async fn upgrade(self) -> Result<WsConnection, ServerError> {
        let peer = self.peer;
        tokio_tungstenite::accept_async(self.stream)
            .await
            .map_err(|e| ServerError::Transport(format!("handshake with {peer} failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transport_binds_ephemeral_port() {
        let transport = WsTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();
        assert_ne!(addr.port(), 0, "Should have assigned a port");
    }

    #[tokio::test]
    async fn transport_rejects_invalid_address() {
        let result = WsTransport::bind("invalid:address:format").await;
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn transport_upgrades_websocket_client() {
        let transport = WsTransport::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", transport.local_addr().unwrap());

        let client = tokio::spawn(async move { tokio_tungstenite::connect_async(url).await });
        let pending = transport.accept().await.unwrap();
        assert!(pending.remote_addr().ip().is_loopback());

        assert!(pending.upgrade().await.is_ok());
        assert!(client.await.unwrap().is_ok());
    }
}
