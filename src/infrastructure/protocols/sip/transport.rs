//! SIP transport layer - UDP

use super::message::{SipError, SipMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Incoming SIP message with source information
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub message: SipMessage,
    pub source: SocketAddr,
}

/// UDP transport
#[derive(Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind and start receiving; parsed messages are delivered on the returned channel
    pub async fn bind(
        bind_addr: SocketAddr,
    ) -> Result<(Self, mpsc::Receiver<IncomingMessage>), SipError> {
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| SipError::TransportError(format!("Failed to bind UDP socket: {}", e)))?;
        let socket = Arc::new(socket);

        if let Ok(local) = socket.local_addr() {
            info!("UDP transport listening on {}", local);
        }

        let (tx, rx) = mpsc::channel(1000);
        tokio::spawn(Self::receive_loop(socket.clone(), tx));

        Ok((Self { socket }, rx))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SipError> {
        self.socket
            .local_addr()
            .map_err(|e| SipError::TransportError(e.to_string()))
    }

    pub async fn send_to(&self, data: &str, destination: SocketAddr) -> Result<(), SipError> {
        debug!("Sending {} bytes to {} via UDP", data.len(), destination);

        self.socket
            .send_to(data.as_bytes(), destination)
            .await
            .map_err(|e| SipError::TransportError(format!("Failed to send UDP packet: {}", e)))?;

        Ok(())
    }

    async fn receive_loop(socket: Arc<UdpSocket>, tx: mpsc::Sender<IncomingMessage>) {
        let mut buf = vec![0u8; 65535];

        loop {
            match socket.recv_from(&mut buf).await {
                Ok((size, source)) => {
                    // Keep-alive CRLFs
                    if buf[..size].iter().all(|b| b.is_ascii_whitespace()) {
                        continue;
                    }

                    debug!("Received {} bytes from {} via UDP", size, source);

                    match SipMessage::parse(&buf[..size]) {
                        Ok(message) => {
                            if tx.send(IncomingMessage { message, source }).await.is_err() {
                                debug!("UDP receiver dropped, stopping receive loop");
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Failed to parse SIP message from {}: {}", source, e);
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to receive UDP packet: {}", e);
                    break;
                }
            }
        }
    }
}
