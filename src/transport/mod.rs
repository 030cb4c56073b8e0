//! Media session transport.
//!
//! The media itself is carried by the provider; this module only performs
//! the signaling handshake that proves the credentials and yields a live
//! session handle.

mod websocket;

use anyhow::Result;
use async_trait::async_trait;

use crate::meeting::{MediaTransport, SessionCredentials};

pub use websocket::SignalingSocket;

/// Attaches to the media provider over its signaling WebSocket.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalingTransport;

#[async_trait]
impl MediaTransport for SignalingTransport {
    type Session = SignalingSocket;

    async fn attach(&self, credentials: &SessionCredentials) -> Result<SignalingSocket> {
        let mut socket = SignalingSocket::connect(credentials).await?;
        socket.handshake(credentials).await?;
        Ok(socket)
    }
}

/// Hold an attached session open until Ctrl-C or the server hangs up.
pub async fn run_until_interrupted(mut socket: SignalingSocket) -> Result<()> {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Leaving meeting...");
                return socket.leave().await;
            }
            frame = socket.recv_text() => {
                match frame? {
                    Some(text) => tracing::debug!("Signaling event: {}", text),
                    None => {
                        println!("Meeting session ended by the server.");
                        return Ok(());
                    }
                }
            }
        }
    }
}
