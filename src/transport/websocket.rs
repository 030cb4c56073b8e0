//! Signaling WebSocket connection and frame handling

use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::meeting::SessionCredentials;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Frames sent by the client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub(crate) enum ClientFrame<'a> {
    #[serde(rename_all = "camelCase")]
    Join {
        channel: &'a str,
        token: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        uid: Option<&'a str>,
    },
    Leave {
        channel: &'a str,
    },
}

/// Frames the signaling server may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub(crate) enum ServerFrame {
    #[serde(rename_all = "camelCase")]
    Joined {
        session_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    /// Participant and media-state updates; not part of the handshake.
    #[serde(other)]
    Event,
}

/// Parse a text frame, ignoring anything that is not a known JSON frame.
pub(crate) fn parse_server_frame(text: &str) -> Option<ServerFrame> {
    serde_json::from_str(text).ok()
}

/// Rewrite http(s) endpoints to their ws(s) equivalents.
pub(crate) fn ws_url(signaling_url: &str) -> Result<url::Url> {
    let mut url = url::Url::parse(signaling_url)
        .with_context(|| format!("Invalid signaling URL: {}", signaling_url))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => bail!("Unsupported signaling scheme: {}", other),
    };
    if url.set_scheme(scheme).is_err() {
        bail!("Cannot use scheme {} for {}", scheme, signaling_url);
    }
    Ok(url)
}

pub struct SignalingSocket {
    stream: WsStream,
    channel: String,
    session_id: Option<String>,
}

impl SignalingSocket {
    /// Connect to the signaling endpoint named in the credentials.
    pub async fn connect(credentials: &SessionCredentials) -> Result<Self> {
        let url = ws_url(&credentials.signaling_url)?;
        tracing::info!("Connecting signaling WebSocket to {}", url);

        let (stream, response) = connect_async(url.as_str())
            .await
            .context("WebSocket connection failed")?;

        tracing::info!("WebSocket connected (status={})", response.status());

        Ok(Self {
            stream,
            channel: credentials.channel.clone(),
            session_id: None,
        })
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    async fn send_frame(&mut self, frame: &ClientFrame<'_>) -> Result<()> {
        let text = serde_json::to_string(frame).context("Failed to encode signaling frame")?;
        tracing::debug!("WS send: {}", text);
        self.stream
            .send(Message::Text(text))
            .await
            .context("Failed to send WebSocket message")
    }

    /// Send the join frame and wait for the server's acknowledgment.
    pub async fn handshake(&mut self, credentials: &SessionCredentials) -> Result<()> {
        self.send_frame(&ClientFrame::Join {
            channel: &credentials.channel,
            token: &credentials.token,
            uid: credentials.uid.as_deref(),
        })
        .await?;

        loop {
            let text = match self.recv_text().await? {
                Some(text) => text,
                None => bail!("Signaling server closed the connection before acknowledging"),
            };
            match parse_server_frame(&text) {
                Some(ServerFrame::Joined { session_id }) => {
                    tracing::info!("Signaling acknowledged (session {})", session_id);
                    self.session_id = Some(session_id);
                    return Ok(());
                }
                Some(ServerFrame::Error { message }) => {
                    bail!(
                        "Signaling rejected join: {}",
                        message.as_deref().unwrap_or("no reason given")
                    );
                }
                Some(ServerFrame::Event) | None => {
                    tracing::debug!("Ignoring pre-ack frame: {}", text);
                }
            }
        }
    }

    /// Receive the next text frame, answering pings along the way.
    pub async fn recv_text(&mut self) -> Result<Option<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!("WS recv: {}", text);
                    return Ok(Some(text));
                }
                Some(Ok(Message::Ping(data))) => {
                    self.stream
                        .send(Message::Pong(data))
                        .await
                        .context("Failed to send pong")?;
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!("WebSocket closed: {:?}", frame);
                    return Ok(None);
                }
                Some(Ok(other)) => {
                    tracing::debug!("WS frame (ignored): {:?}", other);
                }
                Some(Err(e)) => {
                    return Err(e).context("WebSocket receive error");
                }
                None => {
                    return Ok(None);
                }
            }
        }
    }

    /// Tell the server we are leaving and close the socket.
    pub async fn leave(mut self) -> Result<()> {
        let channel = self.channel.clone();
        self.send_frame(&ClientFrame::Leave { channel: &channel })
            .await?;
        self.stream
            .close(None)
            .await
            .context("Failed to close WebSocket")
    }
}
