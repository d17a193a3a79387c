use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::audio::segmenter::Segment;
use crate::transport::messages::{ClientMessage, ServerMessage, WireFormat};

/// Persistent duplex carrier: registers the session's metadata once,
/// then sends one `chunk_meta` text frame plus one binary frame per
/// segment. A failed send surfaces to the caller; the caller decides
/// to retry or drop, and a drop leaves a visible sequence gap.
pub struct WsUploader {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    session_id: Option<String>,
}

impl WsUploader {
    pub async fn connect(url: &str) -> Result<Self> {
        let (socket, _) = connect_async(url)
            .await
            .with_context(|| format!("failed to connect to {url}"))?;
        info!(url, "recorder websocket connected");
        Ok(Self {
            socket,
            session_id: None,
        })
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Declare the session's audio format and obtain its id.
    pub async fn register(
        &mut self,
        session_id: Option<String>,
        sample_rate: u32,
        channels: u16,
        chunk_samples: Option<usize>,
    ) -> Result<String> {
        self.send_control(&ClientMessage::Register {
            session_id,
            sample_rate,
            channels,
            // segments arrive pre-converted by the segmenter
            format: WireFormat::I16,
            chunk_samples,
        })
        .await?;

        loop {
            match self.next_message().await? {
                ServerMessage::Registered { session_id } => {
                    info!(session = %session_id, "session registered");
                    self.session_id = Some(session_id.clone());
                    return Ok(session_id);
                }
                ServerMessage::Error { message } => bail!("registration rejected: {message}"),
                other => debug!(?other, "ignoring message while registering"),
            }
        }
    }

    /// Send one segment as a chunk_meta + binary frame pair.
    pub async fn send_segment(&mut self, segment: &Segment) -> Result<()> {
        self.send_control(&ClientMessage::ChunkMeta {
            seq: segment.seq,
            valid_samples: Some(segment.pcm.len()),
        })
        .await?;

        let payload: Vec<u8> = segment.pcm.iter().flat_map(|s| s.to_le_bytes()).collect();
        self.socket
            .send(Message::Binary(payload))
            .await
            .with_context(|| format!("failed to send chunk {}", segment.seq))?;
        debug!(seq = segment.seq, samples = segment.pcm.len(), "segment sent");
        Ok(())
    }

    /// Signal the end of the recording and wait for the merged result.
    pub async fn finish(
        &mut self,
        last_seq: Option<u64>,
        target_sample_rate: Option<u32>,
    ) -> Result<ServerMessage> {
        self.send_control(&ClientMessage::Finish {
            last_seq,
            target_sample_rate,
        })
        .await?;

        loop {
            match self.next_message().await? {
                result @ ServerMessage::Result { .. } => return Ok(result),
                ServerMessage::Error { message } => bail!("finish failed: {message}"),
                ServerMessage::Processing => info!("server is assembling the recording"),
                other => debug!(?other, "ignoring message while finishing"),
            }
        }
    }

    async fn send_control(&mut self, message: &ClientMessage) -> Result<()> {
        let payload = serde_json::to_string(message).context("failed to serialize message")?;
        self.socket
            .send(Message::Text(payload))
            .await
            .context("control message send failed")
    }

    async fn next_message(&mut self) -> Result<ServerMessage> {
        while let Some(frame) = self.socket.next().await {
            match frame.context("websocket read failed")? {
                Message::Text(text) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(msg) => return Ok(msg),
                    Err(err) => warn!(error = %err, payload = %text, "unparseable server message"),
                },
                Message::Close(_) => bail!("server closed the connection"),
                _ => {}
            }
        }
        bail!("connection ended before the server replied")
    }
}
