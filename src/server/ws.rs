// Persistent duplex carrier: the client declares its format once with a
// register message, then streams chunk_meta + binary frame pairs and
// ends with finish. Assembly runs in a background task and the result
// is pushed back best-effort; the socket may already be gone.

use std::sync::Arc;

use anyhow::Result;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::finish_session;
use super::registry::{AudioFormat, Session};
use super::state::AppState;
use crate::transport::messages::{ClientMessage, ServerMessage};

pub async fn ws_handler(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| async move {
        if let Err(err) = handle_socket(state, socket).await {
            error!(error = %err, "recorder websocket failed");
        }
    })
}

async fn handle_socket(state: AppState, socket: WebSocket) -> Result<()> {
    let (mut sender, mut receiver) = socket.split();

    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(64);
    let send_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let payload = match serde_json::to_string(&msg) {
                Ok(payload) => payload,
                Err(err) => {
                    error!(error = %err, "failed to serialize server message");
                    continue;
                }
            };
            if sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    let mut session: Option<Arc<Session>> = None;
    // seq declared by the most recent chunk_meta, consumed by the next
    // binary frame
    let mut pending_seq: Option<u64> = None;

    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => {
                let msg = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => msg,
                    Err(err) => {
                        warn!(error = %err, "invalid control message");
                        send(&out_tx, ServerMessage::Error {
                            message: format!("invalid control message: {err}"),
                        })
                        .await;
                        continue;
                    }
                };
                match msg {
                    ClientMessage::Register {
                        session_id,
                        sample_rate,
                        channels,
                        format,
                        chunk_samples,
                    } => {
                        if sample_rate == 0 || channels == 0 {
                            send(&out_tx, ServerMessage::Error {
                                message: "sample rate and channel count must be positive"
                                    .to_string(),
                            })
                            .await;
                            continue;
                        }
                        let declared = AudioFormat {
                            sample_rate,
                            channels,
                            format,
                            chunk_samples,
                        };
                        match state.sessions.register(session_id, declared).await {
                            Ok(registered) => {
                                info!(session = %registered.id, sample_rate, channels, "websocket session registered");
                                send(&out_tx, ServerMessage::Registered {
                                    session_id: registered.id.clone(),
                                })
                                .await;
                                session = Some(registered);
                            }
                            Err(err) => {
                                warn!(error = %err, "registration rejected");
                                send(&out_tx, ServerMessage::Error {
                                    message: err.to_string(),
                                })
                                .await;
                            }
                        }
                    }
                    ClientMessage::ChunkMeta { seq, .. } => {
                        if session.is_none() {
                            send(&out_tx, ServerMessage::Error {
                                message: "no active session".to_string(),
                            })
                            .await;
                            continue;
                        }
                        if let Some(stale) = pending_seq.replace(seq) {
                            warn!(seq = stale, "chunk_meta arrived without its binary frame");
                        }
                    }
                    ClientMessage::Finish {
                        last_seq,
                        target_sample_rate,
                    } => {
                        let Some(active) = session.clone() else {
                            send(&out_tx, ServerMessage::Error {
                                message: "no active session to finish".to_string(),
                            })
                            .await;
                            continue;
                        };
                        send(&out_tx, ServerMessage::Processing).await;

                        let task_state = state.clone();
                        let task_out = out_tx.clone();
                        tokio::spawn(async move {
                            match finish_session(&task_state, &active, last_seq, target_sample_rate)
                                .await
                            {
                                Ok((merged, _)) => {
                                    send(&task_out, ServerMessage::Result {
                                        session_id: merged.session_id,
                                        url: merged.url,
                                        total_samples: merged.total_samples,
                                        sample_rate: merged.sample_rate,
                                        channels: merged.channels,
                                        transcript: merged.transcript,
                                    })
                                    .await;
                                }
                                Err(err) => {
                                    warn!(session = %active.id, error = %err, "finish failed");
                                    send(&task_out, ServerMessage::Error {
                                        message: err.to_string(),
                                    })
                                    .await;
                                }
                            }
                        });
                    }
                    ClientMessage::Ping => send(&out_tx, ServerMessage::Pong).await,
                }
            }
            Message::Binary(data) => {
                let Some(active) = &session else {
                    warn!("binary frame before register, ignored");
                    continue;
                };
                let Some(seq) = pending_seq.take() else {
                    warn!(session = %active.id, "binary frame without chunk_meta, ignored");
                    continue;
                };
                let format = active.format();
                match state.store.put(&active.id, seq, format.format, &data) {
                    Ok(_) => {
                        active.note_chunk(seq);
                        send(&out_tx, ServerMessage::Saved { seq }).await;
                    }
                    Err(err) => {
                        // drop the chunk, keep the session going
                        warn!(session = %active.id, seq, error = %err, "chunk rejected");
                        send(&out_tx, ServerMessage::Error {
                            message: format!("chunk {seq} rejected: {err}"),
                        })
                        .await;
                    }
                }
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    // the connection owns its session: tear it down on close, leaving
    // any unmerged chunks to the orphan collector
    if let Some(active) = session {
        if active.merged().is_none() && state.store.chunk_count(&active.id) > 0 {
            info!(session = %active.id, "connection closed with unmerged chunks");
        }
        state.sessions.remove(&active.id).await;
    }

    send_task.abort();
    Ok(())
}

/// Best-effort push: the socket may already be gone.
async fn send(out_tx: &mpsc::Sender<ServerMessage>, message: ServerMessage) {
    let _ = out_tx.send(message).await;
}
