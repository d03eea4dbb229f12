//! Per-connection socket loop: frames in, published payloads out.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::channels::{self, Channel, Mode, MAIN_CHANNEL};
use crate::transport::Transport;

use super::AppState;

const OUTBOUND_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ClientFrame {
    Subscribe {
        channel: String,
        #[serde(default)]
        data: Value,
    },
    Unsubscribe {
        channel: String,
    },
    Message {
        #[serde(default)]
        data: Value,
    },
    Rpc {
        #[serde(default)]
        id: u64,
        method: String,
        #[serde(default)]
        data: Value,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ServerFrame {
    Subscribed {
        channel: String,
    },
    SubscribeError {
        channel: String,
        reason: String,
    },
    RpcResult {
        id: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<RpcFailure>,
    },
}

#[derive(Debug, Serialize)]
struct RpcFailure {
    code: u16,
    message: String,
}

pub(super) async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user: String) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Bytes>(OUTBOUND_QUEUE_CAPACITY);
    state.hub.register(&user, tx);
    tracing::info!(%user, "websocket connected");

    let send_task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            let text = String::from_utf8_lossy(&payload).into_owned();
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = stream.next().await {
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match serde_json::from_str::<ClientFrame>(text.as_str()) {
            Ok(frame) => dispatch(&state, &user, frame).await,
            Err(err) => tracing::debug!(%user, %err, "dropping unparseable frame"),
        }
    }

    // Connection gone: drop the subscriptions, then let the gateway observe
    // each leave (an owner leave closes their room).
    for channel in state.hub.deregister(&user) {
        state.gateway.handle_unsubscribe(&channel, &user).await;
    }
    send_task.abort();
    tracing::info!(%user, "websocket disconnected");
}

async fn dispatch(state: &Arc<AppState>, user: &str, frame: ClientFrame) {
    match frame {
        ClientFrame::Subscribe { channel, data } => {
            let payload = serde_json::to_vec(&data).unwrap_or_default();
            // Subscribe transport-side first so the join announcement also
            // reaches the subscriber; rolled back if the gateway refuses.
            state.hub.subscribe(user, &channel);
            let reply = match state.gateway.handle_subscribe(&channel, user, &payload).await {
                Ok(()) => ServerFrame::Subscribed { channel },
                Err(err) => {
                    state.hub.unsubscribe(user, &channel);
                    ServerFrame::SubscribeError {
                        channel,
                        reason: err.to_string(),
                    }
                }
            };
            reply_to(state, user, &reply);
        }

        ClientFrame::Unsubscribe { channel } => {
            state.hub.unsubscribe(user, &channel);
            state.gateway.handle_unsubscribe(&channel, user).await;
        }

        ClientFrame::Message { data } => {
            let payload = serde_json::to_vec(&data).unwrap_or_default();
            let channel = play_channel_of(state, user);
            state.gateway.handle_message(&channel, user, &payload).await;
        }

        ClientFrame::Rpc { id, method, data } => {
            let payload = serde_json::to_vec(&data).unwrap_or_default();
            let reply = match state.gateway.handle_rpc(&method, &payload, user).await {
                Ok(data) => ServerFrame::RpcResult {
                    id,
                    data: Some(data),
                    error: None,
                },
                Err(err) => ServerFrame::RpcResult {
                    id,
                    data: None,
                    error: Some(RpcFailure {
                        code: err.code,
                        message: err.message,
                    }),
                },
            };
            reply_to(state, user, &reply);
        }
    }
}

/// The user's current play channel, or `main` when they are in none.
fn play_channel_of(state: &Arc<AppState>, user: &str) -> String {
    state
        .hub
        .channels_of(user)
        .into_iter()
        .find(|channel| {
            matches!(
                channels::parse(channel),
                Some(Channel::Room {
                    mode: Mode::Play,
                    ..
                })
            )
        })
        .unwrap_or_else(|| MAIN_CHANNEL.to_string())
}

fn reply_to(state: &Arc<AppState>, user: &str, frame: &ServerFrame) {
    if let Ok(encoded) = serde_json::to_vec(frame) {
        state.hub.send_to_user(user, Bytes::from(encoded));
    }
}
