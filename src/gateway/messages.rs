//! Inbound player and owner messages.

use serde::Deserialize;
use serde_json::Value;

use crate::channels::{self, Channel, Mode};
use crate::events;
use crate::room::{PlayerInput, RoomConfig, SharedRoom};

use super::Gateway;

#[derive(Debug, Deserialize)]
struct InboundMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Value,
}

impl Gateway {
    /// A message arrived on a channel. On a play channel it is either one of
    /// the owner verbs (`room_config_changed`, `kick`) or a player input for
    /// the current step. Anywhere else, an owner's message is the panic
    /// button that stops their room. Malformed messages are dropped.
    pub async fn handle_message(&self, channel: &str, user: &str, payload: &[u8]) {
        let Ok(message) = serde_json::from_slice::<InboundMessage>(payload) else {
            tracing::debug!(%user, %channel, "dropping malformed message");
            return;
        };

        match channels::parse(channel) {
            Some(Channel::Room {
                mode: Mode::Play,
                code,
            }) => {
                let Some(room) = self.manager.room(&code).await else {
                    return;
                };
                match message.kind.as_str() {
                    "room_config_changed" => {
                        self.apply_config_change(&room, user, &message.content).await;
                    }
                    "kick" => self.kick(&room, &code, user, &message.content).await,
                    _ => self.buffer_input(&room, user, message).await,
                }
            }
            _ => {
                if let Some(room) = self.manager.by_owner(user).await {
                    room.write().await.stop();
                    tracing::info!(%user, "room stopped by out-of-room owner message");
                }
            }
        }
    }

    async fn apply_config_change(&self, room: &SharedRoom, user: &str, content: &Value) {
        let Some(config) = content
            .get("config")
            .and_then(|config| serde_json::from_value::<RoomConfig>(config.clone()).ok())
        else {
            tracing::debug!(%user, "dropping malformed config change");
            return;
        };

        let mut room = room.write().await;
        if !room.is_owner(user) {
            return;
        }
        room.set_config(config);
        tracing::info!(code = %room.code(), "room reconfigured");
    }

    async fn kick(&self, room: &SharedRoom, code: &str, user: &str, content: &Value) {
        let Some(target) = content.get("userID").and_then(Value::as_str) else {
            return;
        };

        {
            let mut room = room.write().await;
            if !room.is_owner(user) {
                return;
            }
            room.left(target);
        }

        self.broadcast(code, events::remove_nickname(target));
        self.transport.unsubscribe(target, &channels::play(code));
        tracing::info!(%target, %code, "player kicked");
    }

    async fn buffer_input(&self, room: &SharedRoom, user: &str, message: InboundMessage) {
        let step = message
            .content
            .get("step")
            .and_then(Value::as_i64)
            .unwrap_or_default();
        let Some(text) = message.content.get("message").and_then(Value::as_str) else {
            tracing::debug!(%user, "dropping input without a message");
            return;
        };

        let input = PlayerInput {
            user_id: user.to_string(),
            kind: message.kind,
            step,
            message: text.to_string(),
        };
        room.write().await.add_input(user, input);
    }
}
