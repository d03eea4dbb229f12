//! Subscription lifecycle: joins, leaves, and owner teardown.

use thiserror::Error;

use crate::channels::{self, Channel, Mode};
use crate::events;

use super::Gateway;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscribeError {
    #[error("unknown channel")]
    UnknownChannel,
    #[error("permission denied")]
    PermissionDenied,
}

impl Gateway {
    /// A user subscribed to a channel. For room channels this joins the room
    /// and announces the (possibly disambiguated) nickname; players also
    /// receive the current nickname snapshot and the room's creation time.
    pub async fn handle_subscribe(
        &self,
        channel: &str,
        user: &str,
        payload: &[u8],
    ) -> Result<(), SubscribeError> {
        let parsed = channels::parse(channel).ok_or(SubscribeError::UnknownChannel)?;
        let Channel::Room { mode, code } = parsed else {
            tracing::debug!(%user, "subscribed to main");
            return Ok(());
        };

        let room = self
            .manager
            .room(&code)
            .await
            .ok_or(SubscribeError::UnknownChannel)?;

        let requested: String = serde_json::from_slice(payload).unwrap_or_default();

        let nickname = {
            let mut room = room.write().await;
            if !room.can_join(user, mode == Mode::Watch) {
                return Err(SubscribeError::PermissionDenied);
            }

            let nickname = room.joined(user, &requested);
            if mode == Mode::Play {
                self.transport
                    .send_to_user(user, events::nicknames(room.owner(), room.nicknames()));
                self.transport.send_to_user(
                    user,
                    events::room_created_at(room.created_at().timestamp()),
                );
            }
            nickname
        };

        self.broadcast(&code, events::new_nickname(user, &nickname));

        // A subscriber keeps at most one room; stale room subscriptions are
        // dropped transport-side.
        for prior in self.transport.channels_of(user) {
            if channels::is_room(&prior) && prior != channel {
                self.transport.unsubscribe(user, &prior);
            }
        }

        tracing::info!(%user, %channel, "subscribed");
        Ok(())
    }

    /// A user left a channel. The owner leaving closes the room for
    /// everyone; anyone else is simply removed and announced.
    pub async fn handle_unsubscribe(&self, channel: &str, user: &str) {
        let Some(Channel::Room { code, .. }) = channels::parse(channel) else {
            return;
        };
        let Some(room) = self.manager.room(&code).await else {
            return;
        };

        let is_owner = room.read().await.is_owner(user);
        if is_owner {
            self.manager.close(&code).await;
            self.broadcast(&code, events::unsubscribe());
            tracing::info!(%code, "room closed, owner left");
        } else {
            room.write().await.left(user);
            self.broadcast(&code, events::remove_nickname(user));
            tracing::info!(%user, %channel, "unsubscribed");
        }
    }
}
