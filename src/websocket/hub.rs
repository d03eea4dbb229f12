//! In-memory pub/sub hub backing the WebSocket front end.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::transport::Transport;
use crate::UserId;

#[derive(Default)]
struct HubState {
    senders: HashMap<UserId, mpsc::Sender<Bytes>>,
    subscribers: HashMap<String, HashSet<UserId>>,
    channels: HashMap<UserId, HashSet<String>>,
}

/// Routes published payloads to per-connection queues. Sends never block: a
/// connection whose queue is full loses the payload.
#[derive(Default)]
pub struct Hub {
    state: RwLock<HubState>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a connected user's outbound queue.
    pub fn register(&self, user: &str, sender: mpsc::Sender<Bytes>) {
        self.write().senders.insert(user.to_string(), sender);
    }

    /// Detach a user entirely. Returns the channels they were subscribed to
    /// so the caller can report the leaves.
    pub fn deregister(&self, user: &str) -> Vec<String> {
        let mut state = self.write();
        state.senders.remove(user);
        let channels: Vec<String> = state
            .channels
            .remove(user)
            .map(|channels| channels.into_iter().collect())
            .unwrap_or_default();
        for channel in &channels {
            if let Some(subscribers) = state.subscribers.get_mut(channel) {
                subscribers.remove(user);
            }
        }
        channels
    }

    pub fn subscribe(&self, user: &str, channel: &str) {
        let mut state = self.write();
        state
            .subscribers
            .entry(channel.to_string())
            .or_default()
            .insert(user.to_string());
        state
            .channels
            .entry(user.to_string())
            .or_default()
            .insert(channel.to_string());
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HubState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HubState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for Hub {
    fn publish(&self, channel: &str, payload: Bytes) {
        let state = self.read();
        let Some(subscribers) = state.subscribers.get(channel) else {
            return;
        };
        for user in subscribers {
            if let Some(sender) = state.senders.get(user) {
                let _ = sender.try_send(payload.clone());
            }
        }
    }

    fn send_to_user(&self, user: &str, payload: Bytes) {
        if let Some(sender) = self.read().senders.get(user) {
            let _ = sender.try_send(payload);
        }
    }

    fn unsubscribe(&self, user: &str, channel: &str) {
        let mut state = self.write();
        if let Some(subscribers) = state.subscribers.get_mut(channel) {
            subscribers.remove(user);
        }
        if let Some(channels) = state.channels.get_mut(user) {
            channels.remove(channel);
        }
    }

    fn channels_of(&self, user: &str) -> Vec<String> {
        self.read()
            .channels
            .get(user)
            .map(|channels| channels.iter().cloned().collect())
            .unwrap_or_default()
    }
}
