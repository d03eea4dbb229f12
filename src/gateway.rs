//! Transport-facing event handlers.
//!
//! The gateway is what the pub/sub transport calls into: subscription
//! lifecycle, inbound messages, and RPCs. It owns the wiring that turns a
//! stored party specification into a live, observed engine inside a room.

mod messages;
mod rpc;
mod subscriptions;
mod wiring;


pub use rpc::{RoomCreated, RpcError};
pub use subscriptions::SubscribeError;
pub use wiring::CreateRoomError;

use std::sync::Arc;

use bytes::Bytes;

use crate::channels;
use crate::flow::FlowTimings;
use crate::room::{Manager, RoomConfig};
use crate::scripts::ScriptStore;
use crate::transport::Transport;

pub struct Gateway {
    manager: Arc<Manager>,
    scripts: Arc<dyn ScriptStore>,
    transport: Arc<dyn Transport>,
    flow_timings: FlowTimings,
    room_defaults: RoomConfig,
}

impl Gateway {
    pub fn new(
        manager: Arc<Manager>,
        scripts: Arc<dyn ScriptStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            manager,
            scripts,
            transport,
            flow_timings: FlowTimings::default(),
            room_defaults: RoomConfig::default(),
        }
    }

    pub fn with_flow_timings(mut self, timings: FlowTimings) -> Self {
        self.flow_timings = timings;
        self
    }

    pub fn with_room_defaults(mut self, defaults: RoomConfig) -> Self {
        self.room_defaults = defaults;
        self
    }

    pub fn manager(&self) -> &Arc<Manager> {
        &self.manager
    }

    fn send_to_players(&self, code: &str, payload: Bytes) {
        self.transport.publish(&channels::play(code), payload);
    }

    fn send_to_spectators(&self, code: &str, payload: Bytes) {
        self.transport.publish(&channels::watch(code), payload);
    }

    /// Publish to players and spectators of a room alike.
    fn broadcast(&self, code: &str, payload: Bytes) {
        self.send_to_players(code, payload.clone());
        self.send_to_spectators(code, payload);
    }
}
