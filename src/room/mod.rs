//! Room state: configuration, membership, nicknames, buffered inputs, and
//! the attached party-flow engine.
//!
//! A room is always reached through its [`manager::Manager`], which hands out
//! the room together with its lock. Lock order is manager first, room
//! second, never the reverse; the manager's own methods are the only places
//! both are held at once.

pub mod codes;
pub mod manager;
pub mod signals;

#[cfg(test)]
mod room_tests;

pub use manager::{Manager, ManagerConfig, ManagerError, SharedRoom};
pub use signals::ReadySignal;

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::flow::PartyFlow;
use crate::UserId;

/// Name of the signal the engine's `input-based` condition waits on.
pub const INPUT_READY_SIGNAL: &str = "input-ready";

/// Per-room behaviour switches, settable by the owner while the room is open.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomConfig {
    /// Non-owners may subscribe in spectator mode; when false, any join
    /// during an ongoing game is refused outright.
    pub allow_spectators: bool,
    /// Advisory for the transport layer; the core never refuses on it.
    pub allow_anonymous: bool,
    /// Start the game once every joined player has submitted a lobby input.
    pub auto_start: bool,
    /// Non-owners cannot subscribe at all.
    pub reject_joins: bool,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            allow_spectators: true,
            allow_anonymous: false,
            auto_start: true,
            reject_joins: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    Open,
    Ongoing,
}

/// One buffered player submission. Relevance against the engine's current
/// query is exactly `step` and `type` matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInput {
    #[serde(rename = "userID", default)]
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub step: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("room currently has an ongoing game")]
    AlreadyOngoing,
    #[error("room has no party flow attached")]
    FlowNotAttached,
}

type StartHook = Arc<dyn Fn() + Send + Sync>;

pub struct Room {
    code: String,
    owner: UserId,
    created_at: DateTime<Utc>,
    state: RoomState,
    config: RoomConfig,
    nicknames: HashMap<UserId, String>,
    taken_nicknames: HashSet<String>,
    inputs: HashMap<UserId, PlayerInput>,
    signals: HashMap<String, ReadySignal>,
    flow: Option<Arc<PartyFlow>>,
    flow_task: Option<JoinHandle<()>>,
    on_start: Option<StartHook>,
}

impl Room {
    pub fn new(code: impl Into<String>, owner: impl Into<String>, config: RoomConfig) -> Self {
        Self {
            code: code.into(),
            owner: owner.into(),
            created_at: Utc::now(),
            state: RoomState::Open,
            config,
            nicknames: HashMap::new(),
            taken_nicknames: HashSet::new(),
            inputs: HashMap::new(),
            signals: HashMap::from([(INPUT_READY_SIGNAL.to_string(), ReadySignal::new())]),
            flow: None,
            flow_task: None,
            on_start: None,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn config(&self) -> RoomConfig {
        self.config
    }

    pub fn is_owner(&self, user: &str) -> bool {
        self.owner == user
    }

    /// Whether `user` may subscribe. The owner always may.
    pub fn can_join(&self, user: &str, spectator: bool) -> bool {
        if self.is_owner(user) {
            return true;
        }
        if self.config.reject_joins {
            return false;
        }
        if spectator {
            return self.config.allow_spectators;
        }
        !(self.state == RoomState::Ongoing && !self.config.allow_spectators)
    }

    /// Register `user` under `nickname`, disambiguating with a tag cut from
    /// the user id when the nickname is already taken. Returns the effective
    /// display name.
    pub fn joined(&mut self, user: &str, nickname: &str) -> String {
        if let Some(previous) = self.nicknames.get(user) {
            self.taken_nicknames.remove(previous);
        }

        let requested = if nickname.trim().is_empty() {
            user.to_string()
        } else {
            nickname.trim().to_string()
        };

        let mut effective = requested.clone();
        let mut tag_len = 2;
        while self.taken_nicknames.contains(&effective) {
            let tag: String = user.chars().take(tag_len).collect();
            effective = format!("{requested} ({tag}...)");
            if tag_len >= user.chars().count() {
                break;
            }
            tag_len += 1;
        }

        self.taken_nicknames.insert(effective.clone());
        self.nicknames.insert(user.to_string(), effective.clone());
        effective
    }

    /// Remove `user` and their buffered input. A leave can complete the set
    /// of expected inputs, so readiness is re-checked.
    pub fn left(&mut self, user: &str) {
        if let Some(nickname) = self.nicknames.remove(user) {
            self.taken_nicknames.remove(&nickname);
        }
        self.inputs.remove(user);
        self.evaluate_input_readiness();
    }

    pub fn nicknames(&self) -> &HashMap<UserId, String> {
        &self.nicknames
    }

    /// Joined players, owner excluded. When zero, auto-start and
    /// input-readiness never fire.
    pub fn online_players(&self) -> usize {
        self.nicknames
            .keys()
            .filter(|user| **user != self.owner)
            .count()
    }

    /// Reconfigure; only meaningful while the room is open.
    pub fn set_config(&mut self, config: RoomConfig) {
        if self.state == RoomState::Open {
            self.config = config;
        }
    }

    /// Buffer an input, one per user per step. Re-submitting while the room
    /// is still open means "change my mind" and withdraws the first one.
    pub fn add_input(&mut self, user: &str, input: PlayerInput) {
        match self.inputs.entry(user.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(input);
            }
            Entry::Occupied(slot) => {
                if self.state == RoomState::Open {
                    slot.remove();
                }
            }
        }
        self.evaluate_input_readiness();
    }

    fn evaluate_input_readiness(&mut self) {
        let online = self.online_players();
        if online == 0 {
            return;
        }

        match self.state {
            RoomState::Open => {
                let buffered = self
                    .inputs
                    .keys()
                    .filter(|user| **user != self.owner)
                    .count();
                if self.config.auto_start && buffered == online {
                    let _ = self.start(false);
                    self.clear_inputs();
                }
            }
            RoomState::Ongoing => {
                let step = self.current_step();
                let matching = self
                    .inputs
                    .iter()
                    .filter(|(user, input)| **user != self.owner && input.step == step)
                    .count();
                if matching == online {
                    if let Some(signal) = self.signals.get(INPUT_READY_SIGNAL) {
                        signal.raise();
                    }
                }
            }
        }
    }

    /// Drop buffered inputs and any pending input-ready raise. Called by the
    /// engine on every move.
    pub fn clear_inputs(&mut self) {
        if let Some(signal) = self.signals.get(INPUT_READY_SIGNAL) {
            signal.drain();
        }
        self.inputs.clear();
    }

    pub fn inputs(&self) -> &HashMap<UserId, PlayerInput> {
        &self.inputs
    }

    pub fn input_ready_signal(&self) -> ReadySignal {
        self.signals
            .get(INPUT_READY_SIGNAL)
            .cloned()
            .unwrap_or_default()
    }

    pub fn attach_flow(&mut self, flow: Arc<PartyFlow>) {
        self.flow = Some(flow);
    }

    pub fn flow(&self) -> Option<&Arc<PartyFlow>> {
        self.flow.as_ref()
    }

    /// The attached engine's current step; 0 when no engine is attached.
    pub fn current_step(&self) -> i64 {
        self.flow
            .as_ref()
            .map(|flow| flow.current_step())
            .unwrap_or_default()
    }

    /// Hook invoked on every successful start, auto-start included.
    pub fn set_on_start(&mut self, hook: impl Fn() + Send + Sync + 'static) {
        self.on_start = Some(Arc::new(hook));
    }

    /// Flip to `Ongoing` and launch the engine on its own task. Auto-start
    /// and the explicit start RPC both land here; the loser of that race
    /// observes `AlreadyOngoing`.
    pub fn start(&mut self, restart_if_ongoing: bool) -> Result<(), RoomError> {
        if self.state == RoomState::Ongoing {
            if restart_if_ongoing {
                self.halt_flow();
            } else {
                return Err(RoomError::AlreadyOngoing);
            }
        }

        let flow = self.flow.clone().ok_or(RoomError::FlowNotAttached)?;
        self.state = RoomState::Ongoing;
        self.flow_task = Some(tokio::spawn(flow.run()));
        if let Some(hook) = &self.on_start {
            hook();
        }
        tracing::info!(code = %self.code, "room started");
        Ok(())
    }

    /// Stop the engine, drain every signal, and reopen the room.
    pub fn stop(&mut self) {
        self.halt_flow();
        for signal in self.signals.values() {
            signal.drain();
        }
        self.state = RoomState::Open;
    }

    /// Stop and drop the engine wiring. The engine's observer holds the room,
    /// so dropping the flow here is what lets a closed room's reference
    /// cycle unwind once the engine task ends.
    pub fn teardown(&mut self) {
        self.stop();
        self.flow = None;
        self.on_start = None;
    }

    fn halt_flow(&mut self) {
        if let Some(flow) = &self.flow {
            flow.stop();
        }
        // The engine task unwinds through on_finished on its own.
        self.flow_task.take();
    }
}
