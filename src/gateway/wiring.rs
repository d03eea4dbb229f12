//! Per-room engine wiring: conditions, checkers, observer, lifecycle hooks.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::channels;
use crate::events;
use crate::flow::{
    CheckerRegistry, FlowObserver, InputBasedCondition, PartyFlow, TextChecker, TimerCondition,
};
use crate::room::{ManagerError, PlayerInput, SharedRoom};
use crate::scripts::ScriptError;
use crate::spec::{self, JsonMap, Query, SpecError};
use crate::transport::Transport;
use crate::UserId;

use super::rpc::RoomCreated;
use super::Gateway;

#[derive(Debug, Error)]
pub enum CreateRoomError {
    #[error("script load failed: {0}")]
    Script(#[from] ScriptError),
    #[error("party flow build failed: {0}")]
    Spec(#[from] SpecError),
    #[error("room allocation failed: {0}")]
    Allocation(#[from] ManagerError),
}

impl Gateway {
    /// Load the specification named by `hash`, allocate a room for `owner`,
    /// and wire an engine into it: built-in checkers and conditions, the
    /// broadcast observer, and the start hook.
    pub(super) async fn create_room(
        &self,
        owner: &str,
        hash: &str,
    ) -> Result<RoomCreated, CreateRoomError> {
        let text = self.scripts.load(hash).await?;
        let graph = spec::load_from_text(hash, &text)?;
        let room = self.manager.allocate(owner, self.room_defaults).await?;

        let (code, created_at, input_ready) = {
            let room = room.read().await;
            (
                room.code().to_string(),
                room.created_at().timestamp(),
                room.input_ready_signal(),
            )
        };

        let flow = Arc::new(PartyFlow::with_timings(graph, self.flow_timings));
        flow.register_input_checker("text", Arc::new(TextChecker));
        flow.register_condition("timer", Arc::new(TimerCondition));
        flow.register_condition("input-based", Arc::new(InputBasedCondition::new(input_ready)));

        let observer = Arc::new(RoomObserver {
            code: code.clone(),
            room: Arc::clone(&room),
            transport: Arc::clone(&self.transport),
            checkers: flow.checkers(),
        });
        flow.set_observer(observer);

        {
            let mut room = room.write().await;
            room.attach_flow(flow);

            let transport = Arc::clone(&self.transport);
            let started_code = code.clone();
            room.set_on_start(move || {
                let payload = events::room_started();
                transport.publish(&channels::play(&started_code), payload.clone());
                transport.publish(&channels::watch(&started_code), payload);
            });
        }

        tracing::info!(%owner, %code, spec = %hash, "room created");
        Ok(RoomCreated {
            code,
            started_at: created_at,
        })
    }
}

/// Bridges engine events onto the room's channels, and answers the engine's
/// winner and input queries from the room's buffered inputs. Every method
/// takes the room's lock itself; the engine never holds it.
pub(super) struct RoomObserver {
    pub(super) code: String,
    pub(super) room: SharedRoom,
    pub(super) transport: Arc<dyn Transport>,
    pub(super) checkers: Arc<CheckerRegistry>,
}

#[async_trait]
impl FlowObserver for RoomObserver {
    async fn on_query(&self, query: &Query) {
        if let Some(input) = &query.input {
            self.transport.publish(
                &channels::play(&self.code),
                events::query_input(input, query.step),
            );
        }
        if let Some(layout) = &query.layout {
            self.transport
                .publish(&channels::watch(&self.code), events::query_layout(layout));
        }
    }

    async fn on_move(&self) {
        self.room.write().await.clear_inputs();
    }

    async fn on_finished(&self) {
        let payload = events::room_ended();
        self.transport
            .publish(&channels::play(&self.code), payload.clone());
        self.transport
            .publish(&channels::watch(&self.code), payload);
        self.room.write().await.stop();
    }

    async fn pick_winners(&self, query: &Query) -> Vec<UserId> {
        let Some(input_spec) = &query.input else {
            return Vec::new();
        };
        let Some(kind) = input_spec.get("type").and_then(Value::as_str) else {
            return Vec::new();
        };

        let inputs: Vec<PlayerInput> =
            { self.room.read().await.inputs().values().cloned().collect() };
        let relevant = inputs
            .iter()
            .filter(|input| input.kind == kind && input.step == query.step);

        if kind.starts_with("vote ") {
            return tally_votes(input_spec, relevant);
        }

        let Some(checker) = self.checkers.get(kind) else {
            tracing::warn!(kind, query = %query.name, "no input checker registered");
            return Vec::new();
        };
        let Some(correct_spec) = input_spec.get("correct") else {
            return Vec::new();
        };

        let correct = if correct_spec.as_str() == Some("pick") {
            let limits = input_spec
                .get("limits")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let picked = checker.pick(&limits);
            tracing::debug!(query = %query.name, ?picked, "picked correct answer");
            picked
        } else {
            correct_spec.clone()
        };

        relevant
            .filter(|input| checker.is_correct(&input.message, &correct))
            .map(|input| input.user_id.clone())
            .collect()
    }

    async fn get_inputs(&self, _query: &Query) -> HashMap<UserId, String> {
        self.room
            .read()
            .await
            .inputs()
            .iter()
            .map(|(user, input)| (user.clone(), input.message.clone()))
            .collect()
    }
}

/// Winners of a voting step: the users whose candidate entry equals the
/// plurality choice. Ties keep the earlier candidate in insertion order.
fn tally_votes<'a>(
    input_spec: &JsonMap,
    votes: impl Iterator<Item = &'a PlayerInput>,
) -> Vec<UserId> {
    let Some(candidates) = input_spec.get("candidates").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for vote in votes {
        *counts.entry(vote.message.as_str()).or_default() += 1;
    }

    let mut winning_message: Option<&str> = None;
    let mut best = 0;
    for message in candidates.values().filter_map(Value::as_str) {
        let votes = counts.get(message).copied().unwrap_or_default();
        if votes > best {
            best = votes;
            winning_message = Some(message);
        }
    }

    let Some(winning_message) = winning_message else {
        return Vec::new();
    };

    candidates
        .iter()
        .filter(|(_, message)| message.as_str() == Some(winning_message))
        .map(|(user, _)| user.clone())
        .collect()
}
