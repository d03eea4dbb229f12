//! Outbound event payloads: small `{type, message}` JSON objects, encoded
//! once and shared as [`Bytes`] across every recipient.
//!
//! Query broadcasts are the exception: layout and input bodies are authored
//! payloads forwarded verbatim (the body already carries its own `type`).

use std::collections::HashMap;

use bytes::Bytes;
use serde::Serialize;
use serde_json::{json, Value};

use crate::spec::JsonMap;
use crate::UserId;

#[derive(Debug, Serialize)]
struct Event<T: Serialize> {
    #[serde(rename = "type")]
    kind: &'static str,
    message: T,
}

fn encode<T: Serialize>(kind: &'static str, message: T) -> Bytes {
    serde_json::to_vec(&Event { kind, message })
        .map(Bytes::from)
        .unwrap_or_default()
}

/// Snapshot of the room's display names, owner distinguished.
pub fn nicknames(owner: &str, all: &HashMap<UserId, String>) -> Bytes {
    encode("nicknames", json!({ "owner": owner, "all": all }))
}

pub fn room_created_at(created_at: i64) -> Bytes {
    encode("room_created_at", json!({ "createdAt": created_at }))
}

pub fn new_nickname(user: &str, nickname: &str) -> Bytes {
    let mut message = JsonMap::new();
    message.insert(user.to_string(), Value::String(nickname.to_string()));
    encode("new_nickname", Value::Object(message))
}

pub fn remove_nickname(user: &str) -> Bytes {
    encode("remove_nickname", json!({ "userID": user }))
}

pub fn room_started() -> Bytes {
    encode("room_started", json!({}))
}

pub fn room_ended() -> Bytes {
    encode("room_ended", json!({}))
}

pub fn unsubscribe() -> Bytes {
    encode("unsubscribe", json!({}))
}

/// The player-facing side of a query: the input body with `correct`
/// stripped and the current step attached.
pub fn query_input(input: &JsonMap, step: i64) -> Bytes {
    let mut payload = input.clone();
    payload.remove("correct");
    payload.insert("step".to_string(), json!(step));
    serde_json::to_vec(&payload).map(Bytes::from).unwrap_or_default()
}

/// The spectator-facing side of a query, forwarded verbatim.
pub fn query_layout(layout: &JsonMap) -> Bytes {
    serde_json::to_vec(layout).map(Bytes::from).unwrap_or_default()
}
