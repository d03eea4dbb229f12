//! End-to-end scenarios: gateway, rooms, and the flow engine wired together
//! over the in-memory hub, driving whole parties from creation to `end`.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use webparty_server::channels;
use webparty_server::gateway::Gateway;
use webparty_server::room::{Manager, ManagerConfig};
use webparty_server::scripts::MemoryScriptStore;
use webparty_server::websocket::Hub;

struct Party {
    gateway: Gateway,
    hub: Arc<Hub>,
    scripts: Arc<MemoryScriptStore>,
}

fn party() -> Party {
    let manager = Arc::new(Manager::new(ManagerConfig::default()));
    let scripts = Arc::new(MemoryScriptStore::new());
    let hub = Arc::new(Hub::new());
    let gateway = Gateway::new(manager, scripts.clone(), hub.clone());
    Party {
        gateway,
        hub,
        scripts,
    }
}

impl Party {
    async fn create_room(&self, owner: &str, script: &str) -> String {
        self.scripts.insert("script-hash", script);
        let reply = self
            .gateway
            .handle_rpc("createRoom", br#"{"hash": "script-hash"}"#, owner)
            .await
            .expect("createRoom succeeds");
        reply["code"].as_str().expect("code present").to_string()
    }

    /// Register a connection and subscribe it the way the socket loop does.
    async fn join(&self, user: &str, channel: &str) -> mpsc::Receiver<Bytes> {
        let (tx, rx) = mpsc::channel(64);
        self.hub.register(user, tx);
        self.hub.subscribe(user, channel);
        self.gateway
            .handle_subscribe(channel, user, b"\"\"")
            .await
            .expect("subscription accepted");
        rx
    }

    async fn start(&self, owner: &str) {
        self.gateway
            .handle_rpc("startRoom", b"{}", owner)
            .await
            .expect("startRoom succeeds");
    }

    async fn submit(&self, code: &str, user: &str, kind: &str, step: i64, message: &str) {
        let payload = serde_json::to_vec(&json!({
            "type": kind,
            "content": {"step": step, "message": message}
        }))
        .expect("input serializes");
        self.gateway
            .handle_message(&channels::play(code), user, &payload)
            .await;
    }
}

async fn next_json(rx: &mut mpsc::Receiver<Bytes>) -> Value {
    let payload = tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("a payload arrives")
        .expect("the connection stays attached");
    serde_json::from_slice(&payload).expect("payloads are JSON")
}

/// Skip broadcasts until one with the given `type` value arrives.
async fn next_of_type(rx: &mut mpsc::Receiver<Bytes>, kind: &str) -> Value {
    loop {
        let payload = next_json(rx).await;
        if payload["type"] == kind {
            return payload;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn a_timer_party_runs_from_start_to_end() {
    let p = party();
    let code = p
        .create_room(
            "owner",
            r#"
start = "intro"

[intro]
    [intro.layout]
    type = "basic"
    title = "Welcome"

    [intro.to.question]
    timer = 2

[question]
    [question.input]
    type = "text"
    correct = "3"

    [question.to.end]
    timer = 2
"#,
        )
        .await;

    let _owner = p.join("owner", &channels::play(&code)).await;
    let mut player = p.join("p1", &channels::play(&code)).await;
    let mut watcher = p.join("w1", &channels::watch(&code)).await;

    p.start("owner").await;
    next_of_type(&mut player, "room_started").await;

    // The intro has no input, so players see nothing for it; spectators get
    // its layout.
    let layout = next_of_type(&mut watcher, "basic").await;
    assert_eq!(layout["title"], "Welcome");

    // The question solicits text input, correct answer stripped.
    let prompt = next_of_type(&mut player, "text").await;
    assert_eq!(prompt["step"], 2);
    assert!(prompt.get("correct").is_none());

    let step = prompt["step"].as_i64().expect("step attached");
    p.submit(&code, "p1", "text", step, "3").await;

    next_of_type(&mut player, "room_ended").await;
    next_of_type(&mut watcher, "room_ended").await;

    // The engine's exit reopened the room.
    let room = p.gateway.manager().room(&code).await.expect("room remains");
    assert_eq!(
        room.read().await.state(),
        webparty_server::room::RoomState::Open
    );
}

#[tokio::test(start_paused = true)]
async fn voting_and_overviewer_steps_are_synthesized_end_to_end() {
    let p = party();
    let code = p
        .create_room(
            "owner",
            r#"
start = "guess"

[guess]
    [guess.layout]
    type = "basic"

    [guess.input]
    type = "text"
    correct = "vote"

    [guess.to.end]
    timer = 2

    [guess.overviewer]
    type = "winner"
    timer = 1

    [guess.vote]
    type = "all"
    timer = 2
"#,
        )
        .await;

    let _owner = p.join("owner", &channels::play(&code)).await;
    let mut p1 = p.join("p1", &channels::play(&code)).await;
    let mut p2 = p.join("p2", &channels::play(&code)).await;
    let mut watcher = p.join("w1", &channels::watch(&code)).await;

    p.start("owner").await;

    let prompt = next_of_type(&mut p1, "text").await;
    let step = prompt["step"].as_i64().expect("step attached");
    p.submit(&code, "p1", "text", step, "A").await;
    p.submit(&code, "p2", "text", step, "B").await;

    // After the guess timer, a synthetic voting step offers the submissions
    // as candidates.
    let ballot = next_of_type(&mut p1, "vote all").await;
    assert_eq!(ballot["candidates"]["p1"], "A");
    assert_eq!(ballot["candidates"]["p2"], "B");
    let vote_step = ballot["step"].as_i64().expect("step attached");
    assert_eq!(vote_step, step + 1);

    // Both players vote for p1's submission.
    p.submit(&code, "p1", "vote all", vote_step, "A").await;
    p.submit(&code, "p2", "vote all", vote_step, "A").await;

    // The overviewer recap carries the standings: p1 won the vote.
    let recap = next_of_type(&mut watcher, "overviewer winner").await;
    assert_eq!(recap["winners"]["p1"]["winCount"], 1);
    assert_eq!(recap["winners"]["p1"]["lastInput"], "A");
    assert!(recap["winners"].get("p2").is_none());

    next_of_type(&mut p1, "room_ended").await;
    next_of_type(&mut p2, "room_ended").await;
}

#[tokio::test(start_paused = true)]
async fn input_based_steps_advance_once_everyone_answered() {
    let p = party();
    let code = p
        .create_room(
            "owner",
            r#"
start = "collect"

[collect]
    [collect.input]
    type = "text"
    correct = "42"

    [collect.to.end]
    input-based = 0
"#,
        )
        .await;

    let _owner = p.join("owner", &channels::play(&code)).await;
    let mut p1 = p.join("p1", &channels::play(&code)).await;
    let mut p2 = p.join("p2", &channels::play(&code)).await;

    p.start("owner").await;

    let prompt = next_of_type(&mut p1, "text").await;
    let step = prompt["step"].as_i64().expect("step attached");

    // One answer is not enough; the second completes the set and the step
    // advances without any timer in the specification.
    p.submit(&code, "p1", "text", step, "42").await;
    p.submit(&code, "p2", "text", step, "41").await;

    next_of_type(&mut p1, "room_ended").await;
    next_of_type(&mut p2, "room_ended").await;
}

#[tokio::test(start_paused = true)]
async fn auto_start_kicks_in_when_the_lobby_is_ready() {
    let p = party();
    let code = p
        .create_room(
            "owner",
            r#"
start = "only"

[only]
    [only.layout]
    type = "basic"

    [only.to.end]
    timer = 1
"#,
        )
        .await;

    let _owner = p.join("owner", &channels::play(&code)).await;
    let mut p1 = p.join("p1", &channels::play(&code)).await;
    let mut p2 = p.join("p2", &channels::play(&code)).await;

    // No RPC: both players answering the lobby prompt starts the room.
    p.submit(&code, "p1", "text", 0, "ready").await;
    p.submit(&code, "p2", "text", 0, "ready").await;

    next_of_type(&mut p1, "room_started").await;
    next_of_type(&mut p2, "room_started").await;
    next_of_type(&mut p1, "room_ended").await;
}
