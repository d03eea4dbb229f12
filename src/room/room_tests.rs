use super::*;
use crate::flow::PartyFlow;
use crate::spec::load_from_text;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn open_room(config: RoomConfig) -> Room {
    Room::new("ROOMCODE1", "owner", config)
}

fn idle_flow() -> Arc<PartyFlow> {
    let graph = load_from_text(
        "test",
        r#"
start = "only"

[only]
    [only.layout]
    type = "basic"

    [only.to.end]
    timer = 3600
"#,
    )
    .expect("document is valid");
    let flow = Arc::new(PartyFlow::new(graph));
    flow.register_condition("timer", Arc::new(crate::flow::TimerCondition));
    flow
}

fn input(kind: &str, step: i64, message: &str) -> PlayerInput {
    PlayerInput {
        user_id: String::new(),
        kind: kind.to_string(),
        step,
        message: message.to_string(),
    }
}

#[test]
fn clashing_nicknames_get_distinct_display_names() {
    let mut room = open_room(RoomConfig::default());
    let first = room.joined("alice-id", "X");
    let second = room.joined("bob-id", "X");

    assert_eq!(first, "X");
    assert_ne!(first, second);
    assert!(second.starts_with("X ("));
    assert_eq!(room.nicknames().len(), 2);
}

#[test]
fn empty_nickname_falls_back_to_the_user_id() {
    let mut room = open_room(RoomConfig::default());
    assert_eq!(room.joined("alice-id", "  "), "alice-id");
}

#[test]
fn rejoining_releases_the_previous_nickname() {
    let mut room = open_room(RoomConfig::default());
    room.joined("alice-id", "X");
    room.joined("alice-id", "Y");
    let reclaimed = room.joined("bob-id", "X");
    assert_eq!(reclaimed, "X");
}

#[test]
fn owner_always_may_join() {
    let room = open_room(RoomConfig {
        reject_joins: true,
        allow_spectators: false,
        ..RoomConfig::default()
    });
    assert!(room.can_join("owner", false));
    assert!(room.can_join("owner", true));
}

#[test]
fn reject_joins_refuses_non_owners() {
    let room = open_room(RoomConfig {
        reject_joins: true,
        ..RoomConfig::default()
    });
    assert!(!room.can_join("p1", false));
    assert!(!room.can_join("p1", true));
}

#[test]
fn spectators_need_allow_spectators() {
    let room = open_room(RoomConfig {
        allow_spectators: false,
        ..RoomConfig::default()
    });
    assert!(!room.can_join("p1", true));
    assert!(room.can_join("p1", false));
}

#[tokio::test(start_paused = true)]
async fn ongoing_room_without_spectators_refuses_all_joins() {
    let mut room = open_room(RoomConfig {
        allow_spectators: false,
        auto_start: false,
        ..RoomConfig::default()
    });
    room.attach_flow(idle_flow());
    room.start(false).expect("room starts");

    assert!(!room.can_join("p1", false));
    assert!(!room.can_join("p1", true));
    room.stop();
}

#[tokio::test(start_paused = true)]
async fn ongoing_room_with_spectators_accepts_late_players() {
    let mut room = open_room(RoomConfig {
        auto_start: false,
        ..RoomConfig::default()
    });
    room.attach_flow(idle_flow());
    room.start(false).expect("room starts");

    assert!(room.can_join("p1", false));
    assert!(room.can_join("p1", true));
    room.stop();
}

#[test]
fn resubmitting_while_open_withdraws_the_input() {
    let mut room = open_room(RoomConfig {
        auto_start: false,
        ..RoomConfig::default()
    });
    room.joined("p1", "p1");
    room.joined("p2", "p2");

    room.add_input("p1", input("text", 0, "first"));
    assert_eq!(room.inputs().len(), 1);
    room.add_input("p1", input("text", 0, "changed my mind"));
    assert!(room.inputs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn auto_start_fires_once_when_every_player_submitted() {
    let mut room = open_room(RoomConfig::default());
    room.attach_flow(idle_flow());
    let starts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&starts);
    room.set_on_start(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    room.joined("owner", "host");
    room.joined("p1", "p1");
    room.joined("p2", "p2");

    room.add_input("p1", input("text", 0, "a"));
    assert_eq!(starts.load(Ordering::SeqCst), 0);
    assert_eq!(room.state(), RoomState::Open);

    room.add_input("p2", input("text", 0, "b"));
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert_eq!(room.state(), RoomState::Ongoing);
    assert!(room.inputs().is_empty(), "the lobby inputs are consumed");

    room.stop();
}

#[tokio::test(start_paused = true)]
async fn owner_inputs_never_count_toward_auto_start() {
    let mut room = open_room(RoomConfig::default());
    room.attach_flow(idle_flow());

    room.joined("owner", "host");
    room.joined("p1", "p1");

    room.add_input("owner", input("text", 0, "playing along"));
    assert_eq!(room.state(), RoomState::Open);

    room.add_input("p1", input("text", 0, "a"));
    assert_eq!(room.state(), RoomState::Ongoing);
    room.stop();
}

#[test]
fn auto_start_never_fires_with_no_players() {
    let mut room = open_room(RoomConfig::default());
    room.joined("owner", "host");
    room.add_input("owner", input("text", 0, "alone"));
    assert_eq!(room.state(), RoomState::Open);
}

#[tokio::test(start_paused = true)]
async fn input_ready_fires_when_the_step_matches() {
    let mut room = open_room(RoomConfig {
        auto_start: false,
        ..RoomConfig::default()
    });
    room.attach_flow(idle_flow());
    room.joined("owner", "host");
    room.joined("p1", "p1");
    room.joined("p2", "p2");
    room.start(false).expect("room starts");

    let signal = room.input_ready_signal();
    let step = room.current_step();

    room.add_input("p1", input("text", step, "a"));
    assert!(
        tokio::time::timeout(Duration::from_millis(50), signal.wait())
            .await
            .is_err(),
        "one of two inputs must not raise the signal"
    );

    room.add_input("p2", input("text", step + 7, "stale"));
    assert!(
        tokio::time::timeout(Duration::from_millis(50), signal.wait())
            .await
            .is_err(),
        "an input for another step must not raise the signal"
    );

    room.stop();
}

#[tokio::test(start_paused = true)]
async fn input_ready_fires_after_all_players_submit() {
    let mut room = open_room(RoomConfig {
        auto_start: false,
        ..RoomConfig::default()
    });
    room.attach_flow(idle_flow());
    room.joined("owner", "host");
    room.joined("p1", "p1");
    room.joined("p2", "p2");
    room.start(false).expect("room starts");

    let signal = room.input_ready_signal();
    let step = room.current_step();

    room.add_input("p1", input("text", step, "a"));
    room.add_input("p2", input("text", step, "b"));
    tokio::time::timeout(Duration::from_secs(1), signal.wait())
        .await
        .expect("the complete set raises the signal");

    room.stop();
}

#[tokio::test(start_paused = true)]
async fn a_leave_can_complete_the_input_set() {
    let mut room = open_room(RoomConfig {
        auto_start: false,
        ..RoomConfig::default()
    });
    room.attach_flow(idle_flow());
    room.joined("owner", "host");
    room.joined("p1", "p1");
    room.joined("p2", "p2");
    room.start(false).expect("room starts");

    let signal = room.input_ready_signal();
    room.add_input("p1", input("text", room.current_step(), "a"));
    room.left("p2");

    tokio::time::timeout(Duration::from_secs(1), signal.wait())
        .await
        .expect("the leave completes the set");

    room.stop();
}

#[test]
fn leaving_removes_nickname_and_buffered_input() {
    let mut room = open_room(RoomConfig {
        auto_start: false,
        ..RoomConfig::default()
    });
    room.joined("p1", "Ada");
    room.add_input("p1", input("text", 0, "a"));

    room.left("p1");
    assert!(room.nicknames().is_empty());
    assert!(room.inputs().is_empty());
    // The released nickname is available again.
    assert_eq!(room.joined("p2", "Ada"), "Ada");
}

#[tokio::test(start_paused = true)]
async fn start_refuses_while_ongoing_and_stop_reopens() {
    let mut room = open_room(RoomConfig {
        auto_start: false,
        ..RoomConfig::default()
    });
    room.attach_flow(idle_flow());

    room.start(false).expect("first start succeeds");
    assert!(matches!(room.start(false), Err(RoomError::AlreadyOngoing)));

    room.stop();
    assert_eq!(room.state(), RoomState::Open);
    room.start(false).expect("restart after stop succeeds");
    room.stop();
}

#[test]
fn start_without_a_flow_is_refused() {
    let mut room = open_room(RoomConfig::default());
    assert!(matches!(room.start(false), Err(RoomError::FlowNotAttached)));
}

#[tokio::test(start_paused = true)]
async fn set_config_only_applies_while_open() {
    let mut room = open_room(RoomConfig {
        auto_start: false,
        ..RoomConfig::default()
    });
    room.attach_flow(idle_flow());
    room.start(false).expect("room starts");

    room.set_config(RoomConfig {
        reject_joins: true,
        ..RoomConfig::default()
    });
    assert!(!room.config().reject_joins, "ongoing rooms keep their config");

    room.stop();
    room.set_config(RoomConfig {
        reject_joins: true,
        ..RoomConfig::default()
    });
    assert!(room.config().reject_joins);
}
