#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools
)]

//! # WebParty Server
//!
//! Real-time server for a multi-room, party-style game platform.
//!
//! Authors upload declarative party specifications — a graph of named
//! queries. A host creates a room from one, players and spectators subscribe
//! over a pub/sub transport, and a per-room flow engine drives the party
//! through its graph, collecting inputs and standings along the way.

/// Channel naming shared with the transport
pub mod channels;

/// Server configuration and environment variables
pub mod config;

/// Outbound event payloads
pub mod events;

/// The per-room party-flow engine
pub mod flow;

/// Transport-facing event handlers and RPCs
pub mod gateway;

/// Structured logging configuration
pub mod logging;

/// Rooms and the room manager
pub mod room;

/// Script storage seam
pub mod scripts;

/// Party-specification loading and validation
pub mod spec;

/// Pub/sub transport boundary
pub mod transport;

/// WebSocket front end
pub mod websocket;

/// Identifier the transport assigns to a connected user.
pub type UserId = String;
