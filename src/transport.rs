//! The pub/sub boundary the core publishes through.
//!
//! The core never owns sockets. It publishes to named channels and, on
//! occasion, to a single user, through this trait; the WebSocket front end
//! (or a test double) implements it. Every method is callable from any task
//! and must not block: a recipient that cannot keep up loses the payload,
//! backpressure is the transport's own problem.

use bytes::Bytes;

pub trait Transport: Send + Sync {
    /// Deliver `payload` to every subscriber of `channel`.
    fn publish(&self, channel: &str, payload: Bytes);

    /// Deliver `payload` to a single connected user.
    fn send_to_user(&self, user: &str, payload: Bytes);

    /// Drop one of `user`'s subscriptions, transport-side only.
    fn unsubscribe(&self, user: &str, channel: &str);

    /// The channels `user` is currently subscribed to.
    fn channels_of(&self, user: &str) -> Vec<String>;
}
