//! Downstream commit notifications over NATS
//!
//! Every durable record mutation is forwarded fire-and-forget; a slow or
//! absent consumer never holds up the session.

pub mod client;
pub mod messages;

pub use client::{CommitForwarder, NatsClient};
pub use messages::RecordCommitMessage;
