//! Realtime change feed for the Piggy Budget ledger
//!
//! Joins a Phoenix channel on the realtime endpoint and turns the
//! `postgres_changes` events of one table into a stream of
//! [`ChangeEvent`]s. A dropped socket or a rejected join ends the stream with
//! an error; reconnecting is left to the caller.

mod channel;
mod client;
mod error;
mod message;

pub use channel::{ChangeStream, DatabaseChanges};
pub use client::{ConnectionState, RealtimeClient, RealtimeClientOptions};
pub use error::RealtimeError;
pub use message::{ChangeEvent, ChangeKind, ChannelEvent, RealtimeMessage};
