//! Matchmaking and signaling relay.
//!
//! - `registry`: connection id -> session record
//! - `queue`: FIFO of sessions waiting for a peer
//! - `state`: registry + queue under one owner, pairing algorithm
//! - `relay`: pairing check for offer/answer/candidate messages
//! - `lifecycle`: disconnect, stale sweep and drain
//! - `hub`: the mutex-guarded service shared by all connection handlers

mod error;
mod handle;
mod hub;
mod lifecycle;
mod queue;
mod registry;
mod relay;
mod state;
mod types;

pub use error::SignalingError;
pub use handle::{wait_evicted, ConnectionHandle};
pub use hub::SignalingHub;
pub use lifecycle::RemovedSession;
pub use queue::WaitQueue;
pub use registry::{ConnectionRegistry, Session};
pub use relay::signal_message;
pub use state::{CancelOutcome, Delivery, MatchOutcome, MatchState, Outbox};
pub use types::{ConnectionId, HubStats, SessionInfo, SessionState, SignalKind, UserInfo};
