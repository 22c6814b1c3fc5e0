//! Peer liveness (master-side) and connectivity monitoring (replica-side)
//! for the offline-sync replication engine.

mod error;
mod liveness;
mod monitor;
mod state;

pub use error::{ConnectivityError, Result};
pub use liveness::PeerLivenessSupervisor;
pub use monitor::{ConnectivityMonitor, ReconnectCallback};
pub use state::ConnectivityState;
