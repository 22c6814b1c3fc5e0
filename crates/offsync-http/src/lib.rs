//! Optional HTTP management surface for the offline-sync replication
//! engine: sync status, a manual push/pull fallback, and
//! conflict listing/resolution.

mod error;
mod routes;
mod state;

pub use error::{HttpError, Result};
pub use routes::build_router;
pub use state::AppState;
