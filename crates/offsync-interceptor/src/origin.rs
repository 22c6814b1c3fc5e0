//! Per-apply loop-prevention scoping.
//!
//! The source this was distilled from uses two process-wide flags
//! toggled around the apply call; under concurrent applies that's a
//! race. This scopes the origin to the in-flight task instead, via
//! `tokio::task_local!`, so concurrent consumer tasks never see each
//! other's flag.

use std::cell::Cell;
use std::future::Future;

/// Where the document mutation that is about to run the CMS's
/// middleware originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A normal local write (HTTP request, admin UI, script).
    Local,
    /// Applied because of an inbound message from the master.
    FromMaster,
    /// Applied because of an inbound message from a replica.
    FromShip,
}

impl Origin {
    pub fn is_local(self) -> bool {
        matches!(self, Origin::Local)
    }
}

tokio::task_local! {
    static CURRENT_ORIGIN: Cell<Origin>;
}

/// Runs `fut` with `origin` as the current task's loop-prevention
/// context. The consumer wraps each message apply in this; the
/// interceptor reads [`current`] when the CMS calls back into it.
pub async fn scoped<F: Future>(origin: Origin, fut: F) -> F::Output {
    CURRENT_ORIGIN.scope(Cell::new(origin), fut).await
}

/// The origin of the enclosing [`scoped`] call, or [`Origin::Local`]
/// if none is active (a genuine local write, outside any apply scope).
pub fn current() -> Origin {
    CURRENT_ORIGIN
        .try_with(|cell| cell.get())
        .unwrap_or(Origin::Local)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_to_local_outside_any_scope() {
        assert_eq!(current(), Origin::Local);
    }

    #[tokio::test]
    async fn scoped_origin_is_visible_inside_the_future() {
        let seen = scoped(Origin::FromMaster, async { current() }).await;
        assert_eq!(seen, Origin::FromMaster);
        assert_eq!(current(), Origin::Local);
    }
}
