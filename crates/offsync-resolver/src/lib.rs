//! Apply path and conflict resolution for the offline-sync
//! replication engine. The [`ContentRepository`] trait is the
//! boundary to the hosting CMS; everything else here is pure logic
//! plus the durable state in `offsync-store`.

mod apply;
mod content;
mod error;
mod merge;

pub use apply::{ApplyOutcome, Resolver};
pub use content::ContentRepository;
#[cfg(any(test, feature = "test-util"))]
pub use content::testing;
pub use error::{ResolverError, Result};
pub use merge::{auto_merge, field_fill_merge, last_writer_wins_merge, MergeStrategy};
