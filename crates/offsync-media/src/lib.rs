//! S3-compatible media-mirror service: on-demand mirroring of
//! file objects between a master and a local (replica) object store,
//! plus URL rewriting so content payloads always point at the object
//! store of whichever side is serving them.

mod client;
mod error;
mod service;
mod traverse;

pub use client::{restore_upload_path, strip_upload_path, ObjectStore, S3ObjectStore};
#[cfg(any(test, feature = "test-util"))]
pub use client::testing;
pub use error::{MediaError, Result};
pub use service::{MediaMirror, SyncObjectOutcome};
pub use traverse::{extract_object_paths, rewrite_urls};
