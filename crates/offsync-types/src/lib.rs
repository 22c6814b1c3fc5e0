//! Shared wire format and value types for the offline-sync replication engine.
//!
//! Nothing here talks to a database, a bus, or an object store. These are
//! the types every other `offsync-*` crate agrees on: the peer identity
//! model, the sync operation vocabulary, and the [`SyncMessage`] envelope
//! exchanged over `master-updates` / `ship-updates`.

mod file_record;
mod message;
mod peer;

pub use file_record::{FileFormats, FileRecord};
pub use message::{SyncMessage, SyncOperation};
pub use peer::{ConflictKind, PeerId, SyncStatus};

/// The deployment mode a process runs in, fixed for its lifetime.
///
/// A process started in [`Mode::Master`] broadcasts its own edits and
/// arbitrates conflicts; [`Mode::Replica`] owns a durable outbound queue
/// and mirrors media on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Master,
    Replica,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Master => write!(f, "master"),
            Mode::Replica => write!(f, "replica"),
        }
    }
}

/// Field names excluded from structural conflict diffing and from the
/// auto-merger: identifiers, timestamps, and sync bookkeeping fields
/// should never themselves be treated as conflicting content.
pub const RESERVED_FIELDS: &[&str] = &[
    "id",
    "createdAt",
    "updatedAt",
    "publishedAt",
    "syncVersion",
    "modifiedByLocation",
    "lastSyncedAt",
    "syncStatus",
    "conflictFlag",
];

/// Field names redacted from outbound sync payloads.
pub const SENSITIVE_FIELD_MARKERS: &[&str] =
    &["password", "token", "secret", "apikey", "api_key"];

/// Returns true if `field` should be treated as sensitive and stripped
/// from payloads before they leave the process. Matching is
/// case-insensitive and substring-based, matching the loose heuristic a
/// CMS field name convention implies (`resetPasswordToken`, `apiKeySecret`, ...).
pub fn is_sensitive_field(field: &str) -> bool {
    let lower = field.to_ascii_lowercase();
    SENSITIVE_FIELD_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_display_roundtrip() {
        assert_eq!(Mode::Master.to_string(), "master");
        assert_eq!(Mode::Replica.to_string(), "replica");
    }

    #[test]
    fn sensitive_field_detection_is_case_insensitive() {
        assert!(is_sensitive_field("Password"));
        assert!(is_sensitive_field("resetPasswordToken"));
        assert!(is_sensitive_field("apiKey"));
        assert!(!is_sensitive_field("displayName"));
    }
}
