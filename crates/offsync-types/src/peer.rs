use serde::{Deserialize, Serialize};

/// A peer identifier: `"master"` on the master itself, or a ship id
/// (`shipId`) on a replica. Opaque beyond that — the sync engine never
/// parses it.
pub type PeerId = String;

/// Lifecycle status of a `SyncMetadata` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Synced,
    Conflict,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Conflict => "conflict",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            "conflict" => Ok(SyncStatus::Conflict),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

/// The kind of conflict `detectConflict` found between a local
/// and a remote version of the same entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    /// Both sides set a reserved-excluded field to different values.
    Direct,
    /// A field is present on one side and absent on the other.
    Structural,
    /// Reserved for conflicts detected outside simple field diffing
    /// (e.g. concurrent delete-vs-update). Not produced by
    /// `detectConflict` today but kept so resolvers can classify
    /// conflicts they detect by other means without a schema change.
    Indirect,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConflictKind::Direct => "direct",
            ConflictKind::Indirect => "indirect",
            ConflictKind::Structural => "structural",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ConflictKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(ConflictKind::Direct),
            "indirect" => Ok(ConflictKind::Indirect),
            "structural" => Ok(ConflictKind::Structural),
            other => Err(format!("unknown conflict kind: {other}")),
        }
    }
}
