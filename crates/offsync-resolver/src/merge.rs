//! Auto-merge strategies for manual conflict resolution.

use chrono::DateTime;
use offsync_types::RESERVED_FIELDS;
use serde_json::Value;

/// How `merge` resolves a conflict when no explicit merged payload is
/// supplied, selected by config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// Shallow field-wise combination: `local` is the base, any field
    /// absent there is filled from `remote`. Reserved metadata fields
    /// are never touched.
    #[default]
    FieldFill,
    /// Whichever side has the later `updatedAt` wins outright.
    LastWriterWins,
}

/// Shallow field-wise combination taking `local` as the base and
/// filling any field absent there from `remote`, skipping
/// [`RESERVED_FIELDS`].
pub fn field_fill_merge(local: &Value, remote: &Value) -> Value {
    let mut merged = local.clone();

    let Some(remote_obj) = remote.as_object() else {
        return merged;
    };
    let Some(merged_obj) = merged.as_object_mut() else {
        return merged;
    };

    for (key, value) in remote_obj {
        if RESERVED_FIELDS.contains(&key.as_str()) {
            continue;
        }
        if !merged_obj.contains_key(key) {
            merged_obj.insert(key.clone(), value.clone());
        }
    }

    merged
}

/// Picks the side with the later `updatedAt`. Missing or unparsable
/// timestamps sort before any present one, so a side with no
/// `updatedAt` loses to a side that has one.
pub fn last_writer_wins_merge<'a>(local: &'a Value, remote: &'a Value) -> &'a Value {
    let local_ts = updated_at(local);
    let remote_ts = updated_at(remote);
    match (local_ts, remote_ts) {
        (Some(l), Some(r)) => {
            if r > l {
                remote
            } else {
                local
            }
        }
        (None, Some(_)) => remote,
        _ => local,
    }
}

fn updated_at(value: &Value) -> Option<DateTime<chrono::Utc>> {
    value
        .as_object()?
        .get("updatedAt")?
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

pub fn auto_merge<'a>(local: &'a Value, remote: &'a Value, strategy: MergeStrategy) -> Value {
    match strategy {
        MergeStrategy::FieldFill => field_fill_merge(local, remote),
        MergeStrategy::LastWriterWins => last_writer_wins_merge(local, remote).clone(),
    }
}
