use serde::{Deserialize, Serialize};

use crate::FileRecord;

/// The mutation a [`SyncMessage`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
    Publish,
}

impl std::fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncOperation::Create => "create",
            SyncOperation::Update => "update",
            SyncOperation::Delete => "delete",
            SyncOperation::Publish => "publish",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SyncOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(SyncOperation::Create),
            "update" => Ok(SyncOperation::Update),
            "delete" => Ok(SyncOperation::Delete),
            "publish" => Ok(SyncOperation::Publish),
            other => Err(format!("unknown sync operation: {other}")),
        }
    }
}

/// The wire envelope exchanged on `master-updates` / `ship-updates`.
///
/// `messageId` is the dedup key; by convention it is
/// `"<shipId>-<unixMillis>-<contentId>"`, but the dedup ledger
/// treats it as an opaque string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMessage {
    #[serde(rename = "messageId")]
    pub message_id: String,

    #[serde(rename = "shipId")]
    pub ship_id: String,

    pub timestamp: chrono::DateTime<chrono::Utc>,

    pub operation: SyncOperation,

    #[serde(rename = "contentType")]
    pub content_type: String,

    #[serde(rename = "contentId")]
    pub content_id: String,

    /// Version at time of send; `0` on delete.
    pub version: u64,

    /// Arbitrary content payload; `null` on delete.
    pub data: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", rename = "fileRecords")]
    pub file_records: Option<Vec<FileRecord>>,
}

impl SyncMessage {
    /// Builds the conventional message id `"<shipId>-<unixMillis>-<contentId>"`.
    pub fn make_message_id(ship_id: &str, timestamp_millis: i64, content_id: &str) -> String {
        format!("{ship_id}-{timestamp_millis}-{content_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_wire_field_names() {
        let msg = SyncMessage {
            message_id: "ship-a-1700000000000-entity-1".into(),
            ship_id: "ship-a".into(),
            timestamp: chrono::Utc::now(),
            operation: SyncOperation::Update,
            content_type: "api::article.article".into(),
            content_id: "entity-1".into(),
            version: 3,
            data: Some(serde_json::json!({"title": "hello"})),
            locale: None,
            file_records: None,
        };

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["messageId"], "ship-a-1700000000000-entity-1");
        assert_eq!(value["shipId"], "ship-a");
        assert_eq!(value["contentType"], "api::article.article");
        assert!(value.get("locale").is_none());
    }

    #[test]
    fn operation_round_trips_through_display_and_from_str() {
        for op in [
            SyncOperation::Create,
            SyncOperation::Update,
            SyncOperation::Delete,
            SyncOperation::Publish,
        ] {
            let parsed: SyncOperation = op.to_string().parse().unwrap();
            assert_eq!(parsed, op);
        }
    }
}
