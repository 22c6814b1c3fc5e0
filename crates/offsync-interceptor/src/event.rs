//! The shape of a CMS document-lifecycle event as the interceptor
//! needs it. The CMS adapter that wires the interceptor into
//! the real middleware is responsible for building one of these per
//! hook invocation.

use offsync_types::{FileRecord, SyncOperation};
use serde_json::Value;

/// What the CMS operation actually returned.
#[derive(Debug, Clone)]
pub enum OperationResult {
    /// A single entity, as most create/update/publish calls return.
    Single(Value),
    /// A bulk mutation's array of entities — skipped.
    Bulk(Vec<Value>),
    /// A bulk delete/update count — skipped.
    Count(u64),
}

#[derive(Debug, Clone)]
pub struct DocumentEvent {
    pub content_type: String,
    pub operation: SyncOperation,
    pub result: OperationResult,
    /// The CMS operation's input parameters; for deletes this is
    /// preferred over the result for resolving `documentId`.
    pub params_document_id: Option<String>,
    /// File records already extracted by the CMS adapter, if this
    /// operation touched media.
    pub file_records: Option<Vec<FileRecord>>,
}

impl DocumentEvent {
    /// Resolves the opaque `documentId` this event concerns: for
    /// deletes prefer `params_document_id`; otherwise prefer the
    /// returned entity's `id` field.
    pub fn document_id(&self) -> Option<String> {
        if self.operation == SyncOperation::Delete {
            if let Some(id) = &self.params_document_id {
                return Some(id.clone());
            }
        }
        match &self.result {
            OperationResult::Single(value) => value
                .get("id")
                .and_then(|v| v.as_str().map(String::from).or_else(|| v.as_i64().map(|n| n.to_string()))),
            _ => self.params_document_id.clone(),
        }
    }

    /// Bulk/array/count results are skipped, except a delete carrying
    /// a single resolvable `documentId`.
    pub fn is_skippable_bulk(&self) -> bool {
        match &self.result {
            OperationResult::Bulk(_) | OperationResult::Count(_) => {
                !(self.operation == SyncOperation::Delete && self.params_document_id.is_some())
            }
            OperationResult::Single(_) => false,
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match &self.result {
            OperationResult::Single(value) => Some(value),
            _ => None,
        }
    }
}
