use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single named rendition of a file (e.g. `thumbnail`, `large`) in
/// `FileRecord::formats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFormats {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
}

/// Serializable metadata describing an object in either store, used to
/// propagate CMS file relations between master and replica.
///
/// `hash` is the primary de-duplication key on the receiving side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,

    #[serde(rename = "documentId")]
    pub document_id: String,

    pub name: String,

    pub hash: String,

    pub ext: String,

    pub mime: String,

    pub size: f64,

    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none", rename = "previewUrl")]
    pub preview_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub formats: HashMap<String, FileFormats>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "provider_metadata"
    )]
    pub provider_metadata: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none", rename = "folderPath")]
    pub folder_path: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "alternativeText"
    )]
    pub alternative_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}
