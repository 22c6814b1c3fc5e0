//! Media-mirror service: two S3-compatible clients, URL
//! rewriting, and the replica push/pull sync paths.

use std::collections::HashMap;
use std::sync::Arc;

use offsync_config::MediaConfig;
use offsync_types::FileRecord;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::client::{restore_upload_path, strip_upload_path, ObjectStore};
use crate::error::Result;
use crate::traverse::{extract_object_paths, rewrite_urls};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncObjectOutcome {
    Success,
    Skipped,
    Failed,
}

pub struct MediaMirror {
    master: Arc<dyn ObjectStore>,
    local: Arc<dyn ObjectStore>,
    master_base_url: String,
    local_base_url: String,
    master_upload_path: String,
    local_upload_path: String,
    transform_urls: bool,
    max_files_per_sync: usize,
    disable_full_sync: bool,
}

impl MediaMirror {
    pub fn new(master: Arc<dyn ObjectStore>, local: Arc<dyn ObjectStore>, config: &MediaConfig) -> Self {
        Self {
            master,
            local,
            master_base_url: config.master_store.base_url.clone(),
            local_base_url: config.local_store.base_url.clone(),
            master_upload_path: config.master_store.upload_path.clone(),
            local_upload_path: config.local_store.upload_path.clone(),
            transform_urls: config.transform_urls,
            max_files_per_sync: config.max_files_per_sync,
            disable_full_sync: config.disable_full_sync,
        }
    }

    pub async fn ensure_local_bucket(&self) -> Result<()> {
        self.local.ensure_bucket().await
    }

    /// Mirrors every object under the master bucket's upload path into
    /// local storage, skipping ones already present. A no-op when
    /// `disableFullSync` is set, since on-demand `sync_content_media`
    /// already covers objects actually referenced by synced content.
    /// Returns `(copied, failed)`.
    pub async fn full_sync(&self) -> Result<(usize, usize)> {
        if self.disable_full_sync {
            return Ok((0, 0));
        }

        let keys = self.master.list_objects(&self.master_upload_path).await?;
        let mut copied = 0;
        let mut failed = 0;
        for key in keys {
            let canonical = strip_upload_path(&key, &self.master_upload_path);
            match self.sync_object(&canonical).await {
                SyncObjectOutcome::Success => copied += 1,
                SyncObjectOutcome::Failed => failed += 1,
                SyncObjectOutcome::Skipped => {}
            }
        }
        if failed > 0 {
            warn!(copied, failed, "full media sync finished with failures");
        }
        Ok((copied, failed))
    }

    /// Copies one object from `master` to `local` storage if absent
    /// there. `path` is canonical (no upload-path prefix); the prefix
    /// is restored per side before talking to the store.
    pub async fn sync_object(&self, canonical_path: &str) -> SyncObjectOutcome {
        let local_key = restore_upload_path(canonical_path, &self.local_upload_path);
        match self.local.exists(&local_key).await {
            Ok(true) => return SyncObjectOutcome::Skipped,
            Ok(false) => {}
            Err(err) => {
                warn!(path = canonical_path, error = %err, "failed to probe local object store");
                return SyncObjectOutcome::Failed;
            }
        }

        let master_key = restore_upload_path(canonical_path, &self.master_upload_path);
        let bytes = match self.master.get(&master_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                warn!(path = canonical_path, "object missing on master store");
                return SyncObjectOutcome::Failed;
            }
            Err(err) => {
                warn!(path = canonical_path, error = %err, "failed to fetch object from master store");
                return SyncObjectOutcome::Failed;
            }
        };

        match self.local.put(&local_key, bytes).await {
            Ok(()) => SyncObjectOutcome::Success,
            Err(err) => {
                warn!(path = canonical_path, error = %err, "failed to write object to local store");
                SyncObjectOutcome::Failed
            }
        }
    }

    /// On replica apply: for every URL under the master base, ensures
    /// local presence and rewrites the payload to local URLs.
    /// Failures are logged but never fail the apply.
    pub async fn sync_content_media(&self, data: &Value) -> Value {
        let paths = extract_object_paths(data, &self.master_base_url);
        for path in paths.iter().take(self.max_files_per_sync) {
            let canonical = strip_upload_path(path, &self.master_upload_path);
            self.sync_object(&canonical).await;
        }
        if paths.len() > self.max_files_per_sync {
            warn!(
                total = paths.len(),
                limit = self.max_files_per_sync,
                "content references more media objects than the per-sync limit, remainder skipped"
            );
        }

        if self.transform_urls {
            rewrite_urls(data, &self.master_base_url, &self.local_base_url)
        } else {
            data.clone()
        }
    }

    /// On replica push: pushes any not-yet-present object to master
    /// storage and produces file records describing them.
    pub async fn prepare_for_push(&self, data: &Value) -> (Value, Vec<FileRecord>) {
        let paths = extract_object_paths(data, &self.local_base_url);
        let mut records = Vec::new();

        for path in paths.iter().take(self.max_files_per_sync) {
            let canonical = strip_upload_path(path, &self.local_upload_path);
            let local_key = restore_upload_path(&canonical, &self.local_upload_path);

            let bytes = match self.local.get(&local_key).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(err) => {
                    warn!(path = canonical, error = %err, "failed to read local object for push");
                    continue;
                }
            };

            let master_key = restore_upload_path(&canonical, &self.master_upload_path);
            match self.master.exists(&master_key).await {
                Ok(true) => {}
                Ok(false) => {
                    if let Err(err) = self.master.put(&master_key, bytes.clone()).await {
                        warn!(path = canonical, error = %err, "failed to push object to master store");
                        continue;
                    }
                }
                Err(err) => {
                    warn!(path = canonical, error = %err, "failed to probe master object store");
                    continue;
                }
            }

            records.push(file_record_for(&canonical, &bytes, &self.local_base_url));
        }

        let rewritten = if self.transform_urls {
            rewrite_urls(data, &self.local_base_url, &self.master_base_url)
        } else {
            data.clone()
        };

        (rewritten, records)
    }

    /// On the master side: creates CMS file rows for replica-provided
    /// records whose hash isn't already present locally. Returns
    /// `replicaId -> masterId`. The actual CMS write is delegated to
    /// `create_file`; this only decides which records are new.
    pub async fn process_replica_file_records<F, Fut>(
        &self,
        records: &[FileRecord],
        known_hashes: &HashMap<String, String>,
        create_file: F,
    ) -> HashMap<String, String>
    where
        F: Fn(FileRecord) -> Fut,
        Fut: std::future::Future<Output = Result<String>>,
    {
        let mut mapping = HashMap::new();
        for record in records {
            if let Some(master_id) = known_hashes.get(&record.hash) {
                mapping.insert(record.id.clone(), master_id.clone());
                continue;
            }
            match create_file(record.clone()).await {
                Ok(master_id) => {
                    mapping.insert(record.id.clone(), master_id);
                }
                Err(err) => {
                    warn!(replica_id = record.id, error = %err, "failed to create master file row");
                }
            }
        }
        mapping
    }

    /// Rewrites in-payload file references (`id` keys nested under a
    /// `file`/`media`-shaped field are CMS-specific; here we only
    /// rewrite bare string ids that match a key in `mapping`) to their
    /// master-side ids.
    pub fn update_content_file_ids(&self, data: &Value, mapping: &HashMap<String, String>) -> Value {
        rewrite_file_ids(data, mapping, 0)
    }
}

fn rewrite_file_ids(value: &Value, mapping: &HashMap<String, String>, depth: usize) -> Value {
    const MAX_DEPTH: usize = 32;
    if depth > MAX_DEPTH {
        return value.clone();
    }
    match value {
        Value::String(s) => mapping
            .get(s)
            .map(|master_id| Value::String(master_id.clone()))
            .unwrap_or_else(|| value.clone()),
        Value::Array(items) => Value::Array(
            items.iter().map(|v| rewrite_file_ids(v, mapping, depth + 1)).collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), rewrite_file_ids(v, mapping, depth + 1)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn file_record_for(canonical_path: &str, bytes: &[u8], base_url: &str) -> FileRecord {
    let hash = to_hex(&Sha256::digest(bytes));
    let name = canonical_path.rsplit('/').next().unwrap_or(canonical_path).to_string();
    let ext = name.rsplit('.').next().map(|e| format!(".{e}")).unwrap_or_default();
    let mime = mime_for_ext(&ext);

    FileRecord {
        id: hash.clone(),
        document_id: String::new(),
        name,
        hash,
        ext,
        mime: mime.to_string(),
        size: bytes.len() as f64,
        url: format!("{}/{}", base_url.trim_end_matches('/'), canonical_path),
        preview_url: None,
        width: None,
        height: None,
        formats: HashMap::new(),
        provider: Some("offsync-media".to_string()),
        provider_metadata: None,
        folder_path: None,
        alternative_text: None,
        caption: None,
    }
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

fn mime_for_ext(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        ".svg" => "image/svg+xml",
        ".pdf" => "application/pdf",
        ".mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::FakeObjectStore;
    use serde_json::json;

    fn config() -> MediaConfig {
        MediaConfig {
            enabled: true,
            master_store: offsync_config::ObjectStoreConfig {
                endpoint: String::new(),
                region: "us-east-1".into(),
                access_key: String::new(),
                secret_key: String::new(),
                bucket: "master-bucket".into(),
                base_url: "https://master.example".into(),
                upload_path: "uploads".into(),
            },
            local_store: offsync_config::ObjectStoreConfig {
                endpoint: String::new(),
                region: "us-east-1".into(),
                access_key: String::new(),
                secret_key: String::new(),
                bucket: "local-bucket".into(),
                base_url: "https://local.example".into(),
                upload_path: String::new(),
            },
            transform_urls: true,
            max_files_per_sync: 100,
            disable_full_sync: false,
        }
    }

    #[tokio::test]
    async fn sync_object_copies_from_master_when_absent_locally() {
        let master = Arc::new(FakeObjectStore::new());
        let local = Arc::new(FakeObjectStore::new());
        master.seed("uploads/img.jpg", b"bytes".to_vec());

        let mirror = MediaMirror::new(master.clone(), local.clone(), &config());
        let outcome = mirror.sync_object("img.jpg").await;
        assert_eq!(outcome, SyncObjectOutcome::Success);
        assert!(local.exists("img.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn sync_object_skips_when_already_present_locally() {
        let master = Arc::new(FakeObjectStore::new());
        let local = Arc::new(FakeObjectStore::new());
        local.seed("img.jpg", b"bytes".to_vec());

        let mirror = MediaMirror::new(master, local, &config());
        let outcome = mirror.sync_object("img.jpg").await;
        assert_eq!(outcome, SyncObjectOutcome::Skipped);
    }

    #[tokio::test]
    async fn sync_content_media_downloads_and_rewrites_urls() {
        let master = Arc::new(FakeObjectStore::new());
        let local = Arc::new(FakeObjectStore::new());
        master.seed("uploads/img.jpg", b"bytes".to_vec());

        let mirror = MediaMirror::new(master, local.clone(), &config());
        let data = json!({"url": "https://master.example/uploads/img.jpg"});
        let rewritten = mirror.sync_content_media(&data).await;

        assert_eq!(rewritten["url"], "https://local.example/img.jpg");
        assert!(local.exists("img.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn prepare_for_push_uploads_and_emits_file_records() {
        let master = Arc::new(FakeObjectStore::new());
        let local = Arc::new(FakeObjectStore::new());
        local.seed("img.jpg", b"bytes".to_vec());

        let mirror = MediaMirror::new(master.clone(), local, &config());
        let data = json!({"url": "https://local.example/img.jpg"});
        let (rewritten, records) = mirror.prepare_for_push(&data).await;

        assert_eq!(rewritten["url"], "https://master.example/uploads/img.jpg");
        assert_eq!(records.len(), 1);
        assert!(master.exists("uploads/img.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn sync_object_failure_is_reported_not_panicked() {
        let master = Arc::new(FakeObjectStore::new());
        let local = Arc::new(FakeObjectStore::new());
        let mirror = MediaMirror::new(master, local, &config());
        let outcome = mirror.sync_object("missing.jpg").await;
        assert_eq!(outcome, SyncObjectOutcome::Failed);
    }

    #[tokio::test]
    async fn full_sync_copies_every_object_under_the_master_prefix() {
        let master = Arc::new(FakeObjectStore::new());
        let local = Arc::new(FakeObjectStore::new());
        master.seed("uploads/a.jpg", b"a".to_vec());
        master.seed("uploads/b.jpg", b"b".to_vec());

        let mirror = MediaMirror::new(master, local.clone(), &config());
        let (copied, failed) = mirror.full_sync().await.unwrap();

        assert_eq!(copied, 2);
        assert_eq!(failed, 0);
        assert!(local.exists("a.jpg").await.unwrap());
        assert!(local.exists("b.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn full_sync_is_a_no_op_when_disabled() {
        let master = Arc::new(FakeObjectStore::new());
        let local = Arc::new(FakeObjectStore::new());
        master.seed("uploads/a.jpg", b"a".to_vec());

        let mut cfg = config();
        cfg.disable_full_sync = true;
        let mirror = MediaMirror::new(master, local.clone(), &cfg);
        let (copied, failed) = mirror.full_sync().await.unwrap();

        assert_eq!((copied, failed), (0, 0));
        assert!(!local.exists("a.jpg").await.unwrap());
    }
}
