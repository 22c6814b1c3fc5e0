//! The S3-compatible object store seam. A trait so the mirror
//! service can be exercised against an in-memory fake in tests, the
//! way [`offsync_bus::BusProducer`] does for the message bus.

use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use futures::StreamExt;
use offsync_config::ObjectStoreConfig;

use crate::error::{MediaError, Result};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool>;
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>>;
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<()>;
    async fn ensure_bucket(&self) -> Result<()>;
    /// Lists every object key under `prefix`, paging through the
    /// underlying store as needed. Used for the full-bucket sync pass,
    /// not the per-content incremental path.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Wraps `aws-sdk-s3` configured for a single bucket on a single
/// endpoint. Works unmodified against AWS S3, MinIO, or Alibaba OSS —
/// all three speak the S3 API once `force_path_style` and a custom
/// endpoint are set.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn connect(config: &ObjectStoreConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "offsync",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true);

        if !config.endpoint.is_empty() {
            builder = builder.endpoint_url(&config.endpoint);
        }

        let client = aws_sdk_s3::Client::from_conf(builder.build());
        Self {
            client,
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn exists(&self, path: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                {
                    Ok(false)
                } else {
                    Err(MediaError::Store(err.to_string()))
                }
            }
        }
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
        {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| MediaError::Store(e.to_string()))?
                    .into_bytes();
                Ok(Some(bytes.to_vec()))
            }
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false)
                {
                    Ok(None)
                } else {
                    Err(MediaError::Store(err.to_string()))
                }
            }
        }
    }

    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| MediaError::Store(e.to_string()))?;
        Ok(())
    }

    async fn ensure_bucket(&self) -> Result<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(_) => {
                self.client
                    .create_bucket()
                    .bucket(&self.bucket)
                    .send()
                    .await
                    .map_err(|e| MediaError::Store(e.to_string()))?;
                Ok(())
            }
        }
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| MediaError::Store(e.to_string()))?;
            for object in page.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }
        }

        Ok(keys)
    }
}

/// Strips `upload_path` from `path` if present; idempotent.
pub fn strip_upload_path(path: &str, upload_path: &str) -> String {
    if upload_path.is_empty() {
        return path.to_string();
    }
    path.strip_prefix(upload_path)
        .map(|s| s.trim_start_matches('/').to_string())
        .unwrap_or_else(|| path.to_string())
}

/// Restores `upload_path` onto `path` if absent; idempotent.
pub fn restore_upload_path(path: &str, upload_path: &str) -> String {
    if upload_path.is_empty() || path.starts_with(upload_path) {
        return path.to_string();
    }
    format!("{}/{}", upload_path.trim_end_matches('/'), path)
}

#[cfg(any(test, feature = "test-util"))]
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeObjectStore {
        pub objects: Mutex<HashMap<String, Vec<u8>>>,
        pub bucket_created: Mutex<bool>,
    }

    impl FakeObjectStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed(&self, path: &str, bytes: Vec<u8>) {
            self.objects.lock().unwrap().insert(path.to_string(), bytes);
        }
    }

    #[async_trait]
    impl ObjectStore for FakeObjectStore {
        async fn exists(&self, path: &str) -> Result<bool> {
            Ok(self.objects.lock().unwrap().contains_key(path))
        }

        async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.objects.lock().unwrap().get(path).cloned())
        }

        async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
            self.objects.lock().unwrap().insert(path.to_string(), bytes);
            Ok(())
        }

        async fn ensure_bucket(&self) -> Result<()> {
            *self.bucket_created.lock().unwrap() = true;
            Ok(())
        }

        async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
            Ok(self
                .objects
                .lock()
                .unwrap()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_and_restore_upload_path_round_trip() {
        assert_eq!(strip_upload_path("uploads/img.jpg", "uploads"), "img.jpg");
        assert_eq!(strip_upload_path("img.jpg", "uploads"), "img.jpg");
        assert_eq!(restore_upload_path("img.jpg", "uploads"), "uploads/img.jpg");
        assert_eq!(restore_upload_path("uploads/img.jpg", "uploads"), "uploads/img.jpg");
    }

    #[test]
    fn path_mapping_is_idempotent() {
        let stripped = strip_upload_path("uploads/img.jpg", "uploads");
        let stripped_again = strip_upload_path(&stripped, "uploads");
        assert_eq!(stripped, stripped_again);

        let restored = restore_upload_path("img.jpg", "uploads");
        let restored_again = restore_upload_path(&restored, "uploads");
        assert_eq!(restored, restored_again);
    }
}
