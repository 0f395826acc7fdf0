//! Filesystem-backed message store.
//!
//! Mirrors a bucket layout on disk: `<root>/<bucket>/<prefix>/<id>`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::StorageError;
use crate::forward::message::InboundMail;
use crate::store::traits::{MessageStore, object_key};

/// Reads raw messages written by the ingestion path to a local directory.
pub struct FsStore {
    bucket_dir: PathBuf,
    prefix: String,
}

impl FsStore {
    /// Create a store rooted at `root/bucket`, reading keys under `prefix`.
    pub fn new(root: impl AsRef<Path>, bucket: &str, prefix: &str) -> Self {
        let bucket_dir = root.as_ref().join(bucket);
        info!(path = %bucket_dir.display(), prefix = %prefix, "Message store opened");
        Self {
            bucket_dir,
            prefix: prefix.to_string(),
        }
    }

    fn path_for(&self, id: &str) -> Result<(String, PathBuf), StorageError> {
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(StorageError::InvalidKey { key: id.to_string() });
        }
        let key = object_key(&self.prefix, id);
        let path = self.bucket_dir.join(&key);
        Ok((key, path))
    }
}

#[async_trait]
impl MessageStore for FsStore {
    fn name(&self) -> &str {
        "fs"
    }

    async fn fetch(&self, id: &str) -> Result<InboundMail, StorageError> {
        let (key, path) = self.path_for(id)?;

        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound { key });
            }
            Err(e) => return Err(e.into()),
        };

        let mut inbound = InboundMail::new(id, raw);
        if let Ok(modified) = tokio::fs::metadata(&path).await.and_then(|m| m.modified()) {
            inbound = inbound.with_received_at(DateTime::<Utc>::from(modified));
        }

        debug!(key = %key, bytes = inbound.raw.len(), "Fetched stored message");
        Ok(inbound)
    }
}
