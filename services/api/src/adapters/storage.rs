//! services/api/src/adapters/storage.rs
//!
//! A filesystem-backed `ObjectStorage`. Objects are written under a root
//! directory and served back by the web router at `public_base_url`.

use async_trait::async_trait;
use bytes::Bytes;
use learning_space_core::ports::{ObjectStorage, PortError, PortResult, StoredObject};
use std::path::{Component, Path, PathBuf};
use tracing::info;

#[derive(Clone, Debug)]
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `path` below the root. Absolute paths and `..` are refused.
    fn resolve(&self, path: &str) -> PortResult<PathBuf> {
        let relative = Path::new(path);
        let clean = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if path.is_empty() || !clean {
            return Err(PortError::Validation(format!("invalid object path '{}'", path)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn put(&self, path: &str, content_type: &str, data: Bytes) -> PortResult<StoredObject> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PortError::Unexpected(format!("could not create {}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&target, &data)
            .await
            .map_err(|e| PortError::Unexpected(format!("could not write {}: {}", target.display(), e)))?;
        info!(path, content_type, bytes = data.len(), "Stored object");

        Ok(StoredObject {
            path: path.to_string(),
            public_url: format!("{}/{}", self.public_base_url, path),
        })
    }
}
