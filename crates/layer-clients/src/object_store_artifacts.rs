//! Artifact store backed by `object_store`.
//!
//! S3 in production, `InMemory` in tests; anything implementing
//! `ObjectStore` works.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore};
use tracing::debug;

use crate::client_traits::{ArtifactStore, ClientResult};
use crate::error::ClientError;

/// `ArtifactStore` over any `object_store` backend.
#[derive(Debug, Clone)]
pub struct ObjectStoreArtifacts {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreArtifacts {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// S3 bucket, with credentials and region taken from the `AWS_*` environment.
    pub fn s3(bucket: &str) -> ClientResult<Self> {
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| ClientError::Transport {
                operation: "configure_s3",
                message: format!("bucket {bucket}: {e}"),
            })?;
        Ok(Self::new(Arc::new(store)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }
}

fn transport(operation: &'static str, key: &str, err: object_store::Error) -> ClientError {
    ClientError::Transport {
        operation,
        message: format!("{key}: {err}"),
    }
}

#[async_trait]
impl ArtifactStore for ObjectStoreArtifacts {
    async fn put(&self, key: &str, data: &[u8]) -> ClientResult<()> {
        let path = ObjectPath::from(key);
        debug!(path = %path, size = data.len(), "uploading object");
        self.store
            .put(&path, Bytes::copy_from_slice(data).into())
            .await
            .map_err(|e| transport("put_object", key, e))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> ClientResult<Vec<u8>> {
        let path = ObjectPath::from(key);
        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(ClientError::NotFound {
                    key: key.to_string(),
                })
            }
            Err(e) => return Err(transport("get_object", key, e)),
        };
        let data = result
            .bytes()
            .await
            .map_err(|e| transport("get_object", key, e))?;
        debug!(path = %path, size = data.len(), "downloaded object");
        Ok(data.to_vec())
    }

    async fn list(&self, prefix: &str) -> ClientResult<Vec<String>> {
        let trimmed = prefix.trim_matches('/');
        let prefix_path = (!trimmed.is_empty()).then(|| ObjectPath::from(trimmed));
        let metas: Vec<ObjectMeta> = self
            .store
            .list(prefix_path.as_ref())
            .try_collect()
            .await
            .map_err(|e| transport("list_objects", prefix, e))?;
        let mut keys: Vec<String> = metas
            .into_iter()
            .map(|meta| meta.location.to_string())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
