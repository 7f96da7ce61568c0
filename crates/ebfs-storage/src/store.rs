//! The object-store capability set consumed by the bucket engine
//!
//! Keys are opaque strings; bodies move through local files so arbitrarily
//! large objects never have to sit in memory.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use ebfs_core::{ContentHash, EbfsError, EbfsResult};
use futures::TryStreamExt;
use md5::{Digest, Md5};
use opendal::{ErrorKind, Metadata, Operator};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Upload chunk size for streaming writes
const WRITE_CHUNK: usize = 256 * 1024;

/// How long to wait for an asynchronous copy to become visible
const COPY_POLL_ATTEMPTS: u32 = 30;
const COPY_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// All object keys in the bucket, sorted.
    async fn list(&self) -> EbfsResult<Vec<String>>;

    /// Stored size of an object in bytes.
    async fn size(&self, key: &str) -> EbfsResult<u64>;

    /// Stream an object into a local file. Returns bytes written.
    async fn get(&self, key: &str, dest: &Path) -> EbfsResult<u64>;

    /// Upload a local file. Returns the content hash the store reports it received.
    async fn put(&self, key: &str, source: &Path) -> EbfsResult<ContentHash>;

    async fn delete(&self, key: &str) -> EbfsResult<()>;

    async fn rename(&self, src: &str, dst: &str) -> EbfsResult<()>;

    /// Read a small object fully into memory.
    async fn read(&self, key: &str) -> EbfsResult<Vec<u8>>;

    /// Write a small in-memory body.
    async fn write(&self, key: &str, body: Vec<u8>) -> EbfsResult<()>;
}

fn map_err(key: &str) -> impl FnOnce(opendal::Error) -> EbfsError + '_ {
    move |e| {
        if e.kind() == ErrorKind::NotFound {
            EbfsError::NotFound(key.to_string())
        } else {
            EbfsError::Storage(format!("{key}: {e}"))
        }
    }
}

/// Errors surfaced while draining a body stream
fn map_io_err(key: &str) -> impl FnOnce(std::io::Error) -> EbfsError + '_ {
    move |e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            EbfsError::NotFound(key.to_string())
        } else {
            EbfsError::Storage(format!("{key}: {e}"))
        }
    }
}

/// [`ObjectStore`] over any OpenDAL operator (S3, GCS, local fs, memory).
#[derive(Debug, Clone)]
pub struct OpendalStore {
    op: Operator,
    etag_is_md5: bool,
}

impl OpendalStore {
    pub fn new(op: Operator) -> Self {
        Self {
            op,
            etag_is_md5: true,
        }
    }

    /// Whether a 32-hex ETag may stand in for the body's MD5.
    ///
    /// S3 ETags are not MD5 digests under SSE-KMS or SSE-C. Disable this for
    /// such buckets, and the received hash is computed from a read-back instead.
    pub fn with_etag_md5(mut self, enabled: bool) -> Self {
        self.etag_is_md5 = enabled;
        self
    }

    /// Store backed by OpenDAL's in-memory service
    pub fn memory() -> EbfsResult<Self> {
        Ok(Self::new(crate::operator::memory_operator()?))
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    /// The hash the backend reports for `key`: `content_md5` if present, else
    /// an MD5-shaped ETag (when enabled), else an MD5 computed over the stored bytes.
    async fn received_hash(&self, key: &str, meta: &Metadata) -> EbfsResult<ContentHash> {
        if let Some(hash) = meta
            .content_md5()
            .and_then(|b64| STANDARD.decode(b64).ok())
            .and_then(|raw| ContentHash::from_slice(&raw))
        {
            return Ok(hash);
        }
        if self.etag_is_md5 {
            if let Some(hash) = meta.etag().and_then(ContentHash::from_hex) {
                return Ok(hash);
            }
        }

        debug!(key, "backend reports no MD5, hashing stored object");
        let mut stream = self
            .op
            .reader(key)
            .await
            .map_err(map_err(key))?
            .into_bytes_stream(..)
            .await
            .map_err(map_err(key))?;
        let mut md5 = Md5::new();
        while let Some(chunk) = stream.try_next().await.map_err(map_io_err(key))? {
            md5.update(&chunk);
        }
        Ok(ContentHash::from_bytes(md5.finalize().into()))
    }

    async fn wait_until_visible(&self, key: &str) -> EbfsResult<()> {
        for attempt in 0..COPY_POLL_ATTEMPTS {
            if self.op.exists(key).await.map_err(map_err(key))? {
                return Ok(());
            }
            debug!(key, attempt, "waiting for copy to be rewritten to new destination");
            tokio::time::sleep(COPY_POLL_INTERVAL).await;
        }
        Err(EbfsError::Storage(format!(
            "{key}: copy did not complete after {COPY_POLL_ATTEMPTS} attempts"
        )))
    }
}

#[async_trait]
impl ObjectStore for OpendalStore {
    async fn list(&self) -> EbfsResult<Vec<String>> {
        let entries = self
            .op
            .list_with("/")
            .recursive(true)
            .await
            .map_err(map_err("/"))?;
        let mut keys: Vec<String> = entries
            .into_iter()
            .map(|e| e.path().trim_start_matches('/').to_string())
            .filter(|p| !p.is_empty() && !p.ends_with('/'))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn size(&self, key: &str) -> EbfsResult<u64> {
        let meta = self.op.stat(key).await.map_err(map_err(key))?;
        Ok(meta.content_length())
    }

    async fn get(&self, key: &str, dest: &Path) -> EbfsResult<u64> {
        let mut stream = self
            .op
            .reader(key)
            .await
            .map_err(map_err(key))?
            .into_bytes_stream(..)
            .await
            .map_err(map_err(key))?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = stream.try_next().await.map_err(map_io_err(key))? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    async fn put(&self, key: &str, source: &Path) -> EbfsResult<ContentHash> {
        let mut file = tokio::fs::File::open(source).await?;
        let mut writer = self.op.writer(key).await.map_err(map_err(key))?;

        let mut buf = vec![0u8; WRITE_CHUNK];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write(buf[..n].to_vec()).await.map_err(map_err(key))?;
        }
        writer.close().await.map_err(map_err(key))?;

        let meta = self.op.stat(key).await.map_err(map_err(key))?;
        self.received_hash(key, &meta).await
    }

    async fn delete(&self, key: &str) -> EbfsResult<()> {
        self.op.delete(key).await.map_err(map_err(key))
    }

    async fn rename(&self, src: &str, dst: &str) -> EbfsResult<()> {
        let cap = self.op.info().full_capability();
        if cap.rename {
            return self.op.rename(src, dst).await.map_err(map_err(src));
        }
        if cap.copy {
            self.op.copy(src, dst).await.map_err(map_err(src))?;
            self.wait_until_visible(dst).await?;
        } else {
            let body = self.op.read(src).await.map_err(map_err(src))?;
            self.op.write(dst, body).await.map_err(map_err(dst))?;
        }
        self.op.delete(src).await.map_err(map_err(src))
    }

    async fn read(&self, key: &str) -> EbfsResult<Vec<u8>> {
        Ok(self.op.read(key).await.map_err(map_err(key))?.to_vec())
    }

    async fn write(&self, key: &str, body: Vec<u8>) -> EbfsResult<()> {
        self.op.write(key, body).await.map_err(map_err(key))?;
        Ok(())
    }
}
