//! The encrypted bucket session: keys, store handle and per-batch cache

use std::path::{Path, PathBuf};

use ebfs_core::config::{CryptoConfig, DEFAULT_SENTINEL_NAME};
use ebfs_crypto::{
    decrypt_segment, derive_keys, encrypt_segment, salt_from_identifier, KdfParams, Keys,
};
use ebfs_storage::ObjectStore;
use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::cache::DirectoryCache;
use crate::error::{BucketError, BucketResult};

/// Plaintext sealed into the sentinel object
pub const PASSPHRASE_MARKER: &str = "keyCheck";

/// A client session over one bucket.
///
/// Keys are derived once and live as long as the session. Every batch
/// operation starts by rebuilding the [`DirectoryCache`] from a fresh remote
/// listing, so the cache never outlives the batch that built it.
pub struct EncryptedBucket<S: ObjectStore> {
    pub(crate) store: S,
    pub(crate) keys: Keys,
    pub(crate) sentinel: String,
    pub(crate) local_root: PathBuf,
    pub(crate) cache: DirectoryCache,
}

impl<S: ObjectStore> EncryptedBucket<S> {
    pub fn new(store: S, keys: Keys) -> Self {
        Self {
            store,
            keys,
            sentinel: DEFAULT_SENTINEL_NAME.to_string(),
            local_root: PathBuf::from("."),
            cache: DirectoryCache::new(),
        }
    }

    /// Derive the session keys from a passphrase and the `[crypto]` config.
    pub fn unlock(
        store: S,
        crypto: &CryptoConfig,
        passphrase: &SecretString,
    ) -> BucketResult<Self> {
        let source = crypto
            .salt_source()
            .map_err(|e| BucketError::Configuration(e.to_string()))?;
        let salt = salt_from_identifier(source);
        let params = KdfParams {
            mem_cost_kib: crypto.argon2_mem_cost_kib,
            time_cost: crypto.argon2_time_cost,
            parallelism: crypto.argon2_parallelism,
        };
        debug!(
            mem_cost_kib = params.mem_cost_kib,
            time_cost = params.time_cost,
            "deriving session keys"
        );
        let keys = derive_keys(passphrase, &salt, &params)?;
        Ok(Self::new(store, keys).with_sentinel(&crypto.sentinel_name))
    }

    pub fn with_sentinel(mut self, name: &str) -> Self {
        self.sentinel = name.to_string();
        self
    }

    /// Directory that relative local paths resolve against
    pub fn with_local_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.local_root = root.into();
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sentinel_name(&self) -> &str {
        &self.sentinel
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    /// The cache as left by the most recent batch
    pub fn cache(&self) -> &DirectoryCache {
        &self.cache
    }

    /// List the bucket and rebuild the directory cache.
    pub async fn refresh(&mut self) -> BucketResult<usize> {
        let remote = self.store.list().await?;
        Ok(self
            .cache
            .populate(remote, self.keys.encryption_key(), &self.sentinel))
    }

    pub(crate) fn resolve_local(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.local_root.join(path)
        }
    }

    /// A freshly randomized encryption of [`PASSPHRASE_MARKER`].
    pub fn sealed_marker(&self) -> BucketResult<String> {
        Ok(encrypt_segment(PASSPHRASE_MARKER, self.keys.encryption_key())?)
    }

    /// Check the session key against the sentinel object.
    pub async fn verify_passphrase(&self) -> BucketResult<()> {
        let body = match self.store.read(&self.sentinel).await {
            Ok(body) => body,
            Err(e) if e.is_not_found() => {
                return Err(BucketError::SentinelMissing {
                    marker_name: self.sentinel.clone(),
                    marker: self.sealed_marker()?,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let sealed = String::from_utf8_lossy(&body);
        match decrypt_segment(sealed.trim(), self.keys.encryption_key()) {
            Ok(plain) if plain == PASSPHRASE_MARKER => {
                debug!("passphrase verified against sentinel");
                Ok(())
            }
            Ok(_) | Err(_) => {
                warn!(sentinel = %self.sentinel, "sentinel did not decrypt to the marker");
                Err(BucketError::WrongPassphrase)
            }
        }
    }

    /// Create the sentinel object for a brand-new bucket.
    pub async fn init_sentinel(&self) -> BucketResult<()> {
        match self.store.read(&self.sentinel).await {
            Ok(_) => return Err(BucketError::AlreadyExists(self.sentinel.clone())),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        let marker = self.sealed_marker()?;
        self.store.write(&self.sentinel, marker.into_bytes()).await?;
        info!(sentinel = %self.sentinel, "created passphrase sentinel");
        Ok(())
    }
}
