//! Read-only listings of the decrypted namespace

use std::collections::BTreeSet;

use ebfs_storage::ObjectStore;

use crate::cache::split_parent;
use crate::error::BucketResult;
use crate::plan::Selector;
use crate::session::EncryptedBucket;

impl<S: ObjectStore> EncryptedBucket<S> {
    /// Sorted plaintext paths matching `pattern` (everything for an empty pattern).
    ///
    /// The sentinel and undecryptable objects never appear.
    pub async fn list(&mut self, pattern: &str) -> BucketResult<Vec<String>> {
        self.refresh().await?;
        let selector = Selector::parse(pattern)?;
        Ok(selector.select(self.cache.plain_paths()))
    }

    /// Sorted, de-duplicated parent directories of every file whose directory
    /// matches `pattern`. Files at the bucket root contribute nothing.
    pub async fn list_directories(&mut self, pattern: &str) -> BucketResult<Vec<String>> {
        self.refresh().await?;
        let selector = Selector::parse(pattern)?;
        let dirs: BTreeSet<&str> = self
            .cache
            .plain_paths()
            .into_iter()
            .map(|p| split_parent(p).0)
            .filter(|d| !d.is_empty() && selector.matches(d))
            .collect();
        Ok(dirs.into_iter().map(str::to_string).collect())
    }
}
