//! Delete: remove matching objects, refusing whole-bucket wildcards

use ebfs_core::BatchOp;
use ebfs_storage::ObjectStore;
use tracing::{info, warn};

use crate::error::{BucketError, BucketResult, EntryFailure};
use crate::plan::Selector;
use crate::session::EncryptedBucket;

/// True for patterns that select the entire bucket: nothing but `*` and `/`
/// once trimmed, the empty pattern included.
pub fn is_destructive(pattern: &str) -> bool {
    pattern.trim().chars().all(|c| c == '*' || c == '/')
}

#[derive(Debug, Default)]
pub struct DeleteReport {
    pub deleted: Vec<String>,
}

impl<S: ObjectStore> EncryptedBucket<S> {
    /// Delete every entry matching `pattern`.
    ///
    /// Whole-bucket patterns fail with [`BucketError::RefusedDestructiveDelete`]
    /// before the store is contacted; zero matches fail with
    /// [`BucketError::NothingMatched`].
    pub async fn delete(&mut self, pattern: &str) -> BucketResult<DeleteReport> {
        if is_destructive(pattern) {
            return Err(BucketError::RefusedDestructiveDelete(pattern.to_string()));
        }

        self.refresh().await?;
        let selector = Selector::parse(pattern)?;
        let matched = selector.select(self.cache.plain_paths());
        if matched.is_empty() {
            return Err(BucketError::NothingMatched(pattern.to_string()));
        }

        let mut report = DeleteReport::default();
        let mut failures = Vec::new();
        for plain in matched {
            let Some(key) = self.cache.lookup_existing_path(&plain).map(str::to_string) else {
                continue;
            };
            match self.store.delete(&key).await {
                Ok(()) => {
                    self.cache.remove(&plain);
                    info!(path = %plain, "deleted");
                    report.deleted.push(plain);
                }
                Err(e) => {
                    warn!(path = %plain, error = %e, "delete failed");
                    failures.push(EntryFailure::new(plain, e.into()));
                }
            }
        }

        BucketError::from_failures(BatchOp::Delete, failures, selector.is_single_object())?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destructive_patterns() {
        for p in ["*", "/*", "*/*", " * ", "", "/", "**", "*/**", "/**/*", "//"] {
            assert!(is_destructive(p), "{p:?} must be refused");
        }
        for p in ["dest/*", "*.txt", "a/b", "*/x*", "?"] {
            assert!(!is_destructive(p), "{p:?} must be allowed");
        }
    }
}
