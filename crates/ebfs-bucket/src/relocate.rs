//! Move: rename matching objects to new plaintext locations

use ebfs_core::BatchOp;
use ebfs_storage::ObjectStore;
use tracing::{debug, info, warn};

use crate::error::{BucketError, BucketResult, EntryFailure};
use crate::plan::Plan;
use crate::session::EncryptedBucket;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovedFile {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Default)]
pub struct MoveReport {
    pub moved: Vec<MovedFile>,
}

impl<S: ObjectStore> EncryptedBucket<S> {
    /// Move every entry matching `source` according to the batch's placement.
    ///
    /// Matches are snapshotted before the first rename. Destinations reuse
    /// known encrypted directory prefixes, and an occupied destination fails
    /// that entry with [`BucketError::AlreadyExists`].
    pub async fn move_objects(
        &mut self,
        source: &str,
        destination: &str,
    ) -> BucketResult<MoveReport> {
        self.refresh().await?;

        let plan = Plan::new(source, destination)?;
        let matched = plan.selector().select(self.cache.plain_paths());
        if matched.is_empty() {
            return Err(BucketError::NotFound(source.to_string()));
        }
        debug!(
            source = %source,
            destination = %destination,
            placement = ?plan.placement(),
            entries = matched.len(),
            "move planned"
        );

        let mut report = MoveReport::default();
        let mut failures = Vec::new();
        for from in matched {
            let to = match plan.target(&from) {
                Ok(to) => to,
                Err(e) => {
                    warn!(from = %from, error = %e, "no valid destination");
                    failures.push(EntryFailure::new(from, e));
                    continue;
                }
            };
            if to == from {
                debug!(path = %from, "already in place");
                continue;
            }
            match self.move_one(&from, &to).await {
                Ok(()) => {
                    info!(from = %from, to = %to, "moved");
                    report.moved.push(MovedFile { from, to });
                }
                Err(e) => {
                    warn!(from = %from, to = %to, error = %e, "move failed");
                    failures.push(EntryFailure::new(from, e));
                }
            }
        }

        BucketError::from_failures(BatchOp::Move, failures, plan.selector().is_single_object())?;
        Ok(report)
    }

    async fn move_one(&mut self, from: &str, to: &str) -> BucketResult<()> {
        if self.cache.lookup_existing_path(to).is_some() {
            return Err(BucketError::AlreadyExists(to.to_string()));
        }
        let Some(old_key) = self.cache.lookup_existing_path(from).map(str::to_string) else {
            return Err(BucketError::NotFound(from.to_string()));
        };

        let new_key = self.cache.encrypted_key_for(to, self.keys.encryption_key())?;
        self.store.rename(&old_key, &new_key).await?;

        self.cache.remove(from);
        self.cache.insert(new_key, to.to_string());
        Ok(())
    }
}
