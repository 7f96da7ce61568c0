//! Bucket reachability check for `ebfs status`

use anyhow::{Context, Result};
use opendal::Operator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketHealth {
    /// Entries directly under the bucket root
    pub root_entries: usize,
    /// Whether the passphrase sentinel object exists
    pub sentinel_present: bool,
}

/// List the bucket root and look for the sentinel object.
pub async fn check_health(op: &Operator, sentinel: &str) -> Result<BucketHealth> {
    let entries = op.list("/").await.context("storage health check failed")?;
    let sentinel_present = op
        .exists(sentinel)
        .await
        .with_context(|| format!("checking for sentinel {sentinel}"))?;
    Ok(BucketHealth {
        root_entries: entries.iter().filter(|e| e.path() != "/").count(),
        sentinel_present,
    })
}
