//! Download: fetch, authenticate and decrypt matching objects to local files

use std::path::{Component, Path, PathBuf};

use ebfs_core::BatchOp;
use ebfs_crypto::{decrypt_stream, IV_SIZE, MAC_SIZE};
use ebfs_storage::ObjectStore;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{BucketError, BucketResult, EntryFailure};
use crate::matcher::basename;
use crate::plan::{Placement, Selector};
use crate::session::EncryptedBucket;

const BLOB_OVERHEAD: u64 = (IV_SIZE + MAC_SIZE) as u64;

#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub remote_path: String,
    pub local_path: PathBuf,
    pub bytes: u64,
}

#[derive(Debug, Default)]
pub struct DownloadReport {
    pub downloaded: Vec<DownloadedFile>,
    /// Local files left alone because one of identical size was already there
    pub skipped: Vec<PathBuf>,
}

enum Fetched {
    Written(u64),
    AlreadyPresent,
}

/// Local path for one matched entry under `dest`.
///
/// Anything but plain names below `dest` is refused, so a hostile remote path
/// can never write outside the destination.
fn local_target(
    placement: &Placement,
    single_object: bool,
    dest: &Path,
    matched: &str,
) -> BucketResult<PathBuf> {
    let rel = match placement {
        Placement::SingleRename { .. } => return Ok(dest.to_path_buf()),
        _ if single_object => basename(matched).to_string(),
        other => other.target(matched)?,
    };
    let rel = Path::new(&rel);
    let contained = rel.components().count() > 0
        && rel.components().all(|c| matches!(c, Component::Normal(_)));
    if !contained {
        return Err(BucketError::InvalidPattern {
            pattern: matched.to_string(),
            reason: "resolves outside the download destination".into(),
        });
    }
    Ok(dest.join(rel))
}

impl<S: ObjectStore> EncryptedBucket<S> {
    /// Download every object matching `remote` into `local_dest`.
    ///
    /// `local_dest` is a directory when it exists as one or ends in `/`.
    /// A literal remote path into a directory lands at its basename; directory
    /// and glob requests recreate their structure below the destination.
    pub async fn download(
        &mut self,
        remote: &str,
        local_dest: &str,
    ) -> BucketResult<DownloadReport> {
        self.refresh().await?;

        let selector = Selector::parse(remote)?;
        let matched = selector.select(self.cache.plain_paths());
        if matched.is_empty() {
            return Err(BucketError::NotFound(remote.to_string()));
        }

        let dest = self.resolve_local(Path::new(local_dest));
        let dest_is_dir = local_dest.is_empty() || local_dest.ends_with('/') || dest.is_dir();
        let placement =
            Placement::classify(&selector, remote.ends_with('/'), dest_is_dir, String::new());
        let single_object = selector.is_single_object();
        debug!(
            remote = %remote,
            dest = %dest.display(),
            ?placement,
            entries = matched.len(),
            "download planned"
        );

        let mut report = DownloadReport::default();
        let mut failures = Vec::new();
        for plain in matched {
            let Some(encrypted) = self.cache.lookup_existing_path(&plain).map(str::to_string) else {
                continue;
            };
            let fetched = match local_target(&placement, single_object, &dest, &plain) {
                Ok(local_path) => self
                    .download_one(&encrypted, &local_path)
                    .await
                    .map(|f| (local_path, f)),
                Err(e) => Err(e),
            };

            match fetched {
                Ok((local_path, Fetched::Written(bytes))) => {
                    info!(remote = %plain, path = %local_path.display(), bytes, "downloaded");
                    report.downloaded.push(DownloadedFile {
                        remote_path: plain,
                        local_path,
                        bytes,
                    });
                }
                Ok((local_path, Fetched::AlreadyPresent)) => {
                    info!(path = %local_path.display(), "already downloaded, skipping");
                    report.skipped.push(local_path);
                }
                Err(e) => {
                    warn!(remote = %plain, error = %e, "download failed");
                    failures.push(EntryFailure::new(plain, e));
                }
            }
        }

        BucketError::from_failures(BatchOp::Download, failures, single_object)?;
        Ok(report)
    }

    async fn download_one(&self, encrypted: &str, local_path: &Path) -> BucketResult<Fetched> {
        let blob_len = self.store.size(encrypted).await?;
        if let Ok(meta) = tokio::fs::metadata(local_path).await {
            if meta.is_file() && meta.len() == blob_len.saturating_sub(BLOB_OVERHEAD) {
                return Ok(Fetched::AlreadyPresent);
            }
        }

        let fetched = NamedTempFile::new()?;
        self.store.get(encrypted, fetched.path()).await?;

        let parent = match local_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&parent).await?;

        let keys = self.keys.clone();
        let dest = local_path.to_path_buf();
        // plaintext only reaches `dest` after the whole body authenticated
        let written = tokio::task::spawn_blocking(move || -> BucketResult<u64> {
            let mut blob = fetched.reopen()?;
            let mut plain = NamedTempFile::new_in(&parent)?;
            let n = decrypt_stream(&mut blob, plain.as_file_mut(), &keys)?;
            plain.persist(&dest).map_err(|e| e.error)?;
            Ok(n)
        })
        .await??;

        Ok(Fetched::Written(written))
    }
}
