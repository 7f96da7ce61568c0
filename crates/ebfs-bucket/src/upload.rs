//! Upload: encrypt local files into the bucket under directory-reusing keys

use std::path::{Component, Path, PathBuf};

use ebfs_core::{BatchOp, ContentHash};
use ebfs_crypto::{encrypt_stream, normalize_path};
use ebfs_storage::ObjectStore;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{BucketError, BucketResult, EntryFailure};
use crate::matcher::{has_wildcard, to_glob_syntax};
use crate::plan::join_virtual;
use crate::session::EncryptedBucket;

/// One local file scheduled for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSource {
    pub path: PathBuf,
    /// `/`-separated structure recreated under the remote directory
    pub relative: String,
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub bytes: u64,
    pub content_hash: ContentHash,
}

#[derive(Debug, Default)]
pub struct UploadReport {
    pub files: Vec<UploadedFile>,
}

impl UploadReport {
    pub fn bytes(&self) -> u64 {
        self.files.iter().map(|f| f.bytes).sum()
    }
}

/// Render a relative local path with `/` separators.
fn to_virtual(rel: &Path) -> BucketResult<String> {
    let mut segments = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(s) => segments.push(s.to_str().ok_or_else(|| {
                BucketError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("not valid UTF-8: {}", rel.display()),
                ))
            })?),
            Component::CurDir => {}
            _ => {
                return Err(BucketError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("path escapes its upload root: {}", rel.display()),
                )))
            }
        }
    }
    Ok(segments.join("/"))
}

/// Every regular file at or below `path`, relative to `anchor`.
fn collect_files(path: &Path, anchor: &Path, out: &mut Vec<LocalSource>) -> BucketResult<()> {
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(anchor).unwrap_or(entry.path());
        out.push(LocalSource {
            path: entry.path().to_path_buf(),
            relative: to_virtual(rel)?,
        });
    }
    Ok(())
}

/// Directory made of the pattern's segments before the first wildcard.
fn literal_base(pattern: &Path) -> PathBuf {
    pattern
        .components()
        .take_while(|c| !has_wildcard(&c.as_os_str().to_string_lossy()))
        .collect()
}

impl<S: ObjectStore> EncryptedBucket<S> {
    /// Resolve a local path or glob into the files it names.
    ///
    /// Relative structure is kept against the session's local root for
    /// literal paths (against the parent directory for paths outside it),
    /// and against the pattern's literal base directory for globs.
    pub fn resolve_local_sources(&self, local: &str) -> BucketResult<Vec<LocalSource>> {
        let requested = self.resolve_local(Path::new(local));
        let mut sources = Vec::new();

        if has_wildcard(local) {
            let base = literal_base(&requested);
            let syntax = to_glob_syntax(&requested.to_string_lossy());
            let paths = ::glob::glob(&syntax).map_err(|e| BucketError::InvalidPattern {
                pattern: local.to_string(),
                reason: e.to_string(),
            })?;
            for matched in paths {
                let matched = matched.map_err(|e| BucketError::Io(e.into()))?;
                collect_files(&matched, &base, &mut sources)?;
            }
        } else {
            if !requested.exists() {
                return Err(BucketError::NotFound(local.to_string()));
            }
            let literal = Path::new(local);
            let inside_root = if literal.is_absolute() {
                requested.starts_with(&self.local_root)
            } else {
                !literal.components().any(|c| matches!(c, Component::ParentDir))
            };
            let anchor = if inside_root {
                self.local_root.clone()
            } else {
                requested.parent().map(Path::to_path_buf).unwrap_or_default()
            };
            collect_files(&requested, &anchor, &mut sources)?;
        }

        sources.sort_by(|a, b| a.path.cmp(&b.path));
        sources.dedup_by(|a, b| a.path == b.path);
        Ok(sources)
    }

    /// Upload every file named by `local` (path, directory or glob) below `remote_dir`.
    ///
    /// Entries whose plaintext target already exists fail with
    /// [`BucketError::AlreadyExists`] and the rest of the batch continues.
    pub async fn upload(&mut self, local: &str, remote_dir: &str) -> BucketResult<UploadReport> {
        let remote_dir = normalize_path(remote_dir)?;
        let sources = self.resolve_local_sources(local)?;
        if sources.is_empty() {
            return Err(BucketError::NotFound(local.to_string()));
        }
        let single_object = sources.len() == 1
            && !has_wildcard(local)
            && self.resolve_local(Path::new(local)).is_file();

        self.refresh().await?;

        let mut report = UploadReport::default();
        let mut failures = Vec::new();
        for source in sources {
            let target = join_virtual(&remote_dir, &source.relative)?;
            match self.upload_one(&source.path, &target).await {
                Ok(file) => report.files.push(file),
                Err(e) => {
                    warn!(
                        path = %source.path.display(),
                        remote = %target,
                        error = %e,
                        "upload failed"
                    );
                    failures.push(EntryFailure::new(target, e));
                }
            }
        }

        BucketError::from_failures(BatchOp::Upload, failures, single_object)?;
        Ok(report)
    }

    async fn upload_one(&mut self, local: &Path, target: &str) -> BucketResult<UploadedFile> {
        if self.cache.lookup_existing_path(target).is_some() {
            return Err(BucketError::AlreadyExists(target.to_string()));
        }

        let keys = self.keys.clone();
        let source = local.to_path_buf();
        // dropping the temp file removes the encrypted copy on every exit path
        let (encrypted, summary) = tokio::task::spawn_blocking(move || -> BucketResult<_> {
            let mut input = std::fs::File::open(&source)?;
            let mut encrypted = NamedTempFile::new()?;
            let summary = encrypt_stream(&mut input, encrypted.as_file_mut(), &keys)?;
            Ok((encrypted, summary))
        })
        .await??;
        debug!(path = %local.display(), hash = %summary.content_hash, "encrypted file body");

        let key = self.cache.encrypted_key_for(target, self.keys.encryption_key())?;
        let received = self.store.put(&key, encrypted.path()).await?;
        drop(encrypted);

        if received != summary.content_hash {
            warn!(
                remote = %target,
                expected = %summary.content_hash,
                actual = %received,
                "store received a corrupt copy, removing it"
            );
            if let Err(e) = self.store.delete(&key).await {
                warn!(key = %key, error = %e, "failed to remove corrupt upload");
            }
            return Err(BucketError::HashMismatch {
                path: target.to_string(),
                expected: summary.content_hash,
                actual: received,
            });
        }

        self.cache.insert(key, target.to_string());
        info!(path = %local.display(), remote = %target, bytes = summary.plaintext_len, "uploaded");
        Ok(UploadedFile {
            local_path: local.to_path_buf(),
            remote_path: target.to_string(),
            bytes: summary.plaintext_len,
            content_hash: summary.content_hash,
        })
    }
}
