//! Per-batch directory cache
//!
//! Path segments are encrypted with a fresh nonce every time, so two uploads
//! into the same plaintext directory would otherwise land under two unrelated
//! encrypted prefixes. The cache remembers, for every plaintext directory seen
//! in the remote listing (or created earlier in the batch), the encrypted
//! prefix already used for it, and new keys are built on top of that prefix.
//!
//! Three hash indices are kept in lockstep:
//! ```text
//! by_plain     : plaintext path      -> encrypted key
//! by_encrypted : encrypted key       -> plaintext path
//! dirs         : plaintext directory -> encrypted directory prefix (every ancestor)
//! ```
//! Directory prefixes outlive the last file that used them; the prefix is
//! still a valid encryption of that directory and reusing it keeps the
//! namespace unified.

use std::collections::HashMap;

use ebfs_crypto::{
    decrypt_path, encrypt_path, encrypt_segment, normalize_path, CryptoResult, KEY_SIZE,
};
use tracing::{debug, warn};

/// Bidirectional encrypted-key / plaintext-path index, rebuilt at each batch start
#[derive(Debug, Default)]
pub struct DirectoryCache {
    by_plain: HashMap<String, String>,
    by_encrypted: HashMap<String, String>,
    dirs: HashMap<String, String>,
}

/// Split `a/b/c` into (`a/b`, `c`); a root-level name has an empty parent.
pub(crate) fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    }
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a full remote listing.
    ///
    /// Keys equal to the sentinel and keys that fail to decrypt are skipped
    /// with a warning. Returns the number of entries indexed.
    pub fn populate<I>(&mut self, remote_keys: I, key: &[u8; KEY_SIZE], sentinel: &str) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        self.clear();
        let mut skipped = 0usize;
        for encrypted in remote_keys {
            if encrypted == sentinel {
                continue;
            }
            match decrypt_path(&encrypted, key, sentinel) {
                Ok(plain) if !plain.is_empty() => {
                    if !self.insert(encrypted.clone(), plain) {
                        debug!(key = %encrypted, "duplicate path in listing, keeping first");
                    }
                }
                Ok(_) => skipped += 1,
                Err(e) => {
                    warn!(key = %encrypted, error = %e, "skipping undecryptable object");
                    skipped += 1;
                }
            }
        }
        debug!(entries = self.len(), skipped, dirs = self.dirs.len(), "directory cache populated");
        self.len()
    }

    /// Index one entry. Returns false (and changes nothing) when either the
    /// plaintext path or the encrypted key is already indexed.
    pub fn insert(&mut self, encrypted: String, plain: String) -> bool {
        if self.by_plain.contains_key(&plain) || self.by_encrypted.contains_key(&encrypted) {
            return false;
        }

        let enc_segments: Vec<&str> = encrypted.split('/').collect();
        let plain_segments: Vec<&str> = plain.split('/').collect();
        if enc_segments.len() == plain_segments.len() {
            for depth in 1..plain_segments.len() {
                self.dirs
                    .entry(plain_segments[..depth].join("/"))
                    .or_insert_with(|| enc_segments[..depth].join("/"));
            }
        } else {
            debug!(key = %encrypted, "segment count differs, not indexing its directories");
        }

        self.by_encrypted.insert(encrypted.clone(), plain.clone());
        self.by_plain.insert(plain, encrypted);
        true
    }

    /// Drop a plaintext path, returning its encrypted key.
    pub fn remove(&mut self, plain: &str) -> Option<String> {
        let encrypted = self.by_plain.remove(plain)?;
        self.by_encrypted.remove(&encrypted);
        Some(encrypted)
    }

    pub fn clear(&mut self) {
        self.by_plain.clear();
        self.by_encrypted.clear();
        self.dirs.clear();
    }

    pub fn len(&self) -> usize {
        self.by_plain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_plain.is_empty()
    }

    pub fn lookup_existing_path(&self, plain: &str) -> Option<&str> {
        self.by_plain.get(plain).map(String::as_str)
    }

    /// The encrypted prefix already used for `directory`, if any entry lives under it.
    pub fn find_reusable_directory_prefix(&self, directory: &str) -> Option<&str> {
        if directory.is_empty() {
            return None;
        }
        self.dirs.get(directory).map(String::as_str)
    }

    /// Deepest known ancestor of `directory` (itself included) and its encrypted prefix.
    pub fn deepest_known_ancestor<'a>(&self, directory: &'a str) -> Option<(&'a str, &str)> {
        let mut candidate = directory;
        while !candidate.is_empty() {
            if let Some(prefix) = self.find_reusable_directory_prefix(candidate) {
                return Some((candidate, prefix));
            }
            candidate = split_parent(candidate).0;
        }
        None
    }

    /// Build the encrypted key for a new plaintext path.
    ///
    /// Reuses the encrypted prefix of the deepest known ancestor directory and
    /// freshly encrypts only the segments below it.
    pub fn encrypted_key_for(&self, plain: &str, key: &[u8; KEY_SIZE]) -> CryptoResult<String> {
        let target = normalize_path(plain)?;
        let (parent, leaf) = split_parent(&target);

        match self.deepest_known_ancestor(parent) {
            Some((ancestor, prefix)) if ancestor == parent => {
                debug!(dir = %parent, "reusing encrypted directory prefix");
                Ok(format!("{prefix}/{}", encrypt_segment(leaf, key)?))
            }
            Some((ancestor, prefix)) => {
                let below = &target[ancestor.len() + 1..];
                debug!(dir = %parent, ancestor = %ancestor, "reusing encrypted ancestor prefix");
                Ok(format!("{prefix}/{}", encrypt_path(below, key)?))
            }
            None => encrypt_path(&target, key),
        }
    }

    /// All indexed plaintext paths, sorted.
    pub fn plain_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.by_plain.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}
