use ebfs_core::{BatchOp, ContentHash, EbfsError};
use ebfs_crypto::CryptoError;
use thiserror::Error;

pub type BucketResult<T> = Result<T, BucketError>;

#[derive(Debug, Error)]
pub enum BucketError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("file body failed HMAC verification: tampered object or wrong key")]
    IntegrityFailure,

    #[error("{0} already exists, not overwriting")]
    AlreadyExists(String),

    #[error(
        "uploaded object for {path} is corrupt \
         (expected {expected}, store received {actual}), removed"
    )]
    HashMismatch {
        path: String,
        expected: ContentHash,
        actual: ContentHash,
    },

    #[error("no file matching {0} found")]
    NotFound(String),

    #[error("nothing matched {0}")]
    NothingMatched(String),

    #[error("refusing destructive delete of {0:?}")]
    RefusedDestructiveDelete(String),

    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error(
        "no {marker_name:?} object found; if this is a new bucket, \
         run `ebfs init` or create {marker_name:?} containing: {marker}"
    )]
    SentinelMissing { marker_name: String, marker: String },

    #[error("failed to verify the bucket is using the supplied passphrase")]
    WrongPassphrase,

    #[error("{operation} failed for {}: {}", count(.failures), summarize(.failures))]
    PartialFailure {
        operation: BatchOp,
        failures: Vec<EntryFailure>,
    },

    #[error(transparent)]
    Store(#[from] EbfsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One entry of a batch that did not complete
#[derive(Debug)]
pub struct EntryFailure {
    pub path: String,
    pub error: BucketError,
}

impl EntryFailure {
    pub fn new(path: impl Into<String>, error: BucketError) -> Self {
        Self {
            path: path.into(),
            error,
        }
    }
}

fn count(failures: &[EntryFailure]) -> String {
    match failures.len() {
        1 => "1 entry".to_string(),
        n => format!("{n} entries"),
    }
}

fn summarize(failures: &[EntryFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.path, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<CryptoError> for BucketError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::MissingSecret
            | CryptoError::WeakSalt { .. }
            | CryptoError::InvalidParams(_) => BucketError::Configuration(e.to_string()),
            CryptoError::IntegrityFailure => BucketError::IntegrityFailure,
            CryptoError::EncryptionFailed(msg) => BucketError::EncryptionFailed(msg),
            CryptoError::InvalidPath { path, reason } => BucketError::InvalidPattern {
                pattern: path,
                reason: reason.to_string(),
            },
            CryptoError::DecryptionFailed(msg) => BucketError::DecryptionFailed(msg),
            CryptoError::Truncated { .. } => BucketError::DecryptionFailed(e.to_string()),
            CryptoError::Io(io) => BucketError::Io(io),
        }
    }
}

impl From<tokio::task::JoinError> for BucketError {
    fn from(e: tokio::task::JoinError) -> Self {
        BucketError::Io(std::io::Error::other(e))
    }
}

impl BucketError {
    /// Fold per-entry failures into a batch result.
    ///
    /// A batch that addressed exactly one object surfaces that object's error
    /// unwrapped.
    pub(crate) fn from_failures(
        operation: BatchOp,
        mut failures: Vec<EntryFailure>,
        single_object: bool,
    ) -> BucketResult<()> {
        if failures.is_empty() {
            return Ok(());
        }
        if single_object && failures.len() == 1 {
            if let Some(only) = failures.pop() {
                return Err(only.error);
            }
        }
        Err(BucketError::PartialFailure {
            operation,
            failures,
        })
    }

    /// The per-entry failures of a [`BucketError::PartialFailure`], empty otherwise
    pub fn failures(&self) -> &[EntryFailure] {
        match self {
            BucketError::PartialFailure { failures, .. } => failures,
            _ => &[],
        }
    }
}
