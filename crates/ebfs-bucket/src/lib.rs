//! ebfs-bucket: an encrypted virtual file hierarchy over a flat object store
//!
//! Batch pipeline, run once per operation:
//! ```text
//! list ──► decrypt every key ──► DirectoryCache ──► Selector (match)
//!                                                   ──► Placement (target)
//!                                                   ──► store call per entry
//!                                                   ──► cache reconcile
//! ```

pub mod cache;
pub mod delete;
pub mod download;
pub mod error;
pub mod list;
pub mod matcher;
pub mod plan;
pub mod relocate;
pub mod session;
pub mod upload;

pub use cache::DirectoryCache;
pub use delete::DeleteReport;
pub use download::{DownloadReport, DownloadedFile};
pub use error::{BucketError, BucketResult, EntryFailure};
pub use matcher::{relative_remainder, GlobMatcher};
pub use plan::{Placement, Plan, Selector};
pub use relocate::{MoveReport, MovedFile};
pub use session::{EncryptedBucket, PASSPHRASE_MARKER};
pub use upload::{LocalSource, UploadReport, UploadedFile};
