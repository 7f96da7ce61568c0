//! ebfs-storage: the object-store collaborator behind an encrypted bucket

pub mod health;
pub mod operator;
pub mod store;

pub use health::{check_health, BucketHealth};
pub use operator::{build_from_core_config, build_operator, memory_operator, S3Credentials};
pub use store::{ObjectStore, OpendalStore};
