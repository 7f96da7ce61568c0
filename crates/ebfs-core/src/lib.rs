pub mod config;
pub mod error;
pub mod types;

pub use error::{EbfsError, EbfsResult};
pub use types::{BatchOp, ContentHash};
