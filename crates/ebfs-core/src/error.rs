use thiserror::Error;

pub type EbfsResult<T> = Result<T, EbfsError>;

#[derive(Debug, Error)]
pub enum EbfsError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EbfsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EbfsError::NotFound(_))
    }
}
