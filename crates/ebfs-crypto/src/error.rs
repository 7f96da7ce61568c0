use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("no passphrase or salt provided")]
    MissingSecret,

    #[error("salt is too small: {len} bytes, at least 8 needed")]
    WeakSalt { len: usize },

    #[error("invalid KDF parameters: {0}")]
    InvalidParams(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("invalid virtual path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("HMAC validation failed: file body was tampered with or the key is wrong")]
    IntegrityFailure,

    #[error("ciphertext too small to be encrypted: {len} bytes")]
    Truncated { len: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
