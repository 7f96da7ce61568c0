//! ebfs-crypto: client-side encryption for encrypted buckets
//!
//! Key material:
//! ```text
//! passphrase + salt ──Argon2id──► 64 bytes
//!                                  ├── encryption key (32) : path segments + file bodies
//!                                  └── MAC key (32)        : HMAC-SHA256 over file bodies
//! ```
//!
//! Path segments: XChaCha20-Poly1305, random nonce per call, base64url.
//! File bodies:   `IV(16) || AES-256-CTR ciphertext || HMAC-SHA256(IV || ciphertext)(32)`

pub mod error;
pub mod file;
pub mod kdf;
pub mod keys;
pub mod names;

pub use error::{CryptoError, CryptoResult};
pub use file::{decrypt_stream, encrypt_stream, EncryptSummary};
pub use kdf::{derive_keys, salt_from_identifier, KdfParams};
pub use keys::Keys;
pub use names::{decrypt_path, decrypt_segment, encrypt_path, encrypt_segment, normalize_path};

/// Size of each derived key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of the AES-CTR initialization vector prefixed to file bodies
pub const IV_SIZE: usize = 16;

/// Size of the trailing HMAC-SHA256 tag on file bodies
pub const MAC_SIZE: usize = 32;
