//! Randomized path segment encryption
//!
//! Every segment is sealed with XChaCha20-Poly1305 under a fresh random nonce,
//! so encrypting the same name twice yields unrelated ciphertexts. Stable
//! directory prefixes are therefore a property of the caller's cache, never of
//! this codec.
//!
//! Segment format: `base64url-nopad([24-byte nonce][ciphertext][16-byte tag])`.
//! The URL-safe alphabet never produces `/`, so segment boundaries survive.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};
use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// Encrypt a single path segment.
pub fn encrypt_segment(plaintext: &str, key: &[u8; KEY_SIZE]) -> CryptoResult<String> {
    let cipher = XChaCha20Poly1305::new(key.into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| CryptoError::EncryptionFailed(format!("segment: {e}")))?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(URL_SAFE_NO_PAD.encode(sealed))
}

/// Decrypt a single path segment produced by [`encrypt_segment`].
pub fn decrypt_segment(segment: &str, key: &[u8; KEY_SIZE]) -> CryptoResult<String> {
    let sealed = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| CryptoError::DecryptionFailed(format!("segment is not base64url: {e}")))?;

    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::Truncated { len: sealed.len() });
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.into());

    let plaintext = cipher
        .decrypt(XNonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed("wrong key or corrupted segment".into()))?;

    String::from_utf8(plaintext)
        .map_err(|e| CryptoError::DecryptionFailed(format!("segment is not UTF-8: {e}")))
}

/// Normalize a virtual path: drop leading/trailing `/`, empty and `.` segments.
///
/// `..` segments are refused; a virtual path never climbs above the bucket root.
pub fn normalize_path(path: &str) -> CryptoResult<String> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                return Err(CryptoError::InvalidPath {
                    path: path.to_string(),
                    reason: "`..` segments are not allowed",
                })
            }
            s => segments.push(s),
        }
    }
    Ok(segments.join("/"))
}

/// Encrypt each segment of a virtual path independently, preserving order and count.
pub fn encrypt_path(path: &str, key: &[u8; KEY_SIZE]) -> CryptoResult<String> {
    let normalized = normalize_path(path)?;
    let segments = normalized
        .split('/')
        .map(|s| encrypt_segment(s, key))
        .collect::<CryptoResult<Vec<_>>>()?;
    Ok(segments.join("/"))
}

/// Decrypt an encrypted key segment-wise.
///
/// Segments equal to `sentinel` are skipped. Any other segment that fails to
/// decrypt fails the whole path.
pub fn decrypt_path(encrypted: &str, key: &[u8; KEY_SIZE], sentinel: &str) -> CryptoResult<String> {
    let mut plain = Vec::new();
    for segment in encrypted.split('/') {
        if segment == sentinel {
            continue;
        }
        let name = decrypt_segment(segment, key).map_err(|e| {
            CryptoError::DecryptionFailed(format!("failed to decrypt path {encrypted}: {e}"))
        })?;
        plain.push(name);
    }
    Ok(plain.join("/"))
}
