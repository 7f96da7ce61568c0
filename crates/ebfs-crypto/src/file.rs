//! Streaming AES-256-CTR + HMAC-SHA256 file body encryption
//!
//! Encrypted blob format (binary):
//! ```text
//! [16 bytes: random IV][N bytes: AES-256-CTR ciphertext][32 bytes: HMAC-SHA256 tag]
//! tag = HMAC(mac_key, IV || ciphertext)
//! ```
//!
//! The content hash returned by [`encrypt_stream`] is an MD5 over the whole
//! blob (IV, ciphertext and tag), comparable with what an object store reports
//! it received.

use std::io::{Read, Seek, SeekFrom, Write};

use aes::cipher::{KeyIvInit, StreamCipher};
use ebfs_core::ContentHash;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{trace, warn};

use crate::error::{CryptoError, CryptoResult};
use crate::keys::Keys;
use crate::{IV_SIZE, MAC_SIZE};

/// AES-256-CTR with a big-endian 128-bit counter
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

type HmacSha256 = Hmac<Sha256>;

/// I/O buffer size for streaming
pub const BUFFER_SIZE: usize = 64 * 1024;

/// Outcome of encrypting one file body
#[derive(Debug, Clone, Copy)]
pub struct EncryptSummary {
    /// Plaintext bytes consumed
    pub plaintext_len: u64,
    /// Bytes written: IV + ciphertext + tag
    pub encrypted_len: u64,
    /// MD5 over everything written
    pub content_hash: ContentHash,
}

fn new_mac(keys: &Keys) -> CryptoResult<HmacSha256> {
    <HmacSha256 as Mac>::new_from_slice(keys.mac_key())
        .map_err(|e| CryptoError::InvalidParams(format!("HMAC key: {e}")))
}

/// Fill as much of `buf` as the reader provides; returns 0 only at EOF.
fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Encrypt `reader` into `writer` with a fresh random IV.
///
/// Memory use is bounded by [`BUFFER_SIZE`] regardless of input length.
pub fn encrypt_stream<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    keys: &Keys,
) -> CryptoResult<EncryptSummary> {
    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);

    let mut cipher = Aes256Ctr::new(keys.encryption_key().into(), (&iv).into());
    let mut mac = new_mac(keys)?;
    let mut md5 = Md5::new();

    writer.write_all(&iv)?;
    mac.update(&iv);
    md5.update(iv);

    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut plaintext_len = 0u64;
    loop {
        let n = read_chunk(reader, &mut buf)?;
        if n == 0 {
            break;
        }
        let chunk = &mut buf[..n];
        cipher.apply_keystream(chunk);
        mac.update(chunk);
        md5.update(&*chunk);
        writer.write_all(chunk)?;
        plaintext_len += n as u64;
    }

    let tag = mac.finalize().into_bytes();
    writer.write_all(&tag)?;
    md5.update(tag);
    writer.flush()?;

    let content_hash = ContentHash::from_bytes(md5.finalize().into());
    trace!(plaintext_len, hash = %content_hash, "encrypted file body");

    Ok(EncryptSummary {
        plaintext_len,
        encrypted_len: plaintext_len + (IV_SIZE + MAC_SIZE) as u64,
        content_hash,
    })
}

/// Authenticate and decrypt a blob produced by [`encrypt_stream`].
///
/// The tag is verified over `IV || ciphertext` in a first pass with a
/// constant-time comparison; only then is the ciphertext decrypted into
/// `writer`. A tampered blob writes nothing and returns
/// [`CryptoError::IntegrityFailure`]. Returns the plaintext length.
pub fn decrypt_stream<R: Read + Seek, W: Write>(
    reader: &mut R,
    writer: &mut W,
    keys: &Keys,
) -> CryptoResult<u64> {
    let total = reader.seek(SeekFrom::End(0))?;
    if total < (IV_SIZE + MAC_SIZE) as u64 {
        return Err(CryptoError::Truncated { len: total as usize });
    }
    let ciphertext_len = total - (IV_SIZE + MAC_SIZE) as u64;

    reader.seek(SeekFrom::Start(0))?;
    let mut iv = [0u8; IV_SIZE];
    reader.read_exact(&mut iv)?;

    // Pass 1: authenticate
    let mut mac = new_mac(keys)?;
    mac.update(&iv);
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut remaining = ciphertext_len;
    while remaining > 0 {
        let want = remaining.min(BUFFER_SIZE as u64) as usize;
        reader.read_exact(&mut buf[..want])?;
        mac.update(&buf[..want]);
        remaining -= want as u64;
    }
    let mut expected = [0u8; MAC_SIZE];
    reader.read_exact(&mut expected)?;

    let computed = mac.finalize().into_bytes();
    if !bool::from(computed.as_slice().ct_eq(&expected)) {
        warn!("file body HMAC verification failed");
        return Err(CryptoError::IntegrityFailure);
    }

    // Pass 2: decrypt
    reader.seek(SeekFrom::Start(IV_SIZE as u64))?;
    let mut cipher = Aes256Ctr::new(keys.encryption_key().into(), (&iv).into());
    let mut remaining = ciphertext_len;
    while remaining > 0 {
        let want = remaining.min(BUFFER_SIZE as u64) as usize;
        let chunk = &mut buf[..want];
        reader.read_exact(chunk)?;
        cipher.apply_keystream(chunk);
        writer.write_all(chunk)?;
        remaining -= want as u64;
    }
    writer.flush()?;

    Ok(ciphertext_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KEY_SIZE;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn test_keys() -> Keys {
        Keys::from_bytes([0x11u8; KEY_SIZE], [0x22u8; KEY_SIZE])
    }

    fn encrypt_bytes(plaintext: &[u8], keys: &Keys) -> (Vec<u8>, EncryptSummary) {
        let mut out = Vec::new();
        let summary = encrypt_stream(&mut Cursor::new(plaintext), &mut out, keys).unwrap();
        (out, summary)
    }

    fn decrypt_bytes(blob: &[u8], keys: &Keys) -> CryptoResult<Vec<u8>> {
        let mut out = Vec::new();
        decrypt_stream(&mut Cursor::new(blob), &mut out, keys)?;
        Ok(out)
    }

    #[test]
    fn test_roundtrip() {
        let keys = test_keys();
        let (blob, _) = encrypt_bytes(b"this is a test string", &keys);
        assert_eq!(decrypt_bytes(&blob, &keys).unwrap(), b"this is a test string");
    }

    #[test]
    fn test_roundtrip_empty() {
        let keys = test_keys();
        let (blob, summary) = encrypt_bytes(b"", &keys);
        assert_eq!(blob.len(), IV_SIZE + MAC_SIZE);
        assert_eq!(summary.plaintext_len, 0);
        assert!(decrypt_bytes(&blob, &keys).unwrap().is_empty());
    }

    #[test]
    fn test_roundtrip_spans_buffers() {
        let keys = test_keys();
        let plaintext: Vec<u8> = (0u64..(BUFFER_SIZE as u64 * 3 + 17))
            .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
            .collect();
        let (blob, summary) = encrypt_bytes(&plaintext, &keys);
        assert_eq!(summary.encrypted_len as usize, blob.len());
        assert_eq!(decrypt_bytes(&blob, &keys).unwrap(), plaintext);
    }

    #[test]
    fn test_blob_layout_and_content_hash() {
        let keys = test_keys();
        let (blob, summary) = encrypt_bytes(&[0u8; 1000], &keys);

        assert_eq!(blob.len(), IV_SIZE + 1000 + MAC_SIZE);
        let digest: [u8; 16] = Md5::digest(&blob).into();
        assert_eq!(summary.content_hash, ContentHash::from_bytes(digest));
    }

    #[test]
    fn test_fresh_iv_per_encryption() {
        let keys = test_keys();
        let (a, sa) = encrypt_bytes(b"same body", &keys);
        let (b, sb) = encrypt_bytes(b"same body", &keys);
        assert_ne!(a[..IV_SIZE], b[..IV_SIZE]);
        assert_ne!(sa.content_hash, sb.content_hash);
    }

    #[test]
    fn test_tampered_ciphertext() {
        let keys = test_keys();
        let (mut blob, _) = encrypt_bytes(b"secret data", &keys);
        blob[IV_SIZE + 2] ^= 0x01;
        assert!(matches!(decrypt_bytes(&blob, &keys), Err(CryptoError::IntegrityFailure)));
    }

    #[test]
    fn test_tampered_tag() {
        let keys = test_keys();
        let (mut blob, _) = encrypt_bytes(b"secret data", &keys);
        let last = blob.len() - 1;
        blob[last] ^= 0x80;
        assert!(matches!(decrypt_bytes(&blob, &keys), Err(CryptoError::IntegrityFailure)));
    }

    #[test]
    fn test_tamper_writes_no_plaintext() {
        let keys = test_keys();
        let (mut blob, _) = encrypt_bytes(b"secret data", &keys);
        blob[0] ^= 0xFF;
        let mut out = Vec::new();
        let result = decrypt_stream(&mut Cursor::new(&blob), &mut out, &keys);
        assert!(result.is_err());
        assert!(out.is_empty(), "unverified plaintext must never be written");
    }

    #[test]
    fn test_wrong_mac_key() {
        let (blob, _) = encrypt_bytes(b"secret data", &test_keys());
        let other = Keys::from_bytes([0x11u8; KEY_SIZE], [0x33u8; KEY_SIZE]);
        assert!(matches!(decrypt_bytes(&blob, &other), Err(CryptoError::IntegrityFailure)));
    }

    #[test]
    fn test_truncated_blob() {
        let keys = test_keys();
        let result = decrypt_bytes(&[0u8; IV_SIZE + MAC_SIZE - 1], &keys);
        assert!(matches!(result, Err(CryptoError::Truncated { .. })));
    }

    #[test]
    fn test_file_backed_roundtrip() {
        let keys = test_keys();
        let mut plain = tempfile::tempfile().unwrap();
        plain.write_all(b"on-disk plaintext").unwrap();
        plain.seek(SeekFrom::Start(0)).unwrap();

        let mut enc = tempfile::tempfile().unwrap();
        encrypt_stream(&mut plain, &mut enc, &keys).unwrap();

        let mut out = Vec::new();
        let n = decrypt_stream(&mut enc, &mut out, &keys).unwrap();
        assert_eq!(n, 17);
        assert_eq!(out, b"on-disk plaintext");
    }

    proptest! {
        #[test]
        fn prop_bit_flip_detected(
            body in prop::collection::vec(any::<u8>(), 1..512),
            bit in any::<prop::sample::Index>(),
        ) {
            let keys = test_keys();
            let (mut blob, _) = encrypt_bytes(&body, &keys);
            let pos = bit.index(blob.len() * 8);
            blob[pos / 8] ^= 1 << (pos % 8);
            prop_assert!(decrypt_bytes(&blob, &keys).is_err());
        }

        #[test]
        fn prop_roundtrip(body in prop::collection::vec(any::<u8>(), 0..4096)) {
            let keys = test_keys();
            let (blob, _) = encrypt_bytes(&body, &keys);
            prop_assert_eq!(decrypt_bytes(&blob, &keys).unwrap(), body);
        }
    }
}
