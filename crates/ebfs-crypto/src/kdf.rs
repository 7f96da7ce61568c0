//! Key derivation: Argon2id passphrase + salt → encryption key and MAC key

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::Keys;
use crate::KEY_SIZE;

/// Smallest salt accepted (64 bits)
pub const MIN_SALT_LEN: usize = 8;

/// Argon2id parameters for the KDF.
///
/// Derivation runs once per session, so the defaults stay on the expensive side.
#[derive(Debug, Clone)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// Derive the session keys from a passphrase and salt using Argon2id.
///
/// 64 bytes of output are split: the first 32 become the encryption key,
/// the last 32 the MAC key. Identical inputs always yield identical keys.
pub fn derive_keys(
    passphrase: &SecretString,
    salt: &[u8],
    params: &KdfParams,
) -> CryptoResult<Keys> {
    if passphrase.expose_secret().is_empty() || salt.is_empty() {
        return Err(CryptoError::MissingSecret);
    }
    if salt.len() < MIN_SALT_LEN {
        return Err(CryptoError::WeakSalt { len: salt.len() });
    }

    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE * 2),
    )
    .map_err(|e| CryptoError::InvalidParams(e.to_string()))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut okm = [0u8; KEY_SIZE * 2];
    argon2
        .hash_password_into(passphrase.expose_secret().as_bytes(), salt, &mut okm)
        .map_err(|e| CryptoError::InvalidParams(format!("Argon2id KDF failed: {e}")))?;

    let mut encryption = [0u8; KEY_SIZE];
    let mut mac = [0u8; KEY_SIZE];
    encryption.copy_from_slice(&okm[..KEY_SIZE]);
    mac.copy_from_slice(&okm[KEY_SIZE..]);
    okm.zeroize();

    Ok(Keys::from_bytes(encryption, mac))
}

/// Salt derived from a stable client identifier (project id or configured salt string).
pub fn salt_from_identifier(identifier: &str) -> [u8; 32] {
    Sha256::digest(identifier.as_bytes()).into()
}
