//! Session key pair: encryption key + independent MAC key

use zeroize::Zeroize;

use crate::KEY_SIZE;

/// The two 256-bit keys derived once per session. Zeroized on drop.
#[derive(Clone)]
pub struct Keys {
    encryption: [u8; KEY_SIZE],
    mac: [u8; KEY_SIZE],
}

impl Keys {
    pub fn from_bytes(encryption: [u8; KEY_SIZE], mac: [u8; KEY_SIZE]) -> Self {
        Self { encryption, mac }
    }

    /// Key for path segments and file-body CTR encryption
    pub fn encryption_key(&self) -> &[u8; KEY_SIZE] {
        &self.encryption
    }

    /// Key for the file-body HMAC
    pub fn mac_key(&self) -> &[u8; KEY_SIZE] {
        &self.mac
    }
}

impl Drop for Keys {
    fn drop(&mut self) {
        self.encryption.zeroize();
        self.mac.zeroize();
    }
}

impl std::fmt::Debug for Keys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keys")
            .field("encryption", &"[REDACTED]")
            .field("mac", &"[REDACTED]")
            .finish()
    }
}
