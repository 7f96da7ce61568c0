use serde::{Deserialize, Serialize};
use std::fmt;

/// MD5 digest of an encrypted blob, as computed locally or reported by the store.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    pub const LEN: usize = 16;

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Build from a slice, `None` unless it is exactly 16 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 16]>::try_from(bytes).ok().map(Self)
    }

    /// Parse a 32-character hex digest (an S3 single-part ETag, for example).
    pub fn from_hex(s: &str) -> Option<Self> {
        let trimmed = s.trim_matches('"');
        if trimmed.len() != Self::LEN * 2 {
            return None;
        }
        hex::decode(trimmed).ok().and_then(|b| Self::from_slice(&b))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// The batch operations exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOp {
    Upload,
    Download,
    Move,
    Delete,
}

impl fmt::Display for BatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchOp::Upload => "upload",
            BatchOp::Download => "download",
            BatchOp::Move => "move",
            BatchOp::Delete => "delete",
        };
        f.write_str(name)
    }
}
