use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{EbfsError, EbfsResult};

/// Name of the unencrypted object used for passphrase verification
pub const DEFAULT_SENTINEL_NAME: &str = "keycheck";

/// Top-level client configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EbfsConfig {
    pub storage: StorageConfig,
    pub crypto: CryptoConfig,
    pub log: LogConfig,
}

/// Which OpenDAL service backs the bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageService {
    S3,
    Gcs,
    Fs,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend service (default: s3)
    pub service: StorageService,
    /// S3 endpoint (ignored for gcs/fs/memory)
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket name
    pub bucket: String,
    /// Root directory inside the bucket, or the local directory for `fs`
    pub root: String,
    /// GCS service-account credential file
    pub credential_path: Option<PathBuf>,
    /// Enforce HTTPS for S3 connections (error on HTTP endpoints)
    pub enforce_tls: bool,
    /// Treat 32-hex ETags as the body's MD5 (disable for SSE-KMS / SSE-C buckets)
    pub etag_is_md5: bool,
}

/// Key derivation and sentinel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Stable project/account identifier; its SHA-256 is the default salt
    pub project_id: String,
    /// Explicit salt string (hashed with SHA-256 before use)
    pub salt: Option<String>,
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
    /// Object name of the passphrase sentinel
    pub sentinel_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: warn)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            service: StorageService::S3,
            endpoint: "https://s3.amazonaws.com".into(),
            region: "us-east-1".into(),
            bucket: String::new(),
            root: "/".into(),
            credential_path: None,
            enforce_tls: true,
            etag_is_md5: true,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            salt: None,
            argon2_mem_cost_kib: 65536,
            argon2_time_cost: 3,
            argon2_parallelism: 4,
            sentinel_name: DEFAULT_SENTINEL_NAME.into(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}

impl CryptoConfig {
    /// The string the salt is derived from: the explicit salt, else the project id.
    pub fn salt_source(&self) -> EbfsResult<&str> {
        let source = self.salt.as_deref().unwrap_or(&self.project_id);
        if source.is_empty() {
            return Err(EbfsError::Config(
                "no salt configured and crypto.project_id is empty".into(),
            ));
        }
        Ok(source)
    }
}

impl EbfsConfig {
    /// Parse a TOML document.
    pub fn from_toml(s: &str) -> EbfsResult<Self> {
        toml::from_str(s).map_err(|e| EbfsError::Config(format!("parsing config: {e}")))
    }

    /// Check the fields the client cannot start without.
    pub fn validate(&self) -> EbfsResult<()> {
        if self.storage.bucket.is_empty() && self.storage.service != StorageService::Memory {
            return Err(EbfsError::Config("'storage.bucket' not set in config file".into()));
        }
        if self.crypto.project_id.is_empty() {
            return Err(EbfsError::Config("'crypto.project_id' not set in config file".into()));
        }
        if self.crypto.sentinel_name.is_empty() || self.crypto.sentinel_name.contains('/') {
            return Err(EbfsError::Config(format!(
                "invalid crypto.sentinel_name: {:?}",
                self.crypto.sentinel_name
            )));
        }
        self.crypto.salt_source()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[storage]
service = "gcs"
bucket = "my-bucket"
root = "/vault"
credential_path = "/home/user/.gcloud/sa.json"
etag_is_md5 = false

[crypto]
project_id = "stuff-141918"
salt = "pepper-and-salt"
argon2_mem_cost_kib = 131072
argon2_time_cost = 4
argon2_parallelism = 8

[log]
level = "debug"
format = "json"
"#;
        let config = EbfsConfig::from_toml(toml_str).unwrap();

        assert_eq!(config.storage.service, StorageService::Gcs);
        assert_eq!(config.storage.bucket, "my-bucket");
        assert_eq!(config.storage.root, "/vault");
        assert!(!config.storage.etag_is_md5);
        assert_eq!(config.crypto.argon2_mem_cost_kib, 131072);
        assert_eq!(config.crypto.salt_source().unwrap(), "pepper-and-salt");
        assert_eq!(config.log.format, "json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_defaults() {
        let config = EbfsConfig::from_toml("").unwrap();

        assert_eq!(config.storage.service, StorageService::S3);
        assert_eq!(config.storage.region, "us-east-1");
        assert!(config.storage.enforce_tls);
        assert!(config.storage.etag_is_md5);
        assert_eq!(config.crypto.argon2_mem_cost_kib, 65536);
        assert_eq!(config.crypto.argon2_time_cost, 3);
        assert_eq!(config.crypto.sentinel_name, DEFAULT_SENTINEL_NAME);
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn test_salt_defaults_to_project_id() {
        let config = EbfsConfig::from_toml(
            r#"
[crypto]
project_id = "project-42"
"#,
        )
        .unwrap();
        assert_eq!(config.crypto.salt_source().unwrap(), "project-42");
    }

    #[test]
    fn test_validate_missing_bucket() {
        let config = EbfsConfig::from_toml(
            r#"
[crypto]
project_id = "p"
"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("storage.bucket"));
    }

    #[test]
    fn test_validate_missing_project() {
        let config = EbfsConfig::from_toml(
            r#"
[storage]
bucket = "b"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_memory_service_needs_no_bucket() {
        let config = EbfsConfig::from_toml(
            r#"
[storage]
service = "memory"

[crypto]
project_id = "p"
"#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let mut config = EbfsConfig::default();
        config.storage.bucket = "roundtrip".into();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = EbfsConfig::from_toml(&toml_str).unwrap();

        assert_eq!(parsed.storage.bucket, "roundtrip");
        assert_eq!(parsed.crypto.sentinel_name, config.crypto.sentinel_name);
    }
}
