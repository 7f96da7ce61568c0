//! OpenDAL Operator factory for ebfs storage backends

use anyhow::{Context, Result};
use ebfs_core::config::{StorageConfig, StorageService};
use opendal::Operator;

/// S3 access credentials (read from the environment by the CLI)
#[derive(Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

/// Wrap a service builder with logging and retry layers.
///
/// Retries live here, in the store collaborator; the bucket engine never retries.
pub fn build_operator<B: opendal::Builder>(builder: B) -> Result<Operator> {
    let op = Operator::new(builder)
        .context("creating OpenDAL operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();
    Ok(op)
}

/// In-memory operator, used by tests and `service = "memory"`
pub fn memory_operator() -> Result<Operator> {
    Ok(Operator::new(opendal::services::Memory::default())
        .context("creating memory operator")?
        .finish())
}

/// Build an operator from ebfs-core config.
///
/// If `enforce_tls` is true and an S3 endpoint uses HTTP, this returns an error.
/// Otherwise, a warning is logged for non-HTTPS endpoints.
pub fn build_from_core_config(
    storage: &StorageConfig,
    credentials: Option<&S3Credentials>,
) -> Result<Operator> {
    match storage.service {
        StorageService::S3 => {
            if storage.endpoint.starts_with("http://") {
                if storage.enforce_tls {
                    anyhow::bail!(
                        "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                         Use an HTTPS endpoint or set storage.enforce_tls = false \
                         for local development.",
                        storage.endpoint
                    );
                }
                tracing::warn!(
                    endpoint = %storage.endpoint,
                    "S3 endpoint uses plaintext HTTP, credentials are transmitted unencrypted"
                );
            }
            let creds = credentials.context("S3 storage requires access credentials")?;
            // opendal 0.55: builders use the consuming pattern
            let builder = opendal::services::S3::default()
                .endpoint(&storage.endpoint)
                .region(&storage.region)
                .bucket(&storage.bucket)
                .root(&storage.root)
                .access_key_id(&creds.access_key_id)
                .secret_access_key(&creds.secret_access_key);
            build_operator(builder)
        }
        StorageService::Gcs => {
            let mut builder = opendal::services::Gcs::default()
                .bucket(&storage.bucket)
                .root(&storage.root);
            if let Some(path) = &storage.credential_path {
                builder = builder.credential_path(&path.to_string_lossy());
            }
            build_operator(builder)
        }
        StorageService::Fs => {
            build_operator(opendal::services::Fs::default().root(&storage.root))
        }
        StorageService::Memory => memory_operator(),
    }
}
