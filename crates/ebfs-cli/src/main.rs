//! ebfs: encrypted bucket file system CLI
//!
//! Commands:
//!   init                       - create the passphrase sentinel in a new bucket
//!   status                     - show configuration and storage reachability
//!   ls [<pattern>]             - list decrypted file paths
//!   dirs [<pattern>]           - list decrypted directories
//!   upload <local> [<remote>]  - encrypt and upload a file, directory or glob
//!   download <remote> [<dir>]  - download and decrypt matching files
//!   mv <src> <dst>             - move matching files inside the bucket
//!   rm <pattern>               - delete matching files
//!   shell                      - interactive session

mod shell;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ebfs_bucket::EncryptedBucket;
use ebfs_core::config::{EbfsConfig, StorageService};
use ebfs_storage::{OpendalStore, S3Credentials};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "ebfs",
    version,
    about = "Encrypted bucket file system client",
    long_about = "ebfs: keep an encrypted file hierarchy in a plain cloud bucket. \
                  File names and bodies are encrypted before they leave this machine."
)]
struct Cli {
    /// Path to config.toml (default: ~/.config/ebfs/config.toml)
    #[arg(long, short = 'c', env = "EBFS_CONFIG")]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, ebfs_bucket=trace)
    #[arg(long, env = "EBFS_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the passphrase sentinel for a brand-new bucket
    Init,

    /// Show configuration and storage status
    Status,

    /// List files whose decrypted path matches a pattern
    Ls {
        /// Glob (`*` crosses directories), `dir/`, or a literal path
        pattern: Option<String>,
    },

    /// List directories matching a pattern
    Dirs { pattern: Option<String> },

    /// Encrypt and upload a local file, directory tree or glob
    Upload {
        /// Local path or glob
        local: String,
        /// Remote directory (default: bucket root)
        #[arg(default_value = "")]
        remote: String,
    },

    /// Download and decrypt matching files
    Download {
        /// Remote path, `dir/` or glob
        remote: String,
        /// Local destination (default: current directory)
        #[arg(default_value = ".")]
        local: String,
    },

    /// Move files inside the bucket
    Mv { source: String, destination: String },

    /// Delete matching files
    Rm { pattern: String },

    /// Interactive shell (cd, ls, dirs, upload, download, mv, rm)
    Shell,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = load_config(&config_path).await?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    init_logging(level, &config.log.format);

    config
        .validate()
        .with_context(|| format!("invalid configuration: {}", config_path.display()))?;

    if let Commands::Status = cli.command {
        return cmd_status(&config, &config_path).await;
    }

    let mut bucket = open_bucket(&config).await?;

    if let Commands::Init = cli.command {
        bucket.init_sentinel().await.context("creating sentinel")?;
        println!("created {} in bucket {}", bucket.sentinel_name(), config.storage.bucket);
        return Ok(());
    }

    bucket
        .verify_passphrase()
        .await
        .context("passphrase verification failed")?;

    match cli.command {
        Commands::Ls { pattern } => cmd_ls(&mut bucket, pattern.as_deref().unwrap_or("")).await,
        Commands::Dirs { pattern } => cmd_dirs(&mut bucket, pattern.as_deref().unwrap_or("")).await,
        Commands::Upload { local, remote } => cmd_upload(&mut bucket, &local, &remote).await,
        Commands::Download { remote, local } => cmd_download(&mut bucket, &remote, &local).await,
        Commands::Mv { source, destination } => cmd_mv(&mut bucket, &source, &destination).await,
        Commands::Rm { pattern } => cmd_rm(&mut bucket, &pattern).await,
        Commands::Shell => shell::run(&mut bucket).await,
        Commands::Init | Commands::Status => Ok(()),
    }
}

// ── Logging ───────────────────────────────────────────────────────────────────

fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

fn default_config_path() -> PathBuf {
    expand_tilde(Path::new("~/.config/ebfs/config.toml"))
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(format!("{home}/{rest}"))
    } else {
        path.to_path_buf()
    }
}

async fn load_config(path: &Path) -> Result<EbfsConfig> {
    if !path.exists() {
        anyhow::bail!(
            "config file not found: {}\n\
             Create one with at least:\n\
             \t[storage]\n\tbucket = \"my-bucket\"\n\
             \t[crypto]\n\tproject_id = \"my-project\"",
            path.display()
        );
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config: {}", path.display()))?;
    EbfsConfig::from_toml(&content).with_context(|| format!("parsing config: {}", path.display()))
}

// ── Session bootstrap ─────────────────────────────────────────────────────────

/// S3 credentials from AWS_* (or EBFS_*) environment variables.
fn credentials_from_env() -> Option<S3Credentials> {
    let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
        .or_else(|_| std::env::var("EBFS_ACCESS_KEY_ID"))
        .ok()?;
    let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
        .or_else(|_| std::env::var("EBFS_SECRET_ACCESS_KEY"))
        .ok()?;
    Some(S3Credentials {
        access_key_id,
        secret_access_key,
    })
}

fn build_store(config: &EbfsConfig) -> Result<OpendalStore> {
    let credentials = credentials_from_env();
    if config.storage.service == StorageService::S3 && credentials.is_none() {
        anyhow::bail!(
            "S3 credentials not set\n\
             Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables.\n\
             Example:\n\
             \texport AWS_ACCESS_KEY_ID=your-key\n\
             \texport AWS_SECRET_ACCESS_KEY=your-secret"
        );
    }
    let op = ebfs_storage::build_from_core_config(&config.storage, credentials.as_ref())
        .context("building storage operator")?;
    Ok(OpendalStore::new(op).with_etag_md5(config.storage.etag_is_md5))
}

fn read_passphrase() -> Result<SecretString> {
    if let Ok(p) = std::env::var("EBFS_PASSPHRASE") {
        return Ok(SecretString::from(p));
    }
    let p = rpassword::prompt_password("Passphrase: ").context("reading passphrase")?;
    Ok(SecretString::from(p))
}

async fn open_bucket(config: &EbfsConfig) -> Result<EncryptedBucket<OpendalStore>> {
    let store = build_store(config)?;
    let passphrase = read_passphrase()?;
    let crypto = config.crypto.clone();

    let pb = make_spinner("unlock");
    pb.set_message("deriving keys...");
    // Argon2id is CPU- and memory-bound
    let bucket =
        tokio::task::spawn_blocking(move || EncryptedBucket::unlock(store, &crypto, &passphrase))
            .await
            .context("key derivation task")?
            .context("deriving keys")?;
    pb.finish_and_clear();

    let cwd = std::env::current_dir().context("resolving current directory")?;
    Ok(bucket.with_local_root(cwd))
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub(crate) fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn enumerate_print(items: &[String]) {
    for (i, item) in items.iter().enumerate() {
        println!("{i}:\t{item}");
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

async fn cmd_status(config: &EbfsConfig, config_path: &Path) -> Result<()> {
    let store = build_store(config)?;
    let health = ebfs_storage::check_health(store.operator(), &config.crypto.sentinel_name).await;

    println!("ebfs v{}", env!("CARGO_PKG_VERSION"));
    println!("  config:   {}", config_path.display());
    println!("  service:  {:?}", config.storage.service);
    println!("  bucket:   {}", config.storage.bucket);
    println!("  root:     {}", config.storage.root);
    match &health {
        Ok(h) => {
            println!("  storage:  ok ({} entries at root)", h.root_entries);
            println!(
                "  sentinel: {} ({})",
                config.crypto.sentinel_name,
                if h.sentinel_present { "present" } else { "missing, run `ebfs init`" }
            );
        }
        Err(e) => {
            println!("  storage:  UNREACHABLE ({e:#})");
            println!("  sentinel: {}", config.crypto.sentinel_name);
        }
    }
    println!(
        "  argon2id: {} KiB, t={}, p={}",
        config.crypto.argon2_mem_cost_kib,
        config.crypto.argon2_time_cost,
        config.crypto.argon2_parallelism
    );
    Ok(())
}

pub(crate) async fn cmd_ls(
    bucket: &mut EncryptedBucket<OpendalStore>,
    pattern: &str,
) -> Result<()> {
    let files = bucket.list(pattern).await.context("listing files")?;
    enumerate_print(&files);
    Ok(())
}

pub(crate) async fn cmd_dirs(
    bucket: &mut EncryptedBucket<OpendalStore>,
    pattern: &str,
) -> Result<()> {
    let dirs = bucket.list_directories(pattern).await.context("listing directories")?;
    enumerate_print(&dirs);
    Ok(())
}

pub(crate) async fn cmd_upload(
    bucket: &mut EncryptedBucket<OpendalStore>,
    local: &str,
    remote: &str,
) -> Result<()> {
    let pb = make_spinner("upload");
    pb.set_message(format!("{local} -> /{remote}"));
    let result = bucket.upload(local, remote).await;
    pb.finish_and_clear();

    let report = result.with_context(|| format!("uploading {local}"))?;
    for file in &report.files {
        println!("uploaded: {} -> {}", file.local_path.display(), file.remote_path);
    }
    println!("{} files ({})", report.files.len(), fmt_bytes(report.bytes()));
    Ok(())
}

pub(crate) async fn cmd_download(
    bucket: &mut EncryptedBucket<OpendalStore>,
    remote: &str,
    local: &str,
) -> Result<()> {
    let pb = make_spinner("download");
    pb.set_message(remote.to_string());
    let result = bucket.download(remote, local).await;
    pb.finish_and_clear();

    let report = result.with_context(|| format!("downloading {remote}"))?;
    for file in &report.downloaded {
        println!("downloaded: {} -> {}", file.remote_path, file.local_path.display());
    }
    for path in &report.skipped {
        println!("already downloaded: {}", path.display());
    }
    Ok(())
}

pub(crate) async fn cmd_mv(
    bucket: &mut EncryptedBucket<OpendalStore>,
    source: &str,
    destination: &str,
) -> Result<()> {
    let report = bucket
        .move_objects(source, destination)
        .await
        .with_context(|| format!("moving {source} to {destination}"))?;
    for moved in &report.moved {
        println!("moved: {} -> {}", moved.from, moved.to);
    }
    Ok(())
}

pub(crate) async fn cmd_rm(
    bucket: &mut EncryptedBucket<OpendalStore>,
    pattern: &str,
) -> Result<()> {
    let report = bucket
        .delete(pattern)
        .await
        .with_context(|| format!("deleting {pattern}"))?;
    for path in &report.deleted {
        println!("deleted: {path}");
    }
    Ok(())
}
