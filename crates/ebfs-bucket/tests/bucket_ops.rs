//! Integration tests: full batch pipeline over in-memory storage
//!
//! Every test drives an `EncryptedBucket` on top of OpenDAL's memory backend,
//! with local trees staged in temp directories.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ebfs_bucket::{BucketError, EncryptedBucket};
use ebfs_core::config::CryptoConfig;
use ebfs_core::{BatchOp, ContentHash, EbfsResult};
use ebfs_crypto::{encrypt_segment, encrypt_stream, Keys, KEY_SIZE};
use ebfs_storage::{ObjectStore, OpendalStore};
use opendal::Operator;
use secrecy::SecretString;
use tempfile::TempDir;

fn memory_store() -> OpendalStore {
    let op = Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish();
    OpendalStore::new(op)
}

fn fast_crypto() -> CryptoConfig {
    CryptoConfig {
        project_id: "stuff-141918".into(),
        argon2_mem_cost_kib: 1024,
        argon2_time_cost: 1,
        argon2_parallelism: 1,
        ..Default::default()
    }
}

fn open<S: ObjectStore>(store: S, local_root: &Path) -> EncryptedBucket<S> {
    EncryptedBucket::unlock(store, &fast_crypto(), &SecretString::from("testing"))
        .expect("unlock")
        .with_local_root(local_root)
}

fn write_file(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn segments(key: &str) -> Vec<&str> {
    key.split('/').collect()
}

/// Reports a wrong received-content hash for every upload
struct CorruptingStore {
    inner: OpendalStore,
}

#[async_trait]
impl ObjectStore for CorruptingStore {
    async fn list(&self) -> EbfsResult<Vec<String>> {
        self.inner.list().await
    }
    async fn size(&self, key: &str) -> EbfsResult<u64> {
        self.inner.size(key).await
    }
    async fn get(&self, key: &str, dest: &Path) -> EbfsResult<u64> {
        self.inner.get(key, dest).await
    }
    async fn put(&self, key: &str, source: &Path) -> EbfsResult<ContentHash> {
        let real = self.inner.put(key, source).await?;
        let mut bytes = *real.as_bytes();
        bytes[0] ^= 0xFF;
        Ok(ContentHash::from_bytes(bytes))
    }
    async fn delete(&self, key: &str) -> EbfsResult<()> {
        self.inner.delete(key).await
    }
    async fn rename(&self, src: &str, dst: &str) -> EbfsResult<()> {
        self.inner.rename(src, dst).await
    }
    async fn read(&self, key: &str) -> EbfsResult<Vec<u8>> {
        self.inner.read(key).await
    }
    async fn write(&self, key: &str, body: Vec<u8>) -> EbfsResult<()> {
        self.inner.write(key, body).await
    }
}

/// Counts every store call
#[derive(Clone)]
struct CountingStore {
    inner: OpendalStore,
    calls: Arc<AtomicUsize>,
    deletes: Arc<AtomicUsize>,
    gets: Arc<AtomicUsize>,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: memory_store(),
            calls: Arc::new(AtomicUsize::new(0)),
            deletes: Arc::new(AtomicUsize::new(0)),
            gets: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for CountingStore {
    async fn list(&self) -> EbfsResult<Vec<String>> {
        self.tick();
        self.inner.list().await
    }
    async fn size(&self, key: &str) -> EbfsResult<u64> {
        self.tick();
        self.inner.size(key).await
    }
    async fn get(&self, key: &str, dest: &Path) -> EbfsResult<u64> {
        self.tick();
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key, dest).await
    }
    async fn put(&self, key: &str, source: &Path) -> EbfsResult<ContentHash> {
        self.tick();
        self.inner.put(key, source).await
    }
    async fn delete(&self, key: &str) -> EbfsResult<()> {
        self.tick();
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }
    async fn rename(&self, src: &str, dst: &str) -> EbfsResult<()> {
        self.tick();
        self.inner.rename(src, dst).await
    }
    async fn read(&self, key: &str) -> EbfsResult<Vec<u8>> {
        self.tick();
        self.inner.read(key).await
    }
    async fn write(&self, key: &str, body: Vec<u8>) -> EbfsResult<()> {
        self.tick();
        self.inner.write(key, body).await
    }
}

#[tokio::test]
async fn upload_tree_then_list() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "a/b/c.txt", b"nested content");
    let mut bucket = open(memory_store(), tmp.path());

    let report = bucket.upload("a", "dest").await.expect("upload");
    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].remote_path, "dest/a/b/c.txt");

    let listed = bucket.list("dest/*").await.unwrap();
    assert_eq!(listed, vec!["dest/a/b/c.txt"]);

    // names are encrypted, depth is preserved
    let raw = bucket.store().list().await.unwrap();
    assert_eq!(raw.len(), 1);
    assert_eq!(segments(&raw[0]).len(), 4);
    assert!(!raw[0].contains("dest"));
}

#[tokio::test]
async fn move_glob_into_directory() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "a/b/c.txt", b"nested content");
    let mut bucket = open(memory_store(), tmp.path());
    bucket.upload("a", "dest").await.unwrap();

    let report = bucket.move_objects("dest/a/*", "moved/").await.expect("move");
    assert_eq!(report.moved.len(), 1);
    assert_eq!(report.moved[0].to, "moved/b/c.txt");

    assert_eq!(bucket.list("").await.unwrap(), vec!["moved/b/c.txt"]);
}

#[tokio::test]
async fn siblings_share_encrypted_directory_prefix() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "batch/one.txt", b"1");
    write_file(tmp.path(), "batch/two.txt", b"2");
    write_file(tmp.path(), "later.txt", b"3");
    let mut bucket = open(memory_store(), tmp.path());

    bucket.upload("batch/*", "docs").await.unwrap();
    // a later batch discovers the prefix from the listing
    bucket.upload("later.txt", "docs").await.unwrap();

    let raw = bucket.store().list().await.unwrap();
    assert_eq!(raw.len(), 3);
    let prefixes: Vec<&str> = raw.iter().map(|k| segments(k)[0]).collect();
    assert!(
        prefixes.iter().all(|p| *p == prefixes[0]),
        "all files in docs/ must share one prefix"
    );

    assert_eq!(
        bucket.list("docs/*").await.unwrap(),
        vec!["docs/later.txt", "docs/one.txt", "docs/two.txt"]
    );
    assert_eq!(bucket.list_directories("").await.unwrap(), vec!["docs"]);
}

#[tokio::test]
async fn duplicate_upload_leaves_remote_untouched() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "notes.txt", b"original body");
    let mut bucket = open(memory_store(), tmp.path());
    bucket.upload("notes.txt", "").await.unwrap();
    let before = bucket.store().list().await.unwrap();

    write_file(tmp.path(), "notes.txt", b"a different, longer body");
    let err = bucket.upload("notes.txt", "").await.unwrap_err();
    assert!(matches!(err, BucketError::AlreadyExists(ref p) if p == "notes.txt"), "got {err:?}");

    assert_eq!(bucket.store().list().await.unwrap(), before);
    let out = TempDir::new().unwrap();
    bucket.download("notes.txt", &out.path().to_string_lossy()).await.unwrap();
    assert_eq!(std::fs::read(out.path().join("notes.txt")).unwrap(), b"original body");
}

#[tokio::test]
async fn duplicate_in_batch_is_partial_failure() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "set/x.txt", b"x");
    write_file(tmp.path(), "set/y.txt", b"y");
    let mut bucket = open(memory_store(), tmp.path());
    bucket.upload("set/x.txt", "").await.unwrap();

    let err = bucket.upload("set", "").await.unwrap_err();
    match &err {
        BucketError::PartialFailure { operation, failures } => {
            assert_eq!(*operation, BatchOp::Upload);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].path, "set/x.txt");
        }
        other => panic!("expected PartialFailure, got {other:?}"),
    }
    // the rest of the batch still went through
    assert_eq!(bucket.list("set/*").await.unwrap(), vec!["set/x.txt", "set/y.txt"]);
}

#[tokio::test]
async fn corrupted_upload_is_removed() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "victim.bin", &[7u8; 4096]);
    let mut bucket = open(CorruptingStore { inner: memory_store() }, tmp.path());

    let err = bucket.upload("victim.bin", "data").await.unwrap_err();
    assert!(
        matches!(err, BucketError::HashMismatch { ref path, .. } if path == "data/victim.bin"),
        "got {err:?}"
    );

    assert!(bucket.list("").await.unwrap().is_empty());
    assert!(bucket.store().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn destructive_delete_never_calls_store() {
    let tmp = TempDir::new().unwrap();
    let store = CountingStore::new();
    let mut bucket = open(store.clone(), tmp.path());

    for pattern in ["*", "/*", "*/*", "**", "*/**", "/**/*", "", "/", " * "] {
        let err = bucket.delete(pattern).await.unwrap_err();
        assert!(matches!(err, BucketError::RefusedDestructiveDelete(_)));
    }
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.deletes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn delete_matching_and_nothing_matched() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "logs/a.log", b"a");
    write_file(tmp.path(), "logs/b.log", b"b");
    write_file(tmp.path(), "keep.txt", b"k");
    let mut bucket = open(memory_store(), tmp.path());
    bucket.upload("logs", "").await.unwrap();
    bucket.upload("keep.txt", "").await.unwrap();

    let report = bucket.delete("logs/*.log").await.unwrap();
    assert_eq!(report.deleted, vec!["logs/a.log", "logs/b.log"]);
    assert_eq!(bucket.list("").await.unwrap(), vec!["keep.txt"]);

    let err = bucket.delete("logs/*").await.unwrap_err();
    assert!(matches!(err, BucketError::NothingMatched(_)));
}

#[tokio::test]
async fn download_directory_and_skip_existing() {
    let tmp = TempDir::new().unwrap();
    let big: Vec<u8> = (0u32..200_000).map(|i| (i % 253) as u8).collect();
    write_file(tmp.path(), "photos/2019/beach.jpg", &big);
    write_file(tmp.path(), "photos/cat.jpg", b"meow");
    let mut bucket = open(memory_store(), tmp.path());
    bucket.upload("photos", "").await.unwrap();

    let out = TempDir::new().unwrap();
    let dest = format!("{}/", out.path().display());
    let report = bucket.download("photos/", &dest).await.unwrap();
    assert_eq!(report.downloaded.len(), 2);
    assert_eq!(std::fs::read(out.path().join("photos/2019/beach.jpg")).unwrap(), big);
    assert_eq!(std::fs::read(out.path().join("photos/cat.jpg")).unwrap(), b"meow");

    let again = bucket.download("photos/", &dest).await.unwrap();
    assert!(again.downloaded.is_empty());
    assert_eq!(again.skipped.len(), 2);
}

#[tokio::test]
async fn download_glob_uses_remainder() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "a/b/c.txt", b"deep");
    let mut bucket = open(memory_store(), tmp.path());
    bucket.upload("a", "dest").await.unwrap();

    let out = TempDir::new().unwrap();
    bucket.download("dest/a/*", &out.path().to_string_lossy()).await.unwrap();
    assert_eq!(std::fs::read(out.path().join("b/c.txt")).unwrap(), b"deep");
}

#[tokio::test]
async fn download_missing_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let mut bucket = open(memory_store(), tmp.path());
    let err = bucket.download("nothing/*", ".").await.unwrap_err();
    assert!(matches!(err, BucketError::NotFound(_)));
}

#[tokio::test]
async fn tampered_body_fails_and_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "secret.txt", b"top secret body");
    let store = memory_store();
    let mut bucket = open(store.clone(), tmp.path());
    bucket.upload("secret.txt", "").await.unwrap();

    let key = store.list().await.unwrap().remove(0);
    let mut body = store.read(&key).await.unwrap();
    body[20] ^= 0x01;
    store.write(&key, body).await.unwrap();

    let out = TempDir::new().unwrap();
    let err = bucket
        .download("secret.txt", &out.path().to_string_lossy())
        .await
        .unwrap_err();
    assert!(matches!(err, BucketError::IntegrityFailure), "got {err:?}");
    assert!(!out.path().join("secret.txt").exists());
}

#[tokio::test]
async fn single_rename_and_refuse_overwrite() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "a.txt", b"a");
    write_file(tmp.path(), "b.txt", b"b");
    let mut bucket = open(memory_store(), tmp.path());
    bucket.upload("a.txt", "docs").await.unwrap();
    bucket.upload("b.txt", "docs").await.unwrap();

    let err = bucket.move_objects("docs/a.txt", "docs/b.txt").await.unwrap_err();
    assert!(matches!(err, BucketError::AlreadyExists(_)));

    bucket.move_objects("docs/a.txt", "docs/renamed.txt").await.unwrap();
    assert_eq!(bucket.list("").await.unwrap(), vec!["docs/b.txt", "docs/renamed.txt"]);

    // the renamed file joined the existing docs/ prefix
    let raw = bucket.store().list().await.unwrap();
    assert_eq!(segments(&raw[0])[0], segments(&raw[1])[0]);
}

#[tokio::test]
async fn move_whole_namespace_and_back() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "testdata/nested_1/inner/f1", b"1");
    write_file(tmp.path(), "testdata/nested_1/f2", b"2");
    let mut bucket = open(memory_store(), tmp.path());
    bucket.upload("testdata/nested_1/*", "").await.unwrap();
    assert_eq!(bucket.list("").await.unwrap(), vec!["f2", "inner/f1"]);

    bucket.move_objects("*", "move/").await.unwrap();
    assert_eq!(bucket.list("").await.unwrap(), vec!["move/f2", "move/inner/f1"]);

    bucket.move_objects("move/*", "/").await.unwrap();
    assert_eq!(bucket.list("").await.unwrap(), vec!["f2", "inner/f1"]);
}

#[tokio::test]
async fn listing_skips_foreign_and_sentinel_objects() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "mine.txt", b"m");
    let store = memory_store();
    let mut bucket = open(store.clone(), tmp.path());
    bucket.init_sentinel().await.unwrap();
    bucket.upload("mine.txt", "").await.unwrap();
    store.write("not-encrypted/readme", b"x".to_vec()).await.unwrap();

    assert_eq!(bucket.list("").await.unwrap(), vec!["mine.txt"]);
    assert_eq!(bucket.list("*").await.unwrap(), vec!["mine.txt"]);
}

#[tokio::test]
async fn passphrase_check_protocol() {
    let tmp = TempDir::new().unwrap();
    let store = memory_store();
    let bucket = open(store.clone(), tmp.path());

    assert!(matches!(
        bucket.verify_passphrase().await,
        Err(BucketError::SentinelMissing { .. })
    ));
    bucket.init_sentinel().await.unwrap();
    bucket.verify_passphrase().await.expect("same passphrase verifies");

    let intruder = EncryptedBucket::unlock(store, &fast_crypto(), &SecretString::from("wrong"))
        .unwrap()
        .with_local_root(tmp.path());
    assert!(matches!(
        intruder.verify_passphrase().await,
        Err(BucketError::WrongPassphrase)
    ));
}

#[tokio::test]
async fn list_directories_filters_by_pattern() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "music/rock/a.mp3", b"a");
    write_file(tmp.path(), "music/jazz/b.mp3", b"b");
    write_file(tmp.path(), "top.txt", b"t");
    let mut bucket = open(memory_store(), tmp.path());
    bucket.upload("music", "").await.unwrap();
    bucket.upload("top.txt", "").await.unwrap();

    assert_eq!(
        bucket.list_directories("").await.unwrap(),
        vec!["music/jazz", "music/rock"]
    );
    assert_eq!(bucket.list_directories("*rock").await.unwrap(), vec!["music/rock"]);
}

#[tokio::test]
async fn move_subtree_keeps_directory_structure() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "x/one.txt", b"1");
    write_file(tmp.path(), "x/sub/two.txt", b"2");
    write_file(tmp.path(), "xylophone.txt", b"3");
    let mut bucket = open(memory_store(), tmp.path());
    bucket.upload("x", "").await.unwrap();
    bucket.upload("xylophone.txt", "").await.unwrap();

    let report = bucket.move_objects("x/", "y/").await.expect("move");
    assert_eq!(report.moved.len(), 2);

    assert_eq!(
        bucket.list("").await.unwrap(),
        vec!["xylophone.txt", "y/x/one.txt", "y/x/sub/two.txt"]
    );
    assert_eq!(bucket.list_directories("y/*").await.unwrap(), vec!["y/x", "y/x/sub"]);
}

#[tokio::test]
async fn download_exact_path_to_new_file_name() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "docs/a.txt", b"alpha");
    let mut bucket = open(memory_store(), tmp.path());
    bucket.upload("docs/a.txt", "").await.unwrap();

    let out = TempDir::new().unwrap();
    let target = out.path().join("copy.txt");
    let report = bucket
        .download("docs/a.txt", &target.to_string_lossy())
        .await
        .unwrap();

    assert_eq!(report.downloaded.len(), 1);
    assert_eq!(report.downloaded[0].local_path, target);
    assert_eq!(std::fs::read(&target).unwrap(), b"alpha");
    assert!(!out.path().join("a.txt").exists());
    assert!(!out.path().join("copy.txt/a.txt").exists());
}

#[tokio::test]
async fn names_with_glob_metacharacters_are_literal() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "report[1].txt", b"r");
    write_file(tmp.path(), "d/what?.txt", b"q");
    write_file(tmp.path(), "d/a[1].txt", b"bracketed");
    write_file(tmp.path(), "d/a1.txt", b"plain");
    let mut bucket = open(memory_store(), tmp.path());
    bucket.upload("report[1].txt", "").await.unwrap();
    bucket.upload("d", "").await.unwrap();

    assert_eq!(
        bucket.list("").await.unwrap(),
        vec!["d/a1.txt", "d/a[1].txt", "d/what?.txt", "report[1].txt"]
    );
    assert_eq!(bucket.list("d/a[1].txt").await.unwrap(), vec!["d/a[1].txt"]);
    assert_eq!(bucket.list("d/what?*").await.unwrap(), vec!["d/what?.txt"]);

    bucket.move_objects("d/what?.txt", "renamed.txt").await.unwrap();
    let report = bucket.delete("d/a[1].txt").await.unwrap();
    assert_eq!(report.deleted, vec!["d/a[1].txt"]);

    assert_eq!(
        bucket.list("").await.unwrap(),
        vec!["d/a1.txt", "renamed.txt", "report[1].txt"]
    );
}

#[tokio::test]
async fn present_file_is_skipped_without_fetching() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "big.bin", &[9u8; 50_000]);
    let store = CountingStore::new();
    let mut bucket = open(store.clone(), tmp.path());
    bucket.upload("big.bin", "").await.unwrap();

    let out = TempDir::new().unwrap();
    let dest = format!("{}/", out.path().display());
    bucket.download("big.bin", &dest).await.unwrap();
    assert_eq!(store.gets.load(Ordering::SeqCst), 1);

    let again = bucket.download("big.bin", &dest).await.unwrap();
    assert_eq!(again.skipped, vec![out.path().join("big.bin")]);
    assert_eq!(store.gets.load(Ordering::SeqCst), 1, "skip must not fetch the body");
}

#[tokio::test]
async fn hostile_remote_name_cannot_escape_destination() {
    let tmp = TempDir::new().unwrap();
    write_file(tmp.path(), "good.txt", b"fine");
    let store = memory_store();
    let keys = Keys::from_bytes([0x11; KEY_SIZE], [0x22; KEY_SIZE]);
    let mut bucket = EncryptedBucket::new(store.clone(), keys.clone()).with_local_root(tmp.path());
    bucket.upload("good.txt", "").await.unwrap();

    // written by another client that never normalized its paths
    let hostile = ["..", "..", "escape", "evil.txt"]
        .iter()
        .map(|s| encrypt_segment(s, keys.encryption_key()).unwrap())
        .collect::<Vec<_>>()
        .join("/");
    let mut blob = Vec::new();
    encrypt_stream(&mut &b"payload"[..], &mut blob, &keys).unwrap();
    store.write(&hostile, blob).await.unwrap();

    let out = TempDir::new().unwrap();
    let dest = out.path().join("a/b");
    std::fs::create_dir_all(&dest).unwrap();
    let err = bucket
        .download("*", &format!("{}/", dest.display()))
        .await
        .unwrap_err();

    match &err {
        BucketError::PartialFailure { operation, failures } => {
            assert_eq!(*operation, BatchOp::Download);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].path, "../../escape/evil.txt");
        }
        other => panic!("expected PartialFailure, got {other:?}"),
    }
    assert_eq!(std::fs::read(dest.join("good.txt")).unwrap(), b"fine");
    assert!(!out.path().join("escape").exists());
    assert!(!dest.join("escape").exists());
}
