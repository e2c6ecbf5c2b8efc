//! End-to-end command integration tests.
//!
//! Each case runs the full pipeline (listing, filtering, comparing,
//! submitting, result aggregation) against an in-memory object store and a
//! temporary local tree.

use chrono::{Duration, Utc};
use objsync::config::{Command, Parameters, SyncOptions};
use objsync::results::CommandResult;
use objsync::store::{ListPage, MemoryObjectStore, ObjectInfo, ObjectStore, SeedObject, StoreError};
use objsync::transfer::ExtraArgs;
use objsync::transfer::{PooledTransferManager, TransferConfig};
use objsync::ui::{CapturedOutput, SharedOutput};
use objsync::ActionArchitecture;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

// ═══════════════════════════════════════════════════════════
// Test Helpers
// ═══════════════════════════════════════════════════════════

struct Run {
    result: CommandResult,
    out: CapturedOutput,
    err: CapturedOutput,
}

fn store() -> Arc<MemoryObjectStore> {
    Arc::new(MemoryObjectStore::new().with_bucket("bucket"))
}

fn run(store: &Arc<MemoryObjectStore>, command: Command, src: &str, dest: Option<&str>, options: SyncOptions) -> Run {
    let params = Parameters::new(command, src, dest, options).expect("valid parameters");
    let tm = PooledTransferManager::new(TransferConfig::default()).expect("create transfer manager");
    let (out, out_captured) = SharedOutput::capture();
    let (err, err_captured) = SharedOutput::capture();
    let result = ActionArchitecture::new(params, store.clone(), Arc::new(tm))
        .with_output(out, err)
        .run();
    Run {
        result,
        out: out_captured,
        err: err_captured,
    }
}

fn sync(store: &Arc<MemoryObjectStore>, src: &str, dest: &str, options: SyncOptions) -> Run {
    run(store, Command::Sync, src, Some(dest), options)
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}

fn no_progress() -> SyncOptions {
    SyncOptions {
        no_progress: true,
        ..SyncOptions::default()
    }
}

// ═══════════════════════════════════════════════════════════
// Uploads
// ═══════════════════════════════════════════════════════════

#[test]
fn test_new_file_is_uploaded_once() {
    let src = TempDir::new().expect("create src tempdir");
    fs::write(src.path().join("a.txt"), b"hello").expect("write source file");
    let store = store();

    let first = sync(&store, &path_str(src.path()), "s3://bucket/prefix/", no_progress());

    assert_eq!(first.result, CommandResult::default());
    assert_eq!(store.body("bucket", "prefix/a.txt"), Some(b"hello".to_vec()));
    assert_eq!(store.calls().put, 1);
    let out = first.out.contents();
    assert!(out.contains("upload: "), "unexpected output: {}", out);
    assert!(out.contains(" to s3://bucket/prefix/a.txt"));
    assert!(first.err.contents().is_empty());
}

#[test]
fn test_sync_is_idempotent() {
    let src = TempDir::new().expect("create src tempdir");
    fs::create_dir_all(src.path().join("nested")).expect("create nested dir");
    fs::write(src.path().join("root.txt"), b"root").expect("write root");
    fs::write(src.path().join("nested").join("inner.txt"), b"inner").expect("write inner");
    let store = store();
    let src_path = path_str(src.path());

    sync(&store, &src_path, "s3://bucket/", no_progress());
    let puts = store.calls().put;
    assert_eq!(puts, 2);

    let second = sync(&store, &src_path, "s3://bucket/", no_progress());
    assert_eq!(second.result, CommandResult::default());
    assert_eq!(store.calls().put, puts);
    assert!(!second.out.contents().contains("upload:"));
}

#[test]
fn test_local_order_matches_key_order() {
    // "a-b" sorts before "a/x" as a key; a naive directory walk would not.
    let src = TempDir::new().expect("create src tempdir");
    fs::create_dir_all(src.path().join("a")).expect("create dir a");
    fs::write(src.path().join("a").join("x"), b"x").expect("write a/x");
    fs::write(src.path().join("a-b"), b"ab").expect("write a-b");
    fs::write(src.path().join("b"), b"b").expect("write b");
    let store = store();
    let src_path = path_str(src.path());

    sync(&store, &src_path, "s3://bucket/", no_progress());
    assert_eq!(store.keys("bucket"), vec!["a-b", "a/x", "b"]);

    let options = SyncOptions {
        delete: true,
        ..no_progress()
    };
    let again = sync(&store, &src_path, "s3://bucket/", options);
    assert_eq!(again.result, CommandResult::default());
    assert_eq!(store.calls().delete, 0);
    assert_eq!(store.calls().put, 3);
}

#[test]
fn test_size_only_skips_same_size_files() {
    let src = TempDir::new().expect("create src tempdir");
    fs::write(src.path().join("same.txt"), b"12345").expect("write source");
    let store = store();
    store.seed(
        "bucket",
        "same.txt",
        SeedObject::new(b"abcde".to_vec()).modified_at(Utc::now() - Duration::days(30)),
    );
    let src_path = path_str(src.path());

    let options = SyncOptions {
        size_only: true,
        ..no_progress()
    };
    sync(&store, &src_path, "s3://bucket/", options);
    assert_eq!(store.calls().put, 0);

    sync(&store, &src_path, "s3://bucket/", no_progress());
    assert_eq!(store.calls().put, 1);
    assert_eq!(store.body("bucket", "same.txt"), Some(b"12345".to_vec()));
}

#[test]
fn test_excluded_files_are_not_uploaded() {
    let src = TempDir::new().expect("create src tempdir");
    fs::write(src.path().join("keep.txt"), b"keep").expect("write keep");
    fs::write(src.path().join("drop.log"), b"drop").expect("write drop");
    fs::write(src.path().join("important.log"), b"important").expect("write important");
    let store = store();

    let options = SyncOptions {
        filters: vec![
            objsync::filter::FilterPattern::exclude("*.log"),
            objsync::filter::FilterPattern::include("important.log"),
        ],
        ..no_progress()
    };
    sync(&store, &path_str(src.path()), "s3://bucket/", options);

    assert_eq!(store.keys("bucket"), vec!["important.log", "keep.txt"]);
}

#[test]
fn test_move_removes_local_source() {
    let src = TempDir::new().expect("create src tempdir");
    let file = src.path().join("moved.txt");
    fs::write(&file, b"moving").expect("write source");
    let store = store();

    let moved = run(&store, Command::Mv, &path_str(&file), Some("s3://bucket/dir/"), no_progress());

    assert_eq!(moved.result, CommandResult::default());
    assert!(!file.exists());
    assert_eq!(store.body("bucket", "dir/moved.txt"), Some(b"moving".to_vec()));
    assert!(moved.out.contents().contains("move: "));
}

// ═══════════════════════════════════════════════════════════
// Downloads
// ═══════════════════════════════════════════════════════════

#[test]
fn test_recursive_download_then_sync_is_noop() {
    let dest = TempDir::new().expect("create dest tempdir");
    let store = store();
    store.seed("bucket", "data/one.txt", SeedObject::new(b"one".to_vec()));
    store.seed("bucket", "data/sub/two.txt", SeedObject::new(b"two".to_vec()));
    let target = path_str(&dest.path().join("out"));

    let copied = run(
        &store,
        Command::Cp,
        "s3://bucket/data/",
        Some(&target),
        SyncOptions {
            recursive: true,
            ..no_progress()
        },
    );
    assert_eq!(copied.result, CommandResult::default());
    assert_eq!(fs::read(dest.path().join("out").join("one.txt")).expect("read one"), b"one");
    assert_eq!(
        fs::read(dest.path().join("out").join("sub").join("two.txt")).expect("read two"),
        b"two"
    );

    let gets = store.calls().get;
    let synced = sync(&store, "s3://bucket/data/", &target, no_progress());
    assert_eq!(synced.result, CommandResult::default());
    assert_eq!(store.calls().get, gets);
}

#[test]
fn test_download_escaping_root_is_warned() {
    let dest = TempDir::new().expect("create dest tempdir");
    let store = store();
    store.seed("bucket", "p/../secret.txt", SeedObject::new(b"secret".to_vec()));
    store.seed("bucket", "p/ok.txt", SeedObject::new(b"ok".to_vec()));
    let target = path_str(&dest.path().join("out"));

    let copied = run(
        &store,
        Command::Cp,
        "s3://bucket/p/",
        Some(&target),
        SyncOptions {
            recursive: true,
            ..no_progress()
        },
    );

    assert_eq!(copied.result.num_tasks_failed, 0);
    assert_eq!(copied.result.num_tasks_warned, 1);
    assert!(copied
        .err
        .contents()
        .contains("warning: Skipping file ../secret.txt. File references a parent directory."));
    assert!(!dest.path().join("secret.txt").exists());
    assert!(dest.path().join("out").join("ok.txt").exists());
}

#[test]
fn test_missing_object_is_fatal() {
    let dest = TempDir::new().expect("create dest tempdir");
    let store = store();

    let copied = run(
        &store,
        Command::Cp,
        "s3://bucket/nope.txt",
        Some(&path_str(&dest.path().join("nope.txt"))),
        no_progress(),
    );

    assert_eq!(copied.result.num_tasks_failed, 1);
    assert!(copied
        .err
        .contents()
        .contains("fatal error: Key \"nope.txt\" does not exist"));
}

// ═══════════════════════════════════════════════════════════
// Deletes
// ═══════════════════════════════════════════════════════════

#[test]
fn test_dry_run_delete_touches_nothing() {
    let store = store();
    store.seed("bucket", "k/one", SeedObject::new(b"1".to_vec()));
    store.seed("bucket", "k/two", SeedObject::new(b"2".to_vec()));

    let removed = run(
        &store,
        Command::Rm,
        "s3://bucket/k/",
        None,
        SyncOptions {
            recursive: true,
            dryrun: true,
            ..SyncOptions::default()
        },
    );

    assert_eq!(removed.result, CommandResult::default());
    assert_eq!(store.calls().delete, 0);
    let out = removed.out.contents();
    assert!(out.contains("(dryrun) delete: s3://bucket/k/one"));
    assert!(out.contains("(dryrun) delete: s3://bucket/k/two"));
}

#[test]
fn test_recursive_rm_deletes_prefix() {
    let store = store();
    store.seed("bucket", "k/", SeedObject::new(Vec::new()));
    store.seed("bucket", "k/one", SeedObject::new(b"1".to_vec()));
    store.seed("bucket", "other", SeedObject::new(b"o".to_vec()));

    let removed = run(
        &store,
        Command::Rm,
        "s3://bucket/k/",
        None,
        SyncOptions {
            recursive: true,
            ..no_progress()
        },
    );

    assert_eq!(removed.result, CommandResult::default());
    assert_eq!(store.keys("bucket"), vec!["other"]);
}

#[test]
fn test_sync_delete_on_local_destination() {
    let dest = TempDir::new().expect("create dest tempdir");
    fs::write(dest.path().join("stale.txt"), b"stale").expect("write stale");
    let store = store();
    store.seed("bucket", "fresh.txt", SeedObject::new(b"fresh".to_vec()));

    let synced = sync(
        &store,
        "s3://bucket/",
        &path_str(dest.path()),
        SyncOptions {
            delete: true,
            ..no_progress()
        },
    );

    assert_eq!(synced.result, CommandResult::default());
    assert!(!dest.path().join("stale.txt").exists());
    assert_eq!(fs::read(dest.path().join("fresh.txt")).expect("read fresh"), b"fresh");
    assert!(synced.out.contents().contains("delete: "));
}

#[test]
fn test_failed_transfer_is_counted() {
    let src = TempDir::new().expect("create src tempdir");
    fs::write(src.path().join("bad.txt"), b"bad").expect("write bad");
    fs::write(src.path().join("good.txt"), b"good").expect("write good");
    let store = store();
    store.fail_on("bucket", "bad.txt");

    let synced = sync(&store, &path_str(src.path()), "s3://bucket/", no_progress());

    assert_eq!(synced.result.num_tasks_failed, 1);
    assert!(synced.err.contents().contains("upload failed: "));
    assert_eq!(store.body("bucket", "good.txt"), Some(b"good".to_vec()));
}

/// Delegates to a memory store but panics on every upload.
struct PanicOnPut(Arc<MemoryObjectStore>);

impl ObjectStore for PanicOnPut {
    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
        page_size: usize,
    ) -> Result<ListPage, StoreError> {
        self.0.list_objects(bucket, prefix, continuation, page_size)
    }

    fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo, StoreError> {
        self.0.head_object(bucket, key)
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.0.get_object(bucket, key)
    }

    fn put_object(&self, _: &str, key: &str, _: Vec<u8>, _: &ExtraArgs) -> Result<(), StoreError> {
        panic!("put of {} exploded", key);
    }

    fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        bucket: &str,
        key: &str,
        args: &ExtraArgs,
    ) -> Result<(), StoreError> {
        self.0.copy_object(source_bucket, source_key, bucket, key, args)
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.0.delete_object(bucket, key)
    }
}

#[test]
fn test_panicking_upload_is_counted_as_failure() {
    let src = TempDir::new().expect("create src tempdir");
    fs::write(src.path().join("a.txt"), b"a").expect("write source");
    let params = Parameters::new(Command::Sync, &path_str(src.path()), Some("s3://bucket/"), no_progress())
        .expect("valid parameters");
    let tm = PooledTransferManager::new(TransferConfig::default()).expect("create transfer manager");
    let (out, _out_captured) = SharedOutput::capture();
    let (err, err_captured) = SharedOutput::capture();

    let result = ActionArchitecture::new(params, Arc::new(PanicOnPut(store())), Arc::new(tm))
        .with_output(out, err)
        .run();

    assert_eq!(result.num_tasks_failed, 1);
    let err = err_captured.contents();
    assert!(err.contains("upload failed: "), "unexpected stderr: {}", err);
    assert!(err.contains("put of a.txt exploded"));
}
