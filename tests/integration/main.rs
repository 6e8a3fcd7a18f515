//! Integration tests for cachelock

mod cache_tests {
    use cachelock::cache::{
        create_tree, exists, remove_tree, AcquireMode, EntryStore, Locker, OwnerId,
        SentinelRecord, WriteOutcome,
    };
    use cachelock::config::LockConfig;
    use std::fs;
    use tempfile::TempDir;

    fn store() -> EntryStore {
        EntryStore::new(Locker::new(LockConfig {
            timeout_ms: 2_000,
            initial_backoff_ms: 5,
            max_backoff_ms: 50,
            ..LockConfig::default()
        }))
    }

    #[test]
    fn end_to_end_through_held_handle() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("cache").join("k1");
        let entry = dir.join("entry");
        let store = store();

        create_tree(&dir).unwrap();

        let lock = store.locker().acquire(&entry, AcquireMode::Blocking).unwrap();
        let outcome = store.write_entry(&lock, b"ABC", false, true).unwrap();
        assert_eq!(outcome, WriteOutcome::Written);
        lock.release(true).unwrap();

        let (lock, existed) = store
            .locker()
            .acquire_and_check_exists(&entry, AcquireMode::Blocking)
            .unwrap();
        assert!(existed);
        lock.release(false).unwrap();

        let data = store.read_entry(&entry).unwrap();
        assert_eq!(data.bytes, b"ABC");
        assert_eq!(data.size, 3);
    }

    #[test]
    fn crashed_writer_is_recovered() {
        let temp = TempDir::new().unwrap();
        let entry = temp.path().join("entry");
        let store = store();

        // A writer that died mid-build: content without done marker, plus
        // its sentinel
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let dead_pid = child.id();
        child.wait().unwrap();
        let record = SentinelRecord {
            owner: OwnerId {
                pid: dead_pid,
                nonce: uuid::Uuid::new_v4(),
                ..OwnerId::current()
            },
            ..SentinelRecord::new()
        };
        fs::write(temp.path().join("entry.lock"), serde_json::to_vec(&record).unwrap()).unwrap();
        fs::write(&entry, b"half").unwrap();

        let (lock, existed) = store
            .locker()
            .acquire_and_check_exists(&entry, AcquireMode::Blocking)
            .unwrap();
        assert!(lock.reclaimed_stale());
        assert!(!existed);

        store.write_entry(&lock, b"whole", false, false).unwrap();
        lock.release(true).unwrap();

        assert_eq!(store.read_entry(&entry).unwrap().bytes, b"whole");
    }

    #[test]
    fn bootstrap_and_evict() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("cache");
        let store = store();

        for key in ["k1", "k2/nested"] {
            let dir = root.join(key);
            create_tree(&dir).unwrap();
            store
                .write_entry(&dir.join("entry"), b"artifact", false, false)
                .unwrap();
        }
        assert!(exists(root.join("k2/nested/entry.done")));

        remove_tree(&root).unwrap();
        assert!(!exists(&root));
    }
}

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use cachelock::cache::{AcquireMode, Locker};
    use predicates::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    /// cachelock with default config and the cache root inside `temp`
    fn cachelock(temp: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("cachelock");
        cmd.env("CACHELOCK_CONFIG", temp.path().join("config.toml"))
            .env("CACHELOCK_ROOT", temp.path().join("cache"));
        cmd
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        cachelock(&temp)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("shared compiler artifact cache"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        cachelock(&temp)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("cachelock"));
    }

    #[test]
    fn put_then_cat_roundtrip() {
        let temp = TempDir::new().unwrap();
        cachelock(&temp).args(["init", "k1"]).assert().success();

        cachelock(&temp)
            .args(["put", "k1/entry"])
            .write_stdin("ABC")
            .assert()
            .success()
            .stdout(predicate::str::contains("Wrote"));

        cachelock(&temp)
            .args(["cat", "k1/entry"])
            .assert()
            .success()
            .stdout("ABC");
    }

    #[test]
    fn put_skip_identical_reports_unchanged() {
        let temp = TempDir::new().unwrap();
        cachelock(&temp).args(["init", "k1"]).assert().success();

        for _ in 0..2 {
            cachelock(&temp)
                .args(["put", "k1/entry", "--skip-identical"])
                .write_stdin("same")
                .assert()
                .success();
        }

        cachelock(&temp)
            .args(["put", "k1/entry", "--skip-identical"])
            .write_stdin("same")
            .assert()
            .success()
            .stdout(predicate::str::contains("Unchanged"));
    }

    #[test]
    fn cat_missing_entry_fails() {
        let temp = TempDir::new().unwrap();
        cachelock(&temp).args(["init", "k1"]).assert().success();

        cachelock(&temp)
            .args(["cat", "k1/absent"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Not found"));
    }

    #[test]
    fn no_wait_against_held_lock_is_busy() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("cache").join("k1");
        fs::create_dir_all(&dir).unwrap();

        // This test process holds the lock; the CLI is another process
        let _held = Locker::default()
            .acquire(dir.join("entry"), AcquireMode::Immediate)
            .unwrap();

        cachelock(&temp)
            .args(["put", "k1/entry", "--no-wait"])
            .write_stdin("ABC")
            .assert()
            .code(75)
            .stderr(predicate::str::contains("locked by another owner"));
    }

    #[test]
    fn status_reports_state_as_json() {
        let temp = TempDir::new().unwrap();
        cachelock(&temp).args(["init", "k1"]).assert().success();
        cachelock(&temp)
            .args(["put", "k1/entry"])
            .write_stdin("ABC")
            .assert()
            .success();

        cachelock(&temp)
            .args(["status", "k1/entry", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""state": "complete""#))
            .stdout(predicate::str::contains(r#""status": "free""#));
    }

    #[test]
    fn rm_then_evict() {
        let temp = TempDir::new().unwrap();
        cachelock(&temp).args(["init", "k1"]).assert().success();
        cachelock(&temp)
            .args(["put", "k1/entry"])
            .write_stdin("ABC")
            .assert()
            .success();

        cachelock(&temp).args(["rm", "k1/entry"]).assert().success();
        cachelock(&temp).args(["rm", "k1/entry"]).assert().success();
        assert!(!temp.path().join("cache/k1/entry").exists());

        cachelock(&temp).args(["evict", "k1"]).assert().success();
        assert!(!temp.path().join("cache/k1").exists());

        // Nothing left to remove once the directory is evicted
        cachelock(&temp).args(["rm", "k1/entry"]).assert().success();
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        cachelock(&temp)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        cachelock(&temp)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[lock]"));
    }

    #[test]
    fn completions_generate() {
        let temp = TempDir::new().unwrap();
        cachelock(&temp)
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cachelock"));
    }
}
