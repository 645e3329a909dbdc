use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

mod common;

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let script = common::write_script(&[r#"{"op": "register_user", "id": "u-1"}"#]);

    let mut cmd = Command::new(cargo_bin!("marketplace-settlement"));
    cmd.arg(script.path()).arg("--db-path").arg("some_db");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains(
            "falling back to in-memory storage",
        ))
        .stdout(predicate::str::contains("u-1,0,10000,1"));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let script = common::write_script(&[r#"{"op": "register_user", "id": "u-1"}"#]);

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    let mut cmd = Command::new(cargo_bin!("marketplace-settlement"));
    cmd.arg(script.path()).arg("--db-path").arg(&db_path);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("falling back").not())
        .stderr(predicate::str::contains("using RocksDB storage"));
}
