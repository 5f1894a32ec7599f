use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

fn instructions() -> tempfile::NamedTempFile {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "type,connector,reference,amount,asset,target,mode").unwrap();
    writeln!(csv, "transfer,sandbox,pi_1,100,EUR/2,,").unwrap();
    csv
}

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let csv = instructions();

    let mut cmd = Command::new(cargo_bin!("pi-engine"));
    cmd.arg(csv.path()).arg("--db-path").arg("some_db");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let csv = instructions();

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    let mut cmd = Command::new(cargo_bin!("pi-engine"));
    cmd.arg(csv.path()).arg("--db-path").arg(&db_path);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING").not())
        .stdout(predicate::str::contains("sandbox:pi_1,"));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_rerun_does_not_duplicate_the_ledger() {
    let csv = instructions();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    for _ in 0..2 {
        let mut cmd = Command::new(cargo_bin!("pi-engine"));
        cmd.arg(csv.path()).arg("--db-path").arg(&db_path);

        cmd.assert()
            .success()
            .stdout(predicate::str::contains("sandbox:pi_1,").count(2));
    }
}
