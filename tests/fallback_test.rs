use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

fn commands() -> tempfile::NamedTempFile {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "type, name, from, to, currency, amount").unwrap();
    writeln!(csv, "open, alice, , , USD,").unwrap();
    writeln!(csv, "deposit, , , 1, USD, 100.0").unwrap();
    csv
}

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let csv = commands();

    let mut cmd = Command::new(cargo_bin!("payments-ledger"));
    cmd.arg(csv.path()).arg("--db-path").arg("some_db");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."))
        .stdout(predicate::str::contains("1,alice,USD,100\n"));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let csv = commands();

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    let mut cmd = Command::new(cargo_bin!("payments-ledger"));
    cmd.arg(csv.path()).arg("--db-path").arg(&db_path);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING").not());
}

#[cfg(not(feature = "lock-redis"))]
#[test]
fn test_redis_fallback_warning() {
    let csv = commands();

    let mut cmd = Command::new(cargo_bin!("payments-ledger"));
    cmd.arg(csv.path())
        .arg("--redis-url")
        .arg("redis://127.0.0.1:6379");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING: Distributed locking requested via --redis-url, but 'lock-redis' feature is not enabled. Falling back to In-Process locks."))
        .stdout(predicate::str::contains("1,alice,USD,100\n"));
}
