#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;
use tierhash::admin::{open_table, AdminOpenOptions};
use tierhash::primitives::concurrency::LockState;
use tierhash::types::SegmentIndex;

struct Fixture {
    dir: TempDir,
    db: PathBuf,
}

impl Fixture {
    fn config(&self) -> PathBuf {
        self.dir.path().join("cli.toml")
    }
}

fn setup_db(name: &str) -> Fixture {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join(format!("{name}.th"));
    let fixture = Fixture { dir, db };
    cargo_bin_cmd!("tierhash")
        .arg("--config")
        .arg(fixture.config())
        .args([
            "create",
            "--segments",
            "4",
            "--entries-per-tier",
            "2",
            "--tiers-per-bulk",
            "2",
            "--seed",
            "99",
        ])
        .arg(&fixture.db)
        .assert()
        .success();
    fixture
}

fn put(fixture: &Fixture, key: &str, value: &str) {
    cargo_bin_cmd!("tierhash")
        .arg("--config")
        .arg(fixture.config())
        .arg("put")
        .arg("--db")
        .arg(&fixture.db)
        .args([key, value])
        .assert()
        .success();
}

fn json_of(fixture: &Fixture, args: &[&str], db: &Path) -> Value {
    let output = cargo_bin_cmd!("tierhash")
        .arg("--config")
        .arg(fixture.config())
        .args(["--format", "json"])
        .args(args)
        .arg(db)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("valid json")
}

#[test]
fn put_then_get_prints_the_value() {
    let fx = setup_db("kv");
    for i in 0..12 {
        put(&fx, &format!("key{i}"), &format!("value{i}"));
    }
    let output = cargo_bin_cmd!("tierhash")
        .arg("--config")
        .arg(fx.config())
        .arg("get")
        .arg("--db")
        .arg(&fx.db)
        .arg("key7")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(String::from_utf8(output).unwrap().trim(), "value7");

    cargo_bin_cmd!("tierhash")
        .arg("--config")
        .arg(fx.config())
        .arg("get")
        .arg("--db")
        .arg(&fx.db)
        .arg("nope")
        .assert()
        .code(3);
}

#[test]
fn stats_emits_json() {
    let fx = setup_db("stats");
    put(&fx, "alpha", "1");
    let json = json_of(&fx, &["stats"], &fx.db);
    assert_eq!(json["geometry"]["segments"].as_u64(), Some(4));
    assert_eq!(json["geometry"]["hash_seed"].as_u64(), Some(99));
    assert_eq!(json["segments"]["live_entries"].as_u64(), Some(1));
    assert!(json["pool"]["free_tiers"].is_number());
}

#[test]
fn verify_full_succeeds() {
    let fx = setup_db("verify");
    put(&fx, "alpha", "1");
    let json = json_of(&fx, &["verify", "--level", "full"], &fx.db);
    assert!(json["success"].as_bool().unwrap_or(false));
}

#[test]
fn recover_clears_a_stale_lock_and_verify_agrees() {
    let fx = setup_db("recover");
    {
        let mut table = open_table(&fx.db, &AdminOpenOptions::default()).unwrap();
        table.set_lock_word(SegmentIndex(2), LockState::write_locked());
        table.flush().unwrap();
    }

    cargo_bin_cmd!("tierhash")
        .arg("--config")
        .arg(fx.config())
        .arg("verify")
        .arg(&fx.db)
        .assert()
        .code(2);

    let json = json_of(&fx, &["recover"], &fx.db);
    let corrections = json["corrections"].as_array().expect("corrections array");
    assert_eq!(corrections.len(), 1);
    assert_eq!(corrections[0]["kind"], "stale_lock");
    assert_eq!(corrections[0]["segment"].as_u64(), Some(2));

    let json = json_of(&fx, &["verify"], &fx.db);
    assert!(json["success"].as_bool().unwrap_or(false));
}

#[test]
fn config_file_supplies_the_default_database() {
    let fx = setup_db("config");
    std::fs::write(
        fx.config(),
        format!("[database]\ndefault = {:?}\n", fx.db.display().to_string()),
    )
    .unwrap();
    put(&fx, "from-config", "yes");
    let output = cargo_bin_cmd!("tierhash")
        .arg("--config")
        .arg(fx.config())
        .args(["get", "from-config"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(String::from_utf8(output).unwrap().trim(), "yes");
}

#[test]
fn create_refuses_existing_file_without_force() {
    let fx = setup_db("exists");
    cargo_bin_cmd!("tierhash")
        .arg("--config")
        .arg(fx.config())
        .arg("create")
        .arg(&fx.db)
        .assert()
        .failure()
        .code(1);
    cargo_bin_cmd!("tierhash")
        .arg("--config")
        .arg(fx.config())
        .args(["create", "--force"])
        .arg(&fx.db)
        .assert()
        .success();
}
