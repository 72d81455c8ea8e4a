#![allow(missing_docs)]

mod common;

use std::path::PathBuf;

use tempfile::TempDir;
use tierhash::admin::{
    create, open_table, recover, stats, verify, AdminError, AdminOpenOptions, VerifyLevel,
};
use tierhash::primitives::concurrency::LockState;
use tierhash::recovery::CorrectionKind;
use tierhash::storage::TableOptions;
use tierhash::types::{SegmentIndex, TierHashError};

fn opts() -> TableOptions {
    TableOptions::default()
        .segments(4)
        .entries_per_tier(2)
        .entry_size(48)
        .tiers_per_bulk(2)
        .initial_bulks(1)
        .max_bulks(32)
        .hash_seed(77)
}

fn setup(name: &str) -> (TempDir, PathBuf) {
    common::init_tracing();
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join(format!("{name}.th"));
    create(&path, &opts(), false).expect("create table");
    (dir, path)
}

#[test]
fn create_reports_geometry_and_refuses_to_clobber() {
    let (_dir, path) = setup("create");
    let report = create(&path, &opts(), false);
    assert!(matches!(report, Err(AdminError::AlreadyExists(_))));

    let report = create(&path, &opts(), true).unwrap();
    assert_eq!(report.segments, 4);
    assert_eq!(report.allocated_bulks, 1);
    assert_eq!(report.hash_seed, 77);
    assert_eq!(report.size_bytes, std::fs::metadata(&path).unwrap().len());
}

#[test]
fn missing_file_is_reported_not_created() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.th");
    assert!(matches!(
        open_table(&path, &AdminOpenOptions::default()),
        Err(AdminError::MissingDatabase(_))
    ));
    assert!(matches!(recover(&path), Err(AdminError::MissingDatabase(_))));
    assert!(!path.exists());

    let opts = AdminOpenOptions {
        table: opts(),
        create_if_missing: true,
    };
    let table = open_table(&path, &opts).unwrap();
    assert_eq!(table.geometry().segment_count, 4);
    assert!(path.exists());
}

#[test]
fn grown_file_reopens_with_every_value() {
    let (_dir, path) = setup("grow");
    let size_before = std::fs::metadata(&path).unwrap().len();
    {
        let mut table = open_table(&path, &AdminOpenOptions::default()).unwrap();
        for i in 0..60u32 {
            table
                .put(format!("row-{i}").as_bytes(), format!("payload-{i}").as_bytes())
                .unwrap();
        }
        table.flush().unwrap();
    }
    assert!(std::fs::metadata(&path).unwrap().len() > size_before);

    let table = open_table(&path, &AdminOpenOptions::default()).unwrap();
    assert!(table.load_global().allocated_bulks > 1);
    for i in 0..60u32 {
        assert_eq!(
            table.get(format!("row-{i}").as_bytes()).unwrap(),
            Some(format!("payload-{i}").into_bytes())
        );
    }

    let report = stats(&path, &AdminOpenOptions::default()).unwrap();
    assert_eq!(report.segments.live_entries, 60);
    assert_eq!(report.segments.chain_lengths.len(), 4);
    assert_eq!(
        report.pool.free_tiers,
        report.pool.pool_tiers - report.pool.extra_tiers_in_use
    );
}

#[test]
fn crashed_file_is_refused_until_recovered() {
    let (_dir, path) = setup("crash");
    {
        let mut table = open_table(&path, &AdminOpenOptions::default()).unwrap();
        for i in 0..20u32 {
            table.put(format!("k{i}").as_bytes(), b"v").unwrap();
        }
        table.set_lock_word(SegmentIndex(3), LockState::write_locked());
        let mut global = table.load_global();
        global.extra_tiers_in_use += 3;
        table.persist_global(&global);
        table.flush().unwrap();
    }

    match open_table(&path, &AdminOpenOptions::default()) {
        Err(AdminError::Core(TierHashError::Corruption(_))) => {}
        other => panic!("unexpected: {other:?}"),
    }
    let before = verify(&path, VerifyLevel::Full).unwrap();
    assert!(!before.success);

    let report = recover(&path).unwrap();
    assert_eq!(report.of_kind(CorrectionKind::StaleLock).count(), 1);
    assert_eq!(report.of_kind(CorrectionKind::CounterDrift).count(), 1);
    assert!(serde_json::to_string(&report).unwrap().contains("\"stale_lock\""));

    let after = verify(&path, VerifyLevel::Full).unwrap();
    assert!(after.success, "findings: {:?}", after.findings);
    assert!(recover(&path).unwrap().is_clean());

    let table = open_table(&path, &AdminOpenOptions::default()).unwrap();
    assert_eq!(table.len().unwrap(), 20);
}
