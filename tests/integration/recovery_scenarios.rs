#![allow(missing_docs)]

mod common;

use common::{assert_recovered_invariants, heap_table, key_in, overflow_tier, plant, small_opts};
use tierhash::primitives::concurrency::LockState;
use tierhash::primitives::io::HeapRegion;
use tierhash::recovery::{CorrectionKind, RecoveryReport};
use tierhash::storage::{GlobalMutableState, TableOptions};
use tierhash::types::{SegmentIndex, TierHashError, TierIndex};
use tierhash::HashTable;

fn recover(table: HashTable<HeapRegion>) -> (HashTable<HeapRegion>, RecoveryReport) {
    HashTable::recover(table.into_region()).expect("recovery succeeds")
}

/// Recovers a second time and checks nothing changes.
fn assert_idempotent(table: HashTable<HeapRegion>) -> HashTable<HeapRegion> {
    let before = table.into_region().into_vec();
    let (again, report) = HashTable::recover(HeapRegion::from_vec(before.clone())).unwrap();
    assert!(report.is_clean(), "second run corrected {:?}", report.corrections);
    let after = again.into_region().into_vec();
    assert!(before == after, "second run rewrote the image");
    HashTable::open(HeapRegion::from_vec(after)).expect("recovered table opens")
}

fn set_global(table: &mut HashTable<HeapRegion>, in_use: u64, first_free: TierIndex) {
    let mut global = table.load_global();
    global.extra_tiers_in_use = in_use;
    global.first_free_tier_index = first_free;
    table.persist_global(&global);
}

fn set_owner(table: &mut HashTable<HeapRegion>, tier: TierIndex, segment: u32) {
    let cursor = table.enter_tier(tier).unwrap();
    table.tier_mut(&cursor).set_segment_index(SegmentIndex(segment));
}

#[test]
fn stale_lock_on_primary_only_table() {
    let mut t = heap_table(&small_opts(4, 4, 4));
    t.set_lock_word(SegmentIndex(2), LockState::write_locked());
    let global_before = t.load_global();

    let (t, report) = recover(t);
    assert_eq!(report.corrections.len(), 1);
    let fix = &report.corrections[0];
    assert_eq!(fix.kind, CorrectionKind::StaleLock);
    assert_eq!(fix.segment, Some(2));
    assert_eq!(fix.stored, Some(LockState::write_locked()));
    assert_eq!(fix.expected, Some(LockState::CLEAR));

    for raw in 0..4 {
        let primary = t.enter_segment(SegmentIndex(raw)).unwrap();
        let view = t.tier(&primary);
        assert_eq!(view.prev_tier_index(), TierIndex::NONE);
        assert_eq!(view.next_tier_index(), TierIndex::NONE);
        assert_eq!(view.segment_index(), SegmentIndex(0));
        assert_eq!(view.depth(), 0);
        assert_eq!(t.lock_word(SegmentIndex(raw)), LockState::CLEAR);
    }
    assert_eq!(report.global, global_before);
    assert_eq!(t.load_global(), global_before);
    assert_idempotent(t);
}

#[test]
fn in_use_counter_shrinks_to_the_owned_prefix() {
    let mut t = heap_table(&small_opts(2, 4, 8));
    let a = key_in(&t, 0, 0);
    let b = key_in(&t, 1, 0);
    let c = key_in(&t, 0, 1);
    let orphan = key_in(&t, 1, 1);

    let o: Vec<TierIndex> = (0..8).map(|i| overflow_tier(&t, i)).collect();

    plant(&mut t, o[0], 0, &a, b"a");
    plant(&mut t, o[1], 2, &b, b"b");
    set_owner(&mut t, o[1], 1);
    plant(&mut t, o[2], 1, &c, b"c");
    // ordinal 3 stays empty; ordinal 4 holds an entry past the gap
    plant(&mut t, o[4], 0, &orphan, b"lost");
    set_global(&mut t, 5, o[5]);

    let (t, report) = recover(t);
    let global = t.load_global();
    assert_eq!(global.extra_tiers_in_use, 3);
    assert_eq!(global.first_free_tier_index, o[3]);
    assert_eq!(report.counts.extra_tiers_scanned, 4);
    assert_eq!(report.counts.tiers_linked, 3);
    assert_eq!(report.counts.free_tiers, 5);

    let drift: Vec<_> = report.of_kind(CorrectionKind::CounterDrift).collect();
    assert_eq!(drift.len(), 1);
    assert_eq!((drift[0].stored, drift[0].expected), (Some(5), Some(3)));
    let head: Vec<_> = report.of_kind(CorrectionKind::FreeListHead).collect();
    assert_eq!(head.len(), 1);
    assert_eq!(head[0].expected, Some(o[3].0));

    assert_eq!(
        t.segment_chain(SegmentIndex(0)).unwrap(),
        vec![TierIndex(1), o[0], o[2]]
    );
    assert_eq!(
        t.segment_chain(SegmentIndex(1)).unwrap(),
        vec![TierIndex(2), o[1]]
    );

    for ordinal in 3..8 {
        let cursor = t.enter_tier(o[ordinal]).unwrap();
        let view = t.tier(&cursor);
        assert_eq!(view.live_count(), 0, "ordinal {ordinal} not zeroed");
        assert_eq!(view.next_tier_index(), TierIndex::NONE);
        let link = if ordinal == 7 {
            TierIndex::NONE
        } else {
            o[ordinal + 1]
        };
        assert_eq!(view.prev_tier_index(), link);
    }

    assert_eq!(t.get(&a).unwrap().as_deref(), Some(&b"a"[..]));
    assert_eq!(t.get(&b).unwrap().as_deref(), Some(&b"b"[..]));
    assert_eq!(t.get(&c).unwrap().as_deref(), Some(&b"c"[..]));
    assert_eq!(t.get(&orphan).unwrap(), None);
    assert_recovered_invariants(&t);
    assert_idempotent(t);
}

#[test]
fn tier_follows_its_entries_not_its_stored_owner() {
    let mut t = heap_table(&small_opts(6, 4, 4));
    let k = key_in(&t, 5, 0);
    let tier = overflow_tier(&t, 0);
    plant(&mut t, tier, 0, &k, b"five");
    let next_free = overflow_tier(&t, 1);
    set_owner(&mut t, tier, 2);
    set_global(&mut t, 1, next_free);

    let (t, report) = recover(t);
    let mismatch: Vec<_> = report.of_kind(CorrectionKind::OwnerMismatch).collect();
    assert_eq!(mismatch.len(), 1);
    assert_eq!(mismatch[0].tier, Some(tier.0));
    assert_eq!((mismatch[0].stored, mismatch[0].expected), (Some(2), Some(5)));

    assert_eq!(t.segment_chain(SegmentIndex(2)).unwrap(), vec![TierIndex(3)]);
    assert_eq!(
        t.segment_chain(SegmentIndex(5)).unwrap(),
        vec![TierIndex(6), tier]
    );
    let cursor = t.enter_tier(tier).unwrap();
    assert_eq!(t.tier(&cursor).segment_index(), SegmentIndex(5));
    assert_eq!(t.get(&k).unwrap().as_deref(), Some(&b"five"[..]));
    assert_recovered_invariants(&t);
    assert_idempotent(t);
}

#[test]
fn tail_copy_of_a_duplicated_key_survives() {
    let mut t = heap_table(&small_opts(2, 4, 4));
    let k = key_in(&t, 1, 0);
    let other = key_in(&t, 1, 1);
    let tier = overflow_tier(&t, 0);
    plant(&mut t, TierIndex(2), 0, &k, b"stale");
    plant(&mut t, TierIndex(2), 1, &other, b"kept");
    plant(&mut t, tier, 3, &k, b"fresh");
    let next_free = overflow_tier(&t, 1);
    set_owner(&mut t, tier, 1);
    set_global(&mut t, 1, next_free);

    let (t, report) = recover(t);
    let dups: Vec<_> = report.of_kind(CorrectionKind::DuplicateEntry).collect();
    assert_eq!(dups.len(), 1);
    assert_eq!(dups[0].tier, Some(2));
    assert_eq!(report.counts.duplicates_removed, 1);

    let primary = t.enter_segment(SegmentIndex(1)).unwrap();
    assert!(t.tier(&primary).find(&k).is_none());
    assert_eq!(t.tier(&primary).entries(), 1);
    let overflow = t.enter_tier(tier).unwrap();
    assert_eq!(t.tier(&overflow).find(&k).unwrap().1.value, b"fresh");
    assert_eq!(t.get(&k).unwrap().as_deref(), Some(&b"fresh"[..]));
    assert_eq!(t.get(&other).unwrap().as_deref(), Some(&b"kept"[..]));
    assert_recovered_invariants(&t);
    assert_idempotent(t);
}

#[test]
fn removal_that_empties_a_shared_pool_tier_loses_nothing() {
    let mut t = heap_table(&small_opts(2, 1, 4));
    let (a0, a1) = (key_in(&t, 0, 0), key_in(&t, 0, 1));
    let (b0, b1) = (key_in(&t, 1, 0), key_in(&t, 1, 1));
    for k in [&a0, &b0, &a1, &b1] {
        t.put(k, k).unwrap();
    }
    let (o0, o1) = (overflow_tier(&t, 0), overflow_tier(&t, 1));
    assert_eq!(t.segment_chain(SegmentIndex(1)).unwrap(), vec![TierIndex(2), o1]);

    assert_eq!(t.remove(&a1).unwrap(), Some(a1.clone()));
    assert_eq!(t.segment_chain(SegmentIndex(0)).unwrap(), vec![TierIndex(1)]);
    assert_eq!(t.segment_chain(SegmentIndex(1)).unwrap(), vec![TierIndex(2), o0]);
    let global = t.load_global();
    assert_eq!(global.extra_tiers_in_use, 1);
    assert_eq!(global.first_free_tier_index, o1);
    assert_recovered_invariants(&t);

    let t = assert_idempotent(t);
    for k in [&a0, &b0, &b1] {
        assert_eq!(t.get(k).unwrap().as_ref(), Some(k));
    }
    assert_eq!(t.get(&a1).unwrap(), None);
}

#[test]
fn duplicate_across_overflow_tiers_leaves_no_empty_tier() {
    let mut t = heap_table(&small_opts(2, 1, 4));
    let k = key_in(&t, 1, 0);
    let filler = key_in(&t, 1, 1);
    let o: Vec<TierIndex> = (0..3).map(|i| overflow_tier(&t, i)).collect();
    plant(&mut t, TierIndex(2), 0, &filler, b"filler");
    plant(&mut t, o[0], 0, &k, b"old");
    plant(&mut t, o[1], 0, &k, b"new");
    set_global(&mut t, 2, o[2]);

    let (t, report) = recover(t);
    assert_eq!(report.counts.duplicates_removed, 1);
    let dups: Vec<_> = report.of_kind(CorrectionKind::DuplicateEntry).collect();
    assert_eq!(dups[0].tier, Some(o[0].0));
    let emptied: Vec<_> = report.of_kind(CorrectionKind::EmptyTier).collect();
    assert_eq!(emptied.len(), 1);
    assert_eq!(emptied[0].segment, Some(1));
    assert_eq!((emptied[0].stored, emptied[0].expected), (Some(2), Some(1)));

    let global = t.load_global();
    assert_eq!(global.extra_tiers_in_use, 1);
    assert_eq!(global.first_free_tier_index, o[1]);
    assert_eq!(t.segment_chain(SegmentIndex(1)).unwrap(), vec![TierIndex(2), o[0]]);
    assert_eq!(t.get(&k).unwrap().as_deref(), Some(&b"new"[..]));
    assert_eq!(t.get(&filler).unwrap().as_deref(), Some(&b"filler"[..]));
    assert_recovered_invariants(&t);
    let t = assert_idempotent(t);
    assert_eq!(t.get(&k).unwrap().as_deref(), Some(&b"new"[..]));
}

#[test]
fn crash_mid_append_is_rebuilt_from_entries() {
    let mut t = heap_table(&small_opts(3, 2, 4));
    let keys: Vec<Vec<u8>> = (0..24).map(|i| format!("item-{i}").into_bytes()).collect();
    for (i, k) in keys.iter().enumerate() {
        t.put(k, format!("v{i}").as_bytes()).unwrap();
    }
    let global = t.load_global();
    assert!(global.extra_tiers_in_use >= 4);

    // writer died after taking a tier but before linking it or moving the
    // free-list head
    let victim = overflow_tier(&t, global.extra_tiers_in_use - 1);
    let cursor = t.enter_tier(victim).unwrap();
    let owner = t.tier(&cursor).segment_index();
    let prev = t.tier(&cursor).prev_tier_index();
    let prev_cursor = t.enter_tier(prev).unwrap();
    t.tier_mut(&prev_cursor).set_next_tier_index(TierIndex::NONE);
    t.set_lock_word(owner, LockState::write_locked());
    t.persist_global(&GlobalMutableState {
        first_free_tier_index: victim,
        ..global
    });

    let (t, report) = recover(t);
    assert_eq!(report.of_kind(CorrectionKind::StaleLock).count(), 1);
    assert_eq!(report.of_kind(CorrectionKind::FreeListHead).count(), 1);
    assert_eq!(report.of_kind(CorrectionKind::CounterDrift).count(), 0);
    assert_eq!(t.load_global(), global);
    for (i, k) in keys.iter().enumerate() {
        assert_eq!(t.get(k).unwrap(), Some(format!("v{i}").into_bytes()));
    }
    assert_recovered_invariants(&t);
    assert_idempotent(t);
}

#[test]
fn corrupted_entries_are_dropped_and_counted() {
    let mut t = heap_table(&small_opts(2, 4, 4));
    let good = key_in(&t, 0, 0);
    let bad = key_in(&t, 0, 1);
    plant(&mut t, TierIndex(1), 0, &good, b"ok");
    plant(&mut t, TierIndex(1), 1, &bad, b"rot");

    let primary = t.enter_segment(SegmentIndex(0)).unwrap();
    let geometry = *t.geometry();
    let value_at = primary.offset
        + tierhash::storage::layout::TIER_COUNTERS_LEN
        + geometry.bitmap_len()
        + geometry.entry_size as usize
        + tierhash::storage::layout::ENTRY_HEADER_LEN
        + bad.len();
    let mut image = t.into_region().into_vec();
    image[value_at] ^= 0xff;

    let (t, report) = HashTable::recover(HeapRegion::from_vec(image)).unwrap();
    assert_eq!(report.counts.invalid_entries, 1);
    let invalid: Vec<_> = report.of_kind(CorrectionKind::InvalidEntry).collect();
    assert_eq!(invalid.len(), 1);
    assert_eq!(invalid[0].segment, Some(0));
    assert_eq!(report.of_kind(CorrectionKind::EntryCount).count(), 1);
    assert_eq!(t.get(&good).unwrap().as_deref(), Some(&b"ok"[..]));
    assert_eq!(t.get(&bad).unwrap(), None);
    assert_recovered_invariants(&t);
    assert_idempotent(t);
}

#[test]
fn damaged_header_is_fatal() {
    let mut t = heap_table(&small_opts(2, 4, 4));
    t.set_lock_word(SegmentIndex(0), LockState::write_locked());
    let mut image = t.into_region().into_vec();
    image[tierhash::storage::layout::header::SEGMENT_COUNT + 3] ^= 1;

    match HashTable::recover(HeapRegion::from_vec(image)) {
        Err(TierHashError::Corruption(msg)) => assert_eq!(msg, "header crc mismatch"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn region_shorter_than_allocated_bulks_is_fatal() {
    let opts = TableOptions {
        initial_bulks: 2,
        ..small_opts(2, 4, 4)
    };
    let t = heap_table(&opts);
    let tier_len = t.geometry().tier_len();
    let mut image = t.into_region().into_vec();
    image.truncate(image.len() - tier_len);
    match HashTable::recover(HeapRegion::from_vec(image)) {
        Err(TierHashError::Corruption(msg)) => {
            assert_eq!(msg, "region shorter than its allocated bulks")
        }
        other => panic!("unexpected: {other:?}"),
    }
}
