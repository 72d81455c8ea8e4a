#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Once;

use tierhash::primitives::concurrency::LockState;
use tierhash::primitives::io::HeapRegion;
use tierhash::storage::TableOptions;
use tierhash::types::{PoolOrdinal, SegmentIndex, TierIndex};
use tierhash::HashTable;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tierhash=warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_ansi(false)
            .try_init();
    });
}

pub fn small_opts(segments: u32, entries_per_tier: u32, tiers_per_bulk: u32) -> TableOptions {
    TableOptions::default()
        .segments(segments)
        .entries_per_tier(entries_per_tier)
        .entry_size(32)
        .tiers_per_bulk(tiers_per_bulk)
        .initial_bulks(1)
        .max_bulks(4)
        .hash_seed(0x5eed)
}

pub fn heap_table(opts: &TableOptions) -> HashTable<HeapRegion> {
    init_tracing();
    HashTable::create(HeapRegion::default(), opts).expect("create table")
}

/// The `skip`-th key of the form `k<n>` that hashes to `segment`.
pub fn key_in<R: tierhash::primitives::io::Region>(
    table: &HashTable<R>,
    segment: u32,
    skip: usize,
) -> Vec<u8> {
    (0u32..)
        .map(|i| format!("k{i}").into_bytes())
        .filter(|k| table.geometry().segment_of(k) == SegmentIndex(segment))
        .nth(skip)
        .expect("key search is unbounded")
}

/// Writes a live entry straight into a tier, bypassing `put`.
pub fn plant<R: tierhash::primitives::io::Region>(
    table: &mut HashTable<R>,
    tier: TierIndex,
    slot: usize,
    key: &[u8],
    value: &[u8],
) {
    let cursor = table.enter_tier(tier).expect("tier in range");
    let mut view = table.tier_mut(&cursor);
    view.write_entry(slot, key, value);
    let live = view.view().live_count() as u32;
    view.set_entries(live);
}

pub fn overflow_tier(table: &HashTable<HeapRegion>, ordinal: u64) -> TierIndex {
    table.ordinal_to_tier_index(PoolOrdinal(ordinal))
}

/// Checks lock safety, chain integrity, contiguity and the duplicate-free
/// property on a recovered table.
pub fn assert_recovered_invariants(table: &HashTable<HeapRegion>) {
    let geometry = *table.geometry();
    let global = table.load_global();
    let pool = geometry.pool_tiers(global.allocated_bulks);
    let mut linked = HashSet::new();

    for raw in 0..geometry.segment_count {
        let segment = SegmentIndex(raw);
        assert_eq!(
            table.lock_word(segment),
            LockState::CLEAR,
            "segment {raw} lock not clear"
        );
        let chain = table.chain(segment).expect("chain walk");
        let mut keys = HashSet::new();
        for (depth, cursor) in chain.iter().enumerate() {
            let view = table.tier(cursor);
            if depth == 0 {
                assert_eq!(view.prev_tier_index(), TierIndex::NONE);
                assert_eq!(view.depth(), 0);
            } else {
                assert_eq!(view.depth() as usize, depth, "segment {raw} depth gap");
                assert_eq!(view.prev_tier_index(), chain[depth - 1].tier);
                assert_eq!(view.segment_index(), segment);
                assert!(view.live_count() > 0, "overflow tier {} is empty", cursor.tier);
                linked.insert(cursor.tier);
            }
            assert_eq!(view.entries() as usize, view.live_count());
            for slot in view.live_slots() {
                let entry = view.entry(slot).expect("live entry decodes");
                assert_eq!(geometry.segment_of(entry.key), segment);
                assert!(
                    keys.insert(entry.key.to_vec()),
                    "segment {raw} holds {:?} twice",
                    String::from_utf8_lossy(entry.key)
                );
            }
        }
    }

    assert!(global.extra_tiers_in_use <= pool);
    let in_use: HashSet<TierIndex> = (0..global.extra_tiers_in_use)
        .map(|o| table.ordinal_to_tier_index(PoolOrdinal(o)))
        .collect();
    assert_eq!(linked, in_use, "linked tiers are not the in-use prefix");

    let expected_head = if global.extra_tiers_in_use < pool {
        table.ordinal_to_tier_index(PoolOrdinal(global.extra_tiers_in_use))
    } else {
        TierIndex::NONE
    };
    assert_eq!(global.first_free_tier_index, expected_head);
}
