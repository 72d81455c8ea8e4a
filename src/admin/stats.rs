//! Read-only table statistics for the `stats` command.
#![allow(missing_docs)]

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::admin::options::AdminOpenOptions;
use crate::admin::util::open_table;
use crate::admin::Result;
use crate::types::SegmentIndex;

/// Full statistics report, serialized as the `stats` output.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub geometry: GeometrySection,
    pub pool: PoolSection,
    pub segments: SegmentsSection,
    pub filesystem: FilesystemStats,
}

/// Immutable geometry from the header.
#[derive(Debug, Clone, Serialize)]
pub struct GeometrySection {
    pub segments: u32,
    pub entries_per_tier: u32,
    pub entry_size: u32,
    pub payload_capacity: usize,
    pub tiers_per_bulk: u32,
    pub max_bulks: u32,
    pub hash_seed: u64,
}

/// Overflow pool occupancy.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSection {
    pub allocated_bulks: u32,
    pub pool_tiers: u64,
    pub extra_tiers_in_use: u64,
    pub free_tiers: u64,
    pub first_free_tier_index: u64,
}

/// Live entries and chain lengths across segments.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentsSection {
    pub live_entries: u64,
    pub longest_chain: usize,
    pub chain_lengths: Vec<usize>,
}

/// Where the table lives and how large the file is.
#[derive(Debug, Clone, Serialize)]
pub struct FilesystemStats {
    pub db_path: String,
    pub db_size_bytes: u64,
}

/// Opens the table at `path` and summarizes its pool and chains.
pub fn stats(path: impl AsRef<Path>, opts: &AdminOpenOptions) -> Result<StatsReport> {
    let path = path.as_ref();
    let table = open_table(path, opts)?;
    let geometry = *table.geometry();
    let global = table.load_global();
    let db_meta = fs::metadata(path)?;

    let geometry_section = GeometrySection {
        segments: geometry.segment_count,
        entries_per_tier: geometry.entries_per_tier,
        entry_size: geometry.entry_size,
        payload_capacity: geometry.payload_capacity(),
        tiers_per_bulk: geometry.tiers_per_bulk,
        max_bulks: geometry.max_bulks,
        hash_seed: geometry.hash_seed,
    };

    let pool_tiers = geometry.pool_tiers(global.allocated_bulks);
    let pool_section = PoolSection {
        allocated_bulks: global.allocated_bulks,
        pool_tiers,
        extra_tiers_in_use: global.extra_tiers_in_use,
        free_tiers: pool_tiers.saturating_sub(global.extra_tiers_in_use),
        first_free_tier_index: global.first_free_tier_index.0,
    };

    let mut live_entries = 0u64;
    let mut chain_lengths = Vec::with_capacity(geometry.segment_count as usize);
    for raw in 0..geometry.segment_count {
        let chain = table.chain(SegmentIndex(raw))?;
        for cursor in &chain {
            live_entries += table.tier(cursor).live_count() as u64;
        }
        chain_lengths.push(chain.len());
    }
    let segments_section = SegmentsSection {
        live_entries,
        longest_chain: chain_lengths.iter().copied().max().unwrap_or(0),
        chain_lengths,
    };

    let filesystem_section = FilesystemStats {
        db_path: path.display().to_string(),
        db_size_bytes: db_meta.len(),
    };

    Ok(StatsReport {
        geometry: geometry_section,
        pool: pool_section,
        segments: segments_section,
        filesystem: filesystem_section,
    })
}
