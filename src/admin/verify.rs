use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;

use crate::admin::util::attach_table;
use crate::admin::Result;
use crate::primitives::concurrency::LockState;
use crate::primitives::io::Region;
use crate::storage::{GlobalMutableState, HashTable, TierCursor};
use crate::types::{PoolOrdinal, SegmentIndex, TierIndex};

const MAX_FINDINGS: usize = 32;

/// Specifies the depth of verification checks to perform.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyLevel {
    /// Lock words, primary-tier fields and global counters only.
    Fast,
    /// Adds chain walks, entry checks, and the free list.
    Full,
}

/// Indicates the severity level of a verification finding.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySeverity {
    /// Informational message about the verification process.
    Info,
    /// Non-critical issue that may indicate a problem.
    Warning,
    /// Critical issue indicating corruption or an invariant violation.
    Error,
}

/// Represents a single issue discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// The severity level of this finding.
    pub severity: VerifySeverity,
    /// Human-readable description of the issue.
    pub message: String,
}

impl VerifyFinding {
    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: VerifySeverity::Error,
            message: message.into(),
        }
    }
}

/// Statistics collected during the verification process.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyCounts {
    /// Segments whose lock word and primary tier were checked.
    pub segments_checked: u64,
    /// Tiers reached by chain walks, primaries included.
    pub tiers_walked: u64,
    /// Live entries decoded.
    pub entries_checked: u64,
    /// Tiers reached by the free-list walk.
    pub free_tiers_walked: u64,
}

/// Complete report of a verification operation.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    /// The verification level that was performed.
    pub level: VerifyLevel,
    /// Whether verification passed without finding any issues.
    pub success: bool,
    /// List of issues discovered during verification.
    pub findings: Vec<VerifyFinding>,
    /// Statistics about the structures examined.
    pub counts: VerifyCounts,
}

/// Checks a table against the invariants recovery establishes, without
/// modifying it.
///
/// - `VerifyLevel::Fast`: lock words, primary-tier fields, global counters
/// - `VerifyLevel::Full`: also every chain, every live entry, and the free list
///
/// # Errors
///
/// Returns an error if the file is missing or its header is invalid. Damage
/// below the header is reported as findings.
pub fn verify(path: impl AsRef<Path>, level: VerifyLevel) -> Result<VerifyReport> {
    let table = attach_table(path.as_ref())?;
    Ok(verify_table(&table, level))
}

/// Runs the same checks as [`verify`] on an already opened table.
pub fn verify_table<R: Region>(table: &HashTable<R>, level: VerifyLevel) -> VerifyReport {
    let mut findings = Vec::new();
    let mut counts = VerifyCounts::default();
    let global = table.load_global();

    check_segments(table, &mut findings, &mut counts);
    let pool = table.geometry().pool_tiers(global.allocated_bulks);
    if global.extra_tiers_in_use > pool {
        push_error(
            &mut findings,
            format!(
                "extra_tiers_in_use {} exceeds pool size {pool}",
                global.extra_tiers_in_use
            ),
        );
    }
    let expected_head = if global.extra_tiers_in_use < pool {
        table.ordinal_to_tier_index(PoolOrdinal(global.extra_tiers_in_use))
    } else {
        TierIndex::NONE
    };
    if global.first_free_tier_index != expected_head {
        push_error(
            &mut findings,
            format!(
                "first_free_tier_index is {}, expected {expected_head}",
                global.first_free_tier_index
            ),
        );
    }

    if matches!(level, VerifyLevel::Full) {
        check_chains(table, &global, &mut findings, &mut counts);
        check_free_list(table, &global, pool, &mut findings, &mut counts);
    }

    VerifyReport {
        level,
        success: findings.is_empty(),
        findings,
        counts,
    }
}

fn check_segments<R: Region>(
    table: &HashTable<R>,
    findings: &mut Vec<VerifyFinding>,
    counts: &mut VerifyCounts,
) {
    for raw in 0..table.geometry().segment_count {
        let segment = SegmentIndex(raw);
        counts.segments_checked += 1;
        let word = table.lock_word(segment);
        if word != LockState::CLEAR {
            push_error(
                findings,
                format!("segment {raw} lock not clear ({})", LockState::decode(word)),
            );
        }
        let primary = match table.enter_segment(segment) {
            Ok(cursor) => cursor,
            Err(err) => {
                push_error(findings, format!("segment {raw} primary tier unreadable: {err}"));
                continue;
            }
        };
        let view = table.tier(&primary);
        if !view.prev_tier_index().is_none()
            || view.segment_index().0 != 0
            || view.depth() != 0
        {
            push_error(
                findings,
                format!(
                    "segment {raw} primary tier fields not zero (prev={} owner={} depth={})",
                    view.prev_tier_index(),
                    view.segment_index(),
                    view.depth()
                ),
            );
        }
    }
}

fn check_chains<R: Region>(
    table: &HashTable<R>,
    global: &GlobalMutableState,
    findings: &mut Vec<VerifyFinding>,
    counts: &mut VerifyCounts,
) {
    let mut linked = HashSet::new();
    for raw in 0..table.geometry().segment_count {
        let segment = SegmentIndex(raw);
        let chain = match table.chain(segment) {
            Ok(chain) => chain,
            Err(err) => {
                push_error(findings, format!("segment {raw} chain unreadable: {err}"));
                continue;
            }
        };
        let mut keys = HashSet::new();
        let mut prev: Option<&TierCursor> = None;
        for cursor in &chain {
            counts.tiers_walked += 1;
            if let Some(prev) = prev {
                check_overflow_links(table, global, segment, prev, cursor, &mut linked, findings);
            }
            check_entries(table, segment, cursor, &mut keys, findings, counts);
            prev = Some(cursor);
        }
        if findings.len() >= MAX_FINDINGS {
            return;
        }
    }
    if (linked.len() as u64) < global.extra_tiers_in_use {
        push_error(
            findings,
            format!(
                "{} pool tiers counted in use but only {} linked",
                global.extra_tiers_in_use,
                linked.len()
            ),
        );
    }
}

fn check_overflow_links<R: Region>(
    table: &HashTable<R>,
    global: &GlobalMutableState,
    segment: SegmentIndex,
    prev: &TierCursor,
    cursor: &TierCursor,
    linked: &mut HashSet<u64>,
    findings: &mut Vec<VerifyFinding>,
) {
    let view = table.tier(cursor);
    let tier = cursor.tier;
    if view.live_count() == 0 {
        // recovery would end the in-use prefix here
        push_error(findings, format!("overflow tier {tier} is linked but holds no entries"));
    }
    if view.depth() != cursor.depth {
        push_error(
            findings,
            format!("tier {tier} depth {} at chain position {}", view.depth(), cursor.depth),
        );
    }
    if view.prev_tier_index() != prev.tier {
        push_error(
            findings,
            format!(
                "tier {tier} prev link {} but follows tier {}",
                view.prev_tier_index(),
                prev.tier
            ),
        );
    }
    if view.segment_index() != segment {
        push_error(
            findings,
            format!(
                "tier {tier} stored owner {} but chained in segment {segment}",
                view.segment_index()
            ),
        );
    }
    match table.tier_index_to_ordinal(tier) {
        Some(ordinal) => {
            if ordinal.0 >= global.extra_tiers_in_use {
                push_error(
                    findings,
                    format!(
                        "tier {tier} (ordinal {ordinal}) linked beyond in-use prefix {}",
                        global.extra_tiers_in_use
                    ),
                );
            }
            if !linked.insert(ordinal.0) {
                push_error(findings, format!("tier {tier} linked into more than one chain"));
            }
        }
        None => push_error(findings, format!("tier {tier} is not a pool tier")),
    }
}

fn check_entries<R: Region>(
    table: &HashTable<R>,
    segment: SegmentIndex,
    cursor: &TierCursor,
    keys: &mut HashSet<Vec<u8>>,
    findings: &mut Vec<VerifyFinding>,
    counts: &mut VerifyCounts,
) {
    let view = table.tier(cursor);
    let tier = cursor.tier;
    let live = view.live_count() as u32;
    if view.entries() != live {
        push_error(
            findings,
            format!("tier {tier} entry counter {} but {live} live slots", view.entries()),
        );
    }
    for slot in view.live_slots() {
        let entry = match view.entry(slot) {
            Ok(entry) => entry,
            Err(defect) => {
                push_error(findings, format!("tier {tier} slot {slot}: {defect}"));
                continue;
            }
        };
        counts.entries_checked += 1;
        let home = table.geometry().segment_of(entry.key);
        if home != segment {
            push_error(
                findings,
                format!("tier {tier} slot {slot}: key of segment {home} in segment {segment}"),
            );
        }
        if !keys.insert(entry.key.to_vec()) {
            push_error(
                findings,
                format!("tier {tier} slot {slot}: key already live in segment {segment}"),
            );
        }
    }
}

fn check_free_list<R: Region>(
    table: &HashTable<R>,
    global: &GlobalMutableState,
    pool: u64,
    findings: &mut Vec<VerifyFinding>,
    counts: &mut VerifyCounts,
) {
    let mut ordinal = global.extra_tiers_in_use;
    let mut current = global.first_free_tier_index;
    while !current.is_none() {
        if ordinal >= pool {
            push_error(findings, format!("free list continues past pool end at tier {current}"));
            return;
        }
        let expected = table.ordinal_to_tier_index(PoolOrdinal(ordinal));
        if current != expected {
            push_error(
                findings,
                format!("free list reaches tier {current}, expected {expected}"),
            );
            return;
        }
        let cursor = match table.enter_tier(current) {
            Ok(cursor) => cursor,
            Err(err) => {
                push_error(findings, format!("free tier {current} unreadable: {err}"));
                return;
            }
        };
        counts.free_tiers_walked += 1;
        let view = table.tier(&cursor);
        if view.live_count() != 0 {
            push_error(findings, format!("free tier {current} has live slots"));
        }
        current = view.prev_tier_index();
        ordinal += 1;
    }
    if ordinal < pool {
        push_error(
            findings,
            format!(
                "free list ends after {} of {} free tiers",
                ordinal - global.extra_tiers_in_use,
                pool - global.extra_tiers_in_use
            ),
        );
    }
}

fn push_error(findings: &mut Vec<VerifyFinding>, message: impl Into<String>) {
    if findings.len() < MAX_FINDINGS {
        findings.push(VerifyFinding::error(message.into()));
    }
}
