use serde::Serialize;
use tracing::error;

use crate::storage::GlobalMutableState;
use crate::types::{SegmentIndex, TierIndex};

/// What a recovery correction fixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionKind {
    /// A segment lock word was not clear.
    StaleLock,
    /// A primary tier carried a non-zero prev link, owner, or depth.
    PrimaryTierField,
    /// An overflow tier's stored owner disagreed with its entries.
    OwnerMismatch,
    /// `extra_tiers_in_use` disagreed with the linked pool prefix.
    CounterDrift,
    /// `first_free_tier_index` disagreed with the rebuilt free list.
    FreeListHead,
    /// A live slot held an undecodable entry or a key of another segment.
    InvalidEntry,
    /// A tier's entry counter disagreed with its occupancy bitmap.
    EntryCount,
    /// A key was live in more than one tier of a chain.
    DuplicateEntry,
    /// An in-use overflow tier was left without live entries.
    EmptyTier,
}

impl CorrectionKind {
    /// Stable snake_case name, used as the log field value.
    pub fn as_str(self) -> &'static str {
        match self {
            CorrectionKind::StaleLock => "stale_lock",
            CorrectionKind::PrimaryTierField => "primary_tier_field",
            CorrectionKind::OwnerMismatch => "owner_mismatch",
            CorrectionKind::CounterDrift => "counter_drift",
            CorrectionKind::FreeListHead => "free_list_head",
            CorrectionKind::InvalidEntry => "invalid_entry",
            CorrectionKind::EntryCount => "entry_count",
            CorrectionKind::DuplicateEntry => "duplicate_entry",
            CorrectionKind::EmptyTier => "empty_tier",
        }
    }
}

/// One in-place fix applied during recovery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Correction {
    /// Category of the fix.
    pub kind: CorrectionKind,
    /// Segment involved, when known.
    pub segment: Option<u32>,
    /// Physical tier involved, when any.
    pub tier: Option<u64>,
    /// Value found in storage.
    pub stored: Option<u64>,
    /// Value written in its place.
    pub expected: Option<u64>,
    /// Human-readable description.
    pub detail: String,
}

impl Correction {
    pub(crate) fn new(kind: CorrectionKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            segment: None,
            tier: None,
            stored: None,
            expected: None,
            detail: detail.into(),
        }
    }

    pub(crate) fn segment(mut self, segment: SegmentIndex) -> Self {
        self.segment = Some(segment.0);
        self
    }

    pub(crate) fn tier(mut self, tier: TierIndex) -> Self {
        self.tier = Some(tier.0);
        self
    }

    pub(crate) fn values(mut self, stored: u64, expected: u64) -> Self {
        self.stored = Some(stored);
        self.expected = Some(expected);
        self
    }
}

/// Work done by a recovery run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryCounts {
    /// Segments visited by every pass.
    pub segments: u32,
    /// Pool ordinals examined by the ownership scan.
    pub extra_tiers_scanned: u64,
    /// Overflow tiers re-linked into a chain.
    pub tiers_linked: u64,
    /// Pool tiers threaded onto the free list.
    pub free_tiers: u64,
    /// Live slots dropped as undecodable or misplaced.
    pub invalid_entries: u64,
    /// Shadowed copies removed by duplicate elimination.
    pub duplicates_removed: u64,
}

/// Outcome of [`recover_segments`](super::recover_segments).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Every correction, in the order applied.
    pub corrections: Vec<Correction>,
    /// Work counters.
    pub counts: RecoveryCounts,
    /// Global Mutable State as persisted at the end of the run.
    pub global: GlobalMutableState,
}

impl RecoveryReport {
    pub(crate) fn new(global: GlobalMutableState) -> Self {
        Self {
            corrections: Vec::new(),
            counts: RecoveryCounts::default(),
            global,
        }
    }

    /// Returns true if the table needed no correction.
    pub fn is_clean(&self) -> bool {
        self.corrections.is_empty()
    }

    /// Corrections of one kind.
    pub fn of_kind(&self, kind: CorrectionKind) -> impl Iterator<Item = &Correction> + '_ {
        self.corrections.iter().filter(move |c| c.kind == kind)
    }

    /// Logs `correction` at error level and appends it to the report.
    pub fn record(&mut self, correction: Correction) {
        error!(
            kind = correction.kind.as_str(),
            segment = correction.segment,
            tier = correction.tier,
            stored = correction.stored,
            expected = correction.expected,
            detail = %correction.detail,
            "recovery.correction"
        );
        self.corrections.push(correction);
    }
}
