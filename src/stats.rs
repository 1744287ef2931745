//! View-consistent statistics
//!
//! The central correctness property of the engine: the totals shown next to
//! the ledger always describe the set the view is actually showing. Store-
//! global numbers are only ever used when no filter is active and no local
//! scan is loaded.

use crate::models::{CollectionRecord, ViewStats};

/// Where the displayed totals come from, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsSource {
    /// Any filter active: recompute over the complete filtered set.
    FilteredSet,
    /// No filters, but a full scan is loaded: compute from the loaded set.
    LoadedSet,
    /// Nothing loaded locally: fall back to the store's global aggregate.
    StoreGlobal,
}

/// Pick the stats source for the current view state.
pub fn select_source(filter_active: bool, full_scan_loaded: bool) -> StatsSource {
    if filter_active {
        StatsSource::FilteredSet
    } else if full_scan_loaded {
        StatsSource::LoadedSet
    } else {
        StatsSource::StoreGlobal
    }
}

/// Sum a record set into view totals. `grand_total` is derived, never stored.
pub fn compute(records: &[CollectionRecord]) -> ViewStats {
    let individual_total: u64 = records
        .iter()
        .map(|r| r.individual_sandwiches as u64)
        .sum();
    let group_total: u64 = records.iter().map(|r| r.group_total() as u64).sum();
    ViewStats {
        total_entries: records.len(),
        individual_total,
        group_total,
        grand_total: individual_total + group_total,
    }
}
