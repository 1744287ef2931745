//! Filter / sort / paginate engine
//!
//! Two mutually exclusive fetch strategies: a client-side full scan whenever
//! any filter is active (or the filter panel is open), and store-side
//! pagination for the common filter-free case. Whichever strategy is active,
//! the snapshot's statistics always describe the set actually shown.
//!
//! Fetches are two-phase (`begin` / `fetch` / `apply`) so that a response
//! superseded by a newer filter or sort edit is discarded on arrival instead
//! of clobbering the view.

use crate::models::{
    CollectionRecord, FilterState, PaginationState, SortDirection, SortField, SortState,
    ViewStats,
};
use crate::stats::{self, StatsSource};
use crate::store::{LedgerStore, RecordPage};
use anyhow::Result;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Fetch the entire ledger and filter/sort/slice locally.
    FullScan,
    /// Delegate pagination and sorting to the store; no filters active.
    StorePaginated,
}

/// Pure fetch-strategy decision. Any non-empty filter field, or an open
/// filter panel, forces a full scan.
pub fn decide_fetch_mode(filter: &FilterState, filters_panel_visible: bool) -> FetchMode {
    if !filter.is_empty() || filters_panel_visible {
        FetchMode::FullScan
    } else {
        FetchMode::StorePaginated
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn active(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Apply the filter predicates in their fixed order: host substring,
/// collection-date range, created-date range, global search, group name.
/// Both range bounds are inclusive; the "to" bound covers the whole day.
pub fn apply_filters(records: &[CollectionRecord], filter: &FilterState) -> Vec<CollectionRecord> {
    let mut out: Vec<CollectionRecord> = records.to_vec();

    if let Some(host) = active(&filter.host_name) {
        out.retain(|r| contains_ci(&r.host_name, host));
    }

    if let Some(from) = filter.collection_date_from {
        out.retain(|r| r.collection_date >= from);
    }
    if let Some(to) = filter.collection_date_to {
        out.retain(|r| r.collection_date <= to);
    }

    if let Some(from) = filter.created_at_from {
        out.retain(|r| r.submitted_at.date_naive() >= from);
    }
    if let Some(to) = filter.created_at_to {
        out.retain(|r| r.submitted_at.date_naive() <= to);
    }

    if let Some(needle) = active(&filter.global_search) {
        out.retain(|r| {
            contains_ci(&r.host_name, needle)
                || r.group_collections
                    .iter()
                    .any(|g| contains_ci(&g.name, needle))
                || contains_ci(&r.formatted_collection_date(), needle)
        });
    }

    if let Some(group) = active(&filter.group_name) {
        out.retain(|r| r.group_collections.iter().any(|g| contains_ci(&g.name, group)));
    }

    out
}

fn cmp_nullable<T: Ord>(a: Option<T>, b: Option<T>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => {
            let ord = a.cmp(&b);
            match direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        }
        // Missing sort values go last regardless of direction.
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn host_key(record: &CollectionRecord) -> Option<String> {
    let trimmed = record.host_name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Stable sort by the configured field and direction.
pub fn sort_records(records: &mut [CollectionRecord], sort: SortState) {
    records.sort_by(|a, b| match sort.field {
        SortField::CollectionDate => {
            cmp_nullable(Some(a.collection_date), Some(b.collection_date), sort.direction)
        }
        SortField::HostName => cmp_nullable(host_key(a), host_key(b), sort.direction),
        SortField::IndividualSandwiches => cmp_nullable(
            Some(a.individual_sandwiches),
            Some(b.individual_sandwiches),
            sort.direction,
        ),
        SortField::SubmittedAt => {
            cmp_nullable(Some(a.submitted_at), Some(b.submitted_at), sort.direction)
        }
    });
}

/// Slice out one page: `[(page-1)*size, page*size)`.
pub fn paginate(records: &[CollectionRecord], pagination: PaginationState) -> Vec<CollectionRecord> {
    let p = pagination.clamped();
    records
        .iter()
        .skip((p.page - 1) * p.page_size)
        .take(p.page_size)
        .cloned()
        .collect()
}

/// Identity of one fetch request. Responses are only applied when the view's
/// state still matches the key's generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
    pub mode: FetchMode,
    pub page: usize,
    pub page_size: usize,
    pub filter: FilterState,
    pub sort: SortState,
}

#[derive(Debug, Clone)]
pub struct FetchTicket {
    generation: u64,
    pub key: RequestKey,
}

/// Raw response for one fetch, before it is (maybe) applied.
pub enum FetchPayload {
    FullScan { ledger: Vec<CollectionRecord> },
    StorePage { page: RecordPage, global: ViewStats },
}

/// What the view is currently showing.
#[derive(Debug, Clone)]
pub struct ViewSnapshot {
    pub mode: FetchMode,
    pub records: Vec<CollectionRecord>,
    pub stats: ViewStats,
    pub page: usize,
    pub page_size: usize,
}

/// Coalesces free-text filter edits over a quiet period so a full scan is
/// not triggered per keystroke. Owned by the view session; the timer resets
/// on every input.
pub struct FilterDebouncer {
    quiet: Duration,
    pending: Option<FilterState>,
    deadline: Option<Instant>,
}

impl FilterDebouncer {
    pub fn new(quiet_ms: u64) -> Self {
        Self {
            quiet: Duration::from_millis(quiet_ms),
            pending: None,
            deadline: None,
        }
    }

    /// Record a keystroke's worth of filter state and restart the timer.
    pub fn input(&mut self, filter: FilterState) {
        self.pending = Some(filter);
        self.deadline = Some(Instant::now() + self.quiet);
    }

    /// Non-blocking check: the pending filter, if the quiet period has
    /// elapsed as of `now`.
    pub fn poll_settled(&mut self, now: Instant) -> Option<FilterState> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.pending.take()
            }
            _ => None,
        }
    }

    /// Wait out the quiet period and yield the pending filter, or None if
    /// nothing is pending.
    pub async fn settle(&mut self) -> Option<FilterState> {
        let deadline = self.deadline.take()?;
        tokio::time::sleep_until(deadline).await;
        self.pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// The ledger view session: filter/sort/pagination state, the full-scan
/// cache, and the current snapshot. Single-threaded cooperative use.
pub struct LedgerView {
    store: Arc<dyn LedgerStore>,
    fetch_cap: usize,
    filter: FilterState,
    sort: SortState,
    pagination: PaginationState,
    panel_visible: bool,
    generation: u64,
    scan_cache: Option<Vec<CollectionRecord>>,
    current: Option<ViewSnapshot>,
    last_error: Option<String>,
}

impl LedgerView {
    pub fn new(store: Arc<dyn LedgerStore>, fetch_cap: usize) -> Self {
        Self {
            store,
            fetch_cap,
            filter: FilterState::default(),
            sort: SortState::default(),
            pagination: PaginationState::default(),
            panel_visible: false,
            generation: 0,
            scan_cache: None,
            current: None,
            last_error: None,
        }
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn sort(&self) -> SortState {
        self.sort
    }

    pub fn pagination(&self) -> PaginationState {
        self.pagination
    }

    /// Commit a filter change: supersedes in-flight fetches and resets to
    /// page 1.
    pub fn set_filter(&mut self, filter: FilterState) {
        if filter == self.filter {
            return;
        }
        self.filter = filter;
        self.pagination.page = 1;
        self.generation += 1;
    }

    /// Commit a sort change: supersedes in-flight fetches and resets to
    /// page 1.
    pub fn set_sort(&mut self, sort: SortState) {
        if sort == self.sort {
            return;
        }
        self.sort = sort;
        self.pagination.page = 1;
        self.generation += 1;
    }

    pub fn set_page(&mut self, page: usize) {
        self.pagination.page = page.max(1);
        self.generation += 1;
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.pagination = PaginationState { page: 1, page_size }.clamped();
        self.generation += 1;
    }

    pub fn set_panel_visible(&mut self, visible: bool) {
        if visible != self.panel_visible {
            self.panel_visible = visible;
            self.generation += 1;
        }
    }

    /// Drop the cached full scan; call after any mutation lands.
    pub fn invalidate_scan(&mut self) {
        self.scan_cache = None;
        self.generation += 1;
    }

    pub fn fetch_mode(&self) -> FetchMode {
        decide_fetch_mode(&self.filter, self.panel_visible)
    }

    pub fn request_key(&self) -> RequestKey {
        RequestKey {
            mode: self.fetch_mode(),
            page: self.pagination.page,
            page_size: self.pagination.page_size,
            filter: self.filter.clone(),
            sort: self.sort,
        }
    }

    /// Stamp the current generation onto a ticket for a fetch about to start.
    pub fn begin(&self) -> FetchTicket {
        FetchTicket {
            generation: self.generation,
            key: self.request_key(),
        }
    }

    /// Perform the store round trip for a ticket. Does not touch view state;
    /// pair with [`LedgerView::apply`].
    pub async fn fetch(&self, ticket: &FetchTicket) -> Result<FetchPayload> {
        match ticket.key.mode {
            FetchMode::FullScan => {
                let ledger = match &self.scan_cache {
                    Some(cached) => cached.clone(),
                    None => self.store.fetch_all(self.fetch_cap).await?,
                };
                Ok(FetchPayload::FullScan { ledger })
            }
            FetchMode::StorePaginated => {
                let page = self
                    .store
                    .list_page(ticket.key.page, ticket.key.page_size, ticket.key.sort)
                    .await?;
                let global = self.store.global_stats().await?;
                Ok(FetchPayload::StorePage { page, global })
            }
        }
    }

    /// Apply a fetched payload. Returns false (and changes nothing) when the
    /// ticket was superseded by a newer filter/sort/page edit.
    pub fn apply(&mut self, ticket: FetchTicket, payload: FetchPayload) -> bool {
        if ticket.generation != self.generation {
            debug!(
                stale = ticket.generation,
                current = self.generation,
                "discarding stale fetch response"
            );
            return false;
        }

        let snapshot = match payload {
            FetchPayload::FullScan { ledger } => {
                let filter_active = !self.filter.is_empty();
                let mut filtered = apply_filters(&ledger, &self.filter);
                sort_records(&mut filtered, self.sort);
                let stats = match stats::select_source(filter_active, true) {
                    StatsSource::FilteredSet => stats::compute(&filtered),
                    _ => stats::compute(&ledger),
                };
                let records = paginate(&filtered, self.pagination);
                self.scan_cache = Some(ledger);
                ViewSnapshot {
                    mode: FetchMode::FullScan,
                    records,
                    stats,
                    page: self.pagination.page,
                    page_size: self.pagination.page_size,
                }
            }
            FetchPayload::StorePage { page, global } => ViewSnapshot {
                mode: FetchMode::StorePaginated,
                records: page.records,
                stats: global,
                page: self.pagination.page,
                page_size: self.pagination.page_size,
            },
        };

        self.last_error = None;
        self.current = Some(snapshot);
        true
    }

    /// One-shot fetch-and-apply. On error the previous snapshot is retained
    /// and the error is remembered for display.
    pub async fn refresh(&mut self) -> Result<bool> {
        let ticket = self.begin();
        match self.fetch(&ticket).await {
            Ok(payload) => Ok(self.apply(ticket, payload)),
            Err(err) => {
                warn!(error = %err, "ledger fetch failed, retaining previous page");
                self.last_error = Some(format!("{:#}", err));
                Err(err)
            }
        }
    }

    pub fn current(&self) -> Option<&ViewSnapshot> {
        self.current.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GroupEntry;
    use crate::store::MemoryStore;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn record(id: i64, date: &str, host: &str, individual: u32) -> CollectionRecord {
        CollectionRecord {
            id,
            collection_date: date.parse().unwrap(),
            host_name: host.to_string(),
            individual_sandwiches: individual,
            individual_breakdown: None,
            group_collections: vec![],
            submitted_at: Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap()
                + chrono::Duration::minutes(id),
            created_by: "tester".to_string(),
        }
    }

    #[test]
    fn test_fetch_mode_decision() {
        let empty = FilterState::default();
        assert_eq!(decide_fetch_mode(&empty, false), FetchMode::StorePaginated);
        assert_eq!(decide_fetch_mode(&empty, true), FetchMode::FullScan);

        let filtered = FilterState {
            host_name: Some("Dunwoody".to_string()),
            ..Default::default()
        };
        assert_eq!(decide_fetch_mode(&filtered, false), FetchMode::FullScan);
    }

    #[test]
    fn test_host_filter_is_case_insensitive_substring() {
        let records = vec![
            record(1, "2025-01-01", "Dunwoody High", 1),
            record(2, "2025-01-01", "Roswell", 1),
        ];
        let filter = FilterState {
            host_name: Some("dunwoody".to_string()),
            ..Default::default()
        };
        let out = apply_filters(&records, &filter);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, 1);
    }

    #[test]
    fn test_date_range_bounds_are_inclusive() {
        let records = vec![
            record(1, "2025-01-01", "A", 1),
            record(2, "2025-01-15", "B", 1),
            record(3, "2025-01-31", "C", 1),
            record(4, "2025-02-01", "D", 1),
        ];
        let filter = FilterState {
            collection_date_from: Some(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()),
            collection_date_to: Some(NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()),
            ..Default::default()
        };
        let out = apply_filters(&records, &filter);
        let ids: Vec<i64> = out.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_created_range_covers_end_of_day() {
        let mut r = record(1, "2025-01-01", "A", 1);
        r.submitted_at = Utc.with_ymd_and_hms(2025, 3, 10, 23, 59, 0).unwrap();
        let filter = FilterState {
            created_at_to: Some(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()),
            ..Default::default()
        };
        assert_eq!(apply_filters(&[r], &filter).len(), 1);
    }

    #[test]
    fn test_global_search_matches_groups_and_formatted_date() {
        let mut with_group = record(1, "2025-01-01", "Roswell", 1);
        with_group.group_collections.push(GroupEntry {
            name: "Boy Scouts".to_string(),
            count: 10,
            breakdown: None,
        });
        let plain = record(2, "2025-06-15", "Alpharetta", 1);
        let records = vec![with_group, plain];

        let by_group = FilterState {
            global_search: Some("scouts".to_string()),
            ..Default::default()
        };
        assert_eq!(apply_filters(&records, &by_group)[0].id, 1);

        let by_date = FilterState {
            global_search: Some("06/15/2025".to_string()),
            ..Default::default()
        };
        assert_eq!(apply_filters(&records, &by_date)[0].id, 2);
    }

    #[test]
    fn test_sort_blank_hosts_go_last_in_both_directions() {
        let mut records = vec![
            record(1, "2025-01-01", "", 1),
            record(2, "2025-01-01", "Bravo", 1),
            record(3, "2025-01-01", "alpha", 1),
        ];
        let asc = SortState {
            field: SortField::HostName,
            direction: SortDirection::Asc,
        };
        sort_records(&mut records, asc);
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);

        let desc = SortState {
            field: SortField::HostName,
            direction: SortDirection::Desc,
        };
        sort_records(&mut records, desc);
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_double_reversal_is_idempotent() {
        let mut records = vec![
            record(3, "2025-01-03", "C", 3),
            record(1, "2025-01-01", "A", 1),
            record(2, "2025-01-02", "B", 2),
        ];
        let asc = SortState {
            field: SortField::CollectionDate,
            direction: SortDirection::Asc,
        };
        let desc = SortState {
            field: SortField::CollectionDate,
            direction: SortDirection::Desc,
        };
        sort_records(&mut records, asc);
        let original: Vec<i64> = records.iter().map(|r| r.id).collect();
        sort_records(&mut records, desc);
        sort_records(&mut records, asc);
        let after: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(original, after);
    }

    #[test]
    fn test_paginate_second_page_of_sixty() {
        let records: Vec<CollectionRecord> = (1..=60)
            .map(|i| record(i, "2025-01-01", &format!("Host {:02}", i), 1))
            .collect();
        let page = paginate(
            &records,
            PaginationState {
                page: 2,
                page_size: 25,
            },
        );
        assert_eq!(page.len(), 25);
        assert_eq!(page.first().unwrap().id, 26);
        assert_eq!(page.last().unwrap().id, 50);
    }

    #[test]
    fn test_debouncer_resets_per_keystroke() {
        let mut debouncer = FilterDebouncer::new(500);
        let f1 = FilterState {
            host_name: Some("Dun".to_string()),
            ..Default::default()
        };
        let f2 = FilterState {
            host_name: Some("Dunwoody".to_string()),
            ..Default::default()
        };
        let start = Instant::now();
        debouncer.input(f1);
        debouncer.input(f2.clone());

        assert_eq!(debouncer.poll_settled(start), None);
        let settled = debouncer.poll_settled(start + Duration::from_millis(600));
        assert_eq!(settled, Some(f2));
        // fires at most once per quiet period
        assert_eq!(
            debouncer.poll_settled(start + Duration::from_millis(1200)),
            None
        );
    }

    #[tokio::test]
    async fn test_debouncer_settle_yields_latest() {
        let mut debouncer = FilterDebouncer::new(5);
        let f = FilterState {
            global_search: Some("pta".to_string()),
            ..Default::default()
        };
        debouncer.input(f.clone());
        assert_eq!(debouncer.settle().await, Some(f));
        assert!(!debouncer.has_pending());
    }

    fn dunwoody_ledger() -> Vec<CollectionRecord> {
        let mut records = Vec::new();
        for i in 1..=50 {
            records.push(record(i, "2025-01-01", "Dunwoody High", 10));
        }
        for i in 51..=250 {
            records.push(record(i, "2025-01-01", &format!("Other {}", i), 10));
        }
        records
    }

    #[tokio::test]
    async fn test_filtered_stats_never_use_global_numbers() {
        let store = Arc::new(MemoryStore::with_records(dunwoody_ledger()));
        let mut view = LedgerView::new(store, 10_000);
        view.set_filter(FilterState {
            host_name: Some("Dunwoody".to_string()),
            ..Default::default()
        });

        assert!(view.refresh().await.unwrap());
        let snapshot = view.current().unwrap();
        assert_eq!(snapshot.mode, FetchMode::FullScan);
        assert_eq!(snapshot.stats.total_entries, 50);
        assert_eq!(snapshot.stats.individual_total, 500);
        assert_eq!(
            snapshot.stats.grand_total,
            snapshot.stats.individual_total + snapshot.stats.group_total
        );
    }

    #[tokio::test]
    async fn test_unfiltered_view_uses_store_pagination_and_global_stats() {
        let store = Arc::new(MemoryStore::with_records(dunwoody_ledger()));
        let mut view = LedgerView::new(store, 10_000);

        assert!(view.refresh().await.unwrap());
        let snapshot = view.current().unwrap();
        assert_eq!(snapshot.mode, FetchMode::StorePaginated);
        assert_eq!(snapshot.records.len(), 25);
        assert_eq!(snapshot.stats.total_entries, 250);
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let store = Arc::new(MemoryStore::with_records(dunwoody_ledger()));
        let mut view = LedgerView::new(store, 10_000);
        view.set_filter(FilterState {
            host_name: Some("Dunwoody".to_string()),
            ..Default::default()
        });

        let ticket = view.begin();
        let payload = view.fetch(&ticket).await.unwrap();

        // A newer edit supersedes the in-flight response.
        view.set_filter(FilterState {
            host_name: Some("Other".to_string()),
            ..Default::default()
        });
        assert!(!view.apply(ticket, payload));
        assert!(view.current().is_none());
    }

    #[tokio::test]
    async fn test_filter_change_resets_page() {
        let store = Arc::new(MemoryStore::with_records(dunwoody_ledger()));
        let mut view = LedgerView::new(store, 10_000);
        view.set_page(4);
        assert_eq!(view.pagination().page, 4);
        view.set_filter(FilterState {
            host_name: Some("Dunwoody".to_string()),
            ..Default::default()
        });
        assert_eq!(view.pagination().page, 1);
    }

    struct FailingStore;

    #[async_trait::async_trait]
    impl LedgerStore for FailingStore {
        async fn create_record(
            &self,
            _: &CollectionRecord,
        ) -> Result<CollectionRecord> {
            Err(anyhow::anyhow!("store offline"))
        }
        async fn update_record(&self, _: i64, _: &crate::models::RecordPatch) -> Result<()> {
            Err(anyhow::anyhow!("store offline"))
        }
        async fn delete_record(&self, _: i64) -> Result<()> {
            Err(anyhow::anyhow!("store offline"))
        }
        async fn list_page(
            &self,
            _: usize,
            _: usize,
            _: SortState,
        ) -> Result<crate::store::RecordPage> {
            Err(anyhow::anyhow!("store offline"))
        }
        async fn fetch_all(&self, _: usize) -> Result<Vec<CollectionRecord>> {
            Err(anyhow::anyhow!("store offline"))
        }
        async fn global_stats(&self) -> Result<ViewStats> {
            Err(anyhow::anyhow!("store offline"))
        }
        async fn batch_edit(
            &self,
            _: &[i64],
            _: &crate::models::RecordPatch,
        ) -> Result<crate::models::BatchOutcome> {
            Err(anyhow::anyhow!("store offline"))
        }
        async fn batch_delete(&self, _: &[i64]) -> Result<crate::models::BatchOutcome> {
            Err(anyhow::anyhow!("store offline"))
        }
        async fn clean_selected(&self, _: &[i64]) -> Result<crate::models::BatchOutcome> {
            Err(anyhow::anyhow!("store offline"))
        }
        async fn host_directory(&self) -> Result<crate::hosts::HostDirectory> {
            Err(anyhow::anyhow!("store offline"))
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_retains_previous_snapshot() {
        let store = Arc::new(MemoryStore::with_records(dunwoody_ledger()));
        let mut view = LedgerView::new(store, 10_000);
        assert!(view.refresh().await.unwrap());
        let before = view.current().unwrap().records.len();

        view.store = Arc::new(FailingStore);
        view.invalidate_scan();
        assert!(view.refresh().await.is_err());
        assert_eq!(view.current().unwrap().records.len(), before);
        assert!(view.last_error().is_some());
    }
}
