//! End-to-end engine flow against the in-memory store
//!
//! Exercises the path a review session takes: load a filtered view, confirm
//! the statistics describe the filtered set, run duplicate analysis over the
//! full ledger, resolve a cluster, apply the combined delete, and confirm
//! the refreshed view and totals agree with what survived.

use chrono::{TimeZone, Utc};
use sandwich_ledger::batch::{BatchCoordinator, ClusterResolution};
use sandwich_ledger::duplicates::DuplicateDetector;
use sandwich_ledger::models::{
    CollectionRecord, FilterState, GroupEntry, SortDirection, SortField, SortState,
};
use sandwich_ledger::store::{LedgerStore, MemoryStore};
use sandwich_ledger::view::{FetchMode, LedgerView};
use std::sync::Arc;

fn record(id: i64, date: &str, host: &str, individual: u32) -> CollectionRecord {
    CollectionRecord {
        id,
        collection_date: date.parse().unwrap(),
        host_name: host.to_string(),
        individual_sandwiches: individual,
        individual_breakdown: None,
        group_collections: vec![],
        submitted_at: Utc.with_ymd_and_hms(2025, 2, 1, 9, 0, 0).unwrap()
            + chrono::Duration::minutes(id),
        created_by: "intake".to_string(),
    }
}

fn seed_ledger() -> Vec<CollectionRecord> {
    let mut records = Vec::new();

    // A duplicated submission for Dunwoody (ids 1 and 2, same everything).
    records.push(record(1, "2025-01-10", "Dunwoody High", 30));
    records.push(record(2, "2025-01-10", "Dunwoody High", 30));

    // A suspicious placeholder entry.
    records.push(record(3, "2025-01-11", "test", 5));

    // Regular entries, one with groups.
    let mut with_groups = record(4, "2025-01-12", "Roswell", 20);
    with_groups.group_collections.push(GroupEntry {
        name: "Boy Scouts".to_string(),
        count: 50,
        breakdown: None,
    });
    records.push(with_groups);
    records.push(record(5, "2025-01-13", "Alpharetta", 15));

    records
}

#[tokio::test]
async fn test_review_flow_keeps_view_and_stats_consistent() {
    let store = Arc::new(MemoryStore::with_records(seed_ledger()));
    let mut view = LedgerView::new(store.clone(), 10_000);

    // Filtered view: stats must describe the filtered set, not the ledger.
    view.set_filter(FilterState {
        host_name: Some("Dunwoody".to_string()),
        ..Default::default()
    });
    assert!(view.refresh().await.unwrap());
    {
        let snapshot = view.current().unwrap();
        assert_eq!(snapshot.mode, FetchMode::FullScan);
        assert_eq!(snapshot.stats.total_entries, 2);
        assert_eq!(snapshot.stats.individual_total, 60);
        assert_eq!(
            snapshot.stats.grand_total,
            snapshot.stats.individual_total + snapshot.stats.group_total
        );
    }

    // Explicit full-ledger analysis.
    let ledger = store.fetch_all(10_000).await.unwrap();
    let analysis = DuplicateDetector::default().analyze(&ledger);
    assert_eq!(analysis.exact_clusters.len(), 1);
    assert_eq!(analysis.exact_clusters[0].keep_candidate_id, 2);
    assert_eq!(analysis.suspicious.len(), 1);
    assert_eq!(analysis.suspicious[0].id, 3);

    // Resolve the cluster with the default keep plus the checked suspicious
    // entry, as one combined delete.
    let coordinator = BatchCoordinator::new(store.clone());
    let resolution = ClusterResolution::new(analysis.exact_clusters[0].clone());
    let suspicious_ids: Vec<i64> = analysis.suspicious.iter().map(|s| s.id).collect();
    let outcome = coordinator
        .resolve_duplicates(&[resolution], &suspicious_ids)
        .await
        .unwrap();
    assert_eq!(outcome.affected, 2);
    assert!(!outcome.is_partial());

    // Re-running the same delete is an idempotent qualified success.
    let resolution = ClusterResolution::new(analysis.exact_clusters[0].clone());
    let again = coordinator
        .resolve_duplicates(&[resolution], &suspicious_ids)
        .await
        .unwrap();
    assert_eq!(again.affected, 0);

    // The unfiltered view reflects the cleaned ledger.
    view.set_filter(FilterState::default());
    view.invalidate_scan();
    assert!(view.refresh().await.unwrap());
    let snapshot = view.current().unwrap();
    assert_eq!(snapshot.mode, FetchMode::StorePaginated);
    assert_eq!(snapshot.stats.total_entries, 3);
    assert_eq!(snapshot.stats.individual_total, 65);
    assert_eq!(snapshot.stats.group_total, 50);
    assert_eq!(snapshot.stats.grand_total, 115);
}

#[tokio::test]
async fn test_sorted_filtered_pagination_end_to_end() {
    let mut records = Vec::new();
    for i in 1..=60 {
        records.push(record(
            i,
            "2025-01-10",
            &format!("Dunwoody Site {:02}", i),
            i as u32,
        ));
    }
    let store = Arc::new(MemoryStore::with_records(records));
    let mut view = LedgerView::new(store, 10_000);

    view.set_filter(FilterState {
        host_name: Some("dunwoody".to_string()),
        ..Default::default()
    });
    view.set_sort(SortState {
        field: SortField::IndividualSandwiches,
        direction: SortDirection::Asc,
    });
    view.set_page(2);

    assert!(view.refresh().await.unwrap());
    let snapshot = view.current().unwrap();
    assert_eq!(snapshot.stats.total_entries, 60);
    assert_eq!(snapshot.records.len(), 25);
    assert_eq!(snapshot.records.first().unwrap().individual_sandwiches, 26);
    assert_eq!(snapshot.records.last().unwrap().individual_sandwiches, 50);
}
