//! CSV export
//!
//! Exports the full, unfiltered ledger; the active page and filters are
//! ignored on purpose. Column order is part of the contract with downstream
//! spreadsheets and must not change.

use crate::models::CollectionRecord;
use crate::store::LedgerStore;
use anyhow::{Context, Result};
use std::io::Write;
use tracing::info;

pub const CSV_HEADERS: [&str; 9] = [
    "ID",
    "Host Name",
    "Collection Date",
    "Individual Sandwiches",
    "Group Sandwiches",
    "Group Collections Detail",
    "Total Sandwiches",
    "Submitted At",
    "Created By",
];

/// Write records as CSV in the contract column order.
pub fn write_csv<W: Write>(records: &[CollectionRecord], writer: W) -> Result<()> {
    let mut w = csv::Writer::from_writer(writer);
    w.write_record(CSV_HEADERS)
        .context("Failed to write CSV header")?;

    for record in records {
        w.write_record(&[
            record.id.to_string(),
            record.host_name.clone(),
            record.formatted_collection_date(),
            record.individual_sandwiches.to_string(),
            record.group_total().to_string(),
            record.group_detail(),
            record.total_sandwiches().to_string(),
            record.submitted_at.to_rfc3339(),
            record.created_by.clone(),
        ])
        .with_context(|| format!("Failed to write CSV row for record {}", record.id))?;
    }

    w.flush().context("Failed to flush CSV writer")?;
    Ok(())
}

/// Fetch the entire ledger and write it as CSV. Returns the row count.
pub async fn export_full_ledger<W: Write>(
    store: &dyn LedgerStore,
    cap: usize,
    writer: W,
) -> Result<usize> {
    let records = store.fetch_all(cap).await?;
    write_csv(&records, writer)?;
    info!(rows = records.len(), "ledger exported");
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GroupEntry;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn record(id: i64) -> CollectionRecord {
        CollectionRecord {
            id,
            collection_date: "2025-01-05".parse().unwrap(),
            host_name: "Dunwoody".to_string(),
            individual_sandwiches: 10,
            individual_breakdown: None,
            group_collections: vec![
                GroupEntry {
                    name: "Scouts".to_string(),
                    count: 40,
                    breakdown: None,
                },
                GroupEntry {
                    name: "PTA".to_string(),
                    count: 25,
                    breakdown: None,
                },
            ],
            submitted_at: Utc.with_ymd_and_hms(2025, 1, 6, 12, 0, 0).unwrap(),
            created_by: "intake".to_string(),
        }
    }

    #[test]
    fn test_header_order_is_fixed() {
        let mut out = Vec::new();
        write_csv(&[], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text.lines().next().unwrap(),
            "ID,Host Name,Collection Date,Individual Sandwiches,Group Sandwiches,\
             Group Collections Detail,Total Sandwiches,Submitted At,Created By"
        );
    }

    #[test]
    fn test_row_contents() {
        let mut out = Vec::new();
        write_csv(&[record(7)], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert!(row.starts_with("7,Dunwoody,01/05/2025,10,65,"));
        assert!(row.contains("Scouts: 40; PTA: 25"));
        assert!(row.contains(",75,"));
        assert!(row.ends_with(",intake"));
    }

    #[tokio::test]
    async fn test_export_covers_full_ledger() {
        let store = MemoryStore::with_records(vec![record(1), record(2), record(3)]);
        let mut out = Vec::new();
        let rows = export_full_ledger(&store, 10_000, &mut out).await.unwrap();
        assert_eq!(rows, 3);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 4);
    }
}
