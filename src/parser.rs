//! Wire-record normalization
//!
//! The store's history includes records written before group collections
//! became a proper array: those carry up to two legacy column pairs
//! (`group1_name`/`group1_count`, `group2_name`/`group2_count`). This module
//! is the single point where that legacy shape is visible; everything
//! downstream sees only the canonical `Vec<GroupEntry>`.

use crate::models::{Breakdown, CollectionRecord, GroupEntry};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A group entry as it appears on the wire. Name and count may be missing or
/// malformed; per-type fields are flattened next to the count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawGroupEntry {
    #[serde(default, alias = "groupName")]
    pub name: Option<String>,
    #[serde(default, alias = "sandwichCount")]
    pub count: Option<i64>,
    #[serde(default)]
    pub deli: Option<u32>,
    #[serde(default)]
    pub turkey: Option<u32>,
    #[serde(default)]
    pub ham: Option<u32>,
    #[serde(default)]
    pub pbj: Option<u32>,
}

/// A ledger record as the store returns it, canonical and legacy fields both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCollectionRecord {
    pub id: i64,
    pub collection_date: NaiveDate,
    pub host_name: String,
    #[serde(default)]
    pub individual_sandwiches: u32,
    #[serde(default)]
    pub individual_breakdown: Option<Breakdown>,
    #[serde(default)]
    pub group_collections: Option<Vec<RawGroupEntry>>,
    #[serde(default)]
    pub group1_name: Option<String>,
    #[serde(default)]
    pub group1_count: Option<i64>,
    #[serde(default)]
    pub group2_name: Option<String>,
    #[serde(default)]
    pub group2_count: Option<i64>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: Option<String>,
}

fn legacy_entry(name: &Option<String>, count: Option<i64>) -> Option<GroupEntry> {
    let name = name.as_deref()?.trim();
    let count = count?;
    if name.is_empty() || count <= 0 {
        return None;
    }
    Some(GroupEntry {
        name: name.to_string(),
        count: count as u32,
        breakdown: None,
    })
}

/// Normalize a raw record's group data into the canonical entry list.
///
/// The canonical array wins whenever it is present and non-empty; legacy
/// columns are consulted only as a fallback. Entries with blank names or
/// non-positive counts are dropped in both shapes.
pub fn parse_group_collections(raw: &RawCollectionRecord) -> Vec<GroupEntry> {
    if let Some(ref entries) = raw.group_collections {
        let parsed: Vec<GroupEntry> = entries
            .iter()
            .filter_map(|e| {
                let name = e.name.as_deref()?.trim();
                let count = e.count?;
                if name.is_empty() || count <= 0 {
                    return None;
                }
                let breakdown = Breakdown {
                    deli: e.deli.unwrap_or(0),
                    turkey: e.turkey.unwrap_or(0),
                    ham: e.ham.unwrap_or(0),
                    pbj: e.pbj.unwrap_or(0),
                };
                Some(GroupEntry {
                    name: name.to_string(),
                    count: count as u32,
                    breakdown: breakdown.is_specified().then_some(breakdown),
                })
            })
            .collect();
        if !parsed.is_empty() {
            return parsed;
        }
    }

    let mut entries = Vec::with_capacity(2);
    if let Some(e) = legacy_entry(&raw.group1_name, raw.group1_count) {
        entries.push(e);
    }
    if let Some(e) = legacy_entry(&raw.group2_name, raw.group2_count) {
        entries.push(e);
    }
    entries
}

/// Convert a wire record into the canonical domain shape. This is the read
/// boundary: every record entering the engine passes through here.
pub fn normalize_record(raw: RawCollectionRecord) -> CollectionRecord {
    let group_collections = parse_group_collections(&raw);
    CollectionRecord {
        id: raw.id,
        collection_date: raw.collection_date,
        host_name: raw.host_name,
        individual_sandwiches: raw.individual_sandwiches,
        individual_breakdown: raw
            .individual_breakdown
            .filter(|b| b.is_specified()),
        group_collections,
        submitted_at: raw.submitted_at,
        created_by: raw.created_by.unwrap_or_default(),
    }
}
