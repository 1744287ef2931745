//! Core domain types for the collection ledger
//!
//! Everything downstream (validation, duplicate detection, view engine,
//! statistics) works on these canonical shapes. The only place raw wire
//! records with legacy columns are visible is `parser.rs`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Per-sandwich-type subcounts attached to an individual total or a group
/// entry's count. A breakdown whose four fields are all zero counts as
/// "not specified" and is unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakdown {
    #[serde(default)]
    pub deli: u32,
    #[serde(default)]
    pub turkey: u32,
    #[serde(default)]
    pub ham: u32,
    #[serde(default)]
    pub pbj: u32,
}

impl Breakdown {
    /// Saturating so unbounded wire values cannot overflow the sum.
    pub fn sum(&self) -> u32 {
        self.deli
            .saturating_add(self.turkey)
            .saturating_add(self.ham)
            .saturating_add(self.pbj)
    }

    /// True when at least one type field is nonzero, i.e. the breakdown
    /// participates in the sum invariant.
    pub fn is_specified(&self) -> bool {
        self.sum() > 0
    }
}

/// One named group contribution within a collection record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntry {
    pub name: String,
    pub count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Breakdown>,
}

/// A single ledger entry: one host's sandwich collection for one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub id: i64,
    /// Calendar date of the collection, no time component.
    pub collection_date: NaiveDate,
    pub host_name: String,
    pub individual_sandwiches: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub individual_breakdown: Option<Breakdown>,
    #[serde(default)]
    pub group_collections: Vec<GroupEntry>,
    pub submitted_at: DateTime<Utc>,
    pub created_by: String,
}

impl CollectionRecord {
    /// Sum of all group entry counts.
    pub fn group_total(&self) -> u32 {
        self.group_collections.iter().map(|g| g.count).sum()
    }

    /// Individual plus group sandwiches.
    pub fn total_sandwiches(&self) -> u32 {
        self.individual_sandwiches + self.group_total()
    }

    /// Collection date as shown to users (and matched by global search).
    pub fn formatted_collection_date(&self) -> String {
        self.collection_date.format("%m/%d/%Y").to_string()
    }

    /// `"name: count; name: count"` rendering used by exports and review UIs.
    pub fn group_detail(&self) -> String {
        self.group_collections
            .iter()
            .map(|g| format!("{}: {}", g.name, g.count))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Host name as used for duplicate keys: trimmed, lowercased, inner
/// whitespace collapsed.
pub fn normalize_host_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Active filter fields for the ledger view. "No filters" means every field
/// is `None` or blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    pub global_search: Option<String>,
    pub host_name: Option<String>,
    pub group_name: Option<String>,
    pub collection_date_from: Option<NaiveDate>,
    pub collection_date_to: Option<NaiveDate>,
    pub created_at_from: Option<NaiveDate>,
    pub created_at_to: Option<NaiveDate>,
}

fn blank(field: &Option<String>) -> bool {
    field.as_deref().map_or(true, |s| s.trim().is_empty())
}

impl FilterState {
    pub fn is_empty(&self) -> bool {
        blank(&self.global_search)
            && blank(&self.host_name)
            && blank(&self.group_name)
            && self.collection_date_from.is_none()
            && self.collection_date_to.is_none()
            && self.created_at_from.is_none()
            && self.created_at_to.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    CollectionDate,
    HostName,
    IndividualSandwiches,
    SubmittedAt,
}

impl SortField {
    pub fn as_str(&self) -> &str {
        match self {
            SortField::CollectionDate => "collection_date",
            SortField::HostName => "host_name",
            SortField::IndividualSandwiches => "individual_sandwiches",
            SortField::SubmittedAt => "submitted_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortState {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for SortState {
    fn default() -> Self {
        Self {
            field: SortField::CollectionDate,
            direction: SortDirection::Desc,
        }
    }
}

/// Allowed page sizes for the ledger view.
pub const PAGE_SIZES: [usize; 4] = [25, 50, 100, 200];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaginationState {
    pub page: usize,
    pub page_size: usize,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: PAGE_SIZES[0],
        }
    }
}

impl PaginationState {
    /// Clamp to a legal state: page >= 1, page_size one of [`PAGE_SIZES`].
    pub fn clamped(self) -> Self {
        let page = self.page.max(1);
        let page_size = if PAGE_SIZES.contains(&self.page_size) {
            self.page_size
        } else {
            PAGE_SIZES[0]
        };
        Self { page, page_size }
    }
}

/// Aggregate totals shown alongside the ledger view. `grand_total` is always
/// `individual_total + group_total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewStats {
    pub total_entries: usize,
    pub individual_total: u64,
    pub group_total: u64,
    pub grand_total: u64,
}

/// Outcome of a batch mutation. `affected < requested` is a partial success,
/// not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub affected: usize,
    pub requested: usize,
}

impl BatchOutcome {
    pub fn is_partial(&self) -> bool {
        self.affected < self.requested
    }
}

/// Sparse partial record used by single-record updates and batch edit. Only
/// set fields are applied. A fully-zero breakdown clears the stored one
/// (zero sum means "not specified").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub individual_sandwiches: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub individual_breakdown: Option<Breakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_collections: Option<Vec<GroupEntry>>,
}

impl RecordPatch {
    pub fn apply(&self, record: &mut CollectionRecord) {
        if let Some(date) = self.collection_date {
            record.collection_date = date;
        }
        if let Some(ref host) = self.host_name {
            record.host_name = host.clone();
        }
        if let Some(n) = self.individual_sandwiches {
            record.individual_sandwiches = n;
        }
        if let Some(b) = self.individual_breakdown {
            record.individual_breakdown = b.is_specified().then_some(b);
        }
        if let Some(ref groups) = self.group_collections {
            record.group_collections = groups.clone();
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub store_base_url: String,
    pub api_key: Option<String>,
    /// Upper bound on full-scan fetches.
    pub fetch_cap: usize,
    /// Quiet period for free-text filter debouncing.
    pub debounce_ms: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let store_base_url = std::env::var("LEDGER_STORE_URL")
            .unwrap_or_else(|_| "http://localhost:8080/api".to_string());

        let api_key = std::env::var("LEDGER_API_KEY").ok();

        let fetch_cap = std::env::var("LEDGER_FETCH_CAP")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .unwrap_or(10_000);

        let debounce_ms = std::env::var("LEDGER_DEBOUNCE_MS")
            .unwrap_or_else(|_| "500".to_string())
            .parse()
            .unwrap_or(500);

        Ok(Self {
            store_base_url,
            api_key,
            fetch_cap,
            debounce_ms,
        })
    }
}
