//! Duplicate and bad-entry detection
//!
//! Three independent modes over the full ledger, run only on explicit user
//! action. All three are report-only: they return ids plus enough
//! denormalized context for human review, and the decision of what to delete
//! stays with the reviewer (see `batch.rs`).
//!
//! - Exact: records sharing a composite identity key form a cluster.
//! - Suspicious: individual records whose host name trips a configurable
//!   rule set of known data-entry problems.
//! - Historical aggregate ("OG"): one specific early import produced both an
//!   aggregate entry and the entries it aggregates; candidate pairings are
//!   reported with a reason string, never auto-resolved.

use crate::models::{normalize_host_name, CollectionRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Records identified as the same real-world submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCluster {
    /// Composite identity key shared by every member.
    pub key: String,
    /// Full member records, for review display.
    pub members: Vec<CollectionRecord>,
    /// Default survivor: latest `submitted_at`, ties broken by highest id.
    pub keep_candidate_id: i64,
    /// Everything except the keep candidate.
    pub delete_candidate_ids: Vec<i64>,
}

/// One record flagged by the suspicious-pattern rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspiciousEntry {
    pub id: i64,
    pub host_name: String,
    pub collection_date: String,
    pub total_sandwiches: u32,
    pub rule: String,
    pub reason: String,
}

/// A candidate historical-aggregate pairing: one aggregate-labeled entry and
/// the same-date entries that together (or singly) duplicate its total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatePair {
    pub aggregate_id: i64,
    pub member_ids: Vec<i64>,
    pub reason: String,
}

/// Combined output of all three modes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuplicateAnalysis {
    pub exact_clusters: Vec<DuplicateCluster>,
    pub suspicious: Vec<SuspiciousEntry>,
    pub aggregate_pairs: Vec<AggregatePair>,
}

impl DuplicateAnalysis {
    pub fn is_clean(&self) -> bool {
        self.exact_clusters.is_empty()
            && self.suspicious.is_empty()
            && self.aggregate_pairs.is_empty()
    }
}

/// Host-name patterns treated as data-entry problems. The set is data, not
/// code: callers can extend or replace the placeholder list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspiciousRules {
    /// Exact (case-insensitive, trimmed) placeholder names.
    pub placeholders: Vec<String>,
    /// Flag names consisting solely of digits.
    pub flag_digits_only: bool,
    /// Flag names consisting solely of punctuation.
    pub flag_punctuation_only: bool,
    /// Flag single-character names.
    pub flag_single_char: bool,
}

impl Default for SuspiciousRules {
    fn default() -> Self {
        Self {
            placeholders: [
                "test", "testing", "unknown", "n/a", "na", "none", "tbd", "x", "asdf",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            flag_digits_only: true,
            flag_punctuation_only: true,
            flag_single_char: true,
        }
    }
}

impl SuspiciousRules {
    /// Returns `(rule, reason)` when the host name trips a rule.
    fn check(&self, host_name: &str) -> Option<(String, String)> {
        let trimmed = host_name.trim();
        if trimmed.is_empty() {
            return Some((
                "blank".to_string(),
                "host name is blank or whitespace".to_string(),
            ));
        }

        let lowered = trimmed.to_lowercase();
        if self.placeholders.iter().any(|p| p == &lowered) {
            return Some((
                "placeholder".to_string(),
                format!("host name '{}' is placeholder text", trimmed),
            ));
        }

        if self.flag_digits_only && trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Some((
                "digits_only".to_string(),
                format!("host name '{}' contains only digits", trimmed),
            ));
        }

        if self.flag_punctuation_only && trimmed.chars().all(|c| c.is_ascii_punctuation()) {
            return Some((
                "punctuation_only".to_string(),
                format!("host name '{}' contains only punctuation", trimmed),
            ));
        }

        if self.flag_single_char && trimmed.chars().count() == 1 {
            return Some((
                "single_char".to_string(),
                format!("host name '{}' is a single character", trimmed),
            ));
        }

        None
    }
}

/// Full-ledger duplicate detector. Holds the suspicious rule set and the
/// historical aggregate host label.
#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    pub rules: SuspiciousRules,
    /// Host label the early bulk import used for its aggregate rows.
    pub aggregate_host: String,
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self {
            rules: SuspiciousRules::default(),
            aggregate_host: "OG Sandwich Project".to_string(),
        }
    }
}

impl DuplicateDetector {
    /// Composite identity key: date, normalized host, individual count, and
    /// a canonical serialization of the group list sorted by (name, count).
    fn exact_key(record: &CollectionRecord) -> String {
        let mut groups: Vec<(String, u32)> = record
            .group_collections
            .iter()
            .map(|g| (g.name.clone(), g.count))
            .collect();
        groups.sort();
        let groups_sig = groups
            .iter()
            .map(|(name, count)| format!("{}:{}", name, count))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{}|{}|{}|[{}]",
            record.collection_date,
            normalize_host_name(&record.host_name),
            record.individual_sandwiches,
            groups_sig
        )
    }

    /// Exact-duplicate mode: group records by identity key, emit clusters of
    /// two or more, and pick the keep candidate per cluster.
    pub fn exact_clusters(&self, records: &[CollectionRecord]) -> Vec<DuplicateCluster> {
        let mut by_key: BTreeMap<String, Vec<&CollectionRecord>> = BTreeMap::new();
        for record in records {
            by_key.entry(Self::exact_key(record)).or_default().push(record);
        }

        by_key
            .into_iter()
            .filter(|(_, members)| members.len() >= 2)
            .map(|(key, members)| {
                let keep = members
                    .iter()
                    .max_by_key(|r| (r.submitted_at, r.id))
                    .map(|r| r.id)
                    .unwrap_or_default();
                let delete_candidate_ids = members
                    .iter()
                    .map(|r| r.id)
                    .filter(|&id| id != keep)
                    .collect();
                DuplicateCluster {
                    key,
                    members: members.into_iter().cloned().collect(),
                    keep_candidate_id: keep,
                    delete_candidate_ids,
                }
            })
            .collect()
    }

    /// Suspicious-pattern mode: flag individual records whose host name
    /// matches the rule set.
    pub fn suspicious_entries(&self, records: &[CollectionRecord]) -> Vec<SuspiciousEntry> {
        records
            .iter()
            .filter_map(|record| {
                let (rule, reason) = self.rules.check(&record.host_name)?;
                Some(SuspiciousEntry {
                    id: record.id,
                    host_name: record.host_name.clone(),
                    collection_date: record.formatted_collection_date(),
                    total_sandwiches: record.total_sandwiches(),
                    rule,
                    reason,
                })
            })
            .collect()
    }

    /// Historical-aggregate mode: for each entry carrying the aggregate host
    /// label, look at the other entries on the same date and report a pairing
    /// when one of them (or all of them together) matches the aggregate's
    /// total exactly.
    pub fn aggregate_pairs(&self, records: &[CollectionRecord]) -> Vec<AggregatePair> {
        let aggregate_key = normalize_host_name(&self.aggregate_host);
        let mut pairs = Vec::new();

        for aggregate in records {
            if normalize_host_name(&aggregate.host_name) != aggregate_key {
                continue;
            }
            let aggregate_total = aggregate.total_sandwiches();

            let same_date: Vec<&CollectionRecord> = records
                .iter()
                .filter(|r| {
                    r.id != aggregate.id
                        && r.collection_date == aggregate.collection_date
                        && normalize_host_name(&r.host_name) != aggregate_key
                })
                .collect();
            if same_date.is_empty() {
                continue;
            }

            // A single same-date entry matching the aggregate total is the
            // strongest signal.
            for candidate in &same_date {
                if candidate.total_sandwiches() == aggregate_total {
                    pairs.push(AggregatePair {
                        aggregate_id: aggregate.id,
                        member_ids: vec![candidate.id],
                        reason: format!(
                            "'{}' on {} totals {}, matching aggregate entry {} exactly",
                            candidate.host_name,
                            candidate.formatted_collection_date(),
                            aggregate_total,
                            aggregate.id
                        ),
                    });
                }
            }

            // Otherwise, the whole same-date set may have been imported twice:
            // once itemized and once as the aggregate row.
            let combined: u32 = same_date.iter().map(|r| r.total_sandwiches()).sum();
            if same_date.len() > 1 && combined == aggregate_total {
                pairs.push(AggregatePair {
                    aggregate_id: aggregate.id,
                    member_ids: same_date.iter().map(|r| r.id).collect(),
                    reason: format!(
                        "{} entries on {} sum to {}, matching aggregate entry {}",
                        same_date.len(),
                        aggregate.formatted_collection_date(),
                        aggregate_total,
                        aggregate.id
                    ),
                });
            }
        }

        pairs
    }

    /// Run all three modes over the full ledger.
    pub fn analyze(&self, records: &[CollectionRecord]) -> DuplicateAnalysis {
        let analysis = DuplicateAnalysis {
            exact_clusters: self.exact_clusters(records),
            suspicious: self.suspicious_entries(records),
            aggregate_pairs: self.aggregate_pairs(records),
        };
        info!(
            clusters = analysis.exact_clusters.len(),
            suspicious = analysis.suspicious.len(),
            aggregate_pairs = analysis.aggregate_pairs.len(),
            scanned = records.len(),
            "duplicate analysis complete"
        );
        analysis
    }
}
