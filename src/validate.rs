//! Breakdown-sum invariant enforcement
//!
//! A breakdown participates in validation only when at least one of its four
//! type fields is nonzero; a fully-zero breakdown means "not specified" and
//! places no constraint on the entity's total. Validation runs before every
//! remote submit; during interactive breakdown editing the total is derived
//! from the four fields (see `session.rs`), so the invariant holds by
//! construction there.

use crate::models::{Breakdown, CollectionRecord};

/// Validation failures that block a local submit. Never sent to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The four type fields sum to something other than the declared total.
    BreakdownMismatch { sum: u32, total: u32 },
    /// A group entry has a blank name or zero count.
    InvalidGroupEntry { index: usize, reason: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BreakdownMismatch { sum, total } => write!(
                f,
                "breakdown types sum to {} but the declared total is {}",
                sum, total
            ),
            Self::InvalidGroupEntry { index, reason } => {
                write!(f, "group entry {}: {}", index, reason)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Check one entity's breakdown against its declared total.
///
/// Returns Ok when the breakdown is unspecified (all four fields zero).
pub fn validate_breakdown(total: u32, breakdown: &Breakdown) -> Result<(), ValidationError> {
    let sum = breakdown.sum();
    if sum == 0 {
        return Ok(());
    }
    if sum != total {
        return Err(ValidationError::BreakdownMismatch { sum, total });
    }
    Ok(())
}

/// Validate a full record: the individual breakdown and, independently,
/// every group entry that carries a specified breakdown.
pub fn validate_record(record: &CollectionRecord) -> Result<(), ValidationError> {
    if let Some(ref breakdown) = record.individual_breakdown {
        validate_breakdown(record.individual_sandwiches, breakdown)?;
    }

    for (index, group) in record.group_collections.iter().enumerate() {
        if group.name.trim().is_empty() {
            return Err(ValidationError::InvalidGroupEntry {
                index,
                reason: "name is empty".to_string(),
            });
        }
        if group.count == 0 {
            return Err(ValidationError::InvalidGroupEntry {
                index,
                reason: "count is zero".to_string(),
            });
        }
        if let Some(ref breakdown) = group.breakdown {
            validate_breakdown(group.count, breakdown)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GroupEntry;
    use chrono::{NaiveDate, Utc};

    fn record_with(individual: u32, breakdown: Option<Breakdown>) -> CollectionRecord {
        CollectionRecord {
            id: 1,
            collection_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            host_name: "Dunwoody".to_string(),
            individual_sandwiches: individual,
            individual_breakdown: breakdown,
            group_collections: vec![],
            submitted_at: Utc::now(),
            created_by: "tester".to_string(),
        }
    }

    #[test]
    fn test_matching_breakdown_is_valid() {
        let b = Breakdown {
            deli: 5,
            turkey: 7,
            ham: 0,
            pbj: 0,
        };
        assert!(validate_breakdown(12, &b).is_ok());
    }

    #[test]
    fn test_mismatch_carries_both_values() {
        let b = Breakdown {
            deli: 5,
            turkey: 8,
            ham: 0,
            pbj: 0,
        };
        let err = validate_breakdown(12, &b).unwrap_err();
        assert_eq!(err, ValidationError::BreakdownMismatch { sum: 13, total: 12 });
    }

    #[test]
    fn test_unspecified_breakdown_is_unconstrained() {
        assert!(validate_breakdown(42, &Breakdown::default()).is_ok());
    }

    #[test]
    fn test_record_checks_groups_independently() {
        let mut record = record_with(10, None);
        record.group_collections.push(GroupEntry {
            name: "Scouts".to_string(),
            count: 20,
            breakdown: Some(Breakdown {
                deli: 10,
                turkey: 5,
                ham: 5,
                pbj: 0,
            }),
        });
        assert!(validate_record(&record).is_ok());

        record.group_collections[0].breakdown = Some(Breakdown {
            deli: 10,
            turkey: 5,
            ham: 0,
            pbj: 0,
        });
        let err = validate_record(&record).unwrap_err();
        assert_eq!(err, ValidationError::BreakdownMismatch { sum: 15, total: 20 });
    }

    #[test]
    fn test_record_rejects_blank_group_name() {
        let mut record = record_with(0, None);
        record.group_collections.push(GroupEntry {
            name: "  ".to_string(),
            count: 5,
            breakdown: None,
        });
        assert!(matches!(
            validate_record(&record),
            Err(ValidationError::InvalidGroupEntry { index: 0, .. })
        ));
    }
}
