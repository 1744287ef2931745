//! Batch mutation coordination
//!
//! Turns user selections, including duplicate-cluster keep choices, into
//! single batch requests against the store. Partial success (`affected <
//! requested`) is a reportable outcome, never a hard failure. A duplicate-
//! resolution delete cannot be re-submitted while one is already in flight.

use crate::duplicates::DuplicateCluster;
use crate::models::{BatchOutcome, RecordPatch};
use crate::store::LedgerStore;
use anyhow::{anyhow, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

/// A reviewed duplicate cluster: exactly one member survives. The keep
/// defaults to the detector's candidate and can be overridden to any other
/// member, never to an outside id.
#[derive(Debug, Clone)]
pub struct ClusterResolution {
    cluster: DuplicateCluster,
    keep_id: i64,
}

impl ClusterResolution {
    pub fn new(cluster: DuplicateCluster) -> Self {
        let keep_id = cluster.keep_candidate_id;
        Self { cluster, keep_id }
    }

    pub fn keep_id(&self) -> i64 {
        self.keep_id
    }

    /// Override which member to keep. Mutually exclusive by construction:
    /// setting a new keep replaces the old one.
    pub fn set_keep(&mut self, id: i64) -> Result<()> {
        if !self.cluster.members.iter().any(|m| m.id == id) {
            return Err(anyhow!(
                "record {} is not a member of cluster {}",
                id,
                self.cluster.key
            ));
        }
        self.keep_id = id;
        Ok(())
    }

    /// Every member except the keep.
    pub fn delete_set(&self) -> Vec<i64> {
        self.cluster
            .members
            .iter()
            .map(|m| m.id)
            .filter(|&id| id != self.keep_id)
            .collect()
    }
}

/// Union of all resolved clusters' delete sets plus individually checked
/// suspicious/aggregate ids, deduplicated and ordered.
pub fn combined_delete_set(resolutions: &[ClusterResolution], extra_ids: &[i64]) -> Vec<i64> {
    let mut ids: BTreeSet<i64> = extra_ids.iter().copied().collect();
    for resolution in resolutions {
        ids.extend(resolution.delete_set());
    }
    // A keep choice always wins over an extra checkbox on the same id.
    for resolution in resolutions {
        ids.remove(&resolution.keep_id);
    }
    ids.into_iter().collect()
}

/// Submits batch mutations and guards the duplicate-resolution path against
/// re-submission while a delete is in flight.
pub struct BatchCoordinator {
    store: Arc<dyn LedgerStore>,
    resolution_gate: tokio::sync::Mutex<()>,
}

impl BatchCoordinator {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            resolution_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// One request for many edits.
    pub async fn batch_edit(&self, ids: &[i64], patch: &RecordPatch) -> Result<BatchOutcome> {
        let outcome = self.store.batch_edit(ids, patch).await?;
        if outcome.is_partial() {
            info!(
                affected = outcome.affected,
                requested = outcome.requested,
                "batch edit partially applied"
            );
        }
        Ok(outcome)
    }

    /// One request for many deletes.
    pub async fn batch_delete(&self, ids: &[i64]) -> Result<BatchOutcome> {
        let outcome = self.store.batch_delete(ids).await?;
        if outcome.is_partial() {
            info!(
                affected = outcome.affected,
                requested = outcome.requested,
                "batch delete partially applied"
            );
        }
        Ok(outcome)
    }

    /// Turn reviewed clusters plus individually checked ids into one
    /// combined delete. Errors immediately if a resolution delete is already
    /// in flight; callers must not re-submit until the first completes.
    pub async fn resolve_duplicates(
        &self,
        resolutions: &[ClusterResolution],
        extra_ids: &[i64],
    ) -> Result<BatchOutcome> {
        let _gate = self
            .resolution_gate
            .try_lock()
            .map_err(|_| anyhow!("a duplicate cleanup is already in progress"))?;

        let ids = combined_delete_set(resolutions, extra_ids);
        if ids.is_empty() {
            return Ok(BatchOutcome {
                affected: 0,
                requested: 0,
            });
        }

        let outcome = self.store.clean_selected(&ids).await?;
        info!(
            clusters = resolutions.len(),
            deleted = outcome.affected,
            requested = outcome.requested,
            "duplicate resolution applied"
        );
        Ok(outcome)
    }
}
