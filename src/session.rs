//! Interactive edit session
//!
//! Pending edits live in an explicit map keyed by `(record id, field)`, and
//! the session owns the commit/cancel/rollback transitions. Mutations are
//! optimistic: the working records reflect staged edits immediately, a
//! pre-edit snapshot is kept, and a failed store confirmation rolls the
//! session back to it.
//!
//! While breakdown mode is active for an entity, its total is derived from
//! the four type fields rather than entered independently; switching
//! breakdown mode off makes the total editable again.

use crate::models::{Breakdown, CollectionRecord, RecordPatch};
use crate::store::LedgerStore;
use crate::validate::validate_record;
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SandwichType {
    Deli,
    Turkey,
    Ham,
    Pbj,
}

impl SandwichType {
    pub fn as_str(&self) -> &str {
        match self {
            SandwichType::Deli => "deli",
            SandwichType::Turkey => "turkey",
            SandwichType::Ham => "ham",
            SandwichType::Pbj => "pbj",
        }
    }
}

fn breakdown_field(breakdown: &mut Breakdown, sandwich_type: SandwichType) -> &mut u32 {
    match sandwich_type {
        SandwichType::Deli => &mut breakdown.deli,
        SandwichType::Turkey => &mut breakdown.turkey,
        SandwichType::Ham => &mut breakdown.ham,
        SandwichType::Pbj => &mut breakdown.pbj,
    }
}

/// Which breakdown a breakdown-mode toggle or type-field edit addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakdownTarget {
    Individual,
    Group(usize),
}

/// Field identity within one record, the key of the pending-change map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditField {
    HostName,
    CollectionDate,
    IndividualSandwiches,
    GroupCount(usize),
    BreakdownType(BreakdownTarget, SandwichType),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Count(u32),
    Date(NaiveDate),
}

/// One staged edit: what the field held before the session touched it, and
/// what it holds now.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    pub previous: FieldValue,
    pub current: FieldValue,
}

/// Editing state over a loaded set of records.
pub struct EditSession {
    records: Vec<CollectionRecord>,
    pending: HashMap<(i64, EditField), PendingChange>,
    snapshot: Option<Vec<CollectionRecord>>,
    breakdown_mode: HashSet<(i64, BreakdownTarget)>,
}

impl EditSession {
    pub fn new(records: Vec<CollectionRecord>) -> Self {
        Self {
            records,
            pending: HashMap::new(),
            snapshot: None,
            breakdown_mode: HashSet::new(),
        }
    }

    pub fn records(&self) -> &[CollectionRecord] {
        &self.records
    }

    pub fn pending(&self) -> &HashMap<(i64, EditField), PendingChange> {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn breakdown_mode_on(&self, id: i64, target: BreakdownTarget) -> bool {
        self.breakdown_mode.contains(&(id, target))
    }

    fn ensure_snapshot(&mut self) {
        if self.snapshot.is_none() {
            self.snapshot = Some(self.records.clone());
        }
    }

    fn record_mut(&mut self, id: i64) -> Result<&mut CollectionRecord> {
        self.records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow!("record {} is not loaded in this session", id))
    }

    fn stage(&mut self, id: i64, field: EditField, previous: FieldValue, current: FieldValue) {
        self.pending
            .entry((id, field))
            .and_modify(|change| change.current = current.clone())
            .or_insert(PendingChange { previous, current });
    }

    pub fn stage_host_name(&mut self, id: i64, host_name: String) -> Result<()> {
        self.ensure_snapshot();
        let record = self.record_mut(id)?;
        let previous = FieldValue::Text(record.host_name.clone());
        record.host_name = host_name.clone();
        self.stage(id, EditField::HostName, previous, FieldValue::Text(host_name));
        Ok(())
    }

    pub fn stage_collection_date(&mut self, id: i64, date: NaiveDate) -> Result<()> {
        self.ensure_snapshot();
        let record = self.record_mut(id)?;
        let previous = FieldValue::Date(record.collection_date);
        record.collection_date = date;
        self.stage(id, EditField::CollectionDate, previous, FieldValue::Date(date));
        Ok(())
    }

    /// Stage an independently entered individual total. Rejected while
    /// breakdown mode is on for the individual entity, where the total is
    /// derived.
    pub fn stage_individual_total(&mut self, id: i64, total: u32) -> Result<()> {
        if self.breakdown_mode_on(id, BreakdownTarget::Individual) {
            return Err(anyhow!(
                "individual total is derived from the breakdown while breakdown entry is active"
            ));
        }
        self.ensure_snapshot();
        let record = self.record_mut(id)?;
        let previous = FieldValue::Count(record.individual_sandwiches);
        record.individual_sandwiches = total;
        self.stage(
            id,
            EditField::IndividualSandwiches,
            previous,
            FieldValue::Count(total),
        );
        Ok(())
    }

    /// Toggle breakdown participation for an entity. Turning it on installs
    /// a zero breakdown if none exists (the total stays until a type field
    /// is edited); turning it off removes the breakdown and leaves the total
    /// independently editable at its current value.
    pub fn set_breakdown_mode(&mut self, id: i64, target: BreakdownTarget, on: bool) -> Result<()> {
        self.ensure_snapshot();
        {
            let record = self.record_mut(id)?;
            match target {
                BreakdownTarget::Individual => {
                    if on && record.individual_breakdown.is_none() {
                        record.individual_breakdown = Some(Breakdown::default());
                    }
                    if !on {
                        record.individual_breakdown = None;
                    }
                }
                BreakdownTarget::Group(index) => {
                    let group = record
                        .group_collections
                        .get_mut(index)
                        .ok_or_else(|| anyhow!("record {} has no group entry {}", id, index))?;
                    if on && group.breakdown.is_none() {
                        group.breakdown = Some(Breakdown::default());
                    }
                    if !on {
                        group.breakdown = None;
                    }
                }
            }
        }
        if on {
            self.breakdown_mode.insert((id, target));
        } else {
            self.breakdown_mode.remove(&(id, target));
        }
        Ok(())
    }

    /// Edit one type field while breakdown mode is active; the entity's
    /// total becomes the live sum of all four fields.
    pub fn stage_breakdown_field(
        &mut self,
        id: i64,
        target: BreakdownTarget,
        sandwich_type: SandwichType,
        value: u32,
    ) -> Result<()> {
        if !self.breakdown_mode_on(id, target) {
            return Err(anyhow!(
                "breakdown mode is not active for record {} ({:?})",
                id,
                target
            ));
        }
        self.ensure_snapshot();
        let (previous, current) = {
            let record = self.record_mut(id)?;
            match target {
                BreakdownTarget::Individual => {
                    let breakdown = record
                        .individual_breakdown
                        .get_or_insert_with(Breakdown::default);
                    let field = breakdown_field(breakdown, sandwich_type);
                    let previous = *field;
                    *field = value;
                    record.individual_sandwiches = breakdown.sum();
                    (previous, value)
                }
                BreakdownTarget::Group(index) => {
                    let group = record
                        .group_collections
                        .get_mut(index)
                        .ok_or_else(|| anyhow!("record {} has no group entry {}", id, index))?;
                    let breakdown = group.breakdown.get_or_insert_with(Breakdown::default);
                    let field = breakdown_field(breakdown, sandwich_type);
                    let previous = *field;
                    *field = value;
                    group.count = breakdown.sum();
                    (previous, value)
                }
            }
        };
        self.stage(
            id,
            EditField::BreakdownType(target, sandwich_type),
            FieldValue::Count(previous),
            FieldValue::Count(current),
        );
        Ok(())
    }

    /// Ids with at least one staged edit.
    pub fn touched_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.pending.keys().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Discard all staged edits and restore the pre-edit snapshot.
    pub fn cancel(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.records = snapshot;
        }
        self.pending.clear();
        self.breakdown_mode.clear();
    }

    /// Full revert after a failed store confirmation: the records return to
    /// the pre-edit snapshot and the staged edits are dropped with them, so
    /// a later commit cannot re-submit pre-edit values as if they were the
    /// user's edit.
    fn rollback(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.records = snapshot;
        }
        self.pending.clear();
        self.breakdown_mode.clear();
    }

    /// Validate and submit every touched record. Validation failures block
    /// the whole commit locally; a store failure rolls the working records
    /// back to the pre-edit snapshot.
    pub async fn commit(&mut self, store: &dyn LedgerStore) -> Result<usize> {
        let touched = self.touched_ids();
        if touched.is_empty() {
            return Ok(0);
        }

        for id in &touched {
            let record = self
                .records
                .iter()
                .find(|r| r.id == *id)
                .ok_or_else(|| anyhow!("record {} disappeared from session", id))?;
            validate_record(record)
                .with_context(|| format!("record {} failed validation", id))?;
        }

        for id in &touched {
            let record = self.records.iter().find(|r| r.id == *id).cloned();
            let record = record.ok_or_else(|| anyhow!("record {} disappeared from session", id))?;
            let patch = RecordPatch {
                collection_date: Some(record.collection_date),
                host_name: Some(record.host_name.clone()),
                individual_sandwiches: Some(record.individual_sandwiches),
                individual_breakdown: Some(record.individual_breakdown.unwrap_or_default()),
                group_collections: Some(record.group_collections.clone()),
            };
            if let Err(err) = store.update_record(*id, &patch).await {
                warn!(record = id, error = %err, "update rejected, rolling back session");
                self.rollback();
                return Err(err);
            }
        }

        info!(records = touched.len(), "edit session committed");
        self.pending.clear();
        self.snapshot = None;
        Ok(touched.len())
    }
}
