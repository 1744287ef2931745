//! Host directory annotation
//!
//! The host directory is display-only metadata: views may badge a record's
//! host as active or inactive, but validation, duplicate detection, and
//! aggregation never consult it.

use crate::models::normalize_host_name;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    Active,
    Inactive,
}

/// Read-only lookup from host name to status.
#[derive(Debug, Clone, Default)]
pub struct HostDirectory {
    by_name: HashMap<String, HostStatus>,
}

impl HostDirectory {
    pub fn new(entries: impl IntoIterator<Item = (String, HostStatus)>) -> Self {
        let by_name = entries
            .into_iter()
            .map(|(name, status)| (normalize_host_name(&name), status))
            .collect();
        Self { by_name }
    }

    /// Status for a host name, if the directory knows it. Lookup is
    /// normalization-insensitive, matching how hosts are keyed elsewhere.
    pub fn status(&self, host_name: &str) -> Option<HostStatus> {
        self.by_name.get(&normalize_host_name(host_name)).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
