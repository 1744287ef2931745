//! Remote ledger store client
//!
//! The store is an opaque network service: it owns persistence, conflict
//! resolution (last-write-wins), and a precomputed global aggregate. This
//! module defines the seam (`LedgerStore`), the production HTTP client
//! (`RestLedgerStore`), and an in-process double (`MemoryStore`) used by
//! tests and the integration suite.

use crate::hosts::{HostDirectory, HostStatus};
use crate::models::{
    BatchOutcome, CollectionRecord, RecordPatch, SortState, ViewStats,
};
use crate::parser::{normalize_record, RawCollectionRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One page of records plus the store's total count.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<CollectionRecord>,
    pub total: usize,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create a record; the store assigns the id.
    async fn create_record(&self, record: &CollectionRecord) -> Result<CollectionRecord>;

    /// Apply a sparse patch to one record.
    async fn update_record(&self, id: i64, patch: &RecordPatch) -> Result<()>;

    async fn delete_record(&self, id: i64) -> Result<()>;

    /// Filter-free paginated, sorted listing. Page numbers start at 1.
    async fn list_page(&self, page: usize, page_size: usize, sort: SortState)
        -> Result<RecordPage>;

    /// Entire ledger, bounded by `cap`.
    async fn fetch_all(&self, cap: usize) -> Result<Vec<CollectionRecord>>;

    /// Precomputed global aggregate maintained by the store.
    async fn global_stats(&self) -> Result<ViewStats>;

    /// One request for many edits; shortfall is reported, not raised.
    async fn batch_edit(&self, ids: &[i64], patch: &RecordPatch) -> Result<BatchOutcome>;

    /// One request for many deletes; already-gone ids count as not deleted.
    async fn batch_delete(&self, ids: &[i64]) -> Result<BatchOutcome>;

    /// Delete an explicit id list produced by duplicate review.
    async fn clean_selected(&self, ids: &[i64]) -> Result<BatchOutcome>;

    /// Active/inactive status per host, display-only.
    async fn host_directory(&self) -> Result<HostDirectory>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListResponse {
    records: Vec<RawCollectionRecord>,
    total: usize,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    total_entries: usize,
    individual_total: u64,
    group_total: u64,
}

#[derive(Debug, Serialize)]
struct BatchEditRequest<'a> {
    ids: &'a [i64],
    updates: &'a RecordPatch,
}

#[derive(Debug, Serialize)]
struct IdListRequest<'a> {
    ids: &'a [i64],
}

#[derive(Debug, Deserialize)]
struct BatchEditResponse {
    updated_count: usize,
    total_requested: usize,
}

#[derive(Debug, Deserialize)]
struct BatchDeleteResponse {
    deleted_count: usize,
}

#[derive(Debug, Deserialize)]
struct HostEntry {
    name: String,
    status: HostStatus,
}

#[derive(Clone)]
pub struct RestLedgerStore {
    client: Client,
    base_url: String,
}

impl RestLedgerStore {
    pub fn new(base_url: &str, api_key: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90));

        if let Some(key) = api_key {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", key)
                    .parse()
                    .context("Invalid ledger api key")?,
            );
            builder = builder.default_headers(headers);
        }

        Ok(Self {
            client: builder.build().context("Failed to build RestLedgerStore")?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    #[inline]
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("{} {}: {}", what, status, text));
        }
        Ok(resp)
    }
}

#[async_trait]
impl LedgerStore for RestLedgerStore {
    async fn create_record(&self, record: &CollectionRecord) -> Result<CollectionRecord> {
        let resp = self
            .client
            .post(self.url("/collections"))
            .json(record)
            .send()
            .await
            .context("POST /collections failed")?;
        let resp = Self::check(resp, "POST /collections").await?;
        let raw = resp
            .json::<RawCollectionRecord>()
            .await
            .context("Failed to parse created record")?;
        Ok(normalize_record(raw))
    }

    async fn update_record(&self, id: i64, patch: &RecordPatch) -> Result<()> {
        let resp = self
            .client
            .patch(self.url(&format!("/collections/{}", id)))
            .json(patch)
            .send()
            .await
            .with_context(|| format!("PATCH /collections/{} failed", id))?;
        Self::check(resp, "PATCH /collections/:id").await?;
        Ok(())
    }

    async fn delete_record(&self, id: i64) -> Result<()> {
        let resp = self
            .client
            .delete(self.url(&format!("/collections/{}", id)))
            .send()
            .await
            .with_context(|| format!("DELETE /collections/{} failed", id))?;
        Self::check(resp, "DELETE /collections/:id").await?;
        Ok(())
    }

    async fn list_page(
        &self,
        page: usize,
        page_size: usize,
        sort: SortState,
    ) -> Result<RecordPage> {
        let qp = [
            ("page", page.to_string()),
            ("limit", page_size.to_string()),
            ("sort", sort.field.as_str().to_string()),
            ("order", sort.direction.as_str().to_string()),
        ];
        let resp = self
            .client
            .get(self.url("/collections"))
            .query(&qp)
            .send()
            .await
            .context("GET /collections failed")?;
        let resp = Self::check(resp, "GET /collections").await?;
        let list = resp
            .json::<ListResponse>()
            .await
            .context("Failed to parse collections page")?;
        Ok(RecordPage {
            records: list.records.into_iter().map(normalize_record).collect(),
            total: list.total,
        })
    }

    async fn fetch_all(&self, cap: usize) -> Result<Vec<CollectionRecord>> {
        let qp = [("page", "1".to_string()), ("limit", cap.to_string())];
        let resp = self
            .client
            .get(self.url("/collections"))
            .query(&qp)
            .send()
            .await
            .context("GET /collections (full scan) failed")?;
        let resp = Self::check(resp, "GET /collections (full scan)").await?;
        let list = resp
            .json::<ListResponse>()
            .await
            .context("Failed to parse full scan response")?;
        Ok(list.records.into_iter().map(normalize_record).collect())
    }

    async fn global_stats(&self) -> Result<ViewStats> {
        let resp = self
            .client
            .get(self.url("/collections/stats"))
            .send()
            .await
            .context("GET /collections/stats failed")?;
        let resp = Self::check(resp, "GET /collections/stats").await?;
        let stats = resp
            .json::<StatsResponse>()
            .await
            .context("Failed to parse stats response")?;
        Ok(ViewStats {
            total_entries: stats.total_entries,
            individual_total: stats.individual_total,
            group_total: stats.group_total,
            grand_total: stats.individual_total + stats.group_total,
        })
    }

    async fn batch_edit(&self, ids: &[i64], patch: &RecordPatch) -> Result<BatchOutcome> {
        let body = BatchEditRequest { ids, updates: patch };
        let resp = self
            .client
            .patch(self.url("/collections/batch"))
            .json(&body)
            .send()
            .await
            .context("PATCH /collections/batch failed")?;
        let resp = Self::check(resp, "PATCH /collections/batch").await?;
        let out = resp
            .json::<BatchEditResponse>()
            .await
            .context("Failed to parse batch edit response")?;
        Ok(BatchOutcome {
            affected: out.updated_count,
            requested: out.total_requested,
        })
    }

    async fn batch_delete(&self, ids: &[i64]) -> Result<BatchOutcome> {
        let body = IdListRequest { ids };
        let resp = self
            .client
            .delete(self.url("/collections/batch"))
            .json(&body)
            .send()
            .await
            .context("DELETE /collections/batch failed")?;
        let resp = Self::check(resp, "DELETE /collections/batch").await?;
        let out = resp
            .json::<BatchDeleteResponse>()
            .await
            .context("Failed to parse batch delete response")?;
        Ok(BatchOutcome {
            affected: out.deleted_count,
            requested: ids.len(),
        })
    }

    async fn clean_selected(&self, ids: &[i64]) -> Result<BatchOutcome> {
        let body = IdListRequest { ids };
        let resp = self
            .client
            .post(self.url("/collections/clean-selected"))
            .json(&body)
            .send()
            .await
            .context("POST /collections/clean-selected failed")?;
        let resp = Self::check(resp, "POST /collections/clean-selected").await?;
        let out = resp
            .json::<BatchDeleteResponse>()
            .await
            .context("Failed to parse clean-selected response")?;
        Ok(BatchOutcome {
            affected: out.deleted_count,
            requested: ids.len(),
        })
    }

    async fn host_directory(&self) -> Result<HostDirectory> {
        let resp = self
            .client
            .get(self.url("/hosts"))
            .send()
            .await
            .context("GET /hosts failed")?;
        let resp = Self::check(resp, "GET /hosts").await?;
        let hosts = resp
            .json::<Vec<HostEntry>>()
            .await
            .context("Failed to parse host directory")?;
        Ok(HostDirectory::new(
            hosts.into_iter().map(|h| (h.name, h.status)),
        ))
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (tests, integration suite)
// ---------------------------------------------------------------------------

/// In-process store with last-write-wins semantics, mirroring the remote
/// store's observable behavior.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    records: Vec<CollectionRecord>,
    hosts: Vec<(String, HostStatus)>,
    next_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    pub fn with_records(records: Vec<CollectionRecord>) -> Self {
        let next_id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        Self {
            inner: Mutex::new(MemoryInner {
                records,
                hosts: Vec::new(),
                next_id,
            }),
        }
    }

    pub fn set_hosts(&self, hosts: Vec<(String, HostStatus)>) {
        self.inner.lock().hosts = hosts;
    }

    pub fn record_count(&self) -> usize {
        self.inner.lock().records.len()
    }
}

fn sort_in_place(records: &mut [CollectionRecord], sort: SortState) {
    use crate::models::{SortDirection, SortField};
    let cmp = |a: &CollectionRecord, b: &CollectionRecord| match sort.field {
        SortField::CollectionDate => a.collection_date.cmp(&b.collection_date),
        SortField::HostName => a.host_name.to_lowercase().cmp(&b.host_name.to_lowercase()),
        SortField::IndividualSandwiches => a.individual_sandwiches.cmp(&b.individual_sandwiches),
        SortField::SubmittedAt => a.submitted_at.cmp(&b.submitted_at),
    };
    // Reverse the comparator, not the slice, so equal keys stay in insertion
    // order for descending sorts too.
    match sort.direction {
        SortDirection::Asc => records.sort_by(cmp),
        SortDirection::Desc => records.sort_by(|a, b| cmp(a, b).reverse()),
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn create_record(&self, record: &CollectionRecord) -> Result<CollectionRecord> {
        let mut inner = self.inner.lock();
        let mut stored = record.clone();
        stored.id = inner.next_id;
        inner.next_id += 1;
        inner.records.push(stored.clone());
        Ok(stored)
    }

    async fn update_record(&self, id: i64, patch: &RecordPatch) -> Result<()> {
        let mut inner = self.inner.lock();
        let record = inner
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow::anyhow!("record {} not found", id))?;
        patch.apply(record);
        Ok(())
    }

    async fn delete_record(&self, id: i64) -> Result<()> {
        let mut inner = self.inner.lock();
        let before = inner.records.len();
        inner.records.retain(|r| r.id != id);
        if inner.records.len() == before {
            return Err(anyhow::anyhow!("record {} not found", id));
        }
        Ok(())
    }

    async fn list_page(
        &self,
        page: usize,
        page_size: usize,
        sort: SortState,
    ) -> Result<RecordPage> {
        let inner = self.inner.lock();
        let mut records = inner.records.clone();
        sort_in_place(&mut records, sort);
        let total = records.len();
        let start = (page.max(1) - 1) * page_size;
        let records = records
            .into_iter()
            .skip(start)
            .take(page_size)
            .collect();
        Ok(RecordPage { records, total })
    }

    async fn fetch_all(&self, cap: usize) -> Result<Vec<CollectionRecord>> {
        let inner = self.inner.lock();
        Ok(inner.records.iter().take(cap).cloned().collect())
    }

    async fn global_stats(&self) -> Result<ViewStats> {
        let inner = self.inner.lock();
        let individual_total: u64 = inner
            .records
            .iter()
            .map(|r| r.individual_sandwiches as u64)
            .sum();
        let group_total: u64 = inner.records.iter().map(|r| r.group_total() as u64).sum();
        Ok(ViewStats {
            total_entries: inner.records.len(),
            individual_total,
            group_total,
            grand_total: individual_total + group_total,
        })
    }

    async fn batch_edit(&self, ids: &[i64], patch: &RecordPatch) -> Result<BatchOutcome> {
        let mut inner = self.inner.lock();
        let mut affected = 0;
        for record in inner.records.iter_mut() {
            if ids.contains(&record.id) {
                patch.apply(record);
                affected += 1;
            }
        }
        Ok(BatchOutcome {
            affected,
            requested: ids.len(),
        })
    }

    async fn batch_delete(&self, ids: &[i64]) -> Result<BatchOutcome> {
        let mut inner = self.inner.lock();
        let before = inner.records.len();
        inner.records.retain(|r| !ids.contains(&r.id));
        Ok(BatchOutcome {
            affected: before - inner.records.len(),
            requested: ids.len(),
        })
    }

    async fn clean_selected(&self, ids: &[i64]) -> Result<BatchOutcome> {
        self.batch_delete(ids).await
    }

    async fn host_directory(&self) -> Result<HostDirectory> {
        let inner = self.inner.lock();
        Ok(HostDirectory::new(inner.hosts.iter().cloned()))
    }
}
