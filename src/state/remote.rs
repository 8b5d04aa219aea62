//! Gateway-backed state store.
//!
//! Persists the same record layout as the local backend, but as objects under
//! the `state/` key prefix of a [`BlobStore`]. The gateway is
//! last-writer-wins with no compare-and-swap, so check-then-act mutations are
//! serialized by an in-process mutex; run one pipeline process per state
//! prefix.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::model::{Filing, FilingStatus, JobRun, Watchlist, filing_key};
use crate::store::BlobStore;

use super::{
    FILING_INDEX_FILE, StateStore, WATCHLIST_FILE, filing_record_file, is_stale, run_record_file,
};

/// State store persisting records through a [`BlobStore`].
pub struct RemoteStateStore {
    blobs: Arc<dyn BlobStore>,
    write_guard: Mutex<()>,
}

fn state_key(relative: &str) -> String {
    format!("state/{relative}")
}

impl RemoteStateStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
            write_guard: Mutex::new(()),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, relative: &str) -> Result<Option<T>> {
        match self.blobs.get(&state_key(relative)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn write_json<T: Serialize>(&self, relative: &str, value: &T) -> Result<()> {
        self.blobs
            .put(&state_key(relative), &serde_json::to_vec_pretty(value)?)
            .await
    }

    async fn read_index(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.read_json(FILING_INDEX_FILE).await?.unwrap_or_default())
    }

    async fn all_filings(&self) -> Result<Vec<Filing>> {
        let index = self.read_index().await?;
        let mut filings = Vec::with_capacity(index.len());
        for (key, record) in index {
            match self.read_json::<Filing>(&record).await? {
                Some(filing) => filings.push(filing),
                None => tracing::warn!("filing index references missing record: {}", key),
            }
        }
        Ok(filings)
    }
}

#[async_trait]
impl StateStore for RemoteStateStore {
    async fn get_filing(&self, cik: u64, accession_number: &str) -> Result<Option<Filing>> {
        let key = filing_key(cik, accession_number);
        self.read_json(&filing_record_file(&key)).await
    }

    async fn upsert_filing(&self, filing: &Filing) -> Result<()> {
        let _guard = self.write_guard.lock().await;
        let key = filing.key();
        self.write_json(&filing_record_file(&key), filing).await?;
        let mut index = self.read_index().await?;
        if !index.contains_key(&key) {
            let record = filing_record_file(&key);
            index.insert(key, record);
            self.write_json(FILING_INDEX_FILE, &index).await?;
        }
        Ok(())
    }

    async fn filings_by_status(&self, status: FilingStatus) -> Result<Vec<Filing>> {
        let mut filings = self.all_filings().await?;
        filings.retain(|f| f.status == status);
        Ok(filings)
    }

    async fn claim_filing(&self, filing: &Filing) -> Result<bool> {
        let _guard = self.write_guard.lock().await;
        let record = filing_record_file(&filing.key());
        let mut stored: Filing = match self.read_json(&record).await? {
            Some(stored) => stored,
            None => {
                tracing::warn!("cannot claim unknown filing: {}", filing.key());
                return Ok(false);
            }
        };
        if stored.status != FilingStatus::Discovered {
            return Ok(false);
        }
        stored.set_status(FilingStatus::Downloading)?;
        self.write_json(&record, &stored).await?;
        Ok(true)
    }

    async fn status_counts(&self) -> Result<HashMap<FilingStatus, usize>> {
        let mut counts = HashMap::new();
        for filing in self.all_filings().await? {
            *counts.entry(filing.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn load_watchlist(&self) -> Result<Watchlist> {
        Ok(self.read_json(WATCHLIST_FILE).await?.unwrap_or_default())
    }

    async fn save_watchlist(&self, watchlist: &Watchlist) -> Result<()> {
        self.write_json(WATCHLIST_FILE, watchlist).await
    }

    async fn save_job_run(&self, run: &JobRun) -> Result<()> {
        self.write_json(&run_record_file(&run.run_id), run).await
    }

    async fn last_job_run(&self) -> Result<Option<JobRun>> {
        // Listings come back sorted, and run ids embed a zero-padded
        // timestamp, so the last key is the newest run.
        let keys = self.blobs.list(&state_key("runs/")).await?;
        match keys.last() {
            Some(key) => match self.blobs.get(key).await? {
                Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    async fn reset_stale_downloads(&self, older_than: Duration) -> Result<usize> {
        let _guard = self.write_guard.lock().await;
        let mut reset = 0;
        for (key, record) in self.read_index().await? {
            let Some(mut filing) = self.read_json::<Filing>(&record).await? else {
                tracing::warn!("filing index references missing record: {}", key);
                continue;
            };
            if !is_stale(&filing, older_than) {
                continue;
            }
            // Direct assignment: Downloading -> Discovered is not an edge of
            // the status machine.
            filing.status = FilingStatus::Discovered;
            filing.updated_at = chrono::Utc::now();
            self.write_json(&record, &filing).await?;
            reset += 1;
        }
        Ok(reset)
    }
}
