//! Filesystem backend for the state store.
//!
//! Records live as pretty-printed JSON files under `<root>/state/`, written
//! atomically via temp-then-rename. Mutations that must be serialized across
//! processes (upserts, claims, stale resets) take an exclusive OS lock on
//! `state/filings/index.lock` first.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::model::{Filing, FilingStatus, JobRun, Watchlist, filing_key};
use crate::store::write_atomic;

use super::{
    FILING_INDEX_FILE, StateStore, WATCHLIST_FILE, filing_record_file, is_stale, run_record_file,
};

/// Exclusive lock over the state tree, held for the duration of one mutation.
/// The lock file carries no data.
struct StateLock {
    file: File,
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// State store rooted at `<root>/state` on the local filesystem.
pub struct LocalStateStore {
    state_dir: PathBuf,
    lock_path: PathBuf,
}

impl LocalStateStore {
    /// Opens the state tree under `root`, creating its directories when
    /// missing.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let state_dir = root.as_ref().join("state");
        fs::create_dir_all(state_dir.join("filings"))?;
        fs::create_dir_all(state_dir.join("runs"))?;
        let lock_path = state_dir.join("filings").join("index.lock");
        Ok(Self {
            state_dir,
            lock_path,
        })
    }

    fn lock(&self) -> Result<StateLock> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.lock_path)?;
        // Fully qualified to keep fs2 semantics even with std's own file
        // locking methods in scope.
        fs2::FileExt::lock_exclusive(&file)?;
        Ok(StateLock { file })
    }

    fn path_of(&self, relative: &str) -> PathBuf {
        let mut path = self.state_dir.clone();
        for segment in relative.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path
    }

    fn read_json<T: DeserializeOwned>(&self, relative: &str) -> Result<Option<T>> {
        match fs::read(self.path_of(relative)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_json<T: Serialize>(&self, relative: &str, value: &T) -> Result<()> {
        let path = self.path_of(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomic(&path, &serde_json::to_vec_pretty(value)?)
    }

    fn read_index(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.read_json(FILING_INDEX_FILE)?.unwrap_or_default())
    }

    fn all_filings(&self) -> Result<Vec<Filing>> {
        let index = self.read_index()?;
        let mut filings = Vec::with_capacity(index.len());
        for (key, record) in index {
            match self.read_json::<Filing>(&record)? {
                Some(filing) => filings.push(filing),
                None => tracing::warn!("filing index references missing record: {}", key),
            }
        }
        Ok(filings)
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn get_filing(&self, cik: u64, accession_number: &str) -> Result<Option<Filing>> {
        let key = filing_key(cik, accession_number);
        self.read_json(&filing_record_file(&key))
    }

    async fn upsert_filing(&self, filing: &Filing) -> Result<()> {
        let _lock = self.lock()?;
        let key = filing.key();
        self.write_json(&filing_record_file(&key), filing)?;
        let mut index = self.read_index()?;
        if !index.contains_key(&key) {
            let record = filing_record_file(&key);
            index.insert(key, record);
            self.write_json(FILING_INDEX_FILE, &index)?;
        }
        Ok(())
    }

    async fn filings_by_status(&self, status: FilingStatus) -> Result<Vec<Filing>> {
        let mut filings = self.all_filings()?;
        filings.retain(|f| f.status == status);
        Ok(filings)
    }

    async fn claim_filing(&self, filing: &Filing) -> Result<bool> {
        let _lock = self.lock()?;
        let record = filing_record_file(&filing.key());
        let mut stored: Filing = match self.read_json(&record)? {
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
        self.write_json(&record, &stored)?;
        Ok(true)
    }

    async fn status_counts(&self) -> Result<HashMap<FilingStatus, usize>> {
        let mut counts = HashMap::new();
        for filing in self.all_filings()? {
            *counts.entry(filing.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn load_watchlist(&self) -> Result<Watchlist> {
        Ok(self.read_json(WATCHLIST_FILE)?.unwrap_or_default())
    }

    async fn save_watchlist(&self, watchlist: &Watchlist) -> Result<()> {
        self.write_json(WATCHLIST_FILE, watchlist)
    }

    async fn save_job_run(&self, run: &JobRun) -> Result<()> {
        self.write_json(&run_record_file(&run.run_id), run)
    }

    async fn last_job_run(&self) -> Result<Option<JobRun>> {
        let mut newest: Option<String> = None;
        for entry in fs::read_dir(self.state_dir.join("runs"))? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".json") {
                continue;
            }
            // Run ids embed a zero-padded timestamp, so lexical order is
            // chronological order.
            if newest.as_ref().map_or(true, |n| name > *n) {
                newest = Some(name);
            }
        }
        match newest {
            Some(name) => self.read_json(&format!("runs/{name}")),
            None => Ok(None),
        }
    }

    async fn reset_stale_downloads(&self, older_than: Duration) -> Result<usize> {
        let _lock = self.lock()?;
        let mut reset = 0;
        for (key, record) in self.read_index()? {
            let Some(mut filing) = self.read_json::<Filing>(&record)? else {
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
            self.write_json(&record, &filing)?;
            reset += 1;
        }
        Ok(reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArtifactPaths, Company, FormType, JobMode};
    use chrono::{NaiveDate, Utc};
    use tempfile::TempDir;

    fn sample_filing(accession: &str) -> Filing {
        Filing {
            cik: 12345,
            accession_number: accession.to_string(),
            form: "10-K".to_string(),
            form_type: FormType::AnnualReport,
            company_name: "Sample Corp".to_string(),
            ticker: Some("SMPL".to_string()),
            filed_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            accepted_at: None,
            period_of_report: None,
            primary_document: "smpl-10k.htm".to_string(),
            status: FilingStatus::Discovered,
            retries: 0,
            error: None,
            artifacts: ArtifactPaths::default(),
            discovered_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_filing_round_trip_and_listing() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::open(dir.path()).unwrap();

        assert!(
            store
                .get_filing(12345, "0000012345-24-000001")
                .await
                .unwrap()
                .is_none()
        );

        let filing = sample_filing("0000012345-24-000001");
        store.upsert_filing(&filing).await.unwrap();

        let stored = store
            .get_filing(12345, "0000012345-24-000001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.key(), filing.key());
        assert_eq!(stored.status, FilingStatus::Discovered);

        let discovered = store
            .filings_by_status(FilingStatus::Discovered)
            .await
            .unwrap();
        assert_eq!(discovered.len(), 1);

        let counts = store.status_counts().await.unwrap();
        assert_eq!(counts.get(&FilingStatus::Discovered), Some(&1));
        assert_eq!(counts.get(&FilingStatus::Ready), None);
    }

    #[tokio::test]
    async fn test_upsert_does_not_duplicate_index_entries() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::open(dir.path()).unwrap();

        let mut filing = sample_filing("0000012345-24-000001");
        store.upsert_filing(&filing).await.unwrap();
        filing.set_status(FilingStatus::Downloading).unwrap();
        store.upsert_filing(&filing).await.unwrap();

        let index = store.read_index().unwrap();
        assert_eq!(index.len(), 1);
        let stored = store
            .get_filing(12345, "0000012345-24-000001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, FilingStatus::Downloading);
    }

    #[tokio::test]
    async fn test_claim_only_succeeds_from_discovered() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::open(dir.path()).unwrap();

        let filing = sample_filing("0000012345-24-000001");
        store.upsert_filing(&filing).await.unwrap();

        assert!(store.claim_filing(&filing).await.unwrap());
        let stored = store
            .get_filing(12345, "0000012345-24-000001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, FilingStatus::Downloading);

        // Second claim loses: the record is no longer Discovered.
        assert!(!store.claim_filing(&filing).await.unwrap());

        // Claiming a filing the store has never seen is a refusal, not an
        // error.
        let unknown = sample_filing("0000012345-24-000099");
        assert!(!store.claim_filing(&unknown).await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_stale_downloads() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::open(dir.path()).unwrap();

        let mut stale = sample_filing("0000012345-24-000001");
        stale.status = FilingStatus::Downloading;
        stale.updated_at = Utc::now() - chrono::Duration::hours(2);
        store.upsert_filing(&stale).await.unwrap();

        let mut fresh = sample_filing("0000012345-24-000002");
        fresh.status = FilingStatus::Downloading;
        store.upsert_filing(&fresh).await.unwrap();

        let mut ready = sample_filing("0000012345-24-000003");
        ready.status = FilingStatus::Ready;
        ready.updated_at = Utc::now() - chrono::Duration::hours(2);
        store.upsert_filing(&ready).await.unwrap();

        let reset = store
            .reset_stale_downloads(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(reset, 1);

        let stored = store
            .get_filing(12345, "0000012345-24-000001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, FilingStatus::Discovered);
        let counts = store.status_counts().await.unwrap();
        assert_eq!(counts.get(&FilingStatus::Downloading), Some(&1));
        assert_eq!(counts.get(&FilingStatus::Ready), Some(&1));
    }

    #[tokio::test]
    async fn test_watchlist_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::open(dir.path()).unwrap();

        assert!(store.load_watchlist().await.unwrap().is_empty());

        let mut watchlist = Watchlist::default();
        watchlist.upsert(Company::new("ACME"));
        watchlist.upsert(Company::new("GLOBEX"));
        store.save_watchlist(&watchlist).await.unwrap();

        let loaded = store.load_watchlist().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.get("acme").is_some());
    }

    #[tokio::test]
    async fn test_last_job_run_picks_newest() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::open(dir.path()).unwrap();

        assert!(store.last_job_run().await.unwrap().is_none());

        let mut older = JobRun::begin(JobMode::Incremental);
        older.run_id = "run-20240101T000000-0001".to_string();
        let mut newer = JobRun::begin(JobMode::Incremental);
        newer.run_id = "run-20240102T000000-0001".to_string();
        newer.filings_discovered = 7;

        store.save_job_run(&newer).await.unwrap();
        store.save_job_run(&older).await.unwrap();

        let last = store.last_job_run().await.unwrap().unwrap();
        assert_eq!(last.run_id, newer.run_id);
        assert_eq!(last.filings_discovered, 7);
    }
}
