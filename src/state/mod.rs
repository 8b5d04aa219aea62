//! Durable pipeline state: filing records, the watchlist, and run history.
//!
//! Everything the pipeline must remember between runs goes through the
//! [`StateStore`] trait. Two backends exist, selected once at startup by
//! [`open_state_store`]: a local filesystem store with OS file locking and a
//! remote store layered on the blob gateway. Both persist the same logical
//! layout:
//!
//! ```text
//! state/watchlist.json           companies being watched
//! state/filings/index.json       filing key -> record filename
//! state/filings/<key>.json       one record per filing
//! state/runs/<run_id>.json       one record per job run, append-only
//! ```
//!
//! The store is the pipeline's only cross-worker coordination point: claiming
//! a filing is a check-then-act on the stored status, and two racing claimers
//! cannot both succeed.

mod local;
mod remote;

pub use local::LocalStateStore;
pub use remote::RemoteStateStore;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::config::{IngestConfig, StorageConfig};
use super::error::Result;
use super::model::{Filing, FilingStatus, JobRun, Watchlist};
use super::store::RemoteStore;

pub(crate) const WATCHLIST_FILE: &str = "watchlist.json";
pub(crate) const FILING_INDEX_FILE: &str = "filings/index.json";

pub(crate) fn filing_record_file(key: &str) -> String {
    format!("filings/{key}.json")
}

pub(crate) fn run_record_file(run_id: &str) -> String {
    format!("runs/{run_id}.json")
}

/// Persistent store for pipeline state.
///
/// All mutations are atomic at record granularity: a reader sees either the
/// previous version of a record or the new one, never a partial write.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Looks up one filing record by identity.
    async fn get_filing(&self, cik: u64, accession_number: &str) -> Result<Option<Filing>>;

    /// Creates or replaces a filing record.
    async fn upsert_filing(&self, filing: &Filing) -> Result<()>;

    /// Returns all filings currently in `status`.
    async fn filings_by_status(&self, status: FilingStatus) -> Result<Vec<Filing>>;

    /// Attempts to claim a filing for processing.
    ///
    /// Succeeds, transitioning the stored record to
    /// [`FilingStatus::Downloading`], only when the stored status is still
    /// `Discovered`. Returns false otherwise without mutating anything; a
    /// failed claim is a skip signal, not an error. Two concurrent claimers
    /// for the same filing cannot both succeed.
    async fn claim_filing(&self, filing: &Filing) -> Result<bool>;

    /// Counts filings per status.
    async fn status_counts(&self) -> Result<HashMap<FilingStatus, usize>>;

    async fn load_watchlist(&self) -> Result<Watchlist>;
    async fn save_watchlist(&self, watchlist: &Watchlist) -> Result<()>;

    /// Appends a run record to the history (one file per run id).
    async fn save_job_run(&self, run: &JobRun) -> Result<()>;
    /// Returns the most recent run record, if any.
    async fn last_job_run(&self) -> Result<Option<JobRun>>;

    /// Operator tool: flips `Downloading` records whose last update is older
    /// than `older_than` back to `Discovered` so the next run picks them up.
    ///
    /// A record stuck in `Downloading` means a worker died mid-flight; the
    /// run loop never calls this itself, leaving the decision to reclaim to
    /// the operator. Returns the number of records reset.
    async fn reset_stale_downloads(&self, older_than: Duration) -> Result<usize>;
}

/// Selects and constructs the state store backend for this configuration.
pub fn open_state_store(config: &IngestConfig) -> Result<Arc<dyn StateStore>> {
    match &config.storage {
        StorageConfig::Local { root } => Ok(Arc::new(LocalStateStore::open(root)?)),
        StorageConfig::Remote {
            endpoint,
            bucket,
            prefix,
            token,
        } => {
            let blobs = Arc::new(RemoteStore::new(
                endpoint,
                bucket,
                prefix,
                token.clone(),
                config.timeout,
            )?);
            Ok(Arc::new(RemoteStateStore::new(blobs)))
        }
    }
}

/// Returns true when a `Downloading` record has been untouched long enough
/// to count as stale.
pub(crate) fn is_stale(filing: &Filing, older_than: Duration) -> bool {
    if filing.status != FilingStatus::Downloading {
        return false;
    }
    let age = chrono::Utc::now().signed_duration_since(filing.updated_at);
    match chrono::Duration::from_std(older_than) {
        Ok(threshold) => age > threshold,
        Err(_) => false,
    }
}
