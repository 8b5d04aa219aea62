//! Run orchestration.
//!
//! The [`JobDriver`] owns one end-to-end pass of the pipeline: load the
//! watchlist, discover new filings company by company, then hand the
//! `Discovered` backlog to the [`Processor`]. Discovery is sequential across
//! companies (it is cheap relative to download and parse); per-company
//! failures are caught so the remaining companies still run.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::IngestConfig;
use crate::core::Registry;
use crate::error::Result;
use crate::model::{
    BackfillMarker, Company, Filing, FilingStatus, JobMode, JobRun, Watchlist,
};
use crate::options::ListOptions;
use crate::processor::Processor;
use crate::render::build_renderer;
use crate::state::{StateStore, open_state_store};
use crate::store::open_blob_store;
use crate::traits::{CompanyOperations, FilingOperations};

/// Options for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: JobMode,
    /// When non-empty, the run is restricted to these tickers. Tickers not
    /// yet on the watchlist are added to it; existing entries keep their
    /// checkpoints.
    pub tickers: Vec<String>,
    /// Discover only; skip the processing pass.
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: JobMode::Incremental,
            tickers: Vec::new(),
            dry_run: false,
        }
    }
}

/// Snapshot assembled by [`JobDriver::status`].
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub last_run: Option<JobRun>,
    pub watchlist: Watchlist,
    pub status_counts: HashMap<FilingStatus, usize>,
}

/// Drives discovery and processing over the persisted watchlist.
pub struct JobDriver {
    registry: Arc<Registry>,
    state: Arc<dyn StateStore>,
    processor: Processor,
}

impl JobDriver {
    pub fn new(registry: Arc<Registry>, state: Arc<dyn StateStore>, processor: Processor) -> Self {
        Self {
            registry,
            state,
            processor,
        }
    }

    /// Builds the full pipeline from configuration: registry client, state
    /// store, blob store, renderer, processor.
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        let registry = Arc::new(Registry::with_config(config)?);
        let state = open_state_store(config)?;
        let blobs = open_blob_store(config)?;
        let renderer = build_renderer(&config.render_method);
        let processor = Processor::new(
            Arc::clone(&registry),
            Arc::clone(&state),
            Arc::clone(&blobs),
            renderer,
            config,
        );
        Ok(Self::new(registry, state, processor))
    }

    /// Executes one run: discovery over the watchlist, then processing
    /// unless `dry_run` is set.
    ///
    /// Per-company and per-filing failures are folded into the run record;
    /// only a failure before any company was attempted (the watchlist load)
    /// marks the run unsuccessful.
    pub async fn run(&self, options: &RunOptions) -> Result<JobRun> {
        let mut run = JobRun::begin(options.mode);
        tracing::info!("run {} starting in {} mode", run.run_id, run.mode);

        let mut watchlist = match self.state.load_watchlist().await {
            Ok(watchlist) => watchlist,
            Err(e) => {
                run.success = false;
                run.error = Some(format!("watchlist load failed: {e}"));
                run.finish();
                if let Err(save) = self.state.save_job_run(&run).await {
                    tracing::warn!("could not save run record: {}", save);
                }
                return Ok(run);
            }
        };

        let mut working: Vec<Company> = if options.tickers.is_empty() {
            watchlist.companies.clone()
        } else {
            options
                .tickers
                .iter()
                .map(|ticker| {
                    watchlist
                        .get(ticker)
                        .cloned()
                        .unwrap_or_else(|| Company::new(ticker))
                })
                .collect()
        };

        for company in working.iter_mut() {
            run.companies_processed += 1;
            match self.sync_company(company, options.mode).await {
                Ok(discovered) => {
                    run.filings_discovered += discovered;
                    tracing::info!("{}: {} new filings", company.ticker, discovered);
                }
                Err(e) => {
                    tracing::warn!("discovery failed for {}: {}", company.ticker, e);
                    if run.error.is_none() {
                        run.error = Some(format!("{}: {e}", company.ticker));
                    }
                }
            }
        }

        for company in working {
            watchlist.upsert(company);
        }

        if !options.dry_run {
            match self.processor.process_pending().await {
                Ok(summary) => {
                    run.filings_downloaded += summary.succeeded as u32;
                    run.filings_failed += summary.failed as u32;
                    if run.error.is_none() {
                        run.error = summary.errors.first().cloned();
                    }
                }
                Err(e) => {
                    tracing::warn!("processing pass failed: {}", e);
                    if run.error.is_none() {
                        run.error = Some(format!("processing: {e}"));
                    }
                }
            }
        }

        run.finish();
        self.state.save_watchlist(&watchlist).await?;
        self.state.save_job_run(&run).await?;
        tracing::info!(
            "run {} finished: {} discovered, {} downloaded, {} failed",
            run.run_id,
            run.filings_discovered,
            run.filings_downloaded,
            run.filings_failed
        );
        Ok(run)
    }

    /// Discovers new filings for one company and advances its checkpoint.
    async fn sync_company(&self, company: &mut Company, mode: JobMode) -> Result<u32> {
        let cik = match company.cik {
            Some(cik) => cik,
            None => {
                let cik = self.registry.resolve_cik(&company.ticker).await?;
                company.cik = Some(cik);
                cik
            }
        };

        let list_options = match mode {
            JobMode::Incremental => {
                let options = ListOptions::new();
                match company.last_seen_filed {
                    Some(since) => options.with_since(since),
                    None => options,
                }
            }
            JobMode::Backfill { years } => ListOptions::backfill(years),
        };

        let summaries = self.registry.list_filings(cik, &list_options).await?;

        // Oldest first, so the checkpoint lands on the newest entry.
        let mut discovered = 0;
        for summary in summaries.iter().rev() {
            if self
                .state
                .get_filing(summary.cik, &summary.accession_number)
                .await?
                .is_none()
            {
                let mut filing = Filing::from(summary);
                filing.ticker = Some(company.ticker.clone());
                self.state.upsert_filing(&filing).await?;
                discovered += 1;
            }
            company.advance_checkpoint(summary.filed_date, &summary.accession_number);
        }

        if company.name.is_none() {
            company.name = summaries.first().map(|s| s.company_name.clone());
        }
        if let JobMode::Backfill { years } = mode {
            company.backfill = Some(BackfillMarker {
                years,
                completed_at: Utc::now(),
            });
        }
        Ok(discovered)
    }

    /// Reports the last run, the watchlist, and per-status filing counts.
    /// Works even when the last run failed partway.
    pub async fn status(&self) -> Result<StatusReport> {
        Ok(StatusReport {
            last_run: self.state.last_job_run().await?,
            watchlist: self.state.load_watchlist().await?,
            status_counts: self.state.status_counts().await?,
        })
    }

    /// Adds a ticker to the persisted watchlist. Re-adding an existing
    /// ticker leaves its entry (and checkpoint) untouched.
    pub async fn add_company(&self, ticker: &str) -> Result<()> {
        let mut watchlist = self.state.load_watchlist().await?;
        if watchlist.get(ticker).is_none() {
            watchlist.upsert(Company::new(ticker));
            self.state.save_watchlist(&watchlist).await?;
        }
        Ok(())
    }

    /// Removes a ticker from the persisted watchlist. Returns whether an
    /// entry was removed. Filing records are never deleted.
    pub async fn remove_company(&self, ticker: &str) -> Result<bool> {
        let mut watchlist = self.state.load_watchlist().await?;
        let removed = watchlist.remove(ticker);
        if removed {
            self.state.save_watchlist(&watchlist).await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LocalStateStore;
    use crate::store::LocalStore;
    use tempfile::TempDir;

    fn driver_over(dir: &TempDir) -> JobDriver {
        let config = IngestConfig::new("filingest-tests test@example.com", dir.path());
        JobDriver::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn test_add_and_remove_company_persist() {
        let dir = TempDir::new().unwrap();
        let driver = driver_over(&dir);

        driver.add_company("acme").await.unwrap();
        driver.add_company("ACME").await.unwrap();
        driver.add_company("GLOBEX").await.unwrap();

        let report = driver.status().await.unwrap();
        assert_eq!(report.watchlist.len(), 2);
        assert!(report.watchlist.get("ACME").is_some());

        assert!(driver.remove_company("acme").await.unwrap());
        assert!(!driver.remove_company("acme").await.unwrap());

        // A fresh driver over the same root sees the persisted list.
        let driver = driver_over(&dir);
        let report = driver.status().await.unwrap();
        assert_eq!(report.watchlist.len(), 1);
        assert!(report.watchlist.get("GLOBEX").is_some());
    }

    #[tokio::test]
    async fn test_run_over_empty_watchlist_touches_no_network() {
        let dir = TempDir::new().unwrap();
        let driver = driver_over(&dir);

        let run = driver.run(&RunOptions::default()).await.unwrap();
        assert!(run.success);
        assert_eq!(run.companies_processed, 0);
        assert_eq!(run.filings_discovered, 0);
        assert_eq!(run.filings_downloaded, 0);
        assert!(run.finished_at.is_some());

        let report = driver.status().await.unwrap();
        assert_eq!(report.last_run.unwrap().run_id, run.run_id);
        assert!(report.status_counts.is_empty());
    }

    #[tokio::test]
    async fn test_driver_composes_over_shared_state() {
        // new() accepts externally built parts; status reads through them.
        let dir = TempDir::new().unwrap();
        let config = IngestConfig::new("filingest-tests test@example.com", dir.path());
        let registry = Arc::new(Registry::with_config(&config).unwrap());
        let state: Arc<dyn StateStore> =
            Arc::new(LocalStateStore::open(dir.path()).unwrap());
        let blobs = Arc::new(LocalStore::new(dir.path()));
        let processor = Processor::new(
            Arc::clone(&registry),
            Arc::clone(&state),
            blobs,
            build_renderer(&config.render_method),
            &config,
        );
        let driver = JobDriver::new(registry, Arc::clone(&state), processor);

        driver.add_company("ACME").await.unwrap();
        let listed = state.load_watchlist().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(driver.status().await.unwrap().watchlist.len(), 1);
    }
}
