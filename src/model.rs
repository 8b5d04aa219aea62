//! Core data model for the ingestion pipeline.
//!
//! Everything the pipeline persists lives here: filing records and their
//! status machine, watched companies with sync checkpoints, the watchlist,
//! and per-run bookkeeping. All types serialize as JSON through `serde`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::{IngestError, Result};

/// Lifecycle states of a filing record.
///
/// Transitions are restricted to the forward edges of the pipeline:
///
/// | From          | To            |
/// |---------------|---------------|
/// | `Discovered`  | `Downloading` |
/// | `Downloading` | `Ready`       |
/// | `Downloading` | `Failed`      |
///
/// `Ready` and `Failed` are terminal. Every other combination is rejected
/// by [`Filing::set_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilingStatus {
    /// Known to exist; nothing fetched yet.
    Discovered,
    /// Claimed by a worker; download and parse in progress.
    Downloading,
    /// Artifacts persisted; processing complete.
    Ready,
    /// Processing gave up; `error` on the filing says why.
    Failed,
}

impl FilingStatus {
    pub const VARIANTS: &'static [(&'static str, FilingStatus)] = &[
        ("discovered", FilingStatus::Discovered),
        ("downloading", FilingStatus::Downloading),
        ("ready", FilingStatus::Ready),
        ("failed", FilingStatus::Failed),
    ];

    pub fn as_str(&self) -> &'static str {
        Self::VARIANTS
            .iter()
            .find(|(_, variant)| variant == self)
            .map(|(s, _)| *s)
            .unwrap_or("discovered")
    }

    /// Returns true when the status machine permits moving from `self` to `to`.
    pub fn can_transition(&self, to: FilingStatus) -> bool {
        matches!(
            (self, to),
            (FilingStatus::Discovered, FilingStatus::Downloading)
                | (FilingStatus::Downloading, FilingStatus::Ready)
                | (FilingStatus::Downloading, FilingStatus::Failed)
        )
    }

    /// Terminal states are never left once entered.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FilingStatus::Ready | FilingStatus::Failed)
    }
}

impl FromStr for FilingStatus {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        Self::VARIANTS
            .iter()
            .find(|(pattern, _)| s.eq_ignore_ascii_case(pattern))
            .map(|(_, variant)| *variant)
            .ok_or_else(|| IngestError::InvalidFormat(format!("Unknown filing status: {s}")))
    }
}

impl fmt::Display for FilingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two periodic disclosure forms the pipeline ingests.
///
/// Amendments (`10-K/A`, `10-Q/A`) share the kind of the form they amend;
/// [`FormType::from_form`] reports the amendment flag separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormType {
    /// Annual report (10-K).
    #[serde(rename = "10-K")]
    AnnualReport,
    /// Quarterly report (10-Q).
    #[serde(rename = "10-Q")]
    QuarterlyReport,
}

impl FormType {
    pub const VARIANTS: &'static [(&'static str, FormType)] = &[
        ("10-K", FormType::AnnualReport),
        ("10-Q", FormType::QuarterlyReport),
    ];

    pub fn as_str(&self) -> &'static str {
        Self::VARIANTS
            .iter()
            .find(|(_, variant)| variant == self)
            .map(|(s, _)| *s)
            .unwrap_or("10-K")
    }

    /// Classifies a raw form string from the registry.
    ///
    /// Returns the form kind and whether the string denotes an amendment.
    /// Strings outside the closed set (`10-K`, `10-K/A`, `10-Q`, `10-Q/A`)
    /// return `None`; discovery skips them.
    pub fn from_form(form: &str) -> Option<(FormType, bool)> {
        let trimmed = form.trim();
        Self::VARIANTS.iter().find_map(|(base, variant)| {
            if trimmed.eq_ignore_ascii_case(base) {
                Some((*variant, false))
            } else if trimmed.eq_ignore_ascii_case(&format!("{base}/A")) {
                Some((*variant, true))
            } else {
                None
            }
        })
    }
}

impl FromStr for FormType {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_form(s)
            .map(|(variant, _)| variant)
            .ok_or_else(|| IngestError::InvalidFormat(format!("Unknown form type: {s}")))
    }
}

impl fmt::Display for FormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage keys of the artifacts produced for one filing.
///
/// Each field holds the key under which the artifact was written, or `None`
/// when that artifact was not produced (rendering is optional, parsing can
/// fail while the raw document survives).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    /// Raw primary document as fetched.
    pub raw: Option<String>,
    /// Registry metadata JSON for the filing.
    pub metadata: Option<String>,
    /// Rendered fixed-layout derivative (e.g. PDF), when rendering is enabled.
    pub rendered: Option<String>,
    /// Cleaned plain text.
    pub text: Option<String>,
    /// Manifest with identity, section list, and stats.
    pub manifest: Option<String>,
    /// Section index (boundaries, sub-anchors, chunk ids).
    pub sections: Option<String>,
    /// Chunk records, one JSON object per line.
    pub chunks: Option<String>,
}

/// One filing tracked by the pipeline.
///
/// Keyed by `(cik, accession_number)`. Created by discovery in
/// [`FilingStatus::Discovered`] and carried through the status machine by the
/// processor; records are never deleted by the pipeline itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filing {
    /// Central Index Key of the filer.
    pub cik: u64,
    /// Accession number, e.g. `0000320193-24-000123`.
    pub accession_number: String,
    /// Raw form string as listed by the registry (`10-K`, `10-K/A`, ...).
    pub form: String,
    /// Form kind; amendments share the kind of the form they amend.
    pub form_type: FormType,
    /// Company name as reported in the submissions document.
    pub company_name: String,
    /// Ticker the filing was discovered under, when known.
    pub ticker: Option<String>,
    /// Date the filing was filed.
    pub filed_date: NaiveDate,
    /// Acceptance timestamp; absent for some older filings.
    pub accepted_at: Option<DateTime<Utc>>,
    /// Reporting period the filing covers.
    pub period_of_report: Option<NaiveDate>,
    /// Filename of the primary document inside the filing directory. Empty
    /// when the registry lists none; downloads then fall back to the
    /// master `.txt` rendition.
    pub primary_document: String,
    pub status: FilingStatus,
    /// Number of processing attempts that ended in failure.
    #[serde(default)]
    pub retries: u32,
    /// Human-readable reason for the most recent failure.
    pub error: Option<String>,
    #[serde(default)]
    pub artifacts: ArtifactPaths,
    pub discovered_at: DateTime<Utc>,
    /// Last time any field of this record changed.
    pub updated_at: DateTime<Utc>,
}

impl Filing {
    /// Stable identity string, used as the index key and record filename.
    pub fn key(&self) -> String {
        filing_key(self.cik, &self.accession_number)
    }

    /// Moves the filing to `to`, enforcing the transition table.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::InvalidTransition`] when the status machine
    /// forbids the move; the record is left untouched in that case.
    pub fn set_status(&mut self, to: FilingStatus) -> Result<()> {
        if !self.status.can_transition(to) {
            return Err(IngestError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Marks the filing failed with the given reason and bumps the retry
    /// counter.
    pub fn record_failure(&mut self, reason: impl Into<String>) -> Result<()> {
        self.set_status(FilingStatus::Failed)?;
        self.retries += 1;
        self.error = Some(reason.into());
        Ok(())
    }
}

/// Builds the canonical `<cik>-<accession>` identity string.
pub fn filing_key(cik: u64, accession_number: &str) -> String {
    format!("{cik}-{accession_number}")
}

/// Marker recording that a historical backfill completed for a company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillMarker {
    /// How many years back the backfill reached.
    pub years: u32,
    pub completed_at: DateTime<Utc>,
}

/// A company on the watchlist.
///
/// The ticker is the user-facing key; the CIK is resolved lazily on the
/// first sync. The checkpoint records the newest filing already registered
/// so that incremental runs only look at newer entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    /// Ticker symbol, stored uppercase.
    pub ticker: String,
    /// Resolved Central Index Key; `None` until the first successful sync.
    pub cik: Option<u64>,
    /// Company title from the registry's ticker table.
    pub name: Option<String>,
    /// Filed date of the newest filing registered so far.
    pub last_seen_filed: Option<NaiveDate>,
    /// Accession number of that filing, for same-day disambiguation.
    pub last_seen_accession: Option<String>,
    /// Set once a historical backfill has completed.
    pub backfill: Option<BackfillMarker>,
    pub added_at: DateTime<Utc>,
}

impl Company {
    pub fn new(ticker: impl AsRef<str>) -> Self {
        Self {
            ticker: ticker.as_ref().trim().to_uppercase(),
            cik: None,
            name: None,
            last_seen_filed: None,
            last_seen_accession: None,
            backfill: None,
            added_at: Utc::now(),
        }
    }

    /// Advances the sync checkpoint to `(filed, accession)`.
    ///
    /// The checkpoint never moves backward: an older date is ignored, and an
    /// equal date only updates the accession component.
    pub fn advance_checkpoint(&mut self, filed: NaiveDate, accession: &str) {
        match self.last_seen_filed {
            Some(current) if filed < current => {}
            Some(current) if filed == current => {
                self.last_seen_accession = Some(accession.to_string());
            }
            _ => {
                self.last_seen_filed = Some(filed);
                self.last_seen_accession = Some(accession.to_string());
            }
        }
    }
}

/// The ordered set of companies the pipeline watches.
///
/// Tickers are unique; re-adding an existing ticker replaces the entry in
/// place rather than appending a duplicate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Watchlist {
    pub companies: Vec<Company>,
}

impl Watchlist {
    /// Inserts a company, replacing any existing entry with the same ticker
    /// in place.
    pub fn upsert(&mut self, company: Company) {
        match self
            .companies
            .iter_mut()
            .find(|c| c.ticker == company.ticker)
        {
            Some(existing) => *existing = company,
            None => self.companies.push(company),
        }
    }

    /// Removes a company by ticker. Returns whether an entry was removed.
    pub fn remove(&mut self, ticker: &str) -> bool {
        let ticker = ticker.trim().to_uppercase();
        let before = self.companies.len();
        self.companies.retain(|c| c.ticker != ticker);
        self.companies.len() < before
    }

    pub fn get(&self, ticker: &str) -> Option<&Company> {
        let ticker = ticker.trim().to_uppercase();
        self.companies.iter().find(|c| c.ticker == ticker)
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.companies.len()
    }
}

/// How a job run selects its discovery window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    /// Only filings newer than each company's checkpoint.
    Incremental,
    /// Everything within the trailing window of `years` years.
    Backfill { years: u32 },
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobMode::Incremental => f.write_str("incremental"),
            JobMode::Backfill { years } => write!(f, "backfill({years}y)"),
        }
    }
}

/// Record of one pipeline run. Immutable once finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    /// Timestamp-derived identifier, e.g. `run-20240115T093042-7f3a`.
    pub run_id: String,
    pub mode: JobMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub companies_processed: u32,
    pub filings_discovered: u32,
    pub filings_downloaded: u32,
    pub filings_failed: u32,
    /// False only when the run could not get off the ground (e.g. the
    /// watchlist failed to load). Per-company and per-filing failures keep
    /// the run successful and are reported through the counters and `error`.
    pub success: bool,
    pub error: Option<String>,
}

impl JobRun {
    /// Starts a new run record with a fresh timestamp-derived id.
    pub fn begin(mode: JobMode) -> Self {
        let started_at = Utc::now();
        let run_id = format!(
            "run-{}-{:04x}",
            started_at.format("%Y%m%dT%H%M%S"),
            fastrand::u16(..)
        );
        Self {
            run_id,
            mode,
            started_at,
            finished_at: None,
            companies_processed: 0,
            filings_discovered: 0,
            filings_downloaded: 0,
            filings_failed: 0,
            success: true,
            error: None,
        }
    }

    /// Stamps the end of the run.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}
