//! Trait definitions organizing registry operations by domain.
//!
//! The registry client's API surface is grouped into two domains: company
//! identity lookups and filing retrieval. Each has a corresponding trait that
//! the `Registry` client implements.
//!
//! Users typically interact with the `Registry` struct directly rather than
//! through trait objects, but the traits keep the API surface discoverable
//! and allow alternative implementations in testing scenarios.

use super::company::CompanyTicker;
use super::error::Result;
use super::filings::{FilingSummary, Submissions};
use super::options::ListOptions;
use async_trait::async_trait;

/// Operations for resolving company identity.
///
/// The registry keys everything by Central Index Key (CIK), while users think
/// in ticker symbols. These operations bridge the two using the registry's
/// published ticker table.
#[async_trait]
pub trait CompanyOperations {
    /// Retrieves the full ticker table from the registry.
    async fn company_tickers(&self) -> Result<Vec<CompanyTicker>>;
    /// Resolves a ticker symbol into its Central Index Key (CIK).
    async fn resolve_cik(&self, ticker: &str) -> Result<u64>;
}

/// Operations for discovering and downloading filings.
///
/// Discovery reads a company's submission history and turns it into filing
/// summaries; the download operations fetch the document content and registry
/// metadata for one filing. Document and metadata downloads are independent
/// requests, so either can fail without affecting the other.
#[async_trait]
pub trait FilingOperations {
    /// Retrieves the submission history document for a company.
    async fn submissions(&self, cik: u64) -> Result<Submissions>;
    /// Lists a company's filings filtered, ordered, and truncated per the options.
    async fn list_filings(&self, cik: u64, options: &ListOptions) -> Result<Vec<FilingSummary>>;
    /// Downloads the filing's document content.
    async fn download_document(&self, summary: &FilingSummary) -> Result<String>;
    /// Downloads the registry's metadata for a filing as raw JSON.
    async fn download_metadata(&self, summary: &FilingSummary) -> Result<serde_json::Value>;
}
