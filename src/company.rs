//! Company identity lookups.
//!
//! Ticker ↔ CIK resolution used to bootstrap most registry requests. The
//! registry's ticker table is a single JSON document covering every listed
//! company; it is fetched once per client instance and cached, so watchlists
//! of any size cost one table request per run.

use super::Registry;
use super::error::{IngestError, Result};
use super::traits::CompanyOperations;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json;
use std::collections::HashMap;

/// Mapping between a stock ticker symbol and a company CIK.
///
/// The registry maintains this mapping to help users discover company
/// identifiers. Note that companies can have multiple tickers across
/// different exchanges; each ticker maps to the same CIK.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompanyTicker {
    #[serde(rename = "cik_str")]
    pub cik: u64,
    pub ticker: String,
    pub title: String,
}

#[async_trait]
impl CompanyOperations for Registry {
    /// Retrieves the full ticker table from the registry.
    ///
    /// The table is served as a JSON object keyed by row number; the keys
    /// carry no information and are discarded.
    ///
    /// # Errors
    ///
    /// * `IngestError::NotFound` - The ticker table endpoint was not found.
    /// * `IngestError::JsonError` - The response could not be parsed.
    async fn company_tickers(&self) -> Result<Vec<CompanyTicker>> {
        let url = format!("{}/company_tickers.json", self.files_base_url);
        let response = self.get(&url).await?;
        let map: HashMap<String, CompanyTicker> = serde_json::from_str(&response)?;
        Ok(map.into_values().collect())
    }

    /// Resolves a ticker symbol into its Central Index Key (CIK).
    ///
    /// The first resolution on a client instance fetches the ticker table and
    /// caches it; subsequent lookups are served from the cache without
    /// touching the network.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::TickerNotFound` if the ticker is absent from the
    /// table.
    async fn resolve_cik(&self, ticker: &str) -> Result<u64> {
        let ticker = ticker.trim().to_uppercase();

        if let Some(table) = self.ticker_cache.read().await.as_ref() {
            return table
                .get(&ticker)
                .copied()
                .ok_or(IngestError::TickerNotFound);
        }

        let tickers = self.company_tickers().await?;
        let table: HashMap<String, u64> = tickers
            .into_iter()
            .map(|t| (t.ticker.to_uppercase(), t.cik))
            .collect();
        let cik = table.get(&ticker).copied();
        *self.ticker_cache.write().await = Some(table);

        cik.ok_or(IngestError::TickerNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ticker_table() {
        let content = r#"{
            "0": {"cik_str": 320193, "ticker": "AAPL", "title": "Apple Inc."},
            "1": {"cik_str": 789019, "ticker": "MSFT", "title": "MICROSOFT CORP"}
        }"#;
        let map: HashMap<String, CompanyTicker> = serde_json::from_str(content).unwrap();
        let mut tickers: Vec<CompanyTicker> = map.into_values().collect();
        tickers.sort_by(|a, b| a.ticker.cmp(&b.ticker));

        assert_eq!(tickers.len(), 2);
        assert_eq!(tickers[0].ticker, "AAPL");
        assert_eq!(tickers[0].cik, 320193);
        assert_eq!(tickers[1].title, "MICROSOFT CORP");
    }
}
