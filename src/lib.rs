//! # Filingest - a filing ingestion pipeline for the SEC EDGAR system
//!
//! Filingest discovers disclosure filings for a watchlist of companies,
//! downloads them politely from the SEC's EDGAR (Electronic Data Gathering,
//! Analysis, and Retrieval) system, and turns each document into
//! retrieval-ready artifacts: cleaned text, a section index, and overlapping
//! word chunks with stable anchors.
//!
//! ## Features
//!
//! - **Rate-limited HTTP client** - Complies with SEC.gov fair access rules
//! - **Durable filing state** - Status machine with atomic claims, stored on
//!   local disk or in a remote object store
//! - **Concurrent processor** - Bounded worker pool downloads, parses, and
//!   persists artifacts per filing
//! - **Section and chunk extraction** - HTML to plain text, canonical
//!   10-K/10-Q section catalogs, overlapping word-window chunks
//! - **Run orchestration** - Incremental and backfill discovery over a
//!   persisted watchlist, with durable run records
//!
//! ## Requirements
//!
//! Filingest is an async-first library and requires an async runtime. We recommend
//! [tokio](https://tokio.rs), which is the most widely used async runtime in the Rust ecosystem.
//!
//! ## Basic Usage
//!
//! ```ignore
//! use filingest::{IngestConfig, JobDriver, RunOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Initialize with a proper user agent (required by SEC.gov)
//!     let config = IngestConfig::new("YourAppName contact@example.com", "./data");
//!     let driver = JobDriver::from_config(&config)?;
//!
//!     driver.add_company("AAPL").await?;
//!
//!     let run = driver.run(&RunOptions::default()).await?;
//!     println!(
//!         "discovered {}, downloaded {}, failed {}",
//!         run.filings_discovered, run.filings_downloaded, run.filings_failed
//!     );
//!
//!     Ok(())
//! }
//! ```

mod company;
mod config;
mod core;
mod error;
mod filings;
mod job;
mod layout;
mod model;
mod options;
mod processor;
mod render;
mod state;
mod store;
mod traits;

pub mod parsing;

// Core registry client and configuration (always available)
pub use config::{IngestConfig, RegistryUrls, RenderMethod, StorageConfig};
pub use core::Registry;
pub use error::{IngestError, Result};
pub use options::ListOptions;

// Re-export core types and traits for a clean API
pub use company::CompanyTicker;
pub use filings::{FilingSummary, Submissions};
pub use model::{
    ArtifactPaths, BackfillMarker, Company, Filing, FilingStatus, FormType, JobMode, JobRun,
    Watchlist, filing_key,
};
pub use traits::{CompanyOperations, FilingOperations};

// Pipeline stages
pub use job::{JobDriver, RunOptions, StatusReport};
pub use parsing::{Chunk, ChunkSettings, ParseStats, ParsedFiling, Section, parse_filing};
pub use processor::{Manifest, ManifestSection, ProcessSummary, Processor};
pub use render::{CommandRenderer, Renderer, SkipRenderer, build_renderer};
pub use state::{LocalStateStore, RemoteStateStore, StateStore, open_state_store};
pub use store::{BlobStore, LocalStore, RemoteStore, open_blob_store};

/// Current crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
