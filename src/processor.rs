//! Concurrent download-and-parse engine.
//!
//! The processor turns `Discovered` filings into `Ready` or `Failed` ones.
//! Candidates are claimed through the state store first and only claimed
//! filings are submitted to the worker pool, so discovery and submission
//! never race. Workers run concurrently via `buffer_unordered`; results are
//! collected as they complete and folded into a [`ProcessSummary`].

use chrono::NaiveDate;
use futures_util::StreamExt;
use futures_util::stream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::IngestConfig;
use crate::core::Registry;
use crate::error::Result;
use crate::filings::FilingSummary;
use crate::layout;
use crate::model::{Filing, FilingStatus};
use crate::parsing::{self, ChunkSettings, ParseStats, ParsedFiling};
use crate::render::Renderer;
use crate::state::StateStore;
use crate::store::BlobStore;
use crate::traits::FilingOperations;

/// Cap on error strings carried in one summary.
pub const MAX_ERRORS: usize = 8;

/// Aggregate outcome of one processing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Filings that reached `Ready`.
    pub succeeded: usize,
    /// Filings that reached `Failed`.
    pub failed: usize,
    /// Candidates whose claim was lost to another worker.
    pub skipped: usize,
    /// First [`MAX_ERRORS`] failure descriptions, in completion order.
    pub errors: Vec<String>,
}

impl ProcessSummary {
    fn record_error(&mut self, message: String) {
        if self.errors.len() < MAX_ERRORS {
            self.errors.push(message);
        }
    }
}

/// Summary artifact written per filing for downstream consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub cik: u64,
    pub accession_number: String,
    pub form: String,
    pub company_name: String,
    pub filed_date: NaiveDate,
    pub sections: Vec<ManifestSection>,
    pub stats: ParseStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestSection {
    pub id: String,
    pub label: String,
    pub start: usize,
    pub end: usize,
    pub chunk_count: usize,
}

fn manifest_of(filing: &Filing, parsed: &ParsedFiling) -> Manifest {
    Manifest {
        cik: filing.cik,
        accession_number: filing.accession_number.clone(),
        form: filing.form.clone(),
        company_name: filing.company_name.clone(),
        filed_date: filing.filed_date,
        sections: parsed
            .sections
            .iter()
            .map(|s| ManifestSection {
                id: s.id.clone(),
                label: s.label.clone(),
                start: s.start,
                end: s.end,
                chunk_count: s.chunk_ids.len(),
            })
            .collect(),
        stats: parsed.stats,
    }
}

/// Download-and-parse worker pool over claimed filings.
pub struct Processor {
    registry: Arc<Registry>,
    state: Arc<dyn StateStore>,
    blobs: Arc<dyn BlobStore>,
    renderer: Box<dyn Renderer>,
    chunk_settings: ChunkSettings,
    worker_count: usize,
}

impl Processor {
    pub fn new(
        registry: Arc<Registry>,
        state: Arc<dyn StateStore>,
        blobs: Arc<dyn BlobStore>,
        renderer: Box<dyn Renderer>,
        config: &IngestConfig,
    ) -> Self {
        Self {
            registry,
            state,
            blobs,
            renderer,
            chunk_settings: ChunkSettings {
                chunk_words: config.chunk_words,
                chunk_overlap: config.chunk_overlap,
            },
            worker_count: config.worker_count.max(1),
        }
    }

    /// Claims and processes every `Discovered` filing.
    ///
    /// Filing failures never abort the pass; they are folded into the
    /// summary. Failed filings stay `Failed` and are not retried by later
    /// passes.
    ///
    /// # Errors
    ///
    /// Only state-store I/O failures during candidate listing or claiming
    /// abort the pass.
    pub async fn process_pending(&self) -> Result<ProcessSummary> {
        let candidates = self
            .state
            .filings_by_status(FilingStatus::Discovered)
            .await?;
        let mut summary = ProcessSummary::default();
        if candidates.is_empty() {
            return Ok(summary);
        }

        let mut claimed = Vec::new();
        for mut filing in candidates {
            if self.state.claim_filing(&filing).await? {
                // Mirror the stored transition so the final Ready/Failed move
                // validates against the transition table.
                filing.set_status(FilingStatus::Downloading)?;
                claimed.push(filing);
            } else {
                summary.skipped += 1;
            }
        }

        tracing::info!(
            "processing {} claimed filings ({} skipped)",
            claimed.len(),
            summary.skipped
        );

        let mut results = stream::iter(claimed.into_iter().map(|filing| self.process_one(filing)))
            .buffer_unordered(self.worker_count);
        while let Some(outcome) = results.next().await {
            match outcome {
                Ok(()) => summary.succeeded += 1,
                Err((key, message)) => {
                    tracing::warn!("filing {} failed: {}", key, message);
                    summary.failed += 1;
                    summary.record_error(format!("{key}: {message}"));
                }
            }
        }
        Ok(summary)
    }

    /// Runs one claimed filing to a terminal status and persists the record.
    async fn process_one(&self, mut filing: Filing) -> std::result::Result<(), (String, String)> {
        let key = filing.key();
        let result = match self.ingest(&mut filing).await {
            Ok(()) => filing
                .set_status(FilingStatus::Ready)
                .map_err(|e| (key.clone(), e.to_string())),
            Err(e) => {
                let message = e.to_string();
                if let Err(transition) = filing.record_failure(&message) {
                    tracing::warn!("could not mark {} failed: {}", key, transition);
                }
                Err((key.clone(), message))
            }
        };

        if let Err(e) = self.state.upsert_filing(&filing).await {
            let message = match &result {
                Err((_, m)) => format!("{m}; state write failed: {e}"),
                Ok(()) => format!("state write failed: {e}"),
            };
            return Err((key, message));
        }
        result
    }

    /// Downloads, parses, renders, and persists one claimed filing,
    /// recording artifact keys on the record as they land.
    async fn ingest(&self, filing: &mut Filing) -> Result<()> {
        let summary = FilingSummary::from(&*filing);

        // Metadata and document are independent fetches; the filing fails
        // outright only when both are missing.
        let metadata = match self.registry.download_metadata(&summary).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("metadata fetch failed for {}: {}", filing.key(), e);
                None
            }
        };
        let document = match self.registry.download_document(&summary).await {
            Ok(body) => Some(body),
            Err(e) => {
                if metadata.is_none() {
                    return Err(e);
                }
                tracing::warn!("document fetch failed for {}: {}", filing.key(), e);
                None
            }
        };

        if let Some(metadata) = &metadata {
            let key = layout::metadata_key(filing);
            self.blobs
                .put(&key, &serde_json::to_vec_pretty(metadata)?)
                .await?;
            filing.artifacts.metadata = Some(key);
        }

        let Some(document) = document else {
            return Ok(());
        };

        let raw_key = layout::raw_key(filing);
        self.blobs.put(&raw_key, document.as_bytes()).await?;
        filing.artifacts.raw = Some(raw_key);

        match parsing::parse_filing(filing.form_type, &document, &self.chunk_settings) {
            Ok(parsed) => {
                let text_key = layout::text_key(filing);
                self.blobs.put(&text_key, parsed.text.as_bytes()).await?;
                filing.artifacts.text = Some(text_key);

                let manifest_key = layout::manifest_key(filing);
                let manifest = manifest_of(filing, &parsed);
                self.blobs
                    .put(&manifest_key, &serde_json::to_vec_pretty(&manifest)?)
                    .await?;
                filing.artifacts.manifest = Some(manifest_key);

                let sections_key = layout::sections_key(filing);
                self.blobs
                    .put(&sections_key, &serde_json::to_vec_pretty(&parsed.sections)?)
                    .await?;
                filing.artifacts.sections = Some(sections_key);

                let mut lines = String::new();
                for chunk in &parsed.chunks {
                    lines.push_str(&serde_json::to_string(chunk)?);
                    lines.push('\n');
                }
                let chunks_key = layout::chunks_key(filing);
                self.blobs.put(&chunks_key, lines.as_bytes()).await?;
                filing.artifacts.chunks = Some(chunks_key);
            }
            Err(e) => {
                // The raw document is a valid outcome on its own; the parse
                // failure is recorded, not fatal.
                tracing::warn!("parse failed for {}: {}", filing.key(), e);
                filing.error = Some(format!("parse: {e}"));
            }
        }

        match self.renderer.render(&document).await {
            Ok(Some(bytes)) => {
                let key = layout::rendered_key(filing);
                self.blobs.put(&key, &bytes).await?;
                filing.artifacts.rendered = Some(key);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("render failed for {}: {}", filing.key(), e),
        }

        Ok(())
    }
}
