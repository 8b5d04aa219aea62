//! Deterministic storage keys for filing artifacts.
//!
//! Every artifact of a filing lives under one directory per company ticker,
//! named by accession number with a per-artifact suffix:
//!
//! ```text
//! filings/ACME/0000012345-24-000010.htm            raw document
//! filings/ACME/0000012345-24-000010.meta.json      registry metadata
//! filings/ACME/0000012345-24-000010.pdf            rendered derivative
//! filings/ACME/0000012345-24-000010.txt            cleaned text
//! filings/ACME/0000012345-24-000010.manifest.json  parse manifest
//! filings/ACME/0000012345-24-000010.sections.json  section index
//! filings/ACME/0000012345-24-000010.chunks.jsonl   chunk records
//! ```
//!
//! Keys are pure functions of the filing record, so reruns and both storage
//! backends agree on where everything lives. Pipeline state is kept in a
//! separate tree (see the `state` module).

use super::model::Filing;

/// Directory name for a filing's company: the ticker when known, otherwise
/// the zero-padded CIK.
pub fn company_dir(filing: &Filing) -> String {
    match &filing.ticker {
        Some(ticker) if !ticker.is_empty() => ticker.to_uppercase(),
        _ => format!("CIK{:010}", filing.cik),
    }
}

fn artifact_key(filing: &Filing, suffix: &str) -> String {
    format!(
        "filings/{}/{}.{}",
        company_dir(filing),
        filing.accession_number,
        suffix
    )
}

/// Key of the raw document as fetched from the registry.
pub fn raw_key(filing: &Filing) -> String {
    artifact_key(filing, "htm")
}

/// Key of the registry metadata JSON.
pub fn metadata_key(filing: &Filing) -> String {
    artifact_key(filing, "meta.json")
}

/// Key of the rendered fixed-layout derivative.
pub fn rendered_key(filing: &Filing) -> String {
    artifact_key(filing, "pdf")
}

/// Key of the cleaned plain text.
pub fn text_key(filing: &Filing) -> String {
    artifact_key(filing, "txt")
}

/// Key of the parse manifest.
pub fn manifest_key(filing: &Filing) -> String {
    artifact_key(filing, "manifest.json")
}

/// Key of the section index.
pub fn sections_key(filing: &Filing) -> String {
    artifact_key(filing, "sections.json")
}

/// Key of the chunk records file (one JSON object per line).
pub fn chunks_key(filing: &Filing) -> String {
    artifact_key(filing, "chunks.jsonl")
}
