//! Filing document parsing.
//!
//! Turns one raw filing document into cleaned plain text, a named-section
//! breakdown, and overlapping retrieval chunks. The stages live in their own
//! modules (`text`, `sections`, `chunks`); [`parse_filing`] runs them in
//! order and aggregates the result.

pub mod chunks;
pub mod sections;
pub mod text;

pub use chunks::{Chunk, ChunkSettings};
pub use sections::Section;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};
use crate::model::FormType;

/// Aggregate statistics over one parsed filing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
    pub chars: usize,
    pub words: usize,
    pub section_count: usize,
    pub chunk_count: usize,
}

/// Everything derived from one raw filing document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedFiling {
    /// Cleaned plain text.
    pub text: String,
    pub sections: Vec<Section>,
    pub chunks: Vec<Chunk>,
    pub stats: ParseStats,
}

/// Parses one raw filing document end to end.
///
/// # Errors
///
/// Returns [`IngestError::ParseError`] when the document yields no text at
/// all after markup stripping.
pub fn parse_filing(kind: FormType, raw: &str, settings: &ChunkSettings) -> Result<ParsedFiling> {
    let text = text::extract_text(raw);
    if text.is_empty() {
        return Err(IngestError::ParseError(
            "document contains no extractable text".to_string(),
        ));
    }
    let mut sections = sections::detect_sections(kind, &text);
    let chunks = chunks::chunk_sections(&text, &mut sections, settings);
    let stats = ParseStats {
        chars: text.chars().count(),
        words: text.split_whitespace().count(),
        section_count: sections.len(),
        chunk_count: chunks.len(),
    };
    Ok(ParsedFiling {
        text,
        sections,
        chunks,
        stats,
    })
}
