//! Word-window chunking of detected sections.
//!
//! Chunks are overlapping word windows cut per section. The sequential
//! `chunk-N` id is a convenience for this parse only; the anchor
//! `{section_id}:{block_index}` is the identifier downstream consumers may
//! persist, because it depends only on section identity and block order and
//! so survives reruns.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::sections::Section;

/// Word-window sizing for chunk extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSettings {
    /// Target words per chunk.
    pub chunk_words: usize,
    /// Words shared between consecutive chunks of the same section.
    pub chunk_overlap: usize,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            chunk_words: 1000,
            chunk_overlap: 200,
        }
    }
}

/// One retrieval chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Sequential id within this parse (`chunk-0`, `chunk-1`, ...). Not
    /// stable across reruns.
    pub id: String,
    /// Id of the owning section.
    pub section_id: String,
    /// Stable anchor: `{section_id}:{block_index}`.
    pub anchor: String,
    pub text: String,
    /// Approximate byte range into the cleaned text.
    pub start: usize,
    pub end: usize,
    pub word_count: usize,
}

fn word_pattern() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"\S+").unwrap())
}

/// Cuts every section into overlapping word windows.
///
/// A section of `W` words with target `T` and overlap `O` yields one chunk
/// when `W <= T` and `ceil((W - O) / (T - O))` chunks otherwise. Chunk ids
/// are assigned globally in document order; each section's `chunk_ids` list
/// is filled in as a side effect.
pub fn chunk_sections(
    text: &str,
    sections: &mut [Section],
    settings: &ChunkSettings,
) -> Vec<Chunk> {
    let target = settings.chunk_words.max(1);
    let overlap = settings.chunk_overlap.min(target - 1);
    let step = target - overlap;

    let mut chunks = Vec::new();
    for section in sections.iter_mut() {
        let body = &text[section.start..section.end];
        let words: Vec<(usize, usize)> = word_pattern()
            .find_iter(body)
            .map(|m| (m.start(), m.end()))
            .collect();
        if words.is_empty() {
            continue;
        }

        let mut block_index = 0;
        let mut from = 0;
        loop {
            let to = (from + target).min(words.len());
            let start = section.start + words[from].0;
            let end = section.start + words[to - 1].1;
            let id = format!("chunk-{}", chunks.len());
            let anchor = format!("{}:{}", section.id, block_index);
            section.chunk_ids.push(id.clone());
            chunks.push(Chunk {
                id,
                section_id: section.id.clone(),
                anchor,
                text: text[start..end].to_string(),
                start,
                end,
                word_count: to - from,
            });
            if to == words.len() {
                break;
            }
            from += step;
            block_index += 1;
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section_of(id: &str, start: usize, end: usize) -> Section {
        Section {
            id: id.to_string(),
            label: id.to_string(),
            start,
            end,
            anchors: Vec::new(),
            chunk_ids: Vec::new(),
        }
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    fn count_chunks(word_count: usize, target: usize, overlap: usize) -> usize {
        let text = words(word_count);
        let mut sections = vec![section_of("s", 0, text.len())];
        let settings = ChunkSettings {
            chunk_words: target,
            chunk_overlap: overlap,
        };
        chunk_sections(&text, &mut sections, &settings).len()
    }

    #[test]
    fn test_chunk_count_formula() {
        // W <= T: exactly one chunk.
        assert_eq!(count_chunks(1, 1000, 200), 1);
        assert_eq!(count_chunks(999, 1000, 200), 1);
        assert_eq!(count_chunks(1000, 1000, 200), 1);

        // W > T: ceil((W - O) / (T - O)).
        assert_eq!(count_chunks(1001, 1000, 200), 2);
        assert_eq!(count_chunks(1800, 1000, 200), 2);
        assert_eq!(count_chunks(1801, 1000, 200), 3);
        assert_eq!(count_chunks(2000, 1000, 200), 3);
        assert_eq!(count_chunks(50, 10, 3), 7); // ceil(47 / 7)
    }

    #[test]
    fn test_overlap_repeats_trailing_words() {
        let text = words(15);
        let mut sections = vec![section_of("s", 0, text.len())];
        let settings = ChunkSettings {
            chunk_words: 10,
            chunk_overlap: 4,
        };
        let chunks = chunk_sections(&text, &mut sections, &settings);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.starts_with("w0 "));
        assert!(chunks[0].text.ends_with(" w9"));
        // Second window starts at word 6: the last 4 words of chunk 0 repeat.
        assert!(chunks[1].text.starts_with("w6 "));
        assert!(chunks[1].text.ends_with(" w14"));
        assert_eq!(chunks[1].word_count, 9);
    }

    #[test]
    fn test_ids_global_and_anchors_per_section() {
        let part_a = words(25);
        let part_b = words(12);
        let text = format!("{part_a}\n{part_b}");
        let mut sections = vec![
            section_of("item_1", 0, part_a.len()),
            section_of("item_2", part_a.len() + 1, text.len()),
        ];
        let settings = ChunkSettings {
            chunk_words: 10,
            chunk_overlap: 0,
        };
        let chunks = chunk_sections(&text, &mut sections, &settings);

        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["chunk-0", "chunk-1", "chunk-2", "chunk-3", "chunk-4"]);

        let anchors: Vec<&str> = chunks.iter().map(|c| c.anchor.as_str()).collect();
        assert_eq!(
            anchors,
            vec!["item_1:0", "item_1:1", "item_1:2", "item_2:0", "item_2:1"]
        );

        assert_eq!(sections[0].chunk_ids, vec!["chunk-0", "chunk-1", "chunk-2"]);
        assert_eq!(sections[1].chunk_ids, vec!["chunk-3", "chunk-4"]);
    }

    #[test]
    fn test_char_ranges_slice_back_to_chunk_text() {
        let text = words(30);
        let mut sections = vec![section_of("s", 0, text.len())];
        let settings = ChunkSettings {
            chunk_words: 10,
            chunk_overlap: 2,
        };
        let chunks = chunk_sections(&text, &mut sections, &settings);
        for chunk in &chunks {
            assert_eq!(&text[chunk.start..chunk.end], chunk.text);
        }
    }

    #[test]
    fn test_degenerate_overlap_still_advances() {
        // Overlap >= target is clamped to target - 1, so the window always
        // advances by at least one word.
        assert_eq!(count_chunks(10, 4, 9), 7); // ceil((10 - 3) / 1)
    }
}
