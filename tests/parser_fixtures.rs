mod common;

use common::read_fixture;
use filingest::parsing::sections::detect_sections;
use filingest::parsing::text::extract_text;
use filingest::{ChunkSettings, FormType, parse_filing};

fn settings() -> ChunkSettings {
    ChunkSettings {
        chunk_words: 120,
        chunk_overlap: 30,
    }
}

#[test]
fn extract_text_strips_markup_and_decodes_entities() {
    let raw = read_fixture("documents/acme_10k.htm");
    let text = extract_text(&raw);

    assert!(!text.contains('<'));
    assert!(!text.contains("window.defaultStatus"), "script should be dropped");
    assert!(!text.contains("font-family"), "style should be dropped");
    assert!(!text.contains("Field: Doc"), "comments should be dropped");

    // &#8217; and &nbsp; decode; &amp; decodes exactly once.
    assert!(text.contains("Management\u{2019}s Discussion"));
    assert!(text.contains("December 31, 2023"));
    assert!(text.contains("Research & development"));

    // Table cells join into one line per row.
    assert!(text.contains("Net revenue 1,845,210 1,612,904"));
}

#[test]
fn section_detection_skips_table_of_contents() {
    let raw = read_fixture("documents/acme_10k.htm");
    let text = extract_text(&raw);
    let sections = detect_sections(FormType::AnnualReport, &text);

    let ids: Vec<&str> = sections.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["item_1", "item_1a", "item_7", "item_8"]);

    // Every surviving header sits past the table of contents.
    let toc = text.find("TABLE OF CONTENTS").unwrap();
    assert!(sections[0].start > toc);
    assert!(text[sections[0].start..].starts_with("Item 1. Business"));

    // The cross-reference inside Item 1 does not open Item 1A early: the
    // real Risk Factors header is followed by its own sub-headers.
    let item_1a = &sections[1];
    let body = &text[item_1a.start..item_1a.end];
    assert!(body.contains("COMPETITIVE PRESSURE"));
    assert!(item_1a.anchors.contains(&"COMPETITIVE PRESSURE".to_string()));
    assert!(item_1a.anchors.contains(&"Supply Chain Concentration".to_string()));

    // Sections tile the text from the first header to the end.
    for pair in sections.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
    }
    assert_eq!(sections.last().unwrap().end, text.len());
}

#[test]
fn parse_filing_chunks_every_section() {
    let raw = read_fixture("documents/acme_10k.htm");
    let parsed = parse_filing(FormType::AnnualReport, &raw, &settings()).unwrap();

    assert_eq!(parsed.stats.section_count, 4);
    assert!(parsed.stats.words > 800, "fixture should be prose-dense");
    assert_eq!(parsed.stats.chunk_count, parsed.chunks.len());
    assert!(parsed.chunks.len() >= 8);

    // Global chunk ids are a single sequence; anchors are per section.
    for (i, chunk) in parsed.chunks.iter().enumerate() {
        assert_eq!(chunk.id, format!("chunk-{i}"));
        assert!(chunk.anchor.starts_with(&format!("{}:", chunk.section_id)));
        assert_eq!(chunk.text, &parsed.text[chunk.start..chunk.end]);
    }

    for section in &parsed.sections {
        assert!(
            section.chunk_ids.len() >= 2,
            "section {} should span multiple chunks",
            section.id
        );
        // Consecutive chunks of one section overlap.
        let chunks: Vec<_> = parsed
            .chunks
            .iter()
            .filter(|c| c.section_id == section.id)
            .collect();
        for pair in chunks.windows(2) {
            assert!(pair[1].start < pair[0].end);
            assert!(pair[1].start > pair[0].start);
        }
    }
}

#[test]
fn reparsing_yields_identical_anchors() {
    let raw = read_fixture("documents/acme_10k.htm");
    let first = parse_filing(FormType::AnnualReport, &raw, &settings()).unwrap();
    let second = parse_filing(FormType::AnnualReport, &raw, &settings()).unwrap();

    assert_eq!(first.text, second.text);
    let anchors_a: Vec<&str> = first.chunks.iter().map(|c| c.anchor.as_str()).collect();
    let anchors_b: Vec<&str> = second.chunks.iter().map(|c| c.anchor.as_str()).collect();
    assert_eq!(anchors_a, anchors_b);

    let bounds_a: Vec<(usize, usize)> = first.sections.iter().map(|s| (s.start, s.end)).collect();
    let bounds_b: Vec<(usize, usize)> = second.sections.iter().map(|s| (s.start, s.end)).collect();
    assert_eq!(bounds_a, bounds_b);
}
