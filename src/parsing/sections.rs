//! Named-section detection over cleaned filing text.
//!
//! Each supported form kind has a fixed, ordered catalog of item patterns.
//! A document usually matches each pattern several times: the table of
//! contents, inline cross-references ("see Item 1A"), and the real header.
//! The real header is the occurrence followed by the most text before the
//! next match of any pattern, so for each pattern only that occurrence
//! survives. Survivors, re-sorted by position, become section boundaries.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::model::FormType;

/// Sub-header anchors reported per section, capped to keep false positives
/// from flooding the section index.
const MAX_SUB_ANCHORS: usize = 12;

/// One detected section of a filing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Catalog identifier, e.g. `item_1a` or `part2_item_6`.
    pub id: String,
    /// Human label, e.g. `Risk Factors`.
    pub label: String,
    /// Byte offset of the section header in the cleaned text.
    pub start: usize,
    /// Byte offset one past the section body (the next section's start, or
    /// end of text for the last section).
    pub end: usize,
    /// Probable sub-header lines within the section. Advisory only.
    pub anchors: Vec<String>,
    /// Ids of the chunks cut from this section, in order.
    #[serde(default)]
    pub chunk_ids: Vec<String>,
}

struct SectionPattern {
    id: &'static str,
    label: &'static str,
    regex: Regex,
}

fn pattern(id: &'static str, label: &'static str, expression: &str) -> SectionPattern {
    SectionPattern {
        id,
        label,
        regex: RegexBuilder::new(expression)
            .case_insensitive(true)
            .build()
            .unwrap(),
    }
}

/// Item catalog for annual reports (10-K).
fn annual_catalog() -> &'static [SectionPattern] {
    static CATALOG: OnceLock<Vec<SectionPattern>> = OnceLock::new();
    CATALOG.get_or_init(|| {
        vec![
            pattern("item_1", "Business", r"item\s+1\s*[.:\-]?\s*business"),
            pattern("item_1a", "Risk Factors", r"item\s+1a\s*[.:\-]?\s*risk\s+factors"),
            pattern(
                "item_1b",
                "Unresolved Staff Comments",
                r"item\s+1b\s*[.:\-]?\s*unresolved\s+staff\s+comments",
            ),
            pattern("item_2", "Properties", r"item\s+2\s*[.:\-]?\s*properties"),
            pattern("item_3", "Legal Proceedings", r"item\s+3\s*[.:\-]?\s*legal\s+proceedings"),
            pattern(
                "item_4",
                "Mine Safety Disclosures",
                r"item\s+4\s*[.:\-]?\s*mine\s+safety\s+disclosures",
            ),
            pattern(
                "item_5",
                "Market for Registrant's Common Equity",
                r"item\s+5\s*[.:\-]?\s*market\s+for\s+registrant",
            ),
            pattern(
                "item_6",
                "Selected Financial Data",
                r"item\s+6\s*[.:\-]?\s*(?:selected\s+financial\s+data|\[?reserved\]?)",
            ),
            pattern(
                "item_7",
                "Management's Discussion and Analysis",
                r"item\s+7\s*[.:\-]?\s*management",
            ),
            pattern(
                "item_7a",
                "Quantitative and Qualitative Disclosures About Market Risk",
                r"item\s+7a\s*[.:\-]?\s*quantitative\s+and\s+qualitative",
            ),
            pattern(
                "item_8",
                "Financial Statements and Supplementary Data",
                r"item\s+8\s*[.:\-]?\s*financial\s+statements",
            ),
            pattern(
                "item_9",
                "Changes in and Disagreements with Accountants",
                r"item\s+9\s*[.:\-]?\s*changes\s+in\s+and\s+disagreements",
            ),
            pattern(
                "item_9a",
                "Controls and Procedures",
                r"item\s+9a\s*[.:\-]?\s*controls\s+and\s+procedures",
            ),
            pattern("item_9b", "Other Information", r"item\s+9b\s*[.:\-]?\s*other\s+information"),
            pattern(
                "item_10",
                "Directors, Executive Officers and Corporate Governance",
                r"item\s+10\s*[.:\-]?\s*directors",
            ),
            pattern(
                "item_11",
                "Executive Compensation",
                r"item\s+11\s*[.:\-]?\s*executive\s+compensation",
            ),
            pattern(
                "item_12",
                "Security Ownership of Certain Beneficial Owners",
                r"item\s+12\s*[.:\-]?\s*security\s+ownership",
            ),
            pattern(
                "item_13",
                "Certain Relationships and Related Transactions",
                r"item\s+13\s*[.:\-]?\s*certain\s+relationships",
            ),
            pattern(
                "item_14",
                "Principal Accountant Fees and Services",
                r"item\s+14\s*[.:\-]?\s*principal\s+account",
            ),
            pattern(
                "item_15",
                "Exhibits and Financial Statement Schedules",
                r"item\s+15\s*[.:\-]?\s*exhibits?",
            ),
        ]
    })
}

/// Item catalog for quarterly reports (10-Q), Part I then Part II.
fn quarterly_catalog() -> &'static [SectionPattern] {
    static CATALOG: OnceLock<Vec<SectionPattern>> = OnceLock::new();
    CATALOG.get_or_init(|| {
        vec![
            pattern(
                "part1_item_1",
                "Financial Statements",
                r"item\s+1\s*[.:\-]?\s*(?:condensed\s+)?(?:consolidated\s+)?financial\s+statements",
            ),
            pattern(
                "part1_item_2",
                "Management's Discussion and Analysis",
                r"item\s+2\s*[.:\-]?\s*management",
            ),
            pattern(
                "part1_item_3",
                "Quantitative and Qualitative Disclosures About Market Risk",
                r"item\s+3\s*[.:\-]?\s*quantitative",
            ),
            pattern(
                "part1_item_4",
                "Controls and Procedures",
                r"item\s+4\s*[.:\-]?\s*controls\s+and\s+procedures",
            ),
            pattern(
                "part2_item_1",
                "Legal Proceedings",
                r"item\s+1\s*[.:\-]?\s*legal\s+proceedings",
            ),
            pattern(
                "part2_item_1a",
                "Risk Factors",
                r"item\s+1a\s*[.:\-]?\s*risk\s+factors",
            ),
            pattern(
                "part2_item_2",
                "Unregistered Sales of Equity Securities",
                r"item\s+2\s*[.:\-]?\s*unregistered\s+sales",
            ),
            pattern(
                "part2_item_3",
                "Defaults Upon Senior Securities",
                r"item\s+3\s*[.:\-]?\s*defaults\s+upon\s+senior\s+securities",
            ),
            pattern(
                "part2_item_4",
                "Mine Safety Disclosures",
                r"item\s+4\s*[.:\-]?\s*mine\s+safety\s+disclosures",
            ),
            pattern(
                "part2_item_5",
                "Other Information",
                r"item\s+5\s*[.:\-]?\s*other\s+information",
            ),
            pattern("part2_item_6", "Exhibits", r"item\s+6\s*[.:\-]?\s*exhibits?"),
        ]
    })
}

fn catalog_for(kind: FormType) -> &'static [SectionPattern] {
    match kind {
        FormType::AnnualReport => annual_catalog(),
        FormType::QuarterlyReport => quarterly_catalog(),
    }
}

#[derive(Debug, Clone, Copy)]
struct Occurrence {
    pattern_index: usize,
    start: usize,
}

/// Detects section boundaries in cleaned text.
///
/// Returns sections in document order. When no catalog pattern matches at
/// all, the whole document becomes a single `full_document` section so that
/// chunking still produces retrieval units.
pub fn detect_sections(kind: FormType, text: &str) -> Vec<Section> {
    let catalog = catalog_for(kind);

    let mut occurrences = Vec::new();
    for (pattern_index, entry) in catalog.iter().enumerate() {
        for m in entry.regex.find_iter(text) {
            occurrences.push(Occurrence {
                pattern_index,
                start: m.start(),
            });
        }
    }
    occurrences.sort_by_key(|o| o.start);

    // Gap to the next match of any pattern. The table of contents packs
    // matches tightly; the real header owns the section body that follows.
    let mut survivors: Vec<Option<(usize, usize)>> = vec![None; catalog.len()];
    for (i, occurrence) in occurrences.iter().enumerate() {
        let next_start = occurrences
            .get(i + 1)
            .map(|o| o.start)
            .unwrap_or(text.len());
        let gap = next_start - occurrence.start;
        match survivors[occurrence.pattern_index] {
            Some((_, best)) if best >= gap => {}
            _ => survivors[occurrence.pattern_index] = Some((occurrence.start, gap)),
        }
    }

    let mut boundaries: Vec<(usize, usize)> = survivors
        .iter()
        .enumerate()
        .filter_map(|(pattern_index, survivor)| survivor.map(|(start, _)| (pattern_index, start)))
        .collect();
    boundaries.sort_by_key(|&(_, start)| start);

    if boundaries.is_empty() {
        if text.is_empty() {
            return Vec::new();
        }
        return vec![Section {
            id: "full_document".to_string(),
            label: "Full Document".to_string(),
            start: 0,
            end: text.len(),
            anchors: extract_sub_anchors(text),
            chunk_ids: Vec::new(),
        }];
    }

    let mut sections = Vec::with_capacity(boundaries.len());
    for (i, &(pattern_index, start)) in boundaries.iter().enumerate() {
        let end = boundaries
            .get(i + 1)
            .map(|&(_, next)| next)
            .unwrap_or(text.len());
        let entry = &catalog[pattern_index];
        sections.push(Section {
            id: entry.id.to_string(),
            label: entry.label.to_string(),
            start,
            end,
            anchors: extract_sub_anchors(&text[start..end]),
            chunk_ids: Vec::new(),
        });
    }
    sections
}

/// Heuristically picks probable sub-header lines from a section body.
fn extract_sub_anchors(body: &str) -> Vec<String> {
    let mut anchors = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.len() < 3 || line.len() > 80 {
            continue;
        }
        if is_probable_header(line) {
            anchors.push(line.to_string());
            if anchors.len() == MAX_SUB_ANCHORS {
                break;
            }
        }
    }
    anchors
}

fn is_probable_header(line: &str) -> bool {
    let has_alpha = line.chars().any(|c| c.is_alphabetic());
    if !has_alpha {
        return false;
    }

    // Entirely capitalized line.
    if line
        .chars()
        .filter(|c| c.is_alphabetic())
        .all(|c| c.is_uppercase())
    {
        return true;
    }

    let words: Vec<&str> = line.split_whitespace().collect();
    let capitalized = words
        .iter()
        .filter(|w| w.chars().next().is_some_and(|c| c.is_uppercase()))
        .count();

    // Title case: at least two capitalized words and no sentence ending.
    if capitalized >= 2 && words.len() <= 10 && !line.ends_with(['.', '!', '?']) {
        return true;
    }

    // Short non-sentence line.
    words.len() <= 6 && line.len() <= 48 && !line.ends_with(['.', ',', ';'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disambiguation_prefers_longest_gap() {
        // Three occurrences of the same header: a table-of-contents entry, an
        // inline cross-reference, and the real one with the body behind it.
        let mut text = String::new();
        text.push_str("Item 1. Business page 3\n");
        text.push_str("Item 1A. Risk Factors page 9\n");
        text.push_str("filler ");
        text.push_str("Item 1. Business (see below)\n");
        text.push_str("Item 1. Business\n");
        text.push_str(&"body ".repeat(1000));
        text.push('\n');
        text.push_str("Item 1A. Risk Factors\n");
        text.push_str(&"risks ".repeat(1000));

        let sections = detect_sections(FormType::AnnualReport, &text);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].id, "item_1");
        assert_eq!(sections[1].id, "item_1a");

        // The surviving Item 1 start is the third occurrence, past both the
        // table of contents and the cross-reference.
        let third = text.rfind("Item 1. Business\n").unwrap();
        assert_eq!(sections[0].start, third);
        assert_eq!(sections[0].end, text.rfind("Item 1A. Risk Factors\n").unwrap());
        assert_eq!(sections[1].end, text.len());
    }

    #[test]
    fn test_sections_cover_contiguous_ranges() {
        let text = format!(
            "ITEM 7. MANAGEMENT'S DISCUSSION AND ANALYSIS\n{}\nITEM 8. FINANCIAL STATEMENTS AND SUPPLEMENTARY DATA\n{}",
            "mdna ".repeat(200),
            "tables ".repeat(200),
        );
        let sections = detect_sections(FormType::AnnualReport, &text);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].id, "item_7");
        assert_eq!(sections[0].start, 0);
        assert_eq!(sections[0].end, sections[1].start);
        assert_eq!(sections[1].id, "item_8");
        assert_eq!(sections[1].end, text.len());
    }

    #[test]
    fn test_quarterly_catalog_part_two() {
        let text = format!(
            "Item 1. Condensed Consolidated Financial Statements\n{}\nItem 1A. Risk Factors\n{}\nItem 6. Exhibits\n{}",
            "statements ".repeat(100),
            "risks ".repeat(100),
            "list ".repeat(20),
        );
        let sections = detect_sections(FormType::QuarterlyReport, &text);
        let ids: Vec<&str> = sections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["part1_item_1", "part2_item_1a", "part2_item_6"]);
    }

    #[test]
    fn test_unmatched_document_falls_back_to_single_section() {
        let text = "This exhibit has no numbered items at all. ".repeat(50);
        let sections = detect_sections(FormType::AnnualReport, &text);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].id, "full_document");
        assert_eq!(sections[0].start, 0);
        assert_eq!(sections[0].end, text.len());

        assert!(detect_sections(FormType::AnnualReport, "").is_empty());
    }

    #[test]
    fn test_sub_anchor_extraction() {
        let body = "Item 1A. Risk Factors\n\
                    COMPETITIVE RISKS\n\
                    We operate in crowded markets. Our revenue depends on winning against incumbents in every segment where we operate today.\n\
                    Supply Chain Concentration\n\
                    A single supplier builds our control modules and our ability to ship product depends on their continued capacity every quarter of the year.\n";
        let anchors = extract_sub_anchors(body);
        assert!(anchors.contains(&"COMPETITIVE RISKS".to_string()));
        assert!(anchors.contains(&"Supply Chain Concentration".to_string()));
        assert!(!anchors.iter().any(|a| a.starts_with("We operate")));
    }

    #[test]
    fn test_sub_anchors_are_capped() {
        let mut body = String::from("HEADER\n");
        for i in 0..40 {
            body.push_str(&format!("SHOUTING LINE {i}\n"));
        }
        assert_eq!(extract_sub_anchors(&body).len(), MAX_SUB_ANCHORS);
    }
}
