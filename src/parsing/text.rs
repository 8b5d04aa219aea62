//! Markup-to-text extraction.
//!
//! Filings arrive as HTML of wildly inconsistent vintage, from hand-written
//! 1990s tag soup to generated XBRL-adjacent markup. The extractor here does
//! not build a DOM; it strips non-content subtrees, turns block-level tags
//! into line breaks, drops the rest, decodes entities, and normalizes
//! whitespace. Documents that are already plain text pass through the
//! normalization step unchanged.

use regex::Regex;
use std::sync::OnceLock;

struct Patterns {
    comments: Regex,
    dropped_subtrees: Regex,
    meta_tags: Regex,
    block_tags: Regex,
    cell_tags: Regex,
    any_tag: Regex,
    numeric_entity: Regex,
    horizontal_ws: Regex,
    line_edges: Regex,
    blank_lines: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        comments: Regex::new(r"(?s)<!--.*?-->").unwrap(),
        dropped_subtrees: Regex::new(
            r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>|<head\b[^>]*>.*?</head\s*>|<title\b[^>]*>.*?</title\s*>",
        )
        .unwrap(),
        meta_tags: Regex::new(r"(?i)<meta\b[^>]*>").unwrap(),
        block_tags: Regex::new(
            r"(?i)</?(?:p|div|tr|table|thead|tbody|tfoot|li|ul|ol|h[1-6]|blockquote|pre|hr|section|article|br)\b[^>]*>",
        )
        .unwrap(),
        cell_tags: Regex::new(r"(?i)</?(?:td|th)\b[^>]*>").unwrap(),
        // Bounded so a stray `<` in plain text cannot swallow kilobytes
        // before the next `>`.
        any_tag: Regex::new(r"(?s)<[^>]{1,400}>").unwrap(),
        numeric_entity: Regex::new(r"&#([xX][0-9a-fA-F]{1,6}|[0-9]{1,7});").unwrap(),
        horizontal_ws: Regex::new(r"[ \t\u{A0}]+").unwrap(),
        line_edges: Regex::new(r"[ \t]*\n[ \t]*").unwrap(),
        blank_lines: Regex::new(r"\n{3,}").unwrap(),
    })
}

/// Converts one raw filing document into cleaned plain text.
pub fn extract_text(raw: &str) -> String {
    let p = patterns();
    let text = p.comments.replace_all(raw, "");
    let text = p.dropped_subtrees.replace_all(&text, "");
    let text = p.meta_tags.replace_all(&text, "");
    let text = p.block_tags.replace_all(&text, "\n");
    let text = p.cell_tags.replace_all(&text, " ");
    let text = p.any_tag.replace_all(&text, "");
    let text = decode_entities(&text);
    normalize(&text)
}

/// Decodes numeric character references and the named entities common in
/// filing markup. `&amp;` is decoded last so double-escaped text stays
/// single-escaped.
fn decode_entities(text: &str) -> String {
    let decoded = patterns()
        .numeric_entity
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let body = &caps[1];
            let value = match body.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => body.parse::<u32>().ok(),
            };
            match value.and_then(char::from_u32) {
                Some(c) => c.to_string(),
                None => String::new(),
            }
        });
    decoded
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Whitespace normalization: CRLF to LF, horizontal runs collapsed to one
/// space, line-edge whitespace trimmed, 3+ blank lines collapsed to exactly 2,
/// outer whitespace trimmed.
fn normalize(text: &str) -> String {
    let p = patterns();
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = p.horizontal_ws.replace_all(&text, " ");
    let text = p.line_edges.replace_all(&text, "\n");
    let text = p.blank_lines.replace_all(&text, "\n\n");
    text.trim().to_string()
}
