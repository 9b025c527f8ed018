//! Document Extractor - Root Markup Block Selection

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::markup::StartTag;

static SVG_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<svg\b[^>]*>.*?</svg\s*>").expect("svg block regex is valid")
});

static SVG_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^<svg\b[^>]*>").expect("svg open regex is valid"));

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no <svg>...</svg> block found in collaborator output")]
pub struct DocumentMissing;

/// Pick the best `<svg>` block out of raw collaborator text.
///
/// Collaborators sometimes emit a truncated draft before the full
/// document, so candidates are ranked by whether the root declares its
/// size, then by length. Ties keep the earliest block.
pub fn extract_document(raw: &str) -> Result<String, DocumentMissing> {
    let mut best: Option<((bool, usize), &str)> = None;

    for candidate in SVG_BLOCK.find_iter(raw).map(|m| m.as_str()) {
        let score = (declares_size(candidate), candidate.len());
        if best.map_or(true, |(top, _)| score > top) {
            best = Some((score, candidate));
        }
    }

    best.map(|(_, doc)| doc.to_string()).ok_or(DocumentMissing)
}

fn declares_size(block: &str) -> bool {
    let Some(open) = SVG_OPEN.find(block) else {
        return false;
    };
    match StartTag::parse(open.as_str()) {
        Some(root) => root.has_attr("viewBox") || (root.has_attr("width") && root.has_attr("height")),
        None => false,
    }
}
