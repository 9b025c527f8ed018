//! BiDi Injector - Right-to-Left Text Attributes
//!
//! Runs after geometry enforcement. Only `<text>` blocks whose character
//! data contains RTL script are touched, and every edit is additive or
//! converges on a fixed value, so a second run is a no-op.

use std::ops::RangeInclusive;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::markup::{self, StartTag};

/// Arabic base, supplement, extended-A, presentation forms A and B.
pub const RTL_RANGES: [RangeInclusive<char>; 5] = [
    '\u{0600}'..='\u{06FF}',
    '\u{0750}'..='\u{077F}',
    '\u{08A0}'..='\u{08FF}',
    '\u{FB50}'..='\u{FDFF}',
    '\u{FE70}'..='\u{FEFF}',
];

pub const RTL_FONT_FALLBACK: &str = "Noto Sans Arabic, Noto Naskh Arabic, Tahoma, Arial, sans-serif";

static TEXT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)(<text\b(?:[^>\x22']|\x22[^\x22]*\x22|'[^']*')*>)(.*?)</text\s*>")
        .expect("text block regex is valid")
});

pub fn is_rtl_char(c: char) -> bool {
    RTL_RANGES.iter().any(|range| range.contains(&c))
}

pub fn contains_rtl(text: &str) -> bool {
    text.chars().any(is_rtl_char)
}

/// Inject direction, embedding, anchor and font fallback into every
/// RTL-bearing text block.
pub fn inject_bidi(doc: &str) -> String {
    TEXT_BLOCK
        .replace_all(doc, |caps: &Captures<'_>| {
            let open = &caps[1];
            let inner = &caps[2];
            if !contains_rtl(&markup::strip_tags(inner)) {
                return caps[0].to_string();
            }
            let open = match StartTag::parse(open) {
                Some(tag) => bidi_open_tag(&tag),
                None => open.to_string(),
            };
            format!("{open}{inner}</text>")
        })
        .into_owned()
}

/// Rewrite one matched `<text>` start tag.
pub fn bidi_open_tag(tag: &StartTag<'_>) -> String {
    let mut raw = tag.raw().to_string();

    let has_direction = tag
        .presentation("direction")
        .is_some_and(|d| d.trim().eq_ignore_ascii_case("rtl"));
    if !has_direction {
        raw = edit(&raw, "direction", "rtl");
    }
    if tag.presentation("unicode-bidi").is_none() {
        raw = edit(&raw, "unicode-bidi", "embed");
    }

    // Forced, not toggled: "end" stays "end" on every later run.
    raw = force_anchor_end(&raw);

    if tag.presentation("font-family").is_none() {
        raw = edit(&raw, "font-family", RTL_FONT_FALLBACK);
    }

    // Inline style outranks presentation attributes.
    edit_style(&raw, "direction", "rtl")
}

/// Set `text-anchor` to `end` as an attribute and in any inline style.
pub fn force_anchor_end(raw: &str) -> String {
    edit_style(&edit(raw, "text-anchor", "end"), "text-anchor", "end")
}

fn edit_style(raw: &str, property: &str, value: &str) -> String {
    let Some(tag) = StartTag::parse(raw) else {
        return raw.to_string();
    };
    match tag.style_property(property) {
        Some(current) if !current.eq_ignore_ascii_case(value) => {
            tag.with_style_property(property, value).unwrap_or_else(|| raw.to_string())
        }
        _ => raw.to_string(),
    }
}

fn edit(raw: &str, name: &str, value: &str) -> String {
    match StartTag::parse(raw) {
        Some(tag) if tag.attr(name) == Some(value) => raw.to_string(),
        Some(tag) => tag.with_attr(name, value),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_AR: &str = "\u{0645}\u{0631}\u{062D}\u{0628}\u{0627}";

    #[test]
    fn test_rtl_detection() {
        assert!(contains_rtl(HELLO_AR));
        assert!(contains_rtl("\u{FEFB}"));
        assert!(!contains_rtl("hello"));
        assert!(!contains_rtl("\u{05D0}"));
    }

    #[test]
    fn test_injects_all_attributes() {
        let doc = format!(r#"<svg><text x="10" y="20">{HELLO_AR}</text></svg>"#);
        let out = inject_bidi(&doc);
        let tags = markup::start_tags(&out);
        let text = &tags[1];
        assert_eq!(text.attr("direction"), Some("rtl"));
        assert_eq!(text.attr("unicode-bidi"), Some("embed"));
        assert_eq!(text.attr("text-anchor"), Some("end"));
        assert_eq!(text.attr("font-family"), Some(RTL_FONT_FALLBACK));
        assert!(out.contains(HELLO_AR));
    }

    #[test]
    fn test_anchor_forced_not_toggled() {
        let doc = format!(r#"<text text-anchor="start" font-family="Amiri">{HELLO_AR}</text>"#);
        let once = inject_bidi(&doc);
        let twice = inject_bidi(&once);
        assert_eq!(once, twice);
        let tag = &markup::start_tags(&twice)[0];
        assert_eq!(tag.attr("text-anchor"), Some("end"));
        assert_eq!(tag.attr("font-family"), Some("Amiri"));
    }

    #[test]
    fn test_existing_embedding_kept() {
        let doc = format!(r#"<text direction="rtl" unicode-bidi="isolate">{HELLO_AR}</text>"#);
        let out = inject_bidi(&doc);
        let tag = &markup::start_tags(&out)[0];
        assert_eq!(tag.attr("unicode-bidi"), Some("isolate"));
        assert_eq!(out.matches("direction=").count(), 1);
    }

    #[test]
    fn test_ltr_direction_corrected() {
        let doc = format!(r#"<text direction="ltr">{HELLO_AR}</text>"#);
        let out = inject_bidi(&doc);
        assert_eq!(markup::start_tags(&out)[0].attr("direction"), Some("rtl"));
    }

    #[test]
    fn test_inline_style_corrected() {
        let doc = format!(r#"<text style="text-anchor:start; direction:ltr">{HELLO_AR}</text>"#);
        let once = inject_bidi(&doc);
        let tag = &markup::start_tags(&once)[0];
        assert_eq!(tag.style_property("text-anchor"), Some("end"));
        assert_eq!(tag.style_property("direction"), Some("rtl"));
        assert_eq!(tag.attr("direction"), Some("rtl"));
        assert_eq!(tag.attr("text-anchor"), Some("end"));
        assert_eq!(inject_bidi(&once), once);
    }

    #[test]
    fn test_latin_text_untouched() {
        let doc = r#"<svg><text x="1">Hello</text><text>World</text></svg>"#;
        assert_eq!(inject_bidi(doc), doc);
    }

    #[test]
    fn test_rtl_in_tspan_counts() {
        let doc = format!(r#"<text x="1"><tspan>{HELLO_AR}</tspan></text>"#);
        let out = inject_bidi(&doc);
        assert_eq!(markup::start_tags(&out)[0].attr("text-anchor"), Some("end"));
        assert_eq!(markup::start_tags(&out)[1].attr("text-anchor"), None);
    }
}
