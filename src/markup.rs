//! Markup Tokenizer - Start Tags and Attributes
//!
//! Every pass edits documents one start tag at a time. Attribute values
//! are addressed by byte range so rewrites never disturb the rest of a tag.

use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static START_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<([A-Za-z][A-Za-z0-9:_.-]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#)
        .expect("start tag regex is valid")
});

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][A-Za-z0-9:_.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("attribute regex is valid")
});

static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex is valid"));

pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

#[derive(Debug, Clone)]
pub struct Attribute<'a> {
    pub name: &'a str,
    pub value: &'a str,
    value_range: Range<usize>,
}

/// A parsed start tag (`<rect ...>` or `<rect .../>`).
#[derive(Debug, Clone)]
pub struct StartTag<'a> {
    raw: &'a str,
    name: &'a str,
    attrs: Vec<Attribute<'a>>,
}

impl<'a> StartTag<'a> {
    pub fn parse(raw: &'a str) -> Option<Self> {
        let caps = START_TAG.captures(raw)?;
        let whole = caps.get(0)?;
        if whole.start() != 0 || whole.end() != raw.len() {
            return None;
        }
        Some(Self::from_captures(raw, &caps))
    }

    fn from_captures(raw: &'a str, caps: &Captures<'a>) -> Self {
        let name = caps.get(1).map_or("", |m| m.as_str());
        let body_start = caps.get(2).map_or(raw.len(), |m| m.start());

        let attrs = ATTRIBUTE
            .captures_iter(&raw[body_start..])
            .filter_map(|c| {
                let name = c.get(1)?;
                let value = c.get(2).or_else(|| c.get(3))?;
                Some(Attribute {
                    name: &raw[body_start + name.start()..body_start + name.end()],
                    value: &raw[body_start + value.start()..body_start + value.end()],
                    value_range: body_start + value.start()..body_start + value.end(),
                })
            })
            .collect();

        Self { raw, name, attrs }
    }

    pub fn raw(&self) -> &'a str {
        self.raw
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Tag name without namespace prefix, lowercased.
    pub fn local_name(&self) -> String {
        self.name
            .rsplit(':')
            .next()
            .unwrap_or(self.name)
            .to_ascii_lowercase()
    }

    pub fn attrs(&self) -> &[Attribute<'a>] {
        &self.attrs
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.attrs
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn numeric_attr(&self, name: &str) -> Option<f64> {
        self.attr(name)?.trim().parse::<f64>().ok()
    }

    /// Look up a declaration inside the `style` attribute.
    pub fn style_property(&self, property: &str) -> Option<&'a str> {
        self.attr("style")?.split(';').find_map(|decl| {
            let (key, value) = decl.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(property)
                .then(|| value.trim())
        })
    }

    /// Attribute value, falling back to the inline style declaration.
    pub fn presentation(&self, name: &str) -> Option<&'a str> {
        self.attr(name).or_else(|| self.style_property(name))
    }

    pub fn is_self_closing(&self) -> bool {
        self.raw[..self.raw.len() - 1].trim_end().ends_with('/')
    }

    /// Render the tag with `name` set to `value`, replacing an existing
    /// value in place or appending a new attribute before the tag end.
    pub fn with_attr(&self, name: &str, value: &str) -> String {
        if let Some(existing) = self.attrs.iter().find(|a| a.name.eq_ignore_ascii_case(name)) {
            let range = existing.value_range.clone();
            return format!("{}{}{}", &self.raw[..range.start], value, &self.raw[range.end..]);
        }

        let mut head = &self.raw[..self.raw.len() - 1];
        let mut tail = ">";
        if self.is_self_closing() {
            head = head.trim_end();
            head = &head[..head.len() - 1];
            tail = "/>";
        }
        format!("{} {}=\"{}\"{}", head.trim_end(), name, value, tail)
    }

    /// Render the tag with an existing `style` declaration for `property`
    /// set to `value`. `None` when the style does not declare it.
    pub fn with_style_property(&self, property: &str, value: &str) -> Option<String> {
        let style = self.attr("style")?;
        let mut found = false;
        let declarations: Vec<String> = style
            .split(';')
            .map(|decl| match decl.split_once(':') {
                Some((key, _)) if key.trim().eq_ignore_ascii_case(property) => {
                    found = true;
                    format!("{key}:{value}")
                }
                _ => decl.to_string(),
            })
            .collect();
        found.then(|| self.with_attr("style", &declarations.join(";")))
    }

    /// Render the tag with every attribute value passed through `map`.
    /// Returns `None` when nothing changed.
    pub fn map_values<F>(&self, mut map: F) -> Option<String>
    where
        F: FnMut(&str, &str) -> Option<String>,
    {
        let mut out = String::with_capacity(self.raw.len());
        let mut cursor = 0;
        let mut changed = false;

        for attr in &self.attrs {
            if let Some(value) = map(attr.name, attr.value) {
                out.push_str(&self.raw[cursor..attr.value_range.start]);
                out.push_str(&value);
                cursor = attr.value_range.end;
                changed = true;
            }
        }

        if !changed {
            return None;
        }
        out.push_str(&self.raw[cursor..]);
        Some(out)
    }
}

/// Parse a length in user units, resolving `%` against `reference`.
pub fn parse_length(value: &str, reference: f64) -> Option<f64> {
    let value = value.trim();
    if let Some(pct) = value.strip_suffix('%') {
        return pct.trim().parse::<f64>().ok().map(|p| p / 100.0 * reference);
    }
    value.strip_suffix("px").unwrap_or(value).trim().parse::<f64>().ok()
}

/// Format a coordinate: integers bare, everything else at two decimals.
pub fn format_coord(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}

/// Apply `edit` to every start tag in `doc`. Returning `None` keeps the tag.
pub fn rewrite_start_tags<F>(doc: &str, mut edit: F) -> String
where
    F: FnMut(&StartTag<'_>) -> Option<String>,
{
    START_TAG
        .replace_all(doc, |caps: &Captures<'_>| {
            let raw = caps.get(0).map_or("", |m| m.as_str());
            match StartTag::parse(raw) {
                Some(tag) => edit(&tag).unwrap_or_else(|| raw.to_string()),
                None => raw.to_string(),
            }
        })
        .into_owned()
}

/// Collect every start tag in `doc`.
pub fn start_tags(doc: &str) -> Vec<StartTag<'_>> {
    START_TAG
        .find_iter(doc)
        .filter_map(|m| StartTag::parse(m.as_str()))
        .collect()
}

/// Flatten markup to its character data.
pub fn strip_tags(doc: &str) -> String {
    ANY_TAG.replace_all(doc, "").into_owned()
}

/// Add the SVG namespace to the root tag when it carries none.
pub fn ensure_namespace(doc: &str) -> String {
    let mut done = false;
    rewrite_start_tags(doc, |tag| {
        if done || tag.local_name() != "svg" {
            return None;
        }
        done = true;
        if tag.has_attr("xmlns") {
            return None;
        }
        Some(tag.with_attr("xmlns", SVG_NAMESPACE))
    })
}
