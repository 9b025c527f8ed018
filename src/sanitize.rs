//! Payload Sanitizer - Design Contract Extraction
//!
//! Collaborator replies wrap the JSON plan in prose, markdown fences,
//! line comments and trailing commas. The sanitizer digs the first
//! balanced object out of all that and parses it.

use serde_json::{Map, Value};
use thiserror::Error;

const PLAN_LABEL: &str = "plan:";
const TERMINATING_LABELS: [&str; 2] = ["svg:", "code:"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SanitizeError {
    #[error("empty payload")]
    Empty,

    #[error("no JSON object found")]
    NoObject,

    #[error("unbalanced braces in JSON object")]
    Unbalanced,

    #[error("JSON decode error: {0}")]
    Decode(String),

    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// Extract and parse the structured plan from raw collaborator text.
///
/// The text after a `Plan:` label is tried first; if it holds no balanced
/// object the whole reply is scanned instead.
pub fn sanitize_payload(raw: &str) -> Result<Map<String, Value>, SanitizeError> {
    if raw.trim().is_empty() {
        return Err(SanitizeError::Empty);
    }

    if let Some(section) = labelled_section(raw) {
        match parse_candidate(section) {
            Err(SanitizeError::NoObject | SanitizeError::Unbalanced) => {}
            other => return other,
        }
    }

    parse_candidate(raw)
}

fn parse_candidate(text: &str) -> Result<Map<String, Value>, SanitizeError> {
    let cleaned = strip_line_comments(&strip_code_fences(text));
    let object = balanced_object(&cleaned)?;
    let repaired = repair_trailing_commas(object);

    match serde_json::from_str::<Value>(&repaired) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(SanitizeError::NotAnObject),
        Err(e) => {
            tracing::debug!(error = %e, "plan payload failed to decode");
            Err(SanitizeError::Decode(e.to_string()))
        }
    }
}

/// Text following the plan label, up to a blank line or the next label.
fn labelled_section(raw: &str) -> Option<&str> {
    let lower = raw.to_ascii_lowercase();
    let start = lower.find(PLAN_LABEL)? + PLAN_LABEL.len();
    let rest = &lower[start..];
    let body_start = start + (rest.len() - rest.trim_start().len());

    let tail = &lower[body_start..];
    let end = std::iter::once(tail.find("\n\n"))
        .chain(TERMINATING_LABELS.iter().map(|label| tail.find(label)))
        .flatten()
        .min()
        .unwrap_or(tail.len());

    Some(&raw[body_start..body_start + end])
}

fn strip_code_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find("```") {
        out.push_str(&rest[..idx]);
        rest = &rest[idx + 3..];
        // Drop a language tag directly after the fence.
        let tag_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        rest = &rest[tag_len..];
    }
    out.push_str(rest);
    out
}

/// Remove `//` comments that sit outside string literals.
fn strip_line_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' || c == '\n' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Slice from the first `{` to its matching `}`, honouring string
/// boundaries and escapes.
fn balanced_object(text: &str) -> Result<&str, SanitizeError> {
    let start = text.find('{').ok_or(SanitizeError::NoObject)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    Err(SanitizeError::Unbalanced)
}

/// Drop commas that directly precede `}` or `]` outside strings.
fn repair_trailing_commas(json: &str) -> String {
    let chars: Vec<char> = json.chars().collect();
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        if c == '"' {
            in_string = true;
        }
        out.push(c);
    }
    out
}
