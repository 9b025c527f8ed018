//! Validation System - Fail-Fast Quality Rules
//!
//! Rules inspect the raw collaborator output before any mutation.
//! The first violated rule ends the check, so one retry surfaces one
//! violation; later rules only run once earlier ones pass.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::bidi::contains_rtl;
use crate::contract::{ContractError, DesignContract};
use crate::markup::{self, parse_length, StartTag};
use crate::protocol::GeoProtocol;

static RTL_DIRECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)direction\s*[:=]\s*["']?\s*rtl"#).expect("direction regex is valid")
});

/// Unicode RLM, RLE, RLO and RLI controls.
const RTL_MARKS: [char; 4] = ['\u{200F}', '\u{202B}', '\u{202E}', '\u{2067}'];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationViolation {
    pub rule: String,
    pub message: String,
    pub remediation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationResult {
    Ok,
    Failed(ValidationViolation),
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn violation(&self) -> Option<&ValidationViolation> {
        match self {
            Self::Ok => None,
            Self::Failed(v) => Some(v),
        }
    }
}

/// Validation rule trait - first violation wins
pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, doc: &str, protocol: &GeoProtocol) -> Result<(), ValidationViolation>;

    fn violation(&self, message: impl Into<String>, remediation: impl Into<String>) -> ValidationViolation
    where
        Self: Sized,
    {
        ValidationViolation {
            rule: self.name().to_string(),
            message: message.into(),
            remediation: remediation.into(),
        }
    }
}

// --- Concrete Rules ---

pub struct RootTagRule;

impl ValidationRule for RootTagRule {
    fn name(&self) -> &'static str { "root_tag" }

    fn check(&self, doc: &str, _protocol: &GeoProtocol) -> Result<(), ValidationViolation> {
        if markup::start_tags(doc).iter().any(|t| t.local_name() == "svg") {
            Ok(())
        } else {
            Err(self.violation("No valid SVG tag found.", "Emit a complete <svg>...</svg> document."))
        }
    }
}

pub struct BidiDirectionRule;

impl ValidationRule for BidiDirectionRule {
    fn name(&self) -> &'static str { "bidi_direction" }

    fn check(&self, doc: &str, _protocol: &GeoProtocol) -> Result<(), ValidationViolation> {
        if !contains_rtl(&markup::strip_tags(doc)) {
            return Ok(());
        }
        if RTL_DIRECTION.is_match(doc) || doc.contains(RTL_MARKS) {
            return Ok(());
        }
        Err(self.violation(
            "BiDi violation: Arabic text without RTL direction.",
            "Add direction=\"rtl\" and unicode-bidi=\"embed\" to every <text> holding Arabic.",
        ))
    }
}

pub struct StrokeWidthRule;

impl ValidationRule for StrokeWidthRule {
    fn name(&self) -> &'static str { "stroke_width" }

    fn check(&self, doc: &str, protocol: &GeoProtocol) -> Result<(), ValidationViolation> {
        for tag in markup::start_tags(doc) {
            let Some(width) = tag.presentation("stroke-width").and_then(|w| parse_length(w, 0.0)) else {
                continue;
            };
            if width > protocol.max_stroke_width {
                return Err(self.violation(
                    format!(
                        "Geo protocol violation: stroke-width {width} > {}px detected.",
                        protocol.max_stroke_width
                    ),
                    format!("Keep every stroke-width at or below {}.", protocol.max_stroke_width),
                ));
            }
        }
        Ok(())
    }
}

pub struct OpacityTierRule;

impl ValidationRule for OpacityTierRule {
    fn name(&self) -> &'static str { "opacity_tier" }

    fn check(&self, doc: &str, protocol: &GeoProtocol) -> Result<(), ValidationViolation> {
        for tag in markup::start_tags(doc) {
            for value in opacity_values(&tag) {
                let Some(opacity) = parse_length(value, 1.0) else {
                    continue;
                };
                if !protocol.is_tier_value(opacity) {
                    return Err(self.violation(
                        format!("Opacity tier violation: non-standard opacity {opacity} detected."),
                        "Use only opacity 0.12 (background), 0.45 (shapes) or 1.0 (text).",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// `opacity`, `fill-opacity` and `stroke-opacity`, as attributes or inline style.
fn opacity_values<'a>(tag: &StartTag<'a>) -> Vec<&'a str> {
    let mut values: Vec<&'a str> = tag
        .attrs()
        .iter()
        .filter(|a| a.name.to_ascii_lowercase().ends_with("opacity"))
        .map(|a| a.value)
        .collect();
    if let Some(style) = tag.attr("style") {
        values.extend(style.split(';').filter_map(|decl| {
            let (key, value) = decl.split_once(':')?;
            key.trim().to_ascii_lowercase().ends_with("opacity").then(|| value.trim())
        }));
    }
    values
}

pub struct CurveFidelityRule;

impl ValidationRule for CurveFidelityRule {
    fn name(&self) -> &'static str { "curve_fidelity" }

    fn check(&self, doc: &str, _protocol: &GeoProtocol) -> Result<(), ValidationViolation> {
        let has_curve = |d: &str| d.contains(['C', 'c', 'S', 's', 'Q', 'q', 'T', 't']);
        let has_close = |d: &str| d.contains(['Z', 'z']);

        for tag in markup::start_tags(doc) {
            if tag.local_name() != "path" {
                continue;
            }
            if let Some(d) = tag.attr("d") {
                if has_curve(d) && !has_close(d) {
                    return Err(self.violation(
                        "Curve fidelity violation: unclosed curved path detected.",
                        "Close every curved path with Z.",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Validator runs rules in order and stops at the first violation
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(RootTagRule),
                Box::new(BidiDirectionRule),
                Box::new(StrokeWidthRule),
                Box::new(OpacityTierRule),
                Box::new(CurveFidelityRule),
            ],
        }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Check the contract half of a collaborator reply.
    pub fn check_contract(&self, payload: Option<&Map<String, Value>>) -> Result<DesignContract, ContractError> {
        DesignContract::from_payload(payload.ok_or(ContractError::MissingContract)?)
    }

    /// Check the document half of a collaborator reply.
    pub fn check_document(&self, doc: &str, protocol: &GeoProtocol) -> ValidationResult {
        for rule in &self.rules {
            if let Err(violation) = rule.check(doc, protocol) {
                tracing::debug!(rule = rule.name(), message = %violation.message, "document rejected");
                return ValidationResult::Failed(violation);
            }
        }
        ValidationResult::Ok
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}
