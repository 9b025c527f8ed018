//! Design Contract - Validated Plan Metadata
//!
//! The collaborator asserts which rules its document honours. That claim
//! is parsed once into a typed value; every field check lives here.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const MIN_RULES_APPLIED: usize = 3;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LayoutVariant {
    Hero,
    Split,
    Centered,
    Grid,
    Minimal,
    #[default]
    Unspecified,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArabicPosition {
    TopRight,
    TopLeft,
    TopCenter,
    Center,
    BottomRight,
    BottomLeft,
    BottomCenter,
    #[serde(rename = "none")]
    Absent,
    #[default]
    Unspecified,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesignContract {
    pub contrast_verified: bool,
    pub rules_applied: Vec<String>,
    pub layout_variant: LayoutVariant,
    pub arabic_position: ArabicPosition,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub opacity_tiers_used: Vec<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContractError {
    #[error("Missing 'design_contract'.")]
    MissingContract,

    #[error("Contrast verification failed (must be 'YES').")]
    ContrastNotVerified,

    #[error("Constitution violation: must cite at least 3 rules (found {0}).")]
    TooFewRules(usize),

    #[error("Constitution violation: 'main_rules_applied' must be a list.")]
    RulesNotAList,
}

impl ContractError {
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::MissingContract => "Emit the JSON plan with a top-level \"design_contract\" object.",
            Self::ContrastNotVerified => "Verify contrast and set \"contrast_verified\": \"YES\".",
            Self::TooFewRules(_) | Self::RulesNotAList => {
                "List at least three constitution rule ids in \"main_rules_applied\"."
            }
        }
    }
}

impl DesignContract {
    /// Parse the nested `design_contract` object, failing on the first
    /// violated requirement.
    pub fn from_payload(payload: &Map<String, Value>) -> Result<Self, ContractError> {
        let contract = payload
            .get("design_contract")
            .and_then(Value::as_object)
            .ok_or(ContractError::MissingContract)?;

        if !contrast_verified(contract.get("contrast_verified")) {
            return Err(ContractError::ContrastNotVerified);
        }

        let rules = match contract
            .get("main_rules_applied")
            .or_else(|| contract.get("rules_applied"))
        {
            Some(Value::Array(items)) => items.iter().map(stringify).collect::<Vec<_>>(),
            Some(_) => return Err(ContractError::RulesNotAList),
            None => Vec::new(),
        };
        if rules.len() < MIN_RULES_APPLIED {
            return Err(ContractError::TooFewRules(rules.len()));
        }

        Ok(Self {
            contrast_verified: true,
            rules_applied: rules,
            layout_variant: enum_field(contract, "layout_variant"),
            arabic_position: enum_field(contract, "arabic_position"),
            opacity_tiers_used: contract
                .get("opacity_tiers_used")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(stringify).collect())
                .unwrap_or_default(),
        })
    }
}

fn contrast_verified(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("yes"),
        Some(Value::Bool(b)) => *b,
        _ => false,
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn enum_field<T>(contract: &Map<String, Value>, key: &str) -> T
where
    T: Default + for<'de> Deserialize<'de>,
{
    match contract.get(key) {
        Some(Value::String(s)) => {
            let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
            serde_json::from_value(Value::String(normalized)).unwrap_or_default()
        }
        _ => T::default(),
    }
}
