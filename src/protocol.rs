//! Geo Protocol - Fixed Numeric Rules
//!
//! One value holds every constant the enforcer and validator agree on.
//! Nothing in here is mutable at runtime.

use serde::{Deserialize, Serialize};

/// Opacity tiers. Every drawable element ends up in exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpacityTier {
    Background,
    Midground,
    Foreground,
}

impl OpacityTier {
    pub const ALL: [OpacityTier; 3] = [
        OpacityTier::Background,
        OpacityTier::Midground,
        OpacityTier::Foreground,
    ];

    pub fn value(self) -> f64 {
        match self {
            Self::Background => 0.12,
            Self::Midground => 0.45,
            Self::Foreground => 1.0,
        }
    }

    /// Find the tier a value belongs to, if any.
    pub fn classify(value: f64, tolerance: f64) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|tier| (tier.value() - value).abs() <= tolerance)
    }
}

/// Typography sizes on a modular scale of 1.25.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeScale {
    pub ratio: f64,
    pub body: u32,
    pub subheading: u32,
    pub h2: u32,
    pub h1: u32,
    pub display: u32,
}

impl Default for TypeScale {
    fn default() -> Self {
        Self {
            ratio: 1.25,
            body: 16,
            subheading: 20,
            h2: 25,
            h1: 31,
            display: 39,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoProtocol {
    pub precision: usize,
    pub opacity_tolerance: f64,
    pub safe_margin_fraction: f64,
    /// Canvas units; roughly 3mm at 150 DPI.
    pub bleed: f64,
    pub max_stroke_width: f64,
    pub closure_epsilon: f64,
    pub background_area_fraction: f64,
    pub type_scale: TypeScale,
}

impl Default for GeoProtocol {
    fn default() -> Self {
        Self {
            precision: 2,
            opacity_tolerance: 1e-3,
            safe_margin_fraction: 0.05,
            bleed: 18.0,
            max_stroke_width: 2.0,
            closure_epsilon: 0.01,
            background_area_fraction: 0.25,
            type_scale: TypeScale::default(),
        }
    }
}

impl GeoProtocol {
    pub fn safe_zone(&self, canvas_width: f64, canvas_height: f64) -> SafeZoneSpec {
        SafeZoneSpec {
            margin_fraction: self.safe_margin_fraction,
            canvas_width,
            canvas_height,
        }
    }

    pub fn is_tier_value(&self, value: f64) -> bool {
        OpacityTier::classify(value, self.opacity_tolerance).is_some()
    }
}

/// Inset region of the canvas where primary content must stay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafeZoneSpec {
    pub margin_fraction: f64,
    pub canvas_width: f64,
    pub canvas_height: f64,
}

impl SafeZoneSpec {
    pub fn margin(&self) -> f64 {
        self.margin_fraction * self.canvas_width.min(self.canvas_height)
    }
}

/// Rule identifiers the collaborator must cite in its design contract.
pub const CONSTITUTION: [(&str, &str); 5] = [
    ("1_Hierarchy", "Headlines MUST be 3x body size using Modular Scale 1.25."),
    ("2_Contrast", "Strict Opacity Tiers: BG=0.12, Shape=0.45, Text=1.0."),
    ("3_Arabic_BiDi", "FORCE 'direction: rtl' on Arabic text. text-anchor=end for Arabic headers."),
    ("4_Geo_Safety", "Keep content within Safe Zone (5% margin). Round coordinates to 2 decimals."),
    ("5_Brand", "Brand Name is SACRED. Exact spelling match required."),
];

pub const PROTOCOL_ID: &str = "geo-bidi-v16";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_classification() {
        assert_eq!(OpacityTier::classify(0.12, 1e-3), Some(OpacityTier::Background));
        assert_eq!(OpacityTier::classify(0.4505, 1e-3), Some(OpacityTier::Midground));
        assert_eq!(OpacityTier::classify(1.0, 1e-3), Some(OpacityTier::Foreground));
        assert_eq!(OpacityTier::classify(0.5, 1e-3), None);
    }

    #[test]
    fn test_margin_uses_short_side() {
        let zone = GeoProtocol::default().safe_zone(1920.0, 1080.0);
        assert!((zone.margin() - 54.0).abs() < 1e-9);
    }
}
