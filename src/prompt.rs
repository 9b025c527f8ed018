//! System Prompt - Protocol Description for the Collaborator

use crate::protocol::{GeoProtocol, OpacityTier, CONSTITUTION};
use crate::recipes::Recipe;

const PLAN_TEMPLATE: &str = r#"REQUIRED JSON PLAN FORMAT:
```json
{
  "design_contract": {
    "arabic_position": "top_right",
    "contrast_verified": "YES",
    "layout_variant": "hero",
    "opacity_tiers_used": ["0.12", "0.45", "1.0"],
    "main_rules_applied": ["1_Hierarchy", "3_Arabic_BiDi", "4_Geo_Safety"]
  }
}
```"#;

/// Build the base system instruction for one request.
pub fn system_prompt(protocol: &GeoProtocol, recipe: &Recipe, canvas_width: u32, canvas_height: u32) -> String {
    let margin = protocol.safe_zone(canvas_width as f64, canvas_height as f64).margin();
    let [bg, mid, fg] = OpacityTier::ALL.map(OpacityTier::value);
    let scale = &protocol.type_scale;

    let mut lines = vec![
        "ROLE: Vector Design Engineering Architect.".to_string(),
        format!("CANVAS: {canvas_width}x{canvas_height}"),
        String::new(),
        "--- CONSTITUTION (STRICT) ---".to_string(),
    ];
    lines.extend(CONSTITUTION.iter().map(|(id, rule)| format!("- {id}: {rule}")));
    lines.extend([
        String::new(),
        "--- GEO PROTOCOL ---".to_string(),
        format!("1. Opacity Tiers: Background={bg}, Shapes={mid}, Text={fg}. NO exceptions."),
        format!("2. Precision: All coordinates must be rounded to {} decimals.", protocol.precision),
        format!("3. Safe Zone: Keep important content {margin:.0}px inside borders."),
        "4. Bleed: Extend backgrounds past the edge using negative x/y.".to_string(),
        format!(
            "5. Typography Hierarchy: Modular Scale {} (Body={}px, Sub={}px, H2={}px, H1={}px, Display={}px).",
            scale.ratio, scale.body, scale.subheading, scale.h2, scale.h1, scale.display
        ),
        "6. Curve Fidelity: Close curved paths with Z.".to_string(),
        format!("7. Strokes: stroke-width never above {}.", protocol.max_stroke_width),
        String::new(),
        "--- ARABIC BIDI RULES ---".to_string(),
        "1. IF Arabic text detected: Add direction=\"rtl\" and unicode-bidi=\"embed\" to parent <text>.".to_string(),
        "2. Set text-anchor=\"end\" for Arabic headers (right aligned).".to_string(),
        String::new(),
        format!("--- RECIPE: {} ({}) ---", recipe.name, recipe.id),
    ]);
    match serde_json::to_string_pretty(recipe) {
        Ok(json) => lines.push(json),
        Err(_) => lines.extend(
            recipe
                .layout_rules
                .iter()
                .chain(&recipe.typography_rules)
                .map(|rule| format!("- {rule}")),
        ),
    }
    lines.extend([
        String::new(),
        "--- OUTPUT PROTOCOL ---".to_string(),
        "1. Output the JSON Plan (Strict Format) after a 'Plan:' label.".to_string(),
        "2. Output the SVG Code (Clean, Valid XML).".to_string(),
        PLAN_TEMPLATE.to_string(),
    ]);
    lines.join("\n")
}

/// Append corrective feedback from the previous attempt.
pub fn with_feedback(base: &str, reason: &str, remediation: Option<&str>) -> String {
    let mut out = format!("{base}\n\nPREVIOUS FAILURE: {reason}. COMPLY STRICTLY.");
    if let Some(hint) = remediation {
        out.push_str("\nFIX: ");
        out.push_str(hint);
    }
    out
}
