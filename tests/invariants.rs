//! Contract Invariant Tests
//!
//! These tests verify the non-negotiable guarantees.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use proptest::prelude::*;

use forgevector_core::{
    bidi::inject_bidi,
    contract::ContractError,
    document_hash,
    geometry::{clamp_box, close_path_data, normalize_precision, ElementBox},
    markup, BackendError, BackendRequest, EngineConfig, ErrorKind, ErrorResponse, GenerateRequest,
    GenerationError, GenerationOrchestrator, GenerativeBackend, GeoProtocol, GeometryEnforcer, RecipeCatalog,
    Validator, PROTOCOL_ID,
};

const HELLO_AR: &str = "\u{0645}\u{0631}\u{062D}\u{0628}\u{0627}";

const GOOD_PLAN: &str = r#"Plan:
```json
{
  "design_contract": {
    "contrast_verified": "YES",
    "layout_variant": "hero",
    "arabic_position": "top_right",
    "opacity_tiers_used": ["0.12", "0.45", "1.0"],
    "main_rules_applied": ["1_Hierarchy", "3_Arabic_BiDi", "4_Geo_Safety"],
  }
}
```"#;

const THIN_PLAN: &str =
    r#"Plan: {"design_contract": {"contrast_verified": "yes", "main_rules_applied": ["r1", "r2"]}}"#;

#[derive(Debug, Clone)]
struct Call {
    model: String,
    system: String,
    temperature: f32,
    at: Instant,
}

/// Replays canned replies in order and records every request.
#[derive(Default)]
struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, BackendError>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedBackend {
    fn new(replies: Vec<Result<String, BackendError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl GenerativeBackend for ScriptedBackend {
    fn generate(&self, request: &BackendRequest<'_>) -> Result<String, BackendError> {
        self.calls.lock().unwrap().push(Call {
            model: request.model.to_string(),
            system: request.system_instruction.to_string(),
            temperature: request.temperature,
            at: Instant::now(),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::Transport("script exhausted".to_string())))
    }
}

fn test_config() -> EngineConfig {
    EngineConfig {
        api_key: Some("test-key".to_string()),
        retry_backoff: Duration::ZERO,
        ..EngineConfig::default()
    }
}

fn orchestrator(replies: Vec<Result<String, BackendError>>) -> GenerationOrchestrator<ScriptedBackend> {
    orchestrator_with(test_config(), replies)
}

fn orchestrator_with(
    config: EngineConfig,
    replies: Vec<Result<String, BackendError>>,
) -> GenerationOrchestrator<ScriptedBackend> {
    GenerationOrchestrator::new(
        Arc::new(config),
        Arc::new(RecipeCatalog::new()),
        ScriptedBackend::new(replies),
    )
}

fn good_svg() -> String {
    format!(
        r##"<svg viewBox="0 0 1080 1080" width="1080" height="1080"><rect x="-5" y="-5" width="1090" height="1090" fill="#101820"/><path d="M100.456,100 C150,50 200,50 250.1234,100 L100.456,100 Z" fill="#f5c542"/><text x="1000" y="120" direction="rtl">{HELLO_AR}</text></svg>"##
    )
}

fn reply(plan: &str, svg: &str) -> Result<String, BackendError> {
    Ok(format!("{plan}\n\nSVG:\n```xml\n{svg}\n```"))
}

#[test]
fn invariant_contract_requires_three_rules() {
    // Scenario A: "yes" is accepted, the rule count is what fails
    let payload = forgevector_core::sanitize_payload(THIN_PLAN).unwrap();
    let result = Validator::new().check_contract(Some(&payload));
    assert_eq!(result.unwrap_err(), ContractError::TooFewRules(2));
}

#[test]
fn invariant_missing_document_exhausts_budget() {
    // Scenario B
    let orch = orchestrator(vec![
        Ok(format!("{GOOD_PLAN}\nno markup here")),
        Ok(format!("{GOOD_PLAN}\nstill no markup")),
    ]);

    let err = orch.generate(&GenerateRequest::new("a poster")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DocumentMissing);

    let calls = orch.backend().calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].model, orch.config().primary_model);
    assert_eq!(calls[1].model, orch.config().fallback_model);
    assert!(calls[1].system.contains("PREVIOUS FAILURE: SVG Error:"));
}

#[test]
fn invariant_retry_carries_feedback_and_switches_collaborator() {
    let orch = orchestrator(vec![reply(THIN_PLAN, &good_svg()), reply(GOOD_PLAN, &good_svg())]);

    let doc = orch.generate(&GenerateRequest::new("a poster")).unwrap();
    assert_eq!(doc.attempts, 2);
    assert_eq!(doc.collaborator_used, orch.config().fallback_model);

    let calls = orch.backend().calls();
    assert_eq!(calls[0].temperature, 0.6);
    assert_eq!(calls[1].temperature, 0.4);
    assert!(!calls[0].system.contains("PREVIOUS FAILURE"));
    assert!(calls[1].system.contains("PREVIOUS FAILURE: Plan Error:"));
    assert!(calls[1].system.contains("COMPLY STRICTLY."));
    assert!(calls[1].system.contains("\nFIX: "));
}

#[test]
fn invariant_missing_credential_never_calls_out() {
    let config = EngineConfig {
        api_key: None,
        ..test_config()
    };
    let orch = orchestrator_with(config, vec![reply(GOOD_PLAN, &good_svg())]);

    let err = orch.generate(&GenerateRequest::new("a poster")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    assert!(orch.backend().calls().is_empty());
}

#[test]
fn invariant_invalid_request_never_calls_out() {
    let orch = orchestrator(vec![reply(GOOD_PLAN, &good_svg())]);

    let err = orch.generate(&GenerateRequest::new("   ")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);

    let request = GenerateRequest {
        canvas_width: 0,
        ..GenerateRequest::new("a poster")
    };
    assert_eq!(orch.generate(&request).unwrap_err().kind(), ErrorKind::InvalidRequest);
    assert!(orch.backend().calls().is_empty());
}

#[test]
fn invariant_accepted_document_is_enforced() {
    let orch = orchestrator(vec![reply(GOOD_PLAN, &good_svg())]);
    let doc = orch.generate(&GenerateRequest::new("a poster")).unwrap();

    assert_eq!(doc.attempts, 1);
    assert_eq!(doc.collaborator_used, orch.config().primary_model);
    assert_eq!(doc.protocol, PROTOCOL_ID);
    assert_eq!(doc.contract.rules_applied.len(), 3);
    assert_eq!(doc.document_hash, document_hash(&doc.document));

    let out = &doc.document;
    assert!(out.contains(r#"xmlns="http://www.w3.org/2000/svg""#));
    assert!(out.contains(r#"d="M100.46,100 C150,50 200,50 250.12,100 L100.46,100 Z""#));
    assert!(out.contains(r#"x="-23" y="-23" width="1108" height="1108""#));

    let tags = markup::start_tags(out);
    let rect = tags.iter().find(|t| t.local_name() == "rect").unwrap();
    assert_eq!(rect.attr("opacity"), Some("0.12"));
    let text = tags.iter().find(|t| t.local_name() == "text").unwrap();
    assert_eq!(text.attr("opacity"), Some("1.00"));
    assert_eq!(text.attr("unicode-bidi"), Some("embed"));
    assert_eq!(text.attr("text-anchor"), Some("end"));

    // The delivered document passes the same checks the raw one did.
    assert!(Validator::new().check_document(out, &GeoProtocol::default()).is_ok());
}

#[test]
fn invariant_request_hash_is_stable() {
    let first = orchestrator(vec![reply(GOOD_PLAN, &good_svg())])
        .generate(&GenerateRequest::new("a poster"))
        .unwrap();
    let second = orchestrator(vec![reply(GOOD_PLAN, &good_svg())])
        .generate(&GenerateRequest::new("a poster"))
        .unwrap();
    assert_eq!(first.request_hash, second.request_hash);
    assert_eq!(first.document_hash, second.document_hash);
    assert_ne!(first.id, second.id);
}

#[test]
fn invariant_quality_judged_on_raw_output() {
    let thick = r#"<svg viewBox="0 0 10 10"><line x1="0" y1="0" x2="5" y2="5" stroke="black" stroke-width="5"/></svg>"#;
    let orch = orchestrator(vec![reply(GOOD_PLAN, thick), reply(GOOD_PLAN, thick)]);

    let err = orch.generate(&GenerateRequest::new("a poster")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QualityViolation);

    let response = ErrorResponse::from(&err);
    assert_eq!(response.error_kind, ErrorKind::QualityViolation);
    assert!(response.detail.contains("stroke-width"));
    assert!(orch.backend().calls()[1].system.contains("FIX: Keep every stroke-width"));
}

#[test]
fn invariant_rtl_without_direction_rejected() {
    let svg = format!(r#"<svg viewBox="0 0 10 10"><text x="1" y="1">{HELLO_AR}</text></svg>"#);
    let orch = orchestrator(vec![reply(GOOD_PLAN, &svg), reply(GOOD_PLAN, &svg)]);

    let err = orch.generate(&GenerateRequest::new("a poster")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QualityViolation);
}

#[test]
fn invariant_empty_and_failed_calls() {
    let orch = orchestrator(vec![Ok("   ".to_string()), Ok(String::new())]);
    let err = orch.generate(&GenerateRequest::new("a poster")).unwrap_err();
    assert_eq!(err, GenerationError::PayloadMalformed("empty collaborator response".to_string()));

    let orch = orchestrator(vec![
        Err(BackendError::Status { status: 503, body: "overloaded".to_string() }),
        Err(BackendError::Transport("timed out".to_string())),
    ]);
    let err = orch.generate(&GenerateRequest::new("a poster")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    assert!(err.detail().contains("timed out"));
}

#[test]
fn invariant_budget_bounds_calls() {
    let config = EngineConfig {
        max_attempts: 3,
        ..test_config()
    };
    let orch = orchestrator_with(config, (0..5).map(|_| Ok("no plan".to_string())).collect());

    let err = orch.generate(&GenerateRequest::new("a poster")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PayloadMalformed);
    assert_eq!(orch.backend().calls().len(), 3);
}

#[test]
fn invariant_backoff_precedes_each_retry_only() {
    let backoff = Duration::from_millis(150);
    let config = EngineConfig {
        retry_backoff: backoff,
        ..test_config()
    };
    let orch = orchestrator_with(config, vec![Ok("no plan".to_string()), Ok("no plan".to_string())]);

    let err = orch.generate(&GenerateRequest::new("a poster")).unwrap_err();
    let finished = Instant::now();
    assert_eq!(err.kind(), ErrorKind::PayloadMalformed);

    let calls = orch.backend().calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].at.duration_since(calls[0].at) >= backoff);
    // Budget exhausted: no sleep after the final attempt.
    assert!(finished.duration_since(calls[1].at) < backoff);
}

#[test]
fn invariant_open_path_not_closed() {
    // Scenario C
    assert_eq!(close_path_data("M0,0 L10,0 L10,10 L0,10", 0.01), None);
}

#[test]
fn invariant_returning_path_closed_once() {
    // Scenario D
    let protocol = GeoProtocol::default();
    let enforcer = GeometryEnforcer::new(&protocol, 1080.0, 1080.0);
    let once = enforcer.enforce(r#"<svg><path d="M0,0 L10,0 L10,10 L0,0" opacity="0.45"/></svg>"#);
    assert_eq!(once, r#"<svg><path d="M0,0 L10,0 L10,10 L0,0 Z" opacity="0.45"/></svg>"#);
    assert_eq!(enforcer.enforce(&once), once);
}

#[test]
fn invariant_rtl_text_embedded() {
    // Scenario E
    let out = inject_bidi(&format!(r#"<svg><text x="10" y="20">{HELLO_AR}</text></svg>"#));
    let tags = markup::start_tags(&out);
    let text = &tags[1];
    assert_eq!(text.attr("direction"), Some("rtl"));
    assert_eq!(text.attr("unicode-bidi"), Some("embed"));
    assert_eq!(text.attr("text-anchor"), Some("end"));
    assert_eq!(inject_bidi(&out), out);
}

fn coord() -> impl Strategy<Value = f64> {
    (-50_000i64..150_000i64).prop_map(|v| v as f64 / 97.0)
}

proptest! {
    #[test]
    fn prop_precision_idempotent(a in coord(), b in coord(), c in coord()) {
        let doc = format!(r#"<svg><path d="M{a},{b} L{c},{a}" stroke-width="{c}"/></svg>"#);
        let once = normalize_precision(&doc, 2);
        prop_assert_eq!(normalize_precision(&once, 2), once);
    }

    #[test]
    fn prop_closure_idempotent(points in prop::collection::vec((0i32..500, 0i32..500), 1..8)) {
        let mut d = String::from("M0,0");
        for (x, y) in &points {
            d.push_str(&format!(" L{x},{y}"));
        }
        d.push_str(" L0,0");
        let closed = close_path_data(&d, 0.01).unwrap_or(d);
        prop_assert!(closed.ends_with('Z'));
        prop_assert_eq!(close_path_data(&closed, 0.01), None);
    }

    #[test]
    fn prop_safe_zone_contains_non_bleed(x in 0.0f64..2000.0, y in 0.0f64..2000.0, w in 0.0f64..2000.0, h in 0.0f64..2000.0) {
        let zone = GeoProtocol::default().safe_zone(1080.0, 1080.0);
        let margin = zone.margin();
        let b = clamp_box(ElementBox { x, y, width: w, height: h }, &zone, 18.0);
        prop_assert!(b.x >= margin && b.y >= margin);
        prop_assert!(b.x + b.width <= 1080.0 - margin + 1e-9);
        prop_assert!(b.y + b.height <= 1080.0 - margin + 1e-9);
        prop_assert!(b.width >= 0.0 && b.height >= 0.0);
    }

    #[test]
    fn prop_enforced_opacities_are_tiers(x in 0u32..1080, y in 0u32..1080, w in 1u32..1080, h in 1u32..1080, filled in any::<bool>()) {
        let fill = if filled { "red" } else { "none" };
        let doc = format!(
            r#"<svg><rect x="{x}" y="{y}" width="{w}" height="{h}" fill="{fill}"/><circle cx="5" cy="5" r="{w}"/><text x="1" y="1">hi</text></svg>"#
        );
        let protocol = GeoProtocol::default();
        let out = GeometryEnforcer::new(&protocol, 1080.0, 1080.0).enforce(&doc);
        for tag in markup::start_tags(&out).iter().filter(|t| t.local_name() != "svg") {
            let opacity = tag.numeric_attr("opacity");
            prop_assert!(opacity.is_some_and(|o| protocol.is_tier_value(o)));
        }
    }
}
