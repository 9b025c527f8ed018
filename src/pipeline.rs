//! Generation Pipeline - Single Entry Point
//!
//! CRITICAL: a document is validated before it is enforced, and nothing
//! unvalidated is ever returned. Each request runs its own state machine
//! over a bounded number of attempts.

use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::backend::{BackendRequest, GenerativeBackend};
use crate::bidi::inject_bidi;
use crate::config::EngineConfig;
use crate::contract::DesignContract;
use crate::extract::extract_document;
use crate::geometry::GeometryEnforcer;
use crate::hashing::{compute_request_hash, document_hash};
use crate::markup::ensure_namespace;
use crate::prompt::{system_prompt, with_feedback};
use crate::protocol::PROTOCOL_ID;
use crate::recipes::{RecipeCatalog, DEFAULT_CATEGORY};
use crate::sanitize::sanitize_payload;
use crate::validation::{ValidationResult, Validator};
use crate::ENGINE_VERSION;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    PayloadMalformed,
    ContractViolation,
    DocumentMissing,
    QualityViolation,
    BackendUnavailable,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Plan Error: {0}")]
    PayloadMalformed(String),

    #[error("Plan Error: {0}")]
    ContractViolation(String),

    #[error("SVG Error: {0}")]
    DocumentMissing(String),

    #[error("SVG Quality Error: {0}")]
    QualityViolation(String),

    #[error("AI Backend Unavailable: {0}")]
    BackendUnavailable(String),
}

impl GenerationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::PayloadMalformed(_) => ErrorKind::PayloadMalformed,
            Self::ContractViolation(_) => ErrorKind::ContractViolation,
            Self::DocumentMissing(_) => ErrorKind::DocumentMissing,
            Self::QualityViolation(_) => ErrorKind::QualityViolation,
            Self::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::InvalidRequest(d)
            | Self::PayloadMalformed(d)
            | Self::ContractViolation(d)
            | Self::DocumentMissing(d)
            | Self::QualityViolation(d)
            | Self::BackendUnavailable(d) => d,
        }
    }
}

/// The one structured error a failed request produces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error_kind: ErrorKind,
    pub detail: String,
}

impl From<&GenerationError> for ErrorResponse {
    fn from(error: &GenerationError) -> Self {
        Self {
            error_kind: error.kind(),
            detail: error.detail().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub instruction: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_canvas")]
    pub canvas_width: u32,
    #[serde(default = "default_canvas")]
    pub canvas_height: u32,
}

fn default_category() -> String { DEFAULT_CATEGORY.to_string() }
fn default_canvas() -> u32 { 1080 }

impl GenerateRequest {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            category: default_category(),
            canvas_width: default_canvas(),
            canvas_height: default_canvas(),
        }
    }

    fn check(&self) -> Result<(), GenerationError> {
        if self.instruction.trim().is_empty() {
            return Err(GenerationError::InvalidRequest("No message provided".into()));
        }
        if self.canvas_width == 0 || self.canvas_height == 0 {
            return Err(GenerationError::InvalidRequest("Canvas dimensions must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedDocument {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub document: String,
    pub contract: DesignContract,
    pub collaborator_used: String,
    pub attempts: u32,
    pub document_hash: String,
    pub request_hash: String,
    pub protocol: String,
}

/// A failure plus the hint fed back to the next attempt.
#[derive(Debug, Clone)]
pub struct Failure {
    pub error: GenerationError,
    pub remediation: Option<String>,
}

impl Failure {
    fn new(error: GenerationError, remediation: Option<&str>) -> Self {
        Self {
            error,
            remediation: remediation.map(str::to_string),
        }
    }
}

/// States of one request. `Done` and `Failed` are terminal.
#[derive(Debug)]
pub enum AttemptState {
    Idle,
    Requesting { attempt: u32, feedback: Option<Failure> },
    Sanitizing { attempt: u32, model: String, raw: String },
    Validating { attempt: u32, model: String, payload: Map<String, Value>, document: String },
    Enforcing { attempt: u32, model: String, contract: DesignContract, document: String },
    Retrying { attempt: u32, failure: Failure },
    Done(Box<GeneratedDocument>),
    Failed(GenerationError),
}

impl AttemptState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requesting { .. } => "requesting",
            Self::Sanitizing { .. } => "sanitizing",
            Self::Validating { .. } => "validating",
            Self::Enforcing { .. } => "enforcing",
            Self::Retrying { .. } => "retrying",
            Self::Done(_) => "done",
            Self::Failed(_) => "failed",
        }
    }
}

/// Per-request values every state can read.
struct RequestContext<'r> {
    request: &'r GenerateRequest,
    base_prompt: String,
    request_hash: String,
}

/// The generation pipeline - drives the collaborator until a compliant
/// document comes back or the attempt budget runs out.
pub struct GenerationOrchestrator<B: GenerativeBackend> {
    config: Arc<EngineConfig>,
    catalog: Arc<RecipeCatalog>,
    backend: B,
    validator: Validator,
}

impl<B: GenerativeBackend> GenerationOrchestrator<B> {
    pub fn new(config: Arc<EngineConfig>, catalog: Arc<RecipeCatalog>, backend: B) -> Self {
        Self {
            config,
            catalog,
            backend,
            validator: Validator::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Generate a compliant document.
    ///
    /// This ALWAYS validates the raw collaborator output before enforcing it.
    pub fn generate(&self, request: &GenerateRequest) -> Result<GeneratedDocument, GenerationError> {
        request.check()?;

        if !self.config.has_credentials() {
            tracing::error!("collaborator credential missing, refusing request");
            return Err(GenerationError::BackendUnavailable("credential not configured".into()));
        }

        let recipe = self.catalog.get(&request.category);
        let ctx = RequestContext {
            request,
            base_prompt: system_prompt(&self.config.protocol, recipe, request.canvas_width, request.canvas_height),
            request_hash: compute_request_hash(&request.category, request, ENGINE_VERSION)
                .map_err(|e| GenerationError::InvalidRequest(e.to_string()))?,
        };

        let mut state = AttemptState::Idle;
        loop {
            tracing::debug!(state = state.name(), "generation state");
            state = match state {
                AttemptState::Done(document) => return Ok(*document),
                AttemptState::Failed(error) => return Err(error),
                other => self.step(&ctx, other),
            };
        }
    }

    fn step(&self, ctx: &RequestContext<'_>, state: AttemptState) -> AttemptState {
        match state {
            AttemptState::Idle => AttemptState::Requesting { attempt: 1, feedback: None },
            AttemptState::Requesting { attempt, feedback } => self.request(ctx, attempt, feedback),
            AttemptState::Sanitizing { attempt, model, raw } => Self::sanitize(attempt, model, &raw),
            AttemptState::Validating { attempt, model, payload, document } => {
                self.validate(attempt, model, &payload, document)
            }
            AttemptState::Enforcing { attempt, model, contract, document } => {
                AttemptState::Done(Box::new(self.enforce(ctx, attempt, model, contract, &document)))
            }
            AttemptState::Retrying { attempt, failure } => self.retry(attempt, failure),
            terminal @ (AttemptState::Done(_) | AttemptState::Failed(_)) => terminal,
        }
    }

    fn request(&self, ctx: &RequestContext<'_>, attempt: u32, feedback: Option<Failure>) -> AttemptState {
        let model = self.config.model_for_attempt(attempt).to_string();
        let system_instruction = match &feedback {
            Some(f) => with_feedback(&ctx.base_prompt, &f.error.to_string(), f.remediation.as_deref()),
            None => ctx.base_prompt.clone(),
        };

        tracing::info!(attempt, model = %model, category = %ctx.request.category, "requesting document");
        let result = self.backend.generate(&BackendRequest {
            model: &model,
            system_instruction: &system_instruction,
            instruction: &ctx.request.instruction,
            temperature: self.config.temperature_for_attempt(attempt),
        });

        match result {
            Ok(raw) => AttemptState::Sanitizing { attempt, model, raw },
            Err(e) => AttemptState::Retrying {
                attempt,
                failure: Failure::new(GenerationError::BackendUnavailable(e.to_string()), None),
            },
        }
    }

    fn sanitize(attempt: u32, model: String, raw: &str) -> AttemptState {
        let fail = |error, hint| AttemptState::Retrying { attempt, failure: Failure::new(error, Some(hint)) };

        if raw.trim().is_empty() {
            return fail(
                GenerationError::PayloadMalformed("empty collaborator response".into()),
                "Reply with the JSON plan followed by the SVG.",
            );
        }
        let payload = match sanitize_payload(raw) {
            Ok(payload) => payload,
            Err(e) => {
                return fail(
                    GenerationError::PayloadMalformed(e.to_string()),
                    "Emit the plan after 'Plan:' as one valid JSON object.",
                )
            }
        };
        let document = match extract_document(raw) {
            Ok(document) => document,
            Err(e) => {
                return fail(
                    GenerationError::DocumentMissing(e.to_string()),
                    "Emit a complete <svg>...</svg> document after the plan.",
                )
            }
        };

        AttemptState::Validating { attempt, model, payload, document }
    }

    fn validate(&self, attempt: u32, model: String, payload: &Map<String, Value>, document: String) -> AttemptState {
        let contract = match self.validator.check_contract(Some(payload)) {
            Ok(contract) => contract,
            Err(e) => {
                return AttemptState::Retrying {
                    attempt,
                    failure: Failure::new(GenerationError::ContractViolation(e.to_string()), Some(e.remediation())),
                }
            }
        };

        match self.validator.check_document(&document, &self.config.protocol) {
            ValidationResult::Ok => AttemptState::Enforcing { attempt, model, contract, document },
            ValidationResult::Failed(v) => AttemptState::Retrying {
                attempt,
                failure: Failure::new(GenerationError::QualityViolation(v.message), Some(&v.remediation)),
            },
        }
    }

    fn enforce(
        &self,
        ctx: &RequestContext<'_>,
        attempt: u32,
        model: String,
        contract: DesignContract,
        document: &str,
    ) -> GeneratedDocument {
        let request = ctx.request;
        let enforcer = GeometryEnforcer::new(
            &self.config.protocol,
            request.canvas_width as f64,
            request.canvas_height as f64,
        );

        // Geometry first: BiDi attributes must not be re-rounded.
        let document = enforcer.enforce(document);
        let document = inject_bidi(&document);
        let document = ensure_namespace(&document);

        tracing::info!(attempt, model = %model, bytes = document.len(), "document accepted");
        GeneratedDocument {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            document_hash: document_hash(&document),
            document,
            contract,
            collaborator_used: model,
            attempts: attempt,
            request_hash: ctx.request_hash.clone(),
            protocol: PROTOCOL_ID.to_string(),
        }
    }

    fn retry(&self, attempt: u32, failure: Failure) -> AttemptState {
        tracing::warn!(
            attempt,
            kind = ?failure.error.kind(),
            reason = %failure.error,
            "attempt failed"
        );

        if attempt >= self.config.max_attempts {
            tracing::error!(attempts = attempt, reason = %failure.error, "attempt budget exhausted");
            return AttemptState::Failed(failure.error);
        }

        if !self.config.retry_backoff.is_zero() {
            thread::sleep(self.config.retry_backoff);
        }
        AttemptState::Requesting { attempt: attempt + 1, feedback: Some(failure) }
    }
}
