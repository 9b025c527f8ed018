//! ForgeVector Core - Vector Document Compiler
//!
//! # The Six Laws (Non-Negotiable)
//! 1. The Contract Comes First
//! 2. Validation Judges Raw Output
//! 3. Geometry Is Enforced, Not Requested
//! 4. RTL Text Is Always Embedded
//! 5. Retries Carry Their Reason
//! 6. The Collaborator Suggests, the Engine Enforces

pub mod protocol;
pub mod markup;
pub mod sanitize;
pub mod extract;
pub mod contract;
pub mod geometry;
pub mod bidi;
pub mod validation;
pub mod recipes;
pub mod prompt;
pub mod config;
pub mod backend;
pub mod hashing;
pub mod pipeline;

pub use protocol::{GeoProtocol, OpacityTier, SafeZoneSpec, TypeScale, PROTOCOL_ID};
pub use sanitize::{sanitize_payload, SanitizeError};
pub use extract::{extract_document, DocumentMissing};
pub use contract::{ArabicPosition, ContractError, DesignContract, LayoutVariant};
pub use geometry::GeometryEnforcer;
pub use bidi::inject_bidi;
pub use validation::{ValidationResult, ValidationRule, ValidationViolation, Validator};
pub use recipes::{Recipe, RecipeCatalog};
pub use config::{ConfigError, EngineConfig};
pub use backend::{BackendError, BackendRequest, GeminiBackend, GenerativeBackend};
pub use hashing::{canonical_json, compute_request_hash, document_hash};
pub use pipeline::{
    ErrorKind, ErrorResponse, GenerateRequest, GeneratedDocument, GenerationError, GenerationOrchestrator,
};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
