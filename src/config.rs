//! Engine Configuration
//!
//! Built once at process start and passed by reference. No module holds
//! a client or credential of its own.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::GeoProtocol;

pub const API_KEY_VAR: &str = "GOOGLE_API_KEY";
pub const PRIMARY_MODEL_VAR: &str = "FORGEVECTOR_PRIMARY_MODEL";
pub const FALLBACK_MODEL_VAR: &str = "FORGEVECTOR_FALLBACK_MODEL";
pub const MAX_ATTEMPTS_VAR: &str = "FORGEVECTOR_MAX_ATTEMPTS";
pub const TIMEOUT_VAR: &str = "FORGEVECTOR_TIMEOUT_SECS";
pub const BACKOFF_VAR: &str = "FORGEVECTOR_BACKOFF_MS";
pub const API_BASE_VAR: &str = "FORGEVECTOR_API_BASE";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{0} must be at least 1")]
    ZeroAttempts(&'static str),
}

#[derive(Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub primary_model: String,
    pub fallback_model: String,
    pub max_attempts: u32,
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub retry_backoff: Duration,
    pub initial_temperature: f32,
    pub retry_temperature: f32,
    #[serde(default)]
    pub protocol: GeoProtocol,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("primary_model", &self.primary_model)
            .field("fallback_model", &self.fallback_model)
            .field("max_attempts", &self.max_attempts)
            .field("request_timeout", &self.request_timeout)
            .field("retry_backoff", &self.retry_backoff)
            .finish_non_exhaustive()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: "https://generativelanguage.googleapis.com".to_string(),
            primary_model: "gemini-2.0-pro-exp-02-05".to_string(),
            fallback_model: "gemini-2.0-flash".to_string(),
            max_attempts: 2,
            request_timeout: Duration::from_secs(60),
            retry_backoff: Duration::from_secs(1),
            initial_temperature: 0.6,
            retry_temperature: 0.4,
            protocol: GeoProtocol::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let present = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        config.api_key = present(API_KEY_VAR);
        if let Some(base) = present(API_BASE_VAR) {
            config.api_base_url = base.trim_end_matches('/').to_string();
        }
        if let Some(model) = present(PRIMARY_MODEL_VAR) {
            config.primary_model = model;
        }
        if let Some(model) = present(FALLBACK_MODEL_VAR) {
            config.fallback_model = model;
        }
        if let Some(value) = present(MAX_ATTEMPTS_VAR) {
            config.max_attempts = u32::try_from(parse_number(MAX_ATTEMPTS_VAR, &value)?).map_err(|_| {
                ConfigError::InvalidNumber {
                    var: MAX_ATTEMPTS_VAR,
                    value: value.clone(),
                }
            })?;
            if config.max_attempts == 0 {
                return Err(ConfigError::ZeroAttempts(MAX_ATTEMPTS_VAR));
            }
        }
        if let Some(value) = present(TIMEOUT_VAR) {
            config.request_timeout = Duration::from_secs(parse_number(TIMEOUT_VAR, &value)?);
        }
        if let Some(value) = present(BACKOFF_VAR) {
            config.retry_backoff = Duration::from_millis(parse_number(BACKOFF_VAR, &value)?);
        }
        Ok(config)
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    /// Model for a 1-based attempt number.
    pub fn model_for_attempt(&self, attempt: u32) -> &str {
        if attempt <= 1 { &self.primary_model } else { &self.fallback_model }
    }

    /// Creativity for a 1-based attempt number; retries bias toward compliance.
    pub fn temperature_for_attempt(&self, attempt: u32) -> f32 {
        if attempt <= 1 { self.initial_temperature } else { self.retry_temperature }
    }
}

fn parse_number(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: value.to_string(),
    })
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert!(!config.has_credentials());
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.model_for_attempt(1), "gemini-2.0-pro-exp-02-05");
        assert_eq!(config.model_for_attempt(2), "gemini-2.0-flash");
        assert_eq!(config.temperature_for_attempt(2), 0.4);
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            (API_KEY_VAR, "secret"),
            (MAX_ATTEMPTS_VAR, "3"),
            (BACKOFF_VAR, "0"),
            (API_BASE_VAR, "http://localhost:9000/"),
        ]))
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_backoff, Duration::ZERO);
        assert_eq!(config.api_base_url, "http://localhost:9000");
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn test_blank_key_is_absent() {
        let config = EngineConfig::from_lookup(lookup(&[(API_KEY_VAR, "  ")])).unwrap();
        assert!(!config.has_credentials());
    }

    #[test]
    fn test_bad_numbers_rejected() {
        let err = EngineConfig::from_lookup(lookup(&[(TIMEOUT_VAR, "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { var: TIMEOUT_VAR, .. }));
        let err = EngineConfig::from_lookup(lookup(&[(MAX_ATTEMPTS_VAR, "0")])).unwrap_err();
        assert_eq!(err, ConfigError::ZeroAttempts(MAX_ATTEMPTS_VAR));
    }

    #[test]
    fn test_attempts_out_of_range_rejected() {
        for value in ["4294967296", "4294967297"] {
            let err = EngineConfig::from_lookup(lookup(&[(MAX_ATTEMPTS_VAR, value)])).unwrap_err();
            assert_eq!(
                err,
                ConfigError::InvalidNumber { var: MAX_ATTEMPTS_VAR, value: value.to_string() }
            );
        }
    }
}
