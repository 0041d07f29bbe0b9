//! Configuration for the analysis orchestrator
//!
//! All execution policy lives here: retry budget and backoff, per-type step
//! timeouts, per-type cache TTLs, and the comprehensive-call backstop
//! deadline. Every value has a sensible default, can be overridden via the
//! builder methods or `CODESCOPE_*` environment variables, and can be
//! overridden again per call through the recognized request options
//! (`timeout_ms`, `ttl_ms`, `max_attempts`, `bypass_cache`).
//!
//! # Environment Variables
//!
//! - `CODESCOPE_MAX_ATTEMPTS`: attempts per analysis - default: "2"
//! - `CODESCOPE_STEP_TIMEOUT_SECS`: per-type step timeout - default: "300"
//! - `CODESCOPE_COMPREHENSIVE_TIMEOUT_SECS`: fan-out backstop - default: "900"
//! - `CODESCOPE_DEFAULT_TTL_SECS`: cache TTL for most types - default: "1800"
//! - `CODESCOPE_TECH_STACK_TTL_SECS`: TTL for tech-stack - default: "600"
//! - `CODESCOPE_BACKOFF_BASE_MS`: first retry delay - default: "500"
//! - `CODESCOPE_BACKOFF_CAP_MS`: maximum retry delay - default: "5000"

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::analysis::types::AnalysisType;

const DEFAULT_MAX_ATTEMPTS: u32 = 2;
const DEFAULT_STEP_TIMEOUT_SECS: u64 = 300;
const DEFAULT_COMPREHENSIVE_TIMEOUT_SECS: u64 = 900;
const DEFAULT_TTL_SECS: u64 = 1_800;
const DEFAULT_TECH_STACK_TTL_SECS: u64 = 600;
const DEFAULT_BACKOFF_BASE_MS: u64 = 500;
const DEFAULT_BACKOFF_FACTOR: u32 = 2;
const DEFAULT_BACKOFF_CAP_MS: u64 = 5_000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of its valid range
    #[error("invalid configuration: {0}")]
    InvalidValue(String),

    /// Failed to parse a configuration value
    #[error("failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

/// Retry budget and exponential backoff schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per analysis, including the first.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_factor: u32,
    pub backoff_cap: Duration,
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based):
    /// `base * factor^(attempt-1)`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let factor = (self.backoff_factor as u64).saturating_pow(exponent);
        let delay = self
            .backoff_base
            .saturating_mul(factor.min(u32::MAX as u64) as u32);
        delay.min(self.backoff_cap)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            backoff_cap: Duration::from_millis(DEFAULT_BACKOFF_CAP_MS),
        }
    }
}

/// Execution policy for one orchestrator instance.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub retry: RetryPolicy,

    /// External timeout applied to each step call.
    pub step_timeout: Duration,

    /// Backstop deadline for a comprehensive fan-out call.
    pub comprehensive_timeout: Duration,

    /// Cache TTL for types without an override.
    pub default_ttl: Duration,

    /// Per-type TTL overrides (cheap detections expire sooner).
    pub ttl_overrides: HashMap<AnalysisType, Duration>,

    /// Per-type step-timeout overrides.
    pub timeout_overrides: HashMap<AnalysisType, Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let mut ttl_overrides = HashMap::new();
        ttl_overrides.insert(
            AnalysisType::TechStack,
            Duration::from_secs(DEFAULT_TECH_STACK_TTL_SECS),
        );
        Self {
            retry: RetryPolicy::default(),
            step_timeout: Duration::from_secs(DEFAULT_STEP_TIMEOUT_SECS),
            comprehensive_timeout: Duration::from_secs(DEFAULT_COMPREHENSIVE_TIMEOUT_SECS),
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            ttl_overrides,
            timeout_overrides: HashMap::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Loads configuration from `CODESCOPE_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = read_env_u64("CODESCOPE_MAX_ATTEMPTS")? {
            config.retry.max_attempts = value as u32;
        }
        if let Some(value) = read_env_u64("CODESCOPE_STEP_TIMEOUT_SECS")? {
            config.step_timeout = Duration::from_secs(value);
        }
        if let Some(value) = read_env_u64("CODESCOPE_COMPREHENSIVE_TIMEOUT_SECS")? {
            config.comprehensive_timeout = Duration::from_secs(value);
        }
        if let Some(value) = read_env_u64("CODESCOPE_DEFAULT_TTL_SECS")? {
            config.default_ttl = Duration::from_secs(value);
        }
        if let Some(value) = read_env_u64("CODESCOPE_TECH_STACK_TTL_SECS")? {
            config
                .ttl_overrides
                .insert(AnalysisType::TechStack, Duration::from_secs(value));
        }
        if let Some(value) = read_env_u64("CODESCOPE_BACKOFF_BASE_MS")? {
            config.retry.backoff_base = Duration::from_millis(value);
        }
        if let Some(value) = read_env_u64("CODESCOPE_BACKOFF_CAP_MS")? {
            config.retry.backoff_cap = Duration::from_millis(value);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn ttl_for(&self, analysis_type: AnalysisType) -> Duration {
        self.ttl_overrides
            .get(&analysis_type)
            .copied()
            .unwrap_or(self.default_ttl)
    }

    pub fn timeout_for(&self, analysis_type: AnalysisType) -> Duration {
        self.timeout_overrides
            .get(&analysis_type)
            .copied()
            .unwrap_or(self.step_timeout)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry.max_attempts = max_attempts;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn with_ttl(mut self, analysis_type: AnalysisType, ttl: Duration) -> Self {
        self.ttl_overrides.insert(analysis_type, ttl);
        self
    }

    pub fn with_timeout(mut self, analysis_type: AnalysisType, timeout: Duration) -> Self {
        self.timeout_overrides.insert(analysis_type, timeout);
        self
    }

    pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.retry.backoff_base = base;
        self.retry.backoff_cap = cap;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.backoff_factor == 0 {
            return Err(ConfigError::InvalidValue(
                "backoff_factor must be at least 1".to_string(),
            ));
        }
        if self.step_timeout.is_zero() || self.comprehensive_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn read_env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(None),
        Ok(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::ParseError {
                field: name.to_string(),
                error: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use yare::parameterized;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.step_timeout, Duration::from_secs(300));
        assert_eq!(config.comprehensive_timeout, Duration::from_secs(900));
        assert!(config.validate().is_ok());
    }

    #[parameterized(
        project = { AnalysisType::Project, 1_800 },
        code_quality = { AnalysisType::CodeQuality, 1_800 },
        security = { AnalysisType::Security, 1_800 },
        performance = { AnalysisType::Performance, 1_800 },
        architecture = { AnalysisType::Architecture, 1_800 },
        tech_stack = { AnalysisType::TechStack, 600 },
    )]
    fn test_default_ttl_per_type(analysis_type: AnalysisType, expected_secs: u64) {
        let config = OrchestratorConfig::default();
        assert_eq!(
            config.ttl_for(analysis_type),
            Duration::from_secs(expected_secs)
        );
    }

    #[test]
    fn test_per_type_overrides() {
        let config = OrchestratorConfig::default()
            .with_ttl(AnalysisType::Security, Duration::from_secs(60))
            .with_timeout(AnalysisType::Security, Duration::from_secs(30));
        assert_eq!(
            config.ttl_for(AnalysisType::Security),
            Duration::from_secs(60)
        );
        assert_eq!(
            config.timeout_for(AnalysisType::Security),
            Duration::from_secs(30)
        );
        assert_eq!(
            config.timeout_for(AnalysisType::Project),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(4_000));
        // Capped from here on.
        assert_eq!(policy.delay_for(5), Duration::from_millis(5_000));
        assert_eq!(policy.delay_for(12), Duration::from_millis(5_000));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = OrchestratorConfig::default().with_max_attempts(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        env::set_var("CODESCOPE_MAX_ATTEMPTS", "5");
        env::set_var("CODESCOPE_STEP_TIMEOUT_SECS", "42");
        let config = OrchestratorConfig::from_env().unwrap();
        env::remove_var("CODESCOPE_MAX_ATTEMPTS");
        env::remove_var("CODESCOPE_STEP_TIMEOUT_SECS");

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.step_timeout, Duration::from_secs(42));
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_garbage() {
        env::set_var("CODESCOPE_MAX_ATTEMPTS", "many");
        let result = OrchestratorConfig::from_env();
        env::remove_var("CODESCOPE_MAX_ATTEMPTS");

        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }
}
