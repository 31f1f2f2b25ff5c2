use std::env;
use std::str::FromStr;
use tokio::time::Duration;

use thiserror::Error;

use crate::substitute::SubstitutionPolicy;
use crate::utils::parse_duration_string;

/// Configuration errors raised while loading or validating a test run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Field '{field}': {message}")]
    InvalidField { field: &'static str, message: String },

    #[error("Environment variable '{name}': {message}")]
    InvalidEnvironment { name: &'static str, message: String },
}

/// Main configuration for a load test run.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Target request rate in requests per second. Zero disables pacing
    /// entirely and issues requests as fast as concurrency allows.
    pub target_rps: f64,
    /// Total wall-clock duration of the run.
    pub duration: Duration,
    /// Timeout applied to each individual request.
    pub per_request_timeout: Duration,
    /// Upper bound on concurrently in-flight requests.
    pub max_concurrency: usize,
    /// How unresolved template placeholders are handled.
    pub substitution: SubstitutionPolicy,
    /// How long a stopping run waits for in-flight requests before
    /// cancelling them.
    pub shutdown_grace: Duration,
}

impl Default for TestConfig {
    fn default() -> Self {
        TestConfig {
            target_rps: 10.0,
            duration: Duration::from_secs(30),
            per_request_timeout: Duration::from_secs(10),
            max_concurrency: 32,
            substitution: SubstitutionPolicy::default(),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl TestConfig {
    /// Loads configuration from environment variables, falling back to
    /// defaults for anything unset.
    ///
    /// # Returns
    ///
    /// * `Ok(TestConfig)` - Validated configuration
    /// * `Err(ConfigError)` - An environment variable failed to parse or a
    ///   field failed validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let target_rps: f64 = match env::var("TARGET_RPS") {
            Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidEnvironment {
                name: "TARGET_RPS",
                message: format!("'{}' is not a valid number", raw),
            })?,
            Err(_) => 10.0,
        };

        let duration = env_duration("TEST_DURATION", Duration::from_secs(30))?;
        let per_request_timeout = env_duration("REQUEST_TIMEOUT", Duration::from_secs(10))?;
        let shutdown_grace = env_duration("SHUTDOWN_GRACE", Duration::from_secs(5))?;

        let max_concurrency: usize = match env::var("MAX_CONCURRENCY") {
            Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidEnvironment {
                name: "MAX_CONCURRENCY",
                message: format!("'{}' is not a valid count", raw),
            })?,
            Err(_) => 32,
        };

        let substitution = match env::var("SUBSTITUTION_POLICY") {
            Ok(raw) => SubstitutionPolicy::from_str(&raw).map_err(|message| {
                ConfigError::InvalidEnvironment {
                    name: "SUBSTITUTION_POLICY",
                    message,
                }
            })?,
            Err(_) => SubstitutionPolicy::default(),
        };

        let config = TestConfig {
            target_rps,
            duration,
            per_request_timeout,
            max_concurrency,
            substitution,
            shutdown_grace,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates field values, naming the offending field in the error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.target_rps.is_finite() {
            return Err(ConfigError::InvalidField {
                field: "target_rps",
                message: "must be a finite number".to_string(),
            });
        }
        if self.target_rps < 0.0 {
            return Err(ConfigError::InvalidField {
                field: "target_rps",
                message: format!("must be zero or positive, got {}", self.target_rps),
            });
        }
        if self.duration.is_zero() {
            return Err(ConfigError::InvalidField {
                field: "duration",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.per_request_timeout.is_zero() {
            return Err(ConfigError::InvalidField {
                field: "per_request_timeout",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::InvalidField {
                field: "max_concurrency",
                message: "must be at least 1".to_string(),
            });
        }
        if self.shutdown_grace.is_zero() {
            return Err(ConfigError::InvalidField {
                field: "shutdown_grace",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// True when no rate target is set and pacing should be skipped.
    pub fn is_unbounded(&self) -> bool {
        self.target_rps == 0.0
    }
}

fn env_duration(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Ok(raw) => {
            parse_duration_string(raw.trim()).map_err(|e| ConfigError::InvalidEnvironment {
                name,
                message: format!("invalid duration '{}': {}", raw, e),
            })
        }
        Err(_) => Ok(default),
    }
}
