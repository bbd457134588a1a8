//! # uw-config
//!
//! Layered configuration loading for Underwrite using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`UNDERWRITE_*` prefix, `__` as separator)
//! 2. Project-level `.underwrite/config.toml`
//! 3. User-level `~/.config/underwrite/config.toml`
//! 4. Built-in defaults
//!
//! Figment maps `UNDERWRITE_LLM__API_KEY` -> `llm.api_key`,
//! `UNDERWRITE_RATE_LIMIT__PIPELINE__LIMIT` -> `rate_limit.pipeline.limit`, etc.
//!
//! ```no_run
//! use uw_config::UwConfig;
//!
//! let config = UwConfig::load_with_dotenv().expect("config");
//! if config.storage.is_configured() {
//!     println!("bucket: {}", config.storage.bucket_name);
//! }
//! ```

mod database;
mod error;
mod llm;
mod pipeline;
mod rate_limit;
mod retry;
mod storage;
mod verification;

pub use database::DatabaseConfig;
pub use error::ConfigError;
pub use llm::LlmConfig;
pub use pipeline::PipelineConfig;
pub use rate_limit::{RateLimitConfig, WindowConfig};
pub use retry::{BackoffStep, RetryConfig};
pub use storage::StorageConfig;
pub use verification::VerificationConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Project-local directory holding config, database and local blobs.
pub const PROJECT_DIR: &str = ".underwrite";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UwConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
}

impl UwConfig {
    /// Load configuration from all sources (TOML files + environment variables).
    ///
    /// Does NOT call `dotenvy`; use [`Self::load_with_dotenv`] for `.env` support.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Figment`] if a source fails to parse and
    /// [`ConfigError::InvalidValue`] if the merged values are inconsistent.
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration after reading `.env` from the workspace root.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load`].
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        Self::load_dotenv_from_workspace();
        Self::load()
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests can inspect the figment or layer extra providers.
    #[must_use]
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        let local_path = PathBuf::from(PROJECT_DIR).join("config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed("UNDERWRITE_").split("__"))
    }

    /// Reject values that would make the pipeline misbehave.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.max_compliance_cycles == 0 {
            return Err(invalid(
                "pipeline.max_compliance_cycles",
                "must be at least 1",
            ));
        }
        for (name, window) in [
            ("rate_limit.read", self.rate_limit.read),
            ("rate_limit.write", self.rate_limit.write),
            ("rate_limit.pipeline", self.rate_limit.pipeline),
        ] {
            if window.window_secs == 0 {
                return Err(invalid(name, "window_secs must be positive"));
            }
        }
        if self.retry.max_retries > 0 && self.retry.schedule.is_empty() {
            return Err(invalid(
                "retry.schedule",
                "at least one backoff step is required when retries are enabled",
            ));
        }
        let v = &self.verification;
        if v.cross_doc_warn_pct > v.cross_doc_fail_pct {
            return Err(invalid(
                "verification.cross_doc_warn_pct",
                "must not exceed cross_doc_fail_pct",
            ));
        }
        if [
            v.currency_tolerance,
            v.ratio_tolerance,
            v.reconcile_abs_tolerance,
            v.reconcile_pct_tolerance,
        ]
        .iter()
        .any(|t| t.is_sign_negative())
        {
            return Err(invalid("verification", "tolerances must not be negative"));
        }
        Ok(())
    }

    /// Path to the user-global config file.
    #[must_use]
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("underwrite").join("config.toml"))
    }

    /// Load `.env` from the workspace root.
    ///
    /// Walks up from `CARGO_MANIFEST_DIR` (if available), otherwise tries the
    /// current directory. Silently does nothing if no `.env` is found.
    fn load_dotenv_from_workspace() {
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let mut dir = PathBuf::from(manifest_dir);
            // crate -> crates/ -> workspace root
            for _ in 0..3 {
                let env_path = dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                    return;
                }
                if !dir.pop() {
                    break;
                }
            }
        }

        let _ = dotenvy::dotenv();
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = UwConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.storage.is_configured());
        assert!(!config.llm.is_configured());
    }

    #[test]
    fn figment_builds_without_files() {
        let config: UwConfig = UwConfig::figment().extract().expect("should extract defaults");
        assert_eq!(config.pipeline.max_compliance_cycles, 3);
        assert_eq!(config.retry.max_retries, 2);
    }

    #[test]
    fn zero_cycles_rejected() {
        let mut config = UwConfig::default();
        config.pipeline.max_compliance_cycles = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_compliance_cycles"));
    }

    #[test]
    fn inverted_cross_doc_thresholds_rejected() {
        let mut config = UwConfig::default();
        config.verification.cross_doc_warn_pct = rust_decimal::Decimal::ONE_HUNDRED;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn empty_schedule_with_retries_rejected() {
        let mut config = UwConfig::default();
        config.retry.schedule.clear();
        assert!(config.validate().is_err());
        config.retry.max_retries = 0;
        assert!(config.validate().is_ok());
    }
}
