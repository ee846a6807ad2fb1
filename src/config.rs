//! Configuration handling for form sessions

use crate::retry::RetryPolicy;
use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable that overrides the config file location
pub const CONFIG_ENV: &str = "FORMFLOW_CONFIG";

/// User configuration; every field falls back to a built-in default
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FormflowConfig {
    /// Retries after the first submission attempt
    pub max_retries: Option<u32>,
    /// Wait before the first retry, in milliseconds
    pub initial_delay_ms: Option<u64>,
    /// Upper bound for a single wait, in milliseconds
    pub max_delay_ms: Option<u64>,
    /// Growth factor between waits
    pub backoff_multiplier: Option<f64>,
    /// Tracing filter used when RUST_LOG is not set
    pub log_filter: Option<String>,
}

impl FormflowConfig {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        ProjectDirs::from("io", "formflow", "formflow")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Load configuration from file
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file, defaulting when it is absent
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: FormflowConfig = serde_json::from_str(&content)?;
            return Ok(config);
        }
        Ok(Self::default())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(path) = Self::config_path() {
            self.save_to(&path)?;
        }
        Ok(())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Retry policy with configured values layered over the defaults
    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            initial_delay: self
                .initial_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_delay),
            max_delay: self
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            backoff_multiplier: self
                .backoff_multiplier
                .filter(|m| m.is_finite() && *m >= 1.0)
                .unwrap_or(defaults.backoff_multiplier),
        }
    }

    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or("formflow=info")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FormflowConfig::default();
        assert!(config.max_retries.is_none());
        assert!(config.initial_delay_ms.is_none());
        assert!(config.max_delay_ms.is_none());
        assert!(config.backoff_multiplier.is_none());
        assert_eq!(config.log_filter(), "formflow=info");
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_partial_config_overrides_only_given_fields() {
        let config = FormflowConfig {
            max_retries: Some(5),
            initial_delay_ms: Some(250),
            ..Default::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, RetryPolicy::default().max_delay);
    }

    #[test]
    fn test_shrinking_multiplier_is_ignored() {
        let config = FormflowConfig {
            backoff_multiplier: Some(0.5),
            ..Default::default()
        };
        assert_eq!(config.retry_policy().backoff_multiplier, 2.0);
    }

    #[test]
    fn test_deserialize_from_empty_json() {
        let parsed: FormflowConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, FormflowConfig::default());
    }

    #[test]
    fn test_deserialize_with_extra_fields() {
        // Should ignore unknown fields
        let json = r#"{"max_retries": 1, "unknown_field": "value"}"#;
        let parsed: FormflowConfig = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.max_retries, Some(1));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = std::env::temp_dir()
            .join(format!("formflow-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("config.json");
        let config = FormflowConfig {
            max_delay_ms: Some(8000),
            log_filter: Some("formflow=debug".to_string()),
            ..Default::default()
        };

        config.save_to(&path).unwrap();
        let loaded = FormflowConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let path = std::env::temp_dir()
            .join(format!("formflow-missing-{}.json", uuid::Uuid::new_v4()));
        let loaded = FormflowConfig::load_from(&path).unwrap();
        assert_eq!(loaded, FormflowConfig::default());
    }
}
