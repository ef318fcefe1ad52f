//! Lifesign configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{LifesignError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifesignConfig {
    /// Master secret for the encryption-at-rest capability.
    #[serde(default)]
    pub master_key: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub email: EmailConfig,
}

fn default_database_path() -> String { "~/.lifesign/lifesign.db".into() }

impl Default for LifesignConfig {
    fn default() -> Self {
        Self {
            master_key: String::new(),
            database_path: default_database_path(),
            scheduler: SchedulerConfig::default(),
            push: PushConfig::default(),
            email: EmailConfig::default(),
        }
    }
}

impl LifesignConfig {
    /// Load config from the default path (~/.lifesign/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LifesignError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| LifesignError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Lifesign home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lifesign")
    }
}

/// Scheduled job timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Deadline scan tick.
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// Retention sweep tick.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Sliding lockout after an alert episode before the same user can be
    /// alerted again.
    #[serde(default = "default_suppression_window")]
    pub suppression_window_secs: i64,
}

fn default_scan_interval() -> u64 { 60 }
fn default_sweep_interval() -> u64 { 3600 }
fn default_suppression_window() -> i64 { crate::types::ALERT_SUPPRESSION_SECS }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval(),
            sweep_interval_secs: default_sweep_interval(),
            suppression_window_secs: default_suppression_window(),
        }
    }
}

/// Push provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    #[serde(default = "default_push_endpoint")]
    pub endpoint: String,
    /// Provider-imposed batch limit per request.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_push_timeout")]
    pub timeout_secs: u64,
}

fn default_push_endpoint() -> String { "https://exp.host/--/api/v2/push/send".into() }
fn default_chunk_size() -> usize { 100 }
fn default_push_timeout() -> u64 { 10 }

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            endpoint: default_push_endpoint(),
            chunk_size: default_chunk_size(),
            timeout_secs: default_push_timeout(),
        }
    }
}

/// SMTP configuration for the email adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_from_email")]
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

fn default_smtp_port() -> u16 { 587 }
fn default_from_email() -> String { "noreply@lifesign.app".into() }
fn default_from_name() -> String { "Lifesign".into() }

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from_email: default_from_email(),
            from_name: default_from_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LifesignConfig::default();
        assert_eq!(config.scheduler.scan_interval_secs, 60);
        assert_eq!(config.scheduler.sweep_interval_secs, 3600);
        assert_eq!(config.push.chunk_size, 100);
        assert!(!config.email.enabled);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            master_key = "secret"

            [scheduler]
            scan_interval_secs = 5

            [email]
            enabled = true
            smtp_host = "smtp.example.org"
        "#;

        let config: LifesignConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.master_key, "secret");
        assert_eq!(config.scheduler.scan_interval_secs, 5);
        assert_eq!(config.scheduler.suppression_window_secs, 3600);
        assert!(config.email.enabled);
        assert_eq!(config.email.smtp_port, 587);
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: LifesignConfig = toml::from_str("").unwrap();
        assert_eq!(config.push.endpoint, "https://exp.host/--/api/v2/push/send");
        assert!(config.database_path.contains("lifesign.db"));
    }
}
