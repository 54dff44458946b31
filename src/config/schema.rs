//! Configuration schema for maestro-upload.
//!
//! ```text
//! Config (root)
//! ├── ApiConfig        - Service URL, project and console overrides
//! ├── PollingConfig    - Interval, timeout, backoff and retry budget
//! └── UploadConfig     - Workspace location and packaging excludes
//! ```
//!
//! Every section is optional. An empty file yields the defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

use crate::archive::DEFAULT_EXCLUDES;
use crate::client::{BackendTarget, DEFAULT_API_URL};
use crate::poller::PollSettings;

/// Root configuration structure.
///
/// # Example
///
/// ```toml
/// [api]
/// url = "https://api.mobile.dev"
/// project_id = "proj_123"
///
/// [polling]
/// interval_secs = 10
/// timeout_minutes = 45
///
/// [upload]
/// workspace = ".maestro"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub upload: UploadConfig,
}

/// Where uploads go.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Base URL of the upload API.
    ///
    /// Default: `https://api.mobile.dev`
    #[serde(default = "default_api_url")]
    pub url: String,

    /// Project id. When set, uploads go to the project backend instead of
    /// the cloud backend.
    pub project_id: Option<String>,

    /// Overrides the web console used for job links.
    pub console_url: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            project_id: None,
            console_url: None,
        }
    }
}

impl ApiConfig {
    /// The backend selected by this configuration.
    pub fn backend_target(&self) -> BackendTarget {
        let target = BackendTarget::from_project_id(self.project_id.as_deref());
        match &self.console_url {
            Some(url) => target.with_console_url(url.clone()),
            None => target,
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

/// Status polling behaviour.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `interval_secs` | 10 |
/// | `timeout_minutes` | 30 |
/// | `backoff_factor` | 1.25 |
/// | `max_interval_secs` | 300 |
/// | `max_server_errors` | 3 |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
    /// Seconds between two status queries.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Minutes to wait for the upload to complete. Fractions are allowed.
    #[serde(default = "default_timeout")]
    pub timeout_minutes: f64,

    /// Interval multiplier applied after a rate-limited response. At least 1.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Ceiling for the interval grown by backoff.
    #[serde(default = "default_max_interval")]
    pub max_interval_secs: u64,

    /// 5xx responses tolerated in one polling session before the run fails.
    #[serde(default = "default_max_server_errors")]
    pub max_server_errors: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            timeout_minutes: default_timeout(),
            backoff_factor: default_backoff_factor(),
            max_interval_secs: default_max_interval(),
            max_server_errors: default_max_server_errors(),
        }
    }
}

impl PollingConfig {
    /// Rejects settings the polling loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.interval_secs > 0,
            "polling.interval_secs must be at least 1"
        );
        ensure!(
            self.timeout_minutes.is_finite() && self.timeout_minutes > 0.0,
            "polling.timeout_minutes must be a positive number, got {}",
            self.timeout_minutes
        );
        ensure!(
            self.backoff_factor.is_finite() && self.backoff_factor >= 1.0,
            "polling.backoff_factor must be a finite number of at least 1, got {}",
            self.backoff_factor
        );
        Ok(())
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(self.interval_secs),
            timeout: Duration::try_from_secs_f64(self.timeout_minutes * 60.0)
                .unwrap_or(Duration::MAX),
            backoff_factor: self.backoff_factor,
            max_interval: Duration::from_secs(self.max_interval_secs),
            max_server_errors: self.max_server_errors,
        }
    }
}

fn default_interval() -> u64 {
    10
}

fn default_timeout() -> f64 {
    30.0
}

fn default_backoff_factor() -> f64 {
    1.25
}

fn default_max_interval() -> u64 {
    300
}

fn default_max_server_errors() -> u32 {
    3
}

/// What gets packaged and sent.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Workspace directory holding the flows.
    ///
    /// If not set, `.maestro` and then `.mobiledev` are tried.
    pub workspace: Option<PathBuf>,

    /// Names (or `*.ext` patterns) left out of the workspace archive.
    ///
    /// Default: `[".git", "node_modules"]`
    #[serde(default = "default_excludes")]
    pub excludes: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            workspace: None,
            excludes: default_excludes(),
        }
    }
}

fn default_excludes() -> Vec<String> {
    DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_str;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = load_config_str("").unwrap();

        assert_eq!(config.api.url, "https://api.mobile.dev");
        assert_eq!(config.api.backend_target(), BackendTarget::cloud());
        assert_eq!(config.polling.poll_settings(), PollSettings::default());
        assert_eq!(config.upload.excludes, vec![".git", "node_modules"]);
    }

    #[test]
    fn test_project_config() {
        let config = load_config_str(
            r#"
            [api]
            project_id = "proj_1"
            console_url = "https://console.example.com"

            [polling]
            interval_secs = 2
            timeout_minutes = 5
            "#,
        )
        .unwrap();

        assert_eq!(
            config.api.backend_target(),
            BackendTarget::project("proj_1").with_console_url("https://console.example.com")
        );

        let settings = config.polling.poll_settings();
        assert_eq!(settings.interval, Duration::from_secs(2));
        assert_eq!(settings.timeout, Duration::from_secs(300));
        assert_eq!(settings.max_server_errors, 3);
    }

    #[test]
    fn test_fractional_timeout() {
        let config = load_config_str("[polling]\ntimeout_minutes = 0.5\n").unwrap();
        assert_eq!(config.polling.poll_settings().timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_huge_timeout_saturates() {
        let config = load_config_str("[polling]\ntimeout_minutes = 1e300\n").unwrap();
        assert_eq!(config.polling.poll_settings().timeout, Duration::MAX);
    }

    #[test]
    fn test_shrinking_backoff_factor_is_rejected() {
        let err = load_config_str("[polling]\nbackoff_factor = 0.5\n").unwrap_err();
        assert!(err.to_string().contains("backoff_factor"), "{}", err);
    }

    #[test]
    fn test_non_finite_values_are_rejected() {
        assert!(load_config_str("[polling]\nbackoff_factor = inf\n").is_err());
        assert!(load_config_str("[polling]\nbackoff_factor = nan\n").is_err());
        assert!(load_config_str("[polling]\ntimeout_minutes = inf\n").is_err());
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let err = load_config_str("[polling]\ninterval_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("interval_secs"), "{}", err);
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        assert!(load_config_str("[polling]\ntimeout_minutes = 0\n").is_err());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(load_config_str("[polling]\ninterval_secs = \"ten\"\n").is_err());
    }
}
