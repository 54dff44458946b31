//! Configuration loading and schema definitions for maestro-upload.
//!
//! A config file is optional: every setting has a default, and the CLI
//! overrides what the file sets.

pub mod schema;

pub use schema::*;

use std::path::Path;

use anyhow::{Context, Result};

/// Loads configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid TOML, does not
/// match the schema, or sets polling values out of range.
///
/// # Example
///
/// ```no_run
/// use maestro_upload::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("maestro-upload.toml"))?;
/// println!("Polling every {}s", config.polling.interval_secs);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    config.polling.validate()?;

    Ok(config)
}

/// Loads configuration from a TOML string.
///
/// # Example
///
/// ```
/// use maestro_upload::config::load_config_str;
///
/// let config = load_config_str(r#"
///     [polling]
///     interval_secs = 5
/// "#)?;
///
/// assert_eq!(config.polling.interval_secs, 5);
/// assert_eq!(config.polling.timeout_minutes, 30.0);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;
    config.polling.validate()?;

    Ok(config)
}
