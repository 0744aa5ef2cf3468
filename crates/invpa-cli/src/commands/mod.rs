//! Subcommands and the setup they share.

pub mod batch;
pub mod config;
pub mod process;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use invpa_core::models::config::InvpaConfig;
use invpa_core::{OpenAiBackend, Pipeline};

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("invpa")
        .join("config.json")
}

/// The `--config` path if given, the default path otherwise.
pub fn config_path(config_path: Option<&str>) -> PathBuf {
    config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path)
}

/// Load the configuration, falling back to defaults when no file exists.
///
/// An explicitly given file must exist.
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<InvpaConfig> {
    let path = config_path(explicit);

    if path.exists() {
        debug!("Loading configuration from {}", path.display());
        return InvpaConfig::from_file(&path).map_err(|e| {
            anyhow::anyhow!("Failed to read config {}: {}", path.display(), e)
        });
    }

    if explicit.is_some() {
        anyhow::bail!("Config file not found: {}", path.display());
    }

    Ok(InvpaConfig::default())
}

/// Build a pipeline talking to the configured inference service.
pub fn build_pipeline(config: &InvpaConfig) -> anyhow::Result<Pipeline> {
    config.validate()?;

    let api_key = config
        .resolved_api_key()
        .ok_or_else(|| anyhow::anyhow!("No API key configured"))?;

    let backend = OpenAiBackend::new(api_key)?
        .with_base_url(config.api.base_url.as_str())
        .with_model(config.api.model.as_str())
        .with_max_retries(config.api.max_retries)
        .with_timeout(Duration::from_secs(config.api.request_timeout_secs))?;

    debug!("Using model {} at {}", config.api.model, config.api.base_url);

    Ok(Pipeline::from_config(config, Arc::new(backend)))
}

/// Ensure a path given on the command line exists.
pub fn require_exists(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        anyhow::bail!("Input file not found: {}", path.display());
    }
    Ok(())
}
