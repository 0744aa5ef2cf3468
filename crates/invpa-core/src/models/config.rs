//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::InvpaError;
use crate::models::invoice::CompanyIdentity;

/// Environment variable consulted when no API key is configured.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Value shipped in example config files, never a real key.
pub const PLACEHOLDER_API_KEY: &str = "YOUR_OPENAI_API_KEY";

/// Main configuration for the invpa pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InvpaConfig {
    /// Inference service configuration.
    pub api: ApiConfig,

    /// The operator's own company.
    pub company: CompanyIdentity,

    /// Page rendering configuration.
    pub render: RenderConfig,

    /// Concurrency and timeouts.
    pub pipeline: PipelineConfig,
}

/// Inference service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API key. Falls back to `OPENAI_API_KEY` when empty.
    pub api_key: String,

    /// Base URL of an OpenAI-compatible endpoint.
    pub base_url: String,

    /// Vision-capable model name.
    pub model: String,

    /// Transport timeout for one HTTP exchange, in seconds.
    pub request_timeout_secs: u64,

    /// Retries on rate limiting or server errors.
    pub max_retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            request_timeout_secs: 120,
            max_retries: 3,
        }
    }
}

/// Page rendering configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Resolution used when rasterizing PDF pages.
    pub dpi: u32,

    /// Path to the `pdftoppm` binary.
    pub pdftoppm_path: PathBuf,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            pdftoppm_path: PathBuf::from("pdftoppm"),
        }
    }
}

/// Concurrency and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Documents processed at the same time in a batch.
    pub workers: usize,

    /// Upper bound for one inference call, retries included, in seconds.
    pub call_timeout_secs: u64,

    /// Invoices of one document extracted at the same time.
    pub group_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            call_timeout_secs: 180,
            group_concurrency: 2,
        }
    }
}

impl InvpaConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// The configured API key, or the environment fallback.
    pub fn resolved_api_key(&self) -> Option<String> {
        let configured = self.api.api_key.trim();
        if !configured.is_empty() {
            return Some(configured.to_string());
        }

        std::env::var(API_KEY_ENV)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Check that the configuration can drive a pipeline run.
    pub fn validate(&self) -> crate::Result<()> {
        match self.resolved_api_key() {
            None => {
                return Err(InvpaError::Config(format!(
                    "no API key configured; set api.api_key or {API_KEY_ENV}"
                )));
            }
            Some(key) if key == PLACEHOLDER_API_KEY => {
                return Err(InvpaError::Config(
                    "api.api_key still holds the placeholder value".to_string(),
                ));
            }
            Some(_) => {}
        }

        if self.pipeline.workers == 0 {
            return Err(InvpaError::Config(
                "pipeline.workers must be at least 1".to_string(),
            ));
        }

        if self.pipeline.group_concurrency == 0 {
            return Err(InvpaError::Config(
                "pipeline.group_concurrency must be at least 1".to_string(),
            ));
        }

        if self.render.dpi == 0 {
            return Err(InvpaError::Config("render.dpi must be positive".to_string()));
        }

        if self.company.is_empty() {
            tracing::warn!("No company identity configured; counterparty selection may pick your own company");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn with_key(key: &str) -> InvpaConfig {
        let mut config = InvpaConfig::default();
        config.api.api_key = key.to_string();
        config
    }

    #[test]
    fn test_defaults() {
        let config = InvpaConfig::default();
        assert_eq!(config.api.model, "gpt-4o");
        assert_eq!(config.render.dpi, 150);
        assert_eq!(config.pipeline.workers, 4);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: InvpaConfig = serde_json::from_str(
            r#"{"api": {"api_key": "sk-1"}, "company": {"name": "My Co"}}"#,
        )
        .unwrap();
        assert_eq!(config.api.api_key, "sk-1");
        assert_eq!(config.api.max_retries, 3);
        assert_eq!(config.company.name, "My Co");
        assert_eq!(config.pipeline.call_timeout_secs, 180);
    }

    #[test]
    fn test_validate_rejects_placeholder() {
        assert!(matches!(
            with_key(PLACEHOLDER_API_KEY).validate(),
            Err(InvpaError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = with_key("sk-test");
        config.pipeline.workers = 0;
        assert!(config.validate().is_err());

        config.pipeline.workers = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = with_key("sk-test");
        config.company.vat = "PL123".to_string();
        config.save(&path).unwrap();

        let loaded = InvpaConfig::from_file(&path).unwrap();
        assert_eq!(loaded.company.vat, "PL123");
        assert_eq!(loaded.api.api_key, "sk-test");
    }
}
