use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    pub gemini_api_key: Option<String>,

    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    #[serde(default = "default_gemini_endpoint")]
    pub gemini_endpoint: String,

    pub claude_api_key: Option<String>,

    #[serde(default = "default_claude_model")]
    pub claude_model: String,

    /// Upper bound on each generation tier before falling through.
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,

    /// Fixes the template generator's choices when set.
    #[serde(default)]
    pub template_seed: Option<u64>,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("story-forge");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("stories.db").to_string_lossy().to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_gemini_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_claude_model() -> String {
    "claude-3-5-haiku-20241022".to_string()
}

fn default_provider_timeout() -> u64 {
    8
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            gemini_api_key: None,
            gemini_model: default_gemini_model(),
            gemini_endpoint: default_gemini_endpoint(),
            claude_api_key: None,
            claude_model: default_claude_model(),
            provider_timeout_secs: default_provider_timeout(),
            template_seed: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Reads `path`, writing defaults there first if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str::<Config>(&content)?
        } else {
            let config = Config::default();
            config.save_to(path)?;
            config
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("story-forge")
            .join("config.toml")
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    fn apply_env(&mut self) {
        if let Some(key) = non_empty_env("GEMINI_API_KEY") {
            self.gemini_api_key = Some(key);
        }
        if let Some(key) = non_empty_env("ANTHROPIC_API_KEY") {
            self.claude_api_key = Some(key);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.provider_timeout_secs == 0 {
            return Err(AppError::Config(
                "provider_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.db_path.trim().is_empty() {
            return Err(AppError::Config("db_path cannot be empty".to_string()));
        }
        Ok(())
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();

        assert!(path.exists());
        assert_eq!(config.gemini_model, "gemini-2.5-flash");
        assert_eq!(config.provider_timeout_secs, 8);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "db_path = \"/tmp/x.db\"\nprovider_timeout_secs = 3\ntemplate_seed = 7\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.db_path, "/tmp/x.db");
        assert_eq!(config.provider_timeout(), Duration::from_secs(3));
        assert_eq!(config.template_seed, Some(7));
        assert_eq!(config.claude_model, default_claude_model());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "provider_timeout_secs = 0\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(AppError::Config(_))));
    }
}
