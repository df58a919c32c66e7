use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{BrainError, Result};

/// Top-level configuration for AgentBrain.
///
/// Loaded from `~/.agentbrain/config.toml` by default. Every section falls
/// back to its defaults when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrainConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

impl BrainConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BrainConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.fallback.history_limit == 0 {
            return Err(BrainError::Config(
                "fallback.history_limit must be at least 1".to_string(),
            ));
        }
        if self.generation.professor_max_tokens == 0 || self.generation.agent_max_tokens == 0 {
            return Err(BrainError::Config(
                "generation token budgets must be positive".to_string(),
            ));
        }
        for (name, t) in [
            ("professor_temperature", self.generation.professor_temperature),
            ("agent_temperature", self.generation.agent_temperature),
        ] {
            if !(0.0..=2.0).contains(&t) {
                return Err(BrainError::Config(format!(
                    "generation.{} must be within [0, 2], got {}",
                    name, t
                )));
            }
        }
        Ok(())
    }

    /// Read the generation API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        let var = &self.generation.api_key_env;
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(BrainError::MissingCredential(var.clone())),
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Path to the knowledge JSON file.
    pub knowledge_path: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.agentbrain/data".to_string(),
            log_level: "info".to_string(),
            knowledge_path: "data/info_data.json".to_string(),
        }
    }
}

/// Generation service settings for both stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,
    /// Chat model name.
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub professor_max_tokens: u32,
    pub agent_max_tokens: u32,
    pub professor_temperature: f32,
    pub agent_temperature: f32,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            professor_max_tokens: 300,
            agent_max_tokens: 150,
            professor_temperature: 0.7,
            agent_temperature: 0.0,
            request_timeout_secs: 30,
        }
    }
}

/// Fallback retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Pairs searched by fallback; also half the per-user context window.
    pub history_limit: usize,
    /// Treat answers that were themselves fallback results as ineligible.
    pub skip_fallback_answers: bool,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            history_limit: 20,
            skip_fallback_answers: false,
        }
    }
}

/// Sentence-embedding model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Directory with `model.onnx` and `tokenizer.json`.
    pub model_dir: String,
    /// Use the deterministic hash embedder instead of the ONNX model.
    pub use_mock: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_dir: "~/.agentbrain/models/paraphrase-multilingual-MiniLM-L12-v2".to_string(),
            use_mock: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = BrainConfig::default();
        assert_eq!(config.general.data_dir, "~/.agentbrain/data");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.knowledge_path, "data/info_data.json");
        assert_eq!(config.generation.model, "gpt-3.5-turbo");
        assert_eq!(config.generation.professor_max_tokens, 300);
        assert_eq!(config.generation.agent_max_tokens, 150);
        assert!((config.generation.professor_temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.generation.agent_temperature, 0.0);
        assert_eq!(config.fallback.history_limit, 20);
        assert!(!config.fallback.skip_fallback_answers);
        assert!(!config.embedding.use_mock);
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[fallback]
history_limit = 5

[generation]
model = "gpt-4o-mini"
"#;
        let file = create_temp_config(content);
        let config = BrainConfig::load(file.path()).unwrap();
        assert_eq!(config.fallback.history_limit, 5);
        assert!(!config.fallback.skip_fallback_answers);
        assert_eq!(config.generation.model, "gpt-4o-mini");
        assert_eq!(config.generation.agent_max_tokens, 150);
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = BrainConfig::load(file.path()).unwrap();
        assert_eq!(config.fallback.history_limit, 20);
        assert_eq!(config.generation.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is {{ not valid TOML");
        assert!(BrainConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = BrainConfig::load_or_default(Path::new("/does/not/exist/config.toml"));
        assert_eq!(config.fallback.history_limit, 20);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");

        let mut config = BrainConfig::default();
        config.fallback.history_limit = 7;
        config.embedding.use_mock = true;
        config.save(&path).unwrap();

        let reloaded = BrainConfig::load(&path).unwrap();
        assert_eq!(reloaded.fallback.history_limit, 7);
        assert!(reloaded.embedding.use_mock);
    }

    #[test]
    fn test_validate_defaults_ok() {
        assert!(BrainConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_history_limit() {
        let mut config = BrainConfig::default();
        config.fallback.history_limit = 0;
        assert!(matches!(config.validate(), Err(BrainError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_token_budget() {
        let mut config = BrainConfig::default();
        config.generation.agent_max_tokens = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_temperature() {
        let mut config = BrainConfig::default();
        config.generation.professor_temperature = 2.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("professor_temperature"));
    }

    #[test]
    fn test_api_key_missing_is_credential_error() {
        let mut config = BrainConfig::default();
        config.generation.api_key_env = "AGENTBRAIN_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        let err = config.api_key().unwrap_err();
        assert!(matches!(err, BrainError::MissingCredential(ref v) if v == "AGENTBRAIN_TEST_KEY_THAT_IS_NEVER_SET"));
    }
}
