//! Command-line arguments for the `agentbrain` binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::{Path, PathBuf};

use agentbrain_core::config::BrainConfig;
use clap::Parser;

/// AgentBrain: a two-stage office assistant with history-based fallback.
#[derive(Parser, Debug, Default)]
#[command(name = "agentbrain", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Data directory holding the SQLite database.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Path to the office knowledge JSON file.
    #[arg(short = 'k', long = "knowledge")]
    pub knowledge: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Number of past pairs searched by fallback.
    #[arg(long = "history-limit")]
    pub history_limit: Option<usize>,

    /// Use hash embeddings instead of the ONNX model.
    #[arg(long = "mock-embedding")]
    pub mock_embedding: bool,

    /// Dotenv file to load before reading configuration. Defaults to the
    /// first `.env` found from the working directory upward.
    #[arg(long = "env-file")]
    pub env_file: Option<PathBuf>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > AGENTBRAIN_CONFIG env var > ~/.agentbrain/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("AGENTBRAIN_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// True when the config path was named explicitly, so a bad file is fatal.
    pub fn config_is_explicit(&self) -> bool {
        self.config.is_some() || std::env::var_os("AGENTBRAIN_CONFIG").is_some()
    }

    /// Overwrite config values with any flags that were given.
    pub fn apply_overrides(&self, config: &mut BrainConfig) {
        if let Some(ref dir) = self.data_dir {
            config.general.data_dir = dir.to_string_lossy().to_string();
        }
        if let Some(ref path) = self.knowledge {
            config.general.knowledge_path = path.to_string_lossy().to_string();
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(limit) = self.history_limit {
            config.fallback.history_limit = limit;
        }
        if self.mock_embedding {
            config.embedding.use_mock = true;
        }
    }
}

/// Load a dotenv file into the process environment. Variables that are
/// already set keep their value. Returns the file that was read.
pub fn load_env_file(path: Option<&Path>) -> Result<PathBuf, dotenvy::Error> {
    match path {
        Some(path) => dotenvy::from_path(path).map(|()| path.to_path_buf()),
        None => dotenvy::dotenv(),
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => match std::env::var("HOME") {
            Ok(home) => PathBuf::from(home).join(rest),
            Err(_) => PathBuf::from(rest),
        },
        None => PathBuf::from(path),
    }
}

fn default_config_path() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".agentbrain").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_flags() {
        let args = CliArgs::try_parse_from([
            "agentbrain",
            "--config",
            "/tmp/ab.toml",
            "--data-dir",
            "/tmp/data",
            "--knowledge",
            "kb.json",
            "--log-level",
            "debug",
            "--history-limit",
            "5",
            "--mock-embedding",
            "--env-file",
            "/tmp/ab.env",
        ])
        .unwrap();

        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/ab.toml"));
        assert!(args.config_is_explicit());

        let mut config = BrainConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.general.data_dir, "/tmp/data");
        assert_eq!(config.general.knowledge_path, "kb.json");
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.fallback.history_limit, 5);
        assert!(config.embedding.use_mock);
        assert_eq!(args.env_file, Some(PathBuf::from("/tmp/ab.env")));
    }

    #[test]
    fn test_no_flags_keeps_config() {
        let args = CliArgs::try_parse_from(["agentbrain"]).unwrap();
        let mut config = BrainConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.fallback.history_limit, 20);
        assert!(!config.embedding.use_mock);
        assert_eq!(config.general.knowledge_path, "data/info_data.json");
    }

    #[test]
    fn test_rejects_non_numeric_history_limit() {
        assert!(CliArgs::try_parse_from(["agentbrain", "--history-limit", "muitos"]).is_err());
    }

    #[test]
    fn test_env_file_supplies_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "AGENTBRAIN_TEST_DOTENV_KEY=sk-from-file\n").unwrap();

        assert_eq!(load_env_file(Some(path.as_path())).unwrap(), path);

        let mut config = BrainConfig::default();
        config.generation.api_key_env = "AGENTBRAIN_TEST_DOTENV_KEY".to_string();
        assert_eq!(config.api_key().unwrap(), "sk-from-file");
    }

    #[test]
    fn test_env_file_does_not_override_environment() {
        std::env::set_var("AGENTBRAIN_TEST_DOTENV_SET", "from-env");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "AGENTBRAIN_TEST_DOTENV_SET=from-file\n").unwrap();

        load_env_file(Some(path.as_path())).unwrap();
        assert_eq!(std::env::var("AGENTBRAIN_TEST_DOTENV_SET").unwrap(), "from-env");
    }

    #[test]
    fn test_missing_env_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_env_file(Some(dir.path().join("absent.env").as_path())).unwrap_err();
        assert!(err.not_found());
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_home("rel/path"), PathBuf::from("rel/path"));
        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(expand_home("~/x/y"), PathBuf::from(home).join("x/y"));
        }
    }
}
