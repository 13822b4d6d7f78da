//! Persisted config in the app data directory.
//!
//! Every section has defaults, so a missing file, a missing section or a
//! missing key all fall back to the values a fresh install would use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::app_data;
use crate::generation::DecodingParams;
use crate::store::DEFAULT_DIMENSION;

const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the JSON catalog export used for rebuilds.
    pub catalog_path: Option<String>,
    pub ollama: OllamaConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub generation: DecodingParams,
    pub context: ContextConfig,
    pub prompt: PromptConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub url: String,
    /// Must produce vectors of `index.dimension` components.
    pub embed_model: String,
    pub chat_model: String,
    /// Upper bound on one generation call. Cold starts can take a minute or more.
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".to_string(),
            embed_model: "all-minilm".to_string(),
            chat_model: "llama3.2:3b".to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub dimension: usize,
    /// Texts per embedding request during a rebuild.
    pub embed_batch_size: usize,
    /// Where the persisted pair lives. Defaults to `<app data>/index`.
    pub dir: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            embed_batch_size: 64,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Candidates fetched per requested result, before filtering.
    pub overfetch_factor: usize,
    /// Ceiling on candidates fetched, unless the request itself asks for more.
    pub max_candidates: usize,
    /// Results scoring below this never reach the prompt.
    pub min_score: f32,
    /// Result count when a request does not name one.
    pub default_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            overfetch_factor: 2,
            max_candidates: 15,
            min_score: 0.3,
            default_limit: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub description_chars: usize,
    pub max_materials: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            description_chars: 150,
            max_materials: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub history_turns: usize,
    pub turn_chars: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            history_turns: 3,
            turn_chars: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Directory holding the persisted index pair.
    pub fn index_dir(&self) -> Option<PathBuf> {
        match self.index.dir.as_deref().filter(|s| !s.is_empty()) {
            Some(dir) => Some(PathBuf::from(dir)),
            None => app_data::index_dir(),
        }
    }

    /// Configured catalog file, if any.
    pub fn catalog_path(&self) -> Option<PathBuf> {
        self.catalog_path
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
    }
}

/// Load config from the app data directory. Returns default config if missing or invalid.
pub fn load_config() -> Config {
    let Some(data_dir) = app_data::app_data_dir() else {
        return Config::default();
    };
    let path = data_dir.join(CONFIG_FILENAME);
    let Ok(s) = std::fs::read_to_string(&path) else {
        return Config::default();
    };
    toml::from_str(&s).unwrap_or_default()
}

/// Load config from an explicit file. Unlike [load_config], errors are reported.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(ConfigError::Read)?;
    toml::from_str(&s).map_err(ConfigError::Parse)
}

/// Save config to the app data directory.
pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    let data_dir = app_data::app_data_dir().ok_or(ConfigError::NoDataDir)?;
    let path = data_dir.join(CONFIG_FILENAME);
    let s = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    std::fs::write(&path, s).map_err(ConfigError::Write)
}

/// Set and persist the catalog file used for rebuilds.
pub fn set_catalog_path(path: &Path) -> Result<(), ConfigError> {
    let path = path.canonicalize().map_err(ConfigError::Canonicalize)?;
    if !path.is_file() {
        return Err(ConfigError::NotAFile(path));
    }
    let mut config = load_config();
    config.catalog_path = Some(path.to_string_lossy().into_owned());
    save_config(&config)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine app data directory")]
    NoDataDir,
    #[error("failed to read config: {0}")]
    Read(std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
    #[error("failed to resolve path: {0}")]
    Canonicalize(std::io::Error),
    #[error("not a file: {0}")]
    NotAFile(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "catalog_path = \"/srv/catalog.json\"\n[retrieval]\nmin_score = 0.5\n[generation]\ntemperature = 0.2\n",
        )
        .unwrap();
        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.retrieval.min_score, 0.5);
        assert_eq!(cfg.retrieval.max_candidates, 15);
        assert_eq!(cfg.generation.temperature, 0.2);
        assert_eq!(cfg.generation.max_tokens, 800);
        assert_eq!(cfg.index.dimension, DEFAULT_DIMENSION);
        assert_eq!(cfg.catalog_path(), Some(PathBuf::from("/srv/catalog.json")));
    }

    #[test]
    fn bad_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retrieval\n").unwrap();
        assert!(matches!(load_config_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let cfg = Config::default();
        let s = toml::to_string_pretty(&cfg).unwrap();
        assert_eq!(toml::from_str::<Config>(&s).unwrap(), cfg);
    }

    #[test]
    fn explicit_index_dir_wins() {
        let mut cfg = Config::default();
        cfg.index.dir = Some("/tmp/lustre-index".into());
        assert_eq!(cfg.index_dir(), Some(PathBuf::from("/tmp/lustre-index")));
    }
}
