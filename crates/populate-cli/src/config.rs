use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use populate_generate::model::{
    DEFAULT_APPLIERS, DEFAULT_BATCH_SIZE, DEFAULT_QUESTIONS, DEFAULT_SEED, DEFAULT_USERS,
};
use populate_generate::{
    FanOutShape, GenerateOptions, GenerationError, GeoSpread, RetryPolicy, TargetCounts,
};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "populate.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("toml decode error in {path}: {source}")]
    TomlDecode {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsSection {
    pub users: i64,
    pub appliers: i64,
    pub questions: i64,
}

impl Default for TargetsSection {
    fn default() -> Self {
        Self {
            users: DEFAULT_USERS as i64,
            appliers: DEFAULT_APPLIERS as i64,
            questions: DEFAULT_QUESTIONS as i64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    pub batch_size: usize,
    pub max_in_flight: usize,
    pub seed: u64,
    pub fan_out: FanOutShape,
    pub geo: GeoSpread,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_in_flight: 1,
            seed: DEFAULT_SEED,
            fan_out: FanOutShape::default(),
            geo: GeoSpread::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// Prefer `DATABASE_URL` over writing credentials into the file.
    pub url: Option<String>,
    pub postgis: bool,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: None,
            postgis: false,
            max_connections: 5,
            acquire_timeout_secs: 10,
        }
    }
}

/// Contents of `populate.toml`. Every section and key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulateConfig {
    pub targets: TargetsSection,
    pub generation: GenerationSection,
    pub retry: RetryPolicy,
    pub database: DatabaseSection,
}

impl PopulateConfig {
    /// Load `path` if given (it must exist), else `populate.toml` when present,
    /// else the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::TomlDecode { path, source })
    }

    pub fn targets(&self) -> Result<TargetCounts, GenerationError> {
        TargetCounts::from_signed(
            self.targets.users,
            self.targets.appliers,
            self.targets.questions,
        )
    }

    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            batch_size: self.generation.batch_size,
            max_in_flight: self.generation.max_in_flight,
            seed: self.generation.seed,
            fan_out: self.generation.fan_out,
            geo: self.generation.geo,
            retry: self.retry.clone(),
        }
    }
}
