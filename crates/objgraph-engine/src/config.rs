use std::path::{Path, PathBuf};

use objgraph_legacy::{TypeSimilarityEntry, DEFAULT_SIMILARITY_THRESHOLD};
use objgraph_store::{FileChannelConfig, SyncMode};
use objgraph_types::{DEFAULT_START_OBJECT_ID, DEFAULT_START_TYPE_ID};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Configuration for a [`Persistence`](crate::Persistence).
///
/// Every section and field is optional in TOML; missing values take their
/// defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub storage: StorageConfig,
    pub ids: IdConfig,
    pub legacy: LegacyConfig,
    pub storer: StorerConfig,
}

impl PersistenceConfig {
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Read a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn to_toml_string(&self) -> EngineResult<String> {
        toml::to_string(self).map_err(|e| EngineError::Config(e.to_string()))
    }
}

/// Where and how records are written.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage directory. Without one, data lives in memory only.
    pub directory: Option<PathBuf>,
    /// zstd level for commit frames; uncompressed when absent.
    pub compression_level: Option<i32>,
    pub sync_mode: SyncMode,
}

impl StorageConfig {
    pub fn file_channel(&self) -> FileChannelConfig {
        FileChannelConfig {
            sync_mode: self.sync_mode,
            compression_level: self.compression_level,
        }
    }
}

/// First ids handed out by a fresh allocator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdConfig {
    pub first_object_id: u64,
    pub first_type_id: u64,
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            first_object_id: DEFAULT_START_OBJECT_ID,
            first_type_id: DEFAULT_START_TYPE_ID,
        }
    }
}

/// Legacy type resolution settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyConfig {
    /// Minimum similarity for an automatic member match.
    pub similarity_threshold: f64,
    /// Reject mappings that drop or leave members without an explicit entry.
    pub strict: bool,
    /// Extra scores for primitive conversions, on top of the widening defaults.
    pub type_similarities: Vec<TypeSimilarityEntry>,
    /// Refactoring mapping file (`source;target` lines).
    pub refactoring_file: Option<PathBuf>,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            strict: false,
            type_similarities: Vec::new(),
            refactoring_file: None,
        }
    }
}

/// Storer limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorerConfig {
    /// Largest batch of record bytes one storer may collect.
    pub max_batch_bytes: u64,
}

impl Default for StorerConfig {
    fn default() -> Self {
        Self {
            max_batch_bytes: u32::MAX as u64,
        }
    }
}
