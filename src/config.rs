use crate::error::{RegistryError, Result, ResultExt as _};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable selecting the storage root.
pub const DATA_DIR_ENV: &str = "MODEL_REGISTRY_DATA_DIR";
/// Older name for the same setting, still honoured.
pub const LEGACY_DATA_DIR_ENV: &str = "DATA_DIR";
/// Optional settings file inside the storage root.
pub const CONFIG_FILE_NAME: &str = "registry.json";

const DEFAULT_DATA_DIR: &str = "data";
const EXPORTS_DIR: &str = "exports";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Storage root; every snapshot path derives from it
    pub data_dir: PathBuf,
    /// Where rolling log files go (platform data dir when unset)
    pub log_dir: Option<PathBuf>,
    /// Rebuild the master exports after every successful write
    pub rebuild_on_write: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            log_dir: None,
            rebuild_on_write: true,
        }
    }
}

impl RegistryConfig {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Resolve the storage root: explicit value, then `MODEL_REGISTRY_DATA_DIR`,
    /// then `DATA_DIR`, then `./data`. Settings from `registry.json` in that
    /// directory are layered on top, except `data_dir` itself.
    pub fn load(explicit_data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = explicit_data_dir
            .or_else(|| std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
            .or_else(|| std::env::var_os(LEGACY_DATA_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let mut config = Self::read_file(&data_dir.join(CONFIG_FILE_NAME))?.unwrap_or_default();
        config.data_dir = data_dir;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| RegistryError::Config(format!("{}: {e}", path.display())))
    }

    pub fn paths(&self) -> StoragePaths {
        StoragePaths::new(&self.data_dir)
    }
}

/// A logical table persisted as a columnar file plus a row-text copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPair {
    pub parquet: PathBuf,
    pub csv: PathBuf,
}

impl SnapshotPair {
    fn new(dir: &Path, stem: &str) -> Self {
        Self {
            parquet: dir.join(format!("{stem}.parquet")),
            csv: dir.join(format!("{stem}.csv")),
        }
    }
}

/// Every file location the registry touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    pub data_dir: PathBuf,
    pub models: SnapshotPair,
    pub master_all: SnapshotPair,
    pub master_latest: SnapshotPair,
    pub insights: PathBuf,
}

impl StoragePaths {
    pub fn new(data_dir: &Path) -> Self {
        let exports_dir = data_dir.join(EXPORTS_DIR);
        Self {
            data_dir: data_dir.to_path_buf(),
            models: SnapshotPair::new(data_dir, "models"),
            master_all: SnapshotPair::new(&exports_dir, "master_all"),
            master_latest: SnapshotPair::new(&exports_dir, "master_latest"),
            insights: exports_dir.join("insights.json"),
        }
    }
}
