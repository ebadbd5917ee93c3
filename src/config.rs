use config::{Config, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::transaction::Amount;

pub const DEFAULT_CONFIG_FILE: &str = "qledger.toml";

/// A SHA3-256 hex hash has 64 digits; more leading zeros can never be found
pub const MAX_DIFFICULTY: u32 = 64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerConfig {
    pub storage: StorageConfig,
    pub consensus: ConsensusConfig,
    pub mining: MiningConfig,
    pub mempool: MempoolConfig,
    pub recovery: RecoveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsensusConfig {
    /// Leading zero hex digits required in a block hash
    pub difficulty: u32,
    pub mining_reward: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MiningConfig {
    /// Attempts between cancellation/deadline checks
    pub check_interval: u64,
    /// Abandon a search after this many seconds (none = run to completion)
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MempoolConfig {
    pub max_pending: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoveryConfig {
    /// Replace a corrupt or invalid persisted chain with a fresh genesis chain.
    /// When false, loading such a chain is a hard error.
    pub reset_on_corruption: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                data_dir: PathBuf::from("./qledger_data"),
            },
            consensus: ConsensusConfig {
                difficulty: 4,
                mining_reward: 100,
            },
            mining: MiningConfig {
                check_interval: 4096,
                timeout_secs: None,
            },
            mempool: MempoolConfig { max_pending: 5000 },
            recovery: RecoveryConfig {
                reset_on_corruption: true,
            },
        }
    }
}

impl LedgerConfig {
    /// Defaults rooted at `data_dir`
    pub fn with_data_dir<P: Into<PathBuf>>(data_dir: P) -> Self {
        let mut config = Self::default();
        config.storage.data_dir = data_dir.into();
        config
    }

    /// Load configuration from file; keys missing from the file keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let defaults = Config::try_from(&Self::default())?;
        let config = Config::builder()
            .add_source(defaults)
            .add_source(File::from(path.as_ref()))
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with CLI overrides
    pub fn load_with_overrides(
        config_file: Option<PathBuf>,
        data_dir: Option<PathBuf>,
        difficulty: Option<u32>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_file {
            Self::from_file(path)?
        } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
            Self::from_file(DEFAULT_CONFIG_FILE)?
        } else {
            Self::default()
        };

        // CLI overrides
        if let Some(dir) = data_dir {
            config.storage.data_dir = dir;
        }
        if let Some(difficulty) = difficulty {
            config.consensus.difficulty = difficulty;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.consensus.difficulty > MAX_DIFFICULTY {
            return Err(ConfigError::Message(format!(
                "difficulty {} exceeds the maximum of {}",
                self.consensus.difficulty, MAX_DIFFICULTY
            )));
        }
        if self.mempool.max_pending == 0 {
            return Err(ConfigError::Message("mempool.max_pending must be positive".into()));
        }
        Ok(())
    }

    pub fn mining_timeout(&self) -> Option<Duration> {
        self.mining.timeout_secs.map(Duration::from_secs)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, toml_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ledger.toml");

        let mut config = LedgerConfig::with_data_dir(temp_dir.path().join("data"));
        config.consensus.difficulty = 3;
        config.mining.timeout_secs = Some(30);
        config.save(&path).unwrap();

        let loaded = LedgerConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.mining_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ledger.toml");
        std::fs::write(&path, "[consensus]\ndifficulty = 1\nmining_reward = 7\n").unwrap();

        let loaded = LedgerConfig::from_file(&path).unwrap();
        assert_eq!(loaded.consensus.difficulty, 1);
        assert_eq!(loaded.consensus.mining_reward, 7);
        assert_eq!(loaded.mempool, LedgerConfig::default().mempool);
        assert!(loaded.recovery.reset_on_corruption);
    }

    #[test]
    fn test_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ledger.toml");
        LedgerConfig::default().save(&path).unwrap();

        let config =
            LedgerConfig::load_with_overrides(Some(path), Some(temp_dir.path().join("elsewhere")), Some(2)).unwrap();
        assert_eq!(config.storage.data_dir, temp_dir.path().join("elsewhere"));
        assert_eq!(config.consensus.difficulty, 2);
    }

    #[test]
    fn test_rejects_impossible_difficulty() {
        let mut config = LedgerConfig::default();
        config.consensus.difficulty = 65;
        assert!(config.validate().is_err());
    }
}
