use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::core::block::Block;
use crate::core::transaction::Transaction;

pub const CHAIN_FILE: &str = "chain.json";
pub const MEMPOOL_FILE: &str = "mempool.json";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Atomic replace failed: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("{} not found", .0.display())]
    NotFound(PathBuf),
    #[error("Persisted chain is empty")]
    EmptyChain,
}

/// JSON persistence for the ledger: one file per artifact in a data directory.
///
/// Every write goes to a temp file in the same directory, is flushed and synced,
/// then renamed over the target so readers never observe a partial file.
#[derive(Clone, Debug)]
pub struct LedgerStorage {
    dir: PathBuf,
}

impl LedgerStorage {
    /// Open or create the data directory
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        tracing::debug!("Ledger storage at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn chain_path(&self) -> PathBuf {
        self.dir.join(CHAIN_FILE)
    }

    pub fn mempool_path(&self) -> PathBuf {
        self.dir.join(MEMPOOL_FILE)
    }

    /// Load the persisted chain. Missing, malformed and empty files are errors.
    pub fn load_chain(&self) -> Result<Vec<Block>, StorageError> {
        let chain: Vec<Block> = self.read_json(&self.chain_path())?;
        if chain.is_empty() {
            return Err(StorageError::EmptyChain);
        }
        tracing::info!("Loaded {} blocks from {}", chain.len(), self.chain_path().display());
        Ok(chain)
    }

    pub fn save_chain(&self, chain: &[Block]) -> Result<(), StorageError> {
        self.write_json(&self.chain_path(), &chain)?;
        tracing::debug!("Chain of {} blocks saved", chain.len());
        Ok(())
    }

    /// Load pending transactions. A missing file is an empty mempool.
    pub fn load_mempool(&self) -> Result<Vec<Transaction>, StorageError> {
        match self.read_json(&self.mempool_path()) {
            Ok(txs) => Ok(txs),
            Err(StorageError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    pub fn save_mempool(&self, transactions: &[Transaction]) -> Result<(), StorageError> {
        self.write_json(&self.mempool_path(), &transactions)?;
        tracing::debug!("Mempool of {} transactions saved", transactions.len());
        Ok(())
    }

    /// Remove both artifacts (use with caution!)
    pub fn clear(&self) -> Result<(), StorageError> {
        for path in [self.chain_path(), self.mempool_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        tracing::warn!("Ledger storage cleared");
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T, StorageError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StorageError::NotFound(path.to_path_buf())),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<(), StorageError> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_storage_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LedgerStorage::new(temp_dir.path()).unwrap();

        let chain = vec![Block::genesis()];
        storage.save_chain(&chain).unwrap();

        let loaded = storage.load_chain().unwrap();
        assert_eq!(loaded, chain);
    }

    #[test]
    fn test_missing_chain() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LedgerStorage::new(temp_dir.path()).unwrap();
        assert!(matches!(storage.load_chain(), Err(StorageError::NotFound(_))));
        assert!(storage.load_mempool().unwrap().is_empty());
    }

    #[test]
    fn test_empty_and_malformed_chain() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LedgerStorage::new(temp_dir.path()).unwrap();

        fs::write(storage.chain_path(), "[]").unwrap();
        assert!(matches!(storage.load_chain(), Err(StorageError::EmptyChain)));

        fs::write(storage.chain_path(), "{ not json").unwrap();
        assert!(matches!(storage.load_chain(), Err(StorageError::Serialization(_))));
    }

    #[test]
    fn test_mempool_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LedgerStorage::new(temp_dir.path()).unwrap();
        let txs = vec![Transaction::genesis(5)];
        storage.save_mempool(&txs).unwrap();
        assert_eq!(storage.load_mempool().unwrap(), txs);
    }

    #[test]
    fn test_writes_leave_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LedgerStorage::new(temp_dir.path().join("nested")).unwrap();
        storage.save_chain(&[Block::genesis()]).unwrap();
        storage.save_chain(&[Block::genesis()]).unwrap();
        storage.save_mempool(&[]).unwrap();

        let mut names: Vec<String> = fs::read_dir(storage.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![CHAIN_FILE.to_string(), MEMPOOL_FILE.to_string()]);
    }

    #[test]
    fn test_clear() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LedgerStorage::new(temp_dir.path()).unwrap();
        storage.save_chain(&[Block::genesis()]).unwrap();
        storage.clear().unwrap();
        storage.clear().unwrap();
        assert!(!storage.chain_path().exists());
    }
}
