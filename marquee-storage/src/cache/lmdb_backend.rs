//! LMDB-backed local store.
//!
//! Uses the heed crate (Rust bindings for LMDB) for a memory-mapped,
//! crash-safe key-value file that outlives the process.
//!
//! # Layout
//!
//! One unnamed database. Keys are the caller's cache key as UTF-8 bytes.
//! Values are `[timestamp millis LE: 8 bytes][json payload]`.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions: read transactions for `get` and `len`,
//! write transactions for `put` and `remove`.

use std::path::Path;

use async_trait::async_trait;
use chrono::DateTime;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use marquee_core::{LocalCacheRecord, MarqueeError, MarqueeResult, StorageError};
use serde_json::Value;

use super::local_store::LocalStore;

const TIMESTAMP_LEN: usize = 8;

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored bytes do not follow the record layout.
    #[error("Corrupt record for key {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for MarqueeError {
    fn from(e: LmdbStoreError) -> Self {
        MarqueeError::Storage(StorageError::TransactionFailed {
            reason: e.to_string(),
        })
    }
}

fn txn_err(e: heed::Error) -> LmdbStoreError {
    LmdbStoreError::Transaction(e.to_string())
}

/// LMDB-backed [`LocalStore`].
pub struct LmdbLocalStore {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl LmdbLocalStore {
    /// Open (creating if needed) a store in the directory `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per directory by this
        // process and the files are not modified externally.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        Ok(Self { env, db })
    }

    fn encode(record: &LocalCacheRecord) -> Result<Vec<u8>, LmdbStoreError> {
        let payload = serde_json::to_vec(&record.payload)
            .map_err(|e| LmdbStoreError::Serialization(e.to_string()))?;

        let mut bytes = Vec::with_capacity(TIMESTAMP_LEN + payload.len());
        bytes.extend_from_slice(&record.timestamp.timestamp_millis().to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<LocalCacheRecord, LmdbStoreError> {
        let corrupt = |reason: String| LmdbStoreError::Corrupt {
            key: key.to_string(),
            reason,
        };

        if bytes.len() < TIMESTAMP_LEN {
            return Err(corrupt(format!("{} bytes is shorter than the header", bytes.len())));
        }
        let (header, body) = bytes.split_at(TIMESTAMP_LEN);
        let millis = header
            .try_into()
            .map(i64::from_le_bytes)
            .map_err(|_| corrupt("invalid timestamp".to_string()))?;
        let timestamp = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| corrupt(format!("timestamp {} out of range", millis)))?;
        let payload: Value =
            serde_json::from_slice(body).map_err(|e| corrupt(e.to_string()))?;

        Ok(LocalCacheRecord::new(key, payload, timestamp))
    }
}

#[async_trait]
impl LocalStore for LmdbLocalStore {
    async fn get(&self, key: &str) -> MarqueeResult<Option<LocalCacheRecord>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        match self.db.get(&rtxn, key.as_bytes()).map_err(txn_err)? {
            Some(bytes) => Ok(Some(Self::decode(key, bytes)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, record: &LocalCacheRecord) -> MarqueeResult<()> {
        let bytes = Self::encode(record)?;

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db
            .put(&mut wtxn, record.key.as_bytes(), &bytes)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> MarqueeResult<bool> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let deleted = self.db.delete(&mut wtxn, key.as_bytes()).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(deleted)
    }

    async fn len(&self) -> MarqueeResult<u64> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        Ok(self.db.len(&rtxn).map_err(txn_err)?)
    }
}
