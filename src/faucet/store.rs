//! Persistence of per-address faucet records and the audit log.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaucetRecord {
    /// Lower-cased recipient address
    pub address: String,
    pub timestamp: DateTime<Utc>,
    /// Absent while the transfer is still in flight
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Wei, decimal
    pub amount: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("faucet store backend failure: {0}")]
    Backend(String),
}

impl From<sea_orm::DbErr> for StoreError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Key-value persistence with per-entry expiry. Expired entries behave as absent.
#[async_trait]
pub trait FaucetStore: Send + Sync {
    async fn get(&self, address: &str) -> Result<Option<FaucetRecord>, StoreError>;

    /// Unconditionally replaces the record for `record.address`.
    async fn put_with_expiry(&self, record: &FaucetRecord, ttl: Duration)
    -> Result<(), StoreError>;

    /// Writes the record only when no live record exists for the address.
    async fn put_if_vacant(&self, record: &FaucetRecord, ttl: Duration)
    -> Result<bool, StoreError>;

    async fn remove(&self, address: &str) -> Result<(), StoreError>;

    async fn append_log(&self, record: &FaucetRecord, ttl: Duration) -> Result<(), StoreError>;

    /// Live audit entries, newest first.
    async fn recent_log(&self, limit: u64) -> Result<Vec<FaucetRecord>, StoreError>;

    /// Drops expired entries and returns how many were removed.
    async fn purge_expired(&self) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

pub fn record_key(address: &str) -> String {
    format!("faucet:{}", address.to_ascii_lowercase())
}

pub fn log_key(timestamp: DateTime<Utc>, sequence: u64) -> String {
    format!("faucet:log:{}:{sequence}", timestamp.timestamp_millis())
}

#[derive(Default)]
struct MemoryTables {
    records: HashMap<String, (FaucetRecord, DateTime<Utc>)>,
    log: Vec<(String, FaucetRecord, DateTime<Utc>)>,
    sequence: u64,
}

/// Process-local store for tests and single-instance deployments.
#[derive(Default)]
pub struct MemoryFaucetStore {
    tables: Mutex<MemoryTables>,
}

impl MemoryFaucetStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<std::sync::MutexGuard<'_, MemoryTables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl FaucetStore for MemoryFaucetStore {
    async fn get(&self, address: &str) -> Result<Option<FaucetRecord>, StoreError> {
        let now = Utc::now();
        let tables = self.tables()?;
        Ok(tables
            .records
            .get(&record_key(address))
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(record, _)| record.clone()))
    }

    async fn put_with_expiry(
        &self,
        record: &FaucetRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let expires_at = Utc::now() + ttl;
        self.tables()?
            .records
            .insert(record_key(&record.address), (record.clone(), expires_at));
        Ok(())
    }

    async fn put_if_vacant(
        &self,
        record: &FaucetRecord,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Utc::now();
        let mut tables = self.tables()?;
        let key = record_key(&record.address);
        if tables
            .records
            .get(&key)
            .is_some_and(|(_, expires_at)| *expires_at > now)
        {
            return Ok(false);
        }
        tables.records.insert(key, (record.clone(), now + ttl));
        Ok(true)
    }

    async fn remove(&self, address: &str) -> Result<(), StoreError> {
        self.tables()?.records.remove(&record_key(address));
        Ok(())
    }

    async fn append_log(&self, record: &FaucetRecord, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = Utc::now() + ttl;
        let mut tables = self.tables()?;
        tables.sequence += 1;
        let key = log_key(record.timestamp, tables.sequence);
        tables.log.push((key, record.clone(), expires_at));
        Ok(())
    }

    async fn recent_log(&self, limit: u64) -> Result<Vec<FaucetRecord>, StoreError> {
        let now = Utc::now();
        let tables = self.tables()?;
        let mut live: Vec<&FaucetRecord> = tables
            .log
            .iter()
            .filter(|(_, _, expires_at)| *expires_at > now)
            .map(|(_, record, _)| record)
            .collect();
        live.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(live
            .into_iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut tables = self.tables()?;
        let before = tables.records.len() + tables.log.len();
        tables.records.retain(|_, (_, expires_at)| *expires_at > now);
        tables.log.retain(|(_, _, expires_at)| *expires_at > now);
        let after = tables.records.len() + tables.log.len();
        Ok((before - after) as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.tables().map(|_| ())
    }
}
