use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, Insert, QueryFilter, QueryOrder, QuerySelect,
};

use crate::entities::prelude::*;
use crate::entities::{faucet_limit, faucet_log};

use super::store::{FaucetRecord, FaucetStore, StoreError};

/// PostgreSQL-backed store. Expiry is a column; reads ignore expired rows and the sweeper
/// deletes them.
#[derive(Clone)]
pub struct PgFaucetStore {
    database: DatabaseConnection,
}

impl PgFaucetStore {
    pub fn new(database: DatabaseConnection) -> Self {
        Self { database }
    }

    fn limit_model(
        record: &FaucetRecord,
        expires_at: DateTime<FixedOffset>,
    ) -> faucet_limit::ActiveModel {
        faucet_limit::ActiveModel {
            address: Set(record.address.to_ascii_lowercase()),
            requested_at: Set(record.timestamp.fixed_offset()),
            tx_hash: Set(record.tx_hash.clone()),
            amount: Set(record.amount.clone()),
            expires_at: Set(expires_at),
        }
    }

    fn limit_upsert() -> OnConflict {
        OnConflict::column(faucet_limit::Column::Address)
            .update_columns([
                faucet_limit::Column::RequestedAt,
                faucet_limit::Column::TxHash,
                faucet_limit::Column::Amount,
                faucet_limit::Column::ExpiresAt,
            ])
            .to_owned()
    }

    /// Insert that claims the address only when no unexpired row holds it.
    fn reservation(
        record: &FaucetRecord,
        ttl: Duration,
        now: DateTime<FixedOffset>,
    ) -> Insert<faucet_limit::ActiveModel> {
        let on_conflict = Self::limit_upsert()
            .action_and_where(
                Expr::col((FaucetLimit, faucet_limit::Column::ExpiresAt)).lte(now),
            )
            .to_owned();
        FaucetLimit::insert(Self::limit_model(record, now + ttl)).on_conflict(on_conflict)
    }
}

fn now_fixed() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}

fn record_from_limit(model: faucet_limit::Model) -> FaucetRecord {
    FaucetRecord {
        address: model.address,
        timestamp: model.requested_at.with_timezone(&Utc),
        tx_hash: model.tx_hash,
        amount: model.amount,
    }
}

fn record_from_log(model: faucet_log::Model) -> FaucetRecord {
    FaucetRecord {
        address: model.address,
        timestamp: model.requested_at.with_timezone(&Utc),
        tx_hash: model.tx_hash,
        amount: model.amount,
    }
}

#[async_trait]
impl FaucetStore for PgFaucetStore {
    async fn get(&self, address: &str) -> Result<Option<FaucetRecord>, StoreError> {
        let model = FaucetLimit::find_by_id(address.to_ascii_lowercase())
            .filter(faucet_limit::Column::ExpiresAt.gt(now_fixed()))
            .one(&self.database)
            .await?;
        Ok(model.map(record_from_limit))
    }

    async fn put_with_expiry(
        &self,
        record: &FaucetRecord,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let model = Self::limit_model(record, now_fixed() + ttl);
        FaucetLimit::insert(model)
            .on_conflict(Self::limit_upsert())
            .exec_without_returning(&self.database)
            .await?;
        Ok(())
    }

    async fn put_if_vacant(
        &self,
        record: &FaucetRecord,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let written = Self::reservation(record, ttl, now_fixed())
            .exec_without_returning(&self.database)
            .await?;
        Ok(written == 1)
    }

    async fn remove(&self, address: &str) -> Result<(), StoreError> {
        FaucetLimit::delete_by_id(address.to_ascii_lowercase())
            .exec(&self.database)
            .await?;
        Ok(())
    }

    async fn append_log(&self, record: &FaucetRecord, ttl: Duration) -> Result<(), StoreError> {
        let entry = faucet_log::ActiveModel {
            id: NotSet,
            address: Set(record.address.to_ascii_lowercase()),
            requested_at: Set(record.timestamp.fixed_offset()),
            tx_hash: Set(record.tx_hash.clone()),
            amount: Set(record.amount.clone()),
            expires_at: Set(now_fixed() + ttl),
        };
        FaucetLog::insert(entry)
            .exec_without_returning(&self.database)
            .await?;
        Ok(())
    }

    async fn recent_log(&self, limit: u64) -> Result<Vec<FaucetRecord>, StoreError> {
        let rows = FaucetLog::find()
            .filter(faucet_log::Column::ExpiresAt.gt(now_fixed()))
            .order_by_desc(faucet_log::Column::RequestedAt)
            .limit(limit)
            .all(&self.database)
            .await?;
        Ok(rows.into_iter().map(record_from_log).collect())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = now_fixed();
        let limits = FaucetLimit::delete_many()
            .filter(faucet_limit::Column::ExpiresAt.lte(now))
            .exec(&self.database)
            .await?;
        let log = FaucetLog::delete_many()
            .filter(faucet_log::Column::ExpiresAt.lte(now))
            .exec(&self.database)
            .await?;
        Ok(limits.rows_affected + log.rows_affected)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.database.ping().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{DbBackend, QueryTrait};

    use super::*;

    fn record(tx_hash: Option<&str>) -> FaucetRecord {
        FaucetRecord {
            address: "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_string(),
            timestamp: Utc::now(),
            tx_hash: tx_hash.map(str::to_string),
            amount: "1000000000000000000".to_string(),
        }
    }

    #[test]
    fn reservation_only_overwrites_expired_rows() {
        let now = Utc::now().fixed_offset();
        let sql = PgFaucetStore::reservation(&record(None), Duration::minutes(2), now)
            .build(DbBackend::Postgres)
            .to_string();

        assert!(sql.starts_with(r#"INSERT INTO "faucet_limits""#), "{sql}");
        assert!(sql.contains("'0x70997970c51812dc3a010c7d01b50e0d17dc79c8'"), "{sql}");
        assert!(sql.contains(r#"ON CONFLICT ("address") DO UPDATE SET"#), "{sql}");
        assert!(sql.contains(r#""expires_at" = "excluded"."expires_at""#), "{sql}");
        assert!(sql.contains(r#"WHERE "faucet_limits"."expires_at" <="#), "{sql}");
    }

    #[test]
    fn record_write_overwrites_unconditionally() {
        let model = PgFaucetStore::limit_model(&record(Some("0x01")), now_fixed());
        let sql = FaucetLimit::insert(model)
            .on_conflict(PgFaucetStore::limit_upsert())
            .build(DbBackend::Postgres)
            .to_string();

        assert!(sql.contains(r#""tx_hash" = "excluded"."tx_hash""#), "{sql}");
        assert!(!sql.contains("WHERE"), "{sql}");
    }
}
