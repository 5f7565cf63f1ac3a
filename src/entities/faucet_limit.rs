//! Live per-address faucet record. Rows past `expires_at` are treated as absent.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "faucet_limits")]
pub struct Model {
    /// Lower-cased recipient address
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(StringLen::N(42))")]
    pub address: String,
    pub requested_at: DateTimeWithTimeZone,
    /// Null while the transfer is in flight
    #[sea_orm(column_type = "String(StringLen::N(66))", nullable)]
    pub tx_hash: Option<String>,
    /// Wei, decimal
    #[sea_orm(column_type = "String(StringLen::N(78))")]
    pub amount: String,
    pub expires_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
