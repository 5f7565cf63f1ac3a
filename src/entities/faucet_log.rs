//! Audit trail of completed faucet disbursements.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "faucet_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(column_type = "String(StringLen::N(42))")]
    pub address: String,
    pub requested_at: DateTimeWithTimeZone,
    #[sea_orm(column_type = "String(StringLen::N(66))", nullable)]
    pub tx_hash: Option<String>,
    #[sea_orm(column_type = "String(StringLen::N(78))")]
    pub amount: String,
    pub expires_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
