use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // One live row per recipient; rows past expires_at are treated as absent.
        manager
            .create_table(
                Table::create()
                    .table(FaucetLimits::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FaucetLimits::Address)
                            .string_len(42)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FaucetLimits::RequestedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FaucetLimits::TxHash).string_len(66).null())
                    .col(ColumnDef::new(FaucetLimits::Amount).string_len(78).not_null())
                    .col(
                        ColumnDef::new(FaucetLimits::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .index(
                        Index::create()
                            .name("idx_faucet_limits_expiry")
                            .col(FaucetLimits::ExpiresAt),
                    )
                    .to_owned(),
            )
            .await?;

        // Append-only audit trail of completed disbursements
        manager
            .create_table(
                Table::create()
                    .table(FaucetLog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FaucetLog::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FaucetLog::Address).string_len(42).not_null())
                    .col(
                        ColumnDef::new(FaucetLog::RequestedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FaucetLog::TxHash).string_len(66).null())
                    .col(ColumnDef::new(FaucetLog::Amount).string_len(78).not_null())
                    .col(
                        ColumnDef::new(FaucetLog::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .index(
                        Index::create()
                            .name("idx_faucet_log_requested_at")
                            .col(FaucetLog::RequestedAt),
                    )
                    .index(
                        Index::create()
                            .name("idx_faucet_log_expiry")
                            .col(FaucetLog::ExpiresAt),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FaucetLog::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FaucetLimits::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FaucetLimits {
    Table,
    Address,
    RequestedAt,
    TxHash,
    Amount,
    ExpiresAt,
}

#[derive(DeriveIden)]
enum FaucetLog {
    Table,
    Id,
    Address,
    RequestedAt,
    TxHash,
    Amount,
    ExpiresAt,
}
