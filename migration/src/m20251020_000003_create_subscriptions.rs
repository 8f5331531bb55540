use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum SubscriptionPlans {
    Table,
    Id,
    Name,
    Tier,
    Price,
    Currency,
    Interval,
    Features,
    MessagesPerDay,
    CanUploadImages,
    CanUploadFiles,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Subscriptions {
    Table,
    Id,
    UserId,
    PlanId,
    PlanName,
    Tier,
    Status,
    PaymentReference,
    Amount,
    Currency,
    MessagesPerDay,
    CanUploadImages,
    CanUploadFiles,
    StartDate,
    EndDate,
    AutoRenew,
    CancelledAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Transactions {
    Table,
    Reference,
    UserId,
    PlanId,
    Amount,
    Currency,
    Status,
    CreatedAt,
    VerifiedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SubscriptionPlans::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SubscriptionPlans::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SubscriptionPlans::Name).string_len(100).not_null())
                    .col(ColumnDef::new(SubscriptionPlans::Tier).string_len(32).not_null())
                    .col(ColumnDef::new(SubscriptionPlans::Price).big_integer().not_null())
                    .col(ColumnDef::new(SubscriptionPlans::Currency).string_len(8).not_null())
                    .col(ColumnDef::new(SubscriptionPlans::Interval).string_len(16).not_null())
                    .col(ColumnDef::new(SubscriptionPlans::Features).json().not_null())
                    .col(
                        ColumnDef::new(SubscriptionPlans::MessagesPerDay)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionPlans::CanUploadImages)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(SubscriptionPlans::CanUploadFiles)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(SubscriptionPlans::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(SubscriptionPlans::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionPlans::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Subscriptions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Subscriptions::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Subscriptions::UserId).string_len(128).not_null())
                    .col(ColumnDef::new(Subscriptions::PlanId).string_len(64).not_null())
                    .col(ColumnDef::new(Subscriptions::PlanName).string_len(100).not_null())
                    .col(ColumnDef::new(Subscriptions::Tier).string_len(32).not_null())
                    .col(ColumnDef::new(Subscriptions::Status).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Subscriptions::PaymentReference)
                            .string_len(64)
                            .null(),
                    )
                    .col(ColumnDef::new(Subscriptions::Amount).big_integer().not_null())
                    .col(ColumnDef::new(Subscriptions::Currency).string_len(8).not_null())
                    .col(
                        ColumnDef::new(Subscriptions::MessagesPerDay)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::CanUploadImages)
                            .boolean()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::CanUploadFiles)
                            .boolean()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::StartDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::EndDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::AutoRenew)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::CancelledAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_subscriptions_user_status")
                    .table(Subscriptions::Table)
                    .col(Subscriptions::UserId)
                    .col(Subscriptions::Status)
                    .to_owned(),
            )
            .await?;

        // 一笔支付最多开通一个订阅
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_subscriptions_payment_reference")
                    .table(Subscriptions::Table)
                    .col(Subscriptions::PaymentReference)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Reference)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::UserId).string_len(128).not_null())
                    .col(ColumnDef::new(Transactions::PlanId).string_len(64).not_null())
                    .col(ColumnDef::new(Transactions::Amount).big_integer().not_null())
                    .col(ColumnDef::new(Transactions::Currency).string_len(8).not_null())
                    .col(ColumnDef::new(Transactions::Status).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::VerifiedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().if_exists().table(Transactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Subscriptions::Table).to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(SubscriptionPlans::Table)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}
