use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum UsageLogs {
    Table,
    Id,
    UserId,
    Model,
    PromptTokens,
    CompletionTokens,
    TotalTokens,
    CreatedAt,
}

#[derive(DeriveIden)]
enum SystemSettings {
    Table,
    Id,
    MaintenanceMode,
    RegistrationEnabled,
    DefaultTier,
    EnabledModels,
    FreeTierDailyLimit,
    RateLimitFree,
    RateLimitPro,
    RateLimitEnterprise,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UsageLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UsageLogs::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(UsageLogs::UserId).string_len(128).not_null())
                    .col(ColumnDef::new(UsageLogs::Model).string_len(100).not_null())
                    .col(ColumnDef::new(UsageLogs::PromptTokens).integer().not_null())
                    .col(
                        ColumnDef::new(UsageLogs::CompletionTokens)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(UsageLogs::TotalTokens).integer().not_null())
                    .col(
                        ColumnDef::new(UsageLogs::CreatedAt)
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
                    .name("idx_usage_logs_created_at")
                    .table(UsageLogs::Table)
                    .col(UsageLogs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_usage_logs_user")
                    .table(UsageLogs::Table)
                    .col(UsageLogs::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SystemSettings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SystemSettings::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SystemSettings::MaintenanceMode)
                            .boolean()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SystemSettings::RegistrationEnabled)
                            .boolean()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SystemSettings::DefaultTier)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(SystemSettings::EnabledModels).json().not_null())
                    .col(
                        ColumnDef::new(SystemSettings::FreeTierDailyLimit)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SystemSettings::RateLimitFree).integer().not_null())
                    .col(ColumnDef::new(SystemSettings::RateLimitPro).integer().not_null())
                    .col(
                        ColumnDef::new(SystemSettings::RateLimitEnterprise)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SystemSettings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().if_exists().table(SystemSettings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(UsageLogs::Table).to_owned())
            .await?;
        Ok(())
    }
}
