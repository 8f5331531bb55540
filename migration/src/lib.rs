pub use sea_orm_migration::prelude::*;

mod m20251020_000001_create_users;
mod m20251020_000002_create_conversations;
mod m20251020_000003_create_subscriptions;
mod m20251020_000004_create_usage_logs_and_settings;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251020_000001_create_users::Migration),
            Box::new(m20251020_000002_create_conversations::Migration),
            Box::new(m20251020_000003_create_subscriptions::Migration),
            Box::new(m20251020_000004_create_usage_logs_and_settings::Migration),
        ]
    }
}
