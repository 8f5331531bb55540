use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

use super::users::Tier;

/// 全局设置只有一行，主键固定
pub const SYSTEM_SETTINGS_ID: &str = "system";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "system_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub maintenance_mode: bool,
    pub registration_enabled: bool,
    pub default_tier: Tier,
    pub enabled_models: Json,
    pub free_tier_daily_limit: i32,
    pub rate_limit_free: i32,
    pub rate_limit_pro: i32,
    pub rate_limit_enterprise: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
