use crate::entities::{Tier, settings_entity};
use crate::models::UserProfileResponse;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct TierBreakdown {
    pub free: u64,
    pub pro: u64,
    pub enterprise: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: u64,
    pub active_users_today: u64,
    pub total_messages: i64,
    pub messages_today: u64,
    pub new_users_today: u64,
    pub new_users_this_week: u64,
    pub tier_breakdown: TierBreakdown,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserDetails {
    pub profile: UserProfileResponse,
    pub conversations_count: u64,
    /// 最近 100 条用量日志的 token 总数
    pub recent_token_usage: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetAdminRequest {
    pub user_id: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetTierRequest {
    pub user_id: String,
    pub tier: Tier,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BanUserRequest {
    pub user_id: String,
    pub banned: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AnalyticsQuery {
    /// 7d | 30d | 90d
    pub period: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct DailyCount {
    pub date: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct HourlyCount {
    pub hour: u32,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ModelUsage {
    pub model: String,
    pub count: u64,
    pub percentage: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsData {
    pub period: String,
    pub daily_messages: Vec<DailyCount>,
    pub daily_users: Vec<DailyCount>,
    pub top_models: Vec<ModelUsage>,
    pub peak_hours: Vec<HourlyCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsageLogEntry {
    pub id: String,
    pub user_id: String,
    pub user_email: Option<String>,
    pub model: String,
    pub prompt_tokens: i32,
    pub completion_tokens: i32,
    pub total_tokens: i32,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimits {
    pub free_per_minute: u32,
    pub pro_per_minute: u32,
    pub enterprise_per_minute: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            free_per_minute: 10,
            pro_per_minute: 30,
            enterprise_per_minute: 100,
        }
    }
}

impl RateLimits {
    pub fn for_tier(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Free => self.free_per_minute,
            Tier::Pro => self.pro_per_minute,
            Tier::Enterprise => self.enterprise_per_minute,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SystemSettings {
    pub maintenance_mode: bool,
    pub registration_enabled: bool,
    pub default_tier: Tier,
    pub enabled_models: Vec<String>,
    pub free_tier_daily_limit: i32,
    pub rate_limits: RateLimits,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            maintenance_mode: false,
            registration_enabled: true,
            default_tier: Tier::Free,
            enabled_models: vec![
                "openai/gpt-4o".to_string(),
                "openai/gpt-4o-mini".to_string(),
                "anthropic/claude-3.5-sonnet".to_string(),
            ],
            free_tier_daily_limit: Tier::Free.default_daily_limit(),
            rate_limits: RateLimits::default(),
        }
    }
}

impl From<settings_entity::Model> for SystemSettings {
    fn from(m: settings_entity::Model) -> Self {
        let to_u32 = |v: i32| u32::try_from(v).unwrap_or(0);
        Self {
            maintenance_mode: m.maintenance_mode,
            registration_enabled: m.registration_enabled,
            default_tier: m.default_tier,
            enabled_models: serde_json::from_value(m.enabled_models).unwrap_or_default(),
            free_tier_daily_limit: m.free_tier_daily_limit,
            rate_limits: RateLimits {
                free_per_minute: to_u32(m.rate_limit_free),
                pro_per_minute: to_u32(m.rate_limit_pro),
                enterprise_per_minute: to_u32(m.rate_limit_enterprise),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevenueStats {
    pub total_revenue: i64,
    pub revenue_this_month: i64,
    pub successful_transactions: u64,
    pub active_subscriptions: u64,
    pub revenue_by_tier: BTreeMap<String, i64>,
}
