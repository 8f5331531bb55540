use crate::entities::{Tier, user_entity};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 通过身份校验的调用方，由鉴权中间件放入请求扩展
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub is_admin: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub id_token: String,
    #[schema(example = "Ada")]
    pub display_name: Option<String>,
}

/// 移动端注册：身份来自 Bearer token
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MobileRegisterRequest {
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTokenRequest {
    pub id_token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTokenResponse {
    pub valid: bool,
    pub uid: String,
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[schema(example = "Ada")]
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileResponse {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub tier: Tier,
    pub messages_used_today: i32,
    pub total_messages: i64,
    pub is_banned: bool,
    pub ban_reason: Option<String>,
    pub subscription_id: Option<String>,
    /// epoch 毫秒
    pub created_at: i64,
    pub last_active_at: i64,
}

impl From<user_entity::Model> for UserProfileResponse {
    fn from(user: user_entity::Model) -> Self {
        let today = chrono::Utc::now().date_naive();
        Self {
            messages_used_today: user.used_today(today),
            uid: user.uid,
            email: user.email,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
            tier: user.tier,
            total_messages: user.total_messages,
            is_banned: user.is_banned,
            ban_reason: user.ban_reason,
            subscription_id: user.subscription_id,
            created_at: user.created_at.timestamp_millis(),
            last_active_at: user.last_active_at.timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserUsage {
    pub messages_used_today: i32,
    pub daily_limit: i32,
    pub total_messages: i64,
    pub tier: Tier,
    /// 下一个 UTC 零点（epoch 毫秒）
    pub reset_time: i64,
}

/// 移动端资料：基础资料 + 订阅权益
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MobileUserProfile {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub tier: Tier,
    pub is_subscribed: bool,
    pub can_upload_images: bool,
    pub can_upload_files: bool,
    pub messages_used_today: i32,
    pub messages_per_day: i32,
    pub subscription_end_date: Option<i64>,
    pub plan_name: Option<String>,
}
