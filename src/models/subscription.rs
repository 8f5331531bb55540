use crate::entities::{
    BillingInterval, SubscriptionStatus, Tier, TransactionStatus, plan_entity, subscription_entity,
    transaction_entity,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPlanResponse {
    pub id: String,
    pub name: String,
    pub tier: Tier,
    /// 最小货币单位
    pub price: i64,
    pub currency: String,
    pub interval: BillingInterval,
    pub features: Vec<String>,
    pub messages_per_day: i32,
    pub can_upload_images: bool,
    pub can_upload_files: bool,
    pub is_active: bool,
}

impl From<plan_entity::Model> for SubscriptionPlanResponse {
    fn from(p: plan_entity::Model) -> Self {
        let features = p.feature_list();
        Self {
            id: p.id,
            name: p.name,
            tier: p.tier,
            price: p.price,
            currency: p.currency,
            interval: p.interval,
            features,
            messages_per_day: p.messages_per_day,
            can_upload_images: p.can_upload_images,
            can_upload_files: p.can_upload_files,
            is_active: p.is_active,
        }
    }
}

/// 管理端创建/更新套餐；id 为空时新建
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SavePlanRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub tier: Tier,
    pub price: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_interval")]
    pub interval: BillingInterval,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default = "default_messages_per_day")]
    pub messages_per_day: i32,
    #[serde(default)]
    pub can_upload_images: bool,
    #[serde(default)]
    pub can_upload_files: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_currency() -> String {
    "NGN".to_string()
}

fn default_interval() -> BillingInterval {
    BillingInterval::Monthly
}

fn default_messages_per_day() -> i32 {
    20
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub plan_name: String,
    pub tier: Tier,
    pub status: SubscriptionStatus,
    pub payment_reference: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub messages_per_day: i32,
    pub can_upload_images: bool,
    pub can_upload_files: bool,
    pub start_date: i64,
    pub end_date: i64,
    pub auto_renew: bool,
    pub cancelled_at: Option<i64>,
}

impl From<subscription_entity::Model> for SubscriptionResponse {
    fn from(s: subscription_entity::Model) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            plan_id: s.plan_id,
            plan_name: s.plan_name,
            tier: s.tier,
            status: s.status,
            payment_reference: s.payment_reference,
            amount: s.amount,
            currency: s.currency,
            messages_per_day: s.messages_per_day,
            can_upload_images: s.can_upload_images,
            can_upload_files: s.can_upload_files,
            start_date: s.start_date.timestamp_millis(),
            end_date: s.end_date.timestamp_millis(),
            auto_renew: s.auto_renew,
            cancelled_at: s.cancelled_at.map(|t| t.timestamp_millis()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatusResponse {
    pub tier: Tier,
    pub is_subscribed: bool,
    pub can_chat: bool,
    pub can_upload_images: bool,
    pub can_upload_files: bool,
    pub messages_per_day: i32,
    pub messages_used_today: i32,
    pub subscription_end_date: Option<i64>,
    pub plan_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitPaymentRequest {
    pub plan_id: String,
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitPaymentResponse {
    pub authorization_url: String,
    pub reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VerifyPaymentRequest {
    pub reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VerifyPaymentResponse {
    pub subscription: SubscriptionResponse,
    pub status: SubscriptionStatusResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelSubscriptionResponse {
    pub message: String,
    pub active_until: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaystackKeyResponse {
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub reference: String,
    pub user_id: String,
    pub plan_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: TransactionStatus,
    pub created_at: i64,
    pub verified_at: Option<i64>,
}

impl From<transaction_entity::Model> for TransactionResponse {
    fn from(t: transaction_entity::Model) -> Self {
        Self {
            reference: t.reference,
            user_id: t.user_id,
            plan_id: t.plan_id,
            amount: t.amount,
            currency: t.currency,
            status: t.status,
            created_at: t.created_at.timestamp_millis(),
            verified_at: t.verified_at.map(|v| v.timestamp_millis()),
        }
    }
}
