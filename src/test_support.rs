//! 测试用的外部服务替身与数据构造

use crate::entities::{
    BillingInterval, MessageRole, Tier, plan_entity, subscription_entity, user_entity,
};
use crate::error::{AppError, AppResult};
use crate::external::{
    ChatCompletionProvider, Completion, IdentityProvider, InitializeTransaction,
    InitializedTransaction, PaymentGateway, VerifiedTransaction, verify_webhook_signature,
};
use crate::models::{AuthUser, ChatMessage, TokenUsage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::collections::HashMap;
use std::sync::Mutex;

pub fn auth_user(uid: &str) -> AuthUser {
    AuthUser {
        uid: uid.to_string(),
        email: Some(format!("{uid}@example.com")),
        name: Some(format!("User {uid}")),
        is_admin: false,
    }
}

pub fn admin_user(uid: &str) -> AuthUser {
    AuthUser {
        is_admin: true,
        ..auth_user(uid)
    }
}

/// token -> 身份 的固定映射；记录管理操作
#[derive(Default)]
pub struct StubIdentity {
    tokens: HashMap<String, AuthUser>,
    pub calls: Mutex<Vec<String>>,
}

impl StubIdentity {
    pub fn with_token(mut self, token: &str, user: AuthUser) -> Self {
        self.tokens.insert(token.to_string(), user);
        self
    }

    pub fn recorded(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl IdentityProvider for StubIdentity {
    async fn verify_id_token(&self, token: &str) -> AppResult<AuthUser> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| AppError::AuthError("Invalid token".to_string()))
    }

    async fn set_admin_claim(&self, uid: &str, is_admin: bool) -> AppResult<()> {
        self.record(format!("admin:{uid}:{is_admin}"));
        Ok(())
    }

    async fn set_disabled(&self, uid: &str, disabled: bool) -> AppResult<()> {
        self.record(format!("disabled:{uid}:{disabled}"));
        Ok(())
    }

    async fn delete_user(&self, uid: &str) -> AppResult<()> {
        self.record(format!("delete:{uid}"));
        Ok(())
    }
}

/// 固定回复的上游模型；`failing` 时返回上游错误
pub struct StubCompletion {
    reply: String,
    failing: bool,
    pub requests: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl StubCompletion {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            failing: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::replying("")
        }
    }

    pub fn last_request(&self) -> Option<(String, Vec<ChatMessage>)> {
        self.requests.lock().ok().and_then(|r| r.last().cloned())
    }
}

#[async_trait]
impl ChatCompletionProvider for StubCompletion {
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> AppResult<Completion> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((model.to_string(), messages.to_vec()));
        }
        if self.failing {
            return Err(AppError::ExternalApiError("upstream down".to_string()));
        }
        Ok(Completion {
            id: "gen-test".to_string(),
            role: MessageRole::Assistant,
            content: self.reply.clone(),
            usage: Some(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
        })
    }
}

pub const WEBHOOK_SECRET: &str = "sk_test_secret";

/// 支付网关替身：verify 按 reference 返回预置结果
pub struct StubGateway {
    verified: Mutex<HashMap<String, VerifiedTransaction>>,
    pub initialized: Mutex<Vec<InitializeTransaction>>,
    reject_initialize: bool,
}

impl Default for StubGateway {
    fn default() -> Self {
        Self {
            verified: Mutex::new(HashMap::new()),
            initialized: Mutex::new(Vec::new()),
            reject_initialize: false,
        }
    }
}

impl StubGateway {
    pub fn rejecting() -> Self {
        Self {
            reject_initialize: true,
            ..Self::default()
        }
    }

    pub fn set_verified(&self, reference: &str, status: &str, amount: i64) {
        if let Ok(mut map) = self.verified.lock() {
            map.insert(
                reference.to_string(),
                VerifiedTransaction {
                    status: status.to_string(),
                    reference: reference.to_string(),
                    amount,
                    currency: "NGN".to_string(),
                    paid_at: None,
                },
            );
        }
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn initialize(&self, request: &InitializeTransaction) -> AppResult<InitializedTransaction> {
        if self.reject_initialize {
            return Err(AppError::ExternalApiError("gateway rejected".to_string()));
        }
        if let Ok(mut list) = self.initialized.lock() {
            list.push(request.clone());
        }
        Ok(InitializedTransaction {
            authorization_url: format!("https://checkout.test/{}", request.reference),
            access_code: None,
            reference: request.reference.clone(),
        })
    }

    async fn verify(&self, reference: &str) -> AppResult<VerifiedTransaction> {
        self.verified
            .lock()
            .ok()
            .and_then(|m| m.get(reference).cloned())
            .ok_or_else(|| AppError::ExternalApiError("unknown reference".to_string()))
    }

    fn public_key(&self) -> String {
        "pk_test_public".to_string()
    }

    fn verify_webhook(&self, body: &[u8], signature: &str) -> bool {
        verify_webhook_signature(WEBHOOK_SECRET, body, signature)
    }
}

pub async fn seed_user(pool: &DatabaseConnection, uid: &str, tier: Tier) -> user_entity::Model {
    let now = Utc::now();
    user_entity::ActiveModel {
        uid: Set(uid.to_string()),
        email: Set(format!("{uid}@example.com")),
        display_name: Set(format!("User {uid}")),
        avatar_url: Set(None),
        tier: Set(tier),
        messages_used_today: Set(0),
        total_messages: Set(0),
        last_reset_date: Set(Some(now.date_naive())),
        is_banned: Set(false),
        ban_reason: Set(None),
        subscription_id: Set(None),
        created_at: Set(now),
        last_active_at: Set(now),
    }
    .insert(pool)
    .await
    .expect("seed user")
}

pub async fn seed_plan(
    pool: &DatabaseConnection,
    id: &str,
    tier: Tier,
    price: i64,
    messages_per_day: i32,
) -> plan_entity::Model {
    let now = Utc::now();
    plan_entity::ActiveModel {
        id: Set(id.to_string()),
        name: Set(format!("Plan {id}")),
        tier: Set(tier),
        price: Set(price),
        currency: Set("NGN".to_string()),
        interval: Set(BillingInterval::Monthly),
        features: Set(serde_json::json!(["Priority support"])),
        messages_per_day: Set(messages_per_day),
        can_upload_images: Set(true),
        can_upload_files: Set(false),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(pool)
    .await
    .expect("seed plan")
}

pub async fn seed_subscription(
    pool: &DatabaseConnection,
    id: &str,
    uid: &str,
    tier: Tier,
    status: crate::entities::SubscriptionStatus,
    end_date: DateTime<Utc>,
) -> subscription_entity::Model {
    let now = Utc::now();
    subscription_entity::ActiveModel {
        id: Set(id.to_string()),
        user_id: Set(uid.to_string()),
        plan_id: Set("plan".to_string()),
        plan_name: Set("Premium".to_string()),
        tier: Set(tier),
        status: Set(status),
        payment_reference: Set(None),
        amount: Set(500_000),
        currency: Set("NGN".to_string()),
        messages_per_day: Set(50),
        can_upload_images: Set(true),
        can_upload_files: Set(true),
        start_date: Set(now - chrono::Duration::days(1)),
        end_date: Set(end_date),
        auto_renew: Set(true),
        cancelled_at: Set(None),
        created_at: Set(now),
    }
    .insert(pool)
    .await
    .expect("seed subscription")
}
