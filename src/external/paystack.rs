use crate::config::PaystackConfig;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use ring::hmac;
use serde::{Deserialize, Serialize};

/// 支付网关：初始化交易、查询交易结果、校验 webhook 签名
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, request: &InitializeTransaction) -> AppResult<InitializedTransaction>;
    async fn verify(&self, reference: &str) -> AppResult<VerifiedTransaction>;
    fn public_key(&self) -> String;
    fn verify_webhook(&self, body: &[u8], signature: &str) -> bool;
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionMetadata {
    pub user_id: String,
    pub plan_id: String,
    pub plan_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializeTransaction {
    pub email: String,
    /// 最小货币单位，Paystack 接受字符串
    pub amount: String,
    pub currency: String,
    pub reference: String,
    pub callback_url: String,
    pub metadata: TransactionMetadata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitializedTransaction {
    pub authorization_url: String,
    #[serde(default)]
    pub access_code: Option<String>,
    pub reference: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifiedTransaction {
    pub status: String,
    pub reference: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub paid_at: Option<String>,
}

impl VerifiedTransaction {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub reference: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub status: Option<String>,
}

pub const CHARGE_SUCCESS_EVENT: &str = "charge.success";

/// x-paystack-signature = hex(HMAC-SHA512(body, secret_key))，常量时间比较
///
/// 未配置密钥时一律拒绝
pub fn verify_webhook_signature(secret_key: &str, body: &[u8], signature: &str) -> bool {
    if secret_key.is_empty() {
        return false;
    }
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let key = hmac::Key::new(hmac::HMAC_SHA512, secret_key.as_bytes());
    hmac::verify(&key, body, &expected).is_ok()
}

pub struct PaystackClient {
    client: Client,
    config: PaystackConfig,
}

impl PaystackClient {
    pub fn new(config: PaystackConfig) -> Self {
        if config.secret_key.is_empty() {
            log::warn!("PAYSTACK_SECRET_KEY is not set, all webhooks will be rejected");
        }
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn unwrap_envelope<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
        action: &str,
    ) -> AppResult<T> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApiError(format!(
                "Paystack {action} failed ({status}): {error_text}"
            )));
        }
        let envelope: Envelope<T> = response.json().await?;
        match envelope.data {
            Some(data) if envelope.status => Ok(data),
            _ => Err(AppError::ExternalApiError(format!(
                "Paystack {action} rejected: {}",
                envelope.message
            ))),
        }
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    async fn initialize(&self, request: &InitializeTransaction) -> AppResult<InitializedTransaction> {
        let url = format!("{}/transaction/initialize", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .json(request)
            .send()
            .await?;
        Self::unwrap_envelope(response, "initialize").await
    }

    async fn verify(&self, reference: &str) -> AppResult<VerifiedTransaction> {
        let url = format!("{}/transaction/verify/{reference}", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.secret_key)
            .send()
            .await?;
        Self::unwrap_envelope(response, "verify").await
    }

    fn public_key(&self) -> String {
        self.config.public_key.clone()
    }

    fn verify_webhook(&self, body: &[u8], signature: &str) -> bool {
        verify_webhook_signature(&self.config.secret_key, body, signature)
    }
}
