use crate::entities::{
    SubscriptionStatus, TransactionStatus, plan_entity, subscription_entity, transaction_entity,
    user_entity,
};
use crate::error::{AppError, AppResult};
use crate::external::{
    CHARGE_SUCCESS_EVENT, InitializeTransaction, PaymentGateway, TransactionMetadata, WebhookEvent,
};
use crate::models::{AuthUser, InitPaymentResponse, SubscriptionResponse};
use crate::utils::{generate_payment_reference, new_id};
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    IntoActiveModel, QueryFilter, Set, TransactionTrait, sea_query::Expr,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct PaymentService {
    pool: DatabaseConnection,
    gateway: Arc<dyn PaymentGateway>,
    default_callback_url: String,
}

impl PaymentService {
    pub fn new(
        pool: DatabaseConnection,
        gateway: Arc<dyn PaymentGateway>,
        default_callback_url: String,
    ) -> Self {
        Self {
            pool,
            gateway,
            default_callback_url,
        }
    }

    pub fn public_key(&self) -> String {
        self.gateway.public_key()
    }

    /// 发起支付：网关接受后才记录 Pending 交易
    pub async fn initialize(
        &self,
        user: &AuthUser,
        plan_id: &str,
        callback_url: Option<String>,
    ) -> AppResult<InitPaymentResponse> {
        let email = user
            .email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| {
                AppError::ValidationError("An email address is required for payment".to_string())
            })?;

        let plan = plan_entity::Entity::find_by_id(plan_id.to_string())
            .one(&self.pool)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))?;

        let reference = generate_payment_reference();
        let callback_url = callback_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| self.default_callback_url.clone());

        let initialized = self
            .gateway
            .initialize(&InitializeTransaction {
                email: email.to_string(),
                amount: plan.price.to_string(),
                currency: plan.currency.clone(),
                reference: reference.clone(),
                callback_url,
                metadata: TransactionMetadata {
                    user_id: user.uid.clone(),
                    plan_id: plan.id.clone(),
                    plan_name: plan.name.clone(),
                },
            })
            .await?;

        transaction_entity::ActiveModel {
            reference: Set(reference.clone()),
            user_id: Set(user.uid.clone()),
            plan_id: Set(plan.id.clone()),
            amount: Set(plan.price),
            currency: Set(plan.currency),
            status: Set(TransactionStatus::Pending),
            created_at: Set(Utc::now()),
            verified_at: Set(None),
        }
        .insert(&self.pool)
        .await?;

        log::info!(
            "Payment {reference} initialized for {} on plan {}",
            user.uid,
            plan.id
        );
        Ok(InitPaymentResponse {
            authorization_url: initialized.authorization_url,
            reference,
        })
    }

    /// 校验支付结果并开通订阅；同一 reference 重复校验返回同一订阅
    pub async fn verify(&self, uid: &str, reference: &str) -> AppResult<SubscriptionResponse> {
        let tx = transaction_entity::Entity::find_by_id(reference.to_string())
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Transaction not found".to_string()))?;

        if tx.user_id != uid {
            log::warn!("User {uid} tried to verify transaction {reference} of {}", tx.user_id);
            return Err(AppError::Forbidden(
                "Transaction does not belong to this user".to_string(),
            ));
        }

        if tx.status == TransactionStatus::Success {
            return self.existing_subscription(reference).await;
        }

        let verified = self.gateway.verify(reference).await?;
        if !verified.is_success() || verified.amount != tx.amount {
            log::warn!(
                "Payment {reference} not accepted: status={}, amount={} (expected {})",
                verified.status,
                verified.amount,
                tx.amount
            );
            self.mark_failed(tx).await?;
            return Err(AppError::ValidationError(
                "Payment verification failed".to_string(),
            ));
        }

        self.activate(reference).await
    }

    /// 处理 Paystack webhook；签名错误返回 401
    pub async fn handle_webhook(&self, body: &[u8], signature: &str) -> AppResult<()> {
        if !self.gateway.verify_webhook(body, signature) {
            log::warn!("Rejected webhook with invalid signature");
            return Err(AppError::AuthError("Invalid signature".to_string()));
        }

        let event: WebhookEvent = serde_json::from_slice(body)
            .map_err(|e| AppError::ValidationError(format!("Invalid webhook payload: {e}")))?;

        if event.event != CHARGE_SUCCESS_EVENT {
            log::debug!("Ignoring webhook event {}", event.event);
            return Ok(());
        }

        let reference = event.data.reference;
        let Some(tx) = transaction_entity::Entity::find_by_id(reference.clone())
            .one(&self.pool)
            .await?
        else {
            log::warn!("Webhook for unknown transaction {reference}");
            return Ok(());
        };

        if tx.status == TransactionStatus::Success {
            return Ok(());
        }
        if event.data.amount != tx.amount {
            log::warn!(
                "Webhook amount mismatch for {reference}: {} (expected {})",
                event.data.amount,
                tx.amount
            );
            self.mark_failed(tx).await?;
            return Ok(());
        }

        self.activate(&reference).await?;
        Ok(())
    }

    async fn existing_subscription(&self, reference: &str) -> AppResult<SubscriptionResponse> {
        subscription_entity::Entity::find()
            .filter(subscription_entity::Column::PaymentReference.eq(reference))
            .one(&self.pool)
            .await?
            .map(Into::into)
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))
    }

    async fn mark_failed(&self, tx: transaction_entity::Model) -> AppResult<()> {
        let mut am = tx.into_active_model();
        am.status = Set(TransactionStatus::Failed);
        am.verified_at = Set(Some(Utc::now()));
        am.update(&self.pool).await?;
        Ok(())
    }

    /// 开通订阅：交易置为 Success、写订阅、更新用户，在同一个事务内完成
    async fn activate(&self, reference: &str) -> AppResult<SubscriptionResponse> {
        let txn = self.pool.begin().await?;
        let subscription = activate_in(&txn, reference).await?;
        txn.commit().await?;
        Ok(subscription.into())
    }
}

async fn activate_in(
    txn: &DatabaseTransaction,
    reference: &str,
) -> AppResult<subscription_entity::Model> {
    let tx = transaction_entity::Entity::find_by_id(reference.to_string())
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Transaction not found".to_string()))?;

    let plan = plan_entity::Entity::find_by_id(tx.plan_id.clone())
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))?;

    // 条件翻转：只有把交易从非 Success 改成 Success 的那一方继续开通
    let now = Utc::now();
    let flipped = transaction_entity::Entity::update_many()
        .col_expr(
            transaction_entity::Column::Status,
            Expr::value(TransactionStatus::Success),
        )
        .col_expr(transaction_entity::Column::VerifiedAt, Expr::value(Some(now)))
        .filter(transaction_entity::Column::Reference.eq(reference))
        .filter(transaction_entity::Column::Status.ne(TransactionStatus::Success))
        .exec(txn)
        .await?
        .rows_affected;

    if flipped == 0
        && let Some(existing) = subscription_entity::Entity::find()
            .filter(subscription_entity::Column::PaymentReference.eq(reference))
            .one(txn)
            .await?
    {
        log::debug!("Payment {reference} already activated as {}", existing.id);
        return Ok(existing);
    }

    let user_id = tx.user_id.clone();
    let amount = tx.amount;
    let currency = tx.currency.clone();

    let subscription = subscription_entity::ActiveModel {
        id: Set(new_id()),
        user_id: Set(user_id.clone()),
        plan_id: Set(plan.id.clone()),
        plan_name: Set(plan.name.clone()),
        tier: Set(plan.tier),
        status: Set(SubscriptionStatus::Active),
        payment_reference: Set(Some(reference.to_string())),
        amount: Set(amount),
        currency: Set(currency),
        messages_per_day: Set(plan.messages_per_day),
        can_upload_images: Set(plan.can_upload_images),
        can_upload_files: Set(plan.can_upload_files),
        start_date: Set(now),
        end_date: Set(now + Duration::days(plan.interval.duration_days())),
        auto_renew: Set(true),
        cancelled_at: Set(None),
        created_at: Set(now),
    }
    .insert(txn)
    .await?;

    if let Some(user) = user_entity::Entity::find_by_id(user_id.clone())
        .one(txn)
        .await?
    {
        let mut am = user.into_active_model();
        am.tier = Set(plan.tier);
        am.subscription_id = Set(Some(subscription.id.clone()));
        am.update(txn).await?;
    } else {
        log::warn!("Activated subscription {} for missing profile {user_id}", subscription.id);
    }

    log::info!(
        "Subscription {} activated for {user_id} on {} until {}",
        subscription.id,
        plan.id,
        subscription.end_date
    );
    Ok(subscription)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::create_test_pool;
    use crate::entities::Tier;
    use crate::test_support::{StubGateway, WEBHOOK_SECRET, auth_user, seed_plan, seed_user};
    use ring::hmac;
    use sea_orm::PaginatorTrait;

    async fn service(gateway: StubGateway) -> (PaymentService, Arc<StubGateway>) {
        let pool = create_test_pool().await;
        let gateway = Arc::new(gateway);
        let svc = PaymentService::new(pool, gateway.clone(), "https://app.test/done".to_string());
        (svc, gateway)
    }

    fn sign(body: &[u8]) -> String {
        let key = hmac::Key::new(hmac::HMAC_SHA512, WEBHOOK_SECRET.as_bytes());
        hex::encode(hmac::sign(&key, body).as_ref())
    }

    async fn transaction(svc: &PaymentService, reference: &str) -> transaction_entity::Model {
        transaction_entity::Entity::find_by_id(reference.to_string())
            .one(&svc.pool)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_initialize_records_pending_transaction() {
        let (svc, gateway) = service(StubGateway::default()).await;
        seed_plan(&svc.pool, "pro", Tier::Pro, 500_000, 100).await;

        let res = svc.initialize(&auth_user("u1"), "pro", None).await.unwrap();
        assert!(res.reference.starts_with("zlma_"));
        assert!(res.authorization_url.ends_with(&res.reference));

        let tx = transaction(&svc, &res.reference).await;
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.amount, 500_000);

        let sent = gateway.initialized.lock().unwrap();
        assert_eq!(sent[0].amount, "500000");
        assert_eq!(sent[0].callback_url, "https://app.test/done");
        assert_eq!(sent[0].metadata.plan_id, "pro");
    }

    #[tokio::test]
    async fn test_initialize_rejections() {
        let (svc, _) = service(StubGateway::rejecting()).await;
        seed_plan(&svc.pool, "pro", Tier::Pro, 500_000, 100).await;

        let mut no_email = auth_user("u1");
        no_email.email = None;
        assert!(matches!(
            svc.initialize(&no_email, "pro", None).await,
            Err(AppError::ValidationError(_))
        ));
        assert!(matches!(
            svc.initialize(&auth_user("u1"), "missing", None).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            svc.initialize(&auth_user("u1"), "pro", None).await,
            Err(AppError::ExternalApiError(_))
        ));
        let count = transaction_entity::Entity::find().count(&svc.pool).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_verify_activates_once() {
        let (svc, gateway) = service(StubGateway::default()).await;
        seed_user(&svc.pool, "u1", Tier::Free).await;
        seed_plan(&svc.pool, "pro", Tier::Pro, 500_000, 100).await;
        let init = svc.initialize(&auth_user("u1"), "pro", None).await.unwrap();
        gateway.set_verified(&init.reference, "success", 500_000);

        let first = svc.verify("u1", &init.reference).await.unwrap();
        assert_eq!(first.status, SubscriptionStatus::Active);
        assert_eq!(first.tier, Tier::Pro);
        assert_eq!(first.messages_per_day, 100);
        assert_eq!(first.end_date - first.start_date, 30 * 24 * 3600 * 1000);

        let second = svc.verify("u1", &init.reference).await.unwrap();
        assert_eq!(first.id, second.id);
        let subs = subscription_entity::Entity::find().count(&svc.pool).await.unwrap();
        assert_eq!(subs, 1);

        let user = user_entity::Entity::find_by_id("u1".to_string())
            .one(&svc.pool)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.tier, Tier::Pro);
        assert_eq!(user.subscription_id, Some(first.id));
    }

    #[tokio::test]
    async fn test_activate_after_success_reuses_subscription() {
        let (svc, _) = service(StubGateway::default()).await;
        seed_user(&svc.pool, "u1", Tier::Free).await;
        seed_plan(&svc.pool, "pro", Tier::Pro, 500_000, 100).await;
        let init = svc.initialize(&auth_user("u1"), "pro", None).await.unwrap();

        // verify 与 webhook 都读到了 Pending，先后进入开通
        let first = svc.activate(&init.reference).await.unwrap();
        assert_eq!(
            transaction(&svc, &init.reference).await.status,
            TransactionStatus::Success
        );
        let second = svc.activate(&init.reference).await.unwrap();
        assert_eq!(first.id, second.id);

        let subs = subscription_entity::Entity::find().count(&svc.pool).await.unwrap();
        assert_eq!(subs, 1);
    }

    #[tokio::test]
    async fn test_payment_reference_is_unique() {
        let (svc, _) = service(StubGateway::default()).await;
        seed_user(&svc.pool, "u1", Tier::Free).await;
        seed_plan(&svc.pool, "pro", Tier::Pro, 500_000, 100).await;
        let init = svc.initialize(&auth_user("u1"), "pro", None).await.unwrap();
        let first = svc.activate(&init.reference).await.unwrap();

        let stored = subscription_entity::Entity::find_by_id(first.id)
            .one(&svc.pool)
            .await
            .unwrap()
            .unwrap();
        let mut dup = stored.into_active_model().reset_all();
        dup.id = Set(new_id());
        assert!(dup.insert(&svc.pool).await.is_err());
    }

    #[tokio::test]
    async fn test_verify_foreign_and_missing() {
        let (svc, gateway) = service(StubGateway::default()).await;
        seed_plan(&svc.pool, "pro", Tier::Pro, 500_000, 100).await;
        let init = svc.initialize(&auth_user("u1"), "pro", None).await.unwrap();
        gateway.set_verified(&init.reference, "success", 500_000);

        assert!(matches!(
            svc.verify("u2", &init.reference).await,
            Err(AppError::Forbidden(_))
        ));
        // 被拒绝的请求不能改动交易
        assert_eq!(
            transaction(&svc, &init.reference).await.status,
            TransactionStatus::Pending
        );
        assert!(matches!(
            svc.verify("u1", "zlma_unknown").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_amount_mismatch_fails_transaction() {
        let (svc, gateway) = service(StubGateway::default()).await;
        seed_user(&svc.pool, "u1", Tier::Free).await;
        seed_plan(&svc.pool, "pro", Tier::Pro, 500_000, 100).await;
        let init = svc.initialize(&auth_user("u1"), "pro", None).await.unwrap();
        gateway.set_verified(&init.reference, "success", 100);

        assert!(matches!(
            svc.verify("u1", &init.reference).await,
            Err(AppError::ValidationError(_))
        ));
        assert_eq!(
            transaction(&svc, &init.reference).await.status,
            TransactionStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_webhook_signature_and_activation() {
        let (svc, _) = service(StubGateway::default()).await;
        seed_user(&svc.pool, "u1", Tier::Free).await;
        seed_plan(&svc.pool, "pro", Tier::Pro, 500_000, 100).await;
        let init = svc.initialize(&auth_user("u1"), "pro", None).await.unwrap();

        let body = format!(
            r#"{{"event":"charge.success","data":{{"reference":"{}","amount":500000,"status":"success"}}}}"#,
            init.reference
        );
        assert!(matches!(
            svc.handle_webhook(body.as_bytes(), "deadbeef").await,
            Err(AppError::AuthError(_))
        ));

        let sig = sign(body.as_bytes());
        svc.handle_webhook(body.as_bytes(), &sig).await.unwrap();
        svc.handle_webhook(body.as_bytes(), &sig).await.unwrap();

        assert_eq!(
            transaction(&svc, &init.reference).await.status,
            TransactionStatus::Success
        );
        let subs = subscription_entity::Entity::find().count(&svc.pool).await.unwrap();
        assert_eq!(subs, 1);

        // webhook 开通后，客户端 verify 仍返回同一订阅
        let verified = svc.verify("u1", &init.reference).await.unwrap();
        assert_eq!(verified.payment_reference.as_deref(), Some(init.reference.as_str()));
    }

    #[tokio::test]
    async fn test_webhook_other_events_acknowledged() {
        let (svc, _) = service(StubGateway::default()).await;
        let body = br#"{"event":"subscription.disable","data":{"reference":"x"}}"#;
        svc.handle_webhook(body, &sign(body)).await.unwrap();
    }
}
