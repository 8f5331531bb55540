use crate::entities::{
    SubscriptionStatus, Tier, plan_entity, subscription_entity, user_entity,
};
use crate::error::{AppError, AppResult};
use crate::models::{
    SavePlanRequest, SubscriptionPlanResponse, SubscriptionResponse, SubscriptionStatusResponse,
    SystemSettings,
};
use crate::services::SettingsService;
use crate::utils::{new_id, today_utc};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

/// 按等级计算日配额：Free 读系统设置，其余取等级默认值
pub fn daily_limit_for_tier(tier: Tier, settings: &SystemSettings) -> i32 {
    match tier {
        Tier::Free => settings.free_tier_daily_limit,
        other => other.default_daily_limit(),
    }
}

#[derive(Clone)]
pub struct SubscriptionService {
    pool: DatabaseConnection,
    settings: SettingsService,
}

impl SubscriptionService {
    pub fn new(pool: DatabaseConnection, settings: SettingsService) -> Self {
        Self { pool, settings }
    }

    /// 订阅权益状态；没有资料时返回 Free 默认值
    pub async fn status(&self, uid: &str) -> AppResult<SubscriptionStatusResponse> {
        let settings = self.settings.get().await?;
        // 先做过期处理，再读取用户（等级可能刚被重置）
        let subscription = self.current_subscription(uid).await?;
        let user = user_entity::Entity::find_by_id(uid.to_string())
            .one(&self.pool)
            .await?;

        let Some(user) = user else {
            return Ok(SubscriptionStatusResponse {
                tier: Tier::Free,
                is_subscribed: false,
                can_chat: true,
                can_upload_images: false,
                can_upload_files: false,
                messages_per_day: daily_limit_for_tier(Tier::Free, &settings),
                messages_used_today: 0,
                subscription_end_date: None,
                plan_name: None,
            });
        };

        let used = user.used_today(today_utc());

        Ok(match subscription {
            Some(sub) => SubscriptionStatusResponse {
                tier: sub.tier,
                is_subscribed: true,
                can_chat: !user.is_banned && used < sub.messages_per_day,
                can_upload_images: sub.can_upload_images,
                can_upload_files: sub.can_upload_files,
                messages_per_day: sub.messages_per_day,
                messages_used_today: used,
                subscription_end_date: Some(sub.end_date.timestamp_millis()),
                plan_name: Some(sub.plan_name),
            },
            None => {
                let limit = daily_limit_for_tier(user.tier, &settings);
                SubscriptionStatusResponse {
                    tier: user.tier,
                    is_subscribed: false,
                    can_chat: !user.is_banned && used < limit,
                    can_upload_images: false,
                    can_upload_files: false,
                    messages_per_day: limit,
                    messages_used_today: used,
                    subscription_end_date: None,
                    plan_name: None,
                }
            }
        })
    }

    /// 当前有效订阅；顺带把已到期的订阅标记为 Expired
    pub async fn current_subscription(
        &self,
        uid: &str,
    ) -> AppResult<Option<subscription_entity::Model>> {
        self.expire_for_user(uid).await?;

        let now = Utc::now();
        Ok(subscription_entity::Entity::find()
            .filter(subscription_entity::Column::UserId.eq(uid))
            .filter(
                subscription_entity::Column::Status
                    .is_in([SubscriptionStatus::Active, SubscriptionStatus::Cancelled]),
            )
            .filter(subscription_entity::Column::EndDate.gt(now))
            .order_by_desc(subscription_entity::Column::EndDate)
            .one(&self.pool)
            .await?)
    }

    pub async fn cancel(&self, uid: &str) -> AppResult<SubscriptionResponse> {
        let sub = self
            .current_subscription(uid)
            .await?
            .ok_or_else(|| AppError::NotFound("No active subscription found".to_string()))?;

        if sub.status == SubscriptionStatus::Cancelled {
            return Ok(sub.into());
        }

        let mut am = sub.into_active_model();
        am.status = Set(SubscriptionStatus::Cancelled);
        am.auto_renew = Set(false);
        am.cancelled_at = Set(Some(Utc::now()));
        let updated = am.update(&self.pool).await?;

        log::info!(
            "Subscription {} of {uid} cancelled, active until {}",
            updated.id,
            updated.end_date
        );
        Ok(updated.into())
    }

    pub async fn active_plans(&self) -> AppResult<Vec<SubscriptionPlanResponse>> {
        let plans = plan_entity::Entity::find()
            .filter(plan_entity::Column::IsActive.eq(true))
            .order_by_asc(plan_entity::Column::Price)
            .all(&self.pool)
            .await?;
        Ok(plans.into_iter().map(Into::into).collect())
    }

    pub async fn all_plans(&self) -> AppResult<Vec<SubscriptionPlanResponse>> {
        let plans = plan_entity::Entity::find()
            .order_by_asc(plan_entity::Column::Price)
            .all(&self.pool)
            .await?;
        Ok(plans.into_iter().map(Into::into).collect())
    }

    pub async fn find_plan(&self, plan_id: &str) -> AppResult<Option<plan_entity::Model>> {
        Ok(plan_entity::Entity::find_by_id(plan_id.to_string())
            .one(&self.pool)
            .await?)
    }

    /// id 为空时新建，否则按 id 覆盖
    pub async fn save_plan(&self, req: SavePlanRequest) -> AppResult<SubscriptionPlanResponse> {
        if req.name.trim().is_empty() {
            return Err(AppError::ValidationError("Plan name is required".to_string()));
        }
        if req.price < 0 || req.messages_per_day < 0 {
            return Err(AppError::ValidationError(
                "Price and messagesPerDay must not be negative".to_string(),
            ));
        }

        let now = Utc::now();
        let features = serde_json::to_value(&req.features)?;
        let id = req
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        let existing = match &id {
            Some(id) => self.find_plan(id).await?,
            None => None,
        };

        let saved = match existing {
            Some(plan) => {
                let mut am = plan.into_active_model();
                am.name = Set(req.name.trim().to_string());
                am.tier = Set(req.tier);
                am.price = Set(req.price);
                am.currency = Set(req.currency);
                am.interval = Set(req.interval);
                am.features = Set(features);
                am.messages_per_day = Set(req.messages_per_day);
                am.can_upload_images = Set(req.can_upload_images);
                am.can_upload_files = Set(req.can_upload_files);
                am.is_active = Set(req.is_active);
                am.updated_at = Set(now);
                am.update(&self.pool).await?
            }
            None => {
                plan_entity::ActiveModel {
                    id: Set(id.unwrap_or_else(new_id)),
                    name: Set(req.name.trim().to_string()),
                    tier: Set(req.tier),
                    price: Set(req.price),
                    currency: Set(req.currency),
                    interval: Set(req.interval),
                    features: Set(features),
                    messages_per_day: Set(req.messages_per_day),
                    can_upload_images: Set(req.can_upload_images),
                    can_upload_files: Set(req.can_upload_files),
                    is_active: Set(req.is_active),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&self.pool)
                .await?
            }
        };

        log::info!("Saved plan {} ({})", saved.id, saved.name);
        Ok(saved.into())
    }

    pub async fn delete_plan(&self, plan_id: &str) -> AppResult<()> {
        let result = plan_entity::Entity::delete_by_id(plan_id.to_string())
            .exec(&self.pool)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound("Plan not found".to_string()));
        }
        log::info!("Deleted plan {plan_id}");
        Ok(())
    }

    pub async fn all_subscriptions(&self) -> AppResult<Vec<SubscriptionResponse>> {
        let subs = subscription_entity::Entity::find()
            .order_by_desc(subscription_entity::Column::CreatedAt)
            .all(&self.pool)
            .await?;
        Ok(subs.into_iter().map(Into::into).collect())
    }

    /// 后台扫描：把所有到期订阅标记为 Expired，返回处理的用户数
    pub async fn expire_overdue(&self) -> AppResult<usize> {
        let user_ids: Vec<String> = subscription_entity::Entity::find()
            .select_only()
            .column(subscription_entity::Column::UserId)
            .distinct()
            .filter(
                subscription_entity::Column::Status
                    .is_in([SubscriptionStatus::Active, SubscriptionStatus::Cancelled]),
            )
            .filter(subscription_entity::Column::EndDate.lte(Utc::now()))
            .into_tuple()
            .all(&self.pool)
            .await?;

        for uid in &user_ids {
            self.expire_for_user(uid).await?;
        }
        Ok(user_ids.len())
    }

    async fn expire_for_user(&self, uid: &str) -> AppResult<()> {
        let txn = self.pool.begin().await?;
        let expired = expire_user_subscriptions(&txn, uid).await?;
        txn.commit().await?;
        if expired > 0 {
            log::info!("Expired {expired} subscription(s) of {uid}");
        }
        Ok(())
    }
}

/// 标记到期订阅；若已无有效订阅，用户回到 Free 并清空 subscription_id
async fn expire_user_subscriptions<C: ConnectionTrait>(conn: &C, uid: &str) -> AppResult<u64> {
    let now = Utc::now();
    let result = subscription_entity::Entity::update_many()
        .col_expr(
            subscription_entity::Column::Status,
            Expr::value(SubscriptionStatus::Expired),
        )
        .filter(subscription_entity::Column::UserId.eq(uid))
        .filter(
            subscription_entity::Column::Status
                .is_in([SubscriptionStatus::Active, SubscriptionStatus::Cancelled]),
        )
        .filter(subscription_entity::Column::EndDate.lte(now))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Ok(0);
    }

    let still_entitled = subscription_entity::Entity::find()
        .filter(subscription_entity::Column::UserId.eq(uid))
        .filter(
            subscription_entity::Column::Status
                .is_in([SubscriptionStatus::Active, SubscriptionStatus::Cancelled]),
        )
        .filter(subscription_entity::Column::EndDate.gt(now))
        .one(conn)
        .await?
        .is_some();

    if !still_entitled {
        user_entity::Entity::update_many()
            .col_expr(user_entity::Column::Tier, Expr::value(Tier::Free))
            .col_expr(
                user_entity::Column::SubscriptionId,
                Expr::value(Option::<String>::None),
            )
            .filter(user_entity::Column::Uid.eq(uid))
            .exec(conn)
            .await?;
    }
    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::create_test_pool;
    use crate::entities::BillingInterval;
    use crate::test_support::{seed_plan, seed_subscription, seed_user};
    use chrono::Duration;

    async fn service() -> SubscriptionService {
        let pool = create_test_pool().await;
        SubscriptionService::new(pool.clone(), SettingsService::new(pool))
    }

    async fn link(svc: &SubscriptionService, uid: &str, tier: Tier, sub_id: &str) {
        let user = user_entity::Entity::find_by_id(uid.to_string())
            .one(&svc.pool)
            .await
            .unwrap()
            .unwrap();
        let mut am = user.into_active_model();
        am.tier = Set(tier);
        am.subscription_id = Set(Some(sub_id.to_string()));
        am.update(&svc.pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_status_without_profile_is_free_default() {
        let svc = service().await;
        let status = svc.status("nobody").await.unwrap();
        assert_eq!(status.tier, Tier::Free);
        assert!(!status.is_subscribed);
        assert!(status.can_chat);
        assert_eq!(status.messages_per_day, 10);
    }

    #[tokio::test]
    async fn test_status_with_active_subscription() {
        let svc = service().await;
        seed_user(&svc.pool, "u1", Tier::Free).await;
        let end = Utc::now() + Duration::days(10);
        seed_subscription(&svc.pool, "s1", "u1", Tier::Pro, SubscriptionStatus::Active, end).await;
        link(&svc, "u1", Tier::Pro, "s1").await;

        let status = svc.status("u1").await.unwrap();
        assert!(status.is_subscribed);
        assert_eq!(status.tier, Tier::Pro);
        assert_eq!(status.messages_per_day, 50);
        assert!(status.can_upload_images);
        assert_eq!(status.plan_name.as_deref(), Some("Premium"));
    }

    #[tokio::test]
    async fn test_past_end_date_expires_on_read() {
        let svc = service().await;
        seed_user(&svc.pool, "u1", Tier::Free).await;
        let end = Utc::now() - Duration::hours(1);
        seed_subscription(&svc.pool, "s1", "u1", Tier::Pro, SubscriptionStatus::Active, end).await;
        link(&svc, "u1", Tier::Pro, "s1").await;

        let status = svc.status("u1").await.unwrap();
        assert!(!status.is_subscribed);
        assert_eq!(status.tier, Tier::Free);

        let sub = subscription_entity::Entity::find_by_id("s1".to_string())
            .one(&svc.pool)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Expired);

        let user = user_entity::Entity::find_by_id("u1".to_string())
            .one(&svc.pool)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.tier, Tier::Free);
        assert_eq!(user.subscription_id, None);
    }

    #[tokio::test]
    async fn test_cancel_keeps_access_until_end() {
        let svc = service().await;
        seed_user(&svc.pool, "u1", Tier::Free).await;
        let end = Utc::now() + Duration::days(5);
        seed_subscription(&svc.pool, "s1", "u1", Tier::Pro, SubscriptionStatus::Active, end).await;

        let cancelled = svc.cancel("u1").await.unwrap();
        assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
        assert!(!cancelled.auto_renew);
        assert!(cancelled.cancelled_at.is_some());

        let status = svc.status("u1").await.unwrap();
        assert!(status.is_subscribed);

        assert!(matches!(svc.cancel("u2").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_expire_overdue_sweep() {
        let svc = service().await;
        seed_user(&svc.pool, "u1", Tier::Free).await;
        seed_user(&svc.pool, "u2", Tier::Free).await;
        let past = Utc::now() - Duration::days(1);
        let future = Utc::now() + Duration::days(1);
        seed_subscription(&svc.pool, "s1", "u1", Tier::Pro, SubscriptionStatus::Cancelled, past).await;
        seed_subscription(&svc.pool, "s2", "u2", Tier::Pro, SubscriptionStatus::Active, future).await;

        assert_eq!(svc.expire_overdue().await.unwrap(), 1);
        assert_eq!(svc.expire_overdue().await.unwrap(), 0);
        assert!(svc.current_subscription("u2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_plan_crud() {
        let svc = service().await;
        seed_plan(&svc.pool, "pro", Tier::Pro, 500_000, 100).await;
        seed_plan(&svc.pool, "basic", Tier::Pro, 200_000, 50).await;

        let created = svc
            .save_plan(SavePlanRequest {
                id: None,
                name: "Enterprise".to_string(),
                tier: Tier::Enterprise,
                price: 2_000_000,
                currency: "NGN".to_string(),
                interval: BillingInterval::Yearly,
                features: vec!["Everything".to_string()],
                messages_per_day: 1000,
                can_upload_images: true,
                can_upload_files: true,
                is_active: false,
            })
            .await
            .unwrap();
        assert!(!created.id.is_empty());

        let active = svc.active_plans().await.unwrap();
        let ids: Vec<_> = active.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["basic", "pro"]);
        assert_eq!(svc.all_plans().await.unwrap().len(), 3);

        let updated = svc
            .save_plan(SavePlanRequest {
                id: Some("pro".to_string()),
                name: "Pro Monthly".to_string(),
                tier: Tier::Pro,
                price: 600_000,
                currency: "NGN".to_string(),
                interval: BillingInterval::Monthly,
                features: vec![],
                messages_per_day: 120,
                can_upload_images: true,
                can_upload_files: false,
                is_active: true,
            })
            .await
            .unwrap();
        assert_eq!(updated.name, "Pro Monthly");
        assert_eq!(updated.price, 600_000);

        svc.delete_plan("basic").await.unwrap();
        assert!(matches!(
            svc.delete_plan("basic").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_daily_limit_for_tier() {
        let settings = SystemSettings {
            free_tier_daily_limit: 3,
            ..SystemSettings::default()
        };
        assert_eq!(daily_limit_for_tier(Tier::Free, &settings), 3);
        assert_eq!(daily_limit_for_tier(Tier::Pro, &settings), 100);
        assert_eq!(daily_limit_for_tier(Tier::Enterprise, &settings), 1000);
    }
}
