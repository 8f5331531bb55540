//! 管理后台：统计、用户管理、分析与营收

use crate::entities::{
    SubscriptionStatus, Tier, TransactionStatus, conversation_entity, plan_entity,
    subscription_entity, transaction_entity, usage_log_entity, user_entity,
};
use crate::error::{AppError, AppResult};
use crate::external::IdentityProvider;
use crate::models::{
    AnalyticsData, DailyCount, DashboardStats, HourlyCount, ModelUsage, PaginatedResponse,
    PaginationParams, RevenueStats, SystemSettings, TierBreakdown, UsageLogEntry, UserDetails,
    UserProfileResponse,
};
use crate::services::{SettingsService, UserService};
use crate::utils::time::start_of_day;
use crate::utils::today_utc;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use sea_orm::sea_query::{Alias, Expr, SimpleExpr};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

const RECENT_USAGE_WINDOW: u64 = 100;
const TOP_MODELS: usize = 5;

#[derive(Debug, FromQueryResult)]
struct SumRow {
    total: Option<i64>,
}

/// 分析用的一条日志投影
#[derive(Debug, Clone, FromQueryResult)]
pub struct UsagePoint {
    pub user_id: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AdminService {
    pool: DatabaseConnection,
    identity: Arc<dyn IdentityProvider>,
    users: UserService,
    settings: SettingsService,
}

impl AdminService {
    pub fn new(
        pool: DatabaseConnection,
        identity: Arc<dyn IdentityProvider>,
        users: UserService,
        settings: SettingsService,
    ) -> Self {
        Self {
            pool,
            identity,
            users,
            settings,
        }
    }

    pub async fn stats(&self) -> AppResult<DashboardStats> {
        let now = Utc::now();
        let today = now.date_naive();
        let day_start = start_of_day(today);
        let week_ago = now - Duration::days(7);

        let total_users = user_entity::Entity::find().count(&self.pool).await?;
        let active_users_today = user_entity::Entity::find()
            .filter(user_entity::Column::LastActiveAt.gte(day_start))
            .count(&self.pool)
            .await?;
        let new_users_today = user_entity::Entity::find()
            .filter(user_entity::Column::CreatedAt.gte(day_start))
            .count(&self.pool)
            .await?;
        let new_users_this_week = user_entity::Entity::find()
            .filter(user_entity::Column::CreatedAt.gte(week_ago))
            .count(&self.pool)
            .await?;

        let total_messages = self
            .sum_users(Expr::col(user_entity::Column::TotalMessages).sum(), None)
            .await?;
        let messages_today = self
            .sum_users(
                Expr::col(user_entity::Column::MessagesUsedToday).sum(),
                Some(today),
            )
            .await?;

        let mut tier_breakdown = TierBreakdown::default();
        for tier in [Tier::Free, Tier::Pro, Tier::Enterprise] {
            let n = user_entity::Entity::find()
                .filter(user_entity::Column::Tier.eq(tier))
                .count(&self.pool)
                .await?;
            match tier {
                Tier::Free => tier_breakdown.free = n,
                Tier::Pro => tier_breakdown.pro = n,
                Tier::Enterprise => tier_breakdown.enterprise = n,
            }
        }

        Ok(DashboardStats {
            total_users,
            active_users_today,
            total_messages,
            messages_today: u64::try_from(messages_today).unwrap_or(0),
            new_users_today,
            new_users_this_week,
            tier_breakdown,
        })
    }

    // SUM(bigint) 在 Postgres 上是 numeric，统一转回 BIGINT
    async fn sum_users(&self, sum: SimpleExpr, reset_on: Option<NaiveDate>) -> AppResult<i64> {
        let mut query = user_entity::Entity::find()
            .select_only()
            .column_as(sum.cast_as(Alias::new("BIGINT")), "total");
        if let Some(date) = reset_on {
            query = query.filter(user_entity::Column::LastResetDate.eq(date));
        }
        let row = query.into_model::<SumRow>().one(&self.pool).await?;
        Ok(row.and_then(|r| r.total).unwrap_or(0))
    }

    pub async fn list_users(
        &self,
        params: &PaginationParams,
    ) -> AppResult<PaginatedResponse<UserProfileResponse>> {
        let page = params.get_page();
        let limit = params.get_limit();

        let paginator = user_entity::Entity::find()
            .order_by_desc(user_entity::Column::CreatedAt)
            .paginate(&self.pool, limit);
        let total = paginator.num_items().await?;
        let items = paginator
            .fetch_page(page - 1)
            .await?
            .into_iter()
            .map(UserProfileResponse::from)
            .collect();

        Ok(PaginatedResponse::new(items, page, limit, total))
    }

    pub async fn user_details(&self, uid: &str) -> AppResult<UserDetails> {
        let profile = self.users.get_profile(uid).await?;
        let conversations_count = conversation_entity::Entity::find()
            .filter(conversation_entity::Column::UserId.eq(uid))
            .count(&self.pool)
            .await?;
        let recent_tokens: Vec<i32> = usage_log_entity::Entity::find()
            .select_only()
            .column(usage_log_entity::Column::TotalTokens)
            .filter(usage_log_entity::Column::UserId.eq(uid))
            .order_by_desc(usage_log_entity::Column::CreatedAt)
            .limit(RECENT_USAGE_WINDOW)
            .into_tuple()
            .all(&self.pool)
            .await?;

        Ok(UserDetails {
            profile: profile.into(),
            conversations_count,
            recent_token_usage: recent_tokens.into_iter().map(i64::from).sum(),
        })
    }

    pub async fn set_admin(&self, uid: &str, is_admin: bool) -> AppResult<()> {
        self.identity.set_admin_claim(uid, is_admin).await
    }

    pub async fn set_tier(&self, uid: &str, tier: Tier) -> AppResult<UserProfileResponse> {
        Ok(self.users.set_tier(uid, tier).await?.into())
    }

    /// 封禁同时禁用身份提供方账号
    pub async fn ban_user(
        &self,
        uid: &str,
        banned: bool,
        reason: Option<String>,
    ) -> AppResult<UserProfileResponse> {
        let updated = self.users.set_banned(uid, banned, reason).await?;
        self.identity.set_disabled(uid, banned).await?;
        log::info!("User {uid} banned={banned}");
        Ok(updated.into())
    }

    pub async fn analytics(&self, period: Option<&str>) -> AppResult<AnalyticsData> {
        let period = period.unwrap_or("7d");
        let days = period_days(period)?;
        let today = today_utc();
        let since = start_of_day(today - Duration::days(days - 1));

        let points = usage_log_entity::Entity::find()
            .select_only()
            .column(usage_log_entity::Column::UserId)
            .column(usage_log_entity::Column::Model)
            .column(usage_log_entity::Column::CreatedAt)
            .filter(usage_log_entity::Column::CreatedAt.gte(since))
            .into_model::<UsagePoint>()
            .all(&self.pool)
            .await?;

        Ok(aggregate_analytics(period, days, today, &points))
    }

    pub async fn usage_logs(
        &self,
        params: &PaginationParams,
    ) -> AppResult<PaginatedResponse<UsageLogEntry>> {
        let page = params.get_page();
        let limit = params.get_limit();

        let paginator = usage_log_entity::Entity::find()
            .order_by_desc(usage_log_entity::Column::CreatedAt)
            .paginate(&self.pool, limit);
        let total = paginator.num_items().await?;
        let logs = paginator.fetch_page(page - 1).await?;

        let user_ids: HashSet<String> = logs.iter().map(|l| l.user_id.clone()).collect();
        let emails: HashMap<String, String> = if user_ids.is_empty() {
            HashMap::new()
        } else {
            user_entity::Entity::find()
                .filter(user_entity::Column::Uid.is_in(user_ids))
                .all(&self.pool)
                .await?
                .into_iter()
                .map(|u| (u.uid, u.email))
                .collect()
        };

        let items = logs
            .into_iter()
            .map(|l| UsageLogEntry {
                user_email: emails.get(&l.user_id).cloned(),
                id: l.id,
                user_id: l.user_id,
                model: l.model,
                prompt_tokens: l.prompt_tokens,
                completion_tokens: l.completion_tokens,
                total_tokens: l.total_tokens,
                timestamp: l.created_at.timestamp_millis(),
            })
            .collect();

        Ok(PaginatedResponse::new(items, page, limit, total))
    }

    pub async fn get_settings(&self) -> AppResult<SystemSettings> {
        self.settings.get().await
    }

    pub async fn update_settings(&self, settings: SystemSettings) -> AppResult<SystemSettings> {
        self.settings.update(settings).await
    }

    pub async fn revenue(&self) -> AppResult<RevenueStats> {
        let now = Utc::now();
        let month_start = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
            .map(start_of_day)
            .ok_or_else(|| AppError::InternalError("invalid month start".to_string()))?;

        let successful = transaction_entity::Entity::find()
            .filter(transaction_entity::Column::Status.eq(TransactionStatus::Success))
            .all(&self.pool)
            .await?;

        let plan_tiers: HashMap<String, Tier> = plan_entity::Entity::find()
            .all(&self.pool)
            .await?
            .into_iter()
            .map(|p| (p.id, p.tier))
            .collect();

        let mut total_revenue = 0i64;
        let mut revenue_this_month = 0i64;
        let mut revenue_by_tier: BTreeMap<String, i64> = BTreeMap::new();
        for tx in &successful {
            total_revenue += tx.amount;
            if tx.verified_at.unwrap_or(tx.created_at) >= month_start {
                revenue_this_month += tx.amount;
            }
            let tier = plan_tiers
                .get(&tx.plan_id)
                .map(|t| t.as_str())
                .unwrap_or("unknown");
            *revenue_by_tier.entry(tier.to_string()).or_default() += tx.amount;
        }

        let active_subscriptions = subscription_entity::Entity::find()
            .filter(
                subscription_entity::Column::Status
                    .is_in([SubscriptionStatus::Active, SubscriptionStatus::Cancelled]),
            )
            .filter(subscription_entity::Column::EndDate.gt(now))
            .count(&self.pool)
            .await?;

        Ok(RevenueStats {
            total_revenue,
            revenue_this_month,
            successful_transactions: successful.len() as u64,
            active_subscriptions,
            revenue_by_tier,
        })
    }
}

fn period_days(period: &str) -> AppResult<i64> {
    match period {
        "7d" => Ok(7),
        "30d" => Ok(30),
        "90d" => Ok(90),
        other => Err(AppError::ValidationError(format!(
            "Invalid period '{other}', expected 7d, 30d or 90d"
        ))),
    }
}

/// 按天、模型、小时聚合；没有数据的日期补 0
pub fn aggregate_analytics(
    period: &str,
    days: i64,
    today: NaiveDate,
    points: &[UsagePoint],
) -> AnalyticsData {
    let mut messages_by_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    let mut users_by_day: BTreeMap<NaiveDate, HashSet<&str>> = BTreeMap::new();
    let mut by_model: HashMap<&str, u64> = HashMap::new();
    let mut by_hour = [0u64; 24];

    for offset in (0..days).rev() {
        let date = today - Duration::days(offset);
        messages_by_day.insert(date, 0);
        users_by_day.insert(date, HashSet::new());
    }

    for point in points {
        let date = point.created_at.date_naive();
        if let Some(count) = messages_by_day.get_mut(&date) {
            *count += 1;
        }
        if let Some(users) = users_by_day.get_mut(&date) {
            users.insert(point.user_id.as_str());
        }
        *by_model.entry(point.model.as_str()).or_default() += 1;
        by_hour[point.created_at.hour() as usize] += 1;
    }

    let total = points.len() as u64;
    let mut models: Vec<(&str, u64)> = by_model.into_iter().collect();
    models.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let top_models = models
        .into_iter()
        .take(TOP_MODELS)
        .map(|(model, count)| ModelUsage {
            model: model.to_string(),
            count,
            percentage: if total == 0 {
                0.0
            } else {
                (count as f32 / total as f32 * 1000.0).round() / 10.0
            },
        })
        .collect();

    AnalyticsData {
        period: period.to_string(),
        daily_messages: messages_by_day
            .into_iter()
            .map(|(date, count)| DailyCount {
                date: date.to_string(),
                count,
            })
            .collect(),
        daily_users: users_by_day
            .into_iter()
            .map(|(date, users)| DailyCount {
                date: date.to_string(),
                count: users.len() as u64,
            })
            .collect(),
        top_models,
        peak_hours: by_hour
            .iter()
            .enumerate()
            .map(|(hour, count)| HourlyCount {
                hour: hour as u32,
                count: *count,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::create_test_pool;
    use crate::test_support::{StubIdentity, seed_plan, seed_user};
    use crate::utils::new_id;
    use sea_orm::{ActiveModelTrait, IntoActiveModel, Set};

    async fn service() -> (AdminService, Arc<StubIdentity>) {
        let pool = create_test_pool().await;
        let identity = Arc::new(StubIdentity::default());
        let users = UserService::new(pool.clone(), identity.clone());
        let settings = SettingsService::new(pool.clone());
        (
            AdminService::new(pool, identity.clone(), users, settings),
            identity,
        )
    }

    async fn log(pool: &DatabaseConnection, uid: &str, model: &str, tokens: i32) {
        usage_log_entity::ActiveModel {
            id: Set(new_id()),
            user_id: Set(uid.to_string()),
            model: Set(model.to_string()),
            prompt_tokens: Set(tokens / 2),
            completion_tokens: Set(tokens - tokens / 2),
            total_tokens: Set(tokens),
            created_at: Set(Utc::now()),
        }
        .insert(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_stats() {
        let (svc, _) = service().await;
        let u1 = seed_user(&svc.pool, "u1", Tier::Free).await;
        seed_user(&svc.pool, "u2", Tier::Pro).await;
        let mut am = u1.into_active_model();
        am.messages_used_today = Set(4);
        am.total_messages = Set(40);
        am.update(&svc.pool).await.unwrap();

        let stats = svc.stats().await.unwrap();
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.active_users_today, 2);
        assert_eq!(stats.new_users_this_week, 2);
        assert_eq!(stats.total_messages, 40);
        assert_eq!(stats.messages_today, 4);
        assert_eq!(
            stats.tier_breakdown,
            TierBreakdown {
                free: 1,
                pro: 1,
                enterprise: 0
            }
        );
    }

    #[tokio::test]
    async fn test_list_users_paginates() {
        let (svc, _) = service().await;
        for i in 0..5 {
            seed_user(&svc.pool, &format!("u{i}"), Tier::Free).await;
        }
        let page = svc
            .list_users(&PaginationParams::new(Some(2), Some(2)))
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items.len(), 2);
    }

    #[tokio::test]
    async fn test_ban_disables_identity() {
        let (svc, identity) = service().await;
        seed_user(&svc.pool, "u1", Tier::Free).await;

        let banned = svc
            .ban_user("u1", true, Some("abuse".to_string()))
            .await
            .unwrap();
        assert!(banned.is_banned);
        assert_eq!(banned.ban_reason.as_deref(), Some("abuse"));

        let unbanned = svc.ban_user("u1", false, None).await.unwrap();
        assert!(!unbanned.is_banned);
        assert_eq!(
            identity.recorded(),
            vec!["disabled:u1:true".to_string(), "disabled:u1:false".to_string()]
        );

        svc.set_admin("u1", true).await.unwrap();
        assert!(identity.recorded().contains(&"admin:u1:true".to_string()));
    }

    #[tokio::test]
    async fn test_user_details_and_logs() {
        let (svc, _) = service().await;
        seed_user(&svc.pool, "u1", Tier::Free).await;
        log(&svc.pool, "u1", "openai/gpt-4o", 100).await;
        log(&svc.pool, "u1", "openai/gpt-4o-mini", 20).await;
        log(&svc.pool, "gone", "openai/gpt-4o", 5).await;

        let details = svc.user_details("u1").await.unwrap();
        assert_eq!(details.recent_token_usage, 120);
        assert_eq!(details.conversations_count, 0);

        let logs = svc.usage_logs(&PaginationParams::default()).await.unwrap();
        assert_eq!(logs.total, 3);
        let orphan = logs.items.iter().find(|l| l.user_id == "gone").unwrap();
        assert_eq!(orphan.user_email, None);
        let own = logs.items.iter().find(|l| l.user_id == "u1").unwrap();
        assert_eq!(own.user_email.as_deref(), Some("u1@example.com"));
    }

    #[tokio::test]
    async fn test_analytics_period_validation() {
        let (svc, _) = service().await;
        seed_user(&svc.pool, "u1", Tier::Free).await;
        log(&svc.pool, "u1", "openai/gpt-4o", 10).await;

        let data = svc.analytics(Some("30d")).await.unwrap();
        assert_eq!(data.daily_messages.len(), 30);
        assert_eq!(data.daily_messages.last().unwrap().count, 1);
        assert_eq!(data.peak_hours.len(), 24);

        assert!(matches!(
            svc.analytics(Some("1y")).await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn test_aggregate_analytics() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let at = |d: u32, h: u32| {
            NaiveDate::from_ymd_opt(2025, 3, d)
                .unwrap()
                .and_hms_opt(h, 0, 0)
                .unwrap()
                .and_utc()
        };
        let point = |uid: &str, model: &str, ts| UsagePoint {
            user_id: uid.to_string(),
            model: model.to_string(),
            created_at: ts,
        };
        let points = vec![
            point("a", "m1", at(10, 9)),
            point("a", "m1", at(10, 9)),
            point("b", "m2", at(9, 14)),
            point("c", "m1", at(8, 9)),
        ];

        let data = aggregate_analytics("7d", 7, today, &points);
        assert_eq!(data.daily_messages.len(), 7);
        assert_eq!(data.daily_messages[0].date, "2025-03-04");
        assert_eq!(data.daily_messages[6].count, 2);
        assert_eq!(data.daily_users[6].count, 1);
        assert_eq!(data.top_models[0].model, "m1");
        assert_eq!(data.top_models[0].count, 3);
        assert_eq!(data.top_models[0].percentage, 75.0);
        assert_eq!(data.peak_hours[9].count, 3);
        assert_eq!(data.peak_hours[14].count, 1);
    }

    #[tokio::test]
    async fn test_revenue() {
        let (svc, _) = service().await;
        seed_plan(&svc.pool, "pro", Tier::Pro, 500_000, 100).await;
        for (reference, status) in [
            ("r1", TransactionStatus::Success),
            ("r2", TransactionStatus::Success),
            ("r3", TransactionStatus::Failed),
        ] {
            transaction_entity::ActiveModel {
                reference: Set(reference.to_string()),
                user_id: Set("u1".to_string()),
                plan_id: Set(if reference == "r2" { "deleted" } else { "pro" }.to_string()),
                amount: Set(500_000),
                currency: Set("NGN".to_string()),
                status: Set(status),
                created_at: Set(Utc::now()),
                verified_at: Set(Some(Utc::now())),
            }
            .insert(&svc.pool)
            .await
            .unwrap();
        }

        let revenue = svc.revenue().await.unwrap();
        assert_eq!(revenue.total_revenue, 1_000_000);
        assert_eq!(revenue.revenue_this_month, 1_000_000);
        assert_eq!(revenue.successful_transactions, 2);
        assert_eq!(revenue.active_subscriptions, 0);
        assert_eq!(revenue.revenue_by_tier.get("pro"), Some(&500_000));
        assert_eq!(revenue.revenue_by_tier.get("unknown"), Some(&500_000));
    }
}
