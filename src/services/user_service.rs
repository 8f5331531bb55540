use crate::entities::{Tier, conversation_entity, message_entity, user_entity};
use crate::error::{AppError, AppResult};
use crate::external::IdentityProvider;
use crate::models::{AuthUser, SystemSettings, UpdateProfileRequest, UserUsage};
use crate::utils::{next_utc_midnight_millis, today_utc};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    QueryFilter, QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;

const MAX_DISPLAY_NAME_CHARS: usize = 50;

#[derive(Clone)]
pub struct UserService {
    pool: DatabaseConnection,
    identity: Arc<dyn IdentityProvider>,
}

impl UserService {
    pub fn new(pool: DatabaseConnection, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { pool, identity }
    }

    /// 注册资料；已存在时原样返回，第二个返回值表示是否新建
    pub async fn create_profile(
        &self,
        user: &AuthUser,
        display_name: Option<String>,
        settings: &SystemSettings,
    ) -> AppResult<(user_entity::Model, bool)> {
        if let Some(existing) = self.find(&user.uid).await? {
            return Ok((existing, false));
        }
        if !settings.registration_enabled {
            return Err(AppError::Forbidden(
                "Registration is currently disabled".to_string(),
            ));
        }

        let display_name = match display_name {
            Some(name) => validate_display_name(&name)?,
            None => fallback_display_name(user),
        };
        let email = user.email.clone().unwrap_or_default();
        let now = Utc::now();

        let created = user_entity::ActiveModel {
            uid: Set(user.uid.clone()),
            email: Set(email),
            display_name: Set(display_name),
            avatar_url: Set(None),
            tier: Set(settings.default_tier),
            messages_used_today: Set(0),
            total_messages: Set(0),
            last_reset_date: Set(Some(now.date_naive())),
            is_banned: Set(false),
            ban_reason: Set(None),
            subscription_id: Set(None),
            created_at: Set(now),
            last_active_at: Set(now),
        }
        .insert(&self.pool)
        .await?;

        log::info!("Registered user {} ({})", created.uid, created.tier);
        Ok((created, true))
    }

    pub async fn find(&self, uid: &str) -> AppResult<Option<user_entity::Model>> {
        Ok(user_entity::Entity::find_by_id(uid.to_string())
            .one(&self.pool)
            .await?)
    }

    pub async fn get_profile(&self, uid: &str) -> AppResult<user_entity::Model> {
        self.find(uid)
            .await?
            .ok_or_else(|| AppError::NotFound("User profile not found".to_string()))
    }

    pub async fn update_profile(
        &self,
        uid: &str,
        req: UpdateProfileRequest,
    ) -> AppResult<user_entity::Model> {
        let user = self.get_profile(uid).await?;
        let mut am = user.into_active_model();
        if let Some(name) = req.display_name {
            am.display_name = Set(validate_display_name(&name)?);
        }
        if let Some(avatar) = req.avatar_url {
            let avatar = avatar.trim().to_string();
            am.avatar_url = Set((!avatar.is_empty()).then_some(avatar));
        }
        am.last_active_at = Set(Utc::now());
        Ok(am.update(&self.pool).await?)
    }

    pub async fn get_usage(&self, uid: &str, daily_limit: i32) -> AppResult<UserUsage> {
        let user = self.get_profile(uid).await?;
        let now = Utc::now();
        Ok(UserUsage {
            messages_used_today: user.used_today(now.date_naive()),
            daily_limit,
            total_messages: user.total_messages,
            tier: user.tier,
            reset_time: next_utc_midnight_millis(now),
        })
    }

    pub async fn set_tier(&self, uid: &str, tier: Tier) -> AppResult<user_entity::Model> {
        let user = self.get_profile(uid).await?;
        let mut am = user.into_active_model();
        am.tier = Set(tier);
        let updated = am.update(&self.pool).await?;
        log::info!("Tier for {uid} set to {tier}");
        Ok(updated)
    }

    pub async fn set_banned(
        &self,
        uid: &str,
        banned: bool,
        reason: Option<String>,
    ) -> AppResult<user_entity::Model> {
        let user = self.get_profile(uid).await?;
        let mut am = user.into_active_model();
        am.is_banned = Set(banned);
        am.ban_reason = Set(if banned { reason } else { None });
        Ok(am.update(&self.pool).await?)
    }

    /// 删除资料、会话及消息，最后删除身份提供方账号
    pub async fn delete_account(&self, uid: &str) -> AppResult<()> {
        let txn = self.pool.begin().await?;

        let conversation_ids: Vec<String> = conversation_entity::Entity::find()
            .select_only()
            .column(conversation_entity::Column::Id)
            .filter(conversation_entity::Column::UserId.eq(uid))
            .into_tuple()
            .all(&txn)
            .await?;

        if !conversation_ids.is_empty() {
            message_entity::Entity::delete_many()
                .filter(message_entity::Column::ConversationId.is_in(conversation_ids))
                .exec(&txn)
                .await?;
        }
        conversation_entity::Entity::delete_many()
            .filter(conversation_entity::Column::UserId.eq(uid))
            .exec(&txn)
            .await?;
        user_entity::Entity::delete_by_id(uid.to_string())
            .exec(&txn)
            .await?;

        txn.commit().await?;

        self.identity.delete_user(uid).await.inspect_err(|e| {
            log::error!("Profile of {uid} removed but identity account deletion failed: {e}");
        })?;
        log::info!("Deleted account {uid}");
        Ok(())
    }

    /// 原子预占一条消息配额
    ///
    /// 先把跨天的计数清零，再以 `used < limit` 为条件自增。
    /// 没有更新到行时区分：资料不存在、被封禁、配额用尽。
    pub async fn reserve_message(&self, uid: &str, daily_limit: i32) -> AppResult<()> {
        let today = today_utc();

        user_entity::Entity::update_many()
            .col_expr(user_entity::Column::MessagesUsedToday, Expr::value(0))
            .col_expr(user_entity::Column::LastResetDate, Expr::value(today))
            .filter(user_entity::Column::Uid.eq(uid))
            .filter(
                Condition::any()
                    .add(user_entity::Column::LastResetDate.is_null())
                    .add(user_entity::Column::LastResetDate.ne(today)),
            )
            .exec(&self.pool)
            .await?;

        let result = user_entity::Entity::update_many()
            .col_expr(
                user_entity::Column::MessagesUsedToday,
                Expr::col(user_entity::Column::MessagesUsedToday).add(1),
            )
            .col_expr(
                user_entity::Column::TotalMessages,
                Expr::col(user_entity::Column::TotalMessages).add(1),
            )
            .col_expr(user_entity::Column::LastActiveAt, Expr::value(Utc::now()))
            .filter(user_entity::Column::Uid.eq(uid))
            .filter(user_entity::Column::IsBanned.eq(false))
            .filter(user_entity::Column::MessagesUsedToday.lt(daily_limit))
            .exec(&self.pool)
            .await?;

        if result.rows_affected > 0 {
            return Ok(());
        }

        match self.find(uid).await? {
            None => Err(AppError::Forbidden(
                "User profile not found. Please register first.".to_string(),
            )),
            Some(user) if user.is_banned => {
                Err(AppError::Forbidden("Your account has been suspended".to_string()))
            }
            Some(_) => Err(AppError::QuotaExceeded(format!(
                "Daily message limit of {daily_limit} reached. Upgrade your plan for more messages."
            ))),
        }
    }

    /// 上游失败时归还预占的配额
    pub async fn release_message(&self, uid: &str) -> AppResult<()> {
        user_entity::Entity::update_many()
            .col_expr(
                user_entity::Column::MessagesUsedToday,
                Expr::col(user_entity::Column::MessagesUsedToday).sub(1),
            )
            .col_expr(
                user_entity::Column::TotalMessages,
                Expr::col(user_entity::Column::TotalMessages).sub(1),
            )
            .filter(user_entity::Column::Uid.eq(uid))
            .filter(user_entity::Column::LastResetDate.eq(today_utc()))
            .filter(user_entity::Column::MessagesUsedToday.gt(0))
            .exec(&self.pool)
            .await?;
        Ok(())
    }
}

fn validate_display_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_DISPLAY_NAME_CHARS {
        return Err(AppError::ValidationError(format!(
            "Display name must be between 1 and {MAX_DISPLAY_NAME_CHARS} characters"
        )));
    }
    Ok(name.to_string())
}

fn fallback_display_name(user: &AuthUser) -> String {
    let name = user
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .or_else(|| {
            user.email
                .as_deref()
                .and_then(|e| e.split('@').next())
                .filter(|n| !n.is_empty())
        })
        .unwrap_or("User");
    name.chars().take(MAX_DISPLAY_NAME_CHARS).collect()
}
