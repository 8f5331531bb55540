use crate::entities::{MessageRole, Tier, conversation_entity, message_entity, usage_log_entity};
use crate::error::{AppError, AppResult};
use crate::external::{ChatCompletionProvider, Completion};
use crate::models::{
    AuthUser, AvailableModel, ChatMessage, ChatRequest, ChatResponse, ConversationDetail,
    ConversationSummary, MobileChatRequest, MobileChatResponse, MobileUsage, TokenUsage,
};
use crate::services::{RateLimitService, SettingsService, SubscriptionService, UserService};
use crate::utils::{PUBLIC_MODEL_LABEL, SYSTEM_PROMPT, new_id, sanitize_response};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DatabaseTransaction, EntityTrait,
    FromQueryResult, IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_UPSTREAM_MODEL: &str = "openai/gpt-4o";
const MOBILE_STANDARD_MODEL: &str = "openai/gpt-4o-mini";
const TITLE_MAX_CHARS: usize = 50;
const MAX_CONVERSATION_ID_LEN: usize = 64;

/// 对外别名 -> 上游模型
const MODEL_ALIASES: &[(&str, &str)] = &[
    ("zlma-pro", "openai/gpt-4o"),
    ("zlma-fast", "openai/gpt-4o-mini"),
    ("zlma-creative", "anthropic/claude-3.5-sonnet"),
    ("zlma-research", "google/gemini-pro-1.5"),
    ("zlma-open", "meta-llama/llama-3.1-70b-instruct"),
    ("openai/gpt-4o", "openai/gpt-4o"),
    ("openai/gpt-4o-mini", "openai/gpt-4o-mini"),
];

/// 未知别名回退到默认模型
pub fn resolve_model(alias: &str) -> &'static str {
    MODEL_ALIASES
        .iter()
        .find(|(name, _)| *name == alias.trim())
        .map(|(_, upstream)| *upstream)
        .unwrap_or(DEFAULT_UPSTREAM_MODEL)
}

pub fn available_models() -> Vec<AvailableModel> {
    [
        ("zlma-pro", "Zlma Pro", "Most capable model for complex tasks", 128_000),
        ("zlma-fast", "Zlma Fast", "Fast and efficient for everyday tasks", 128_000),
        ("zlma-creative", "Zlma Creative", "Best for creative writing and analysis", 200_000),
        ("zlma-research", "Zlma Research", "Great for research with long context", 1_000_000),
        ("zlma-open", "Zlma Open", "Open-weight model for general use", 131_072),
    ]
    .into_iter()
    .map(|(id, name, description, context_length)| AvailableModel {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        context_length,
    })
    .collect()
}

fn mobile_model_for(tier: Tier) -> &'static str {
    match tier {
        Tier::Enterprise => DEFAULT_UPSTREAM_MODEL,
        Tier::Free | Tier::Pro => MOBILE_STANDARD_MODEL,
    }
}

#[derive(Debug, FromQueryResult)]
struct MessageCountRow {
    conversation_id: String,
    message_count: i64,
}

#[derive(Clone)]
pub struct ChatService {
    pool: DatabaseConnection,
    provider: Arc<dyn ChatCompletionProvider>,
    users: UserService,
    subscriptions: SubscriptionService,
    settings: SettingsService,
    limiter: RateLimitService,
    conversation_list_limit: u64,
}

impl ChatService {
    pub fn new(
        pool: DatabaseConnection,
        provider: Arc<dyn ChatCompletionProvider>,
        users: UserService,
        subscriptions: SubscriptionService,
        settings: SettingsService,
        limiter: RateLimitService,
        conversation_list_limit: u64,
    ) -> Self {
        Self {
            pool,
            provider,
            users,
            subscriptions,
            settings,
            limiter,
            conversation_list_limit,
        }
    }

    /// 网页端对话
    ///
    /// 顺序：资料 -> 维护模式 -> 封禁 -> 会话归属 -> 限流 -> 预占配额 -> 上游 -> 清洗 -> 持久化
    pub async fn send_message(&self, user: &AuthUser, req: ChatRequest) -> AppResult<ChatResponse> {
        validate_messages(&req.messages)?;
        let conversation_id = normalize_conversation_id(req.conversation_id)?;
        self.ensure_can_chat(user).await?;
        self.ensure_not_foreign(&user.uid, conversation_id.as_deref())
            .await?;

        let status = self.subscriptions.status(&user.uid).await?;
        let settings = self.settings.get().await?;
        self.limiter
            .check(&user.uid, status.tier, &settings.rate_limits)
            .await?;

        let upstream_model = resolve_model(&req.model);
        let completion = self
            .complete_with_quota(&user.uid, status.messages_per_day, upstream_model, &req.messages)
            .await?;
        let reply = sanitize_response(&completion.content);

        let conversation_id = self
            .persist_exchange(&user.uid, conversation_id, &req.model, &req.messages, &reply)
            .await?;
        self.log_usage(&user.uid, upstream_model, completion.usage.as_ref())
            .await;

        Ok(ChatResponse {
            id: completion.id,
            message: ChatMessage::new(MessageRole::Assistant, reply),
            model: PUBLIC_MODEL_LABEL.to_string(),
            conversation_id,
            usage: completion.usage,
        })
    }

    /// 移动端对话：按订阅权益放行上传，按等级选模型
    pub async fn send_mobile_message(
        &self,
        user: &AuthUser,
        req: MobileChatRequest,
    ) -> AppResult<MobileChatResponse> {
        let messages: Vec<ChatMessage> = req
            .messages
            .into_iter()
            .map(|m| ChatMessage::new(m.role, m.content))
            .collect();
        validate_messages(&messages)?;
        let conversation_id = normalize_conversation_id(req.conversation_id)?;
        self.ensure_can_chat(user).await?;
        self.ensure_not_foreign(&user.uid, conversation_id.as_deref())
            .await?;

        let status = self.subscriptions.status(&user.uid).await?;
        if !status.can_chat {
            return Err(AppError::QuotaExceeded(
                "Daily message limit reached. Upgrade to Premium for more messages.".to_string(),
            ));
        }
        if req.has_image && !status.can_upload_images {
            return Err(AppError::Forbidden(
                "Image uploads require a Premium subscription".to_string(),
            ));
        }
        if req.has_file && !status.can_upload_files {
            return Err(AppError::Forbidden(
                "File uploads require a Premium subscription".to_string(),
            ));
        }

        let settings = self.settings.get().await?;
        self.limiter
            .check(&user.uid, status.tier, &settings.rate_limits)
            .await?;

        let upstream_model = mobile_model_for(status.tier);
        let completion = self
            .complete_with_quota(&user.uid, status.messages_per_day, upstream_model, &messages)
            .await?;
        let reply = sanitize_response(&completion.content);

        let conversation_id = self
            .persist_exchange(&user.uid, conversation_id, upstream_model, &messages, &reply)
            .await?;
        self.log_usage(&user.uid, upstream_model, completion.usage.as_ref())
            .await;

        let refreshed = self.subscriptions.status(&user.uid).await?;
        Ok(MobileChatResponse {
            id: completion.id,
            message: ChatMessage::new(MessageRole::Assistant, reply),
            conversation_id,
            usage: MobileUsage {
                messages_used_today: refreshed.messages_used_today,
                messages_per_day: refreshed.messages_per_day,
                can_upload_images: refreshed.can_upload_images,
                can_upload_files: refreshed.can_upload_files,
            },
        })
    }

    pub async fn list_conversations(&self, uid: &str) -> AppResult<Vec<ConversationSummary>> {
        let conversations = conversation_entity::Entity::find()
            .filter(conversation_entity::Column::UserId.eq(uid))
            .order_by_desc(conversation_entity::Column::UpdatedAt)
            .limit(self.conversation_list_limit)
            .all(&self.pool)
            .await?;
        if conversations.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = conversations.iter().map(|c| c.id.clone()).collect();
        let counts: HashMap<String, i64> = message_entity::Entity::find()
            .select_only()
            .column(message_entity::Column::ConversationId)
            .column_as(Expr::col(message_entity::Column::Id).count(), "message_count")
            .filter(message_entity::Column::ConversationId.is_in(ids))
            .group_by(message_entity::Column::ConversationId)
            .into_model::<MessageCountRow>()
            .all(&self.pool)
            .await?
            .into_iter()
            .map(|row| (row.conversation_id, row.message_count))
            .collect();

        // 位置从 0 连续递增，最后一条的位置即 count - 1
        let mut last_condition = Condition::any();
        for (id, count) in &counts {
            last_condition = last_condition.add(
                Condition::all()
                    .add(message_entity::Column::ConversationId.eq(id.as_str()))
                    .add(message_entity::Column::Position.eq(count - 1)),
            );
        }
        let last_messages: HashMap<String, String> = if counts.is_empty() {
            HashMap::new()
        } else {
            message_entity::Entity::find()
                .filter(last_condition)
                .all(&self.pool)
                .await?
                .into_iter()
                .map(|m| (m.conversation_id, m.content))
                .collect()
        };

        Ok(conversations
            .into_iter()
            .map(|c| ConversationSummary {
                last_message: last_messages.get(&c.id).cloned(),
                message_count: counts
                    .get(&c.id)
                    .map(|n| u64::try_from(*n).unwrap_or(0))
                    .unwrap_or(0),
                updated_at: c.updated_at.timestamp_millis(),
                id: c.id,
                title: c.title,
                model: c.model,
            })
            .collect())
    }

    pub async fn get_conversation(&self, uid: &str, id: &str) -> AppResult<ConversationDetail> {
        let conversation = self.owned_conversation(uid, id).await?;
        let messages = message_entity::Entity::find()
            .filter(message_entity::Column::ConversationId.eq(id))
            .order_by_asc(message_entity::Column::Position)
            .all(&self.pool)
            .await?;
        Ok(ConversationDetail::new(conversation, messages))
    }

    pub async fn delete_conversation(&self, uid: &str, id: &str) -> AppResult<()> {
        self.owned_conversation(uid, id).await?;

        let txn = self.pool.begin().await?;
        message_entity::Entity::delete_many()
            .filter(message_entity::Column::ConversationId.eq(id))
            .exec(&txn)
            .await?;
        conversation_entity::Entity::delete_by_id(id.to_string())
            .exec(&txn)
            .await?;
        txn.commit().await?;

        log::info!("Conversation {id} deleted by {uid}");
        Ok(())
    }

    async fn owned_conversation(
        &self,
        uid: &str,
        id: &str,
    ) -> AppResult<conversation_entity::Model> {
        let conversation = conversation_entity::Entity::find_by_id(id.to_string())
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))?;
        if conversation.user_id != uid {
            return Err(AppError::Forbidden(
                "You do not have access to this conversation".to_string(),
            ));
        }
        Ok(conversation)
    }

    async fn ensure_can_chat(&self, user: &AuthUser) -> AppResult<()> {
        let profile = self.users.find(&user.uid).await?.ok_or_else(|| {
            AppError::Forbidden("User profile not found. Please register first.".to_string())
        })?;

        let settings = self.settings.get().await?;
        if settings.maintenance_mode && !user.is_admin {
            return Err(AppError::Maintenance);
        }
        if profile.is_banned {
            return Err(AppError::Forbidden(
                "Your account has been suspended".to_string(),
            ));
        }
        Ok(())
    }

    /// 不存在的会话允许（会以该 id 新建），属于他人的拒绝
    async fn ensure_not_foreign(&self, uid: &str, conversation_id: Option<&str>) -> AppResult<()> {
        let Some(id) = conversation_id else {
            return Ok(());
        };
        match conversation_entity::Entity::find_by_id(id.to_string())
            .one(&self.pool)
            .await?
        {
            Some(c) if c.user_id != uid => Err(AppError::Forbidden(
                "You do not have access to this conversation".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// 预占配额后调用上游；上游失败则归还
    async fn complete_with_quota(
        &self,
        uid: &str,
        daily_limit: i32,
        model: &str,
        messages: &[ChatMessage],
    ) -> AppResult<Completion> {
        self.users.reserve_message(uid, daily_limit).await?;

        let mut upstream = Vec::with_capacity(messages.len() + 1);
        upstream.push(ChatMessage::new(MessageRole::System, SYSTEM_PROMPT));
        upstream.extend(
            messages
                .iter()
                .filter(|m| m.role != MessageRole::System)
                .cloned(),
        );

        match self.provider.complete(model, &upstream).await {
            Ok(completion) => Ok(completion),
            Err(e) => {
                log::error!("Upstream completion for {uid} on {model} failed: {e}");
                if let Err(release_err) = self.users.release_message(uid).await {
                    log::error!("Failed to release reserved quota for {uid}: {release_err}");
                }
                Err(e)
            }
        }
    }

    async fn persist_exchange(
        &self,
        uid: &str,
        conversation_id: Option<String>,
        model: &str,
        request: &[ChatMessage],
        reply: &str,
    ) -> AppResult<String> {
        let txn = self.pool.begin().await?;
        let id = persist_in(&txn, uid, conversation_id, model, request, reply).await?;
        txn.commit().await?;
        Ok(id)
    }

    async fn log_usage(&self, uid: &str, model: &str, usage: Option<&TokenUsage>) {
        let (prompt, completion, total) = usage
            .map(|u| (u.prompt_tokens, u.completion_tokens, u.total_tokens))
            .unwrap_or_default();
        let result = usage_log_entity::ActiveModel {
            id: Set(new_id()),
            user_id: Set(uid.to_string()),
            model: Set(model.to_string()),
            prompt_tokens: Set(prompt),
            completion_tokens: Set(completion),
            total_tokens: Set(total),
            created_at: Set(Utc::now()),
        }
        .insert(&self.pool)
        .await;
        if let Err(e) = result {
            log::warn!("Failed to write usage log for {uid}: {e}");
        }
    }
}

async fn persist_in(
    txn: &DatabaseTransaction,
    uid: &str,
    conversation_id: Option<String>,
    model: &str,
    request: &[ChatMessage],
    reply: &str,
) -> AppResult<String> {
    let now = Utc::now();
    let existing = match &conversation_id {
        Some(id) => {
            conversation_entity::Entity::find_by_id(id.clone())
                .one(txn)
                .await?
        }
        None => None,
    };

    let (id, start, to_store): (String, i32, &[ChatMessage]) = match existing {
        Some(conversation) if conversation.user_id != uid => {
            return Err(AppError::Forbidden(
                "You do not have access to this conversation".to_string(),
            ));
        }
        Some(conversation) => {
            let count = message_entity::Entity::find()
                .filter(message_entity::Column::ConversationId.eq(conversation.id.as_str()))
                .count(txn)
                .await?;
            let id = conversation.id.clone();
            let mut am = conversation.into_active_model();
            am.updated_at = Set(now);
            am.update(txn).await?;
            let tail = request.len().saturating_sub(1);
            (id, i32::try_from(count).unwrap_or(i32::MAX), &request[tail..])
        }
        None => {
            let id = conversation_id.unwrap_or_else(new_id);
            conversation_entity::ActiveModel {
                id: Set(id.clone()),
                user_id: Set(uid.to_string()),
                title: Set(conversation_title(request)),
                model: Set(model.to_string()),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(txn)
            .await?;
            (id, 0, request)
        }
    };

    let rows = to_store
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .chain(std::iter::once((MessageRole::Assistant, reply)))
        .zip(start..)
        .map(|((role, content), position)| message_entity::ActiveModel {
            id: Set(new_id()),
            conversation_id: Set(id.clone()),
            position: Set(position),
            role: Set(role),
            content: Set(content.to_string()),
            created_at: Set(now),
        })
        .collect::<Vec<_>>();
    message_entity::Entity::insert_many(rows).exec(txn).await?;

    Ok(id)
}

/// 取最后一条用户消息的前 50 个字符
fn conversation_title(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::User)
        .or_else(|| messages.last())
        .map(|m| m.content.trim())
        .filter(|c| !c.is_empty())
        .map(|c| c.chars().take(TITLE_MAX_CHARS).collect())
        .unwrap_or_else(|| "New Chat".to_string())
}

fn validate_messages(messages: &[ChatMessage]) -> AppResult<()> {
    if messages.is_empty() {
        return Err(AppError::ValidationError(
            "At least one message is required".to_string(),
        ));
    }
    Ok(())
}

fn normalize_conversation_id(id: Option<String>) -> AppResult<Option<String>> {
    let Some(id) = id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if id.len() > MAX_CONVERSATION_ID_LEN {
        return Err(AppError::ValidationError(
            "conversationId is too long".to_string(),
        ));
    }
    Ok(Some(id))
}
