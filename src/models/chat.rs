use crate::entities::{MessageRole, conversation_entity, message_entity};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn default_model() -> String {
    "openai/gpt-4o".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default = "default_model")]
    #[schema(example = "zlma-pro")]
    pub model: String,
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: i32,
    pub completion_tokens: i32,
    pub total_tokens: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub id: String,
    pub message: ChatMessage,
    /// 对外只暴露统一标签，不泄露真实上游模型
    pub model: String,
    pub conversation_id: String,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MobileMessage {
    pub role: MessageRole,
    pub content: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MobileChatRequest {
    pub messages: Vec<MobileMessage>,
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub has_image: bool,
    #[serde(default)]
    pub has_file: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MobileUsage {
    pub messages_used_today: i32,
    pub messages_per_day: i32,
    pub can_upload_images: bool,
    pub can_upload_files: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MobileChatResponse {
    pub id: String,
    pub message: ChatMessage,
    pub conversation_id: String,
    pub usage: MobileUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AvailableModel {
    pub id: String,
    pub name: String,
    pub description: String,
    pub context_length: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub last_message: Option<String>,
    pub message_count: u64,
    pub model: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: i64,
}

impl From<message_entity::Model> for StoredMessage {
    fn from(m: message_entity::Model) -> Self {
        Self {
            id: m.id,
            role: m.role,
            content: m.content,
            timestamp: m.created_at.timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub messages: Vec<StoredMessage>,
    pub model: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ConversationDetail {
    pub fn new(conv: conversation_entity::Model, messages: Vec<message_entity::Model>) -> Self {
        Self {
            id: conv.id,
            user_id: conv.user_id,
            title: conv.title,
            messages: messages.into_iter().map(StoredMessage::from).collect(),
            model: conv.model,
            created_at: conv.created_at.timestamp_millis(),
            updated_at: conv.updated_at.timestamp_millis(),
        }
    }
}
