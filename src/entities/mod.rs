pub mod conversation_messages;
pub mod conversations;
pub mod subscription_plans;
pub mod subscriptions;
pub mod system_settings;
pub mod transactions;
pub mod usage_logs;
pub mod users;

pub use conversation_messages as message_entity;
pub use conversations as conversation_entity;
pub use subscription_plans as plan_entity;
pub use subscriptions as subscription_entity;
pub use system_settings as settings_entity;
pub use transactions as transaction_entity;
pub use usage_logs as usage_log_entity;
pub use users as user_entity;

pub use conversation_messages::MessageRole;
pub use subscription_plans::BillingInterval;
pub use subscriptions::SubscriptionStatus;
pub use transactions::TransactionStatus;
pub use users::Tier;
