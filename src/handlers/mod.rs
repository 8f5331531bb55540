pub mod admin;
pub mod auth;
pub mod chat;
pub mod health;
pub mod mobile;
pub mod subscription;
pub mod user;
pub mod webhook;

pub use admin::admin_config;
pub use auth::auth_config;
pub use chat::chat_config;
pub use health::health_config;
pub use mobile::mobile_config;
pub use subscription::subscription_config;
pub use user::user_config;
pub use webhook::webhook_config;
