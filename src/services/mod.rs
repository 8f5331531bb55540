pub mod admin_service;
pub mod auth_service;
pub mod chat_service;
pub mod payment_service;
pub mod rate_limiter;
pub mod settings_service;
pub mod subscription_service;
pub mod user_service;

pub use admin_service::*;
pub use auth_service::*;
pub use chat_service::*;
pub use payment_service::*;
pub use rate_limiter::*;
pub use settings_service::*;
pub use subscription_service::*;
pub use user_service::*;
