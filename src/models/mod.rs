pub mod admin;
pub mod chat;
pub mod common;
pub mod pagination;
pub mod subscription;
pub mod user;

pub use admin::*;
pub use chat::*;
pub use common::*;
pub use pagination::*;
pub use subscription::*;
pub use user::*;
