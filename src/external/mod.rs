pub mod firebase;
pub mod google_auth;
pub mod openrouter;
pub mod paystack;

pub use firebase::*;
pub use google_auth::GoogleTokenSource;
pub use openrouter::*;
pub use paystack::*;
