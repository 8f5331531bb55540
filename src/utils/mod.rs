pub mod persona;
pub mod reference;
pub mod time;

pub use persona::{PUBLIC_MODEL_LABEL, SYSTEM_PROMPT, sanitize_response};
pub use reference::{generate_payment_reference, new_id};
pub use time::{next_utc_midnight_millis, today_utc};
