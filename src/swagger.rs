use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::{BillingInterval, MessageRole, SubscriptionStatus, Tier, TransactionStatus};
use crate::handlers;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            )
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::root,
        handlers::health::health,
        handlers::auth::register,
        handlers::auth::verify,
        handlers::chat::send_message,
        handlers::chat::list_models,
        handlers::chat::list_conversations,
        handlers::chat::get_conversation,
        handlers::chat::delete_conversation,
        handlers::user::get_profile,
        handlers::user::update_profile,
        handlers::user::get_usage,
        handlers::user::delete_account,
        handlers::subscription::get_plans,
        handlers::subscription::get_paystack_key,
        handlers::subscription::my_subscription,
        handlers::subscription::init_payment,
        handlers::subscription::verify_payment,
        handlers::subscription::cancel,
        handlers::mobile::get_plans,
        handlers::mobile::get_paystack_key,
        handlers::mobile::register,
        handlers::mobile::get_profile,
        handlers::mobile::get_subscription,
        handlers::mobile::chat,
        handlers::mobile::list_conversations,
        handlers::mobile::get_conversation,
        handlers::mobile::delete_conversation,
        handlers::mobile::subscribe,
        handlers::mobile::verify_payment,
        handlers::mobile::cancel_subscription,
        handlers::admin::get_stats,
        handlers::admin::list_users,
        handlers::admin::get_user,
        handlers::admin::set_admin,
        handlers::admin::set_tier,
        handlers::admin::ban_user,
        handlers::admin::get_analytics,
        handlers::admin::get_logs,
        handlers::admin::get_settings,
        handlers::admin::update_settings,
        handlers::admin::get_revenue,
        handlers::admin::all_subscriptions,
        handlers::admin::all_plans,
        handlers::admin::save_plan,
        handlers::admin::delete_plan,
        handlers::webhook::paystack_webhook,
    ),
    components(
        schemas(
            Tier,
            MessageRole,
            SubscriptionStatus,
            TransactionStatus,
            BillingInterval,
            ApiError,
            RegisterRequest,
            RegisterResponse,
            MobileRegisterRequest,
            VerifyTokenRequest,
            VerifyTokenResponse,
            UpdateProfileRequest,
            UserProfileResponse,
            UserUsage,
            MobileUserProfile,
            ChatMessage,
            ChatRequest,
            ChatResponse,
            TokenUsage,
            MobileMessage,
            MobileChatRequest,
            MobileChatResponse,
            MobileUsage,
            AvailableModel,
            ConversationSummary,
            ConversationDetail,
            StoredMessage,
            SubscriptionPlanResponse,
            SavePlanRequest,
            SubscriptionResponse,
            SubscriptionStatusResponse,
            InitPaymentRequest,
            InitPaymentResponse,
            VerifyPaymentRequest,
            VerifyPaymentResponse,
            CancelSubscriptionResponse,
            PaystackKeyResponse,
            TransactionResponse,
            DashboardStats,
            TierBreakdown,
            UserDetails,
            SetAdminRequest,
            SetTierRequest,
            BanUserRequest,
            AnalyticsData,
            DailyCount,
            HourlyCount,
            ModelUsage,
            UsageLogEntry,
            SystemSettings,
            RateLimits,
            RevenueStats,
            PaginationParams,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Service info and health check"),
        (name = "auth", description = "Registration and token verification"),
        (name = "chat", description = "Chat completions and conversations"),
        (name = "user", description = "Profile and usage"),
        (name = "subscription", description = "Plans, payments and subscriptions"),
        (name = "mobile", description = "Mobile client API"),
        (name = "admin", description = "Administration API"),
        (name = "webhook", description = "Payment gateway callbacks"),
    ),
    info(
        title = "Zlma AI API",
        version = "1.0.0",
        description = "Zlma AI backend REST API documentation"
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/chat"));
        assert!(doc.paths.paths.contains_key("/api/webhooks/paystack"));
        assert!(doc.paths.paths.contains_key("/api/admin/subscriptions/plans/{planId}"));
    }
}
