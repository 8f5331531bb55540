//! 移动端接口：与网页端共用服务层，响应形状更扁平

use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

use crate::error::AppResult;
use crate::handlers::subscription::{cancel_response, verify_and_report};
use crate::middlewares::current_user;
use crate::models::*;
use crate::services::{
    AuthService, ChatService, PaymentService, SubscriptionService, UserService,
};

#[utoipa::path(
    get,
    path = "/api/mobile/plans",
    tag = "mobile",
    responses((status = 200, description = "上架中的套餐", body = [SubscriptionPlanResponse]))
)]
pub async fn get_plans(
    subscription_service: web::Data<SubscriptionService>,
) -> Result<HttpResponse> {
    match subscription_service.active_plans().await {
        Ok(plans) => Ok(HttpResponse::Ok().json(ApiResponse::success(plans))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/api/mobile/paystack-key",
    tag = "mobile",
    responses((status = 200, description = "Paystack 公钥", body = PaystackKeyResponse))
)]
pub async fn get_paystack_key(payment_service: web::Data<PaymentService>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(ApiResponse::success(PaystackKeyResponse {
        public_key: payment_service.public_key(),
    })))
}

#[utoipa::path(
    post,
    path = "/api/mobile/auth/register",
    tag = "mobile",
    request_body = MobileRegisterRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "注册成功", body = UserProfileResponse),
        (status = 200, description = "用户已存在", body = UserProfileResponse),
        (status = 403, description = "注册已关闭")
    )
)]
pub async fn register(
    auth_service: web::Data<AuthService>,
    req: HttpRequest,
    request: Option<web::Json<MobileRegisterRequest>>,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;
    let request = request.map(|r| r.into_inner()).unwrap_or_default();
    match auth_service
        .register_identity(&user, request.display_name)
        .await
    {
        Ok((profile, true)) => Ok(HttpResponse::Created().json(ApiResponse::success(
            UserProfileResponse::from(profile),
        ))),
        Ok((profile, false)) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            UserProfileResponse::from(profile),
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

async fn mobile_profile(
    users: &UserService,
    subscriptions: &SubscriptionService,
    uid: &str,
) -> AppResult<MobileUserProfile> {
    let status = subscriptions.status(uid).await?;
    let profile = users.get_profile(uid).await?;
    Ok(MobileUserProfile {
        uid: profile.uid,
        email: profile.email,
        display_name: profile.display_name,
        tier: status.tier,
        is_subscribed: status.is_subscribed,
        can_upload_images: status.can_upload_images,
        can_upload_files: status.can_upload_files,
        messages_used_today: status.messages_used_today,
        messages_per_day: status.messages_per_day,
        subscription_end_date: status.subscription_end_date,
        plan_name: status.plan_name,
    })
}

#[utoipa::path(
    get,
    path = "/api/mobile/profile",
    tag = "mobile",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "资料与订阅权益", body = MobileUserProfile),
        (status = 404, description = "用户不存在")
    )
)]
pub async fn get_profile(
    user_service: web::Data<UserService>,
    subscription_service: web::Data<SubscriptionService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;
    match mobile_profile(&user_service, &subscription_service, &user.uid).await {
        Ok(profile) => Ok(HttpResponse::Ok().json(ApiResponse::success(profile))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/api/mobile/subscription",
    tag = "mobile",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "订阅状态", body = SubscriptionStatusResponse))
)]
pub async fn get_subscription(
    subscription_service: web::Data<SubscriptionService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;
    match subscription_service.status(&user.uid).await {
        Ok(status) => Ok(HttpResponse::Ok().json(ApiResponse::success(status))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/api/mobile/chat",
    tag = "mobile",
    request_body = MobileChatRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "模型回复与最新用量", body = MobileChatResponse),
        (status = 403, description = "未开通图片或文件上传"),
        (status = 429, description = "超出日配额")
    )
)]
pub async fn chat(
    chat_service: web::Data<ChatService>,
    req: HttpRequest,
    request: web::Json<MobileChatRequest>,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;
    match chat_service
        .send_mobile_message(&user, request.into_inner())
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/api/mobile/conversations",
    tag = "mobile",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "最近的会话", body = [ConversationSummary]))
)]
pub async fn list_conversations(
    chat_service: web::Data<ChatService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;
    match chat_service.list_conversations(&user.uid).await {
        Ok(list) => Ok(HttpResponse::Ok().json(ApiResponse::success(list))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/api/mobile/conversations/{id}",
    tag = "mobile",
    params(("id" = String, Path, description = "会话 ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "会话详情", body = ConversationDetail),
        (status = 403, description = "无权访问"),
        (status = 404, description = "会话不存在")
    )
)]
pub async fn get_conversation(
    chat_service: web::Data<ChatService>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;
    match chat_service.get_conversation(&user.uid, &path).await {
        Ok(detail) => Ok(HttpResponse::Ok().json(ApiResponse::success(detail))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/api/mobile/conversations/{id}",
    tag = "mobile",
    params(("id" = String, Path, description = "会话 ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "已删除"),
        (status = 403, description = "无权访问"),
        (status = 404, description = "会话不存在")
    )
)]
pub async fn delete_conversation(
    chat_service: web::Data<ChatService>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;
    match chat_service.delete_conversation(&user.uid, &path).await {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Conversation deleted"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/api/mobile/subscribe",
    tag = "mobile",
    request_body = InitPaymentRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "支付已发起", body = InitPaymentResponse),
        (status = 400, description = "缺少邮箱"),
        (status = 404, description = "套餐不存在或已下架")
    )
)]
pub async fn subscribe(
    payment_service: web::Data<PaymentService>,
    req: HttpRequest,
    request: web::Json<InitPaymentRequest>,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;
    let request = request.into_inner();
    match payment_service
        .initialize(&user, &request.plan_id, request.callback_url)
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/api/mobile/verify-payment",
    tag = "mobile",
    request_body = VerifyPaymentRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "支付成功，订阅已激活", body = VerifyPaymentResponse),
        (status = 400, description = "支付未成功"),
        (status = 403, description = "交易不属于当前用户"),
        (status = 404, description = "交易不存在")
    )
)]
pub async fn verify_payment(
    payment_service: web::Data<PaymentService>,
    subscription_service: web::Data<SubscriptionService>,
    req: HttpRequest,
    request: web::Json<VerifyPaymentRequest>,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;
    match verify_and_report(
        &payment_service,
        &subscription_service,
        &user.uid,
        &request.reference,
    )
    .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/api/mobile/cancel-subscription",
    tag = "mobile",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "已取消自动续费", body = CancelSubscriptionResponse),
        (status = 404, description = "没有有效订阅")
    )
)]
pub async fn cancel_subscription(
    subscription_service: web::Data<SubscriptionService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;
    match subscription_service.cancel(&user.uid).await {
        Ok(subscription) => {
            Ok(HttpResponse::Ok().json(ApiResponse::success(cancel_response(subscription))))
        }
        Err(e) => Ok(e.error_response()),
    }
}

pub fn mobile_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/mobile")
            .route("/plans", web::get().to(get_plans))
            .route("/paystack-key", web::get().to(get_paystack_key))
            .route("/auth/register", web::post().to(register))
            .route("/profile", web::get().to(get_profile))
            .route("/subscription", web::get().to(get_subscription))
            .route("/chat", web::post().to(chat))
            .route("/conversations", web::get().to(list_conversations))
            .route("/conversations/{id}", web::get().to(get_conversation))
            .route("/conversations/{id}", web::delete().to(delete_conversation))
            .route("/subscribe", web::post().to(subscribe))
            .route("/verify-payment", web::post().to(verify_payment))
            .route("/cancel-subscription", web::post().to(cancel_subscription)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::create_test_pool;
    use crate::external::IdentityProvider;
    use crate::middlewares::AuthMiddleware;
    use crate::services::SettingsService;
    use crate::test_support::{StubIdentity, auth_user};
    use actix_web::{App, http::StatusCode, test};
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_register_then_profile() {
        let pool = create_test_pool().await;
        let identity: Arc<dyn IdentityProvider> =
            Arc::new(StubIdentity::default().with_token("t1", auth_user("m1")));
        let settings = SettingsService::new(pool.clone());
        let users = UserService::new(pool.clone(), identity.clone());
        let subscriptions = SubscriptionService::new(pool.clone(), settings.clone());
        let auth = AuthService::new(identity.clone(), users.clone(), settings);

        let app = test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(identity))
                .app_data(web::Data::new(auth))
                .app_data(web::Data::new(users))
                .app_data(web::Data::new(subscriptions))
                .service(web::scope("/api").configure(mobile_config)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/mobile/profile")
            .insert_header(("Authorization", "Bearer t1"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post()
            .uri("/api/mobile/auth/register")
            .insert_header(("Authorization", "Bearer t1"))
            .set_json(json!({ "displayName": "Mobile One" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = test::TestRequest::post()
            .uri("/api/mobile/auth/register")
            .insert_header(("Authorization", "Bearer t1"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri("/api/mobile/profile")
            .insert_header(("Authorization", "Bearer t1"))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["displayName"], "Mobile One");
        assert_eq!(body["data"]["tier"], "free");
        assert_eq!(body["data"]["isSubscribed"], false);
        assert_eq!(body["data"]["messagesPerDay"], 10);
    }
}
