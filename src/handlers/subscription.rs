use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};

use crate::error::AppResult;
use crate::middlewares::current_user;
use crate::models::*;
use crate::services::{PaymentService, SubscriptionService};

#[utoipa::path(
    get,
    path = "/api/subscriptions/plans",
    tag = "subscription",
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
    path = "/api/subscriptions/paystack-key",
    tag = "subscription",
    responses((status = 200, description = "Paystack 公钥", body = PaystackKeyResponse))
)]
pub async fn get_paystack_key(payment_service: web::Data<PaymentService>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(ApiResponse::success(PaystackKeyResponse {
        public_key: payment_service.public_key(),
    })))
}

#[utoipa::path(
    get,
    path = "/api/subscriptions/my-subscription",
    tag = "subscription",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "订阅状态", body = SubscriptionStatusResponse),
        (status = 401, description = "未授权")
    )
)]
pub async fn my_subscription(
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
    path = "/api/subscriptions/init-payment",
    tag = "subscription",
    request_body = InitPaymentRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "支付已发起", body = InitPaymentResponse),
        (status = 400, description = "缺少邮箱"),
        (status = 404, description = "套餐不存在或已下架"),
        (status = 502, description = "支付网关错误")
    )
)]
pub async fn init_payment(
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

/// 校验支付并返回激活后的订阅与最新状态
pub(crate) async fn verify_and_report(
    payment_service: &PaymentService,
    subscription_service: &SubscriptionService,
    uid: &str,
    reference: &str,
) -> AppResult<VerifyPaymentResponse> {
    let subscription = payment_service.verify(uid, reference).await?;
    let status = subscription_service.status(uid).await?;
    Ok(VerifyPaymentResponse {
        subscription,
        status,
    })
}

#[utoipa::path(
    post,
    path = "/api/subscriptions/verify-payment",
    tag = "subscription",
    request_body = VerifyPaymentRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "支付成功，订阅已激活", body = VerifyPaymentResponse),
        (status = 400, description = "支付未成功或金额不符"),
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

pub(crate) fn cancel_response(subscription: SubscriptionResponse) -> CancelSubscriptionResponse {
    CancelSubscriptionResponse {
        message: "Subscription cancelled. Access remains until the end of the current period"
            .to_string(),
        active_until: subscription.end_date,
    }
}

#[utoipa::path(
    post,
    path = "/api/subscriptions/cancel",
    tag = "subscription",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "已取消自动续费", body = CancelSubscriptionResponse),
        (status = 404, description = "没有有效订阅")
    )
)]
pub async fn cancel(
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

pub fn subscription_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/subscriptions")
            .route("/plans", web::get().to(get_plans))
            .route("/paystack-key", web::get().to(get_paystack_key))
            .route("/my-subscription", web::get().to(my_subscription))
            .route("/init-payment", web::post().to(init_payment))
            .route("/verify-payment", web::post().to(verify_payment))
            .route("/cancel", web::post().to(cancel)),
    );
}
