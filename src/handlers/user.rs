use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

use crate::middlewares::current_user;
use crate::models::*;
use crate::services::{SubscriptionService, UserService};

#[utoipa::path(
    get,
    path = "/api/user/profile",
    tag = "user",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "获取用户资料成功", body = UserProfileResponse),
        (status = 401, description = "未授权"),
        (status = 404, description = "用户不存在")
    )
)]
pub async fn get_profile(
    user_service: web::Data<UserService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;
    match user_service.get_profile(&user.uid).await {
        Ok(profile) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            UserProfileResponse::from(profile),
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/api/user/profile",
    tag = "user",
    request_body = UpdateProfileRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "更新用户资料成功", body = UserProfileResponse),
        (status = 400, description = "请求参数错误"),
        (status = 401, description = "未授权"),
        (status = 404, description = "用户不存在")
    )
)]
pub async fn update_profile(
    user_service: web::Data<UserService>,
    req: HttpRequest,
    request: web::Json<UpdateProfileRequest>,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;
    match user_service
        .update_profile(&user.uid, request.into_inner())
        .await
    {
        Ok(profile) => Ok(HttpResponse::Ok().json(ApiResponse::success(
            UserProfileResponse::from(profile),
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/api/user/usage",
    tag = "user",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "今日用量", body = UserUsage),
        (status = 404, description = "用户不存在")
    )
)]
pub async fn get_usage(
    user_service: web::Data<UserService>,
    subscription_service: web::Data<SubscriptionService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;
    let status = match subscription_service.status(&user.uid).await {
        Ok(status) => status,
        Err(e) => return Ok(e.error_response()),
    };
    match user_service
        .get_usage(&user.uid, status.messages_per_day)
        .await
    {
        Ok(usage) => Ok(HttpResponse::Ok().json(ApiResponse::success(usage))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/api/user/account",
    tag = "user",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "账号已删除"),
        (status = 401, description = "未授权"),
        (status = 502, description = "身份提供方删除失败")
    )
)]
pub async fn delete_account(
    user_service: web::Data<UserService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;
    match user_service.delete_account(&user.uid).await {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Account deleted"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn user_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/user")
            .route("/profile", web::get().to(get_profile))
            .route("/profile", web::put().to(update_profile))
            .route("/usage", web::get().to(get_usage))
            .route("/account", web::delete().to(delete_account)),
    );
}
