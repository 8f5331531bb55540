use actix_web::{HttpResponse, Result, ResponseError, web};
use serde_json::json;

use crate::models::*;
use crate::services::{AdminService, SubscriptionService};

#[utoipa::path(
    get,
    path = "/api/admin/stats",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "仪表盘统计", body = DashboardStats),
        (status = 403, description = "需要管理员权限")
    )
)]
pub async fn get_stats(admin_service: web::Data<AdminService>) -> Result<HttpResponse> {
    match admin_service.stats().await {
        Ok(stats) => Ok(HttpResponse::Ok().json(ApiResponse::success(stats))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    tag = "admin",
    params(PaginationParams),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "用户列表（分页）"))
)]
pub async fn list_users(
    admin_service: web::Data<AdminService>,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse> {
    match admin_service.list_users(&query).await {
        Ok(page) => Ok(HttpResponse::Ok().json(ApiResponse::success(page))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/api/admin/users/{userId}",
    tag = "admin",
    params(("userId" = String, Path, description = "用户 UID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "用户详情", body = UserDetails),
        (status = 404, description = "用户不存在")
    )
)]
pub async fn get_user(
    admin_service: web::Data<AdminService>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    match admin_service.user_details(&path).await {
        Ok(details) => Ok(HttpResponse::Ok().json(ApiResponse::success(details))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/api/admin/users/set-admin",
    tag = "admin",
    request_body = SetAdminRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "管理员标记已更新"),
        (status = 502, description = "身份提供方错误")
    )
)]
pub async fn set_admin(
    admin_service: web::Data<AdminService>,
    request: web::Json<SetAdminRequest>,
) -> Result<HttpResponse> {
    match admin_service
        .set_admin(&request.user_id, request.is_admin)
        .await
    {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": format!("Admin status updated for {}", request.user_id)
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/api/admin/users/set-tier",
    tag = "admin",
    request_body = SetTierRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "等级已更新", body = UserProfileResponse),
        (status = 404, description = "用户不存在")
    )
)]
pub async fn set_tier(
    admin_service: web::Data<AdminService>,
    request: web::Json<SetTierRequest>,
) -> Result<HttpResponse> {
    match admin_service.set_tier(&request.user_id, request.tier).await {
        Ok(profile) => Ok(HttpResponse::Ok().json(ApiResponse::success(profile))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/api/admin/users/ban",
    tag = "admin",
    request_body = BanUserRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "封禁状态已更新", body = UserProfileResponse),
        (status = 404, description = "用户不存在")
    )
)]
pub async fn ban_user(
    admin_service: web::Data<AdminService>,
    request: web::Json<BanUserRequest>,
) -> Result<HttpResponse> {
    let request = request.into_inner();
    match admin_service
        .ban_user(&request.user_id, request.banned, request.reason)
        .await
    {
        Ok(profile) => Ok(HttpResponse::Ok().json(ApiResponse::success(profile))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/api/admin/analytics",
    tag = "admin",
    params(AnalyticsQuery),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "用量分析", body = AnalyticsData),
        (status = 400, description = "不支持的统计周期")
    )
)]
pub async fn get_analytics(
    admin_service: web::Data<AdminService>,
    query: web::Query<AnalyticsQuery>,
) -> Result<HttpResponse> {
    match admin_service.analytics(query.period.as_deref()).await {
        Ok(data) => Ok(HttpResponse::Ok().json(ApiResponse::success(data))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/api/admin/logs",
    tag = "admin",
    params(PaginationParams),
    security(("bearer_auth" = [])),
    responses((status = 200, description = "API 用量日志（分页）"))
)]
pub async fn get_logs(
    admin_service: web::Data<AdminService>,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse> {
    match admin_service.usage_logs(&query).await {
        Ok(page) => Ok(HttpResponse::Ok().json(ApiResponse::success(page))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/api/admin/settings",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "系统设置", body = SystemSettings))
)]
pub async fn get_settings(admin_service: web::Data<AdminService>) -> Result<HttpResponse> {
    match admin_service.get_settings().await {
        Ok(settings) => Ok(HttpResponse::Ok().json(ApiResponse::success(settings))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/api/admin/settings",
    tag = "admin",
    request_body = SystemSettings,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "设置已保存", body = SystemSettings),
        (status = 400, description = "设置不合法")
    )
)]
pub async fn update_settings(
    admin_service: web::Data<AdminService>,
    request: web::Json<SystemSettings>,
) -> Result<HttpResponse> {
    match admin_service.update_settings(request.into_inner()).await {
        Ok(settings) => Ok(HttpResponse::Ok().json(ApiResponse::success(settings))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/api/admin/revenue",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "收入统计", body = RevenueStats))
)]
pub async fn get_revenue(admin_service: web::Data<AdminService>) -> Result<HttpResponse> {
    match admin_service.revenue().await {
        Ok(stats) => Ok(HttpResponse::Ok().json(ApiResponse::success(stats))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/api/admin/subscriptions/all",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "全部订阅", body = [SubscriptionResponse]))
)]
pub async fn all_subscriptions(
    subscription_service: web::Data<SubscriptionService>,
) -> Result<HttpResponse> {
    match subscription_service.all_subscriptions().await {
        Ok(list) => Ok(HttpResponse::Ok().json(ApiResponse::success(list))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/api/admin/subscriptions/plans",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "全部套餐（含下架）", body = [SubscriptionPlanResponse]))
)]
pub async fn all_plans(
    subscription_service: web::Data<SubscriptionService>,
) -> Result<HttpResponse> {
    match subscription_service.all_plans().await {
        Ok(plans) => Ok(HttpResponse::Ok().json(ApiResponse::success(plans))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/api/admin/subscriptions/plans",
    tag = "admin",
    request_body = SavePlanRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "套餐已保存", body = SubscriptionPlanResponse),
        (status = 400, description = "请求参数错误")
    )
)]
pub async fn save_plan(
    subscription_service: web::Data<SubscriptionService>,
    request: web::Json<SavePlanRequest>,
) -> Result<HttpResponse> {
    match subscription_service.save_plan(request.into_inner()).await {
        Ok(plan) => Ok(HttpResponse::Ok().json(ApiResponse::success(plan))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/api/admin/subscriptions/plans/{planId}",
    tag = "admin",
    params(("planId" = String, Path, description = "套餐 ID")),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "套餐已删除"),
        (status = 404, description = "套餐不存在")
    )
)]
pub async fn delete_plan(
    subscription_service: web::Data<SubscriptionService>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    match subscription_service.delete_plan(&path).await {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": "Plan deleted"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn admin_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .route("/stats", web::get().to(get_stats))
            .route("/users", web::get().to(list_users))
            .route("/users/set-admin", web::post().to(set_admin))
            .route("/users/set-tier", web::post().to(set_tier))
            .route("/users/ban", web::post().to(ban_user))
            .route("/users/{userId}", web::get().to(get_user))
            .route("/analytics", web::get().to(get_analytics))
            .route("/logs", web::get().to(get_logs))
            .route("/settings", web::get().to(get_settings))
            .route("/settings", web::put().to(update_settings))
            .route("/revenue", web::get().to(get_revenue))
            .route("/subscriptions/all", web::get().to(all_subscriptions))
            .route("/subscriptions/plans", web::get().to(all_plans))
            .route("/subscriptions/plans", web::post().to(save_plan))
            .route("/subscriptions/plans/{planId}", web::delete().to(delete_plan)),
    );
}
