use actix_web::{HttpResponse, ResponseError, Result, web};
use serde_json::json;

use crate::models::*;
use crate::services::AuthService;

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "注册成功", body = RegisterResponse),
        (status = 200, description = "用户已存在", body = RegisterResponse),
        (status = 401, description = "ID token 无效"),
        (status = 403, description = "注册已关闭")
    )
)]
pub async fn register(
    auth_service: web::Data<AuthService>,
    request: web::Json<RegisterRequest>,
) -> Result<HttpResponse> {
    let request = request.into_inner();
    match auth_service
        .register(&request.id_token, request.display_name)
        .await
    {
        Ok((user, true)) => Ok(HttpResponse::Created().json(ApiResponse::success(RegisterResponse {
            user_id: user.uid,
            message: "User registered successfully".to_string(),
        }))),
        Ok((user, false)) => Ok(HttpResponse::Ok().json(ApiResponse::success(RegisterResponse {
            user_id: user.uid,
            message: "User already registered".to_string(),
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/verify",
    tag = "auth",
    request_body = VerifyTokenRequest,
    responses(
        (status = 200, description = "token 有效", body = VerifyTokenResponse),
        (status = 401, description = "token 无效")
    )
)]
pub async fn verify(
    auth_service: web::Data<AuthService>,
    request: web::Json<VerifyTokenRequest>,
) -> Result<HttpResponse> {
    match auth_service.verify(&request.id_token).await {
        Ok(response) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": response
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn auth_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/register", web::post().to(register))
            .route("/verify", web::post().to(verify)),
    );
}
