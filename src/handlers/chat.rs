use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use serde_json::json;

use crate::middlewares::current_user;
use crate::models::*;
use crate::services::{ChatService, available_models};

#[utoipa::path(
    post,
    path = "/api/chat",
    tag = "chat",
    request_body = ChatRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "模型回复", body = ChatResponse),
        (status = 400, description = "请求参数错误"),
        (status = 401, description = "未授权"),
        (status = 403, description = "未注册、已封禁或会话不属于当前用户"),
        (status = 429, description = "超出日配额或请求过于频繁"),
        (status = 502, description = "上游模型错误"),
        (status = 503, description = "维护中")
    )
)]
pub async fn send_message(
    chat_service: web::Data<ChatService>,
    req: HttpRequest,
    request: web::Json<ChatRequest>,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;
    match chat_service.send_message(&user, request.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/api/chat/models",
    tag = "chat",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "可用模型", body = [AvailableModel]))
)]
pub async fn list_models() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(ApiResponse::success(available_models())))
}

#[utoipa::path(
    get,
    path = "/api/chat/conversations",
    tag = "chat",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "最近的会话", body = [ConversationSummary]),
        (status = 401, description = "未授权")
    )
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
    path = "/api/chat/conversations/{id}",
    tag = "chat",
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
    path = "/api/chat/conversations/{id}",
    tag = "chat",
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

pub fn chat_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/chat")
            .route("", web::post().to(send_message))
            .route("/models", web::get().to(list_models))
            .route("/conversations", web::get().to(list_conversations))
            .route("/conversations/{id}", web::get().to(get_conversation))
            .route("/conversations/{id}", web::delete().to(delete_conversation)),
    );
}
