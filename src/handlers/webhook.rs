use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use log::{info, warn};
use serde_json::json;

use crate::services::PaymentService;

const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Paystack webhook
///
/// 签名为请求体的 HMAC-SHA512（hex），校验失败返回 401；
/// 处理出错时返回对应错误码，网关会按自身策略重试
#[utoipa::path(
    post,
    path = "/api/webhooks/paystack",
    tag = "webhook",
    request_body(content = String, description = "Paystack 事件原文", content_type = "application/json"),
    params(("x-paystack-signature" = String, Header, description = "HMAC-SHA512 签名")),
    responses(
        (status = 200, description = "事件已接收"),
        (status = 401, description = "签名无效")
    )
)]
pub async fn paystack_webhook(
    req: HttpRequest,
    body: web::Bytes,
    payment_service: web::Data<PaymentService>,
) -> Result<HttpResponse> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if signature.is_empty() {
        warn!("Paystack webhook without signature header");
    }

    match payment_service.handle_webhook(&body, signature).await {
        Ok(()) => {
            info!("Paystack webhook processed");
            Ok(HttpResponse::Ok().json(json!({ "received": true })))
        }
        Err(e) => Ok(e.error_response()),
    }
}

pub fn webhook_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/webhooks").route("/paystack", web::post().to(paystack_webhook)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::create_test_pool;
    use crate::test_support::{StubGateway, WEBHOOK_SECRET};
    use actix_web::{App, test};
    use ring::hmac;
    use std::sync::Arc;

    fn sign(body: &[u8]) -> String {
        let key = hmac::Key::new(hmac::HMAC_SHA512, WEBHOOK_SECRET.as_bytes());
        hex::encode(hmac::sign(&key, body).as_ref())
    }

    async fn app_service() -> PaymentService {
        let pool = create_test_pool().await;
        PaymentService::new(
            pool,
            Arc::new(StubGateway::default()),
            "https://app.example.com/callback".to_string(),
        )
    }

    #[actix_web::test]
    async fn test_webhook_signature_checked() {
        let svc = app_service().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(svc))
                .configure(webhook_config),
        )
        .await;

        let body = br#"{"event":"transfer.success","data":{"reference":"zlma_x"}}"#;

        let req = test::TestRequest::post()
            .uri("/webhooks/paystack")
            .insert_header((SIGNATURE_HEADER, "bad"))
            .set_payload(body.to_vec())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);

        let req = test::TestRequest::post()
            .uri("/webhooks/paystack")
            .insert_header((SIGNATURE_HEADER, sign(body)))
            .set_payload(body.to_vec())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }
}
