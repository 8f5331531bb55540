use crate::error::{AppError, AppResult};
use crate::external::IdentityProvider;
use crate::models::AuthUser;
use actix_web::http::Method;
use actix_web::{
    Error, HttpMessage, HttpRequest,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use futures_util::future::LocalBoxFuture;
use std::future::{Ready, ready};
use std::rc::Rc;
use std::sync::Arc;

// 公开路径配置
struct PublicPaths {
    exact_paths: Vec<&'static str>,
    prefix_paths: Vec<&'static str>,
    admin_prefixes: Vec<&'static str>,
}

impl PublicPaths {
    fn new() -> Self {
        Self {
            exact_paths: vec![
                "/",
                "/health",
                "/swagger-ui",
                "/api/subscriptions/plans",
                "/api/subscriptions/paystack-key",
                "/api/mobile/plans",
                "/api/mobile/paystack-key",
            ],
            prefix_paths: vec!["/swagger-ui/", "/api-docs/", "/api/auth/", "/api/webhooks/"],
            admin_prefixes: vec!["/api/admin/"],
        }
    }

    fn is_public_path(&self, path: &str) -> bool {
        if self.exact_paths.contains(&path) {
            return true;
        }
        self.prefix_paths
            .iter()
            .any(|&prefix| path.starts_with(prefix))
    }

    fn is_admin_path(&self, path: &str) -> bool {
        self.admin_prefixes
            .iter()
            .any(|&prefix| path.starts_with(prefix))
    }
}

/// 校验 `Authorization: Bearer <ID token>`，把 [`AuthUser`] 放进请求扩展
pub struct AuthMiddleware {
    identity: Arc<dyn IdentityProvider>,
}

impl AuthMiddleware {
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self { identity }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
            identity: self.identity.clone(),
            public_paths: Rc::new(PublicPaths::new()),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
    identity: Arc<dyn IdentityProvider>,
    public_paths: Rc<PublicPaths>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // 放行所有 CORS 预检请求
        if req.method() == Method::OPTIONS || self.public_paths.is_public_path(req.path()) {
            let fut = self.service.call(req);
            return Box::pin(fut);
        }

        let token = req
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let Some(token) = token else {
            let error = AppError::AuthError("Missing access token".to_string());
            return Box::pin(async move { Err(error.into()) });
        };

        let admin_only = self.public_paths.is_admin_path(req.path());
        let identity = self.identity.clone();
        let service = self.service.clone();

        Box::pin(async move {
            let user = identity.verify_id_token(&token).await.map_err(|e| match e {
                // JWKS 拉取失败属于上游问题，不算 401
                AppError::ExternalApiError(_) | AppError::ReqwestError(_) => e,
                other => {
                    log::debug!("Token rejected: {other}");
                    AppError::AuthError("Invalid or expired token".to_string())
                }
            })?;

            if admin_only && !user.is_admin {
                log::warn!("Non-admin {} denied on {}", user.uid, req.path());
                return Err(AppError::Forbidden("Admin access required".to_string()).into());
            }

            req.extensions_mut().insert(user);
            service.call(req).await
        })
    }
}

/// 取当前登录用户；中间件未放入时视为未认证
pub fn current_user(req: &HttpRequest) -> AppResult<AuthUser> {
    req.extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| AppError::AuthError("Not authenticated".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{StubIdentity, admin_user, auth_user};
    use actix_web::{App, HttpResponse, http::StatusCode, test, web};

    async fn whoami(req: HttpRequest) -> actix_web::Result<HttpResponse> {
        let user = current_user(&req)?;
        Ok(HttpResponse::Ok().body(user.uid))
    }

    fn identity() -> Arc<dyn IdentityProvider> {
        Arc::new(
            StubIdentity::default()
                .with_token("user-token", auth_user("u1"))
                .with_token("admin-token", admin_user("boss")),
        )
    }

    macro_rules! app {
        () => {
            test::init_service(
                App::new()
                    .wrap(AuthMiddleware::new(identity()))
                    .route("/health", web::get().to(|| async { HttpResponse::Ok().finish() }))
                    .route("/api/user/profile", web::get().to(whoami))
                    .route("/api/admin/stats", web::get().to(whoami)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_public_path_needs_no_token() {
        let app = app!();
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_missing_or_invalid_token_is_401() {
        let app = app!();
        let req = test::TestRequest::get().uri("/api/user/profile").to_request();
        let err = test::try_call_service(&app, req).await.err().unwrap();
        assert_eq!(err.as_response_error().status_code(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/api/user/profile")
            .insert_header(("Authorization", "Bearer wrong"))
            .to_request();
        let err = test::try_call_service(&app, req).await.err().unwrap();
        assert_eq!(err.as_response_error().status_code(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_valid_token_reaches_handler() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/user/profile")
            .insert_header(("Authorization", "Bearer user-token"))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "u1");
    }

    #[actix_web::test]
    async fn test_admin_routes_require_claim() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/admin/stats")
            .insert_header(("Authorization", "Bearer user-token"))
            .to_request();
        let err = test::try_call_service(&app, req).await.err().unwrap();
        assert_eq!(err.as_response_error().status_code(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::get()
            .uri("/api/admin/stats")
            .insert_header(("Authorization", "Bearer admin-token"))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "boss");
    }

    #[actix_web::test]
    async fn test_public_paths() {
        let paths = PublicPaths::new();
        assert!(paths.is_public_path("/"));
        assert!(paths.is_public_path("/api/auth/register"));
        assert!(paths.is_public_path("/api/webhooks/paystack"));
        assert!(paths.is_public_path("/api/mobile/plans"));
        assert!(!paths.is_public_path("/api/mobile/profile"));
        assert!(!paths.is_public_path("/api/subscriptions/my-subscription"));
        assert!(paths.is_admin_path("/api/admin/subscriptions/all"));
    }
}
