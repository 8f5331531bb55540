use crate::entities::user_entity;
use crate::error::{AppError, AppResult};
use crate::external::IdentityProvider;
use crate::models::{AuthUser, VerifyTokenResponse};
use crate::services::{SettingsService, UserService};
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthService {
    identity: Arc<dyn IdentityProvider>,
    users: UserService,
    settings: SettingsService,
}

impl AuthService {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        users: UserService,
        settings: SettingsService,
    ) -> Self {
        Self {
            identity,
            users,
            settings,
        }
    }

    /// 校验 ID token；签名/过期等问题一律 401，上游故障原样返回
    pub async fn verify_token(&self, id_token: &str) -> AppResult<AuthUser> {
        if id_token.trim().is_empty() {
            return Err(AppError::ValidationError("idToken is required".to_string()));
        }
        self.identity
            .verify_id_token(id_token.trim())
            .await
            .map_err(|e| match e {
                AppError::ExternalApiError(_) | AppError::ReqwestError(_) => e,
                _ => AppError::AuthError("Invalid ID token".to_string()),
            })
    }

    pub async fn verify(&self, id_token: &str) -> AppResult<VerifyTokenResponse> {
        let user = self.verify_token(id_token).await?;
        Ok(VerifyTokenResponse {
            valid: true,
            uid: user.uid,
            email: user.email,
        })
    }

    /// 用 ID token 注册（网页端）
    pub async fn register(
        &self,
        id_token: &str,
        display_name: Option<String>,
    ) -> AppResult<(user_entity::Model, bool)> {
        let user = self.verify_token(id_token).await?;
        self.register_identity(&user, display_name).await
    }

    /// 已认证身份注册（移动端）
    pub async fn register_identity(
        &self,
        user: &AuthUser,
        display_name: Option<String>,
    ) -> AppResult<(user_entity::Model, bool)> {
        let settings = self.settings.get().await?;
        self.users
            .create_profile(user, display_name, &settings)
            .await
    }
}
