use crate::config::FirebaseConfig;
use crate::error::{AppError, AppResult};
use crate::external::google_auth::GoogleTokenSource;
use crate::models::AuthUser;
use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const JWKS_TTL: Duration = Duration::from_secs(3600);

/// 身份提供方：校验 ID token，并代理少量账号管理操作
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify_id_token(&self, token: &str) -> AppResult<AuthUser>;
    async fn set_admin_claim(&self, uid: &str, is_admin: bool) -> AppResult<()>;
    async fn set_disabled(&self, uid: &str, disabled: bool) -> AppResult<()>;
    async fn delete_user(&self, uid: &str) -> AppResult<()>;
}

#[derive(Debug, Deserialize)]
struct FirebaseClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    admin: Option<bool>,
}

struct CachedJwks {
    keys: JwkSet,
    fetched_at: Instant,
}

pub struct FirebaseAuth {
    client: Client,
    project_id: String,
    tokens: GoogleTokenSource,
    jwks: RwLock<Option<CachedJwks>>,
}

impl FirebaseAuth {
    pub fn new(config: &FirebaseConfig) -> AppResult<Self> {
        let client = Client::new();
        let tokens =
            GoogleTokenSource::from_credentials_file(client.clone(), config.credentials_path.as_deref())?;
        Ok(Self {
            client,
            project_id: config.project_id.clone(),
            tokens,
            jwks: RwLock::new(None),
        })
    }

    fn issuer(&self) -> String {
        format!("https://securetoken.google.com/{}", self.project_id)
    }

    /// 根据 kid 取公钥；缓存过期或找不到 kid 时重新拉取
    async fn decoding_key(&self, kid: &str) -> AppResult<DecodingKey> {
        {
            let cache = self.jwks.read().await;
            if let Some(cached) = cache.as_ref()
                && cached.fetched_at.elapsed() < JWKS_TTL
                && let Some(jwk) = cached.keys.find(kid)
            {
                return Ok(DecodingKey::from_jwk(jwk)?);
            }
        }

        let keys = self.fetch_jwks().await?;
        let key = keys
            .find(kid)
            .map(DecodingKey::from_jwk)
            .transpose()?
            .ok_or_else(|| AppError::AuthError("Unknown signing key".to_string()))?;

        let mut cache = self.jwks.write().await;
        *cache = Some(CachedJwks {
            keys,
            fetched_at: Instant::now(),
        });
        Ok(key)
    }

    async fn fetch_jwks(&self) -> AppResult<JwkSet> {
        log::debug!("Refreshing Firebase signing keys");
        let response = self.client.get(JWKS_URL).send().await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(AppError::ExternalApiError(format!(
                "Failed to fetch signing keys: {error_text}"
            )))
        }
    }

    async fn admin_call(&self, action: &str, body: serde_json::Value) -> AppResult<()> {
        let token = self.tokens.access_token().await?;
        let url = format!(
            "{IDENTITY_TOOLKIT_URL}/projects/{}/accounts:{action}",
            self.project_id
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            Err(AppError::ExternalApiError(format!(
                "Identity Toolkit accounts:{action} failed ({status}): {error_text}"
            )))
        }
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    async fn verify_id_token(&self, token: &str) -> AppResult<AuthUser> {
        let header = jsonwebtoken::decode_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(AppError::AuthError("Unexpected token algorithm".to_string()));
        }
        let kid = header
            .kid
            .ok_or_else(|| AppError::AuthError("Token has no key id".to_string()))?;
        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.project_id.as_str()]);
        validation.set_issuer(&[self.issuer()]);

        let data = jsonwebtoken::decode::<FirebaseClaims>(token, &key, &validation)?;
        let claims = data.claims;
        if claims.sub.is_empty() {
            return Err(AppError::AuthError("Token subject is empty".to_string()));
        }

        Ok(AuthUser {
            uid: claims.sub,
            email: claims.email,
            name: claims.name,
            is_admin: claims.admin.unwrap_or(false),
        })
    }

    async fn set_admin_claim(&self, uid: &str, is_admin: bool) -> AppResult<()> {
        let attributes = json!({ "admin": is_admin }).to_string();
        self.admin_call(
            "update",
            json!({ "localId": uid, "customAttributes": attributes }),
        )
        .await?;
        log::info!("Admin claim for {uid} set to {is_admin}");
        Ok(())
    }

    async fn set_disabled(&self, uid: &str, disabled: bool) -> AppResult<()> {
        self.admin_call("update", json!({ "localId": uid, "disableUser": disabled }))
            .await
    }

    async fn delete_user(&self, uid: &str) -> AppResult<()> {
        self.admin_call("delete", json!({ "localId": uid })).await
    }
}
