use crate::entities::settings_entity::{self, SYSTEM_SETTINGS_ID};
use crate::error::{AppError, AppResult};
use crate::models::SystemSettings;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel, Set};

#[derive(Clone)]
pub struct SettingsService {
    pool: DatabaseConnection,
}

impl SettingsService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    /// 读取全局设置；尚未保存过时返回默认值
    pub async fn get(&self) -> AppResult<SystemSettings> {
        let row = settings_entity::Entity::find_by_id(SYSTEM_SETTINGS_ID.to_string())
            .one(&self.pool)
            .await?;
        Ok(row.map(SystemSettings::from).unwrap_or_default())
    }

    pub async fn update(&self, settings: SystemSettings) -> AppResult<SystemSettings> {
        validate(&settings)?;

        let to_i32 = |v: u32| i32::try_from(v).unwrap_or(i32::MAX);
        let enabled_models = serde_json::to_value(&settings.enabled_models)?;
        let now = Utc::now();

        let existing = settings_entity::Entity::find_by_id(SYSTEM_SETTINGS_ID.to_string())
            .one(&self.pool)
            .await?;

        let saved = match existing {
            Some(row) => {
                let mut am = row.into_active_model();
                am.maintenance_mode = Set(settings.maintenance_mode);
                am.registration_enabled = Set(settings.registration_enabled);
                am.default_tier = Set(settings.default_tier);
                am.enabled_models = Set(enabled_models);
                am.free_tier_daily_limit = Set(settings.free_tier_daily_limit);
                am.rate_limit_free = Set(to_i32(settings.rate_limits.free_per_minute));
                am.rate_limit_pro = Set(to_i32(settings.rate_limits.pro_per_minute));
                am.rate_limit_enterprise = Set(to_i32(settings.rate_limits.enterprise_per_minute));
                am.updated_at = Set(now);
                am.update(&self.pool).await?
            }
            None => {
                settings_entity::ActiveModel {
                    id: Set(SYSTEM_SETTINGS_ID.to_string()),
                    maintenance_mode: Set(settings.maintenance_mode),
                    registration_enabled: Set(settings.registration_enabled),
                    default_tier: Set(settings.default_tier),
                    enabled_models: Set(enabled_models),
                    free_tier_daily_limit: Set(settings.free_tier_daily_limit),
                    rate_limit_free: Set(to_i32(settings.rate_limits.free_per_minute)),
                    rate_limit_pro: Set(to_i32(settings.rate_limits.pro_per_minute)),
                    rate_limit_enterprise: Set(to_i32(settings.rate_limits.enterprise_per_minute)),
                    updated_at: Set(now),
                }
                .insert(&self.pool)
                .await?
            }
        };

        log::info!(
            "System settings updated: maintenance={}, registration={}",
            saved.maintenance_mode,
            saved.registration_enabled
        );
        Ok(saved.into())
    }
}

fn validate(settings: &SystemSettings) -> AppResult<()> {
    if settings.free_tier_daily_limit < 0 {
        return Err(AppError::ValidationError(
            "freeTierDailyLimit must not be negative".to_string(),
        ));
    }
    if settings.enabled_models.iter().any(|m| m.trim().is_empty()) {
        return Err(AppError::ValidationError(
            "enabledModels must not contain empty entries".to_string(),
        ));
    }
    Ok(())
}
