use crate::entities::Tier;
use crate::error::{AppError, AppResult};
use crate::models::RateLimits;
use governor::clock::DefaultClock;
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::RwLock;

pub type KeyedRateLimiter = RateLimiter<String, DashMapStateStore<String>, DefaultClock>;

/// 每个等级一个按 uid 分桶的每分钟限流器；0 表示不限
struct TierLimiters {
    limits: RateLimits,
    free: Option<KeyedRateLimiter>,
    pro: Option<KeyedRateLimiter>,
    enterprise: Option<KeyedRateLimiter>,
}

impl TierLimiters {
    fn new(limits: RateLimits) -> Self {
        Self {
            free: per_minute(limits.free_per_minute),
            pro: per_minute(limits.pro_per_minute),
            enterprise: per_minute(limits.enterprise_per_minute),
            limits,
        }
    }

    fn all(&self) -> impl Iterator<Item = &KeyedRateLimiter> {
        [&self.free, &self.pro, &self.enterprise]
            .into_iter()
            .flatten()
    }

    fn for_tier(&self, tier: Tier) -> Option<&KeyedRateLimiter> {
        match tier {
            Tier::Free => self.free.as_ref(),
            Tier::Pro => self.pro.as_ref(),
            Tier::Enterprise => self.enterprise.as_ref(),
        }
    }
}

fn per_minute(limit: u32) -> Option<KeyedRateLimiter> {
    NonZeroU32::new(limit).map(|n| RateLimiter::keyed(Quota::per_minute(n)))
}

#[derive(Clone)]
pub struct RateLimitService {
    inner: Arc<RwLock<TierLimiters>>,
}

impl Default for RateLimitService {
    fn default() -> Self {
        Self::new(RateLimits::default())
    }
}

impl RateLimitService {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            inner: Arc::new(RwLock::new(TierLimiters::new(limits))),
        }
    }

    /// 按当前设置检查一次请求；设置变化时重建限流器
    pub async fn check(&self, uid: &str, tier: Tier, limits: &RateLimits) -> AppResult<()> {
        {
            let current = self.inner.read().await;
            if current.limits == *limits {
                return Self::check_with(&current, uid, tier);
            }
        }

        let mut current = self.inner.write().await;
        if current.limits != *limits {
            log::info!(
                "Rebuilding rate limiters: free={}/min, pro={}/min, enterprise={}/min",
                limits.free_per_minute,
                limits.pro_per_minute,
                limits.enterprise_per_minute
            );
            *current = TierLimiters::new(limits.clone());
        }
        Self::check_with(&current, uid, tier)
    }

    /// 清掉已完全恢复的 uid 桶，返回剩余的桶数
    pub async fn retain_recent(&self) -> usize {
        let current = self.inner.read().await;
        current
            .all()
            .map(|limiter| {
                limiter.retain_recent();
                limiter.shrink_to_fit();
                limiter.len()
            })
            .sum()
    }

    fn check_with(limiters: &TierLimiters, uid: &str, tier: Tier) -> AppResult<()> {
        let Some(limiter) = limiters.for_tier(tier) else {
            return Ok(());
        };
        limiter.check_key(&uid.to_string()).map_err(|_| {
            log::warn!("Rate limit hit for {uid} ({tier})");
            AppError::RateLimited
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(free: u32) -> RateLimits {
        RateLimits {
            free_per_minute: free,
            pro_per_minute: 5,
            enterprise_per_minute: 0,
        }
    }

    #[tokio::test]
    async fn test_burst_then_limited() {
        let service = RateLimitService::new(limits(2));
        let l = limits(2);
        assert!(service.check("u1", Tier::Free, &l).await.is_ok());
        assert!(service.check("u1", Tier::Free, &l).await.is_ok());
        assert!(matches!(
            service.check("u1", Tier::Free, &l).await,
            Err(AppError::RateLimited)
        ));
        // 其他用户不受影响
        assert!(service.check("u2", Tier::Free, &l).await.is_ok());
    }

    #[tokio::test]
    async fn test_zero_means_unlimited() {
        let service = RateLimitService::new(limits(1));
        let l = limits(1);
        for _ in 0..50 {
            assert!(service.check("big", Tier::Enterprise, &l).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_settings_change_rebuilds() {
        let service = RateLimitService::new(limits(1));
        assert!(service.check("u1", Tier::Free, &limits(1)).await.is_ok());
        assert!(service.check("u1", Tier::Free, &limits(1)).await.is_err());
        // 新的配额生效，桶被重置
        assert!(service.check("u1", Tier::Free, &limits(3)).await.is_ok());
    }

    #[tokio::test]
    async fn test_retain_recent_keeps_active_buckets() {
        let service = RateLimitService::new(limits(1));
        let l = limits(1);
        assert_eq!(service.retain_recent().await, 0);

        service.check("u1", Tier::Free, &l).await.unwrap();
        service.check("u2", Tier::Pro, &l).await.unwrap();
        // 不限流的等级不建桶
        service.check("big", Tier::Enterprise, &l).await.unwrap();
        assert_eq!(service.retain_recent().await, 2);

        // 仍在冷却中的桶不会被清掉
        assert!(matches!(
            service.check("u1", Tier::Free, &l).await,
            Err(AppError::RateLimited)
        ));
    }
}
