//! 后台定时任务
//!
//! 启动时调用一次 `spawn_all`，任务通过 `tokio::spawn` 脱离运行，不阻塞。

use std::time::Duration;

use crate::services::{RateLimitService, SubscriptionService};

/// 限流桶清理间隔
const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

pub fn spawn_all(
    subscription_service: SubscriptionService,
    rate_limiter: RateLimitService,
    expiry_interval_secs: u64,
) {
    // 订阅到期清理
    {
        let svc = subscription_service.clone();
        let interval = Duration::from_secs(expiry_interval_secs.max(1));
        tokio::spawn(async move {
            loop {
                match svc.expire_overdue().await {
                    Ok(n) if n > 0 => log::info!("Expired subscriptions for {n} users"),
                    Ok(_) => {}
                    Err(e) => log::error!("Failed to expire subscriptions: {e:?}"),
                }
                tokio::time::sleep(interval).await;
            }
        });
    }

    // 限流桶清理，防止按 uid 的状态无限增长
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(RATE_LIMIT_PRUNE_INTERVAL).await;
            let remaining = rate_limiter.retain_recent().await;
            log::debug!("Pruned rate limiter state, {remaining} buckets remain");
        }
    });
}
