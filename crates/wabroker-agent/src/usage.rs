use std::sync::Arc;

use chrono::Datelike;
use wabroker_core::types::TenantId;
use wabroker_store::Store;

use crate::error::Result;

/// Outcome of the pre-check ahead of invoking the Agent (spec §4.7). The
/// pre-check is advisory — it may be stale by up to one concurrent
/// message — the authoritative step is the post-increment after a send
/// actually happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageDecision {
    Allowed,
    DailyCapReached,
    MonthlyCapReached,
}

/// Gates the outbound path against a tenant's subscription caps. Lives
/// alongside the tool layer because both the dispatcher's pre-check and
/// every tool send share the same counter.
pub struct UsageGuard {
    store: Arc<Store>,
}

impl UsageGuard {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn check(
        &self,
        tenant_id: TenantId,
        daily_cap: Option<u64>,
        monthly_cap: Option<u64>,
    ) -> Result<UsageDecision> {
        let today = self.store.get_usage_today(tenant_id).await?;
        if let Some(cap) = daily_cap {
            if today.outbound_count >= cap {
                return Ok(UsageDecision::DailyCapReached);
            }
        }
        if let Some(cap) = monthly_cap {
            let now = chrono::Utc::now();
            let monthly = self
                .store
                .get_monthly_outbound(tenant_id, now.year(), now.month())
                .await?;
            if monthly >= cap {
                return Ok(UsageDecision::MonthlyCapReached);
            }
        }
        Ok(UsageDecision::Allowed)
    }

    /// Authoritative post-increment, called once per outbound message
    /// (worker's final send, and every tool send that reaches transport).
    pub async fn record_outbound(&self, tenant_id: TenantId) -> Result<u64> {
        Ok(self.store.increment_outbound(tenant_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn test_store() -> Arc<Store> {
        let conn = Connection::open_in_memory().unwrap();
        wabroker_store::db::init_db(&conn).unwrap();
        Arc::new(Store::new(conn))
    }

    #[tokio::test]
    async fn allows_when_under_cap() {
        let guard = UsageGuard::new(test_store());
        let decision = guard.check(TenantId(1), Some(10), None).await.unwrap();
        assert_eq!(decision, UsageDecision::Allowed);
    }

    #[tokio::test]
    async fn blocks_once_daily_cap_reached() {
        let store = test_store();
        let guard = UsageGuard::new(store.clone());
        for _ in 0..3 {
            guard.record_outbound(TenantId(1)).await.unwrap();
        }
        let decision = guard.check(TenantId(1), Some(3), None).await.unwrap();
        assert_eq!(decision, UsageDecision::DailyCapReached);
    }
}
