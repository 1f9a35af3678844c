// Moka cache for resolved role sets

use crate::core::models::RoleSet;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Moka-based role cache
///
/// In-memory, per-principal cache of resolved role sets with TTL
/// expiration. Only the role resolver writes to it.
pub struct MokaRoleCache {
    cache: Cache<String, Arc<RoleSet>>,
}

impl MokaRoleCache {
    /// # Parameters
    /// * `ttl_secs` - Time-to-live for cached role sets in seconds
    /// * `max_capacity` - Maximum number of principals to cache
    pub fn new(ttl_secs: u64, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(ttl_secs))
            .max_capacity(max_capacity)
            .build();

        Self { cache }
    }

    pub async fn get(&self, principal_id: &str) -> Option<RoleSet> {
        self.cache.get(principal_id).await.map(|roles| (*roles).clone())
    }

    pub async fn insert(&self, principal_id: &str, roles: RoleSet) {
        self.cache.insert(principal_id.to_string(), Arc::new(roles)).await;
    }

    pub async fn invalidate(&self, principal_id: &str) {
        self.cache.invalidate(principal_id).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

impl Default for MokaRoleCache {
    fn default() -> Self {
        Self::new(300, 1000)
    }
}
