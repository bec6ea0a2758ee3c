use super::settings::ProtocolVersion;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;


#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountCacheEntry {
    pub account_id: String,
    pub infra_version: u32,
}


/// Account ids keyed by `(environment, account name, protocol)`.
///
/// The two login protocols resolve accounts through different endpoints, and
/// only protocol 2 reports an infra version, so their entries are kept apart.
///
/// Entries live until [`clear`](Self::clear) is called. Two sessions missing
/// the same key at the same time may both resolve it over the network; the
/// first insert wins and the second result is discarded.
#[derive(Debug, Default)]
pub struct AccountCache {
    entries: RwLock<HashMap<CacheKey, AccountCacheEntry>>,
}

type CacheKey = (String, String, ProtocolVersion);

fn key(environment: &str, account: &str, protocol: ProtocolVersion) -> CacheKey {
    (environment.to_string(), account.to_string(), protocol)
}

static SHARED: OnceLock<Arc<AccountCache>> = OnceLock::new();

impl AccountCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache every resolver uses unless given its own.
    pub fn shared() -> Arc<AccountCache> {
        SHARED.get_or_init(|| Arc::new(AccountCache::new())).clone()
    }

    pub async fn get(
        &self,
        environment: &str,
        account: &str,
        protocol: ProtocolVersion,
    ) -> Option<AccountCacheEntry> {
        let entries = self.entries.read().await;
        entries.get(&key(environment, account, protocol)).cloned()
    }

    /// Store `entry` unless the key is already present, and return the
    /// entry that ends up cached.
    pub async fn insert_if_absent(
        &self,
        environment: &str,
        account: &str,
        protocol: ProtocolVersion,
        entry: AccountCacheEntry,
    ) -> AccountCacheEntry {
        let mut entries = self.entries.write().await;
        entries
            .entry(key(environment, account, protocol))
            .or_insert(entry)
            .clone()
    }

    pub async fn clear(&self) {
        tracing::debug!("Clearing account cache");
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    const V2: ProtocolVersion = ProtocolVersion::V2;

    fn entry(id: &str) -> AccountCacheEntry {
        AccountCacheEntry { account_id: id.to_string(), infra_version: 2 }
    }

    #[tokio::test]
    async fn first_insert_wins() {
        let cache = AccountCache::new();

        assert_eq!(cache.insert_if_absent("app", "acme", V2, entry("a1")).await, entry("a1"));
        assert_eq!(cache.insert_if_absent("app", "acme", V2, entry("a2")).await, entry("a1"));
        assert_eq!(cache.get("app", "acme", V2).await, Some(entry("a1")));
    }

    #[tokio::test]
    async fn keys_include_environment() {
        let cache = AccountCache::new();
        cache.insert_if_absent("app", "acme", V2, entry("a1")).await;

        assert_eq!(cache.get("staging", "acme", V2).await, None);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn keys_include_protocol() {
        let cache = AccountCache::new();
        let v1 = AccountCacheEntry { account_id: "v1-id".to_string(), infra_version: 1 };
        cache.insert_if_absent("app", "acme", ProtocolVersion::V1, v1.clone()).await;

        assert_eq!(cache.get("app", "acme", V2).await, None);
        assert_eq!(cache.insert_if_absent("app", "acme", V2, entry("a1")).await, entry("a1"));
        assert_eq!(cache.get("app", "acme", ProtocolVersion::V1).await, Some(v1));
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let cache = AccountCache::new();
        cache.insert_if_absent("app", "acme", V2, entry("a1")).await;
        cache.clear().await;

        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn concurrent_inserts_keep_one_entry() {
        let cache = Arc::new(AccountCache::new());
        let mut handles = vec![];
        for i in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.insert_if_absent("app", "acme", V2, entry(&format!("a{i}"))).await
            }));
        }

        let mut winners = vec![];
        for handle in handles {
            winners.push(handle.await.unwrap());
        }
        winners.dedup();
        assert_eq!(winners.len(), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[test]
    fn shared_cache_is_a_singleton() {
        assert!(Arc::ptr_eq(&AccountCache::shared(), &AccountCache::shared()));
    }
}
