// Accounts cache
// The accounts-list projection is cached per user by the read side. The
// ledger never reads it; it only drops entries after a balance changes.

use log::{debug, warn};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::CacheConfig;
use crate::database::models::{Account, UserId};

/// Cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Cache of each user's accounts list
#[cfg_attr(test, mockall::automock)]
pub trait AccountsCache: Send + Sync {
    fn set(&self, user_id: UserId, accounts: &[Account]) -> Result<(), CacheError>;
    fn get(&self, user_id: UserId) -> Result<Option<Vec<Account>>, CacheError>;
    fn delete(&self, user_id: UserId) -> Result<(), CacheError>;
}

/// Key under which a user's accounts list is cached
pub fn accounts_cache_key(user_id: UserId) -> String {
    format!("user_accounts:{}", user_id)
}

/// Build the cache described by the configuration
pub fn from_config(config: &CacheConfig) -> Arc<dyn AccountsCache> {
    if config.enabled {
        Arc::new(InMemoryCache::new(Duration::from_secs(config.ttl_seconds)))
    } else {
        Arc::new(NoopCache)
    }
}

struct CacheEntry {
    payload: String,
    expires_at: Instant,
}

/// Process-local cache holding JSON payloads with a fixed time to live
pub struct InMemoryCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> CacheError {
    CacheError::Unavailable("cache lock poisoned".to_string())
}

impl AccountsCache for InMemoryCache {
    fn set(&self, user_id: UserId, accounts: &[Account]) -> Result<(), CacheError> {
        let payload = serde_json::to_string(accounts)?;
        let entry = CacheEntry {
            payload,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(accounts_cache_key(user_id), entry);
        Ok(())
    }

    fn get(&self, user_id: UserId) -> Result<Option<Vec<Account>>, CacheError> {
        let key = accounts_cache_key(user_id);
        let payload = {
            let entries = self.entries.read().map_err(poisoned)?;
            match entries.get(&key) {
                Some(entry) if entry.expires_at > Instant::now() => entry.payload.clone(),
                Some(_) => {
                    drop(entries);
                    self.entries.write().map_err(poisoned)?.remove(&key);
                    return Ok(None);
                }
                None => return Ok(None),
            }
        };
        Ok(Some(serde_json::from_str(&payload)?))
    }

    fn delete(&self, user_id: UserId) -> Result<(), CacheError> {
        self.entries
            .write()
            .map_err(poisoned)?
            .remove(&accounts_cache_key(user_id));
        Ok(())
    }
}

/// Cache used when caching is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl AccountsCache for NoopCache {
    fn set(&self, _user_id: UserId, _accounts: &[Account]) -> Result<(), CacheError> {
        Ok(())
    }

    fn get(&self, _user_id: UserId) -> Result<Option<Vec<Account>>, CacheError> {
        Ok(None)
    }

    fn delete(&self, _user_id: UserId) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Drops cached projections after balance changes. Best effort: a failure
/// is logged and the stale entry lives until its TTL or the next mutation.
#[derive(Clone)]
pub struct CacheInvalidator {
    cache: Arc<dyn AccountsCache>,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<dyn AccountsCache>) -> Self {
        Self { cache }
    }

    /// Invalidate the projection of every owner of `accounts`, once per owner
    pub fn invalidate(&self, accounts: &[&Account]) {
        let owners: BTreeSet<UserId> = accounts.iter().map(|account| account.user_id).collect();

        for user_id in owners {
            match self.cache.delete(user_id) {
                Ok(()) => debug!("Invalidated accounts cache for user {}", user_id),
                Err(e) => warn!("Failed to invalidate accounts cache for user {}: {}", user_id, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mockall::predicate::eq;
    use rust_decimal::Decimal;

    fn account(id: i64, user_id: UserId) -> Account {
        let now = Utc::now();
        Account {
            id,
            user_id,
            currency: "TJS".to_string(),
            balance: Decimal::new(1000, 0),
            blocked: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_in_memory_set_get_delete() {
        let cache = InMemoryCache::new(Duration::from_secs(60));
        let accounts = vec![account(1, 7), account(2, 7)];

        cache.set(7, &accounts).unwrap();
        assert_eq!(cache.get(7).unwrap(), Some(accounts));
        assert_eq!(cache.get(8).unwrap(), None);

        cache.delete(7).unwrap();
        assert_eq!(cache.get(7).unwrap(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_in_memory_entries_expire() {
        let cache = InMemoryCache::new(Duration::ZERO);
        cache.set(7, &[account(1, 7)]).unwrap();
        assert_eq!(cache.get(7).unwrap(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_noop_cache() {
        let cache = NoopCache;
        cache.set(7, &[account(1, 7)]).unwrap();
        assert_eq!(cache.get(7).unwrap(), None);
    }

    #[test]
    fn test_invalidate_deletes_once_per_owner() {
        let mut mock = MockAccountsCache::new();
        mock.expect_delete().with(eq(7)).times(1).returning(|_| Ok(()));
        mock.expect_delete().with(eq(9)).times(1).returning(|_| Ok(()));

        let invalidator = CacheInvalidator::new(Arc::new(mock));
        let (a, b, c) = (account(1, 7), account(2, 7), account(3, 9));
        invalidator.invalidate(&[&a, &b, &c]);
    }

    #[test]
    fn test_invalidate_swallows_failures() {
        let mut mock = MockAccountsCache::new();
        mock.expect_delete()
            .times(1)
            .returning(|_| Err(CacheError::Unavailable("connection refused".to_string())));

        let invalidator = CacheInvalidator::new(Arc::new(mock));
        invalidator.invalidate(&[&account(1, 7)]);
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(accounts_cache_key(42), "user_accounts:42");
    }
}
