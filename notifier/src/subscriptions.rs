//! The subscription index: a persistent `line → users` mapping with a
//! write-through, TTL-bounded cache in front of it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use optimaldn_common::schema::ActiveSubscription;
use parking_lot::Mutex;
use sqlx::PgPool;
use thiserror::Error;
use tracing::debug;

const CACHE_TTL: Duration = Duration::from_secs(5 * 60);
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistent backing store for active subscriptions, keyed by user.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// All users whose subscription contains `line`.
    async fn users_on_line(&self, line: &str) -> Result<Vec<String>, SubscriptionError>;
    /// Write the subscription, replacing any prior one for the same user.
    async fn upsert(&self, subscription: &ActiveSubscription) -> Result<(), SubscriptionError>;
    /// Remove the user's subscription, returning the previous value.
    async fn delete(&self, user_id: &str) -> Result<Option<ActiveSubscription>, SubscriptionError>;
}

pub struct PostgresSubscriptionStore {
    pool: PgPool,
}

impl PostgresSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    async fn users_on_line(&self, line: &str) -> Result<Vec<String>, SubscriptionError> {
        let users = sqlx::query_scalar::<_, String>(
            "SELECT user_id FROM active_routes WHERE $1 = ANY(line_ids)",
        )
        .bind(line)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn upsert(&self, subscription: &ActiveSubscription) -> Result<(), SubscriptionError> {
        sqlx::query(
            "INSERT INTO active_routes (user_id, line_ids) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET line_ids = EXCLUDED.line_ids",
        )
        .bind(&subscription.user_id)
        .bind(&subscription.line_ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<Option<ActiveSubscription>, SubscriptionError> {
        let removed = sqlx::query_as::<_, (String, Vec<String>)>(
            "DELETE FROM active_routes WHERE user_id = $1 RETURNING user_id, line_ids",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(removed.map(|(user_id, line_ids)| ActiveSubscription { user_id, line_ids }))
    }
}

struct CacheEntry {
    users: Vec<String>,
    inserted_at: Instant,
}

/// Write-through cache over a [`SubscriptionStore`], keyed by line name.
///
/// Empty lookup results are deliberately not cached so newly subscribed
/// users are seen on the next alert.
pub struct SubscriptionIndex<S> {
    store: S,
    cache: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl<S: SubscriptionStore> SubscriptionIndex<S> {
    pub fn new(store: S) -> Self {
        Self::with_ttl(store, CACHE_TTL)
    }

    pub fn with_ttl(store: S, ttl: Duration) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn lookup_users(&self, line: &str) -> Result<Vec<String>, SubscriptionError> {
        if let Some(users) = self.cached(line) {
            debug!(line, "subscription cache hit");
            return Ok(users);
        }
        debug!(line, "subscription cache miss, querying store");
        let users = self.store.users_on_line(line).await?;
        if !users.is_empty() {
            self.cache.lock().insert(
                line.to_string(),
                CacheEntry {
                    users: users.clone(),
                    inserted_at: Instant::now(),
                },
            );
        }
        Ok(users)
    }

    pub async fn upsert(&self, subscription: &ActiveSubscription) -> Result<(), SubscriptionError> {
        self.store.upsert(subscription).await?;
        let mut cache = self.cache.lock();
        for line in &subscription.line_ids {
            cache.remove(line);
        }
        Ok(())
    }

    pub async fn delete(
        &self,
        user_id: &str,
    ) -> Result<Option<ActiveSubscription>, SubscriptionError> {
        let removed = self.store.delete(user_id).await?;
        if let Some(subscription) = &removed {
            self.evict_user(user_id, &subscription.line_ids);
        }
        Ok(removed)
    }

    fn cached(&self, line: &str) -> Option<Vec<String>> {
        let mut cache = self.cache.lock();
        match cache.get(line) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.users.clone()),
            Some(_) => {
                cache.remove(line);
                None
            }
            None => None,
        }
    }

    /// Remove the user from every cached entry of the given lines; entries
    /// left empty are dropped entirely.
    fn evict_user(&self, user_id: &str, lines: &[String]) {
        let mut cache = self.cache.lock();
        for line in lines {
            let Some(entry) = cache.get_mut(line) else {
                continue;
            };
            entry.users.retain(|cached| cached != user_id);
            if entry.users.is_empty() {
                cache.remove(line);
                debug!(line, "dropped empty subscription cache entry");
            }
        }
    }

    /// Drop entries older than the TTL. Run periodically.
    pub fn sweep_expired(&self) {
        let mut cache = self.cache.lock();
        let before = cache.len();
        let ttl = self.ttl;
        cache.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
        let removed = before - cache.len();
        if removed > 0 {
            debug!(removed, "swept expired subscription cache entries");
        }
    }

    #[cfg(test)]
    pub(crate) fn cached_lines(&self) -> Vec<String> {
        self.cache.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory store recording how often the persistent layer is hit.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub rows: Mutex<HashMap<String, ActiveSubscription>>,
        pub queries: AtomicUsize,
    }

    impl MemoryStore {
        pub fn with_subscription(user_id: &str, lines: &[&str]) -> Self {
            let store = Self::default();
            store.rows.lock().insert(
                user_id.to_string(),
                ActiveSubscription {
                    user_id: user_id.to_string(),
                    line_ids: lines.iter().map(|l| l.to_string()).collect(),
                },
            );
            store
        }
    }

    #[async_trait]
    impl SubscriptionStore for MemoryStore {
        async fn users_on_line(&self, line: &str) -> Result<Vec<String>, SubscriptionError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            let rows = self.rows.lock();
            let mut users: Vec<String> = rows
                .values()
                .filter(|sub| sub.line_ids.iter().any(|l| l == line))
                .map(|sub| sub.user_id.clone())
                .collect();
            users.sort();
            Ok(users)
        }

        async fn upsert(&self, subscription: &ActiveSubscription) -> Result<(), SubscriptionError> {
            self.rows
                .lock()
                .insert(subscription.user_id.clone(), subscription.clone());
            Ok(())
        }

        async fn delete(
            &self,
            user_id: &str,
        ) -> Result<Option<ActiveSubscription>, SubscriptionError> {
            Ok(self.rows.lock().remove(user_id))
        }
    }

    #[tokio::test]
    async fn lookup_populates_the_cache() {
        let index = SubscriptionIndex::new(MemoryStore::with_subscription("alice", &["jubilee"]));
        assert_eq!(index.lookup_users("jubilee").await.unwrap(), vec!["alice"]);
        assert_eq!(index.lookup_users("jubilee").await.unwrap(), vec!["alice"]);
        assert_eq!(index.store.queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_results_are_not_cached() {
        let index = SubscriptionIndex::new(MemoryStore::default());
        assert!(index.lookup_users("jubilee").await.unwrap().is_empty());
        assert!(index.lookup_users("jubilee").await.unwrap().is_empty());
        // both calls re-check the store
        assert_eq!(index.store.queries.load(Ordering::SeqCst), 2);
        assert!(index.cached_lines().is_empty());
    }

    #[tokio::test]
    async fn upsert_invalidates_the_new_subscription_lines() {
        let index = SubscriptionIndex::new(MemoryStore::with_subscription("alice", &["jubilee"]));
        index.lookup_users("jubilee").await.unwrap();

        index
            .upsert(&ActiveSubscription {
                user_id: "bob".into(),
                line_ids: vec!["jubilee".into(), "central".into()],
            })
            .await
            .unwrap();

        assert!(index.cached_lines().is_empty());
        let users = index.lookup_users("jubilee").await.unwrap();
        assert_eq!(users, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn delete_evicts_the_user_and_drops_empty_entries() {
        let store = MemoryStore::with_subscription("alice", &["jubilee", "central"]);
        store.rows.lock().insert(
            "bob".into(),
            ActiveSubscription {
                user_id: "bob".into(),
                line_ids: vec!["central".into()],
            },
        );
        let index = SubscriptionIndex::new(store);
        index.lookup_users("jubilee").await.unwrap();
        index.lookup_users("central").await.unwrap();

        let removed = index.delete("alice").await.unwrap().unwrap();
        assert_eq!(removed.line_ids, vec!["jubilee", "central"]);

        // jubilee had only alice: entry dropped; central still has bob
        assert_eq!(index.cached_lines(), vec!["central"]);
        assert_eq!(index.lookup_users("central").await.unwrap(), vec!["bob"]);
        assert!(index.lookup_users("jubilee").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_of_unknown_user_returns_none() {
        let index = SubscriptionIndex::new(MemoryStore::default());
        assert!(index.delete("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_refetched_and_swept() {
        let store = MemoryStore::with_subscription("alice", &["jubilee"]);
        let index = SubscriptionIndex::with_ttl(store, Duration::from_millis(10));
        index.lookup_users("jubilee").await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        index.sweep_expired();
        assert!(index.cached_lines().is_empty());

        index.lookup_users("jubilee").await.unwrap();
        assert_eq!(index.store.queries.load(Ordering::SeqCst), 2);
    }
}
