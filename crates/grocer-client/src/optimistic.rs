//! Optimistic mutations: change the cache first, then ask the backend.
//!
//! ```text
//! Idle --apply--> OptimisticallyApplied --Ok--> Confirmed   (snapshot dropped, key invalidated)
//!                                       --Err-> RolledBack  (rollback runs with the snapshot)
//! ```
//!
//! There is no timeout: the mutation waits for whatever the remote future
//! resolves to.

use std::future::Future;

use tracing::debug;

use crate::cache::{CacheEntry, CacheKey, QueryCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    Idle,
    OptimisticallyApplied,
    Confirmed,
    RolledBack,
}

type RollbackFn = Box<dyn FnOnce(&QueryCache, &CacheKey, Option<CacheEntry>) + Send>;

pub struct OptimisticMutation {
    cache: QueryCache,
    key: CacheKey,
    snapshot: Option<CacheEntry>,
    rollback: RollbackFn,
    phase: MutationPhase,
}

impl OptimisticMutation {
    /// A mutation whose rollback restores the snapshot taken by `apply`.
    pub fn new(cache: &QueryCache, key: CacheKey) -> Self {
        Self {
            cache: cache.clone(),
            key,
            snapshot: None,
            rollback: Box::new(|cache, key, snapshot| cache.restore(*key, snapshot)),
            phase: MutationPhase::Idle,
        }
    }

    /// Replaces the default snapshot restore with a targeted undo.
    pub fn with_rollback<F>(mut self, rollback: F) -> Self
    where
        F: FnOnce(&QueryCache, &CacheKey, Option<CacheEntry>) + Send + 'static,
    {
        self.rollback = Box::new(rollback);
        self
    }

    pub fn phase(&self) -> MutationPhase {
        self.phase
    }

    /// Snapshots the entry and applies `f` to it. A key with nothing cached
    /// is left alone; rollback then restores the empty state.
    pub fn apply<F>(&mut self, f: F)
    where
        F: FnOnce(&mut CacheEntry),
    {
        debug_assert_eq!(self.phase, MutationPhase::Idle);
        self.snapshot = self.cache.get(&self.key);
        self.cache.update(&self.key, f);
        self.phase = MutationPhase::OptimisticallyApplied;
    }

    /// Awaits the remote write and settles the mutation on its result.
    pub async fn commit<T, E, Fut>(&mut self, remote: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let result = remote.await;
        match &result {
            Ok(_) => self.confirm(),
            Err(_) => self.roll_back(),
        }
        result
    }

    fn confirm(&mut self) {
        self.snapshot = None;
        self.cache.invalidate(&self.key);
        self.phase = MutationPhase::Confirmed;
        debug!("Mutation on {} confirmed", self.key);
    }

    fn roll_back(&mut self) {
        let snapshot = self.snapshot.take();
        let rollback = std::mem::replace(&mut self.rollback, Box::new(|_, _, _| {}));
        rollback(&self.cache, &self.key, snapshot);
        self.phase = MutationPhase::RolledBack;
        debug!("Mutation on {} rolled back", self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (QueryCache, CacheKey) {
        let cache = QueryCache::new();
        let key = CacheKey::stores(uuid::Uuid::new_v4());
        cache.set(key, CacheEntry::Stores(vec!["Aldi".into(), "Netto".into()]));
        (cache, key)
    }

    fn drop_first(entry: &mut CacheEntry) {
        if let CacheEntry::Stores(stores) = entry {
            stores.remove(0);
        }
    }

    #[tokio::test]
    async fn confirm_keeps_change_and_invalidates() {
        let (cache, key) = seeded();
        let mut mutation = OptimisticMutation::new(&cache, key);
        assert_eq!(mutation.phase(), MutationPhase::Idle);

        mutation.apply(drop_first);
        assert_eq!(mutation.phase(), MutationPhase::OptimisticallyApplied);
        assert_eq!(cache.get(&key), Some(CacheEntry::Stores(vec!["Netto".into()])));

        let out: Result<u8, ()> = mutation.commit(async { Ok(7) }).await;
        assert_eq!(out, Ok(7));
        assert_eq!(mutation.phase(), MutationPhase::Confirmed);
        assert_eq!(cache.get(&key), Some(CacheEntry::Stores(vec!["Netto".into()])));
        assert!(cache.is_stale(&key));
    }

    #[tokio::test]
    async fn failure_restores_snapshot() {
        let (cache, key) = seeded();
        let before = cache.get(&key);
        let mut mutation = OptimisticMutation::new(&cache, key);

        mutation.apply(drop_first);
        let out: Result<(), &str> = mutation.commit(async { Err("offline") }).await;

        assert_eq!(out, Err("offline"));
        assert_eq!(mutation.phase(), MutationPhase::RolledBack);
        assert_eq!(cache.get(&key), before);
        assert!(!cache.is_stale(&key));
    }

    #[tokio::test]
    async fn custom_rollback_receives_snapshot() {
        let (cache, key) = seeded();
        let mut mutation = OptimisticMutation::new(&cache, key).with_rollback(|cache, key, snapshot| {
            assert!(snapshot.is_some());
            cache.set(*key, CacheEntry::Stores(vec!["undone".into()]));
        });

        mutation.apply(drop_first);
        let _: Result<(), ()> = mutation.commit(async { Err(()) }).await;

        assert_eq!(cache.get(&key), Some(CacheEntry::Stores(vec!["undone".into()])));
    }

    #[tokio::test]
    async fn apply_on_empty_key_rolls_back_to_empty() {
        let cache = QueryCache::new();
        let key = CacheKey::stores(uuid::Uuid::new_v4());
        let mut mutation = OptimisticMutation::new(&cache, key);

        mutation.apply(drop_first);
        let _: Result<(), ()> = mutation.commit(async { Err(()) }).await;

        assert!(!cache.contains(&key));
    }

    #[tokio::test]
    async fn change_is_visible_before_remote_resolves() {
        let (cache, key) = seeded();
        let (tx, rx) = tokio::sync::oneshot::channel::<Result<(), ()>>();
        let mut mutation = OptimisticMutation::new(&cache, key);
        mutation.apply(drop_first);

        let observer = cache.clone();
        let pending = tokio::spawn(async move {
            let result = mutation.commit(async { rx.await.unwrap_or(Err(())) }).await;
            (result, mutation.phase())
        });

        // Still in flight: the optimistic state is what readers see
        tokio::task::yield_now().await;
        assert_eq!(observer.stores(key.parent.unwrap()), Some(vec!["Netto".to_string()]));

        tx.send(Err(())).unwrap();
        let (result, phase) = pending.await.unwrap();
        assert!(result.is_err());
        assert_eq!(phase, MutationPhase::RolledBack);
        assert_eq!(
            observer.stores(key.parent.unwrap()),
            Some(vec!["Aldi".to_string(), "Netto".to_string()])
        );
    }
}
