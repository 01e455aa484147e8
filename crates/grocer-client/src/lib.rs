pub mod cache;
pub mod membership;
pub mod notify;
pub mod optimistic;
pub mod sync;

use std::sync::Arc;

use grocer_types::Backend;

pub use cache::{CacheEntry, CacheKey, Collection, QueryCache};
pub use membership::{JoinError, MembershipResolver};
pub use notify::{BroadcastNotifier, Notifier};
pub use optimistic::{MutationPhase, OptimisticMutation};
pub use sync::{ListMutations, MutationError, Synchronizer};

/// One signed-in session's view of the backend: a cache plus the two
/// components that write through it.
#[derive(Clone)]
pub struct GrocerClient {
    backend: Arc<dyn Backend>,
    cache: QueryCache,
    resolver: MembershipResolver,
    sync: Synchronizer,
}

impl GrocerClient {
    pub fn new(backend: Arc<dyn Backend>, notifier: Arc<dyn Notifier>) -> Self {
        let cache = QueryCache::new();
        Self {
            resolver: MembershipResolver::new(backend.clone(), cache.clone(), notifier.clone()),
            sync: Synchronizer::new(backend.clone(), cache.clone(), notifier),
            backend,
            cache,
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn membership(&self) -> &MembershipResolver {
        &self.resolver
    }

    pub fn sync(&self) -> &Synchronizer {
        &self.sync
    }
}
