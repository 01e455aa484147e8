//! Mutation/cache synchronizer.
//!
//! Writes go through the same cycle: apply locally, send to the backend,
//! then either confirm (invalidate and refetch the collection) or roll back
//! and emit a single failure notification. Adding an item or a list has no
//! optimistic step since there is no server id to show yet.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use grocer_types::api::{DeleteListOutcome, NewItem, NewList, ProfileUpdate};
use grocer_types::backend::{Backend, BackendError};
use grocer_types::events::Notification;
use grocer_types::models::{
    ANONYMOUS_MEMBER, GroceryItem, GroceryList, Language, ListRole, ListSummary, Member, Profile,
};

use crate::cache::{CacheEntry, CacheKey, Collection, QueryCache};
use crate::notify::Notifier;
use crate::optimistic::OptimisticMutation;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("item name must not be empty")]
    EmptyItemName,
    #[error("list name must not be empty")]
    EmptyListName,
    #[error("store name must not be empty")]
    EmptyStoreName,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Why a list delete did not go through.
enum DeleteRefusal {
    /// The procedure answered `false` without failing.
    NotOwner,
    Backend(BackendError),
}

#[derive(Clone)]
pub struct Synchronizer {
    backend: Arc<dyn Backend>,
    cache: QueryCache,
    notifier: Arc<dyn Notifier>,
}

impl Synchronizer {
    pub fn new(backend: Arc<dyn Backend>, cache: QueryCache, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            backend,
            cache,
            notifier,
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Item and store operations scoped to one list.
    pub fn list(&self, list_id: Uuid) -> ListMutations {
        ListMutations {
            sync: self.clone(),
            list_id,
        }
    }

    // -- Reads --

    /// Owned lists first, then joined ones, each newest first. A list the
    /// user both owns and joined shows up once, as owned.
    pub async fn refresh_lists(&self) -> Result<Vec<ListSummary>, BackendError> {
        let user = self.backend.current_user().await?;
        let owned = self.backend.owned_lists(user.id).await?;
        let joined = self.backend.member_lists(user.id).await?;

        let mut summaries = Vec::with_capacity(owned.len() + joined.len());
        for list in &owned {
            let item_count = self.backend.item_count(list.id).await?;
            summaries.push(ListSummary {
                list: list.clone(),
                role: ListRole::Owner,
                item_count,
            });
        }
        for list in joined {
            if owned.iter().any(|o| o.id == list.id) {
                continue;
            }
            let item_count = self.backend.item_count(list.id).await?;
            summaries.push(ListSummary {
                list,
                role: ListRole::Shared,
                item_count,
            });
        }

        self.cache.set(CacheKey::lists(), CacheEntry::Lists(summaries.clone()));
        Ok(summaries)
    }

    /// Falls back to English when signed out or without a profile.
    pub async fn preferred_language(&self) -> Language {
        let user = match self.backend.current_user().await {
            Ok(user) => user,
            Err(_) => return Language::default(),
        };
        match self.backend.profile(user.id).await {
            Ok(Some(profile)) => profile.preferred_language,
            Ok(None) => Language::default(),
            Err(e) => {
                warn!("Could not load profile language: {}", e);
                Language::default()
            }
        }
    }

    // -- Writes --

    pub async fn create_list(&self, name: &str) -> Result<GroceryList, MutationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MutationError::EmptyListName);
        }

        let result = async {
            let user = self.backend.current_user().await?;
            self.backend
                .insert_list(&NewList {
                    name: name.to_string(),
                    owner_id: user.id,
                })
                .await
        }
        .await;

        match result {
            Ok(list) => {
                info!("Created list {} ({})", list.id, list.share_code);
                self.notifier.notify(Notification::ListCreated {
                    list_name: list.name.clone(),
                });
                self.cache.invalidate(&CacheKey::lists());
                self.reconcile(CacheKey::lists()).await;
                Ok(list)
            }
            Err(e) => {
                error!("Creating list '{}' failed: {}", name, e);
                self.notifier.notify(Notification::ListCreateFailed);
                Err(e.into())
            }
        }
    }

    /// Removes the list from the cache at once, then asks the owner-gated
    /// procedure. A refusal is `Ok(deleted = false)`, not an error.
    pub async fn delete_list(
        &self,
        list_id: Uuid,
        acting_user_id: Uuid,
    ) -> Result<DeleteListOutcome, MutationError> {
        let mut mutation = OptimisticMutation::new(&self.cache, CacheKey::lists())
            .with_rollback(move |cache, key, snapshot| {
                reinsert_list(cache, key, snapshot, list_id)
            });
        mutation.apply(|entry| {
            if let CacheEntry::Lists(lists) = entry {
                lists.retain(|summary| summary.list.id != list_id);
            }
        });

        let result = mutation
            .commit(async {
                match self.backend.delete_list_if_owner(list_id, acting_user_id).await {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(DeleteRefusal::NotOwner),
                    Err(e) => Err(DeleteRefusal::Backend(e)),
                }
            })
            .await;

        match result {
            Ok(()) => {
                info!("List {} deleted", list_id);
                self.notifier.notify(Notification::ListDeleted);
                self.cache.remove_children(list_id);
                self.reconcile(CacheKey::lists()).await;
                Ok(DeleteListOutcome { deleted: true })
            }
            Err(DeleteRefusal::NotOwner) => {
                warn!("User {} may not delete list {}", acting_user_id, list_id);
                self.notifier.notify(Notification::ListDeleteDenied);
                Ok(DeleteListOutcome { deleted: false })
            }
            Err(DeleteRefusal::Backend(e)) => {
                error!("Deleting list {} failed: {}", list_id, e);
                self.notifier.notify(Notification::ListDeleteFailed);
                Err(e.into())
            }
        }
    }

    /// Sets the current user's first name and/or language.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile, MutationError> {
        let update = ProfileUpdate {
            first_name: update
                .first_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            preferred_language: update.preferred_language,
        };

        let result = async {
            let user = self.backend.current_user().await?;
            self.backend.upsert_profile(user.id, &update).await
        }
        .await;

        match result {
            Ok(profile) => {
                self.notifier.notify(Notification::ProfileUpdated);
                Ok(profile)
            }
            Err(e) => {
                error!("Updating profile failed: {}", e);
                self.notifier.notify(Notification::ProfileUpdateFailed);
                Err(e.into())
            }
        }
    }

    /// Replaces a confirmed entry with server state. A failure leaves the
    /// entry stale; the write itself already succeeded, so nothing is shown.
    async fn reconcile(&self, key: CacheKey) {
        let result = match (key.collection, key.parent) {
            (Collection::Lists, _) => self.refresh_lists().await.map(drop),
            (Collection::Items, Some(list_id)) => self.list(list_id).refresh_items().await.map(drop),
            (Collection::Stores, Some(list_id)) => {
                self.list(list_id).refresh_stores().await.map(drop)
            }
            (Collection::Members, Some(list_id)) => {
                self.list(list_id).refresh_members().await.map(drop)
            }
            (_, None) => Ok(()),
        };

        match result {
            Ok(()) => debug!("Reconciled {}", key),
            Err(e) => warn!("Refetch of {} failed, entry stays stale: {}", key, e),
        }
    }
}

/// Mutations and reads for the items and stores of one list.
#[derive(Clone)]
pub struct ListMutations {
    sync: Synchronizer,
    list_id: Uuid,
}

impl ListMutations {
    // -- Reads --

    pub async fn refresh_items(&self) -> Result<Vec<GroceryItem>, BackendError> {
        let items = self.sync.backend.items_for_list(self.list_id).await?;
        self.sync
            .cache
            .set(CacheKey::items(self.list_id), CacheEntry::Items(items.clone()));
        Ok(items)
    }

    pub async fn refresh_stores(&self) -> Result<Vec<String>, BackendError> {
        let stores = self.sync.backend.stores_for_list(self.list_id).await?;
        self.sync
            .cache
            .set(CacheKey::stores(self.list_id), CacheEntry::Stores(stores.clone()));
        Ok(stores)
    }

    /// Member roster with display names; members without a first name
    /// show as anonymous.
    pub async fn refresh_members(&self) -> Result<Vec<Member>, BackendError> {
        let rows = self.sync.backend.list_members(self.list_id).await?;

        let mut members = Vec::with_capacity(rows.len());
        for row in rows {
            let first_name = self
                .sync
                .backend
                .profile(row.user_id)
                .await?
                .and_then(|p| p.first_name);
            members.push(Member {
                user_id: row.user_id,
                display_name: first_name.unwrap_or_else(|| ANONYMOUS_MEMBER.to_string()),
            });
        }

        self.sync
            .cache
            .set(CacheKey::members(self.list_id), CacheEntry::Members(members.clone()));
        Ok(members)
    }

    // -- Writes --

    /// Creates an item. No optimistic insert; the cache only changes through
    /// the refetch that follows a successful write.
    pub async fn add_item(
        &self,
        name: &str,
        store: Option<&str>,
        quantity: Option<&str>,
    ) -> Result<GroceryItem, MutationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MutationError::EmptyItemName);
        }

        let backend = &self.sync.backend;
        let result = async {
            let user = backend.current_user().await?;
            backend
                .insert_item(&NewItem {
                    name: name.to_string(),
                    list_id: self.list_id,
                    creator_id: user.id,
                    store: non_blank(store),
                    quantity: non_blank(quantity),
                })
                .await
        }
        .await;

        match result {
            Ok(item) => {
                self.sync.notifier.notify(Notification::ItemAdded);
                self.after_item_write().await;
                Ok(item)
            }
            Err(e) => {
                error!("Adding '{}' to list {} failed: {}", name, self.list_id, e);
                self.sync.notifier.notify(Notification::ItemAddFailed);
                Err(e.into())
            }
        }
    }

    /// Flips the completion flag. The cache shows `!current_completed`
    /// until the backend answers; a failure puts `current_completed` back.
    pub async fn toggle_item(
        &self,
        item_id: Uuid,
        current_completed: bool,
    ) -> Result<(), MutationError> {
        let completed = !current_completed;

        let mut mutation = OptimisticMutation::new(&self.sync.cache, CacheKey::items(self.list_id))
            .with_rollback(move |cache, key, _snapshot| {
                cache.update(key, |entry| set_completed(entry, item_id, current_completed));
            });
        mutation.apply(|entry| set_completed(entry, item_id, completed));

        let result = mutation
            .commit(self.sync.backend.set_item_completed(item_id, completed))
            .await;

        match result {
            Ok(()) => {
                self.after_item_write().await;
                Ok(())
            }
            Err(e) => {
                error!("Toggling item {} failed: {}", item_id, e);
                self.sync.notifier.notify(Notification::ItemUpdateFailed);
                Err(e.into())
            }
        }
    }

    /// Any member may delete any item. The item disappears from the cache at
    /// once and comes back at its old position if the backend refuses.
    pub async fn delete_item(&self, item_id: Uuid) -> Result<(), MutationError> {
        let mut mutation = OptimisticMutation::new(&self.sync.cache, CacheKey::items(self.list_id))
            .with_rollback(move |cache, key, snapshot| reinsert_item(cache, key, snapshot, item_id));
        mutation.apply(|entry| {
            if let CacheEntry::Items(items) = entry {
                items.retain(|item| item.id != item_id);
            }
        });

        let result = mutation.commit(self.sync.backend.delete_item(item_id)).await;

        match result {
            Ok(()) => {
                self.sync.notifier.notify(Notification::ItemDeleted);
                self.after_item_write().await;
                Ok(())
            }
            Err(e) => {
                error!("Deleting item {} failed: {}", item_id, e);
                self.sync.notifier.notify(Notification::ItemDeleteFailed);
                Err(e.into())
            }
        }
    }

    /// Adds a store to the list's picker. A name that already exists is a
    /// successful no-op.
    pub async fn add_store(&self, name: &str) -> Result<(), MutationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MutationError::EmptyStoreName);
        }

        match self.sync.backend.insert_store(self.list_id, name).await {
            Ok(()) | Err(BackendError::Conflict(_)) => {
                self.sync.notifier.notify(Notification::StoreAdded);
                let key = CacheKey::stores(self.list_id);
                self.sync.cache.invalidate(&key);
                self.sync.reconcile(key).await;
                Ok(())
            }
            Err(e) => {
                error!("Adding store '{}' to list {} failed: {}", name, self.list_id, e);
                self.sync.notifier.notify(Notification::StoreAddFailed);
                Err(e.into())
            }
        }
    }

    /// Item writes change the dashboard's item counts too.
    async fn after_item_write(&self) {
        let key = CacheKey::items(self.list_id);
        self.sync.cache.invalidate(&key);
        self.sync.cache.invalidate(&CacheKey::lists());
        self.sync.reconcile(key).await;
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn set_completed(entry: &mut CacheEntry, item_id: Uuid, completed: bool) {
    if let CacheEntry::Items(items) = entry {
        if let Some(item) = items.iter_mut().find(|item| item.id == item_id) {
            item.completed = completed;
        }
    }
}

fn reinsert_item(cache: &QueryCache, key: &CacheKey, snapshot: Option<CacheEntry>, item_id: Uuid) {
    let Some(CacheEntry::Items(before)) = snapshot else {
        return;
    };
    let Some(index) = before.iter().position(|item| item.id == item_id) else {
        return;
    };
    let removed = before[index].clone();

    cache.update(key, |entry| {
        if let CacheEntry::Items(items) = entry {
            if !items.iter().any(|item| item.id == item_id) {
                items.insert(index.min(items.len()), removed);
            }
        }
    });
}

fn reinsert_list(cache: &QueryCache, key: &CacheKey, snapshot: Option<CacheEntry>, list_id: Uuid) {
    let Some(CacheEntry::Lists(before)) = snapshot else {
        return;
    };
    let Some(index) = before.iter().position(|summary| summary.list.id == list_id) else {
        return;
    };
    let removed = before[index].clone();

    cache.update(key, |entry| {
        if let CacheEntry::Lists(lists) = entry {
            if !lists.iter().any(|summary| summary.list.id == list_id) {
                lists.insert(index.min(lists.len()), removed);
            }
        }
    });
}
