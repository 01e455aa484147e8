//! Per-session query cache.
//!
//! Entries are keyed by collection plus the id of the parent list (the
//! dashboard list collection has no parent). The cache is a cheap handle:
//! clones share the same storage. Every operation takes the lock for the
//! duration of one synchronous update and never across an `.await`, so two
//! writes can never interleave.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use grocer_types::models::{GroceryItem, ListSummary, Member};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Lists,
    Items,
    Stores,
    Members,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Self::Lists => "lists",
            Self::Items => "groceryItems",
            Self::Stores => "stores",
            Self::Members => "listMembers",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub collection: Collection,
    pub parent: Option<Uuid>,
}

impl CacheKey {
    pub fn lists() -> Self {
        Self {
            collection: Collection::Lists,
            parent: None,
        }
    }

    pub fn items(list_id: Uuid) -> Self {
        Self {
            collection: Collection::Items,
            parent: Some(list_id),
        }
    }

    pub fn stores(list_id: Uuid) -> Self {
        Self {
            collection: Collection::Stores,
            parent: Some(list_id),
        }
    }

    pub fn members(list_id: Uuid) -> Self {
        Self {
            collection: Collection::Members,
            parent: Some(list_id),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent {
            Some(parent) => write!(f, "{}/{}", self.collection.name(), parent),
            None => f.write_str(self.collection.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry {
    Lists(Vec<ListSummary>),
    Items(Vec<GroceryItem>),
    Stores(Vec<String>),
    Members(Vec<Member>),
}

struct Slot {
    entry: CacheEntry,
    stale: bool,
}

#[derive(Clone, Default)]
pub struct QueryCache {
    inner: Arc<Mutex<HashMap<CacheKey, Slot>>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<CacheKey, Slot>> {
        // Poisoning only means a caller's closure panicked; slots are still whole
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.slots().get(key).map(|slot| slot.entry.clone())
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.slots().contains_key(key)
    }

    /// Stores a fresh entry, replacing whatever was there.
    pub fn set(&self, key: CacheKey, entry: CacheEntry) {
        self.slots().insert(key, Slot { entry, stale: false });
    }

    /// Mutates the cached entry in place. Returns `false` when nothing is
    /// cached under `key`.
    pub fn update<F>(&self, key: &CacheKey, f: F) -> bool
    where
        F: FnOnce(&mut CacheEntry),
    {
        match self.slots().get_mut(key) {
            Some(slot) => {
                f(&mut slot.entry);
                true
            }
            None => false,
        }
    }

    /// Puts back a snapshot taken with [`QueryCache::get`]; `None` means the
    /// key was empty and is removed again.
    pub fn restore(&self, key: CacheKey, snapshot: Option<CacheEntry>) {
        let mut slots = self.slots();
        match snapshot {
            Some(entry) => {
                slots.insert(key, Slot { entry, stale: false });
            }
            None => {
                slots.remove(&key);
            }
        }
    }

    /// Marks an entry for refetch. The data stays readable until replaced.
    pub fn invalidate(&self, key: &CacheKey) {
        if let Some(slot) = self.slots().get_mut(key) {
            slot.stale = true;
        }
    }

    /// Drops every entry that belongs to `list_id`.
    pub fn remove_children(&self, list_id: Uuid) {
        self.slots().retain(|key, _| key.parent != Some(list_id));
    }

    /// `true` when missing or invalidated.
    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.slots().get(key).is_none_or(|slot| slot.stale)
    }

    // -- Typed views --

    pub fn lists(&self) -> Option<Vec<ListSummary>> {
        match self.get(&CacheKey::lists()) {
            Some(CacheEntry::Lists(lists)) => Some(lists),
            _ => None,
        }
    }

    pub fn items(&self, list_id: Uuid) -> Option<Vec<GroceryItem>> {
        match self.get(&CacheKey::items(list_id)) {
            Some(CacheEntry::Items(items)) => Some(items),
            _ => None,
        }
    }

    pub fn item(&self, list_id: Uuid, item_id: Uuid) -> Option<GroceryItem> {
        self.items(list_id)?.into_iter().find(|item| item.id == item_id)
    }

    pub fn stores(&self, list_id: Uuid) -> Option<Vec<String>> {
        match self.get(&CacheKey::stores(list_id)) {
            Some(CacheEntry::Stores(stores)) => Some(stores),
            _ => None,
        }
    }

    pub fn members(&self, list_id: Uuid) -> Option<Vec<Member>> {
        match self.get(&CacheKey::members(list_id)) {
            Some(CacheEntry::Members(members)) => Some(members),
            _ => None,
        }
    }
}
