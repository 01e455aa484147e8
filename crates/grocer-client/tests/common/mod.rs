//! Shared fixtures: a local backend per user over one in-memory database,
//! wrapped so individual calls can be made to fail or to wait.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Semaphore, broadcast};
use uuid::Uuid;

use grocer_client::{GrocerClient, Notifier};
use grocer_db::models::ListRow;
use grocer_db::{Database, LocalBackend};
use grocer_types::api::{Credentials, NewItem, NewList, ProfileUpdate};
use grocer_types::events::{AuthEvent, Notification};
use grocer_types::models::{AuthUser, GroceryItem, GroceryList, ListMembership, Profile, Session};
use grocer_types::{Backend, BackendError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    InsertList,
    InsertMembership,
    InsertItem,
    ItemsForList,
    SetItemCompleted,
    DeleteItem,
    InsertStore,
    UpsertProfile,
    DeleteList,
}

pub struct FlakyBackend {
    inner: LocalBackend,
    failing: Mutex<HashSet<Op>>,
    gate: Mutex<Option<(Op, Arc<Semaphore>)>>,
}

impl FlakyBackend {
    pub fn new(inner: LocalBackend) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
            gate: Mutex::new(None),
        }
    }

    pub fn local(&self) -> &LocalBackend {
        &self.inner
    }

    pub fn fail(&self, op: Op) {
        self.failing.lock().unwrap().insert(op);
    }

    /// Calls to `op` block until a permit is added to the returned semaphore.
    pub fn hold(&self, op: Op) -> Arc<Semaphore> {
        let semaphore = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some((op, semaphore.clone()));
        semaphore
    }

    async fn enter(&self, op: Op) -> Result<(), BackendError> {
        let gate = self
            .gate
            .lock()
            .unwrap()
            .as_ref()
            .filter(|(held, _)| *held == op)
            .map(|(_, semaphore)| semaphore.clone());
        if let Some(semaphore) = gate {
            semaphore.acquire().await.unwrap().forget();
        }

        if self.failing.lock().unwrap().contains(&op) {
            return Err(BackendError::Unexpected(format!("injected failure in {:?}", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for FlakyBackend {
    async fn sign_up(&self, credentials: &Credentials) -> Result<Session, BackendError> {
        self.inner.sign_up(credentials).await
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, BackendError> {
        self.inner.sign_in(credentials).await
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.inner.sign_out().await
    }

    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        self.inner.current_session().await
    }

    async fn current_user(&self) -> Result<AuthUser, BackendError> {
        self.inner.current_user().await
    }

    fn subscribe_auth(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.subscribe_auth()
    }

    async fn insert_list(&self, new_list: &NewList) -> Result<GroceryList, BackendError> {
        self.enter(Op::InsertList).await?;
        self.inner.insert_list(new_list).await
    }

    async fn list_by_id(&self, list_id: Uuid) -> Result<Option<GroceryList>, BackendError> {
        self.inner.list_by_id(list_id).await
    }

    async fn list_by_share_code(&self, code: &str) -> Result<Option<GroceryList>, BackendError> {
        self.inner.list_by_share_code(code).await
    }

    async fn owned_lists(&self, user_id: Uuid) -> Result<Vec<GroceryList>, BackendError> {
        self.inner.owned_lists(user_id).await
    }

    async fn member_lists(&self, user_id: Uuid) -> Result<Vec<GroceryList>, BackendError> {
        self.inner.member_lists(user_id).await
    }

    async fn insert_membership(
        &self,
        list_id: Uuid,
        user_id: Uuid,
    ) -> Result<ListMembership, BackendError> {
        self.enter(Op::InsertMembership).await?;
        self.inner.insert_membership(list_id, user_id).await
    }

    async fn list_members(&self, list_id: Uuid) -> Result<Vec<ListMembership>, BackendError> {
        self.inner.list_members(list_id).await
    }

    async fn insert_item(&self, new_item: &NewItem) -> Result<GroceryItem, BackendError> {
        self.enter(Op::InsertItem).await?;
        self.inner.insert_item(new_item).await
    }

    async fn items_for_list(&self, list_id: Uuid) -> Result<Vec<GroceryItem>, BackendError> {
        self.enter(Op::ItemsForList).await?;
        self.inner.items_for_list(list_id).await
    }

    async fn item_count(&self, list_id: Uuid) -> Result<usize, BackendError> {
        self.inner.item_count(list_id).await
    }

    async fn set_item_completed(&self, item_id: Uuid, completed: bool) -> Result<(), BackendError> {
        self.enter(Op::SetItemCompleted).await?;
        self.inner.set_item_completed(item_id, completed).await
    }

    async fn delete_item(&self, item_id: Uuid) -> Result<(), BackendError> {
        self.enter(Op::DeleteItem).await?;
        self.inner.delete_item(item_id).await
    }

    async fn stores_for_list(&self, list_id: Uuid) -> Result<Vec<String>, BackendError> {
        self.inner.stores_for_list(list_id).await
    }

    async fn insert_store(&self, list_id: Uuid, name: &str) -> Result<(), BackendError> {
        self.enter(Op::InsertStore).await?;
        self.inner.insert_store(list_id, name).await
    }

    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>, BackendError> {
        self.inner.profile(user_id).await
    }

    async fn upsert_profile(
        &self,
        user_id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Profile, BackendError> {
        self.enter(Op::UpsertProfile).await?;
        self.inner.upsert_profile(user_id, update).await
    }

    async fn delete_list_if_owner(&self, list_id: Uuid, user_id: Uuid) -> Result<bool, BackendError> {
        self.enter(Op::DeleteList).await?;
        self.inner.delete_list_if_owner(list_id, user_id).await
    }
}

/// Collects every notification in order.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Notification>>>,
}

impl Recorder {
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.seen.lock().unwrap())
    }
}

impl Notifier for Recorder {
    fn notify(&self, notification: Notification) {
        self.seen.lock().unwrap().push(notification);
    }
}

/// One signed-in user with their own backend session, cache and notifications.
pub struct Actor {
    pub user_id: Uuid,
    pub backend: Arc<FlakyBackend>,
    pub client: GrocerClient,
    pub notes: Recorder,
}

pub fn shared_db() -> Arc<Database> {
    Arc::new(Database::open_in_memory().unwrap())
}

pub async fn actor(db: &Arc<Database>, email: &str) -> Actor {
    let local = LocalBackend::new(db.clone(), "test-secret");
    let session = local
        .sign_up(&Credentials {
            email: email.to_string(),
            password: "password123".to_string(),
        })
        .await
        .unwrap();

    let backend = Arc::new(FlakyBackend::new(local));
    let notes = Recorder::default();
    let client = GrocerClient::new(backend.clone(), Arc::new(notes.clone()));
    Actor {
        user_id: session.user.id,
        backend,
        client,
        notes,
    }
}

/// Inserts a list with a fixed share code straight into the database.
pub fn seed_list(db: &Database, owner_id: Uuid, name: &str, share_code: &str) -> Uuid {
    let id = Uuid::new_v4();
    db.insert_list(&ListRow {
        id: id.to_string(),
        name: name.to_string(),
        owner_id: owner_id.to_string(),
        share_code: share_code.to_string(),
        created_at: Utc::now().to_rfc3339(),
    })
    .unwrap();
    id
}

pub fn membership_rows(db: &Database, list_id: Uuid, user_id: Uuid) -> usize {
    db.membership_count(&list_id.to_string(), &user_id.to_string())
        .unwrap()
}
