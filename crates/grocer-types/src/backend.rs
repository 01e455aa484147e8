//! The backend contract consumed by the client crates.
//!
//! A backend owns authentication, the relational rows and row-level access
//! control. Implementations translate their native error signalling into
//! [`BackendError`]; callers never inspect raw database codes.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::api::{Credentials, NewItem, NewList, ProfileUpdate};
use crate::events::AuthEvent;
use crate::models::{AuthUser, GroceryItem, GroceryList, ListMembership, Profile, Session};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("invalid credentials")]
    InvalidCredentials,
    /// The (list, user) membership row already exists.
    #[error("already a member of this list")]
    DuplicateMembership,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found")]
    NotFound,
    /// Rejected by row-level access control.
    #[error("permission denied")]
    PermissionDenied,
    #[error("backend error: {0}")]
    Unexpected(String),
}

#[async_trait]
pub trait Backend: Send + Sync {
    // -- Auth --

    async fn sign_up(&self, credentials: &Credentials) -> Result<Session, BackendError>;

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    /// The active session, or `None` when signed out or expired.
    async fn current_session(&self) -> Result<Option<Session>, BackendError>;

    /// The signed-in user. Fails with `NotAuthenticated` when signed out.
    async fn current_user(&self) -> Result<AuthUser, BackendError>;

    fn subscribe_auth(&self) -> broadcast::Receiver<AuthEvent>;

    // -- Lists --

    /// Inserts a list; the backend assigns id, share code and timestamp.
    async fn insert_list(&self, new_list: &NewList) -> Result<GroceryList, BackendError>;

    async fn list_by_id(&self, list_id: Uuid) -> Result<Option<GroceryList>, BackendError>;

    /// Exact, case-sensitive match on `share_code`.
    async fn list_by_share_code(&self, code: &str) -> Result<Option<GroceryList>, BackendError>;

    async fn owned_lists(&self, user_id: Uuid) -> Result<Vec<GroceryList>, BackendError>;

    /// Lists the user joined through a membership row.
    async fn member_lists(&self, user_id: Uuid) -> Result<Vec<GroceryList>, BackendError>;

    // -- Members --

    /// Fails with [`BackendError::DuplicateMembership`] when the row exists.
    async fn insert_membership(
        &self,
        list_id: Uuid,
        user_id: Uuid,
    ) -> Result<ListMembership, BackendError>;

    async fn list_members(&self, list_id: Uuid) -> Result<Vec<ListMembership>, BackendError>;

    // -- Items --

    async fn insert_item(&self, new_item: &NewItem) -> Result<GroceryItem, BackendError>;

    async fn items_for_list(&self, list_id: Uuid) -> Result<Vec<GroceryItem>, BackendError>;

    async fn item_count(&self, list_id: Uuid) -> Result<usize, BackendError>;

    async fn set_item_completed(&self, item_id: Uuid, completed: bool)
    -> Result<(), BackendError>;

    async fn delete_item(&self, item_id: Uuid) -> Result<(), BackendError>;

    // -- Stores --

    /// Store names for a list, ordered by name.
    async fn stores_for_list(&self, list_id: Uuid) -> Result<Vec<String>, BackendError>;

    async fn insert_store(&self, list_id: Uuid, name: &str) -> Result<(), BackendError>;

    // -- Profiles --

    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>, BackendError>;

    async fn upsert_profile(
        &self,
        user_id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Profile, BackendError>;

    // -- Procedures --

    /// Deletes the list when `user_id` owns it. Returns `false` for a
    /// non-owner instead of failing.
    async fn delete_list_if_owner(&self, list_id: Uuid, user_id: Uuid)
    -> Result<bool, BackendError>;
}
