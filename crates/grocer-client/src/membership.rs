//! Joining lists by share code.
//!
//! A repeated join is a successful no-op: the backend's uniqueness
//! constraint decides, and `DuplicateMembership` turns into
//! `already_member = true`. Nothing is locked on this side, so two racing
//! joins for the same (list, user) end with one row and one of them
//! reporting `already_member`.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use grocer_types::api::JoinOutcome;
use grocer_types::backend::{Backend, BackendError};
use grocer_types::events::Notification;
use grocer_types::models::GroceryList;

use crate::cache::{CacheKey, QueryCache};
use crate::notify::Notifier;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("share code must not be empty")]
    EmptyShareCode,
    #[error("no list matches that share code")]
    ListNotFound,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Clone)]
pub struct MembershipResolver {
    backend: Arc<dyn Backend>,
    cache: QueryCache,
    notifier: Arc<dyn Notifier>,
}

impl MembershipResolver {
    pub fn new(backend: Arc<dyn Backend>, cache: QueryCache, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            backend,
            cache,
            notifier,
        }
    }

    /// Looks up the list whose share code equals the trimmed input.
    /// Matching is exact and case-sensitive.
    pub async fn resolve_list_by_share_code(&self, code: &str) -> Result<GroceryList, JoinError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(JoinError::EmptyShareCode);
        }

        self.backend
            .list_by_share_code(code)
            .await?
            .ok_or(JoinError::ListNotFound)
    }

    /// Resolves `code` and makes `user_id` a member of the list.
    ///
    /// Emits exactly one notification for every outcome except the empty
    /// code, which is rejected before any backend call.
    pub async fn join_list(&self, code: &str, user_id: Uuid) -> Result<JoinOutcome, JoinError> {
        let result = self.try_join(code, user_id).await;

        match &result {
            Ok(outcome) if outcome.already_member => {
                self.notifier.notify(Notification::AlreadyMember {
                    list_name: outcome.list.name.clone(),
                });
            }
            Ok(outcome) => {
                self.notifier.notify(Notification::ListJoined {
                    list_name: outcome.list.name.clone(),
                });
            }
            Err(JoinError::EmptyShareCode) => {}
            Err(JoinError::ListNotFound) => {
                info!("No list for share code '{}'", code.trim());
                self.notifier.notify(Notification::ListNotFound);
            }
            Err(JoinError::Backend(e)) => {
                error!("Joining with share code '{}' failed: {}", code.trim(), e);
                self.notifier.notify(Notification::JoinFailed);
            }
        }

        result
    }

    async fn try_join(&self, code: &str, user_id: Uuid) -> Result<JoinOutcome, JoinError> {
        let list = self.resolve_list_by_share_code(code).await?;

        match self.backend.insert_membership(list.id, user_id).await {
            Ok(_) => {
                info!("User {} joined list {}", user_id, list.id);
                // The dashboard has a new row to show
                self.cache.invalidate(&CacheKey::lists());
                Ok(JoinOutcome {
                    list,
                    already_member: false,
                })
            }
            Err(BackendError::DuplicateMembership) => {
                info!("User {} is already a member of list {}", user_id, list.id);
                Ok(JoinOutcome {
                    list,
                    already_member: true,
                })
            }
            // The list vanished between lookup and insert
            Err(BackendError::NotFound) => {
                warn!("List {} disappeared while joining", list.id);
                Err(JoinError::ListNotFound)
            }
            Err(e) => Err(e.into()),
        }
    }
}
