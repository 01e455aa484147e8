//! `LocalBackend`: the backend contract served from a local SQLite database.
//!
//! Each `LocalBackend` is one client's connection: it carries that client's
//! session. Several backends may share one `Database`, which then plays the
//! part of the hosted service. Row-level access is checked here, the way the
//! hosted service's policies would: writes outside the caller's lists fail
//! with `PermissionDenied`, reads outside them come back empty.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use grocer_types::api::{Credentials, NewItem, NewList, ProfileUpdate};
use grocer_types::backend::{Backend, BackendError};
use grocer_types::events::AuthEvent;
use grocer_types::models::{
    AuthUser, GroceryItem, GroceryList, Language, ListMembership, Profile, Session,
};

use crate::models::{ItemRow, ListRow, MemberRow, ProfileRow};
use crate::{Database, auth, is_unique_violation, share_code};

const SHARE_CODE_ATTEMPTS: usize = 5;
const AUTH_CHANNEL_CAPACITY: usize = 16;

pub struct LocalBackend {
    db: Arc<Database>,
    jwt_secret: String,
    session: RwLock<Option<Session>>,
    auth_tx: broadcast::Sender<AuthEvent>,
}

impl LocalBackend {
    pub fn new(db: Arc<Database>, jwt_secret: impl Into<String>) -> Self {
        let (auth_tx, _) = broadcast::channel(AUTH_CHANNEL_CAPACITY);
        Self {
            db,
            jwt_secret: jwt_secret.into(),
            session: RwLock::new(None),
            auth_tx,
        }
    }

    /// Re-establishes a session from a previously issued access token.
    pub async fn restore_session(&self, token: &str) -> Result<Session, BackendError> {
        let claims = auth::decode_token(&self.jwt_secret, token).map_err(|e| {
            debug!("Rejected stored token: {}", e);
            BackendError::NotAuthenticated
        })?;

        let user = self
            .db
            .get_user_by_id(&claims.sub.to_string())
            .map_err(internal)?
            .ok_or(BackendError::NotAuthenticated)?;

        let expires_at = DateTime::from_timestamp(claims.exp as i64, 0)
            .ok_or(BackendError::NotAuthenticated)?;

        let session = Session {
            access_token: token.to_string(),
            user: AuthUser {
                id: claims.sub,
                email: user.email,
            },
            expires_at,
        };
        self.set_session(session.clone()).await;
        Ok(session)
    }

    async fn set_session(&self, session: Session) {
        let user_id = session.user.id;
        *self.session.write().await = Some(session);
        let _ = self.auth_tx.send(AuthEvent::SignedIn { user_id });
    }

    fn issue_session(&self, user_id: Uuid, email: &str) -> Result<Session, BackendError> {
        let (access_token, expires_at) =
            auth::create_token(&self.jwt_secret, user_id, email).map_err(internal)?;
        Ok(Session {
            access_token,
            user: AuthUser {
                id: user_id,
                email: email.to_string(),
            },
            expires_at,
        })
    }

    async fn require_self(&self, user_id: Uuid) -> Result<AuthUser, BackendError> {
        let user = self.current_user().await?;
        if user.id != user_id {
            return Err(BackendError::PermissionDenied);
        }
        Ok(user)
    }

    async fn can_access(&self, list_id: Uuid) -> Result<bool, BackendError> {
        let user = self.current_user().await?;
        self.db
            .can_access_list(&list_id.to_string(), &user.id.to_string())
            .map_err(internal)
    }

    async fn require_access(&self, list_id: Uuid) -> Result<(), BackendError> {
        if self.can_access(list_id).await? {
            Ok(())
        } else {
            Err(BackendError::PermissionDenied)
        }
    }

    /// Looks up an item and checks the caller may touch its list.
    async fn accessible_item(&self, item_id: Uuid) -> Result<ItemRow, BackendError> {
        let row = self
            .db
            .get_item(&item_id.to_string())
            .map_err(internal)?
            .ok_or(BackendError::NotFound)?;
        self.require_access(parse_uuid(&row.list_id)?).await?;
        Ok(row)
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn sign_up(&self, credentials: &Credentials) -> Result<Session, BackendError> {
        let email = credentials.email.trim();
        if !auth::credentials_look_valid(email, &credentials.password) {
            return Err(BackendError::InvalidCredentials);
        }

        let password_hash = auth::hash_password(&credentials.password).map_err(internal)?;
        let user_id = Uuid::new_v4();

        match self.db.create_user(&user_id.to_string(), email, &password_hash) {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(BackendError::Conflict("email already registered".into()));
            }
            Err(e) => return Err(internal(e)),
        }

        info!("User {} signed up", user_id);
        let session = self.issue_session(user_id, email)?;
        self.set_session(session.clone()).await;
        Ok(session)
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Session, BackendError> {
        let user = self
            .db
            .get_user_by_email(credentials.email.trim())
            .map_err(internal)?
            .ok_or(BackendError::InvalidCredentials)?;

        if !auth::verify_password(&credentials.password, &user.password).map_err(internal)? {
            return Err(BackendError::InvalidCredentials);
        }

        let user_id = parse_uuid(&user.id)?;
        let session = self.issue_session(user_id, &user.email)?;
        self.set_session(session.clone()).await;
        info!("User {} signed in", user_id);
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let previous = self.session.write().await.take();
        if previous.is_some() {
            let _ = self.auth_tx.send(AuthEvent::SignedOut);
        }
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        let session = self.session.read().await;
        Ok(session
            .as_ref()
            .filter(|s| s.expires_at > Utc::now())
            .cloned())
    }

    async fn current_user(&self) -> Result<AuthUser, BackendError> {
        self.current_session()
            .await?
            .map(|s| s.user)
            .ok_or(BackendError::NotAuthenticated)
    }

    fn subscribe_auth(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_tx.subscribe()
    }

    // -- Lists --

    async fn insert_list(&self, new_list: &NewList) -> Result<GroceryList, BackendError> {
        self.require_self(new_list.owner_id).await?;

        for attempt in 1..=SHARE_CODE_ATTEMPTS {
            let row = ListRow {
                id: Uuid::new_v4().to_string(),
                name: new_list.name.clone(),
                owner_id: new_list.owner_id.to_string(),
                share_code: share_code::generate(),
                created_at: now_stamp(),
            };

            match self.db.insert_list(&row) {
                Ok(()) => {
                    info!("List {} created with share code {}", row.id, row.share_code);
                    return list_from_row(row);
                }
                Err(e) if is_unique_violation(&e) => {
                    warn!("Share code collision (attempt {}), retrying", attempt);
                }
                Err(e) => return Err(internal(e)),
            }
        }

        Err(BackendError::Conflict("could not allocate a unique share code".into()))
    }

    async fn list_by_id(&self, list_id: Uuid) -> Result<Option<GroceryList>, BackendError> {
        self.current_user().await?;
        self.db
            .get_list_by_id(&list_id.to_string())
            .map_err(internal)?
            .map(list_from_row)
            .transpose()
    }

    async fn list_by_share_code(&self, code: &str) -> Result<Option<GroceryList>, BackendError> {
        self.current_user().await?;
        self.db
            .get_list_by_share_code(code)
            .map_err(internal)?
            .map(list_from_row)
            .transpose()
    }

    async fn owned_lists(&self, user_id: Uuid) -> Result<Vec<GroceryList>, BackendError> {
        self.require_self(user_id).await?;
        self.db
            .lists_owned_by(&user_id.to_string())
            .map_err(internal)?
            .into_iter()
            .map(list_from_row)
            .collect()
    }

    async fn member_lists(&self, user_id: Uuid) -> Result<Vec<GroceryList>, BackendError> {
        self.require_self(user_id).await?;
        self.db
            .lists_joined_by(&user_id.to_string())
            .map_err(internal)?
            .into_iter()
            .map(list_from_row)
            .collect()
    }

    // -- Members --

    async fn insert_membership(
        &self,
        list_id: Uuid,
        user_id: Uuid,
    ) -> Result<ListMembership, BackendError> {
        self.require_self(user_id).await?;

        if self.db.get_list_by_id(&list_id.to_string()).map_err(internal)?.is_none() {
            return Err(BackendError::NotFound);
        }

        match self.db.insert_membership(&list_id.to_string(), &user_id.to_string()) {
            Ok(()) => {
                info!("User {} joined list {}", user_id, list_id);
                Ok(ListMembership { list_id, user_id })
            }
            Err(e) if is_unique_violation(&e) => Err(BackendError::DuplicateMembership),
            Err(e) => Err(internal(e)),
        }
    }

    async fn list_members(&self, list_id: Uuid) -> Result<Vec<ListMembership>, BackendError> {
        if !self.can_access(list_id).await? {
            return Ok(vec![]);
        }
        self.db
            .members_of(&list_id.to_string())
            .map_err(internal)?
            .into_iter()
            .map(member_from_row)
            .collect()
    }

    // -- Items --

    async fn insert_item(&self, new_item: &NewItem) -> Result<GroceryItem, BackendError> {
        self.require_self(new_item.creator_id).await?;
        self.require_access(new_item.list_id).await?;

        let row = ItemRow {
            id: Uuid::new_v4().to_string(),
            name: new_item.name.clone(),
            completed: false,
            list_id: new_item.list_id.to_string(),
            creator_id: new_item.creator_id.to_string(),
            store: new_item.store.clone(),
            quantity: new_item.quantity.clone(),
            created_at: now_stamp(),
        };
        self.db.insert_item(&row).map_err(internal)?;
        debug!("Item {} added to list {}", row.id, row.list_id);
        item_from_row(row)
    }

    async fn items_for_list(&self, list_id: Uuid) -> Result<Vec<GroceryItem>, BackendError> {
        if !self.can_access(list_id).await? {
            return Ok(vec![]);
        }
        self.db
            .items_for_list(&list_id.to_string())
            .map_err(internal)?
            .into_iter()
            .map(item_from_row)
            .collect()
    }

    async fn item_count(&self, list_id: Uuid) -> Result<usize, BackendError> {
        if !self.can_access(list_id).await? {
            return Ok(0);
        }
        self.db.count_items(&list_id.to_string()).map_err(internal)
    }

    async fn set_item_completed(
        &self,
        item_id: Uuid,
        completed: bool,
    ) -> Result<(), BackendError> {
        let row = self.accessible_item(item_id).await?;
        let touched = self.db.set_item_completed(&row.id, completed).map_err(internal)?;
        if touched == 0 {
            return Err(BackendError::NotFound);
        }
        Ok(())
    }

    async fn delete_item(&self, item_id: Uuid) -> Result<(), BackendError> {
        // Any member may delete any item of the list
        let row = self.accessible_item(item_id).await?;
        let touched = self.db.delete_item(&row.id).map_err(internal)?;
        if touched == 0 {
            return Err(BackendError::NotFound);
        }
        Ok(())
    }

    // -- Stores --

    async fn stores_for_list(&self, list_id: Uuid) -> Result<Vec<String>, BackendError> {
        if !self.can_access(list_id).await? {
            return Ok(vec![]);
        }
        self.db.stores_for_list(&list_id.to_string()).map_err(internal)
    }

    async fn insert_store(&self, list_id: Uuid, name: &str) -> Result<(), BackendError> {
        self.require_access(list_id).await?;
        match self.db.insert_store(&list_id.to_string(), name) {
            Ok(()) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(BackendError::Conflict(format!("store '{}' already exists", name)))
            }
            Err(e) => Err(internal(e)),
        }
    }

    // -- Profiles --

    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>, BackendError> {
        self.current_user().await?;
        self.db
            .get_profile(&user_id.to_string())
            .map_err(internal)?
            .map(profile_from_row)
            .transpose()
    }

    async fn upsert_profile(
        &self,
        user_id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Profile, BackendError> {
        self.require_self(user_id).await?;
        let row = self
            .db
            .upsert_profile(
                &user_id.to_string(),
                update.first_name.as_deref(),
                update.preferred_language.map(Language::code),
            )
            .map_err(internal)?;
        profile_from_row(row)
    }

    // -- Procedures --

    async fn delete_list_if_owner(
        &self,
        list_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, BackendError> {
        // The procedure acts as the session user, whatever id was passed
        let user = self.current_user().await?;
        if user.id != user_id {
            warn!("User {} tried to delete list {} as {}", user.id, list_id, user_id);
            return Ok(false);
        }
        self.db
            .delete_list_if_owner(&list_id.to_string(), &user.id.to_string())
            .map_err(internal)
    }
}

fn internal(err: anyhow::Error) -> BackendError {
    error!("Local backend failure: {:#}", err);
    BackendError::Unexpected(err.to_string())
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_uuid(value: &str) -> Result<Uuid, BackendError> {
    value
        .parse()
        .map_err(|_| BackendError::Unexpected(format!("malformed id in database: {}", value)))
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, BackendError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| BackendError::Unexpected(format!("malformed timestamp in database: {}", value)))
}

fn list_from_row(row: ListRow) -> Result<GroceryList, BackendError> {
    Ok(GroceryList {
        id: parse_uuid(&row.id)?,
        name: row.name,
        owner_id: parse_uuid(&row.owner_id)?,
        share_code: row.share_code,
        created_at: parse_time(&row.created_at)?,
    })
}

fn member_from_row(row: MemberRow) -> Result<ListMembership, BackendError> {
    Ok(ListMembership {
        list_id: parse_uuid(&row.list_id)?,
        user_id: parse_uuid(&row.user_id)?,
    })
}

fn item_from_row(row: ItemRow) -> Result<GroceryItem, BackendError> {
    Ok(GroceryItem {
        id: parse_uuid(&row.id)?,
        name: row.name,
        completed: row.completed,
        list_id: parse_uuid(&row.list_id)?,
        creator_id: parse_uuid(&row.creator_id)?,
        store: row.store,
        quantity: row.quantity,
        created_at: parse_time(&row.created_at)?,
    })
}

fn profile_from_row(row: ProfileRow) -> Result<Profile, BackendError> {
    let preferred_language = row.preferred_language.parse().unwrap_or_else(|_| {
        warn!("Profile {} has unknown language '{}'", row.id, row.preferred_language);
        Language::default()
    });
    Ok(Profile {
        id: parse_uuid(&row.id)?,
        first_name: row.first_name,
        preferred_language,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(email: &str) -> Credentials {
        Credentials {
            email: email.to_string(),
            password: "password123".to_string(),
        }
    }

    async fn signed_up(db: &Arc<Database>, email: &str) -> (LocalBackend, Uuid) {
        let backend = LocalBackend::new(db.clone(), "test-secret");
        let session = backend.sign_up(&creds(email)).await.unwrap();
        (backend, session.user.id)
    }

    #[tokio::test]
    async fn sign_up_sign_out_sign_in() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (backend, user_id) = signed_up(&db, "ann@example.com").await;
        let mut events = backend.subscribe_auth();

        backend.sign_out().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), AuthEvent::SignedOut);
        assert_eq!(backend.current_user().await, Err(BackendError::NotAuthenticated));

        let session = backend.sign_in(&creds("ann@example.com")).await.unwrap();
        assert_eq!(session.user.id, user_id);
        assert_eq!(events.recv().await.unwrap(), AuthEvent::SignedIn { user_id });

        let wrong = Credentials {
            email: "ann@example.com".into(),
            password: "not-the-password".into(),
        };
        assert_eq!(backend.sign_in(&wrong).await, Err(BackendError::InvalidCredentials));
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        signed_up(&db, "ann@example.com").await;

        let other = LocalBackend::new(db.clone(), "test-secret");
        let err = other.sign_up(&creds("ann@example.com")).await.unwrap_err();
        assert!(matches!(err, BackendError::Conflict(_)));
    }

    #[tokio::test]
    async fn restore_session_from_token() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (backend, user_id) = signed_up(&db, "ann@example.com").await;
        let token = backend.current_session().await.unwrap().unwrap().access_token;

        let fresh = LocalBackend::new(db.clone(), "test-secret");
        let session = fresh.restore_session(&token).await.unwrap();
        assert_eq!(session.user.id, user_id);

        let wrong_secret = LocalBackend::new(db, "other-secret");
        assert_eq!(
            wrong_secret.restore_session(&token).await,
            Err(BackendError::NotAuthenticated)
        );
    }

    #[tokio::test]
    async fn duplicate_membership_is_named() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (owner, owner_id) = signed_up(&db, "owner@example.com").await;
        let (guest, guest_id) = signed_up(&db, "guest@example.com").await;

        let list = owner
            .insert_list(&NewList { name: "Weekly".into(), owner_id })
            .await
            .unwrap();

        guest.insert_membership(list.id, guest_id).await.unwrap();
        assert_eq!(
            guest.insert_membership(list.id, guest_id).await,
            Err(BackendError::DuplicateMembership)
        );
        assert_eq!(
            guest.insert_membership(Uuid::new_v4(), guest_id).await,
            Err(BackendError::NotFound)
        );
    }

    #[tokio::test]
    async fn outsiders_are_kept_out_of_items() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (owner, owner_id) = signed_up(&db, "owner@example.com").await;
        let (outsider, outsider_id) = signed_up(&db, "out@example.com").await;

        let list = owner
            .insert_list(&NewList { name: "Weekly".into(), owner_id })
            .await
            .unwrap();
        let item = owner
            .insert_item(&NewItem {
                name: "Milk".into(),
                list_id: list.id,
                creator_id: owner_id,
                store: None,
                quantity: None,
            })
            .await
            .unwrap();

        assert!(outsider.items_for_list(list.id).await.unwrap().is_empty());
        assert_eq!(
            outsider.set_item_completed(item.id, true).await,
            Err(BackendError::PermissionDenied)
        );
        assert_eq!(
            outsider
                .insert_item(&NewItem {
                    name: "Eggs".into(),
                    list_id: list.id,
                    creator_id: outsider_id,
                    store: None,
                    quantity: None,
                })
                .await
                .unwrap_err(),
            BackendError::PermissionDenied
        );
        // Cannot act on someone else's behalf
        assert_eq!(
            outsider.insert_membership(list.id, owner_id).await,
            Err(BackendError::PermissionDenied)
        );
    }

    #[tokio::test]
    async fn delete_procedure_returns_false_for_non_owner() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (owner, owner_id) = signed_up(&db, "owner@example.com").await;
        let (guest, guest_id) = signed_up(&db, "guest@example.com").await;

        let list = owner
            .insert_list(&NewList { name: "Weekly".into(), owner_id })
            .await
            .unwrap();
        guest.insert_membership(list.id, guest_id).await.unwrap();

        assert!(!guest.delete_list_if_owner(list.id, guest_id).await.unwrap());
        assert!(owner.list_by_id(list.id).await.unwrap().is_some());

        assert!(owner.delete_list_if_owner(list.id, owner_id).await.unwrap());
        assert!(owner.list_by_id(list.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_procedure_ignores_borrowed_owner_id() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (owner, owner_id) = signed_up(&db, "owner@example.com").await;
        let (guest, guest_id) = signed_up(&db, "guest@example.com").await;

        let list = owner
            .insert_list(&NewList { name: "Weekly".into(), owner_id })
            .await
            .unwrap();
        guest.insert_membership(list.id, guest_id).await.unwrap();

        assert!(!guest.delete_list_if_owner(list.id, owner_id).await.unwrap());
        assert!(db.get_list_by_id(&list.id.to_string()).unwrap().is_some());
    }
}
