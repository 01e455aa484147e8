use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session changes published by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AuthEvent {
    SignedIn { user_id: Uuid },
    SignedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
}

/// User-visible outcome of an action. Each mutation emits exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Notification {
    // Membership
    ListJoined { list_name: String },
    AlreadyMember { list_name: String },
    ListNotFound,
    JoinFailed,

    // Lists
    ListCreated { list_name: String },
    ListCreateFailed,
    ListDeleted,
    ListDeleteDenied,
    ListDeleteFailed,

    // Items
    ItemAdded,
    ItemAddFailed,
    ItemUpdateFailed,
    ItemDeleted,
    ItemDeleteFailed,

    // Stores
    StoreAdded,
    StoreAddFailed,

    // Profile
    ProfileUpdated,
    ProfileUpdateFailed,
}

impl Notification {
    pub fn severity(&self) -> Severity {
        match self {
            Self::ListJoined { .. }
            | Self::AlreadyMember { .. }
            | Self::ListCreated { .. }
            | Self::ListDeleted
            | Self::ItemAdded
            | Self::ItemDeleted
            | Self::StoreAdded
            | Self::ProfileUpdated => Severity::Success,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ListJoined { list_name } => write!(f, "Joined \"{}\"", list_name),
            Self::AlreadyMember { list_name } => {
                write!(f, "You are already a member of \"{}\"", list_name)
            }
            Self::ListNotFound => f.write_str("List not found. Check the share code and try again."),
            Self::JoinFailed => f.write_str("Failed to join the list. Please try again."),
            Self::ListCreated { list_name } => write!(f, "Created \"{}\"", list_name),
            Self::ListCreateFailed => f.write_str("Failed to create the list. Please try again."),
            Self::ListDeleted => f.write_str("The list has been successfully deleted."),
            Self::ListDeleteDenied => f.write_str("You don't have permission to delete this list."),
            Self::ListDeleteFailed => f.write_str("Failed to delete the list. Please try again."),
            Self::ItemAdded => f.write_str("Item added"),
            Self::ItemAddFailed => f.write_str("Failed to add item"),
            Self::ItemUpdateFailed => f.write_str("Failed to update item"),
            Self::ItemDeleted => f.write_str("Item deleted"),
            Self::ItemDeleteFailed => f.write_str("Failed to delete item"),
            Self::StoreAdded => f.write_str("Store added"),
            Self::StoreAddFailed => f.write_str("Failed to add store"),
            Self::ProfileUpdated => f.write_str("Profile updated"),
            Self::ProfileUpdateFailed => f.write_str("Failed to update profile"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_splits_outcomes() {
        assert_eq!(Notification::ItemAdded.severity(), Severity::Success);
        assert_eq!(
            Notification::AlreadyMember { list_name: "Weekly".into() }.severity(),
            Severity::Success
        );
        assert_eq!(Notification::ListDeleteDenied.severity(), Severity::Error);
        assert_eq!(Notification::ListNotFound.severity(), Severity::Error);
    }
}
