use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{GroceryList, Language};

// -- Auth --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

// -- Lists --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewList {
    pub name: String,
    pub owner_id: Uuid,
}

/// Result of joining a list by share code. `already_member` is the only
/// thing that tells a fresh join apart from a repeated one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinOutcome {
    pub list: GroceryList,
    pub already_member: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteListOutcome {
    pub deleted: bool,
}

// -- Items --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewItem {
    pub name: String,
    pub list_id: Uuid,
    pub creator_id: Uuid,
    pub store: Option<String>,
    pub quantity: Option<String>,
}

// -- Profiles --

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub preferred_language: Option<Language>,
}
