//! Database row types. These map directly to SQLite rows and are kept
//! separate from the grocer-types models so the schema can move on its own.

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
}

pub struct ListRow {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub share_code: String,
    pub created_at: String,
}

pub struct MemberRow {
    pub list_id: String,
    pub user_id: String,
}

pub struct ItemRow {
    pub id: String,
    pub name: String,
    pub completed: bool,
    pub list_id: String,
    pub creator_id: String,
    pub store: Option<String>,
    pub quantity: Option<String>,
    pub created_at: String,
}

pub struct ProfileRow {
    pub id: String,
    pub first_name: Option<String>,
    pub preferred_language: String,
}
