use crate::Database;
use crate::models::{ItemRow, ListRow, MemberRow, ProfileRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, Row};

const LIST_COLUMNS: &str = "l.id, l.name, l.owner_id, l.share_code, l.created_at";
const ITEM_COLUMNS: &str = "id, name, completed, list_id, creator_id, store, quantity, created_at";

impl Database {
    // -- Users --

    /// Inserts the user and an empty profile. Both rows land or neither does.
    pub fn create_user(&self, id: &str, email: &str, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO users (id, email, password) VALUES (?1, ?2, ?3)",
                (id, email, password_hash),
            )?;
            tx.execute("INSERT INTO profiles (id) VALUES (?1)", [id])?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    // -- Lists --

    pub fn insert_list(&self, row: &ListRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO lists (id, name, owner_id, share_code, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                (&row.id, &row.name, &row.owner_id, &row.share_code, &row.created_at),
            )?;
            Ok(())
        })
    }

    pub fn get_list_by_id(&self, id: &str) -> Result<Option<ListRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM lists l WHERE l.id = ?1", LIST_COLUMNS);
            conn.query_row(&sql, [id], list_from_row).optional()
        })
    }

    /// Exact match; SQLite `=` on TEXT is case-sensitive under the default collation.
    pub fn get_list_by_share_code(&self, code: &str) -> Result<Option<ListRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM lists l WHERE l.share_code = ?1", LIST_COLUMNS);
            conn.query_row(&sql, [code], list_from_row).optional()
        })
    }

    pub fn lists_owned_by(&self, user_id: &str) -> Result<Vec<ListRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM lists l WHERE l.owner_id = ?1 ORDER BY l.created_at DESC, l.rowid DESC",
                LIST_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], list_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn lists_joined_by(&self, user_id: &str) -> Result<Vec<ListRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM lists l
                 JOIN list_members m ON m.list_id = l.id
                 WHERE m.user_id = ?1
                 ORDER BY l.created_at DESC, l.rowid DESC",
                LIST_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], list_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Owner or member.
    pub fn can_access_list(&self, list_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM lists l
                     WHERE l.id = ?1
                       AND (l.owner_id = ?2
                            OR EXISTS (SELECT 1 FROM list_members m
                                       WHERE m.list_id = l.id AND m.user_id = ?2))",
                    (list_id, user_id),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    // -- Members --

    /// Fails with a UNIQUE violation when the pair already exists.
    pub fn insert_membership(&self, list_id: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO list_members (list_id, user_id) VALUES (?1, ?2)",
                (list_id, user_id),
            )?;
            Ok(())
        })
    }

    pub fn members_of(&self, list_id: &str) -> Result<Vec<MemberRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT list_id, user_id FROM list_members WHERE list_id = ?1 ORDER BY created_at, rowid",
            )?;
            let rows = stmt
                .query_map([list_id], |row| {
                    Ok(MemberRow {
                        list_id: row.get(0)?,
                        user_id: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn membership_count(&self, list_id: &str, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM list_members WHERE list_id = ?1 AND user_id = ?2",
                (list_id, user_id),
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    // -- Items --

    pub fn insert_item(&self, row: &ItemRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO grocery_items (id, name, completed, list_id, creator_id, store, quantity, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    row.id,
                    row.name,
                    row.completed,
                    row.list_id,
                    row.creator_id,
                    row.store,
                    row.quantity,
                    row.created_at
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_item(&self, id: &str) -> Result<Option<ItemRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM grocery_items WHERE id = ?1", ITEM_COLUMNS);
            conn.query_row(&sql, [id], item_from_row).optional()
        })
    }

    pub fn items_for_list(&self, list_id: &str) -> Result<Vec<ItemRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM grocery_items WHERE list_id = ?1 ORDER BY created_at, rowid",
                ITEM_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([list_id], item_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_items(&self, list_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM grocery_items WHERE list_id = ?1",
                [list_id],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    /// Returns the number of rows touched (0 when the item is gone).
    pub fn set_item_completed(&self, id: &str, completed: bool) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE grocery_items SET completed = ?2 WHERE id = ?1",
                rusqlite::params![id, completed],
            )?;
            Ok(n)
        })
    }

    pub fn delete_item(&self, id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM grocery_items WHERE id = ?1", [id])?;
            Ok(n)
        })
    }

    // -- Stores --

    pub fn stores_for_list(&self, list_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT name FROM list_stores WHERE list_id = ?1 ORDER BY name")?;
            let rows = stmt
                .query_map([list_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }

    pub fn insert_store(&self, list_id: &str, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO list_stores (list_id, name) VALUES (?1, ?2)",
                (list_id, name),
            )?;
            Ok(())
        })
    }

    // -- Profiles --

    pub fn get_profile(&self, id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| query_profile(conn, id))
    }

    /// Creates the profile or updates only the fields that are `Some`.
    pub fn upsert_profile(
        &self,
        id: &str,
        first_name: Option<&str>,
        preferred_language: Option<&str>,
    ) -> Result<ProfileRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO profiles (id, first_name, preferred_language)
                 VALUES (?1, ?2, COALESCE(?3, 'en'))
                 ON CONFLICT(id) DO UPDATE SET
                     first_name = COALESCE(excluded.first_name, profiles.first_name),
                     preferred_language = COALESCE(?3, profiles.preferred_language)",
                rusqlite::params![id, first_name, preferred_language],
            )?;
            query_profile(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("Profile vanished after upsert: {}", id))
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, email, password, created_at FROM users WHERE {} = ?1",
        column
    );
    conn.query_row(&sql, [value], |row| {
        Ok(UserRow {
            id: row.get(0)?,
            email: row.get(1)?,
            password: row.get(2)?,
            created_at: row.get(3)?,
        })
    })
    .optional()
}

fn query_profile(conn: &Connection, id: &str) -> Result<Option<ProfileRow>> {
    conn.query_row(
        "SELECT id, first_name, preferred_language FROM profiles WHERE id = ?1",
        [id],
        |row| {
            Ok(ProfileRow {
                id: row.get(0)?,
                first_name: row.get(1)?,
                preferred_language: row.get(2)?,
            })
        },
    )
    .optional()
}

fn list_from_row(row: &Row<'_>) -> rusqlite::Result<ListRow> {
    Ok(ListRow {
        id: row.get(0)?,
        name: row.get(1)?,
        owner_id: row.get(2)?,
        share_code: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        id: row.get(0)?,
        name: row.get(1)?,
        completed: row.get(2)?,
        list_id: row.get(3)?,
        creator_id: row.get(4)?,
        store: row.get(5)?,
        quantity: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
