//! Server-side procedures. These run as a single transaction and decide
//! access on their own instead of trusting the caller.

use anyhow::Result;
use tracing::{debug, info};

use crate::Database;
use crate::queries::OptionalExt;

impl Database {
    /// Deletes the list together with its members, items and stores when
    /// `user_id` owns it. Returns `false` (and changes nothing) otherwise,
    /// including when the list does not exist.
    pub fn delete_list_if_owner(&self, list_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let owner: Option<String> = tx
                .query_row("SELECT owner_id FROM lists WHERE id = ?1", [list_id], |row| {
                    row.get(0)
                })
                .optional()?;

            if owner.as_deref() != Some(user_id) {
                debug!("delete_list_if_owner: {} is not the owner of {}", user_id, list_id);
                return Ok(false);
            }

            // Members, items and stores cascade
            tx.execute("DELETE FROM lists WHERE id = ?1", [list_id])?;
            tx.commit()?;

            info!("List {} deleted by owner {}", list_id, user_id);
            Ok(true)
        })
    }
}
