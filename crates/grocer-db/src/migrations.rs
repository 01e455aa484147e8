use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id          TEXT PRIMARY KEY,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS profiles (
                id                  TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                first_name          TEXT,
                preferred_language  TEXT NOT NULL DEFAULT 'en'
            );

            CREATE TABLE IF NOT EXISTS lists (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                owner_id    TEXT NOT NULL REFERENCES users(id),
                share_code  TEXT NOT NULL UNIQUE,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_lists_owner
                ON lists(owner_id, created_at);

            CREATE TABLE IF NOT EXISTS list_members (
                list_id     TEXT NOT NULL REFERENCES lists(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                UNIQUE(list_id, user_id)
            );

            CREATE INDEX IF NOT EXISTS idx_list_members_user
                ON list_members(user_id);

            CREATE TABLE IF NOT EXISTS grocery_items (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                completed   INTEGER NOT NULL DEFAULT 0,
                list_id     TEXT NOT NULL REFERENCES lists(id) ON DELETE CASCADE,
                creator_id  TEXT NOT NULL REFERENCES users(id),
                store       TEXT,
                quantity    TEXT,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_grocery_items_list
                ON grocery_items(list_id, created_at);

            CREATE TABLE IF NOT EXISTS list_stores (
                list_id     TEXT NOT NULL REFERENCES lists(id) ON DELETE CASCADE,
                name        TEXT NOT NULL,
                UNIQUE(list_id, name)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
