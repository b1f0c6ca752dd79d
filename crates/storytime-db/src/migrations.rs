use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE sec_user (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL,
                email       TEXT NOT NULL UNIQUE,
                active      INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE category (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                label       TEXT NOT NULL UNIQUE,
                description TEXT
            );

            CREATE TABLE upload_file (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                filename    TEXT NOT NULL,
                url         TEXT NOT NULL
            );

            CREATE TABLE story (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                title               TEXT NOT NULL,
                description         TEXT NOT NULL,
                story_text          TEXT NOT NULL,
                published           INTEGER NOT NULL DEFAULT 0,
                date_created        TEXT NOT NULL DEFAULT (datetime('now')),
                date_last_modified  TEXT NOT NULL DEFAULT (datetime('now')),
                user_id             INTEGER NOT NULL REFERENCES sec_user(id),
                upload_file_id      INTEGER UNIQUE REFERENCES upload_file(id)
            );

            CREATE INDEX idx_story_user ON story(user_id, date_last_modified);
            CREATE INDEX idx_story_published ON story(published, date_created);

            CREATE TABLE story_category (
                story_id    INTEGER NOT NULL REFERENCES story(id),
                category_id INTEGER NOT NULL REFERENCES category(id),
                PRIMARY KEY (story_id, category_id)
            );

            CREATE INDEX idx_story_category_category ON story_category(category_id);

            CREATE TABLE session (
                id          TEXT PRIMARY KEY,
                data        TEXT NOT NULL,
                updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
