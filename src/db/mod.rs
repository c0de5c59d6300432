//! Database module for SQLite persistence.
//!
//! SQLite is the durable copy of users, blocks, fezzes and posts. Live fez
//! membership is served from the engine's memory and written through on
//! every change.

mod repository;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run embedded migrations
    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL DEFAULT 1,
            revision_id INTEGER NOT NULL DEFAULT 0,
            generated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        INSERT OR IGNORE INTO meta (id, schema_version, revision_id, generated_at)
        VALUES (1, 1, 0, datetime('now'));
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id BLOB PRIMARY KEY,
            username TEXT NOT NULL UNIQUE COLLATE NOCASE,
            display_name TEXT,
            mutewords TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS blocks (
            blocker_id BLOB NOT NULL REFERENCES users(id),
            blocked_id BLOB NOT NULL REFERENCES users(id),
            created_at TEXT NOT NULL,
            PRIMARY KEY (blocker_id, blocked_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fezzes (
            id BLOB PRIMARY KEY,
            fez_type TEXT NOT NULL,
            title TEXT NOT NULL,
            info TEXT NOT NULL,
            location TEXT NOT NULL,
            start_time TEXT,
            end_time TEXT,
            min_capacity INTEGER NOT NULL DEFAULT 0,
            max_capacity INTEGER NOT NULL DEFAULT 0,
            owner_id BLOB NOT NULL REFERENCES users(id),
            roster TEXT NOT NULL,
            waitlist TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fez_posts (
            id BLOB PRIMARY KEY,
            fez_id BLOB NOT NULL REFERENCES fezzes(id),
            author_id BLOB NOT NULL REFERENCES users(id),
            text TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_blocks_blocked ON blocks(blocked_id);
        CREATE INDEX IF NOT EXISTS idx_fezzes_owner ON fezzes(owner_id);
        CREATE INDEX IF NOT EXISTS idx_fez_posts_fez ON fez_posts(fez_id, created_at);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
