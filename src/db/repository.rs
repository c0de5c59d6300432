//! Database repository for users, blocks, fezzes and posts.
//!
//! Every write runs in a transaction that also bumps the global revision.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::errors::AppError;
use crate::fez::{Fez, Roster, Waitlist};
use crate::models::{CreateUserRequest, FezPost, FezType, RevisionInfo, User};

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Get revision info.
    pub async fn get_revision_info(&self) -> Result<RevisionInfo, AppError> {
        let row = sqlx::query("SELECT revision_id, generated_at FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(RevisionInfo {
            revision_id: row.get("revision_id"),
            generated_at: row.get("generated_at"),
        })
    }

    // ==================== USER OPERATIONS ====================

    /// Register a new user. Usernames are unique case-insensitively.
    pub async fn create_user(&self, request: &CreateUserRequest) -> Result<User, AppError> {
        let username = request.normalized_username().ok_or_else(|| {
            AppError::Validation(
                "Username must be 2-50 characters of letters, digits, '.', '_' or '-'".to_string(),
            )
        })?;

        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT id FROM users WHERE username = ? COLLATE NOCASE")
            .bind(&username)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(AppError::Conflict(format!(
                "Username '{}' is already taken",
                username
            )));
        }

        let user = User {
            id: Uuid::new_v4(),
            username,
            display_name: request
                .display_name
                .as_ref()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            created_at: Utc::now().to_rfc3339(),
        };

        sqlx::query(
            "INSERT INTO users (id, username, display_name, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.created_at)
        .execute(&mut *tx)
        .await?;

        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(user)
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let row = sqlx::query(
            "SELECT id, username, display_name, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Get a user by username, ignoring case.
    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query(
            "SELECT id, username, display_name, created_at FROM users WHERE username = ? COLLATE NOCASE",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Resolve user IDs to usernames. Unknown IDs are absent from the map.
    pub async fn usernames(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, String>, AppError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut builder = sqlx::QueryBuilder::<Sqlite>::new("SELECT id, username FROM users WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("id"), row.get("username")))
            .collect())
    }

    pub async fn get_mutewords(&self, user_id: Uuid) -> Result<Vec<String>, AppError> {
        let row = sqlx::query("SELECT mutewords FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .map(|r| parse_json_array(&r.get::<String, _>("mutewords")))
            .unwrap_or_default())
    }

    /// Replace a user's mutewords. Blank entries are dropped.
    pub async fn set_mutewords(
        &self,
        user_id: Uuid,
        mutewords: &[String],
    ) -> Result<Vec<String>, AppError> {
        let cleaned: Vec<String> = mutewords
            .iter()
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();
        let json = serde_json::to_string(&cleaned)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE users SET mutewords = ? WHERE id = ?")
            .bind(&json)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(cleaned)
    }

    // ==================== BLOCK OPERATIONS ====================

    /// Record that `blocker` blocks `blocked`. Idempotent.
    pub async fn add_block(&self, blocker: Uuid, blocked: Uuid) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT OR IGNORE INTO blocks (blocker_id, blocked_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(blocker)
        .bind(blocked)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn remove_block(&self, blocker: Uuid, blocked: Uuid) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM blocks WHERE blocker_id = ? AND blocked_id = ?")
            .bind(blocker)
            .bind(blocked)
            .execute(&mut *tx)
            .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Users who block, or are blocked by, `user_id`.
    pub async fn blocked_user_ids(&self, user_id: Uuid) -> Result<HashSet<Uuid>, AppError> {
        let rows = sqlx::query(
            r#"SELECT blocked_id AS other FROM blocks WHERE blocker_id = ?
               UNION
               SELECT blocker_id AS other FROM blocks WHERE blocked_id = ?"#,
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("other")).collect())
    }

    // ==================== FEZ OPERATIONS ====================

    /// Load every stored fez.
    pub async fn list_fezzes(&self) -> Result<Vec<Fez>, AppError> {
        let rows = sqlx::query(
            r#"SELECT id, fez_type, title, info, location, start_time, end_time,
                      min_capacity, max_capacity, owner_id, roster, waitlist,
                      created_at, updated_at
               FROM fezzes ORDER BY created_at"#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(fez_from_row).collect()
    }

    /// Store a newly created fez.
    pub async fn insert_fez(&self, fez: &Fez) -> Result<i64, AppError> {
        let roster_json = serde_json::to_string(&fez.roster)?;
        let waitlist_json = serde_json::to_string(&fez.waitlist)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"INSERT INTO fezzes (id, fez_type, title, info, location, start_time, end_time,
                                   min_capacity, max_capacity, owner_id, roster, waitlist,
                                   created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(fez.id)
        .bind(fez.fez_type.as_str())
        .bind(&fez.title)
        .bind(&fez.info)
        .bind(&fez.location)
        .bind(fez.start_time)
        .bind(fez.end_time)
        .bind(i64::from(fez.min_capacity))
        .bind(i64::from(fez.max_capacity))
        .bind(fez.owner_id)
        .bind(&roster_json)
        .bind(&waitlist_json)
        .bind(fez.created_at)
        .bind(fez.updated_at)
        .execute(&mut *tx)
        .await?;

        let revision = bump_revision(&mut tx).await?;
        tx.commit().await?;
        Ok(revision)
    }

    /// Persist a fez's roster and waitlist as a single write.
    pub async fn save_membership(&self, fez: &Fez) -> Result<i64, AppError> {
        let roster_json = serde_json::to_string(&fez.roster)?;
        let waitlist_json = serde_json::to_string(&fez.waitlist)?;

        let mut tx = self.pool.begin().await?;
        let result =
            sqlx::query("UPDATE fezzes SET roster = ?, waitlist = ?, updated_at = ? WHERE id = ?")
                .bind(&roster_json)
                .bind(&waitlist_json)
                .bind(fez.updated_at)
                .bind(fez.id)
                .execute(&mut *tx)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Fez {} not found", fez.id)));
        }

        let revision = bump_revision(&mut tx).await?;
        tx.commit().await?;
        Ok(revision)
    }

    // ==================== POST OPERATIONS ====================

    pub async fn create_post(
        &self,
        fez_id: Uuid,
        author_id: Uuid,
        text: &str,
    ) -> Result<FezPost, AppError> {
        let post = FezPost {
            id: Uuid::new_v4(),
            fez_id,
            author_id,
            text: text.to_string(),
            created_at: Utc::now(),
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO fez_posts (id, fez_id, author_id, text, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(post.id)
        .bind(post.fez_id)
        .bind(post.author_id)
        .bind(&post.text)
        .bind(post.created_at)
        .execute(&mut *tx)
        .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(post)
    }

    pub async fn get_post(&self, id: Uuid) -> Result<Option<FezPost>, AppError> {
        let row = sqlx::query(
            "SELECT id, fez_id, author_id, text, created_at FROM fez_posts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(post_from_row))
    }

    /// Posts of a fez, oldest first.
    pub async fn list_posts(&self, fez_id: Uuid) -> Result<Vec<FezPost>, AppError> {
        let rows = sqlx::query(
            "SELECT id, fez_id, author_id, text, created_at FROM fez_posts WHERE fez_id = ? ORDER BY created_at",
        )
        .bind(fez_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(post_from_row).collect())
    }

    pub async fn delete_post(&self, id: Uuid) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM fez_posts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Post {} not found", id)));
        }

        bump_revision(&mut tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Increment the revision ID inside a transaction and return the new value.
async fn bump_revision(tx: &mut Transaction<'_, Sqlite>) -> Result<i64, AppError> {
    let now = Utc::now().to_rfc3339();
    sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
        .bind(&now)
        .execute(&mut **tx)
        .await?;
    let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
        .fetch_one(&mut **tx)
        .await?;
    Ok(row.get("revision_id"))
}

// Helper functions for row conversion

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        display_name: row.get("display_name"),
        created_at: row.get("created_at"),
    }
}

fn post_from_row(row: &sqlx::sqlite::SqliteRow) -> FezPost {
    FezPost {
        id: row.get("id"),
        fez_id: row.get("fez_id"),
        author_id: row.get("author_id"),
        text: row.get("text"),
        created_at: row.get("created_at"),
    }
}

fn fez_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Fez, AppError> {
    let id: Uuid = row.get("id");
    let corrupt = |what: &str| AppError::Database(format!("Fez {} has invalid {}", id, what));

    let type_str: String = row.get("fez_type");
    let fez_type = FezType::from_api_str(&type_str).ok_or_else(|| corrupt("type"))?;
    let roster: Roster =
        serde_json::from_str(row.get::<&str, _>("roster")).map_err(|_| corrupt("roster"))?;
    let waitlist: Waitlist =
        serde_json::from_str(row.get::<&str, _>("waitlist")).map_err(|_| corrupt("waitlist"))?;
    let min_capacity: i64 = row.get("min_capacity");
    let max_capacity: i64 = row.get("max_capacity");
    let start_time: Option<DateTime<Utc>> = row.get("start_time");
    let end_time: Option<DateTime<Utc>> = row.get("end_time");

    Ok(Fez {
        id,
        fez_type,
        title: row.get("title"),
        info: row.get("info"),
        location: row.get("location"),
        start_time,
        end_time,
        min_capacity: u32::try_from(min_capacity).map_err(|_| corrupt("min capacity"))?,
        max_capacity: u32::try_from(max_capacity).map_err(|_| corrupt("max capacity"))?,
        owner_id: row.get("owner_id"),
        roster,
        waitlist,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn parse_json_array(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}
