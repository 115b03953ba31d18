use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{fs, path::Path, str::FromStr};
use uuid::Uuid;

use shared::domain::{Domain, EntryId, Mood, UserId};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredUser {
    pub user_id: UserId,
    pub email: String,
    pub first_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredUsageEvent {
    pub domain: Domain,
    pub item_label: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredJournalEntry {
    pub entry_id: EntryId,
    pub title: Option<String>,
    pub content: String,
    pub mood: Option<Mood>,
    pub tags: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct JournalEntryDraft {
    pub title: Option<String>,
    pub content: String,
    pub mood: Option<Mood>,
    pub tags: Option<String>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        let storage = Self { pool };
        storage.ensure_schema().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                email      TEXT NOT NULL UNIQUE,
                first_name TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure users table exists")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                user_id         INTEGER PRIMARY KEY,
                subscription_id TEXT NOT NULL,
                status          TEXT NOT NULL,
                created_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure subscriptions table exists")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS usage_events (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id    INTEGER NOT NULL,
                domain     TEXT NOT NULL,
                item_label TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure usage_events table exists")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS journal_entries (
                id         TEXT PRIMARY KEY,
                user_id    INTEGER NOT NULL,
                title      TEXT,
                content    TEXT NOT NULL,
                mood       TEXT,
                tags       TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure journal_entries table exists")?;

        Ok(())
    }

    /// Looks a user up by email, creating the row on first sight.
    pub async fn get_or_create_user(
        &self,
        email: &str,
        first_name: Option<&str>,
    ) -> Result<UserId> {
        let email = email.trim().to_ascii_lowercase();
        if email.is_empty() {
            anyhow::bail!("email must not be empty");
        }

        if let Some(row) = sqlx::query("SELECT id FROM users WHERE email = ?1")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await?
        {
            return Ok(UserId(row.try_get("id")?));
        }

        let result = sqlx::query(
            "INSERT INTO users (email, first_name, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(&email)
        .bind(first_name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("failed to create user")?;
        Ok(UserId(result.last_insert_rowid()))
    }

    pub async fn user_profile(&self, user_id: UserId) -> Result<Option<StoredUser>> {
        let row = sqlx::query("SELECT id, email, first_name, created_at FROM users WHERE id = ?1")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(StoredUser {
                user_id: UserId(row.try_get("id")?),
                email: row.try_get("email")?,
                first_name: row.try_get("first_name")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    pub async fn is_subscribed(&self, user_id: UserId) -> Result<bool> {
        let status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM subscriptions WHERE user_id = ?1",
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(status.as_deref() == Some("active"))
    }

    pub async fn subscription_id_for_user(&self, user_id: UserId) -> Result<Option<String>> {
        let subscription_id: Option<String> = sqlx::query_scalar(
            "SELECT subscription_id FROM subscriptions WHERE user_id = ?1 AND status = 'active'",
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(subscription_id)
    }

    pub async fn activate_subscription(
        &self,
        user_id: UserId,
        subscription_id: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (user_id, subscription_id, status, created_at)
            VALUES (?1, ?2, 'active', ?3)
            ON CONFLICT(user_id) DO UPDATE
                SET subscription_id = excluded.subscription_id, status = 'active'
            "#,
        )
        .bind(user_id.0)
        .bind(subscription_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("failed to activate subscription")?;
        Ok(())
    }

    pub async fn record_usage(
        &self,
        user_id: UserId,
        domain: Domain,
        item_label: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO usage_events (user_id, domain, item_label, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(user_id.0)
        .bind(domain.slug())
        .bind(item_label)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("failed to record usage event")?;
        Ok(())
    }

    pub async fn usage_count(&self, user_id: UserId, domain: Domain) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM usage_events WHERE user_id = ?1 AND domain = ?2",
        )
        .bind(user_id.0)
        .bind(domain.slug())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn total_usage(&self, user_id: UserId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM usage_events WHERE user_id = ?1")
            .bind(user_id.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Most recent usage events first. Events whose stored domain slug
    /// is no longer recognized are skipped.
    pub async fn usage_history(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<StoredUsageEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT domain, item_label, created_at FROM usage_events
            WHERE user_id = ?1
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )
        .bind(user_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let slug: String = row.try_get("domain")?;
            let Some(domain) = Domain::from_slug(&slug) else {
                continue;
            };
            events.push(StoredUsageEvent {
                domain,
                item_label: row.try_get("item_label")?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(events)
    }

    pub async fn insert_journal_entry(
        &self,
        user_id: UserId,
        draft: &JournalEntryDraft,
    ) -> Result<EntryId> {
        let entry_id = EntryId(Uuid::new_v4());
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO journal_entries (id, user_id, title, content, mood, tags, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(entry_id.0.to_string())
        .bind(user_id.0)
        .bind(&draft.title)
        .bind(&draft.content)
        .bind(draft.mood.map(Mood::as_str))
        .bind(&draft.tags)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("failed to insert journal entry")?;
        Ok(entry_id)
    }

    pub async fn journal_entry(
        &self,
        user_id: UserId,
        entry_id: EntryId,
    ) -> Result<Option<StoredJournalEntry>> {
        let row = sqlx::query(
            r#"
            SELECT id, title, content, mood, tags, created_at, updated_at
            FROM journal_entries
            WHERE user_id = ?1 AND id = ?2
            "#,
        )
        .bind(user_id.0)
        .bind(entry_id.0.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(journal_entry_from_row).transpose()
    }

    /// Newest entries first.
    pub async fn list_journal_entries(&self, user_id: UserId) -> Result<Vec<StoredJournalEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, content, mood, tags, created_at, updated_at
            FROM journal_entries
            WHERE user_id = ?1
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(journal_entry_from_row).collect()
    }

    /// Returns false when the entry does not exist or belongs to
    /// another user.
    pub async fn update_journal_entry(
        &self,
        user_id: UserId,
        entry_id: EntryId,
        draft: &JournalEntryDraft,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE journal_entries
            SET title = ?1, content = ?2, mood = ?3, tags = ?4, updated_at = ?5
            WHERE user_id = ?6 AND id = ?7
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.content)
        .bind(draft.mood.map(Mood::as_str))
        .bind(&draft.tags)
        .bind(Utc::now())
        .bind(user_id.0)
        .bind(entry_id.0.to_string())
        .execute(&self.pool)
        .await
        .context("failed to update journal entry")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_journal_entry(&self, user_id: UserId, entry_id: EntryId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM journal_entries WHERE user_id = ?1 AND id = ?2")
            .bind(user_id.0)
            .bind(entry_id.0.to_string())
            .execute(&self.pool)
            .await
            .context("failed to delete journal entry")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn journal_entry_count(&self, user_id: UserId) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM journal_entries WHERE user_id = ?1")
                .bind(user_id.0)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

fn journal_entry_from_row(row: sqlx::sqlite::SqliteRow) -> Result<StoredJournalEntry> {
    let raw_id: String = row.try_get("id")?;
    let entry_id = EntryId(Uuid::parse_str(&raw_id).context("malformed journal entry id")?);
    let mood: Option<String> = row.try_get("mood")?;
    Ok(StoredJournalEntry {
        entry_id,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        mood: mood.as_deref().and_then(Mood::from_str),
        tags: row.try_get("tags")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return Ok(());
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if path.is_empty() {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!(
                    "failed to create parent directory '{}' for database url '{database_url}'",
                    parent.display()
                )
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
