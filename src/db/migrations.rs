use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool).await?;

    if current_version < 1 {
        debug!("Running migration v1");
        run_migration_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    if current_version < 2 {
        debug!("Running migration v2");
        run_migration_v2(pool).await?;
        set_schema_version(pool, 2).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create schema version table")?;

    Ok(())
}

async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to get schema version")?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_migration_v1(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v1: creating initial schema");

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS processed_content (
            content_id TEXT PRIMARY KEY,
            storage_cid TEXT NOT NULL,
            processed_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create processed_content table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS mention_log (
            mention_id TEXT PRIMARY KEY,
            author_username TEXT NOT NULL,
            mention_timestamp TEXT,
            logged_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create mention_log table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS conversations (
            conversation_id TEXT PRIMARY KEY,
            last_message_id TEXT NOT NULL,
            last_message_timestamp TEXT NOT NULL,
            sender_id TEXT,
            sender_screen_name TEXT,
            recipient_id TEXT,
            recipient_screen_name TEXT,
            has_unread_messages INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create conversations table")?;

    Ok(())
}

async fn run_migration_v2(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v2: tracking the bot's last sent message per conversation");

    sqlx::query(
        r"
        ALTER TABLE conversations
        ADD COLUMN our_last_message_id TEXT NOT NULL DEFAULT '0'
        ",
    )
    .execute(pool)
    .await
    .context("Failed to add our_last_message_id column")?;

    sqlx::query(
        r"
        CREATE INDEX IF NOT EXISTS idx_conversations_unread
        ON conversations(has_unread_messages, last_message_timestamp)
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create unread conversations index")?;

    Ok(())
}
