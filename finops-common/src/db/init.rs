//! Database initialization
//!
//! Creates the shared SQLite database on first run and brings the schema up
//! idempotently on every start. All tables are tenant-partitioned: every
//! query against them must filter on `tenant_id`.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Use sqlite options to create database if it doesn't exist
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    configure_pool(&pool).await?;
    create_tables(&pool).await?;

    Ok(pool)
}

/// Initialize an in-memory database (test support)
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    configure_pool(&pool).await?;
    create_tables(&pool).await?;
    Ok(pool)
}

async fn configure_pool(pool: &SqlitePool) -> Result<()> {
    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    // WAL allows concurrent readers with one writer; validation passes read
    // transactions while writing pattern rows
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;

    Ok(())
}

/// Run idempotent schema creation (safe to call multiple times)
async fn create_tables(pool: &SqlitePool) -> Result<()> {
    create_tenants_table(pool).await?;
    create_business_entities_table(pool).await?;
    create_ledger_transactions_table(pool).await?;
    create_pattern_suggestions_table(pool).await?;
    create_classification_rules_table(pool).await?;
    create_notifications_table(pool).await?;
    Ok(())
}

async fn create_tenants_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tenants (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_business_entities_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS business_entities (
            guid TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            name TEXT NOT NULL,
            entity_type TEXT NOT NULL DEFAULT 'entity',
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(tenant_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_ledger_transactions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ledger_transactions (
            guid TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            description TEXT NOT NULL,
            amount REAL NOT NULL,
            counterparty TEXT,
            occurred_on TEXT,
            entity_id TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ledger_transactions_tenant ON ledger_transactions(tenant_id)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_pattern_suggestions_table(pool: &SqlitePool) -> Result<()> {
    // counterparty is stored as '' (not NULL) when the pattern carries no
    // counterparty constraint, so the UNIQUE constraint deduplicates upserts
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pattern_suggestions (
            guid TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            description_pattern TEXT NOT NULL,
            counterparty TEXT NOT NULL DEFAULT '',
            occurrence_count INTEGER NOT NULL DEFAULT 0,
            confidence_score REAL NOT NULL DEFAULT 0.0,
            status TEXT NOT NULL DEFAULT 'observed',
            llm_validation_result TEXT,
            llm_validated_at TEXT,
            validation_model TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(tenant_id, description_pattern, counterparty)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pattern_suggestions_status ON pattern_suggestions(tenant_id, status)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_classification_rules_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS classification_rules (
            guid TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            pattern_id TEXT NOT NULL REFERENCES pattern_suggestions(guid),
            description_pattern TEXT NOT NULL,
            counterparty TEXT NOT NULL DEFAULT '',
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(tenant_id, pattern_id)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_notifications_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            guid TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            pattern_id TEXT NOT NULL,
            outcome TEXT NOT NULL,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
