//! Ledger transaction reads
//!
//! The pattern-learning core only reads transactions; ingestion and
//! bookkeeping live elsewhere.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// A ledger transaction row, as seen by the similarity grouper
#[derive(Debug, Clone)]
pub struct LedgerTransaction {
    pub guid: Uuid,
    pub tenant_id: String,
    pub description: String,
    pub amount: f64,
    pub counterparty: Option<String>,
    pub occurred_on: Option<String>,
}

impl LedgerTransaction {
    /// Create a new transaction (test and ingestion support)
    pub fn new(tenant_id: &str, description: &str, amount: f64) -> Self {
        Self {
            guid: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            description: description.to_string(),
            amount,
            counterparty: None,
            occurred_on: None,
        }
    }

    /// Set the counterparty (builder-style)
    pub fn with_counterparty(mut self, counterparty: &str) -> Self {
        self.counterparty = Some(counterparty.to_string());
        self
    }
}

/// Save a transaction
pub async fn save_transaction(pool: &SqlitePool, txn: &LedgerTransaction) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ledger_transactions (guid, tenant_id, description, amount, counterparty, occurred_on)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(txn.guid.to_string())
    .bind(&txn.tenant_id)
    .bind(&txn.description)
    .bind(txn.amount)
    .bind(&txn.counterparty)
    .bind(&txn.occurred_on)
    .execute(pool)
    .await?;
    Ok(())
}

/// Load all transactions for a tenant, oldest first
pub async fn list_transactions(pool: &SqlitePool, tenant_id: &str) -> Result<Vec<LedgerTransaction>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, tenant_id, description, amount, counterparty, occurred_on
        FROM ledger_transactions
        WHERE tenant_id = ?
        ORDER BY created_at, guid
        "#,
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_transaction).collect()
}

/// Distinct counterparties observed for a tenant (business context input)
pub async fn list_known_counterparties(pool: &SqlitePool, tenant_id: &str) -> Result<Vec<String>> {
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT counterparty
        FROM ledger_transactions
        WHERE tenant_id = ? AND counterparty IS NOT NULL AND counterparty != ''
        ORDER BY counterparty
        "#,
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(|r| r.get::<String, _>("counterparty")).collect())
}

fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> Result<LedgerTransaction> {
    let guid: String = row.get("guid");
    Ok(LedgerTransaction {
        guid: Uuid::parse_str(&guid)?,
        tenant_id: row.get("tenant_id"),
        description: row.get("description"),
        amount: row.get("amount"),
        counterparty: row.get("counterparty"),
        occurred_on: row.get("occurred_on"),
    })
}
