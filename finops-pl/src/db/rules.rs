//! Classification rule reads
//!
//! Rule creation happens only inside the promotion transaction
//! (`workflow::promotion`), never through this module, so a rule can never
//! exist for a pattern that is not active.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Classification rule row
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub guid: Uuid,
    pub tenant_id: String,
    pub pattern_id: Uuid,
    pub description_pattern: String,
    /// Counterparty constraint carried from the pattern; `None` matches on
    /// description alone
    pub counterparty: Option<String>,
    pub active: bool,
}

/// Active rules for a tenant
pub async fn list_active_rules(pool: &SqlitePool, tenant_id: &str) -> Result<Vec<ClassificationRule>> {
    let rows = sqlx::query(
        r#"
        SELECT guid, tenant_id, pattern_id, description_pattern, counterparty, active
        FROM classification_rules
        WHERE tenant_id = ? AND active = 1
        ORDER BY guid
        "#,
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_rule).collect()
}

/// Whether an active rule references the given pattern
pub async fn rule_exists_for_pattern(
    pool: &SqlitePool,
    tenant_id: &str,
    pattern_id: Uuid,
) -> Result<bool> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS n FROM classification_rules
        WHERE tenant_id = ? AND pattern_id = ? AND active = 1
        "#,
    )
    .bind(tenant_id)
    .bind(pattern_id.to_string())
    .fetch_one(pool)
    .await?;

    Ok(row.get::<i64, _>("n") > 0)
}

fn row_to_rule(row: &sqlx::sqlite::SqliteRow) -> Result<ClassificationRule> {
    let guid: String = row.get("guid");
    let pattern_id: String = row.get("pattern_id");
    let counterparty: String = row.get("counterparty");
    Ok(ClassificationRule {
        guid: Uuid::parse_str(&guid)?,
        tenant_id: row.get("tenant_id"),
        pattern_id: Uuid::parse_str(&pattern_id)?,
        description_pattern: row.get("description_pattern"),
        counterparty: if counterparty.is_empty() {
            None
        } else {
            Some(counterparty)
        },
        active: row.get::<i64, _>("active") != 0,
    })
}
