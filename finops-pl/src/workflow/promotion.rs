//! Promotion engine
//!
//! Turns a validated pattern into an active classification rule. The status
//! flip and the rule insert happen in one database transaction: a rule never
//! exists for a pattern that is not active, and an active pattern always has
//! its rule.

use crate::models::PatternCandidate;
use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

/// Promote a validated pattern to active and create its classification rule.
///
/// Guarded on the row still being `validated`; returns `None` without
/// writing anything if another process already moved the pattern.
pub async fn promote(pool: &SqlitePool, pattern: &PatternCandidate) -> Result<Option<Uuid>> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE pattern_suggestions
        SET status = 'active', updated_at = CURRENT_TIMESTAMP
        WHERE tenant_id = ? AND guid = ? AND status = 'validated'
        "#,
    )
    .bind(&pattern.tenant_id)
    .bind(pattern.guid.to_string())
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() != 1 {
        tx.rollback().await?;
        return Ok(None);
    }

    let rule_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO classification_rules (
            guid, tenant_id, pattern_id, description_pattern, counterparty, active
        ) VALUES (?, ?, ?, ?, ?, 1)
        "#,
    )
    .bind(rule_id.to_string())
    .bind(&pattern.tenant_id)
    .bind(pattern.guid.to_string())
    .bind(&pattern.description_pattern)
    .bind(pattern.counterparty.as_deref().unwrap_or(""))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        tenant_id = %pattern.tenant_id,
        pattern_id = %pattern.guid,
        rule_id = %rule_id,
        signature = %pattern.description_pattern,
        "Promoted pattern to active classification rule"
    );

    Ok(Some(rule_id))
}
