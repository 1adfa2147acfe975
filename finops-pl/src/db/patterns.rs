//! Pattern suggestion persistence
//!
//! All status transitions are guarded: the `UPDATE` requires the row to still
//! hold the expected status at write time. A guard miss means another pass
//! already moved the pattern, and the transition becomes a no-op.

use crate::models::{LlmVerdict, PatternCandidate, PatternStatus, OCCURRENCE_THRESHOLD};
use anyhow::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Upsert a pattern's occurrence count from one grouper run.
///
/// Idempotent: the stored count is the maximum of the existing and observed
/// counts, never a sum, so re-running on the same transaction window cannot
/// double-count. Counts are never decremented here. A row whose count reaches
/// the threshold while still `observed` is promoted to `pending`; rows in any
/// later state keep their status (only the count and confidence refresh).
pub async fn upsert_occurrences(
    pool: &SqlitePool,
    tenant_id: &str,
    description_pattern: &str,
    counterparty: Option<&str>,
    observed_count: i64,
    confidence_score: f64,
) -> Result<PatternCandidate> {
    let initial_status = if observed_count >= OCCURRENCE_THRESHOLD {
        PatternStatus::Pending
    } else {
        PatternStatus::Observed
    };
    let counterparty_key = counterparty.unwrap_or("");

    sqlx::query(
        r#"
        INSERT INTO pattern_suggestions (
            guid, tenant_id, description_pattern, counterparty,
            occurrence_count, confidence_score, status
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(tenant_id, description_pattern, counterparty) DO UPDATE SET
            occurrence_count = MAX(pattern_suggestions.occurrence_count, excluded.occurrence_count),
            confidence_score = excluded.confidence_score,
            status = CASE
                WHEN pattern_suggestions.status = 'observed'
                     AND MAX(pattern_suggestions.occurrence_count, excluded.occurrence_count) >= ?
                THEN 'pending'
                ELSE pattern_suggestions.status
            END,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id)
    .bind(description_pattern)
    .bind(counterparty_key)
    .bind(observed_count)
    .bind(confidence_score)
    .bind(initial_status.as_str())
    .bind(OCCURRENCE_THRESHOLD)
    .execute(pool)
    .await?;

    let row = sqlx::query(
        r#"
        SELECT * FROM pattern_suggestions
        WHERE tenant_id = ? AND description_pattern = ? AND counterparty = ?
        "#,
    )
    .bind(tenant_id)
    .bind(description_pattern)
    .bind(counterparty_key)
    .fetch_one(pool)
    .await?;

    row_to_candidate(&row)
}

/// Load one pattern
pub async fn get_pattern(
    pool: &SqlitePool,
    tenant_id: &str,
    pattern_id: Uuid,
) -> Result<Option<PatternCandidate>> {
    let row = sqlx::query("SELECT * FROM pattern_suggestions WHERE tenant_id = ? AND guid = ?")
        .bind(tenant_id)
        .bind(pattern_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_candidate).transpose()
}

/// All pending patterns at or above the occurrence threshold, in stable
/// ascending-identifier order (batch processing order)
pub async fn list_pending(pool: &SqlitePool, tenant_id: &str) -> Result<Vec<PatternCandidate>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM pattern_suggestions
        WHERE tenant_id = ? AND status = 'pending' AND occurrence_count >= ?
        ORDER BY guid
        "#,
    )
    .bind(tenant_id)
    .bind(OCCURRENCE_THRESHOLD)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_candidate).collect()
}

/// All patterns for a tenant, optionally filtered by status (read-only
/// reporting query)
pub async fn list_patterns(
    pool: &SqlitePool,
    tenant_id: &str,
    status: Option<PatternStatus>,
) -> Result<Vec<PatternCandidate>> {
    let rows = match status {
        Some(status) => {
            sqlx::query(
                "SELECT * FROM pattern_suggestions WHERE tenant_id = ? AND status = ? ORDER BY guid",
            )
            .bind(tenant_id)
            .bind(status.as_str())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query("SELECT * FROM pattern_suggestions WHERE tenant_id = ? ORDER BY guid")
                .bind(tenant_id)
                .fetch_all(pool)
                .await?
        }
    };

    rows.iter().map(row_to_candidate).collect()
}

/// Per-status pattern counts for a tenant (read-only reporting query)
pub async fn count_by_status(pool: &SqlitePool, tenant_id: &str) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query(
        r#"
        SELECT status, COUNT(*) AS n
        FROM pattern_suggestions
        WHERE tenant_id = ?
        GROUP BY status
        ORDER BY status
        "#,
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|r| (r.get::<String, _>("status"), r.get::<i64, _>("n")))
        .collect())
}

/// Claim a pending pattern for validation (pending → validating).
///
/// Returns false if the row was no longer pending, in which case another
/// pass owns it and the caller must skip it.
pub async fn claim_for_validation(
    pool: &SqlitePool,
    tenant_id: &str,
    pattern_id: Uuid,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE pattern_suggestions
        SET status = 'validating', updated_at = CURRENT_TIMESTAMP
        WHERE tenant_id = ? AND guid = ? AND status = 'pending'
        "#,
    )
    .bind(tenant_id)
    .bind(pattern_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Store a verdict on a claimed pattern (validating → validated/rejected),
/// writing all three validation fields together.
pub async fn store_verdict(
    pool: &SqlitePool,
    tenant_id: &str,
    pattern_id: Uuid,
    verdict: &LlmVerdict,
    model: &str,
    approved: bool,
) -> Result<bool> {
    let new_status = if approved {
        PatternStatus::Validated
    } else {
        PatternStatus::Rejected
    };
    let verdict_json = serde_json::to_string(verdict)?;

    let result = sqlx::query(
        r#"
        UPDATE pattern_suggestions
        SET status = ?,
            llm_validation_result = ?,
            llm_validated_at = ?,
            validation_model = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE tenant_id = ? AND guid = ? AND status = 'validating'
        "#,
    )
    .bind(new_status.as_str())
    .bind(verdict_json)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(model)
    .bind(tenant_id)
    .bind(pattern_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Release a claim after a failed model call (validating → pending), leaving
/// the pattern eligible for the next pass
pub async fn release_claim(pool: &SqlitePool, tenant_id: &str, pattern_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE pattern_suggestions
        SET status = 'pending', updated_at = CURRENT_TIMESTAMP
        WHERE tenant_id = ? AND guid = ? AND status = 'validating'
        "#,
    )
    .bind(tenant_id)
    .bind(pattern_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Release every abandoned claim for a tenant (validating → pending).
///
/// Claims only live inside a validation pass, and the batch driver runs one
/// pass per tenant at a time, so any row still at `validating` when a pass
/// starts was stranded by a crash mid-model-call. Returns the number of
/// rows released.
pub async fn release_stale_claims(pool: &SqlitePool, tenant_id: &str) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE pattern_suggestions
        SET status = 'pending', updated_at = CURRENT_TIMESTAMP
        WHERE tenant_id = ? AND status = 'validating'
        "#,
    )
    .bind(tenant_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Administrative reset of one rejected pattern back to pending.
///
/// Atomic: the status flips and all three validation fields null out in a
/// single UPDATE.
pub async fn reset_pattern(pool: &SqlitePool, tenant_id: &str, pattern_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE pattern_suggestions
        SET status = 'pending',
            llm_validation_result = NULL,
            llm_validated_at = NULL,
            validation_model = NULL,
            updated_at = CURRENT_TIMESTAMP
        WHERE tenant_id = ? AND guid = ? AND status = 'rejected'
        "#,
    )
    .bind(tenant_id)
    .bind(pattern_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Administrative reset of all rejected patterns for a tenant.
///
/// Returns the number of patterns reset.
pub async fn reset_rejected(pool: &SqlitePool, tenant_id: &str) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE pattern_suggestions
        SET status = 'pending',
            llm_validation_result = NULL,
            llm_validated_at = NULL,
            validation_model = NULL,
            updated_at = CURRENT_TIMESTAMP
        WHERE tenant_id = ? AND status = 'rejected'
        "#,
    )
    .bind(tenant_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub(crate) fn row_to_candidate(row: &sqlx::sqlite::SqliteRow) -> Result<PatternCandidate> {
    let guid: String = row.get("guid");
    let status: String = row.get("status");
    let counterparty: String = row.get("counterparty");
    let verdict_json: Option<String> = row.get("llm_validation_result");
    let validated_at: Option<String> = row.get("llm_validated_at");

    Ok(PatternCandidate {
        guid: Uuid::parse_str(&guid)?,
        tenant_id: row.get("tenant_id"),
        description_pattern: row.get("description_pattern"),
        counterparty: if counterparty.is_empty() {
            None
        } else {
            Some(counterparty)
        },
        occurrence_count: row.get("occurrence_count"),
        confidence_score: row.get("confidence_score"),
        status: PatternStatus::parse(&status)
            .ok_or_else(|| anyhow::anyhow!("Unknown pattern status: {}", status))?,
        llm_validation_result: verdict_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
        llm_validated_at: validated_at
            .as_deref()
            .map(|s| {
                chrono::DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&chrono::Utc))
            })
            .transpose()?,
        validation_model: row.get("validation_model"),
    })
}
