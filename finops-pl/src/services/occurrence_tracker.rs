//! Occurrence tracker
//!
//! Persists grouper output into pattern suggestion rows. Idempotent with
//! respect to the transaction window: the stored occurrence count is the
//! maximum of the stored and observed counts, never a running sum, and it is
//! never decremented here (decreases are an explicit administrative action
//! outside this component).

use crate::db::patterns;
use crate::models::PatternCandidate;
use crate::services::similarity_grouper::TransactionGroup;
use anyhow::Result;
use sqlx::SqlitePool;
use tracing::debug;

/// Occurrence tracker service
pub struct OccurrenceTracker {
    db: SqlitePool,
}

impl OccurrenceTracker {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Record one grouper run for a tenant.
    ///
    /// Creates or updates one pattern suggestion per group and returns the
    /// resulting rows. Groups reaching the occurrence threshold become
    /// `pending`; smaller groups rest at `observed`.
    pub async fn record_groups(
        &self,
        tenant_id: &str,
        groups: &[TransactionGroup],
    ) -> Result<Vec<PatternCandidate>> {
        let mut candidates = Vec::with_capacity(groups.len());

        for group in groups {
            let confidence = confidence_score(group);
            let candidate = patterns::upsert_occurrences(
                &self.db,
                tenant_id,
                &group.signature,
                group.counterparty.as_deref(),
                group.occurrence_count(),
                confidence,
            )
            .await?;

            debug!(
                tenant_id,
                signature = %candidate.description_pattern,
                count = candidate.occurrence_count,
                status = %candidate.status,
                "Recorded pattern occurrences"
            );
            candidates.push(candidate);
        }

        Ok(candidates)
    }
}

/// Uniformity-based confidence score for a group (0.0-1.0).
///
/// Mean of two modal shares: how consistently the amounts carry the same
/// sign, and how consistently the transactions name the same counterparty.
pub fn confidence_score(group: &TransactionGroup) -> f64 {
    let n = group.transactions.len();
    if n == 0 {
        return 0.0;
    }

    let negative = group
        .transactions
        .iter()
        .filter(|t| t.amount < 0.0)
        .count();
    let sign_consistency = negative.max(n - negative) as f64 / n as f64;

    let mut counterparty_counts: std::collections::HashMap<&str, usize> =
        std::collections::HashMap::new();
    for txn in &group.transactions {
        *counterparty_counts
            .entry(txn.counterparty.as_deref().unwrap_or(""))
            .or_insert(0) += 1;
    }
    let counterparty_consistency =
        counterparty_counts.values().copied().max().unwrap_or(0) as f64 / n as f64;

    (sign_consistency + counterparty_consistency) / 2.0
}
