//! Batch validation pass driver
//!
//! Fetches a tenant's pending patterns in stable ascending-identifier order
//! and runs each through one claim → model call → verdict → promote/reject →
//! notify unit, with a bounded number of model calls in flight. One pattern's
//! failure never aborts the batch: the pattern's claim is released, leaving
//! it pending for the next pass. The only fatal condition is failing to read
//! the pending list itself.

use crate::db::{notifications, patterns, transactions};
use crate::db::notifications::Notification;
use crate::db::transactions::LedgerTransaction;
use crate::models::PatternCandidate;
use crate::services::llm_client::{TenantContext, VerdictClient};
use crate::services::similarity_grouper::normalize_description;
use crate::services::verdict_policy::VerdictPolicy;
use crate::workflow::promotion;
use anyhow::{Context, Result};
use finops_common::events::{EventBus, FinopsEvent};
use futures::stream::{FuturesUnordered, StreamExt};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default bound on concurrent model calls per pass
const DEFAULT_CONCURRENCY: usize = 3;

/// Transactions quoted to the model per pattern
const SAMPLE_LIMIT: usize = 5;

/// Reasoning excerpt length in notification messages
const EXCERPT_CHARS: usize = 160;

/// Outcome of one per-pattern unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternOutcome {
    /// Validated, promoted, rule created
    Promoted { rule_id: uuid::Uuid },
    /// Rejected; verdict stored, no rule
    Rejected,
    /// Verdict stored but rule creation failed afterwards; the row is held
    /// at validated and still counts as processed
    Stalled,
    /// Left pending (model failure or claim conflict); not counted as
    /// processed
    Skipped,
}

/// Batch validation pass driver
pub struct ValidationPass<C> {
    db: SqlitePool,
    event_bus: EventBus,
    client: C,
    policy: VerdictPolicy,
    concurrency: usize,
}

impl<C: VerdictClient> ValidationPass<C> {
    pub fn new(db: SqlitePool, event_bus: EventBus, client: C) -> Self {
        Self {
            db,
            event_bus,
            client,
            policy: VerdictPolicy::default(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Override the approval policy
    pub fn with_policy(mut self, policy: VerdictPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the model-call concurrency bound (minimum 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Process all pending pattern suggestions for a tenant.
    ///
    /// Returns the number of patterns moved out of `pending` in this pass.
    /// Safe to re-invoke at any time: already-resolved patterns are not
    /// selected, and claims are guarded against concurrent passes. Claims
    /// stranded at `validating` by a crashed pass are released on entry.
    /// Cancellation stops seeding new patterns; in-flight units drain.
    pub async fn process_pending_pattern_suggestions(
        &self,
        tenant_id: &str,
        cancel_token: &CancellationToken,
    ) -> Result<usize> {
        let released = patterns::release_stale_claims(&self.db, tenant_id)
            .await
            .context("Failed to release stale validation claims")?;
        if released > 0 {
            warn!(tenant_id, released, "Released stale validation claims from an interrupted pass");
        }

        let pending = patterns::list_pending(&self.db, tenant_id)
            .await
            .context("Failed to read pending pattern list")?;

        if pending.is_empty() {
            info!(tenant_id, "No pending patterns to validate");
            return Ok(0);
        }

        info!(tenant_id, pending_count = pending.len(), "Starting validation pass");
        self.event_bus.emit(FinopsEvent::ValidationPassStarted {
            tenant_id: tenant_id.to_string(),
            pending_count: pending.len(),
            timestamp: chrono::Utc::now(),
        });

        let context = self.build_tenant_context(tenant_id).await;
        let window = transactions::list_transactions(&self.db, tenant_id)
            .await
            .unwrap_or_else(|e| {
                warn!(tenant_id, error = %e, "Could not load transaction window; samples unavailable");
                Vec::new()
            });

        let mut queue = pending.into_iter();
        let mut tasks = FuturesUnordered::new();

        // Seed initial batch of units up to the concurrency bound
        for _ in 0..self.concurrency {
            if let Some(pattern) = queue.next() {
                tasks.push(self.run_unit(pattern, &window, &context));
            }
        }

        let mut processed = 0usize;
        while let Some(outcome) = tasks.next().await {
            if !matches!(outcome, PatternOutcome::Skipped) {
                processed += 1;
            }

            // Interruption between patterns: drain in-flight units, seed
            // nothing new; unclaimed patterns remain pending
            if cancel_token.is_cancelled() {
                continue;
            }
            if let Some(pattern) = queue.next() {
                tasks.push(self.run_unit(pattern, &window, &context));
            }
        }

        if cancel_token.is_cancelled() {
            info!(tenant_id, "Validation pass interrupted; remaining patterns stay pending");
        }

        info!(tenant_id, processed, "Validation pass complete");
        self.event_bus.emit(FinopsEvent::ValidationPassCompleted {
            tenant_id: tenant_id.to_string(),
            processed_count: processed,
            timestamp: chrono::Utc::now(),
        });

        Ok(processed)
    }

    /// One per-pattern unit, with its own failure isolation.
    ///
    /// `process_one` only returns an error before a verdict is stored, so
    /// releasing the claim here always returns the row to pending.
    async fn run_unit(
        &self,
        pattern: PatternCandidate,
        window: &[LedgerTransaction],
        context: &TenantContext,
    ) -> PatternOutcome {
        match self.process_one(&pattern, window, context).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    tenant_id = %pattern.tenant_id,
                    pattern_id = %pattern.guid,
                    error = %e,
                    "Pattern validation failed; leaving pattern pending"
                );
                if let Err(release_err) =
                    patterns::release_claim(&self.db, &pattern.tenant_id, pattern.guid).await
                {
                    warn!(
                        pattern_id = %pattern.guid,
                        error = %release_err,
                        "Failed to release validation claim"
                    );
                }
                self.event_bus.emit(FinopsEvent::PatternSkipped {
                    tenant_id: pattern.tenant_id.clone(),
                    pattern_id: pattern.guid,
                    reason: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
                PatternOutcome::Skipped
            }
        }
    }

    async fn process_one(
        &self,
        pattern: &PatternCandidate,
        window: &[LedgerTransaction],
        context: &TenantContext,
    ) -> Result<PatternOutcome> {
        let tenant_id = &pattern.tenant_id;

        if !patterns::claim_for_validation(&self.db, tenant_id, pattern.guid).await? {
            debug!(pattern_id = %pattern.guid, "Pattern no longer pending; skipping");
            return Ok(PatternOutcome::Skipped);
        }

        let sample = collect_sample(window, pattern);
        let verdict = self
            .client
            .validate_pattern(pattern, &sample, context)
            .await
            .map_err(anyhow::Error::from)?;

        let approved = self.policy.approves(pattern, &verdict);
        let stored = patterns::store_verdict(
            &self.db,
            tenant_id,
            pattern.guid,
            &verdict,
            self.client.model(),
            approved,
        )
        .await?;
        if !stored {
            warn!(pattern_id = %pattern.guid, "Verdict write conflicted with another pass; skipping");
            return Ok(PatternOutcome::Skipped);
        }

        // From here on the verdict is stored and the row has left pending;
        // later failures must not reclassify it as skipped
        let outcome = if approved {
            match promotion::promote(&self.db, pattern).await {
                Ok(Some(rule_id)) => {
                    self.event_bus.emit(FinopsEvent::PatternValidated {
                        tenant_id: tenant_id.to_string(),
                        pattern_id: pattern.guid,
                        rule_id,
                        timestamp: chrono::Utc::now(),
                    });
                    PatternOutcome::Promoted { rule_id }
                }
                Ok(None) => {
                    warn!(pattern_id = %pattern.guid, "Promotion conflicted with another pass; skipping");
                    return Ok(PatternOutcome::Skipped);
                }
                Err(e) => {
                    warn!(
                        pattern_id = %pattern.guid,
                        error = %e,
                        "Rule creation failed after verdict stored; pattern held at validated"
                    );
                    return Ok(PatternOutcome::Stalled);
                }
            }
        } else {
            info!(
                tenant_id = %tenant_id,
                pattern_id = %pattern.guid,
                signature = %pattern.description_pattern,
                "Pattern rejected by validator"
            );
            self.event_bus.emit(FinopsEvent::PatternRejected {
                tenant_id: tenant_id.to_string(),
                pattern_id: pattern.guid,
                timestamp: chrono::Utc::now(),
            });
            PatternOutcome::Rejected
        };

        // Exactly one notification per processed pattern per pass
        let (outcome_str, message) = match &outcome {
            PatternOutcome::Promoted { .. } => (
                "validated",
                format!(
                    "Pattern \"{}\" validated and promoted to a classification rule. {}",
                    pattern.description_pattern,
                    excerpt(&verdict.reasoning, EXCERPT_CHARS)
                ),
            ),
            _ => (
                "rejected",
                format!(
                    "Pattern \"{}\" rejected. {}",
                    pattern.description_pattern,
                    excerpt(&verdict.reasoning, EXCERPT_CHARS)
                ),
            ),
        };
        if let Err(e) = notifications::insert_notification(
            &self.db,
            &Notification::new(tenant_id, pattern.guid, outcome_str, message),
        )
        .await
        {
            warn!(
                pattern_id = %pattern.guid,
                error = %e,
                "Notification write failed; pattern outcome stands"
            );
        }

        Ok(outcome)
    }

    /// Assemble tenant business context for the validator.
    ///
    /// Missing context degrades the prompt and logs a warning; it never
    /// fails the pass.
    async fn build_tenant_context(&self, tenant_id: &str) -> TenantContext {
        let entity_names = match crate::db::entities::list_entities(&self.db, tenant_id).await {
            Ok(entities) => entities.into_iter().map(|e| e.name).collect(),
            Err(e) => {
                warn!(tenant_id, error = %e, "Could not load business entities");
                Vec::new()
            }
        };
        let known_counterparties =
            match transactions::list_known_counterparties(&self.db, tenant_id).await {
                Ok(counterparties) => counterparties,
                Err(e) => {
                    warn!(tenant_id, error = %e, "Could not load known counterparties");
                    Vec::new()
                }
            };

        let context = TenantContext {
            entity_names,
            known_counterparties,
        };
        if context.is_empty() {
            warn!(tenant_id, "No business context found; validating with degraded context");
        }
        context
    }
}

/// Transactions from the window matching a pattern's signature and
/// counterparty constraint, capped at the sample limit
fn collect_sample(window: &[LedgerTransaction], pattern: &PatternCandidate) -> Vec<LedgerTransaction> {
    window
        .iter()
        .filter(|txn| normalize_description(&txn.description) == pattern.description_pattern)
        .filter(|txn| match &pattern.counterparty {
            Some(counterparty) => txn.counterparty.as_deref() == Some(counterparty.as_str()),
            None => true,
        })
        .take(SAMPLE_LIMIT)
        .cloned()
        .collect()
}

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max_chars).collect();
        out.push('…');
        out
    }
}
