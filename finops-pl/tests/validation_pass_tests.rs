//! Validation pass driver tests: lifecycle scenarios, batch resilience,
//! idempotent re-invocation, and tenant isolation

mod helpers;

use helpers::{
    event_bus, memory_pool, seed_recurring_transactions, verdict, MockLlmClient, TENANT_A,
    TENANT_B,
};

use sqlx::{Row, SqlitePool};
use tokio_util::sync::CancellationToken;

use finops_common::events::FinopsEvent;
use finops_pl::db::{notifications, patterns, rules, transactions};
use finops_pl::models::PatternStatus;
use finops_pl::services::{group_transactions, OccurrenceTracker};
use finops_pl::ValidationPass;

/// Seed a recurring pattern and record it through the tracker
async fn learn(pool: &SqlitePool, tenant_id: &str, stem: &str, count: usize, counterparty: &str) {
    seed_recurring_transactions(pool, tenant_id, stem, count, -25.0, Some(counterparty)).await;
    let window = transactions::list_transactions(pool, tenant_id).await.unwrap();
    let groups = group_transactions(&window, true);
    OccurrenceTracker::new(pool.clone())
        .record_groups(tenant_id, &groups)
        .await
        .unwrap();
}

#[tokio::test]
async fn validated_pattern_becomes_active_rule_with_one_notification() {
    // Given: a pending pattern observed 7 times
    let pool = memory_pool().await;
    learn(&pool, TENANT_A, "AWS invoice", 7, "Amazon Web Services").await;
    let pending = patterns::list_pending(&pool, TENANT_A).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].occurrence_count, 7);
    let pattern_id = pending[0].guid;

    // When: the validator approves it with low risk
    let client = MockLlmClient::new().respond(
        "aws invoice #",
        verdict(true, "Consistent monthly cloud hosting charge", "low"),
    );
    let pass = ValidationPass::new(pool.clone(), event_bus(), client);
    let processed = pass
        .process_pending_pattern_suggestions(TENANT_A, &CancellationToken::new())
        .await
        .unwrap();

    // Then: the pattern is active, a rule references it, one notification
    assert_eq!(processed, 1);
    let pattern = patterns::get_pattern(&pool, TENANT_A, pattern_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pattern.status, PatternStatus::Active);
    assert_eq!(pattern.validation_model.as_deref(), Some("mock-validator-1"));
    let stored_verdict = pattern.llm_validation_result.unwrap();
    assert!(stored_verdict.is_valid);
    assert_eq!(stored_verdict.reasoning, "Consistent monthly cloud hosting charge");
    assert!(pattern.llm_validated_at.is_some());

    assert!(rules::rule_exists_for_pattern(&pool, TENANT_A, pattern_id).await.unwrap());
    let active_rules = rules::list_active_rules(&pool, TENANT_A).await.unwrap();
    assert_eq!(active_rules.len(), 1);
    assert_eq!(active_rules[0].description_pattern, "aws invoice #");
    assert_eq!(active_rules[0].counterparty.as_deref(), Some("Amazon Web Services"));

    let notes = notifications::list_notifications(&pool, TENANT_A).await.unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].outcome, "validated");
    assert_eq!(notes[0].pattern_id, pattern_id);
    assert!(notes[0].message.contains("aws invoice #"));
}

#[tokio::test]
async fn rejected_pattern_stores_verdict_and_creates_no_rule() {
    // Given: a pending pattern at exactly the threshold
    let pool = memory_pool().await;
    learn(&pool, TENANT_A, "Misc transfer", 3, "Unknown").await;
    let pattern_id = patterns::list_pending(&pool, TENANT_A).await.unwrap()[0].guid;

    // When: the validator declines it
    let client = MockLlmClient::new().respond(
        "misc transfer #",
        verdict(false, "Generic transfer description, not a recurring vendor", "high"),
    );
    let pass = ValidationPass::new(pool.clone(), event_bus(), client);
    let processed = pass
        .process_pending_pattern_suggestions(TENANT_A, &CancellationToken::new())
        .await
        .unwrap();

    // Then: rejected, verdict stored verbatim for audit, no rule, one
    // notification carrying the rejection reasoning
    assert_eq!(processed, 1);
    let pattern = patterns::get_pattern(&pool, TENANT_A, pattern_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pattern.status, PatternStatus::Rejected);
    let stored = pattern.llm_validation_result.unwrap();
    assert!(!stored.is_valid);
    assert_eq!(stored.risk_assessment, "high");

    assert!(!rules::rule_exists_for_pattern(&pool, TENANT_A, pattern_id).await.unwrap());
    let notes = notifications::list_notifications(&pool, TENANT_A).await.unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].outcome, "rejected");
    assert!(notes[0].message.contains("not a recurring vendor"));
}

#[tokio::test]
async fn one_failing_model_call_does_not_abort_the_batch() {
    // Given: three pending patterns, the model errors on exactly one
    let pool = memory_pool().await;
    learn(&pool, TENANT_A, "AWS invoice", 3, "Amazon Web Services").await;
    learn(&pool, TENANT_A, "Stripe payout", 3, "Stripe").await;
    learn(&pool, TENANT_A, "Vercel plan", 3, "Vercel").await;
    assert_eq!(patterns::list_pending(&pool, TENANT_A).await.unwrap().len(), 3);

    let client = MockLlmClient::new().fail("stripe payout #", "connection timed out");
    let pass = ValidationPass::new(pool.clone(), event_bus(), client);

    // When: the pass runs
    let processed = pass
        .process_pending_pattern_suggestions(TENANT_A, &CancellationToken::new())
        .await
        .unwrap();

    // Then: N-1 processed; the failing pattern is still pending with its
    // validation fields untouched
    assert_eq!(processed, 2);
    let still_pending = patterns::list_pending(&pool, TENANT_A).await.unwrap();
    assert_eq!(still_pending.len(), 1);
    assert_eq!(still_pending[0].description_pattern, "stripe payout #");
    assert!(still_pending[0].llm_validation_result.is_none());

    let notes = notifications::list_notifications(&pool, TENANT_A).await.unwrap();
    assert_eq!(notes.len(), 2);
}

#[tokio::test]
async fn high_risk_verdict_is_rejected_even_when_valid() {
    let pool = memory_pool().await;
    learn(&pool, TENANT_A, "Wire transfer", 4, "Various").await;
    let pattern_id = patterns::list_pending(&pool, TENANT_A).await.unwrap()[0].guid;

    let client = MockLlmClient::new().respond(
        "wire transfer #",
        verdict(true, "Recurring but amounts vary widely", "high"),
    );
    let pass = ValidationPass::new(pool.clone(), event_bus(), client);
    let processed = pass
        .process_pending_pattern_suggestions(TENANT_A, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(processed, 1);
    let pattern = patterns::get_pattern(&pool, TENANT_A, pattern_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pattern.status, PatternStatus::Rejected);
    assert!(!rules::rule_exists_for_pattern(&pool, TENANT_A, pattern_id).await.unwrap());
}

#[tokio::test]
async fn reinvoking_the_pass_is_idempotent_for_resolved_patterns() {
    // Given: one pattern already resolved by a first pass
    let pool = memory_pool().await;
    learn(&pool, TENANT_A, "AWS invoice", 5, "Amazon Web Services").await;
    let client = MockLlmClient::new();
    let pass = ValidationPass::new(pool.clone(), event_bus(), client);
    assert_eq!(
        pass.process_pending_pattern_suggestions(TENANT_A, &CancellationToken::new())
            .await
            .unwrap(),
        1
    );

    // When: the pass runs again
    let processed = pass
        .process_pending_pattern_suggestions(TENANT_A, &CancellationToken::new())
        .await
        .unwrap();

    // Then: nothing is reprocessed and no duplicate notification appears
    assert_eq!(processed, 0);
    let notes = notifications::list_notifications(&pool, TENANT_A).await.unwrap();
    assert_eq!(notes.len(), 1);
}

#[tokio::test]
async fn cancellation_between_patterns_leaves_the_rest_pending() {
    // Given: three pending patterns, concurrency 1, token cancelled before
    // the pass starts (only the already-seeded unit may complete)
    let pool = memory_pool().await;
    learn(&pool, TENANT_A, "AWS invoice", 3, "Amazon Web Services").await;
    learn(&pool, TENANT_A, "Stripe payout", 3, "Stripe").await;
    learn(&pool, TENANT_A, "Vercel plan", 3, "Vercel").await;

    let client = MockLlmClient::new();
    let pass = ValidationPass::new(pool.clone(), event_bus(), client).with_concurrency(1);
    let cancel_token = CancellationToken::new();
    cancel_token.cancel();

    // When: the pass runs
    let processed = pass
        .process_pending_pattern_suggestions(TENANT_A, &cancel_token)
        .await
        .unwrap();

    // Then: the seeded pattern finished cleanly, the rest are untouched
    assert_eq!(processed, 1);
    assert_eq!(patterns::list_pending(&pool, TENANT_A).await.unwrap().len(), 2);
}

#[tokio::test]
async fn pass_is_scoped_to_one_tenant() {
    // Given: pending patterns in two tenants
    let pool = memory_pool().await;
    learn(&pool, TENANT_A, "AWS invoice", 3, "Amazon Web Services").await;
    learn(&pool, TENANT_B, "AWS invoice", 3, "Amazon Web Services").await;

    // When: only tenant A is processed
    let pass = ValidationPass::new(pool.clone(), event_bus(), MockLlmClient::new());
    let processed = pass
        .process_pending_pattern_suggestions(TENANT_A, &CancellationToken::new())
        .await
        .unwrap();

    // Then: tenant B's pattern is untouched and no rule leaked across
    assert_eq!(processed, 1);
    assert_eq!(patterns::list_pending(&pool, TENANT_B).await.unwrap().len(), 1);
    assert!(rules::list_active_rules(&pool, TENANT_B).await.unwrap().is_empty());
    assert!(notifications::list_notifications(&pool, TENANT_B).await.unwrap().is_empty());
}

#[tokio::test]
async fn business_entities_are_tenant_scoped() {
    use finops_pl::db::entities::{list_entities, save_entity, BusinessEntity};

    let pool = memory_pool().await;
    let entity = BusinessEntity::new(TENANT_A, "Acme Holdings LLC", "company");
    save_entity(&pool, &entity).await.unwrap();
    // Saving again upserts rather than duplicating
    save_entity(&pool, &entity).await.unwrap();

    let entities = list_entities(&pool, TENANT_A).await.unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].name, "Acme Holdings LLC");
    assert!(list_entities(&pool, TENANT_B).await.unwrap().is_empty());
}

#[tokio::test]
async fn pass_emits_lifecycle_events() {
    let pool = memory_pool().await;
    learn(&pool, TENANT_A, "AWS invoice", 3, "Amazon Web Services").await;

    let bus = event_bus();
    let mut rx = bus.subscribe();
    let pass = ValidationPass::new(pool.clone(), bus, MockLlmClient::new());
    pass.process_pending_pattern_suggestions(TENANT_A, &CancellationToken::new())
        .await
        .unwrap();

    let mut saw_started = false;
    let mut saw_validated = false;
    let mut saw_completed = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            FinopsEvent::ValidationPassStarted { pending_count, .. } => {
                saw_started = true;
                assert_eq!(pending_count, 1);
            }
            FinopsEvent::PatternValidated { .. } => saw_validated = true,
            FinopsEvent::ValidationPassCompleted { processed_count, .. } => {
                saw_completed = true;
                assert_eq!(processed_count, 1);
            }
            _ => {}
        }
    }
    assert!(saw_started && saw_validated && saw_completed);
}

#[tokio::test]
async fn active_status_and_rule_existence_stay_coupled() {
    // Given: one approved and one rejected pattern
    let pool = memory_pool().await;
    learn(&pool, TENANT_A, "AWS invoice", 3, "Amazon Web Services").await;
    learn(&pool, TENANT_A, "Misc transfer", 3, "Unknown").await;
    let client = MockLlmClient::new().respond(
        "misc transfer #",
        verdict(false, "Too generic", "high"),
    );
    let pass = ValidationPass::new(pool.clone(), event_bus(), client);
    pass.process_pending_pattern_suggestions(TENANT_A, &CancellationToken::new())
        .await
        .unwrap();

    // Then: every pattern is active iff an active rule references it
    for pattern in patterns::list_patterns(&pool, TENANT_A, None).await.unwrap() {
        let has_rule = rules::rule_exists_for_pattern(&pool, TENANT_A, pattern.guid)
            .await
            .unwrap();
        assert_eq!(pattern.status == PatternStatus::Active, has_rule);
    }
}

#[tokio::test]
async fn verdict_fields_are_all_set_or_all_null() {
    // Processed and unprocessed patterns alike must never hold a partial
    // set of validation fields
    let pool = memory_pool().await;
    learn(&pool, TENANT_A, "AWS invoice", 3, "Amazon Web Services").await;
    learn(&pool, TENANT_A, "Stripe payout", 3, "Stripe").await;
    let client = MockLlmClient::new().fail("stripe payout #", "boom");
    let pass = ValidationPass::new(pool.clone(), event_bus(), client);
    pass.process_pending_pattern_suggestions(TENANT_A, &CancellationToken::new())
        .await
        .unwrap();

    let rows = sqlx::query(
        "SELECT llm_validation_result, llm_validated_at, validation_model FROM pattern_suggestions WHERE tenant_id = ?",
    )
    .bind(TENANT_A)
    .fetch_all(&pool)
    .await
    .unwrap();
    for row in rows {
        let result: Option<String> = row.get("llm_validation_result");
        let validated_at: Option<String> = row.get("llm_validated_at");
        let model: Option<String> = row.get("validation_model");
        assert_eq!(result.is_some(), validated_at.is_some());
        assert_eq!(result.is_some(), model.is_some());
    }
}

#[tokio::test]
async fn notification_failure_still_counts_the_pattern_as_processed() {
    // Given: a pending pattern and a broken notification store
    let pool = memory_pool().await;
    learn(&pool, TENANT_A, "AWS invoice", 3, "Amazon Web Services").await;
    let pattern_id = patterns::list_pending(&pool, TENANT_A).await.unwrap()[0].guid;
    sqlx::query("DROP TABLE notifications").execute(&pool).await.unwrap();

    // When: the pass runs and the verdict resolves the pattern
    let pass = ValidationPass::new(pool.clone(), event_bus(), MockLlmClient::new());
    let processed = pass
        .process_pending_pattern_suggestions(TENANT_A, &CancellationToken::new())
        .await
        .unwrap();

    // Then: the pattern left pending, so the count reflects it
    assert_eq!(processed, 1);
    let pattern = patterns::get_pattern(&pool, TENANT_A, pattern_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pattern.status, PatternStatus::Active);
    assert!(rules::rule_exists_for_pattern(&pool, TENANT_A, pattern_id).await.unwrap());
}

#[tokio::test]
async fn rule_creation_failure_after_verdict_counts_as_processed() {
    // Given: a pending pattern and a broken rule store
    let pool = memory_pool().await;
    learn(&pool, TENANT_A, "AWS invoice", 3, "Amazon Web Services").await;
    let pattern_id = patterns::list_pending(&pool, TENANT_A).await.unwrap()[0].guid;
    sqlx::query("DROP TABLE classification_rules").execute(&pool).await.unwrap();

    // When: the validator approves but promotion cannot create the rule
    let pass = ValidationPass::new(pool.clone(), event_bus(), MockLlmClient::new());
    let processed = pass
        .process_pending_pattern_suggestions(TENANT_A, &CancellationToken::new())
        .await
        .unwrap();

    // Then: the row is held at validated with its verdict intact, not
    // reclassified as skipped
    assert_eq!(processed, 1);
    let pattern = patterns::get_pattern(&pool, TENANT_A, pattern_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pattern.status, PatternStatus::Validated);
    assert!(pattern.llm_validation_result.is_some());
    assert!(patterns::list_pending(&pool, TENANT_A).await.unwrap().is_empty());
    assert!(notifications::list_notifications(&pool, TENANT_A).await.unwrap().is_empty());
}

#[tokio::test]
async fn stranded_claim_is_released_and_revalidated_on_the_next_pass() {
    // Given: a claim abandoned mid-model-call by a crashed pass
    let pool = memory_pool().await;
    learn(&pool, TENANT_A, "AWS invoice", 3, "Amazon Web Services").await;
    let pattern_id = patterns::list_pending(&pool, TENANT_A).await.unwrap()[0].guid;
    assert!(patterns::claim_for_validation(&pool, TENANT_A, pattern_id).await.unwrap());
    assert!(patterns::list_pending(&pool, TENANT_A).await.unwrap().is_empty());

    // When: a fresh pass starts
    let pass = ValidationPass::new(pool.clone(), event_bus(), MockLlmClient::new());
    let processed = pass
        .process_pending_pattern_suggestions(TENANT_A, &CancellationToken::new())
        .await
        .unwrap();

    // Then: the stranded row is recovered and resolved, not stuck at
    // validating forever
    assert_eq!(processed, 1);
    let pattern = patterns::get_pattern(&pool, TENANT_A, pattern_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pattern.status, PatternStatus::Active);
}
