//! Shared test helpers: in-memory database setup, seed data, and a scripted
//! mock verdict client.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use sqlx::SqlitePool;

use finops_common::events::EventBus;
use finops_pl::db::transactions::{save_transaction, LedgerTransaction};
use finops_pl::models::{LlmVerdict, PatternCandidate};
use finops_pl::services::llm_client::{LlmError, TenantContext, VerdictClient};

pub const TENANT_A: &str = "tenant-a";
pub const TENANT_B: &str = "tenant-b";

/// Fresh in-memory database with the full schema
pub async fn memory_pool() -> SqlitePool {
    finops_common::db::init::init_memory_database()
        .await
        .expect("in-memory database init")
}

pub fn event_bus() -> EventBus {
    EventBus::new(64)
}

/// Seed `count` transactions sharing a description stem (distinct invoice
/// numbers, same signature after normalization)
pub async fn seed_recurring_transactions(
    pool: &SqlitePool,
    tenant_id: &str,
    description_stem: &str,
    count: usize,
    amount: f64,
    counterparty: Option<&str>,
) {
    for i in 0..count {
        let mut txn = LedgerTransaction::new(
            tenant_id,
            &format!("{} {}", description_stem, 1000 + i),
            amount,
        );
        if let Some(c) = counterparty {
            txn = txn.with_counterparty(c);
        }
        save_transaction(pool, &txn).await.expect("seed transaction");
    }
}

pub fn verdict(is_valid: bool, reasoning: &str, risk: &str) -> LlmVerdict {
    LlmVerdict {
        is_valid,
        reasoning: reasoning.to_string(),
        risk_assessment: risk.to_string(),
    }
}

/// Scripted verdict client: responses keyed by pattern signature.
///
/// Signatures without a scripted response get a valid/low-risk verdict.
/// A scripted `Err` string becomes a network error from the model call.
pub struct MockLlmClient {
    responses: HashMap<String, Result<LlmVerdict, String>>,
    pub calls: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(mut self, signature: &str, verdict: LlmVerdict) -> Self {
        self.responses.insert(signature.to_string(), Ok(verdict));
        self
    }

    pub fn fail(mut self, signature: &str, message: &str) -> Self {
        self.responses
            .insert(signature.to_string(), Err(message.to_string()));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl VerdictClient for MockLlmClient {
    fn model(&self) -> &str {
        "mock-validator-1"
    }

    async fn validate_pattern(
        &self,
        pattern: &PatternCandidate,
        _sample: &[LedgerTransaction],
        _context: &TenantContext,
    ) -> Result<LlmVerdict, LlmError> {
        self.calls
            .lock()
            .unwrap()
            .push(pattern.description_pattern.clone());

        match self.responses.get(&pattern.description_pattern) {
            Some(Ok(v)) => Ok(v.clone()),
            Some(Err(message)) => Err(LlmError::NetworkError(message.clone())),
            None => Ok(verdict(true, "Recurring charge with a stable counterparty", "low")),
        }
    }
}
