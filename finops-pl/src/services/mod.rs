//! Pattern-learning services

pub mod llm_client;
pub mod occurrence_tracker;
pub mod similarity_grouper;
pub mod verdict_policy;

pub use llm_client::{ChatLlmClient, LlmError, TenantContext, VerdictClient};
pub use occurrence_tracker::OccurrenceTracker;
pub use similarity_grouper::{group_transactions, normalize_description, TransactionGroup};
pub use verdict_policy::VerdictPolicy;
