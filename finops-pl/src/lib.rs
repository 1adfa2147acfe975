//! finops-pl - Pattern Learning service
//!
//! Learns recurring transaction-description patterns for each tenant,
//! validates eligible candidates against a language model, and promotes
//! approved candidates into active classification rules.
//!
//! Control flow: similarity grouper → occurrence tracker → validation pass
//! (claim → model call → verdict → promote/reject → notify).

pub mod db;
pub mod models;
pub mod services;
pub mod workflow;

pub use services::{ChatLlmClient, OccurrenceTracker, VerdictClient, VerdictPolicy};
pub use workflow::ValidationPass;
