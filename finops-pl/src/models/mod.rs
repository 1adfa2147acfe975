//! Data models for finops-pl (Pattern Learning service)

pub mod pattern;

pub use pattern::{LlmVerdict, PatternCandidate, PatternStatus, RiskLevel, OCCURRENCE_THRESHOLD};
