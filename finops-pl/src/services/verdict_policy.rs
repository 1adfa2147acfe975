//! Auto-approval policy
//!
//! Fixed, documented thresholds deciding whether a verdict promotes a
//! pattern. A pattern is approved only when the model says it is valid, the
//! stated risk level is at or below the acceptable bound, and the pattern's
//! own uniformity confidence clears the floor.

use crate::models::{LlmVerdict, PatternCandidate, RiskLevel};

/// Verdict policy thresholds
#[derive(Debug, Clone)]
pub struct VerdictPolicy {
    /// Highest risk level that can still auto-approve (default: Medium)
    pub max_risk: RiskLevel,
    /// Minimum pattern confidence score for auto-approval (default: 0.60)
    pub min_confidence: f64,
}

impl Default for VerdictPolicy {
    fn default() -> Self {
        Self {
            max_risk: RiskLevel::Medium,
            min_confidence: 0.60,
        }
    }
}

impl VerdictPolicy {
    /// Whether this verdict approves the pattern for promotion
    pub fn approves(&self, pattern: &PatternCandidate, verdict: &LlmVerdict) -> bool {
        verdict.is_valid
            && verdict.risk_level() <= self.max_risk
            && pattern.confidence_score >= self.min_confidence
    }
}
