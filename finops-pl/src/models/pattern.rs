//! Pattern candidate model and lifecycle states
//!
//! A pattern candidate is a normalized transaction-description signature
//! tracked for possible promotion to a classification rule. Candidates move
//! through: observed → pending → validating → validated/rejected → active,
//! with rejected candidates resettable to pending by an administrator.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimum observed occurrences before a candidate is eligible for validation
pub const OCCURRENCE_THRESHOLD: i64 = 3;

/// Pattern candidate lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternStatus {
    /// Seen fewer than the threshold number of times; not yet eligible
    Observed,
    /// Eligible for LLM validation
    Pending,
    /// Claimed by an in-flight validation pass
    Validating,
    /// Approved by the validator; awaiting promotion
    Validated,
    /// Declined by the validator; no rule created
    Rejected,
    /// Promoted; an active classification rule references this pattern
    Active,
}

impl PatternStatus {
    /// String representation stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternStatus::Observed => "observed",
            PatternStatus::Pending => "pending",
            PatternStatus::Validating => "validating",
            PatternStatus::Validated => "validated",
            PatternStatus::Rejected => "rejected",
            PatternStatus::Active => "active",
        }
    }

    /// Parse from the database representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "observed" => Some(PatternStatus::Observed),
            "pending" => Some(PatternStatus::Pending),
            "validating" => Some(PatternStatus::Validating),
            "validated" => Some(PatternStatus::Validated),
            "rejected" => Some(PatternStatus::Rejected),
            "active" => Some(PatternStatus::Active),
            _ => None,
        }
    }
}

impl std::fmt::Display for PatternStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured verdict returned by the language model
///
/// Parsed strictly: a response missing any field (or with a wrong-typed
/// field) is a malformed verdict, never silently defaulted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmVerdict {
    /// Whether the pattern is a semantically valid recurring classification
    pub is_valid: bool,
    /// Model's reasoning, stored verbatim for audit
    pub reasoning: String,
    /// Free-text risk assessment (expected to name a low/medium/high level)
    pub risk_assessment: String,
}

impl LlmVerdict {
    /// Risk level stated in the verdict's risk assessment text
    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_text(&self.risk_assessment)
    }
}

/// Risk level parsed from a verdict's free-text risk assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Parse a risk level from free text.
    ///
    /// Unrecognized text is treated as High: an unreadable risk statement
    /// must never auto-approve a pattern.
    pub fn from_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("high") {
            RiskLevel::High
        } else if lower.contains("medium") || lower.contains("moderate") {
            RiskLevel::Medium
        } else if lower.contains("low") {
            RiskLevel::Low
        } else {
            RiskLevel::High
        }
    }
}

/// A tracked pattern candidate row
#[derive(Debug, Clone)]
pub struct PatternCandidate {
    pub guid: Uuid,
    pub tenant_id: String,
    pub description_pattern: String,
    /// Counterparty constraint; `None` when the pattern matches on the
    /// description signature alone
    pub counterparty: Option<String>,
    pub occurrence_count: i64,
    pub confidence_score: f64,
    pub status: PatternStatus,
    pub llm_validation_result: Option<LlmVerdict>,
    pub llm_validated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub validation_model: Option<String>,
}

impl PatternCandidate {
    /// Whether this candidate has reached the validation threshold
    pub fn meets_threshold(&self) -> bool {
        self.occurrence_count >= OCCURRENCE_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_string() {
        for status in [
            PatternStatus::Observed,
            PatternStatus::Pending,
            PatternStatus::Validating,
            PatternStatus::Validated,
            PatternStatus::Rejected,
            PatternStatus::Active,
        ] {
            assert_eq!(PatternStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PatternStatus::parse("bogus"), None);
    }

    #[test]
    fn risk_level_parses_common_phrasings() {
        assert_eq!(RiskLevel::from_text("Low risk of misclassification"), RiskLevel::Low);
        assert_eq!(RiskLevel::from_text("MEDIUM"), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_text("moderate concern"), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_text("high - ambiguous vendor"), RiskLevel::High);
    }

    #[test]
    fn unreadable_risk_text_is_high() {
        assert_eq!(RiskLevel::from_text("¯\\_(ツ)_/¯"), RiskLevel::High);
        assert_eq!(RiskLevel::from_text(""), RiskLevel::High);
    }

    #[test]
    fn verdict_rejects_missing_fields() {
        let err = serde_json::from_str::<LlmVerdict>(r#"{"is_valid": true}"#);
        assert!(err.is_err());
    }

    #[test]
    fn verdict_rejects_wrong_typed_fields() {
        let err = serde_json::from_str::<LlmVerdict>(
            r#"{"is_valid": "yes", "reasoning": "r", "risk_assessment": "low"}"#,
        );
        assert!(err.is_err());
    }
}
