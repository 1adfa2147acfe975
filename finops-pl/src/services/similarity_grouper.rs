//! Similarity grouper
//!
//! Groups a tenant's transactions by normalized description signature,
//! optionally keyed by counterparty as well. Pure reads: nothing here writes
//! to the database. Matching is exact on the normalized signature; there is
//! no fuzzy or edit-distance matching.

use crate::db::transactions::LedgerTransaction;
use std::collections::BTreeMap;

/// A group of transactions sharing one signature
#[derive(Debug, Clone)]
pub struct TransactionGroup {
    /// Normalized description signature
    pub signature: String,
    /// Counterparty shared by the group, when grouping by counterparty
    pub counterparty: Option<String>,
    /// Member transactions
    pub transactions: Vec<LedgerTransaction>,
}

impl TransactionGroup {
    /// Number of observed occurrences
    pub fn occurrence_count(&self) -> i64 {
        self.transactions.len() as i64
    }
}

/// Normalize a transaction description into a signature.
///
/// Lowercases, collapses whitespace runs to a single space, and replaces
/// digit runs with a `#` token, so "PAYMENT 4821 ACME" and "payment 97
/// Acme" share the signature "payment # acme".
pub fn normalize_description(description: &str) -> String {
    let mut out = String::with_capacity(description.len());
    let mut in_digits = false;
    let mut in_space = false;

    for c in description.trim().chars() {
        if c.is_ascii_digit() {
            if !in_digits {
                out.push('#');
            }
            in_digits = true;
            in_space = false;
        } else if c.is_whitespace() {
            if !in_space && !out.is_empty() {
                out.push(' ');
            }
            in_space = true;
            in_digits = false;
        } else {
            for lower in c.to_lowercase() {
                out.push(lower);
            }
            in_digits = false;
            in_space = false;
        }
    }

    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Group transactions by normalized signature.
///
/// With `by_counterparty` set, transactions additionally split by exact
/// counterparty, and each group carries that counterparty as a constraint.
/// Groups come back in stable signature order.
pub fn group_transactions(
    transactions: &[LedgerTransaction],
    by_counterparty: bool,
) -> Vec<TransactionGroup> {
    let mut groups: BTreeMap<(String, String), Vec<LedgerTransaction>> = BTreeMap::new();

    for txn in transactions {
        let signature = normalize_description(&txn.description);
        if signature.is_empty() {
            continue;
        }
        let counterparty_key = if by_counterparty {
            txn.counterparty.clone().unwrap_or_default()
        } else {
            String::new()
        };
        groups
            .entry((signature, counterparty_key))
            .or_default()
            .push(txn.clone());
    }

    groups
        .into_iter()
        .map(|((signature, counterparty_key), transactions)| TransactionGroup {
            signature,
            counterparty: if counterparty_key.is_empty() {
                None
            } else {
                Some(counterparty_key)
            },
            transactions,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn(description: &str) -> LedgerTransaction {
        LedgerTransaction::new("tenant-a", description, -10.0)
    }

    #[test]
    fn normalization_collapses_case_whitespace_and_numbers() {
        assert_eq!(normalize_description("PAYMENT 4821  ACME"), "payment # acme");
        assert_eq!(normalize_description("payment 97 Acme"), "payment # acme");
        assert_eq!(normalize_description("  Stripe payout 2024-03  "), "stripe payout #-#");
    }

    #[test]
    fn adjacent_digit_runs_become_one_token() {
        assert_eq!(normalize_description("INV20240131"), "inv#");
    }

    #[test]
    fn empty_descriptions_produce_no_group() {
        let txns = vec![txn("   "), txn("coffee")];
        let groups = group_transactions(&txns, false);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].signature, "coffee");
    }

    #[test]
    fn groups_by_exact_signature() {
        let txns = vec![
            txn("AWS Invoice 1001"),
            txn("aws invoice 1002"),
            txn("Github Inc"),
        ];
        let groups = group_transactions(&txns, false);
        assert_eq!(groups.len(), 2);
        let aws = groups.iter().find(|g| g.signature == "aws invoice #").unwrap();
        assert_eq!(aws.occurrence_count(), 2);
        assert!(aws.counterparty.is_none());
    }

    #[test]
    fn counterparty_splits_groups_when_enabled() {
        let txns = vec![
            txn("Monthly fee").with_counterparty("Bank A"),
            txn("Monthly fee").with_counterparty("Bank B"),
            txn("Monthly fee").with_counterparty("Bank A"),
        ];

        let merged = group_transactions(&txns, false);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].occurrence_count(), 3);

        let split = group_transactions(&txns, true);
        assert_eq!(split.len(), 2);
        let bank_a = split
            .iter()
            .find(|g| g.counterparty.as_deref() == Some("Bank A"))
            .unwrap();
        assert_eq!(bank_a.occurrence_count(), 2);
    }
}
