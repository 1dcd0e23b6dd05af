//! Deterministic audit checks for common fraud and anomaly patterns.
//!
//! Each check is an independent pure function over the run's transaction
//! list: no I/O, no shared state, and identical output for identical
//! input. [`run_all_checks`] runs the fixed battery in registration order
//! and concatenates the results without deduplication.
//!
//! Rule parameters come from an explicit [`CheckParams`] value rather
//! than any ambient configuration, so callers (and tests) can vary them
//! per invocation.
//!
//! Two checks are effectively inert against records produced by
//! [`crate::extract`]: the extractor never populates `vendor` (so
//! duplicate grouping skips every extracted record) and emits
//! slash/dash-separated dates that the weekend check's ISO parser
//! rejects. Both checks still fire for records supplied with those
//! fields populated by an external source, and that wiring is preserved
//! as-is rather than second-guessed here.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, Weekday};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::models::{Finding, Severity, Txn};

/// Tunable parameters for the rule battery.
#[derive(Debug, Clone, Copy)]
pub struct CheckParams {
    /// `ROUND_NUMBER`: amount must be divisible by this value.
    pub round_threshold: f64,
    /// `ROUND_NUMBER`: minimum absolute amount to flag.
    pub round_min_amount: f64,
}

impl Default for CheckParams {
    fn default() -> Self {
        Self {
            round_threshold: 100.0,
            round_min_amount: 1000.0,
        }
    }
}

/// Detect duplicate invoices based on vendor, date, and amount.
///
/// Records missing `vendor`, missing `date`, or with a zero amount are
/// skipped. The rest are grouped by a SHA-256 fingerprint of
/// `vendor|date|amount` (equality grouping only; no adversarial-input
/// guarantees needed). Every group with two or more members yields one
/// `DUP_INVOICE` finding referencing all member ids in first-appearance
/// order; groups are emitted in first-appearance order as well.
pub fn check_duplicate_invoices(txns: &[Txn]) -> Vec<Finding> {
    let mut groups: HashMap<String, Vec<&Txn>> = HashMap::new();
    let mut key_order: Vec<String> = Vec::new();

    for txn in txns {
        let vendor = match txn.vendor.as_deref() {
            Some(v) if !v.is_empty() => v,
            _ => continue,
        };
        if txn.date.is_empty() || txn.amount == 0.0 {
            continue;
        }

        let key = fingerprint(vendor, &txn.date, txn.amount);
        let entry = groups.entry(key.clone()).or_default();
        if entry.is_empty() {
            key_order.push(key);
        }
        entry.push(txn);
    }

    let mut findings = Vec::new();
    for key in &key_order {
        let members = &groups[key];
        if members.len() < 2 {
            continue;
        }

        let ids: Vec<String> = members.iter().map(|t| t.id.clone()).collect();
        let first = members[0];
        findings.push(Finding {
            code: "DUP_INVOICE".to_string(),
            severity: Severity::Medium,
            title: "Duplicate Invoice Detected".to_string(),
            detail: format!(
                "Found {} transactions with identical vendor, date, and amount. \
                 Vendor: {}, Date: {}, Amount: ${:.2}. Transaction IDs: {}",
                members.len(),
                first.vendor.as_deref().unwrap_or_default(),
                first.date,
                first.amount,
                ids.join(", ")
            ),
            transaction_ids: ids,
        });
    }

    info!(count = findings.len(), "duplicate invoice check complete");
    findings
}

/// Detect suspiciously round-number transactions.
///
/// Round amounts (exactly $1000, $5000, ...) can indicate manual
/// adjustments, estimates rather than actuals, or fabricated entries.
/// A record is flagged when `|amount| >= min_amount` and `|amount|` is
/// exactly divisible by `threshold` (f64 remainder — sensitive to
/// representation error for non-integral thresholds, acceptable for the
/// default integral one). One finding per qualifying record.
pub fn check_round_numbers(txns: &[Txn], threshold: f64, min_amount: f64) -> Vec<Finding> {
    let mut findings = Vec::new();

    for txn in txns {
        if txn.amount.abs() < min_amount {
            continue;
        }
        if txn.amount.abs() % threshold != 0.0 {
            continue;
        }

        findings.push(Finding {
            code: "ROUND_NUMBER".to_string(),
            severity: Severity::Low,
            title: "Suspiciously Round Amount".to_string(),
            detail: format!(
                "Transaction {} has a round amount of ${:.2}. Date: {}, Vendor: {}, Memo: {}",
                txn.id,
                txn.amount,
                txn.date,
                txn.vendor.as_deref().unwrap_or("Unknown"),
                txn.memo.as_deref().unwrap_or("N/A")
            ),
            transaction_ids: vec![txn.id.clone()],
        });
    }

    info!(count = findings.len(), "round number check complete");
    findings
}

/// Detect transactions posted on weekends.
///
/// Weekend postings can be unusual for certain businesses: after-hours
/// manual entries, backdated transactions, or automated systems worth a
/// second look. The substring before the first whitespace is parsed as a
/// strict `YYYY-MM-DD` date; anything the parser rejects is logged and
/// skipped, never surfaced as a finding or an error.
pub fn check_weekend_postings(txns: &[Txn]) -> Vec<Finding> {
    let mut findings = Vec::new();

    for txn in txns {
        if txn.date.is_empty() {
            continue;
        }

        let date_part = txn.date.split_whitespace().next().unwrap_or("");
        let parsed = match NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
            Ok(d) => d,
            Err(e) => {
                warn!(txn = %txn.id, date = %txn.date, error = %e, "failed to parse date");
                continue;
            }
        };

        let day_name = match parsed.weekday() {
            Weekday::Sat => "Saturday",
            Weekday::Sun => "Sunday",
            _ => continue,
        };

        findings.push(Finding {
            code: "WEEKEND_POST".to_string(),
            severity: Severity::Low,
            title: "Weekend Posting Detected".to_string(),
            detail: format!(
                "Transaction {} was posted on {}, {}. Amount: ${:.2}, Vendor: {}, Memo: {}",
                txn.id,
                day_name,
                txn.date,
                txn.amount,
                txn.vendor.as_deref().unwrap_or("Unknown"),
                txn.memo.as_deref().unwrap_or("N/A")
            ),
            transaction_ids: vec![txn.id.clone()],
        });
    }

    info!(count = findings.len(), "weekend posting check complete");
    findings
}

/// Run the full battery of deterministic checks.
///
/// Findings are concatenated in fixed order (duplicates, round numbers,
/// weekend postings), each rule's internal ordering preserved. No
/// cross-rule correlation or deduplication is performed; an empty result
/// means "clean", not an error.
pub fn run_all_checks(txns: &[Txn], params: &CheckParams) -> Vec<Finding> {
    let mut findings = Vec::new();
    findings.extend(check_duplicate_invoices(txns));
    findings.extend(check_round_numbers(
        txns,
        params.round_threshold,
        params.round_min_amount,
    ));
    findings.extend(check_weekend_postings(txns));

    info!(total = findings.len(), "deterministic checks complete");
    findings
}

fn fingerprint(vendor: &str, date: &str, amount: f64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}", vendor, date, amount).as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn(id: &str, amount: f64, date: &str, vendor: Option<&str>) -> Txn {
        Txn {
            id: id.to_string(),
            amount,
            date: date.to_string(),
            memo: None,
            vendor: vendor.map(|v| v.to_string()),
            account: None,
        }
    }

    #[test]
    fn test_duplicate_invoices_detected() {
        let txns = vec![
            txn("txn1", 100.0, "2024-01-15", Some("Acme Corp")),
            txn("txn2", 100.0, "2024-01-15", Some("Acme Corp")),
            txn("txn3", 200.0, "2024-01-16", Some("Beta Inc")),
        ];

        let findings = check_duplicate_invoices(&txns);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, "DUP_INVOICE");
        assert_eq!(findings[0].severity, Severity::Medium);
        assert_eq!(findings[0].transaction_ids, vec!["txn1", "txn2"]);
        assert!(findings[0].detail.contains("Acme Corp"));
        assert!(findings[0].detail.contains("$100.00"));
    }

    #[test]
    fn test_duplicate_invoices_none() {
        let txns = vec![
            txn("txn1", 100.0, "2024-01-15", Some("Acme Corp")),
            txn("txn2", 200.0, "2024-01-16", Some("Beta Inc")),
        ];
        assert!(check_duplicate_invoices(&txns).is_empty());
    }

    #[test]
    fn test_duplicate_invoices_skips_missing_fields() {
        let txns = vec![
            // No vendor: skipped even though date/amount collide.
            txn("txn1", 50.0, "2024-01-15", None),
            txn("txn2", 50.0, "2024-01-15", None),
            // Zero amount: skipped.
            txn("txn3", 0.0, "2024-01-15", Some("Acme Corp")),
            txn("txn4", 0.0, "2024-01-15", Some("Acme Corp")),
            // Empty date: skipped.
            txn("txn5", 75.0, "", Some("Acme Corp")),
            txn("txn6", 75.0, "", Some("Acme Corp")),
        ];
        assert!(check_duplicate_invoices(&txns).is_empty());
    }

    #[test]
    fn test_duplicate_groups_in_first_appearance_order() {
        let txns = vec![
            txn("a1", 10.0, "2024-02-01", Some("Alpha")),
            txn("b1", 20.0, "2024-02-02", Some("Bravo")),
            txn("a2", 10.0, "2024-02-01", Some("Alpha")),
            txn("b2", 20.0, "2024-02-02", Some("Bravo")),
        ];

        let findings = check_duplicate_invoices(&txns);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].transaction_ids, vec!["a1", "a2"]);
        assert_eq!(findings[1].transaction_ids, vec!["b1", "b2"]);
    }

    #[test]
    fn test_round_numbers_detected() {
        let txns = vec![
            txn("txn1", 1000.0, "2024-01-15", Some("Acme Corp")),
            txn("txn2", 5000.0, "2024-01-16", Some("Beta Inc")),
            txn("txn3", 1234.56, "2024-01-17", Some("Gamma LLC")),
        ];

        let findings = check_round_numbers(&txns, 100.0, 1000.0);
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.code == "ROUND_NUMBER"));
        assert!(findings.iter().all(|f| f.severity == Severity::Low));
        assert_eq!(findings[0].transaction_ids, vec!["txn1"]);
    }

    #[test]
    fn test_round_numbers_below_min_amount() {
        let txns = vec![txn("txn1", 100.0, "2024-01-15", Some("Acme Corp"))];
        assert!(check_round_numbers(&txns, 100.0, 1000.0).is_empty());
    }

    #[test]
    fn test_round_numbers_boundary_and_negative() {
        let txns = vec![
            txn("txn1", 999.0, "2024-01-15", None),
            txn("txn2", -2000.0, "2024-01-15", None),
        ];

        let findings = check_round_numbers(&txns, 100.0, 1000.0);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].transaction_ids, vec!["txn2"]);
        assert!(findings[0].detail.contains("Unknown"));
        assert!(findings[0].detail.contains("N/A"));
    }

    #[test]
    fn test_weekend_postings_detected() {
        let txns = vec![
            txn("txn1", 100.0, "2024-01-13", Some("Acme Corp")), // Saturday
            txn("txn2", 200.0, "2024-01-14", Some("Beta Inc")),  // Sunday
            txn("txn3", 300.0, "2024-01-15", Some("Gamma LLC")), // Monday
        ];

        let findings = check_weekend_postings(&txns);
        assert_eq!(findings.len(), 2);
        assert!(findings[0].detail.contains("Saturday"));
        assert!(findings[1].detail.contains("Sunday"));
    }

    #[test]
    fn test_weekend_postings_weekdays_only() {
        let txns = vec![
            txn("txn1", 100.0, "2024-01-15", Some("Acme Corp")),
            txn("txn2", 200.0, "2024-01-16", Some("Beta Inc")),
        ];
        assert!(check_weekend_postings(&txns).is_empty());
    }

    #[test]
    fn test_weekend_postings_invalid_date_skipped() {
        let txns = vec![
            txn("txn1", 100.0, "invalid-date", Some("Acme Corp")),
            // Extractor-format date: rejected by the strict ISO parser.
            txn("txn2", 100.0, "01/13/2024", Some("Acme Corp")),
        ];
        assert!(check_weekend_postings(&txns).is_empty());
    }

    #[test]
    fn test_weekend_postings_trailing_time_component() {
        let txns = vec![txn("txn1", 100.0, "2024-01-13 10:30", None)];
        let findings = check_weekend_postings(&txns);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].detail.contains("2024-01-13 10:30"));
    }

    #[test]
    fn test_run_all_checks_order_and_concatenation() {
        let txns = vec![
            txn("txn1", 1000.0, "2024-01-13", Some("Acme Corp")), // round + weekend
            txn("txn2", 1000.0, "2024-01-13", Some("Acme Corp")), // dup partner
        ];

        let findings = run_all_checks(&txns, &CheckParams::default());
        let codes: Vec<&str> = findings.iter().map(|f| f.code.as_str()).collect();
        assert_eq!(
            codes,
            vec![
                "DUP_INVOICE",
                "ROUND_NUMBER",
                "ROUND_NUMBER",
                "WEEKEND_POST",
                "WEEKEND_POST"
            ]
        );
    }

    #[test]
    fn test_run_all_checks_empty_input() {
        assert!(run_all_checks(&[], &CheckParams::default()).is_empty());
    }

    #[test]
    fn test_checks_idempotent() {
        let txns = vec![
            txn("txn1", 1000.0, "2024-01-13", Some("Acme Corp")),
            txn("txn2", 1000.0, "2024-01-13", Some("Acme Corp")),
        ];
        let params = CheckParams::default();
        assert_eq!(run_all_checks(&txns, &params), run_all_checks(&txns, &params));
    }
}
