//! Pattern-based transaction extraction.
//!
//! Scans raw document text (the output of LLM text extraction) for
//! date-then-amount patterns and turns each match into a [`Txn`]. This is
//! deliberately simple: a single forward regex scan, no locale handling,
//! no vendor/memo inference.
//!
//! The scan is capped at [`MAX_MATCHES`] raw pattern matches so that
//! adversarial or garbled input cannot blow up downstream rule cost.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::models::Txn;

/// Maximum number of raw pattern matches examined per run. Matches past
/// this cap are silently discarded; candidates within the cap that fail
/// to parse are dropped without replacement.
pub const MAX_MATCHES: usize = 100;

/// A date token (`D{1,2}[-/]D{1,2}[-/]D{2,4}`), then non-greedily across
/// arbitrary intervening characters on the same line, an amount token
/// with optional currency symbol, comma group separators, and exactly
/// two decimal digits.
static TXN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2}[-/]\d{1,2}[-/]\d{2,4}).*?\$?([\d,]+\.\d{2})")
        .expect("transaction pattern is valid")
});

/// Extract transaction records from free-form text.
///
/// Matches are collected left-to-right, non-overlapping, first occurrence
/// first. The date string is kept verbatim (month/day vs day/month is not
/// disambiguated). Amounts have group separators stripped and are parsed
/// as `f64`; a candidate whose amount fails to parse is skipped.
///
/// Ids are `txn_<n>` where `n` is the zero-based index among successfully
/// parsed records. `vendor`, `memo`, and `account` are never populated by
/// this extractor.
///
/// Absence of matches is not an error; it simply yields an empty vector.
pub fn extract_transactions(text: &str) -> Vec<Txn> {
    let mut txns = Vec::new();

    for caps in TXN_PATTERN.captures_iter(text).take(MAX_MATCHES) {
        let date = &caps[1];
        let raw_amount = &caps[2];

        // The pattern should guarantee a parseable number once separators
        // are stripped, but check anyway rather than defaulting to zero.
        let amount: f64 = match raw_amount.replace(',', "").parse() {
            Ok(a) => a,
            Err(_) => continue,
        };

        txns.push(Txn {
            id: format!("txn_{}", txns.len()),
            amount,
            date: date.to_string(),
            memo: None,
            vendor: None,
            account: None,
        });
    }

    debug!(count = txns.len(), "extracted transactions from text");
    txns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_extraction() {
        let txns = extract_transactions("01-15-2024 paid $1,000.00 to vendor");
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].id, "txn_0");
        assert_eq!(txns[0].amount, 1000.0);
        assert_eq!(txns[0].date, "01-15-2024");
        assert_eq!(txns[0].vendor, None);
        assert_eq!(txns[0].memo, None);
        assert_eq!(txns[0].account, None);
    }

    #[test]
    fn test_slash_dates_and_no_currency_symbol() {
        let txns = extract_transactions("invoice 01/15/2024 total 250.50 net 30");
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].date, "01/15/2024");
        assert_eq!(txns[0].amount, 250.5);
    }

    #[test]
    fn test_empty_text() {
        assert!(extract_transactions("").is_empty());
    }

    #[test]
    fn test_no_matches() {
        assert!(extract_transactions("no transactions in this paragraph").is_empty());
    }

    #[test]
    fn test_amount_requires_two_decimals() {
        // "12.5" has one decimal digit and must not match on its own.
        assert!(extract_transactions("01/02/2024 subtotal 12.5").is_empty());
    }

    #[test]
    fn test_matches_ordered_left_to_right() {
        let text = "01/01/2024 paid $10.00 then 02/02/2024 paid $20.00";
        let txns = extract_transactions(text);
        assert_eq!(txns.len(), 2);
        assert_eq!(txns[0].id, "txn_0");
        assert_eq!(txns[0].amount, 10.0);
        assert_eq!(txns[1].id, "txn_1");
        assert_eq!(txns[1].amount, 20.0);
    }

    #[test]
    fn test_cap_at_one_hundred_matches() {
        let text = (0..150)
            .map(|i| format!("01/15/2024 line item {} $1,234.56\n", i))
            .collect::<String>();
        let txns = extract_transactions(&text);
        assert_eq!(txns.len(), MAX_MATCHES);
        assert_eq!(txns[0].id, "txn_0");
        assert_eq!(txns[99].id, "txn_99");
    }

    #[test]
    fn test_comma_separators_stripped() {
        let txns = extract_transactions("12/31/2023 wire $1,234,567.89 sent");
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].amount, 1_234_567.89);
    }

    #[test]
    fn test_idempotent() {
        let text = "03/04/2024 charge $55.00 and 05/06/2024 refund $44.00";
        assert_eq!(extract_transactions(text), extract_transactions(text));
    }
}
