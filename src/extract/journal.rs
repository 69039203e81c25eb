//! Journal row aggregation.

use tracing::debug;

use crate::records::{AccountMap, JournalAggregate};
use crate::scan::find_forward;

/// Positions examined per step; a number may start at either byte
pub const STRIDE: usize = 2;
/// Longest digit/period run read as a candidate account number
pub const MAX_NUMBER_LEN: usize = 16;
/// Window after the number in which the debit must start
pub const DEBIT_WINDOW: usize = 48;
/// Window after the debit in which the credit must start
pub const CREDIT_WINDOW: usize = 16;

fn is_number_byte(b: u8) -> bool {
    b.is_ascii_digit() || b == b'.'
}

/// Account number starting exactly at `start`, with the offset past it
fn number_at(buf: &[u8], start: usize) -> Option<(&str, usize)> {
    if !buf.get(start)?.is_ascii_digit() {
        return None;
    }
    if start > 0 && is_number_byte(buf[start - 1]) {
        return None;
    }

    let len = buf[start..]
        .iter()
        .take(MAX_NUMBER_LEN + 1)
        .take_while(|&&b| is_number_byte(b))
        .count();
    if len > MAX_NUMBER_LEN {
        return None;
    }

    let end = start + len;
    let number = std::str::from_utf8(&buf[start..end]).ok()?.trim_end_matches('.');
    Some((number, end))
}

/// Sum debit/credit pairs following every known account number.
///
/// Offsets past a recovered pair are not rescanned.
pub fn accumulate(buf: &[u8], known: &AccountMap) -> JournalAggregate {
    let mut aggregate = JournalAggregate::default();
    let mut pos = 0;
    let mut rows = 0usize;

    while pos < buf.len() {
        let mut next = pos + STRIDE;

        for start in [pos, pos + 1] {
            let Some((number, end)) = number_at(buf, start) else {
                continue;
            };
            if !known.contains_key(number) {
                continue;
            }
            let Some((debit_at, debit)) = find_forward(buf, end, DEBIT_WINDOW) else {
                continue;
            };
            let Some((credit_at, credit)) = find_forward(buf, debit_at + 8, CREDIT_WINDOW) else {
                continue;
            };

            aggregate.add(number, debit, credit);
            rows += 1;
            next = credit_at + 8;
            break;
        }

        pos = next;
    }

    debug!(rows, accounts = aggregate.len(), "journal aggregated");
    aggregate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::records::AccountRecord;
    use rust_decimal::Decimal;

    fn known(numbers: &[&str]) -> AccountMap {
        numbers
            .iter()
            .map(|&n| (n.to_string(), AccountRecord::new(n.into(), "x".into(), classify(n))))
            .collect()
    }

    fn row(number: &str, debit: f64, credit: f64) -> Vec<u8> {
        let mut row = vec![0u8; 6];
        row.extend_from_slice(number.as_bytes());
        row.extend_from_slice(&debit.to_le_bytes());
        row.extend_from_slice(&credit.to_le_bytes());
        row.extend_from_slice(&[0u8; 6]);
        row
    }

    #[test]
    fn sums_pairs_per_account() {
        let mut buf = row("6100", 100.0, 25.0);
        buf.push(0);
        buf.extend(row("6100", 200.0, 25.0));
        buf.extend(row("1000", 50.0, 12.5));

        let journal = accumulate(&buf, &known(&["6100", "1000"]));
        let expense = journal.get("6100").copied().unwrap_or_default();
        assert_eq!(expense.debit, Decimal::new(300, 0));
        assert_eq!(expense.credit, Decimal::new(50, 0));
        assert_eq!(journal.get("1000").map(|t| t.credit), Some(Decimal::new(125, 1)));
    }

    #[test]
    fn unknown_numbers_are_skipped() {
        let buf = row("7777", 100.0, 25.0);
        assert!(accumulate(&buf, &known(&["6100"])).is_empty());
    }

    #[test]
    fn suffix_of_longer_number_is_not_a_match() {
        // "16100" must not count toward "6100"
        let buf = row("16100", 100.0, 25.0);
        assert!(accumulate(&buf, &known(&["6100"])).is_empty());
    }

    #[test]
    fn row_without_credit_is_ignored() {
        let mut buf = vec![0u8; 4];
        buf.extend_from_slice(b"6100");
        buf.extend_from_slice(&75.5f64.to_le_bytes());
        buf.extend_from_slice(&[0u8; 40]);
        assert!(accumulate(&buf, &known(&["6100"])).is_empty());
    }
}
