//! Chart-of-accounts recovery.
//!
//! Two strategies are tried in order. The structural recognizer keys on the
//! separator that follows an account number in chart pages; the adjacency
//! fallback pairs number-shaped printable runs with the name run after them.

use rust_decimal::Decimal;
use std::ops::RangeInclusive;
use tracing::{debug, warn};

use crate::classify::classify;
use crate::records::{AccountMap, AccountRecord, BalanceSource, to_money};
use crate::scan::{
    NumericEncoding, decode_at, extract_runs, find_backward, find_forward, find_forward_confirmed,
    find_marked, is_account_number, is_plausible, is_printable, letter_count,
};

/// Bytes between an account number and its name-length byte
pub const SEPARATOR: [u8; 3] = [0x00, 0x04, 0x00];
/// Name-length byte, relative to the separator
pub const NAME_LEN_OFFSET: usize = 3;
/// Padding byte that must be zero, relative to the separator
pub const NAME_PAD_OFFSET: usize = 4;
/// First name byte, relative to the separator
pub const NAME_OFFSET: usize = 5;
pub const NAME_LEN_RANGE: RangeInclusive<usize> = 3..=60;
/// Longest digit/period run collected backward from the separator
pub const MAX_NUMBER_LEN: usize = 16;
/// Leading digits an account number must start with
pub const MIN_LEADING_DIGITS: usize = 4;

/// Byte pair preceding a chart balance
pub const BALANCE_MARKER: [u8; 2] = [0x11, 0x00];
/// How far past the name the balance marker is searched for
pub const MARKER_WINDOW: usize = 64;
/// Forward scan used when no marker is found
pub const BALANCE_SCAN_WINDOW: usize = 64;

pub const ADJACENCY_RUN_LEN: RangeInclusive<usize> = 3..=60;
/// Runs examined after a number run when looking for its name
pub const ADJACENCY_LOOKAHEAD: usize = 4;
pub const MIN_NAME_LETTERS: usize = 3;

/// Window scanned after each account-number occurrence in the balances member
pub const AUX_WINDOW: usize = 96;
/// Backward window used when nothing follows the occurrence
pub const AUX_BACKWARD_WINDOW: usize = 32;
/// Record pattern of the balances member: six 0xFF bytes, a tag, a zero byte
pub const AUX_FILL_LEN: usize = 6;
pub const AUX_TAGS: [u8; 2] = [0x11, 0x15];

/// Balances further apart than this disagree
pub const CONFLICT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// One way of recovering accounts from a chart member
pub trait AccountStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` when the strategy recovers nothing
    fn try_extract(&self, buf: &[u8]) -> Option<AccountMap>;
}

/// Separator-anchored recognizer
#[derive(Debug, Default, Clone, Copy)]
pub struct Structural;

impl Structural {
    /// Digits and periods immediately before `sep`, at most [`MAX_NUMBER_LEN`]
    fn number_before(buf: &[u8], sep: usize) -> Option<String> {
        let start = (sep.saturating_sub(MAX_NUMBER_LEN)..sep)
            .rev()
            .take_while(|&i| buf[i].is_ascii_digit() || buf[i] == b'.')
            .last()?;

        let number = std::str::from_utf8(&buf[start..sep]).ok()?.trim_end_matches('.');
        let leading = number.bytes().take_while(u8::is_ascii_digit).count();
        (leading >= MIN_LEADING_DIGITS).then(|| number.to_string())
    }

    /// Name bytes after the separator, cut at the first NUL
    fn name_after(buf: &[u8], sep: usize) -> Option<(String, usize)> {
        let len = *buf.get(sep + NAME_LEN_OFFSET)? as usize;
        if !NAME_LEN_RANGE.contains(&len) || *buf.get(sep + NAME_PAD_OFFSET)? != 0 {
            return None;
        }

        let start = sep + NAME_OFFSET;
        let field = buf.get(start..start + len)?;
        let text_len = field.iter().position(|&b| b == 0).unwrap_or(len);
        let text = &field[..text_len];
        if text.is_empty() || !text.iter().all(|&b| is_printable(b)) {
            return None;
        }

        let name = String::from_utf8_lossy(text).trim().to_string();
        (!name.is_empty()).then_some((name, start + len))
    }

    /// Value after the balance marker, or a forward scan when there is none
    fn balance_after(buf: &[u8], name_end: usize) -> Option<f64> {
        find_marked(buf, name_end, MARKER_WINDOW, &BALANCE_MARKER)
            .or_else(|| find_forward_confirmed(buf, name_end, BALANCE_SCAN_WINDOW))
            .map(|(_, v)| v)
    }
}

impl AccountStrategy for Structural {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn try_extract(&self, buf: &[u8]) -> Option<AccountMap> {
        let mut accounts = AccountMap::new();

        for (sep, window) in buf.windows(SEPARATOR.len()).enumerate() {
            if window != SEPARATOR {
                continue;
            }
            let Some(number) = Self::number_before(buf, sep) else {
                continue;
            };
            if accounts.contains_key(&number) {
                continue;
            }
            let Some((name, name_end)) = Self::name_after(buf, sep) else {
                continue;
            };

            let mut account = AccountRecord::new(number.clone(), name, classify(&number));
            if let Some(value) = Self::balance_after(buf, name_end) {
                account.set_balance(value, BalanceSource::Chart);
            }
            debug!(
                number = %account.number,
                name = %account.name,
                balance = %account.balance,
                "structural match"
            );
            accounts.insert(number, account);
        }

        (!accounts.is_empty()).then_some(accounts)
    }
}

/// Number run followed by a name run
#[derive(Debug, Default, Clone, Copy)]
pub struct Adjacency;

impl AccountStrategy for Adjacency {
    fn name(&self) -> &'static str {
        "adjacency"
    }

    fn try_extract(&self, buf: &[u8]) -> Option<AccountMap> {
        let runs = extract_runs(buf, *ADJACENCY_RUN_LEN.start(), *ADJACENCY_RUN_LEN.end());
        let mut accounts = AccountMap::new();

        for (i, run) in runs.iter().enumerate() {
            let number = run.trimmed();
            if !is_account_number(number) || accounts.contains_key(number) {
                continue;
            }

            let name_run = runs
                .iter()
                .skip(i + 1)
                .take(ADJACENCY_LOOKAHEAD)
                .take_while(|next| !is_account_number(next.trimmed()))
                .find(|next| letter_count(next.trimmed()) >= MIN_NAME_LETTERS);
            let Some(name_run) = name_run else {
                continue;
            };

            let name = name_run.trimmed().to_string();
            let mut account = AccountRecord::new(number.to_string(), name, classify(number));
            let balance = find_forward_confirmed(buf, name_run.end(), BALANCE_SCAN_WINDOW);
            if let Some((_, value)) = balance {
                account.set_balance(value, BalanceSource::Chart);
            }
            debug!(number = %account.number, name = %account.name, "adjacency match");
            accounts.insert(account.number.clone(), account);
        }

        (!accounts.is_empty()).then_some(accounts)
    }
}

/// Strategies in the order they are tried
pub fn default_strategies() -> Vec<Box<dyn AccountStrategy>> {
    vec![Box::new(Structural), Box::new(Adjacency)]
}

/// Accounts recovered from the chart, and the strategy that produced them
#[derive(Debug, Default)]
pub struct ChartOutcome {
    pub accounts: AccountMap,
    pub strategy: Option<&'static str>,
}

/// Run `strategies` in order.
///
/// The first one yielding at least `min_yield` accounts wins. Otherwise the
/// largest yield wins, the earlier strategy on ties.
pub fn run_strategies(
    buf: &[u8],
    strategies: &[Box<dyn AccountStrategy>],
    min_yield: usize,
) -> ChartOutcome {
    let mut best: Option<(&'static str, AccountMap)> = None;

    for strategy in strategies {
        let Some(accounts) = strategy.try_extract(buf) else {
            debug!(strategy = strategy.name(), "no accounts");
            continue;
        };
        debug!(strategy = strategy.name(), accounts = accounts.len(), "strategy yield");

        if accounts.len() >= min_yield {
            return ChartOutcome {
                accounts,
                strategy: Some(strategy.name()),
            };
        }
        if best.as_ref().is_none_or(|(_, b)| accounts.len() > b.len()) {
            best = Some((strategy.name(), accounts));
        }
    }

    best.map(|(name, accounts)| ChartOutcome {
        accounts,
        strategy: Some(name),
    })
    .unwrap_or_default()
}

/// Outcome of merging the balances member into the chart
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AuxMerge {
    pub assigned: usize,
    pub conflicts: usize,
}

/// Offsets of `needle` in `haystack` not adjacent to other digits or periods
fn bounded_occurrences<'a>(
    haystack: &'a [u8],
    needle: &'a [u8],
) -> impl Iterator<Item = usize> + 'a {
    let is_numeric = |b: u8| b.is_ascii_digit() || b == b'.';
    haystack
        .windows(needle.len().max(1))
        .enumerate()
        .filter(move |(_, w)| *w == needle)
        .map(|(i, _)| i)
        .filter(move |&i| {
            let before = i.checked_sub(1).map(|j| haystack[j]);
            let after = haystack.get(i + needle.len()).copied();
            !before.is_some_and(is_numeric) && !after.is_some_and(is_numeric)
        })
}

/// Value following the balances-member record pattern inside the window
fn tagged_value(buf: &[u8], start: usize) -> Option<f64> {
    let end = start.saturating_add(AUX_WINDOW).min(buf.len());
    let pattern_len = AUX_FILL_LEN + 2;

    (start..end).find_map(|i| {
        let head = buf.get(i..i + pattern_len)?;
        let matched = head[..AUX_FILL_LEN].iter().all(|&b| b == 0xFF)
            && AUX_TAGS.contains(&head[AUX_FILL_LEN])
            && head[AUX_FILL_LEN + 1] == 0;
        if !matched {
            return None;
        }
        decode_at(buf, i + pattern_len, NumericEncoding::Float64)
            .filter(|&v| is_plausible(v, NumericEncoding::Float64))
    })
}

fn auxiliary_value(aux: &[u8], number: &str) -> Option<f64> {
    bounded_occurrences(aux, number.as_bytes()).find_map(|pos| {
        let end = pos + number.len();
        tagged_value(aux, end)
            .or_else(|| find_forward(aux, end, AUX_WINDOW).map(|(_, v)| v))
            .or_else(|| find_backward(aux, pos, AUX_BACKWARD_WINDOW).map(|(_, v)| v))
    })
}

/// Fill zero balances from the balances member.
///
/// A non-zero chart balance is never replaced; when the balances member
/// disagrees with it the disagreement is counted and logged.
pub fn merge_auxiliary(accounts: &mut AccountMap, aux: &[u8]) -> AuxMerge {
    let mut merge = AuxMerge::default();

    for account in accounts.values_mut() {
        let Some(value) = auxiliary_value(aux, &account.number) else {
            continue;
        };

        if account.balance.is_zero() {
            account.set_balance(value, BalanceSource::Auxiliary);
            if account.balance_source.is_some() {
                merge.assigned += 1;
            }
        } else if (to_money(value) - account.balance).abs() > CONFLICT_TOLERANCE {
            merge.conflicts += 1;
            warn!(
                number = %account.number,
                kept = %account.balance,
                auxiliary = %to_money(value),
                "balance conflict between chart and balances member"
            );
        }
    }

    merge
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::AccountType;

    fn f64_bytes(value: f64) -> [u8; 8] {
        value.to_le_bytes()
    }

    /// number, separator, length, pad, name, marker, balance
    fn chart_record(number: &str, name: &str, balance: f64) -> Vec<u8> {
        let mut rec = vec![0u8; 4];
        rec.extend_from_slice(number.as_bytes());
        rec.extend_from_slice(&SEPARATOR);
        rec.push(name.len() as u8);
        rec.push(0);
        rec.extend_from_slice(name.as_bytes());
        rec.extend_from_slice(&[0u8; 6]);
        rec.extend_from_slice(&BALANCE_MARKER);
        rec.extend_from_slice(&f64_bytes(balance));
        rec.extend_from_slice(&[0u8; 8]);
        rec
    }

    #[test]
    fn structural_cash_with_marker() {
        let mut buf = vec![0u8; 3];
        buf.extend_from_slice(b"1000\x00\x04\x00\x04\x00Cash\x11\x00");
        buf.extend_from_slice(&f64_bytes(5000.0));

        let accounts = Structural.try_extract(&buf).expect("accounts");
        let cash = &accounts["1000"];
        assert_eq!(cash.name, "Cash");
        assert_eq!(cash.account_type, AccountType::Asset);
        assert_eq!(cash.balance, Decimal::new(5000, 0));
        assert_eq!(cash.balance_source, Some(BalanceSource::Chart));
    }

    #[test]
    fn first_structural_match_wins() {
        let mut buf = chart_record("1000", "Cash", 100.0);
        buf.extend(chart_record("1000", "Petty Cash", 200.0));
        buf.extend(chart_record("2000", "Payables", 75.5));

        let accounts = Structural.try_extract(&buf).expect("accounts");
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts["1000"].name, "Cash");
        assert_eq!(accounts["1000"].balance, Decimal::new(100, 0));
    }

    #[test]
    fn rejects_bad_length_and_short_numbers() {
        // Length byte out of range
        let mut buf = b"\x001000\x00\x04\x00\x02\x00Ca".to_vec();
        // Only three digits before the separator
        buf.extend_from_slice(b"\x00\x00100\x00\x04\x00\x04\x00Cash");
        // Non-zero padding byte
        buf.extend_from_slice(b"\x00\x001100\x00\x04\x00\x04\x07Bank");
        assert!(Structural.try_extract(&buf).is_none());
    }

    #[test]
    fn name_stops_at_nul() {
        let buf = b"\x0010200.05\x00\x04\x00\x0a\x00Bank\x00\x00\x00\x00\x00\x00".to_vec();
        let accounts = Structural.try_extract(&buf).expect("accounts");
        assert_eq!(accounts["10200.05"].name, "Bank");
        assert!(accounts["10200.05"].balance.is_zero());
    }

    #[test]
    fn adjacency_pairs_number_with_name() {
        let mut buf = vec![0u8; 8];
        buf.extend_from_slice(b"2010");
        buf.extend_from_slice(&[0u8; 5]);
        buf.extend_from_slice(b"Accounts Payable");
        buf.extend_from_slice(&[0u8; 8]);

        assert!(Structural.try_extract(&buf).is_none());
        let outcome = run_strategies(&buf, &default_strategies(), 3);
        assert_eq!(outcome.strategy, Some("adjacency"));

        let payable = &outcome.accounts["2010"];
        assert_eq!(payable.name, "Accounts Payable");
        assert_eq!(payable.account_type, AccountType::Liability);
    }

    #[test]
    fn adjacency_does_not_cross_next_number() {
        let buf = b"\x004000\x00\x005000\x00Cost of Sales\x00".to_vec();
        let accounts = Adjacency.try_extract(&buf).expect("accounts");
        assert!(!accounts.contains_key("4000"));
        assert_eq!(accounts["5000"].name, "Cost of Sales");
    }

    #[test]
    fn structural_wins_ties() {
        let buf = chart_record("1000", "Cash", 50.0);
        let outcome = run_strategies(&buf, &default_strategies(), 3);
        assert_eq!(outcome.strategy, Some("structural"));
        assert_eq!(outcome.accounts.len(), 1);
    }

    #[test]
    fn empty_chart_yields_nothing() {
        let outcome = run_strategies(&[0u8; 256], &default_strategies(), 3);
        assert!(outcome.accounts.is_empty());
        assert_eq!(outcome.strategy, None);
    }

    fn known(numbers: &[(&str, f64)]) -> AccountMap {
        numbers
            .iter()
            .map(|&(n, balance)| {
                let mut account = AccountRecord::new(n.into(), format!("Account {n}"), classify(n));
                account.set_balance(balance, BalanceSource::Chart);
                (n.to_string(), account)
            })
            .collect()
    }

    #[test]
    fn auxiliary_fills_zero_balances_only() {
        let mut aux = vec![0u8; 4];
        aux.extend_from_slice(b"1200");
        aux.extend_from_slice(&[0u8; 10]);
        aux.extend_from_slice(&[0xFF; 6]);
        aux.extend_from_slice(&[0x11, 0x00]);
        aux.extend_from_slice(&f64_bytes(1500.0));
        aux.extend_from_slice(&[0u8; 4]);
        aux.extend_from_slice(b"1000");
        aux.extend_from_slice(&[0u8; 4]);
        aux.extend_from_slice(&f64_bytes(75.5));

        let mut accounts = known(&[("1000", 50.0), ("1200", 0.0)]);
        let merge = merge_auxiliary(&mut accounts, &aux);

        assert_eq!(merge, AuxMerge { assigned: 1, conflicts: 1 });
        assert_eq!(accounts["1200"].balance, Decimal::new(1500, 0));
        assert_eq!(accounts["1200"].balance_source, Some(BalanceSource::Auxiliary));
        assert_eq!(accounts["1000"].balance, Decimal::new(50, 0));
        assert_eq!(accounts["1000"].balance_source, Some(BalanceSource::Chart));
    }

    #[test]
    fn auxiliary_ignores_longer_numbers() {
        let mut aux = b"\x0010000\x00\x00".to_vec();
        aux.extend_from_slice(&f64_bytes(12.5));

        let mut accounts = known(&[("1000", 0.0)]);
        assert_eq!(merge_auxiliary(&mut accounts, &aux), AuxMerge::default());
        assert!(accounts["1000"].balance.is_zero());
    }

    #[test]
    fn auxiliary_backward_fallback() {
        let mut aux = vec![0u8; 2];
        aux.extend_from_slice(&f64_bytes(7.25));
        aux.extend_from_slice(&[0u8; 2]);
        aux.extend_from_slice(b"5100");

        let mut accounts = known(&[("5100", 0.0)]);
        merge_auxiliary(&mut accounts, &aux);
        assert_eq!(accounts["5100"].balance, Decimal::new(725, 2));
    }
}
