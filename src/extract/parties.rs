//! Customer, vendor, employee, inventory and company recovery.
//!
//! These members have no separator to anchor on, so records are located by
//! filtering printable runs down to things that look like names. An
//! identifier-shaped run just before a name becomes its id.

use std::collections::HashSet;
use std::ops::RangeInclusive;
use tracing::debug;

use crate::container::Role;
use crate::records::{InventoryRecord, PartyRecord, to_money, to_quantity};
use crate::scan::{
    ExtractedRun, NumericEncoding, decode_at, extract_runs, find_forward, find_forward_confirmed,
    find_marked, repeated_at,
};

/// Run lengths collected before filtering; ids can be as short as two bytes
pub const RUN_LEN: RangeInclusive<usize> = 2..=60;
pub const NAME_LEN: RangeInclusive<usize> = 4..=50;
pub const ID_LEN: RangeInclusive<usize> = 2..=20;
/// Largest gap between an id run and the name it labels
pub const ID_GAP: usize = 32;
/// Derived ids are cut to this many characters
pub const MAX_DERIVED_ID: usize = 20;
/// All-uppercase runs up to this length may lack vowels
pub const MAX_ACRONYM_LEN: usize = 5;

/// Window after a name in which its first amount must start
pub const AMOUNT_WINDOW: usize = 48;
/// Byte pair preceding an item's unit price
pub const PRICE_MARKER: [u8; 2] = [0x13, 0x00];
/// Cost price follows the unit price (and its copy) at this distance
pub const COST_OFFSET: usize = 16;
/// Quantity follows the unit price at this distance
pub const QUANTITY_OFFSET: usize = 32;
/// Window for the fallback cost scan, starting at the cost field
pub const COST_SCAN_WINDOW: usize = 24;

/// Tokens that mark structural or duplicate records, never names
pub const DENY_TOKENS: [&str; 8] = [
    "AirborneQ", "DupF", "Fv1b", "QC7P", "THx", "A1Ww", "ArvB", "DIXT",
];
/// File-name fragments, matched case-insensitively
pub const EXTENSION_FRAGMENTS: [&str; 4] = [".dat", ".ptb", ".rpt", ".ddf"];

/// Headings that appear in entity members but are not records
pub fn entity_keywords(role: Role) -> &'static [&'static str] {
    match role {
        Role::Customers => &["Customer", "Customers"],
        Role::Vendors => &["Vendor", "Vendors", "Payment", "Employee"],
        Role::Employees => &["Employee", "Employees", "Payroll"],
        Role::Inventory => &["Item", "Items", "Inventory"],
        _ => &[],
    }
}

fn is_id_charset(text: &str) -> bool {
    text.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// `[A-Za-z0-9_-]{2,20}`
pub fn is_identifier(text: &str) -> bool {
    ID_LEN.contains(&text.len()) && is_id_charset(text)
}

fn is_acronym(text: &str) -> bool {
    text.len() <= MAX_ACRONYM_LEN && text.bytes().all(|b| b.is_ascii_uppercase())
}

/// Name filter shared by every run-based extractor
pub fn is_name(text: &str, keywords: &[&str]) -> bool {
    let text = text.trim();
    if !NAME_LEN.contains(&text.len()) {
        return false;
    }
    if !text.as_bytes()[0].is_ascii_uppercase() {
        return false;
    }
    if DENY_TOKENS.iter().any(|t| text.contains(t)) {
        return false;
    }
    let lower = text.to_ascii_lowercase();
    if EXTENSION_FRAGMENTS.iter().any(|f| lower.contains(f)) {
        return false;
    }
    if keywords.iter().any(|k| k.eq_ignore_ascii_case(text)) {
        return false;
    }
    // Codes such as "C0042" or "WID-001"
    if is_id_charset(text) && text.bytes().any(|b| b.is_ascii_digit()) {
        return false;
    }

    lower.bytes().any(|b| b"aeiou".contains(&b)) || is_acronym(text)
}

/// Uppercase alphanumerics of the name
pub fn derive_id(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .take(MAX_DERIVED_ID)
        .collect()
}

/// A name run with the id that labels it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedRun {
    pub id: String,
    pub name: String,
    /// Offset one past the name run
    pub end: usize,
}

/// Filter, pair and dedupe the runs of `buf`, keeping at most `cap`.
pub fn named_runs(buf: &[u8], keywords: &[&str], cap: usize) -> Vec<NamedRun> {
    let runs = extract_runs(buf, *RUN_LEN.start(), *RUN_LEN.end());
    let mut seen = HashSet::new();
    let mut named = Vec::new();
    let mut i = 0;

    let paired_name = |id_run: &ExtractedRun, next: Option<&ExtractedRun>| {
        next.filter(|_| is_identifier(id_run.trimmed()))
            .filter(|n| n.offset - id_run.end() <= ID_GAP)
            .filter(|n| is_name(n.trimmed(), keywords))
            .cloned()
    };

    while i < runs.len() && named.len() < cap {
        let run = &runs[i];
        let (id, name_run) = match paired_name(run, runs.get(i + 1)) {
            Some(name_run) => {
                i += 2;
                (run.trimmed().to_string(), name_run)
            }
            None => {
                i += 1;
                if !is_name(run.trimmed(), keywords) {
                    continue;
                }
                (derive_id(run.trimmed()), run.clone())
            }
        };

        let name = name_run.trimmed().to_string();
        if !seen.insert(name.to_ascii_lowercase()) {
            continue;
        }
        named.push(NamedRun {
            id,
            name,
            end: name_run.end(),
        });
    }

    named
}

/// Customers, vendors or employees
pub fn extract_parties(buf: &[u8], role: Role, cap: usize) -> Vec<PartyRecord> {
    let parties: Vec<_> = named_runs(buf, entity_keywords(role), cap)
        .into_iter()
        .map(|run| PartyRecord {
            balance: find_forward_confirmed(buf, run.end, AMOUNT_WINDOW)
                .map(|(_, v)| to_money(v))
                .unwrap_or_default(),
            id: run.id,
            name: run.name,
        })
        .collect();

    debug!(%role, records = parties.len(), "parties extracted");
    parties
}

pub fn extract_inventory(buf: &[u8], cap: usize) -> Vec<InventoryRecord> {
    let items: Vec<_> = named_runs(buf, entity_keywords(Role::Inventory), cap)
        .into_iter()
        .map(|run| {
            let mut item = InventoryRecord {
                code: run.id,
                name: run.name,
                unit_price: Default::default(),
                cost_price: Default::default(),
                quantity: Default::default(),
            };

            // A marked unit price is taken as is, zero included
            let unit = find_marked(buf, run.end, AMOUNT_WINDOW, &PRICE_MARKER)
                .or_else(|| find_forward_confirmed(buf, run.end, AMOUNT_WINDOW));
            let Some((unit_at, unit)) = unit else {
                return item;
            };
            item.unit_price = to_money(unit);

            let cost_at = unit_at + COST_OFFSET;
            let cost = repeated_at(buf, cost_at)
                .or_else(|| find_forward(buf, cost_at, COST_SCAN_WINDOW).map(|(_, v)| v));
            item.cost_price = cost.map(to_money).unwrap_or_default();

            item.quantity = decode_at(buf, unit_at + QUANTITY_OFFSET, NumericEncoding::Int32Basis)
                .map(to_quantity)
                .unwrap_or_default();
            item
        })
        .collect();

    debug!(records = items.len(), "inventory extracted");
    items
}

/// First run in the company member that reads as a name
pub fn extract_company_name(buf: &[u8]) -> Option<String> {
    extract_runs(buf, *NAME_LEN.start(), *RUN_LEN.end())
        .into_iter()
        .map(|run| run.trimmed().to_string())
        .find(|text| is_name(text, &[]))
}
