//! Fixed record layouts written by the encoder.
//!
//! Offsets mirror what the extractors look for, so an exported member reads
//! back through the same heuristics as a real one.

use byteorder::{ByteOrder, LittleEndian};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::container::FileControlRecord;
use crate::extract::accounts::{BALANCE_MARKER, SEPARATOR};
use crate::extract::parties::{PRICE_MARKER, derive_id};
use crate::records::{AccountRecord, InventoryRecord, PartyRecord};

pub const HEADER_SIZE: usize = 4096;
pub const RECORD_SIZE: usize = 128;
pub const MAGIC: [u8; 4] = [0x89, b'L', b'B', b'K'];
pub const TYPE_CODE_OFFSET: usize = 4;
pub const RECORD_SIZE_OFFSET: usize = 8;
pub const KEY_COUNT: u16 = 1;

pub const ACCOUNT_NUMBER_LEN: usize = 16;
pub const ACCOUNT_SEPARATOR_AT: usize = 16;
pub const ACCOUNT_NAME_LEN_AT: usize = 19;
pub const ACCOUNT_NAME_AT: usize = 21;
pub const ACCOUNT_NAME_LEN: usize = 40;
/// Shortest length byte the chart recognizer accepts
pub const ACCOUNT_MIN_NAME_FIELD: usize = 3;
pub const ACCOUNT_TYPE_AT: usize = 64;
pub const ACCOUNT_MARKER_AT: usize = 78;
pub const ACCOUNT_BALANCE_AT: [usize; 3] = [80, 96, 112];

pub const ID_AT: usize = 0;
pub const ID_LEN: usize = 20;
pub const NAME_AT: usize = 24;
pub const NAME_LEN: usize = 40;
pub const PARTY_BALANCE_AT: [usize; 2] = [64, 72];

pub const PRICE_MARKER_AT: usize = 70;
pub const UNIT_PRICE_AT: [usize; 2] = [72, 80];
pub const COST_PRICE_AT: [usize; 2] = [88, 96];
pub const QUANTITY_AT: usize = 104;
pub const QUANTITY_SCALE: f64 = 10_000.0;

/// Type code stored in each member header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Accounts = 1,
    Customers = 2,
    Vendors = 3,
    Employees = 4,
    Inventory = 5,
    Company = 6,
}

/// Zeroed member with its header filled in and room for `count` records
pub fn member_buffer(kind: MemberKind, count: usize) -> Vec<u8> {
    let mut buf = vec![0u8; HEADER_SIZE + count * RECORD_SIZE];
    buf[..MAGIC.len()].copy_from_slice(&MAGIC);
    LittleEndian::write_u16(&mut buf[TYPE_CODE_OFFSET..], kind as u16);
    LittleEndian::write_u32(&mut buf[RECORD_SIZE_OFFSET..], RECORD_SIZE as u32);
    LittleEndian::write_u16(&mut buf[FileControlRecord::KEY_COUNT_OFFSET..], KEY_COUNT);
    LittleEndian::write_u32(
        &mut buf[FileControlRecord::RECORD_COUNT_OFFSET..],
        u32::try_from(count).unwrap_or(u32::MAX),
    );
    buf
}

/// Mutable slice of record `index`
pub fn record_mut(buf: &mut [u8], index: usize) -> &mut [u8] {
    let start = HEADER_SIZE + index * RECORD_SIZE;
    &mut buf[start..start + RECORD_SIZE]
}

/// Printable ASCII only, other characters become `?`, cut to `width`
pub fn ascii_field(text: &str, width: usize) -> Vec<u8> {
    text.trim()
        .chars()
        .map(|c| if c == ' ' || c.is_ascii_graphic() { c as u8 } else { b'?' })
        .take(width)
        .collect()
}

fn identifier_field(id: &str, name: &str) -> Vec<u8> {
    let id: String = id
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '-' })
        .collect();
    let id = if id.is_empty() { derive_id(name) } else { id };
    ascii_field(&id, ID_LEN)
}

fn put(rec: &mut [u8], at: usize, bytes: &[u8]) {
    rec[at..at + bytes.len()].copy_from_slice(bytes);
}

fn put_money(rec: &mut [u8], offsets: &[usize], value: Decimal) {
    let value = value.to_f64().unwrap_or_default();
    for &at in offsets {
        LittleEndian::write_f64(&mut rec[at..], value);
    }
}

/// Number right-aligned against the separator, then length-prefixed name.
/// An empty name is replaced by the number so the record stays readable.
pub fn write_account(rec: &mut [u8], account: &AccountRecord) {
    let number = ascii_field(&account.number, ACCOUNT_NUMBER_LEN);
    put(rec, ACCOUNT_NUMBER_LEN - number.len(), &number);
    put(rec, ACCOUNT_SEPARATOR_AT, &SEPARATOR);

    let mut name = ascii_field(&account.name, ACCOUNT_NAME_LEN);
    if name.is_empty() {
        name = number.clone();
    }
    rec[ACCOUNT_NAME_LEN_AT] = name.len().max(ACCOUNT_MIN_NAME_FIELD) as u8;
    put(rec, ACCOUNT_NAME_AT, &name);

    rec[ACCOUNT_TYPE_AT] = account.account_type.code();
    put(rec, ACCOUNT_MARKER_AT, &BALANCE_MARKER);
    put_money(rec, &ACCOUNT_BALANCE_AT, account.balance);
}

pub fn write_party(rec: &mut [u8], party: &PartyRecord) {
    put(rec, ID_AT, &identifier_field(&party.id, &party.name));
    put(rec, NAME_AT, &ascii_field(&party.name, NAME_LEN));
    put_money(rec, &PARTY_BALANCE_AT, party.balance);
}

pub fn write_item(rec: &mut [u8], item: &InventoryRecord) {
    put(rec, ID_AT, &identifier_field(&item.code, &item.name));
    put(rec, NAME_AT, &ascii_field(&item.name, NAME_LEN));
    put(rec, PRICE_MARKER_AT, &PRICE_MARKER);
    put_money(rec, &UNIT_PRICE_AT, item.unit_price);
    put_money(rec, &COST_PRICE_AT, item.cost_price);

    let quantity = (item.quantity.to_f64().unwrap_or_default() * QUANTITY_SCALE).round();
    let quantity = quantity.clamp(i32::MIN as f64, i32::MAX as f64) as i32;
    LittleEndian::write_i32(&mut rec[QUANTITY_AT..], quantity);
}

pub fn write_company(rec: &mut [u8], name: &str) {
    put(rec, NAME_AT, &ascii_field(name, NAME_LEN));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::AccountType;

    #[test]
    fn header_is_a_control_record() {
        let buf = member_buffer(MemberKind::Vendors, 3);
        assert_eq!(buf.len(), HEADER_SIZE + 3 * RECORD_SIZE);
        assert_eq!(&buf[..4], &MAGIC);
        assert_eq!(LittleEndian::read_u16(&buf[TYPE_CODE_OFFSET..]), 3);

        let fcr = FileControlRecord::parse(&buf).unwrap();
        assert_eq!(fcr.record_count, 3);
        assert_eq!(fcr.key_count, KEY_COUNT);
    }

    #[test]
    fn fields_are_sanitized_and_cut() {
        assert_eq!(ascii_field("Café Noir", 40), b"Caf? Noir");
        assert_eq!(ascii_field("  padded  ", 40), b"padded");
        assert_eq!(ascii_field("abcdef", 4), b"abcd");
        assert_eq!(identifier_field("C 01", "x"), b"C-01");
        assert_eq!(identifier_field("", "Acme Corp"), b"ACMECORP");
    }

    #[test]
    fn account_layout() {
        let mut rec = vec![0u8; RECORD_SIZE];
        let mut account = AccountRecord::new("1000".into(), "AR".into(), AccountType::Asset);
        account.balance = Decimal::new(12345, 2);
        write_account(&mut rec, &account);

        assert_eq!(&rec[12..16], b"1000");
        assert_eq!(&rec[16..19], &SEPARATOR);
        // Short names keep the minimum length byte and are NUL-terminated
        assert_eq!(rec[ACCOUNT_NAME_LEN_AT], 3);
        assert_eq!(&rec[21..24], b"AR\0");
        assert_eq!(rec[ACCOUNT_TYPE_AT], 1);
        for at in ACCOUNT_BALANCE_AT {
            assert_eq!(LittleEndian::read_f64(&rec[at..]), 123.45);
        }
    }

    #[test]
    fn item_layout() {
        let mut rec = vec![0u8; RECORD_SIZE];
        let item = InventoryRecord {
            code: "W1".into(),
            name: "Widget".into(),
            unit_price: Decimal::ZERO,
            cost_price: Decimal::ZERO,
            quantity: Decimal::new(25, 1),
        };
        write_item(&mut rec, &item);
        assert_eq!(&rec[PRICE_MARKER_AT..PRICE_MARKER_AT + 2], &PRICE_MARKER);
        assert_eq!(LittleEndian::read_i32(&rec[QUANTITY_AT..]), 25_000);
    }
}
