//! Export: canonical records back into a backup archive.
//!
//! Encoding is a total, deterministic function of the snapshot. Every
//! collection gets its own member, written even when empty, plus an
//! `EXPORT.TXT` summary.

pub mod layout;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, info};

use crate::container::{self, Role};
use crate::error::ContainerError;
use crate::records::{AccountRecord, InventoryRecord, PartyRecord};
use layout::MemberKind;

/// Plain-text member describing the export
pub const METADATA_MEMBER: &str = "EXPORT.TXT";
pub const FORMAT_VERSION: u32 = 1;

/// Records to export, as supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSnapshot {
    pub accounts: Vec<AccountRecord>,
    pub customers: Vec<PartyRecord>,
    pub vendors: Vec<PartyRecord>,
    pub employees: Vec<PartyRecord>,
    pub inventory: Vec<InventoryRecord>,
    pub company_name: Option<String>,
}

impl ExportSnapshot {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid snapshot: {}", path.display()))
    }
}

fn member<T>(kind: MemberKind, records: &[T], write: impl Fn(&mut [u8], &T)) -> Vec<u8> {
    let mut buf = layout::member_buffer(kind, records.len());
    for (i, record) in records.iter().enumerate() {
        write(layout::record_mut(&mut buf, i), record);
    }
    buf
}

fn metadata(snapshot: &ExportSnapshot, members: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut text = String::new();
    let _ = writeln!(text, "format=ptbkit");
    let _ = writeln!(text, "version={FORMAT_VERSION}");
    if let Some(name) = &snapshot.company_name {
        let name = layout::ascii_field(name, layout::NAME_LEN);
        let name = String::from_utf8_lossy(&name);
        let _ = writeln!(text, "company={name}");
    }
    for (name, bytes) in members {
        let records = bytes.len().saturating_sub(layout::HEADER_SIZE) / layout::RECORD_SIZE;
        let _ = writeln!(text, "{name}={records}");
    }
    text.into_bytes()
}

/// Every member of the export, in archive order
pub fn encode_members(snapshot: &ExportSnapshot) -> Vec<(String, Vec<u8>)> {
    let mut members = vec![
        (
            Role::Accounts.export_name().to_string(),
            member(MemberKind::Accounts, &snapshot.accounts, layout::write_account),
        ),
        (
            Role::Customers.export_name().to_string(),
            member(MemberKind::Customers, &snapshot.customers, layout::write_party),
        ),
        (
            Role::Vendors.export_name().to_string(),
            member(MemberKind::Vendors, &snapshot.vendors, layout::write_party),
        ),
        (
            Role::Employees.export_name().to_string(),
            member(MemberKind::Employees, &snapshot.employees, layout::write_party),
        ),
        (
            Role::Inventory.export_name().to_string(),
            member(MemberKind::Inventory, &snapshot.inventory, layout::write_item),
        ),
    ];

    if let Some(name) = &snapshot.company_name {
        let mut buf = layout::member_buffer(MemberKind::Company, 1);
        layout::write_company(layout::record_mut(&mut buf, 0), name);
        members.push((Role::Company.export_name().to_string(), buf));
    }

    for (name, bytes) in &members {
        debug!(member = %name, size = bytes.len(), "member encoded");
    }

    let summary = metadata(snapshot, &members);
    members.push((METADATA_MEMBER.to_string(), summary));
    members
}

/// Encode a snapshot into archive bytes
pub fn encode(snapshot: &ExportSnapshot) -> Result<Vec<u8>, ContainerError> {
    let members = encode_members(snapshot);
    let bytes = container::write(&members)?;
    info!(
        accounts = snapshot.accounts.len(),
        customers = snapshot.customers.len(),
        vendors = snapshot.vendors.len(),
        employees = snapshot.employees.len(),
        inventory = snapshot.inventory.len(),
        size = bytes.len(),
        "archive encoded"
    );
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::extract::Importer;
    use crate::records::BalanceSource;
    use rust_decimal::Decimal;

    fn account(number: &str, name: &str, balance: Decimal) -> AccountRecord {
        let mut account = AccountRecord::new(number.into(), name.into(), classify(number));
        account.balance = balance;
        account
    }

    fn party(id: &str, name: &str, balance: Decimal) -> PartyRecord {
        PartyRecord {
            id: id.into(),
            name: name.into(),
            balance,
        }
    }

    fn snapshot() -> ExportSnapshot {
        ExportSnapshot {
            accounts: vec![
                account("1000", "Cash", Decimal::new(5000, 0)),
                account("1200", "Accounts Receivable", Decimal::new(123456, 2)),
                account("2000", "Accounts Payable", Decimal::new(-25075, 2)),
                account("4000", "Sales", Decimal::ZERO),
                account("6100", "Travel Expenses", Decimal::new(1024, 0)),
                account("10200.05", "AR", Decimal::new(755, 1)),
                account(
                    "5000",
                    "Cost of Goods Sold - Imported Hardware and Spare Parts",
                    Decimal::new(99, 2),
                ),
            ],
            customers: vec![
                party("C001", "Acme Corp", Decimal::new(1500, 0)),
                party("C002", "Globex Industries", Decimal::ZERO),
            ],
            vendors: vec![party("V-100", "Northwind Traders", Decimal::new(1999, 2))],
            employees: vec![party("E01", "Jane Doe", Decimal::ZERO)],
            inventory: vec![
                InventoryRecord {
                    code: "WID-001".into(),
                    name: "Blue Widget".into(),
                    unit_price: Decimal::new(725, 2),
                    cost_price: Decimal::new(35, 1),
                    quantity: Decimal::new(125, 1),
                },
                InventoryRecord {
                    code: "GAD-002".into(),
                    name: "Gadget Deluxe".into(),
                    unit_price: Decimal::new(1999, 2),
                    cost_price: Decimal::new(11, 0),
                    quantity: Decimal::new(3, 0),
                },
                InventoryRecord {
                    code: "BLT-003".into(),
                    name: "Anchor Bolts".into(),
                    unit_price: Decimal::new(45, 2),
                    cost_price: Decimal::ZERO,
                    quantity: Decimal::new(200, 0),
                },
                InventoryRecord {
                    code: "SMP-004".into(),
                    name: "Sample Kit".into(),
                    unit_price: Decimal::ZERO,
                    cost_price: Decimal::new(35, 1),
                    quantity: Decimal::new(3, 0),
                },
            ],
            company_name: Some("Bellwether Books Ltd".into()),
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let snapshot = snapshot();
        assert_eq!(encode(&snapshot).unwrap(), encode(&snapshot).unwrap());
    }

    #[test]
    fn metadata_lists_members() {
        let members = encode_members(&snapshot());
        let (name, text) = members.last().unwrap();
        assert_eq!(name, METADATA_MEMBER);

        let text = String::from_utf8(text.clone()).unwrap();
        assert!(text.contains("CHART.DAT=7\n"));
        assert!(text.contains("COMPANY.DAT=1\n"));
        assert!(text.contains("company=Bellwether Books Ltd\n"));
    }

    #[tokio::test]
    async fn accounts_round_trip() {
        let snapshot = snapshot();
        let result = Importer::default().extract(encode(&snapshot).unwrap()).await;
        assert!(result.success);
        assert_eq!(result.accounts.len(), snapshot.accounts.len());

        for original in &snapshot.accounts {
            let decoded = result
                .accounts
                .iter()
                .find(|a| a.number == original.number)
                .unwrap_or_else(|| panic!("account {} missing", original.number));
            let expected_name: String =
                original.name.chars().take(layout::ACCOUNT_NAME_LEN).collect();
            assert_eq!(decoded.name, expected_name.trim());
            assert!((decoded.balance - original.balance).abs() <= Decimal::new(1, 2));
            assert_eq!(decoded.account_type, original.account_type);
        }

        let sales = result.accounts.iter().find(|a| a.number == "4000").unwrap();
        assert_eq!(sales.balance_source, None);
        let cash = result.accounts.iter().find(|a| a.number == "1000").unwrap();
        assert_eq!(cash.balance_source, Some(BalanceSource::Chart));
    }

    #[tokio::test]
    async fn parties_inventory_and_company_round_trip() {
        let snapshot = snapshot();
        let result = Importer::default().extract(encode(&snapshot).unwrap()).await;

        assert_eq!(result.customers, snapshot.customers);
        assert_eq!(result.vendors, snapshot.vendors);
        assert_eq!(result.employees, snapshot.employees);
        assert_eq!(result.inventory, snapshot.inventory);
        assert_eq!(
            result.company.and_then(|c| c.name).as_deref(),
            Some("Bellwether Books Ltd")
        );
        assert!(result.warnings.iter().all(|w| !w.contains("VENDOR.DAT")));
    }

    #[tokio::test]
    async fn empty_snapshot_encodes_headers_only() {
        let bytes = encode(&ExportSnapshot::default()).unwrap();
        let result = Importer::default().extract(bytes).await;
        assert!(!result.success);
        assert_eq!(result.stats.members.len(), 5);
        assert!(result.stats.members.iter().all(|m| m.declared_records == Some(0)));
    }
}
