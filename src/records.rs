//! Record types shared by the import and export directions.

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::container::Role;

/// Round a decoded float to cents. Non-finite input becomes zero.
pub fn to_money(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .unwrap_or_default()
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Round a decoded float to four decimals, the precision of quantities.
pub fn to_quantity(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .unwrap_or_default()
        .round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

/// Five-way account taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    pub const ALL: [AccountType; 5] = [
        AccountType::Asset,
        AccountType::Liability,
        AccountType::Equity,
        AccountType::Revenue,
        AccountType::Expense,
    ];

    /// One-byte code used in exported account records
    pub fn code(self) -> u8 {
        match self {
            AccountType::Asset => 1,
            AccountType::Liability => 2,
            AccountType::Equity => 3,
            AccountType::Revenue => 4,
            AccountType::Expense => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Debit-normal accounts grow with debits
    pub fn is_debit_normal(self) -> bool {
        matches!(self, AccountType::Asset | AccountType::Expense)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccountType::Asset => "ASSET",
            AccountType::Liability => "LIABILITY",
            AccountType::Equity => "EQUITY",
            AccountType::Revenue => "REVENUE",
            AccountType::Expense => "EXPENSE",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a recovered balance came from, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceSource {
    /// Decoded from the chart member itself
    Chart,
    /// Found next to the account number in the balances member
    Auxiliary,
    /// Derived from accumulated journal debits and credits
    Journal,
}

impl BalanceSource {
    pub fn as_str(self) -> &'static str {
        match self {
            BalanceSource::Chart => "chart",
            BalanceSource::Auxiliary => "auxiliary",
            BalanceSource::Journal => "journal",
        }
    }
}

impl fmt::Display for BalanceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub number: String,
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    #[serde(default)]
    pub balance: Decimal,
    #[serde(default)]
    pub balance_source: Option<BalanceSource>,
    #[serde(default)]
    pub debit_total: Decimal,
    #[serde(default)]
    pub credit_total: Decimal,
}

impl AccountRecord {
    pub fn new(number: String, name: String, account_type: AccountType) -> Self {
        Self {
            number,
            name,
            account_type,
            balance: Decimal::ZERO,
            balance_source: None,
            debit_total: Decimal::ZERO,
            credit_total: Decimal::ZERO,
        }
    }

    /// Set a balance from a decoded float, tagging where it came from.
    /// A balance that rounds to zero carries no provenance.
    pub fn set_balance(&mut self, value: f64, source: BalanceSource) {
        self.balance = to_money(value);
        self.balance_source = (!self.balance.is_zero()).then_some(source);
    }
}

/// Accounts keyed by number; one entry per number
pub type AccountMap = BTreeMap<String, AccountRecord>;

/// Customer, vendor or employee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub unit_price: Decimal,
    #[serde(default)]
    pub cost_price: Decimal,
    #[serde(default)]
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct JournalTotals {
    pub debit: Decimal,
    pub credit: Decimal,
}

/// Debit and credit totals per account number, accumulated from the journal
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JournalAggregate {
    totals: BTreeMap<String, JournalTotals>,
}

impl JournalAggregate {
    /// Add one debit/credit pair. Signs are dropped; totals never go negative.
    pub fn add(&mut self, number: &str, debit: f64, credit: f64) {
        let totals = self.totals.entry(number.to_string()).or_default();
        totals.debit += to_money(debit.abs());
        totals.credit += to_money(credit.abs());
    }

    pub fn get(&self, number: &str) -> Option<&JournalTotals> {
        self.totals.get(number)
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}

/// Company name recovered from the company member
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyInfo {
    pub name: Option<String>,
    pub member: String,
}

/// One resolved archive member
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberInfo {
    pub role: Role,
    pub name: String,
    pub size: usize,
    /// Record count from the member's File Control Record, if it has one
    pub declared_records: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportStats {
    pub accounts: usize,
    pub customers: usize,
    pub vendors: usize,
    pub employees: usize,
    pub inventory: usize,
    pub journal_accounts: usize,
    pub balance_totals: BTreeMap<AccountType, Decimal>,
    pub reconciliation_conflicts: usize,
    pub members: Vec<MemberInfo>,
}

impl Default for ImportStats {
    fn default() -> Self {
        Self {
            accounts: 0,
            customers: 0,
            vendors: 0,
            employees: 0,
            inventory: 0,
            journal_accounts: 0,
            balance_totals: AccountType::ALL
                .into_iter()
                .map(|t| (t, Decimal::ZERO))
                .collect(),
            reconciliation_conflicts: 0,
            members: Vec::new(),
        }
    }
}

/// Everything recovered from one backup archive
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportResult {
    pub success: bool,
    pub accounts: Vec<AccountRecord>,
    pub customers: Vec<PartyRecord>,
    pub vendors: Vec<PartyRecord>,
    pub employees: Vec<PartyRecord>,
    pub inventory: Vec<InventoryRecord>,
    pub company: Option<CompanyInfo>,
    pub stats: ImportStats,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ImportResult {
    /// A failed pass: no records, one error
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            ..Self::default()
        }
    }

    pub fn has_records(&self) -> bool {
        !(self.accounts.is_empty()
            && self.customers.is_empty()
            && self.vendors.is_empty()
            && self.employees.is_empty()
            && self.inventory.is_empty())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
