//! Account number to account type mapping.

use crate::records::AccountType;

/// Classify an account by the first four digits of its number.
///
/// Separators (`.`, `-`, spaces) are ignored. Numbers with fewer than four
/// digits, or below 1000, fall back to [`AccountType::Asset`].
pub fn classify(account_number: &str) -> AccountType {
    let digits: String = account_number
        .chars()
        .filter(|c| c.is_ascii_digit())
        .take(4)
        .collect();

    if digits.len() < 4 {
        return AccountType::Asset;
    }

    match digits.parse::<u32>() {
        Ok(1000..=1999) => AccountType::Asset,
        Ok(2000..=2999) => AccountType::Liability,
        Ok(3000..=3999) => AccountType::Equity,
        Ok(4000..=4999) => AccountType::Revenue,
        Ok(5000..) => AccountType::Expense,
        _ => AccountType::Asset,
    }
}
