//! Balance reconciliation against journal totals.
//!
//! Precedence is chart, then balances member, then journal: a journal-derived
//! balance only fills an account that is still zero.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::extract::accounts::CONFLICT_TOLERANCE;
use crate::records::{AccountMap, AccountType, BalanceSource, JournalAggregate};

/// Balance implied by journal totals for an account of `account_type`
pub fn derived_balance(account_type: AccountType, debit: Decimal, credit: Decimal) -> Decimal {
    if account_type.is_debit_normal() {
        debit - credit
    } else {
        credit - debit
    }
}

/// Attach journal totals and fill zero balances. Returns the number of
/// accounts whose existing balance disagrees with the journal.
pub fn reconcile(accounts: &mut AccountMap, journal: &JournalAggregate) -> usize {
    let mut conflicts = 0;

    for account in accounts.values_mut() {
        let Some(totals) = journal.get(&account.number) else {
            continue;
        };
        account.debit_total = totals.debit;
        account.credit_total = totals.credit;

        let derived = derived_balance(account.account_type, totals.debit, totals.credit);
        if account.balance.is_zero() {
            if !derived.is_zero() {
                account.balance = derived;
                account.balance_source = Some(BalanceSource::Journal);
                debug!(number = %account.number, balance = %derived, "balance from journal");
            }
        } else if (account.balance - derived).abs() > CONFLICT_TOLERANCE {
            conflicts += 1;
            warn!(
                number = %account.number,
                kept = %account.balance,
                source = ?account.balance_source,
                journal = %derived,
                "balance conflict with journal"
            );
        }
    }

    conflicts
}
