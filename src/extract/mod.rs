//! Import pipeline.
//!
//! Members are read once, then every entity is recovered on its own blocking
//! task. Chart, balances and journal share one task because reconciliation
//! needs all three. Nothing here returns an error: failures become warnings
//! on the [`ImportResult`], and only an unreadable archive fails the pass.

pub mod accounts;
pub mod journal;
pub mod parties;
pub mod reconcile;

pub use accounts::{AccountStrategy, Adjacency, Structural, default_strategies, run_strategies};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ImportConfig;
use crate::container::{Container, RawMember, Role};
use crate::error::MissingMember;
use crate::io::ReadAt;
use crate::records::{AccountMap, CompanyInfo, ImportResult, MemberInfo};

/// Error recorded when the archive opened but yielded nothing
pub const NO_RECORDS: &str = "no records recovered";

/// Chart, balances and journal, reconciled
#[derive(Debug, Default)]
struct Ledger {
    accounts: AccountMap,
    strategy: Option<&'static str>,
    journal_accounts: usize,
    conflicts: usize,
}

fn recover_ledger(
    chart: &[u8],
    aux: Option<&[u8]>,
    journal: Option<&[u8]>,
    min_yield: usize,
) -> Ledger {
    let outcome = run_strategies(chart, &default_strategies(), min_yield);
    let mut ledger = Ledger {
        accounts: outcome.accounts,
        strategy: outcome.strategy,
        ..Ledger::default()
    };

    if let Some(aux) = aux {
        let merge = accounts::merge_auxiliary(&mut ledger.accounts, aux);
        debug!(assigned = merge.assigned, conflicts = merge.conflicts, "balances member merged");
        ledger.conflicts += merge.conflicts;
    }

    if let Some(journal) = journal {
        let aggregate = journal::accumulate(journal, &ledger.accounts);
        ledger.journal_accounts = aggregate.len();
        ledger.conflicts += reconcile::reconcile(&mut ledger.accounts, &aggregate);
    }

    ledger
}

/// Wait for an entity task, turning a panic or an expired deadline into a
/// warning. An abandoned task keeps running detached; its output is dropped.
async fn join_entity<T>(
    role: Role,
    handle: JoinHandle<T>,
    deadline: Option<Instant>,
    warnings: &mut Vec<String>,
) -> Option<T> {
    let joined = match deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                let message = format!("{role} extraction timed out");
                warn!(%role, "{message}");
                warnings.push(message);
                return None;
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(value) => Some(value),
        Err(e) => {
            let message = format!("{role} extraction failed: {e}");
            warn!(%role, "{message}");
            warnings.push(message);
            None
        }
    }
}

/// Recovers records from backup archives
#[derive(Debug, Clone, Default)]
pub struct Importer {
    config: Arc<ImportConfig>,
}

impl Importer {
    pub fn new(config: ImportConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Recover everything from an archive held in memory
    pub async fn extract(&self, bytes: Vec<u8>) -> ImportResult {
        match Container::from_bytes(bytes).await {
            Ok(container) => self.extract_container(&container).await,
            Err(e) => {
                warn!(error = %e, "archive rejected");
                ImportResult::failed(e.to_string())
            }
        }
    }

    /// Recover everything from an archive on disk
    pub async fn extract_file(&self, path: &Path) -> ImportResult {
        match Container::open_file(path).await {
            Ok(container) => self.extract_container(&container).await,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "archive rejected");
                ImportResult::failed(e.to_string())
            }
        }
    }

    /// Read every role's member once. Missing members become warnings,
    /// except the optional balances member.
    async fn load_members<R: ReadAt>(
        &self,
        container: &Container<R>,
        result: &mut ImportResult,
    ) -> HashMap<Role, RawMember> {
        let mut members: HashMap<Role, RawMember> = HashMap::new();

        if let Some(dir) = &self.config.dump_dir
            && let Err(e) = tokio::fs::create_dir_all(dir).await
        {
            let message = format!("cannot create dump directory {}: {e}", dir.display());
            warn!("{message}");
            result.warnings.push(message);
        }

        for role in Role::ALL {
            let member = match container.read_role(role, self.config.max_member_bytes).await {
                Ok(member) => member,
                Err(e) if role == Role::AccountBalances && e.is::<MissingMember>() => {
                    debug!("no balances member");
                    continue;
                }
                Err(e) => {
                    let message = format!("{e:#}");
                    warn!(%role, "{message}");
                    result.warnings.push(message);
                    continue;
                }
            };

            // The chart can resolve to the balances member itself
            if role == Role::AccountBalances
                && members
                    .get(&Role::Accounts)
                    .is_some_and(|chart| chart.name == member.name)
            {
                debug!(member = %member.name, "chart already read from balances member");
                continue;
            }

            if let (Some(limit), Some(size)) =
                (self.config.max_member_bytes, container.member_size(&member.name))
                && size > limit
            {
                let message = format!("{} truncated from {size} to {limit} bytes", member.name);
                warn!(%role, "{message}");
                result.warnings.push(message);
            }

            if let Some(dir) = &self.config.dump_dir
                && let Err(e) = container.dump_member(&member.name, dir).await
            {
                let message = format!("cannot dump {}: {e:#}", member.name);
                warn!("{message}");
                result.warnings.push(message);
            }

            let info = MemberInfo {
                role,
                name: member.name.clone(),
                size: member.bytes.len(),
                declared_records: member.control_record().map(|fcr| fcr.record_count),
            };
            debug!(
                %role,
                member = %info.name,
                size = info.size,
                declared = ?info.declared_records,
                "member read"
            );
            result.stats.members.push(info);
            members.insert(role, member);
        }

        members
    }

    /// Recover everything from an opened archive
    pub async fn extract_container<R: ReadAt>(&self, container: &Container<R>) -> ImportResult {
        let mut result = ImportResult::default();
        let mut members = self.load_members(container, &mut result).await;

        let cap = self.config.max_records;
        let min_yield = self.config.min_account_yield;
        let deadline = self.config.entity_timeout().map(|d| Instant::now() + d);

        let chart = members.remove(&Role::Accounts);
        let aux = members.remove(&Role::AccountBalances);
        let journal = members.remove(&Role::Journal);
        if chart.is_none() && journal.is_some() {
            let message = "journal ignored: no chart of accounts to match against".to_string();
            warn!("{message}");
            result.warnings.push(message);
        }

        let ledger = chart.map(|chart| {
            tokio::task::spawn_blocking(move || {
                recover_ledger(
                    &chart.bytes,
                    aux.as_ref().map(|m| m.bytes.as_slice()),
                    journal.as_ref().map(|m| m.bytes.as_slice()),
                    min_yield,
                )
            })
        });

        let spawn_parties = |member: Option<RawMember>, role: Role| {
            member.map(|m| {
                tokio::task::spawn_blocking(move || parties::extract_parties(&m.bytes, role, cap))
            })
        };
        let customers = spawn_parties(members.remove(&Role::Customers), Role::Customers);
        let vendors = spawn_parties(members.remove(&Role::Vendors), Role::Vendors);
        let employees = spawn_parties(members.remove(&Role::Employees), Role::Employees);

        let inventory = members.remove(&Role::Inventory).map(|m| {
            tokio::task::spawn_blocking(move || parties::extract_inventory(&m.bytes, cap))
        });
        let company = members.remove(&Role::Company).map(|m| {
            tokio::task::spawn_blocking(move || CompanyInfo {
                name: parties::extract_company_name(&m.bytes),
                member: m.name,
            })
        });

        let warnings = &mut result.warnings;
        if let Some(handle) = ledger
            && let Some(ledger) = join_entity(Role::Accounts, handle, deadline, warnings).await
        {
            info!(
                accounts = ledger.accounts.len(),
                strategy = ledger.strategy.unwrap_or("none"),
                journal_accounts = ledger.journal_accounts,
                conflicts = ledger.conflicts,
                "chart of accounts recovered"
            );
            result.stats.journal_accounts = ledger.journal_accounts;
            result.stats.reconciliation_conflicts = ledger.conflicts;
            result.accounts = ledger.accounts.into_values().collect();
        }

        for (role, handle, slot) in [
            (Role::Customers, customers, &mut result.customers),
            (Role::Vendors, vendors, &mut result.vendors),
            (Role::Employees, employees, &mut result.employees),
        ] {
            if let Some(handle) = handle
                && let Some(records) = join_entity(role, handle, deadline, warnings).await
            {
                info!(%role, records = records.len(), "parties recovered");
                *slot = records;
            }
        }

        if let Some(handle) = inventory
            && let Some(items) = join_entity(Role::Inventory, handle, deadline, warnings).await
        {
            info!(records = items.len(), "inventory recovered");
            result.inventory = items;
        }

        if let Some(handle) = company
            && let Some(info) = join_entity(Role::Company, handle, deadline, warnings).await
        {
            if info.name.is_none() {
                let message = format!("{} has no readable company name", info.member);
                warn!("{message}");
                warnings.push(message);
            }
            result.company = Some(info);
        }

        self.finish(result)
    }

    fn finish(&self, mut result: ImportResult) -> ImportResult {
        let stats = &mut result.stats;
        stats.accounts = result.accounts.len();
        stats.customers = result.customers.len();
        stats.vendors = result.vendors.len();
        stats.employees = result.employees.len();
        stats.inventory = result.inventory.len();
        for account in &result.accounts {
            *stats.balance_totals.entry(account.account_type).or_default() += account.balance;
        }

        if self.config.trace_records {
            for account in &result.accounts {
                debug!(
                    number = %account.number,
                    name = %account.name,
                    balance = %account.balance,
                    source = ?account.balance_source,
                    "account"
                );
            }
            for party in result.customers.iter().chain(&result.vendors).chain(&result.employees) {
                debug!(id = %party.id, name = %party.name, balance = %party.balance, "party");
            }
            for item in &result.inventory {
                debug!(
                    code = %item.code,
                    name = %item.name,
                    unit = %item.unit_price,
                    cost = %item.cost_price,
                    qty = %item.quantity,
                    "item"
                );
            }
        }

        result.success = result.has_records();
        if !result.success {
            result.errors.push(NO_RECORDS.to_string());
        }
        info!(
            success = result.success,
            accounts = result.stats.accounts,
            customers = result.stats.customers,
            vendors = result.stats.vendors,
            employees = result.stats.employees,
            inventory = result.stats.inventory,
            warnings = result.warnings.len(),
            "import finished"
        );
        result
    }
}
