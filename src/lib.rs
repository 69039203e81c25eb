//! # ptbkit
//!
//! Reads and writes the ZIP-based backup archives of a closed-format desktop
//! accounting product, without its database engine.
//!
//! The archive members are fixed-page binary files with no published layout.
//! Records are recovered with byte-pattern heuristics: a separator-anchored
//! chart recognizer with a printable-run fallback, a monetary plausibility
//! filter over several numeric encodings, and balance reconciliation across
//! the chart, the balances member and the journal. The encoder writes the
//! same heuristics' layout back out, so exports re-import losslessly.
//!
//! ## Features
//!
//! - Role-based member resolution (chart, customers, vendors, employees,
//!   inventory, journal, company)
//! - Chart-of-accounts recovery with balance provenance
//! - Journal aggregation and reconciliation
//! - Deterministic export back into an archive
//!
//! ## Example
//!
//! ```no_run
//! use ptbkit::{ImportConfig, Importer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bytes = std::fs::read("backup.ptb")?;
//!     let result = Importer::new(ImportConfig::default()).extract(bytes).await;
//!
//!     for account in &result.accounts {
//!         println!("{} {} {}", account.number, account.name, account.balance);
//!     }
//!     for warning in &result.warnings {
//!         eprintln!("warning: {warning}");
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod cli;
pub mod config;
pub mod container;
pub mod encode;
pub mod error;
pub mod extract;
pub mod io;
pub mod records;
pub mod scan;
pub mod zip;

pub use classify::classify;
pub use cli::Cli;
pub use config::ImportConfig;
pub use container::{Container, RawMember, Role};
pub use encode::{ExportSnapshot, encode};
pub use error::{ConfigError, ContainerError, MissingMember};
pub use extract::Importer;
pub use io::{LocalFileReader, MemoryReader, ReadAt};
pub use records::{
    AccountRecord, AccountType, BalanceSource, ImportResult, InventoryRecord, PartyRecord,
};
