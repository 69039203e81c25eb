//! Backup archive container.
//!
//! Opens the ZIP-compatible archive, lists its members and maps logical
//! roles ("chart of accounts", "customers", ...) to physical member names.

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ContainerError, MissingMember};
use crate::io::{LocalFileReader, MemoryReader, ReadAt};
use crate::zip::{ZipExtractor, ZipFileEntry, ZipWriter};
use anyhow::Result;

/// Extension every data member is expected to carry
pub const DATA_EXTENSION: &str = ".DAT";

/// Logical role of an archive member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Accounts,
    AccountBalances,
    Customers,
    Vendors,
    Employees,
    Inventory,
    Journal,
    Company,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::Accounts,
        Role::AccountBalances,
        Role::Customers,
        Role::Vendors,
        Role::Employees,
        Role::Inventory,
        Role::Journal,
        Role::Company,
    ];

    /// Member names to look for, highest priority first
    pub fn candidates(self) -> &'static [&'static str] {
        match self {
            Role::Accounts => &["CHART.DAT", "CHARTAR.DAT"],
            Role::AccountBalances => &["CHARTAR.DAT"],
            Role::Customers => &["CUSTOMER.DAT", "CUST.DAT"],
            Role::Vendors => &["VENDOR.DAT"],
            Role::Employees => &["EMPLOYEE.DAT", "EMP.DAT"],
            Role::Inventory => &["LINEITEM.DAT", "INVENTORY.DAT", "ITEM.DAT"],
            Role::Journal => &["JRNLROW.DAT"],
            Role::Company => &["COMPANY.DAT", "CMPY.DAT"],
        }
    }

    /// Member name used when writing this role
    pub fn export_name(self) -> &'static str {
        self.candidates()[0]
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Accounts => "chart of accounts",
            Role::AccountBalances => "account balances",
            Role::Customers => "customers",
            Role::Vendors => "vendors",
            Role::Employees => "employees",
            Role::Inventory => "inventory",
            Role::Journal => "journal",
            Role::Company => "company",
        };
        f.write_str(name)
    }
}

/// File Control Record fields found at the start of a data member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileControlRecord {
    pub signature: [u8; 2],
    pub key_count: u16,
    pub record_count: u32,
}

impl FileControlRecord {
    pub const KEY_COUNT_OFFSET: usize = 0x14;
    pub const RECORD_COUNT_OFFSET: usize = 0x1C;
    pub const MIN_SIZE: usize = 0x20;

    /// `None` for members too short to carry a control record
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < Self::MIN_SIZE {
            return None;
        }
        Some(Self {
            signature: [data[0], data[1]],
            key_count: LittleEndian::read_u16(&data[Self::KEY_COUNT_OFFSET..]),
            record_count: LittleEndian::read_u32(&data[Self::RECORD_COUNT_OFFSET..]),
        })
    }
}

/// One member read from the archive. Never modified after reading.
#[derive(Debug, Clone)]
pub struct RawMember {
    pub role: Role,
    pub name: String,
    pub bytes: Vec<u8>,
}

impl RawMember {
    pub fn control_record(&self) -> Option<FileControlRecord> {
        FileControlRecord::parse(&self.bytes)
    }
}

/// An opened backup archive
pub struct Container<R: ReadAt> {
    extractor: ZipExtractor<R>,
    members: Vec<ZipFileEntry>,
}

impl Container<MemoryReader> {
    /// Open an archive held in memory
    pub async fn from_bytes(bytes: Vec<u8>) -> Result<Self, ContainerError> {
        Self::open(Arc::new(MemoryReader::new(bytes))).await
    }
}

impl Container<LocalFileReader> {
    /// Open an archive on disk
    pub async fn open_file(path: &Path) -> Result<Self, ContainerError> {
        let reader = LocalFileReader::new(path)
            .map_err(|e| ContainerError::InvalidArchive(format!("{e:#}")))?;
        Self::open(Arc::new(reader)).await
    }
}

impl<R: ReadAt> Container<R> {
    /// Parse the archive directory. Directory entries are not members.
    pub async fn open(reader: Arc<R>) -> Result<Self, ContainerError> {
        let extractor = ZipExtractor::new(reader);
        let members: Vec<_> = extractor
            .list_files()
            .await
            .map_err(|e| ContainerError::InvalidArchive(format!("{e:#}")))?
            .into_iter()
            .filter(|entry| !entry.is_directory)
            .collect();

        if members.is_empty() {
            return Err(ContainerError::Empty);
        }

        debug!(members = members.len(), "opened backup archive");
        Ok(Self { extractor, members })
    }

    /// Physical member names in archive order
    pub fn list_members(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.file_name.as_str()).collect()
    }

    pub fn entries(&self) -> &[ZipFileEntry] {
        &self.members
    }

    /// Resolve candidate names to a member.
    ///
    /// Case-insensitive substring match. A member that contains a candidate
    /// and ends with [`DATA_EXTENSION`] is preferred over one that only
    /// contains it; within each pass candidates are tried in order.
    pub fn resolve(&self, candidates: &[&str]) -> Option<&str> {
        let names: Vec<String> = self
            .members
            .iter()
            .map(|m| m.file_name.to_ascii_uppercase())
            .collect();

        let find = |require_extension: bool| {
            candidates.iter().find_map(|candidate| {
                let candidate = candidate.to_ascii_uppercase();
                names.iter().position(|name| {
                    name.contains(&candidate)
                        && (!require_extension || name.ends_with(DATA_EXTENSION))
                })
            })
        };

        find(true)
            .or_else(|| find(false))
            .map(|i| self.members[i].file_name.as_str())
    }

    /// Uncompressed size recorded in the directory
    pub fn member_size(&self, name: &str) -> Option<u64> {
        self.entry(name).ok().map(|m| m.uncompressed_size)
    }

    pub fn resolve_role(&self, role: Role) -> Result<&str, MissingMember> {
        self.resolve(role.candidates())
            .ok_or_else(|| MissingMember::new(role))
    }

    fn entry(&self, name: &str) -> Result<&ZipFileEntry> {
        self.members
            .iter()
            .find(|m| m.file_name == name)
            .ok_or_else(|| anyhow::anyhow!("No member named {}", name))
    }

    /// Read a member's bytes, keeping at most `limit` of them
    pub async fn read_member(&self, name: &str, limit: Option<u64>) -> Result<Vec<u8>> {
        let entry = self.entry(name)?;
        self.extractor.extract_to_memory(entry, limit).await
    }

    /// Resolve and read the member for `role`
    pub async fn read_role(&self, role: Role, limit: Option<u64>) -> Result<RawMember> {
        let name = self.resolve_role(role)?.to_string();
        let bytes = self.read_member(&name, limit).await?;
        Ok(RawMember { role, name, bytes })
    }

    /// Write a member's raw bytes under `dir`
    pub async fn dump_member(&self, name: &str, dir: &Path) -> Result<()> {
        let entry = self.entry(name)?;
        // Member names may carry directories; only the base name is used
        let base = Path::new(name)
            .file_name()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| name.into());
        self.extractor.extract_to_file(entry, &dir.join(base)).await
    }
}

/// Package members into a new archive. Members are deflated except the
/// plain-text ones, which stay readable with any viewer.
pub fn write(members: &[(String, Vec<u8>)]) -> Result<Vec<u8>, ContainerError> {
    let build = || -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new();
        for (name, data) in members {
            if name.to_ascii_uppercase().ends_with(".TXT") {
                writer.add_stored(name, data)?;
            } else {
                writer.add_deflated(name, data)?;
            }
        }
        writer.finish()
    };

    build().map_err(|e| ContainerError::Write(format!("{e:#}")))
}
