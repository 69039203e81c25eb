//! Deterministic ZIP archive writer.
//!
//! Builds the whole archive in memory: local headers and data first, then
//! the Central Directory and the End of Central Directory record. No
//! timestamps, extra fields or comments are written, so identical input
//! always produces identical bytes.

use flate2::Crc;
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::Write;

use anyhow::{Result, bail};

use super::structures::{CompressionMethod, EndOfCentralDirectory, ZipFileEntry};

/// In-memory ZIP archive builder
pub struct ZipWriter {
    buf: Vec<u8>,
    entries: Vec<ZipFileEntry>,
}

impl ZipWriter {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Add a member without compression
    pub fn add_stored(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.add(name, data, CompressionMethod::Stored)
    }

    /// Add a member compressed with raw DEFLATE
    pub fn add_deflated(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.add(name, data, CompressionMethod::Deflate)
    }

    fn add(&mut self, name: &str, data: &[u8], method: CompressionMethod) -> Result<()> {
        if name.is_empty() || name.len() > u16::MAX as usize {
            bail!("Invalid member name length: {}", name.len());
        }
        if self.entries.iter().any(|e| e.file_name == name) {
            bail!("Duplicate member name: {}", name);
        }
        // Without ZIP64 support every offset and size must fit in 32 bits
        if data.len() as u64 >= u32::MAX as u64 || self.buf.len() as u64 >= u32::MAX as u64 {
            bail!("Archive too large for member {}", name);
        }

        let mut crc = Crc::new();
        crc.update(data);

        let payload = match method {
            CompressionMethod::Stored => data.to_vec(),
            CompressionMethod::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()?
            }
            CompressionMethod::Unknown(v) => bail!("Cannot write compression method {}", v),
        };

        let entry = ZipFileEntry {
            file_name: name.to_string(),
            compression_method: method,
            compressed_size: payload.len() as u64,
            uncompressed_size: data.len() as u64,
            crc32: crc.sum(),
            lfh_offset: self.buf.len() as u64,
            is_directory: name.ends_with('/'),
        };

        entry.write_local_header(&mut self.buf)?;
        self.buf.extend_from_slice(&payload);
        self.entries.push(entry);
        Ok(())
    }

    /// Write the Central Directory and return the finished archive
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if self.entries.len() >= u16::MAX as usize {
            bail!("Too many members: {}", self.entries.len());
        }

        let cd_offset = self.buf.len();
        for entry in &self.entries {
            entry.write_central_header(&mut self.buf)?;
        }
        let cd_size = self.buf.len() - cd_offset;

        let eocd = EndOfCentralDirectory {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: self.entries.len() as u16,
            total_entries: self.entries.len() as u16,
            cd_size: cd_size as u32,
            cd_offset: cd_offset as u32,
            comment_len: 0,
        };
        eocd.write_to(&mut self.buf)?;

        Ok(self.buf)
    }
}

impl Default for ZipWriter {
    fn default() -> Self {
        Self::new()
    }
}
