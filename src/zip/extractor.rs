use flate2::Crc;
use flate2::read::DeflateDecoder;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::io::ReadAt;
use anyhow::{Context, Result, bail};

use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipFileEntry};

/// Reads member data out of a ZIP archive
pub struct ZipExtractor<R: ReadAt> {
    parser: ZipParser<R>,
}

impl<R: ReadAt> ZipExtractor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    /// List all entries in the archive
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        self.parser.list_files().await
    }

    /// Decompress a member into memory and verify its CRC-32.
    ///
    /// `limit` caps the number of decompressed bytes kept; a member larger
    /// than the limit is returned truncated and its CRC is not checked.
    pub async fn extract_to_memory(
        &self,
        entry: &ZipFileEntry,
        limit: Option<u64>,
    ) -> Result<Vec<u8>> {
        if entry.compressed_size > self.parser.size() {
            bail!(
                "Member {} claims {} compressed bytes in a {} byte archive",
                entry.file_name,
                entry.compressed_size,
                self.parser.size()
            );
        }

        let data_offset = self.parser.get_data_offset(entry).await?;
        let raw = self
            .parser
            .read_data(data_offset, entry.compressed_size)
            .await?;

        let cap = limit.unwrap_or(u64::MAX);
        let data = match entry.compression_method {
            CompressionMethod::Stored => raw,
            CompressionMethod::Deflate => {
                let mut out = Vec::with_capacity(entry.uncompressed_size.min(cap) as usize);
                DeflateDecoder::new(raw.as_slice())
                    .take(cap)
                    .read_to_end(&mut out)
                    .with_context(|| format!("Failed to inflate {}", entry.file_name))?;
                out
            }
            CompressionMethod::Unknown(method) => bail!(
                "Unsupported compression method {} for {}",
                method,
                entry.file_name
            ),
        };

        if (data.len() as u64) < cap.min(entry.uncompressed_size) {
            bail!(
                "Member {} is truncated: {} of {} bytes",
                entry.file_name,
                data.len(),
                entry.uncompressed_size
            );
        }

        if data.len() as u64 > cap {
            return Ok(data[..cap as usize].to_vec());
        }

        if data.len() as u64 == entry.uncompressed_size {
            let mut crc = Crc::new();
            crc.update(&data);
            if crc.sum() != entry.crc32 {
                bail!(
                    "CRC mismatch for {}: expected {:08x}, got {:08x}",
                    entry.file_name,
                    entry.crc32,
                    crc.sum()
                );
            }
        }

        Ok(data)
    }

    /// Write raw member bytes to disk for inspection
    pub async fn extract_to_file(&self, entry: &ZipFileEntry, output_path: &Path) -> Result<()> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let data = self.extract_to_memory(entry, None).await?;

        let mut file = fs::File::create(output_path)
            .await
            .with_context(|| format!("Failed to create {}", output_path.display()))?;
        file.write_all(&data).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use crate::zip::ZipWriter;

    async fn single_member(
        deflate: bool,
        data: &[u8],
    ) -> Result<(ZipExtractor<MemoryReader>, ZipFileEntry)> {
        let mut w = ZipWriter::new();
        if deflate {
            w.add_deflated("JRNLROW.DAT", data)?;
        } else {
            w.add_stored("JRNLROW.DAT", data)?;
        }
        let extractor = ZipExtractor::new(Arc::new(MemoryReader::new(w.finish()?)));
        let entry = extractor.list_files().await?.remove(0);
        Ok((extractor, entry))
    }

    #[tokio::test]
    async fn inflates_deflated_member() -> Result<()> {
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let (extractor, entry) = single_member(true, &payload).await?;

        assert_eq!(entry.compression_method, CompressionMethod::Deflate);
        assert_eq!(extractor.extract_to_memory(&entry, None).await?, payload);
        Ok(())
    }

    #[tokio::test]
    async fn limit_truncates() -> Result<()> {
        let (extractor, entry) = single_member(true, &[1u8; 4096]).await?;
        let data = extractor.extract_to_memory(&entry, Some(100)).await?;
        assert_eq!(data.len(), 100);
        Ok(())
    }

    #[tokio::test]
    async fn detects_crc_mismatch() -> Result<()> {
        let (extractor, mut entry) = single_member(false, b"payload").await?;
        entry.crc32 ^= 1;
        assert!(extractor.extract_to_memory(&entry, None).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn dumps_member_to_disk() -> Result<()> {
        let (extractor, entry) = single_member(false, b"raw bytes").await?;
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("JRNLROW.DAT");

        extractor.extract_to_file(&entry, &path).await?;
        assert_eq!(std::fs::read(&path)?, b"raw bytes");
        Ok(())
    }
}
