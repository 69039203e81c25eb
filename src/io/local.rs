use super::ReadAt;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;

/// Backup archive on the local filesystem, read with positional reads
pub struct LocalFileReader {
    file: std::fs::File,
    size: u64,
}

impl LocalFileReader {
    pub fn new(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open backup archive: {}", path.display()))?;
        let size = file.metadata()?.len();
        Ok(Self { file, size })
    }
}

#[async_trait]
impl ReadAt for LocalFileReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;

        // Positional reads may return short counts; keep going until EOF
        while filled < buf.len() {
            let n = read_chunk(&self.file, offset + filled as u64, &mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        Ok(filled)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(unix)]
fn read_chunk(file: &std::fs::File, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_chunk(file: &std::fs::File, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

#[cfg(not(any(unix, windows)))]
fn read_chunk(file: &std::fs::File, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
    use std::io::{Read, Seek, SeekFrom};
    let mut file = file;
    file.seek(SeekFrom::Start(offset))?;
    file.read(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reads_at_offset() -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new()?;
        tmp.write_all(b"CHART.DAT payload")?;

        let reader = LocalFileReader::new(tmp.path())?;
        assert_eq!(reader.size(), 17);

        let mut buf = [0u8; 7];
        let n = reader.read_at(10, &mut buf).await?;
        assert_eq!(n, 7);
        assert_eq!(&buf, b"payload");

        Ok(())
    }

    #[test]
    fn missing_file_is_error() {
        assert!(LocalFileReader::new(Path::new("/nonexistent/backup.ptb")).is_err());
    }
}
