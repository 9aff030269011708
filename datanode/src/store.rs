use log::debug;
use sdfs_lib::{SdfsError, SdfsResult, BLOCK_SIZE};
use std::path::PathBuf;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};

const BLOCK_FILE_EXT: &str = "block";

/// File-per-block store. Block files may be shorter than `BLOCK_SIZE`; the
/// missing tail reads back as zeroes, matching the logical zero content of
/// bytes that were never written.
pub struct BlockStore {
    block_dir: PathBuf,
}

impl BlockStore {
    pub async fn open(block_dir: impl Into<PathBuf>) -> SdfsResult<Self> {
        let block_dir = block_dir.into();
        fs::create_dir_all(&block_dir)
            .await
            .map_err(|e| SdfsError::IoError(format!("create block dir failed: {}", e)))?;
        Ok(Self { block_dir })
    }

    fn block_path(&self, block_number: u64) -> PathBuf {
        self.block_dir
            .join(format!("{}.{}", block_number, BLOCK_FILE_EXT))
    }

    fn check_range(offset: u32, len: usize) -> SdfsResult<()> {
        if offset as usize > BLOCK_SIZE || offset as usize + len > BLOCK_SIZE {
            return Err(SdfsError::InvalidArgument(format!(
                "range {}+{} exceeds block size {}",
                offset, len, BLOCK_SIZE
            )));
        }
        Ok(())
    }

    pub async fn read(&self, block_number: u64, offset: u32, len: u32) -> SdfsResult<Vec<u8>> {
        Self::check_range(offset, len as usize)?;
        let path = self.block_path(block_number);
        if !path.exists() {
            return Err(SdfsError::NotFound(format!(
                "block {} was never written",
                block_number
            )));
        }
        let mut file = OpenOptions::new()
            .read(true)
            .open(&path)
            .await
            .map_err(|e| SdfsError::IoError(format!("open block {} failed: {}", block_number, e)))?;
        file.seek(SeekFrom::Start(offset as u64))
            .await
            .map_err(|e| SdfsError::IoError(format!("seek block {} failed: {}", block_number, e)))?;

        // zero-filled past the stored tail
        let mut data = vec![0u8; len as usize];
        let mut filled = 0usize;
        while filled < data.len() {
            let n = file
                .read(&mut data[filled..])
                .await
                .map_err(|e| SdfsError::IoError(format!("read block {} failed: {}", block_number, e)))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        debug!("read block {} [{}, +{}], {} stored", block_number, offset, len, filled);
        Ok(data)
    }

    pub async fn write(&self, block_number: u64, offset: u32, data: &[u8]) -> SdfsResult<()> {
        Self::check_range(offset, data.len())?;
        let path = self.block_path(block_number);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .open(&path)
            .await
            .map_err(|e| SdfsError::IoError(format!("open block {} failed: {}", block_number, e)))?;
        file.seek(SeekFrom::Start(offset as u64))
            .await
            .map_err(|e| SdfsError::IoError(format!("seek block {} failed: {}", block_number, e)))?;
        file.write_all(data)
            .await
            .map_err(|e| SdfsError::IoError(format!("write block {} failed: {}", block_number, e)))?;
        debug!("wrote block {} [{}, +{}]", block_number, offset, data.len());
        Ok(())
    }
}
