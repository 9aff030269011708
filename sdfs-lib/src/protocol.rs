use crate::{DirEntry, FileHandle, LocatedBlock, OpenResult, SdfsError, SdfsResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame. A frame carries at most one block of data
/// plus the JSON envelope, so anything larger is a corrupt stream.
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

/// The closed set of namenode operations. Each request travels as one frame
/// on a fresh connection; the reply frame is `Result<NameNodeResponse, SdfsError>`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum NameNodeRequest {
    OpenReadonly { path: String },
    OpenReadwrite { path: String },
    Create { path: String },
    Mkdir { path: String },
    CloseReadonly { handle: FileHandle },
    CloseReadwrite { handle: FileHandle, final_size: u64 },
    AddBlock { handle: FileHandle },
    AddBlocks { handle: FileHandle, count: u32 },
    RemoveLastBlock { handle: FileHandle },
    RemoveLastBlocks { handle: FileHandle, count: u32 },
    List { path: String },
    Delete { path: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum NameNodeResponse {
    Opened(OpenResult),
    Located(LocatedBlock),
    LocatedMany(Vec<LocatedBlock>),
    Listing(Vec<DirEntry>),
    Done,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum DataNodeRequest {
    Read {
        block_number: u64,
        offset: u32,
        len: u32,
    },
    Write {
        block_number: u64,
        offset: u32,
        data: Vec<u8>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum DataNodeResponse {
    Data(Vec<u8>),
    Done,
}

pub async fn write_frame<W, T>(stream: &mut W, msg: &T) -> SdfsResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(msg)
        .map_err(|e| SdfsError::DecodeError(format!("encode frame failed: {}", e)))?;
    if body.len() > MAX_FRAME_LEN {
        return Err(SdfsError::InvalidArgument(format!(
            "frame too large: {} bytes",
            body.len()
        )));
    }
    stream.write_all(&(body.len() as u32).to_le_bytes()).await?;
    stream.write_all(&body).await?;
    stream.flush().await?;
    Ok(())
}

pub async fn read_frame<R, T>(stream: &mut R) -> SdfsResult<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(SdfsError::DecodeError(format!(
            "frame length {} exceeds limit",
            len
        )));
    }
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    serde_json::from_slice(&body)
        .map_err(|e| SdfsError::DecodeError(format!("decode frame failed: {}", e)))
}
