use sdfs_lib::{
    read_frame, write_frame, DataNodeRequest, DataNodeResponse, DirEntry, FileHandle,
    LocatedBlock, NameNodeRequest, NameNodeResponse, OpenResult, SdfsError, SdfsResult,
};
use std::net::SocketAddr;
use tokio::net::TcpStream;

/// Client-side stub for the namenode. Each call opens a fresh connection,
/// sends one framed request and reads one tagged reply.
#[derive(Clone, Debug)]
pub struct NameNodeStub {
    addr: SocketAddr,
}

impl NameNodeStub {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn call(&self, request: NameNodeRequest) -> SdfsResult<NameNodeResponse> {
        let mut stream = TcpStream::connect(self.addr)
            .await
            .map_err(|e| SdfsError::RemoteError(format!("connect namenode {} failed: {}", self.addr, e)))?;
        write_frame(&mut stream, &request).await?;
        let reply: Result<NameNodeResponse, SdfsError> = read_frame(&mut stream).await?;
        reply
    }

    pub async fn open_readonly(&self, path: &str) -> SdfsResult<OpenResult> {
        match self
            .call(NameNodeRequest::OpenReadonly {
                path: path.to_string(),
            })
            .await?
        {
            NameNodeResponse::Opened(open) => Ok(open),
            other => Err(unexpected(other)),
        }
    }

    pub async fn open_readwrite(&self, path: &str) -> SdfsResult<OpenResult> {
        match self
            .call(NameNodeRequest::OpenReadwrite {
                path: path.to_string(),
            })
            .await?
        {
            NameNodeResponse::Opened(open) => Ok(open),
            other => Err(unexpected(other)),
        }
    }

    pub async fn create(&self, path: &str) -> SdfsResult<OpenResult> {
        match self
            .call(NameNodeRequest::Create {
                path: path.to_string(),
            })
            .await?
        {
            NameNodeResponse::Opened(open) => Ok(open),
            other => Err(unexpected(other)),
        }
    }

    pub async fn mkdir(&self, path: &str) -> SdfsResult<()> {
        match self
            .call(NameNodeRequest::Mkdir {
                path: path.to_string(),
            })
            .await?
        {
            NameNodeResponse::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn close_readonly(&self, handle: FileHandle) -> SdfsResult<()> {
        match self.call(NameNodeRequest::CloseReadonly { handle }).await? {
            NameNodeResponse::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn close_readwrite(&self, handle: FileHandle, final_size: u64) -> SdfsResult<()> {
        match self
            .call(NameNodeRequest::CloseReadwrite { handle, final_size })
            .await?
        {
            NameNodeResponse::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn add_block(&self, handle: FileHandle) -> SdfsResult<LocatedBlock> {
        match self.call(NameNodeRequest::AddBlock { handle }).await? {
            NameNodeResponse::Located(loc) => Ok(loc),
            other => Err(unexpected(other)),
        }
    }

    pub async fn add_blocks(&self, handle: FileHandle, count: u32) -> SdfsResult<Vec<LocatedBlock>> {
        match self.call(NameNodeRequest::AddBlocks { handle, count }).await? {
            NameNodeResponse::LocatedMany(locs) => Ok(locs),
            other => Err(unexpected(other)),
        }
    }

    pub async fn remove_last_block(&self, handle: FileHandle) -> SdfsResult<()> {
        match self.call(NameNodeRequest::RemoveLastBlock { handle }).await? {
            NameNodeResponse::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn remove_last_blocks(&self, handle: FileHandle, count: u32) -> SdfsResult<()> {
        match self
            .call(NameNodeRequest::RemoveLastBlocks { handle, count })
            .await?
        {
            NameNodeResponse::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn list(&self, path: &str) -> SdfsResult<Vec<DirEntry>> {
        match self
            .call(NameNodeRequest::List {
                path: path.to_string(),
            })
            .await?
        {
            NameNodeResponse::Listing(entries) => Ok(entries),
            other => Err(unexpected(other)),
        }
    }

    pub async fn delete(&self, path: &str) -> SdfsResult<()> {
        match self
            .call(NameNodeRequest::Delete {
                path: path.to_string(),
            })
            .await?
        {
            NameNodeResponse::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: NameNodeResponse) -> SdfsError {
    SdfsError::DecodeError(format!("unexpected namenode response: {:?}", response))
}

/// Client-side stub for a datanode block store.
#[derive(Clone, Debug)]
pub struct DataNodeStub {
    addr: SocketAddr,
}

impl DataNodeStub {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    async fn call(&self, request: DataNodeRequest) -> SdfsResult<DataNodeResponse> {
        let mut stream = TcpStream::connect(self.addr)
            .await
            .map_err(|e| SdfsError::RemoteError(format!("connect datanode {} failed: {}", self.addr, e)))?;
        write_frame(&mut stream, &request).await?;
        let reply: Result<DataNodeResponse, SdfsError> = read_frame(&mut stream).await?;
        reply
    }

    pub async fn read(&self, block_number: u64, offset: u32, len: u32) -> SdfsResult<Vec<u8>> {
        match self
            .call(DataNodeRequest::Read {
                block_number,
                offset,
                len,
            })
            .await?
        {
            DataNodeResponse::Data(data) => Ok(data),
            DataNodeResponse::Done => Err(SdfsError::DecodeError(
                "unexpected datanode response to read".to_string(),
            )),
        }
    }

    pub async fn write(&self, block_number: u64, offset: u32, data: &[u8]) -> SdfsResult<()> {
        match self
            .call(DataNodeRequest::Write {
                block_number,
                offset,
                data: data.to_vec(),
            })
            .await?
        {
            DataNodeResponse::Done => Ok(()),
            DataNodeResponse::Data(_) => Err(SdfsError::DecodeError(
                "unexpected datanode response to write".to_string(),
            )),
        }
    }
}
