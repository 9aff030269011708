use crate::channel::SdfsFileChannel;
use crate::stubs::NameNodeStub;
use sdfs_lib::{DirEntry, SdfsError, SdfsResult, SdfsUri, DEFAULT_CACHE_CAPACITY};
use std::net::SocketAddr;
use tokio::net::lookup_host;

/// Entry point for applications: resolves `sdfs://` URIs and hands out
/// file channels bound to the namenode named by the URI.
pub struct SdfsClient {
    cache_capacity: usize,
}

impl SdfsClient {
    pub fn new() -> Self {
        Self::with_cache_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// `cache_capacity` is the per-channel block cache size; it may be
    /// tuned per workload and is fixed for each channel at open time.
    pub fn with_cache_capacity(cache_capacity: usize) -> Self {
        Self { cache_capacity }
    }

    async fn resolve(&self, uri: &str) -> SdfsResult<(NameNodeStub, String)> {
        let parsed = SdfsUri::parse(uri)?;
        let addr = resolve_addr(&parsed.host, parsed.port).await?;
        Ok((NameNodeStub::new(addr), parsed.path))
    }

    pub async fn open_readonly(&self, uri: &str) -> SdfsResult<SdfsFileChannel> {
        let (stub, path) = self.resolve(uri).await?;
        let open = stub.open_readonly(&path).await?;
        Ok(SdfsFileChannel::new(stub, open, true, self.cache_capacity))
    }

    pub async fn open_readwrite(&self, uri: &str) -> SdfsResult<SdfsFileChannel> {
        let (stub, path) = self.resolve(uri).await?;
        let open = stub.open_readwrite(&path).await?;
        Ok(SdfsFileChannel::new(stub, open, false, self.cache_capacity))
    }

    pub async fn create(&self, uri: &str) -> SdfsResult<SdfsFileChannel> {
        let (stub, path) = self.resolve(uri).await?;
        let open = stub.create(&path).await?;
        Ok(SdfsFileChannel::new(stub, open, false, self.cache_capacity))
    }

    pub async fn mkdir(&self, uri: &str) -> SdfsResult<()> {
        let (stub, path) = self.resolve(uri).await?;
        stub.mkdir(&path).await
    }

    pub async fn list(&self, uri: &str) -> SdfsResult<Vec<DirEntry>> {
        let (stub, path) = self.resolve(uri).await?;
        stub.list(&path).await
    }

    pub async fn delete(&self, uri: &str) -> SdfsResult<()> {
        let (stub, path) = self.resolve(uri).await?;
        stub.delete(&path).await
    }
}

impl Default for SdfsClient {
    fn default() -> Self {
        Self::new()
    }
}

async fn resolve_addr(host: &str, port: u16) -> SdfsResult<SocketAddr> {
    lookup_host((host, port))
        .await
        .map_err(|e| SdfsError::IoError(format!("resolve {}:{} failed: {}", host, port, e)))?
        .next()
        .ok_or_else(|| SdfsError::NotFound(format!("no address for {}:{}", host, port)))
}
