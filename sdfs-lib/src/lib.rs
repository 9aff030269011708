mod block;
mod protocol;
mod uri;

pub use block::*;
pub use protocol::*;
pub use uri::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed block size shared by every component. The datanode stores one file
/// per block; the client channel does all its arithmetic in these units.
pub const BLOCK_SIZE: usize = 128 * 1024;

pub const NAME_NODE_PORT: u16 = 4343;
pub const DATA_NODE_PORT: u16 = 4341;

/// Default number of cached blocks per open channel.
pub const DEFAULT_CACHE_CAPACITY: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SdfsError {
    #[error("internal error: {0}")]
    Internal(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("already write-locked: {0}")]
    AlreadyLocked(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("channel closed: {0}")]
    ChannelClosed(String),
    #[error("channel not writable: {0}")]
    NotWritable(String),
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("remote error: {0}")]
    RemoteError(String),
    #[error("decode error: {0}")]
    DecodeError(String),
}

impl SdfsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SdfsError::NotFound(_))
    }

    pub fn is_already_locked(&self) -> bool {
        matches!(self, SdfsError::AlreadyLocked(_))
    }
}

pub type SdfsResult<T> = std::result::Result<T, SdfsError>;

impl From<std::io::Error> for SdfsError {
    fn from(err: std::io::Error) -> Self {
        SdfsError::IoError(err.to_string())
    }
}
