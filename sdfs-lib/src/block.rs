use crate::BLOCK_SIZE;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Opaque open-file handle issued by the namenode. Handles are only
/// meaningful for the lifetime of the engine that issued them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileHandle(pub u64);

impl std::fmt::Display for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fh-{}", self.0)
    }
}

/// Where one copy of a block lives: a datanode address plus the block
/// number inside that datanode's store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocatedBlock {
    pub addr: SocketAddr,
    pub block_number: u64,
}

impl LocatedBlock {
    pub fn new(addr: SocketAddr, block_number: u64) -> Self {
        Self { addr, block_number }
    }
}

/// One logical block of a file. The descriptor carries a location list for
/// future replication; the engine currently always populates exactly one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDescriptor {
    pub locations: Vec<LocatedBlock>,
}

impl BlockDescriptor {
    pub fn single(location: LocatedBlock) -> Self {
        Self {
            locations: vec![location],
        }
    }

    /// The location the client should talk to. Every descriptor holds at
    /// least one location.
    pub fn primary(&self) -> &LocatedBlock {
        &self.locations[0]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Dir,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// Result of an open/create call: the session handle plus a snapshot of the
/// file's size and block list for the client channel to own locally.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpenResult {
    pub handle: FileHandle,
    pub size: u64,
    pub blocks: Vec<BlockDescriptor>,
}

/// Number of blocks needed to hold `size` bytes. Zero bytes take zero blocks.
pub fn block_count_for(size: u64) -> u64 {
    if size == 0 {
        0
    } else {
        (size - 1) / BLOCK_SIZE as u64 + 1
    }
}
