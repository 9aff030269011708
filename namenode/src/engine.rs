use crate::config::NameNodeConfig;
use crate::filetree::{DirNode, FileNode, FsNode};
use crate::pool::FreeBlockPool;
use log::{debug, info, warn};
use sdfs_lib::{
    path_components, BlockDescriptor, DirEntry, FileHandle, LocatedBlock, OpenResult, SdfsError,
    SdfsResult, BLOCK_SIZE,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::sync::Mutex;

const FSIMAGE_FILE: &str = "fsimage.json";
const FREEPOOL_FILE: &str = "freepool.json";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Clone, Debug)]
struct Session {
    components: Vec<String>,
    key: String,
    mode: AccessMode,
}

struct EngineState {
    root: DirNode,
    pool: FreeBlockPool,
    sessions: HashMap<FileHandle, Session>,
    /// Path key of every live ReadWrite session. At most one writer per file.
    writers: HashMap<String, FileHandle>,
    /// Frozen copy of the file taken at ReadWrite-open time, served to
    /// concurrent ReadOnly openers of the same file.
    snapshots: HashMap<FileHandle, FileNode>,
}

/// The namenode core: namespace tree, free-block pool and open-file
/// sessions behind one coarse lock. Every namespace or pool mutation is
/// written back to disk before the call returns.
pub struct NameNodeEngine {
    meta_dir: PathBuf,
    data_node_addr: SocketAddr,
    state: Mutex<EngineState>,
    next_handle: AtomicU64,
}

impl NameNodeEngine {
    pub async fn new(
        meta_dir: impl Into<PathBuf>,
        data_node_addr: SocketAddr,
    ) -> SdfsResult<Self> {
        let meta_dir = meta_dir.into();
        fs::create_dir_all(&meta_dir)
            .await
            .map_err(|e| SdfsError::IoError(format!("create meta dir failed: {}", e)))?;

        let fsimage = meta_dir.join(FSIMAGE_FILE);
        let root = if fsimage.exists() {
            let body = fs::read_to_string(&fsimage)
                .await
                .map_err(|e| SdfsError::IoError(format!("read fsimage failed: {}", e)))?;
            let root: DirNode = serde_json::from_str(&body)
                .map_err(|e| SdfsError::DecodeError(format!("fsimage invalid: {}", e)))?;
            root.validate()?;
            root
        } else {
            info!("no fsimage under {:?}, starting with an empty root", meta_dir);
            DirNode::default()
        };

        let freepool = meta_dir.join(FREEPOOL_FILE);
        let pool = if freepool.exists() {
            let body = fs::read_to_string(&freepool)
                .await
                .map_err(|e| SdfsError::IoError(format!("read freepool failed: {}", e)))?;
            serde_json::from_str(&body)
                .map_err(|e| SdfsError::DecodeError(format!("freepool invalid: {}", e)))?
        } else {
            FreeBlockPool::new()
        };

        let engine = Self {
            meta_dir,
            data_node_addr,
            state: Mutex::new(EngineState {
                root,
                pool,
                sessions: HashMap::new(),
                writers: HashMap::new(),
                snapshots: HashMap::new(),
            }),
            next_handle: AtomicU64::new(1),
        };

        {
            let st = engine.state.lock().await;
            engine.persist_tree(&st.root).await?;
            engine.persist_pool(&st.pool).await?;
        }
        Ok(engine)
    }

    pub async fn from_config(config: &NameNodeConfig) -> SdfsResult<Self> {
        let data_node_addr = config.data_node_addr.parse().map_err(|_| {
            SdfsError::InvalidArgument(format!("bad datanode addr: {}", config.data_node_addr))
        })?;
        Self::new(config.meta_dir.clone(), data_node_addr).await
    }

    fn alloc_handle(&self) -> FileHandle {
        FileHandle(self.next_handle.fetch_add(1, Ordering::SeqCst))
    }

    pub async fn open_readonly(&self, path: &str) -> SdfsResult<OpenResult> {
        let components = path_components(path)?;
        let key = components.join("/");
        let mut st = self.state.lock().await;

        // A write-locked file is served from the writer's frozen snapshot
        // so readers never observe in-flight mutations.
        let view = match st.writers.get(&key) {
            Some(writer) => st
                .snapshots
                .get(writer)
                .cloned()
                .ok_or_else(|| SdfsError::Internal(format!("no snapshot for writer of {}", key)))?,
            None => st.root.resolve_file(&components)?.clone(),
        };

        let handle = self.alloc_handle();
        st.sessions.insert(
            handle,
            Session {
                components,
                key: key.clone(),
                mode: AccessMode::ReadOnly,
            },
        );
        debug!("open readonly {} -> {}", key, handle);
        Ok(OpenResult {
            handle,
            size: view.size,
            blocks: view.blocks,
        })
    }

    pub async fn open_readwrite(&self, path: &str) -> SdfsResult<OpenResult> {
        let components = path_components(path)?;
        let key = components.join("/");
        let mut st = self.state.lock().await;

        let file = st.root.resolve_file(&components)?;
        if st.writers.contains_key(&key) {
            return Err(SdfsError::AlreadyLocked(key));
        }
        let snapshot = file.clone();
        let result = OpenResult {
            handle: self.alloc_handle(),
            size: file.size,
            blocks: file.blocks.clone(),
        };

        st.writers.insert(key.clone(), result.handle);
        st.snapshots.insert(result.handle, snapshot);
        st.sessions.insert(
            result.handle,
            Session {
                components,
                key: key.clone(),
                mode: AccessMode::ReadWrite,
            },
        );
        debug!("open readwrite {} -> {}", key, result.handle);
        Ok(result)
    }

    pub async fn create(&self, path: &str) -> SdfsResult<OpenResult> {
        let components = path_components(path)?;
        let key = components.join("/");
        let (name, parents) = components
            .split_last()
            .ok_or_else(|| SdfsError::InvalidArgument("cannot create the root".to_string()))?;
        let mut st = self.state.lock().await;

        let parent = st.root.resolve_dir_mut(parents)?;
        if parent.entries.contains_key(name) {
            return Err(SdfsError::AlreadyExists(key));
        }
        parent
            .entries
            .insert(name.clone(), FsNode::File(FileNode::default()));

        let handle = self.alloc_handle();
        st.writers.insert(key.clone(), handle);
        st.snapshots.insert(handle, FileNode::default());
        st.sessions.insert(
            handle,
            Session {
                components: components.clone(),
                key: key.clone(),
                mode: AccessMode::ReadWrite,
            },
        );
        self.persist_tree(&st.root).await?;
        info!("created file {}", key);
        Ok(OpenResult {
            handle,
            size: 0,
            blocks: Vec::new(),
        })
    }

    pub async fn mkdir(&self, path: &str) -> SdfsResult<()> {
        let components = path_components(path)?;
        let (name, parents) = components
            .split_last()
            .ok_or_else(|| SdfsError::AlreadyExists("/".to_string()))?;
        let mut st = self.state.lock().await;

        let parent = st.root.resolve_dir_mut(parents)?;
        if parent.entries.contains_key(name) {
            return Err(SdfsError::AlreadyExists(components.join("/")));
        }
        parent
            .entries
            .insert(name.clone(), FsNode::Dir(DirNode::default()));
        self.persist_tree(&st.root).await?;
        info!("created directory {}", components.join("/"));
        Ok(())
    }

    pub async fn close_readonly(&self, handle: FileHandle) -> SdfsResult<()> {
        let mut st = self.state.lock().await;
        match st.sessions.get(&handle) {
            Some(s) if s.mode == AccessMode::ReadOnly => {
                st.sessions.remove(&handle);
                debug!("closed readonly session {}", handle);
                Ok(())
            }
            Some(_) => Err(SdfsError::InvalidState(format!(
                "{} is a readwrite session",
                handle
            ))),
            None => Err(SdfsError::InvalidState(format!("unknown handle {}", handle))),
        }
    }

    /// Closes the session unconditionally, then validates `final_size`
    /// against the live block count. A failed validation leaves the size
    /// untouched and is reported to the caller.
    pub async fn close_readwrite(&self, handle: FileHandle, final_size: u64) -> SdfsResult<()> {
        let mut st = self.state.lock().await;
        let session = match st.sessions.get(&handle) {
            Some(s) if s.mode == AccessMode::ReadWrite => s.clone(),
            Some(_) => {
                return Err(SdfsError::InvalidState(format!(
                    "{} is a readonly session",
                    handle
                )))
            }
            None => {
                return Err(SdfsError::InvalidState(format!(
                    "unknown handle {}",
                    handle
                )))
            }
        };
        st.sessions.remove(&handle);
        st.writers.remove(&session.key);
        st.snapshots.remove(&handle);

        let file = st.root.resolve_file_mut(&session.components)?;
        let blocks = file.block_count();
        let bs = BLOCK_SIZE as u64;
        let valid = if blocks == 0 {
            final_size == 0
        } else {
            final_size > (blocks - 1) * bs && final_size <= blocks * bs
        };
        if !valid {
            warn!(
                "close of {} rejected: final size {} does not match {} blocks",
                session.key, final_size, blocks
            );
            return Err(SdfsError::InvalidArgument(format!(
                "final size {} does not fit {} blocks",
                final_size, blocks
            )));
        }
        file.size = final_size;
        self.persist_tree(&st.root).await?;
        debug!("closed readwrite session {} at {} bytes", handle, final_size);
        Ok(())
    }

    pub async fn add_block(&self, handle: FileHandle) -> SdfsResult<LocatedBlock> {
        let blocks = self.add_blocks(handle, 1).await?;
        blocks
            .into_iter()
            .next()
            .ok_or_else(|| SdfsError::Internal("add_blocks returned nothing".to_string()))
    }

    pub async fn add_blocks(&self, handle: FileHandle, count: u32) -> SdfsResult<Vec<LocatedBlock>> {
        let mut st = self.state.lock().await;
        let session = Self::writable_session(&st, handle)?;
        let mut located = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let block_number = st.pool.allocate();
            located.push(LocatedBlock::new(self.data_node_addr, block_number));
        }
        let file = st.root.resolve_file_mut(&session.components)?;
        for loc in &located {
            file.blocks.push(BlockDescriptor::single(loc.clone()));
        }
        self.persist_pool(&st.pool).await?;
        self.persist_tree(&st.root).await?;
        debug!("added {} block(s) to {}", count, session.key);
        Ok(located)
    }

    pub async fn remove_last_block(&self, handle: FileHandle) -> SdfsResult<()> {
        self.remove_last_blocks(handle, 1).await
    }

    pub async fn remove_last_blocks(&self, handle: FileHandle, count: u32) -> SdfsResult<()> {
        let mut st = self.state.lock().await;
        let session = Self::writable_session(&st, handle)?;
        let recycled = {
            let file = st.root.resolve_file_mut(&session.components)?;
            // checked before any pop so a bad count cannot half-mutate the file
            if count as usize > file.blocks.len() {
                return Err(SdfsError::InvalidState(format!(
                    "{} has {} blocks, cannot remove {}",
                    session.key,
                    file.blocks.len(),
                    count
                )));
            }
            let keep = file.blocks.len() - count as usize;
            file.blocks
                .split_off(keep)
                .iter()
                .map(|d| d.primary().block_number)
                .collect::<Vec<_>>()
        };
        for block_number in recycled {
            st.pool.recycle(block_number);
        }
        self.persist_pool(&st.pool).await?;
        self.persist_tree(&st.root).await?;
        debug!("removed {} block(s) from {}", count, session.key);
        Ok(())
    }

    pub async fn list(&self, path: &str) -> SdfsResult<Vec<DirEntry>> {
        let components = path_components(path)?;
        let st = self.state.lock().await;
        Ok(st.root.resolve_dir(&components)?.listing())
    }

    /// Fail-fast delete: refuses the root, non-empty directories and files
    /// with any open session. A deleted file's block numbers go back to the
    /// free pool.
    pub async fn delete(&self, path: &str) -> SdfsResult<()> {
        let components = path_components(path)?;
        let key = components.join("/");
        let (name, parents) = components
            .split_last()
            .ok_or_else(|| SdfsError::InvalidArgument("cannot delete the root".to_string()))?;
        let mut st = self.state.lock().await;

        let recycled = {
            let parent = st.root.resolve_dir_mut(parents)?;
            match parent.entries.get(name) {
                None => return Err(SdfsError::NotFound(key)),
                Some(FsNode::Dir(d)) => {
                    if !d.entries.is_empty() {
                        return Err(SdfsError::InvalidState(format!(
                            "directory {} is not empty",
                            key
                        )));
                    }
                    Vec::new()
                }
                Some(FsNode::File(f)) => f
                    .blocks
                    .iter()
                    .map(|d| d.primary().block_number)
                    .collect(),
            }
        };
        if st.sessions.values().any(|s| s.key == key) {
            return Err(SdfsError::AlreadyLocked(format!("{} is open", key)));
        }

        let parent = st.root.resolve_dir_mut(parents)?;
        parent.entries.remove(name);
        let pool_touched = !recycled.is_empty();
        for block_number in recycled {
            st.pool.recycle(block_number);
        }
        if pool_touched {
            self.persist_pool(&st.pool).await?;
        }
        self.persist_tree(&st.root).await?;
        info!("deleted {}", key);
        Ok(())
    }

    fn writable_session(st: &EngineState, handle: FileHandle) -> SdfsResult<Session> {
        match st.sessions.get(&handle) {
            Some(s) if s.mode == AccessMode::ReadWrite => Ok(s.clone()),
            Some(_) => Err(SdfsError::InvalidState(format!(
                "{} is a readonly session",
                handle
            ))),
            None => Err(SdfsError::InvalidState(format!("unknown handle {}", handle))),
        }
    }

    async fn persist_tree(&self, root: &DirNode) -> SdfsResult<()> {
        self.persist(FSIMAGE_FILE, root).await
    }

    async fn persist_pool(&self, pool: &FreeBlockPool) -> SdfsResult<()> {
        self.persist(FREEPOOL_FILE, pool).await
    }

    /// Whole-snapshot write via a temp file and rename. Best-effort
    /// atomicity; called under the state lock, before the mutating call
    /// returns.
    async fn persist<T: serde::Serialize>(&self, file_name: &str, value: &T) -> SdfsResult<()> {
        let body = serde_json::to_vec_pretty(value)
            .map_err(|e| SdfsError::Internal(format!("encode {} failed: {}", file_name, e)))?;
        let tmp = self.meta_dir.join(format!("{}.tmp", file_name));
        fs::write(&tmp, &body)
            .await
            .map_err(|e| SdfsError::IoError(format!("write {} failed: {}", file_name, e)))?;
        fs::rename(&tmp, self.meta_dir.join(file_name))
            .await
            .map_err(|e| SdfsError::IoError(format!("rename {} failed: {}", file_name, e)))?;
        Ok(())
    }
}
