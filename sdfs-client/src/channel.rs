use crate::block_cache::{BlockCache, CachedBlock};
use crate::stubs::{DataNodeStub, NameNodeStub};
use log::debug;
use sdfs_lib::{
    block_count_for, BlockDescriptor, FileHandle, LocatedBlock, OpenResult, SdfsError,
    SdfsResult, BLOCK_SIZE,
};

/// A seekable byte channel over one open remote file. The channel owns a
/// local copy of the file's block list and a bounded LRU cache of block
/// contents; writes are deferred until eviction, flush or close. Not safe
/// for concurrent use; one caller at a time.
pub struct SdfsFileChannel {
    handle: FileHandle,
    read_only: bool,
    size: u64,
    position: u64,
    blocks: Vec<BlockDescriptor>,
    cache: BlockCache,
    name_node: NameNodeStub,
    closed: bool,
}

impl SdfsFileChannel {
    pub fn new(
        name_node: NameNodeStub,
        open: OpenResult,
        read_only: bool,
        cache_capacity: usize,
    ) -> Self {
        Self {
            handle: open.handle,
            read_only,
            size: open.size,
            position: 0,
            blocks: open.blocks,
            cache: BlockCache::new(cache_capacity),
            name_node,
            closed: false,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }

    pub fn position(&self) -> SdfsResult<u64> {
        self.ensure_open()?;
        Ok(self.position)
    }

    /// Seeking past the current end is legal; the file is only extended by
    /// a following write. (Negative positions are unrepresentable here.)
    pub fn seek(&mut self, new_position: u64) -> SdfsResult<()> {
        self.ensure_open()?;
        self.position = new_position;
        Ok(())
    }

    pub fn size(&self) -> SdfsResult<u64> {
        self.ensure_open()?;
        Ok(self.size)
    }

    /// Read from the current position into `dst`. Returns 0 at end of file;
    /// otherwise stops exactly when `dst` is full or the end is reached.
    pub async fn read(&mut self, dst: &mut [u8]) -> SdfsResult<usize> {
        self.ensure_open()?;
        if self.position >= self.size {
            return Ok(0);
        }
        let mut copied = 0usize;
        while copied < dst.len() && self.position < self.size {
            let block_index = (self.position / BLOCK_SIZE as u64) as usize;
            let within = (self.position % BLOCK_SIZE as u64) as usize;
            let n = (dst.len() - copied)
                .min(BLOCK_SIZE - within)
                .min((self.size - self.position) as usize);
            let loc = self
                .blocks
                .get(block_index)
                .ok_or_else(|| {
                    SdfsError::Internal(format!(
                        "position {} has no block descriptor",
                        self.position
                    ))
                })?
                .primary()
                .clone();
            let block = self.load_block(&loc).await?;
            dst[copied..copied + n].copy_from_slice(&block.data[within..within + n]);
            copied += n;
            self.position += n as u64;
        }
        Ok(copied)
    }

    /// Write all of `src` at the current position, extending the file as
    /// needed. A position past the current end first materializes the gap
    /// as zero-filled blocks.
    pub async fn write(&mut self, src: &[u8]) -> SdfsResult<usize> {
        self.ensure_open()?;
        self.ensure_writable()?;
        if src.is_empty() {
            return Ok(0);
        }
        if self.position > self.size {
            self.extend_to_position().await?;
        }

        let mut consumed = 0usize;
        while consumed < src.len() {
            let block_index = (self.position / BLOCK_SIZE as u64) as usize;
            if block_index >= self.blocks.len() {
                // block list exhausted; position is block-aligned here
                let needed = block_count_for((src.len() - consumed) as u64) as u32;
                self.append_zero_blocks(needed).await?;
                continue;
            }
            let within = (self.position % BLOCK_SIZE as u64) as usize;
            let n = (BLOCK_SIZE - within).min(src.len() - consumed);
            let loc = self.blocks[block_index].primary().clone();
            // read-modify-write: a partial overwrite must see existing bytes
            let block = self.load_block(&loc).await?;
            block.data[within..within + n].copy_from_slice(&src[consumed..consumed + n]);
            block.dirty = true;
            consumed += n;
            self.position += n as u64;
            if self.position > self.size {
                self.size = self.position;
            }
        }
        Ok(src.len())
    }

    /// Shrink the file to `new_size`. A target at or past the current size
    /// is a no-op; the channel never grows a file here.
    pub async fn truncate(&mut self, new_size: u64) -> SdfsResult<()> {
        self.ensure_open()?;
        self.ensure_writable()?;
        if new_size >= self.size {
            return Ok(());
        }
        let drop_count = block_count_for(self.size) - block_count_for(new_size);
        if drop_count > 0 {
            self.name_node
                .remove_last_blocks(self.handle, drop_count as u32)
                .await?;
            for _ in 0..drop_count {
                if let Some(descriptor) = self.blocks.pop() {
                    // the dropped block's number may be recycled; its cached
                    // bytes are stale and must not be flushed
                    self.cache.remove(descriptor.primary());
                }
            }
        }
        self.size = new_size;
        if self.position > new_size {
            self.position = new_size;
        }
        debug!("truncated {} to {} bytes", self.handle, new_size);
        Ok(())
    }

    /// Write every dirty cached block back to its datanode, clearing the
    /// cache as entries land. The block holding the logical end writes only
    /// its valid prefix so stale bytes past the end are never persisted. A
    /// failed write-back leaves the unflushed bytes cached; a later flush
    /// can still deliver them.
    pub async fn flush(&mut self) -> SdfsResult<()> {
        self.ensure_open()?;
        self.ensure_writable()?;
        self.flush_dirty().await
    }

    /// Safe to call more than once. The channel is marked closed whatever
    /// happens, but a writer's flush failure is surfaced and the
    /// session-close RPC is only issued after a successful flush.
    pub async fn close(&mut self) -> SdfsResult<()> {
        if self.closed {
            return Ok(());
        }
        if self.read_only {
            self.closed = true;
            self.name_node.close_readonly(self.handle).await
        } else {
            let flushed = self.flush_dirty().await;
            self.closed = true;
            flushed?;
            self.name_node.close_readwrite(self.handle, self.size).await
        }
    }

    fn ensure_open(&self) -> SdfsResult<()> {
        if self.closed {
            return Err(SdfsError::ChannelClosed(self.handle.to_string()));
        }
        Ok(())
    }

    fn ensure_writable(&self) -> SdfsResult<()> {
        if self.read_only {
            return Err(SdfsError::NotWritable(self.handle.to_string()));
        }
        Ok(())
    }

    /// Zero-fill `[size, position)` after a seek past the end: the tail of
    /// the current last block is zeroed in cache, the gap is covered with
    /// freshly allocated zero blocks, and the size catches up to the
    /// position before the caller's bytes land.
    async fn extend_to_position(&mut self) -> SdfsResult<()> {
        let gap_blocks = block_count_for(self.position) - block_count_for(self.size);
        if let Some(last_index) = self.blocks.len().checked_sub(1) {
            let tail_used = self.valid_len(last_index);
            if tail_used < BLOCK_SIZE {
                let loc = self.blocks[last_index].primary().clone();
                let block = self.load_block(&loc).await?;
                block.data[tail_used..].fill(0);
                block.dirty = true;
            }
        }
        if gap_blocks > 0 {
            self.size = self.position;
            self.append_zero_blocks(gap_blocks as u32).await?;
        } else {
            self.size = self.position;
        }
        debug!("extended {} to sparse position {}", self.handle, self.position);
        Ok(())
    }

    /// Allocate `count` blocks on the namenode, append their descriptors
    /// and cache them as zero-filled dirty content so they are materialized
    /// even if never explicitly written.
    async fn append_zero_blocks(&mut self, count: u32) -> SdfsResult<()> {
        let locations = self.name_node.add_blocks(self.handle, count).await?;
        for loc in &locations {
            self.blocks.push(BlockDescriptor::single(loc.clone()));
        }
        for loc in locations {
            self.admit(
                loc,
                CachedBlock {
                    data: vec![0u8; BLOCK_SIZE],
                    dirty: true,
                },
            )
            .await?;
        }
        Ok(())
    }

    /// Bring a block into the cache, fetching its full content on a miss.
    async fn load_block(&mut self, loc: &LocatedBlock) -> SdfsResult<&mut CachedBlock> {
        if !self.cache.contains(loc) {
            let data = DataNodeStub::new(loc.addr)
                .read(loc.block_number, 0, BLOCK_SIZE as u32)
                .await?;
            self.admit(
                loc.clone(),
                CachedBlock { data, dirty: false },
            )
            .await?;
        }
        self.cache
            .get_mut(loc)
            .ok_or_else(|| SdfsError::Internal("cached block vanished".to_string()))
    }

    /// Admit an entry, evicting (and flushing, if dirty) the least recently
    /// used entries first. The flush happens before the new entry lands.
    async fn admit(&mut self, loc: LocatedBlock, block: CachedBlock) -> SdfsResult<()> {
        if self.cache.contains(&loc) {
            // recycled block number already cached: replace the stale bytes
            if let Some(existing) = self.cache.get_mut(&loc) {
                *existing = block;
            }
            return Ok(());
        }
        while self.cache.is_full() {
            let (evicted_loc, evicted) = match self.cache.pop_lru() {
                Some(entry) => entry,
                None => break,
            };
            if evicted.dirty {
                debug!("evicting dirty block {} from {}", evicted_loc.block_number, self.handle);
                if let Err(e) = self.write_back(&evicted_loc, &evicted.data).await {
                    // the victim's bytes stay cached; the new entry is not
                    // admitted
                    self.cache.insert(evicted_loc, evicted);
                    return Err(e);
                }
            }
        }
        self.cache.insert(loc, block);
        Ok(())
    }

    /// Entries leave the cache only once written back; on failure the
    /// unflushed block goes back in so its bytes are not lost.
    async fn flush_dirty(&mut self) -> SdfsResult<()> {
        while let Some((loc, block)) = self.cache.pop_lru() {
            if block.dirty {
                if let Err(e) = self.write_back(&loc, &block.data).await {
                    self.cache.insert(loc, block);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn write_back(&self, loc: &LocatedBlock, data: &[u8]) -> SdfsResult<()> {
        let len = match self.blocks.iter().position(|d| d.primary() == loc) {
            Some(index) => self.valid_len(index),
            // descriptor gone (truncated away); nothing to persist
            None => return Ok(()),
        };
        DataNodeStub::new(loc.addr)
            .write(loc.block_number, 0, &data[..len.min(data.len())])
            .await
    }

    /// How many bytes of block `index` are logically valid. The block
    /// holding the end of file gets its prefix; every other block,
    /// including zero blocks past the end mid-extension, writes in full.
    fn valid_len(&self, index: usize) -> usize {
        let start = index as u64 * BLOCK_SIZE as u64;
        if self.size > start && self.size < start + BLOCK_SIZE as u64 {
            (self.size - start) as usize
        } else {
            BLOCK_SIZE
        }
    }
}
