use crate::channel::SdfsFileChannel;
use crate::stubs::NameNodeStub;
use datanode::{serve_data_node, BlockStore};
use namenode::{serve_name_node, NameNodeEngine};
use sdfs_lib::{SdfsError, BLOCK_SIZE};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

struct TestCluster {
    name_node: NameNodeStub,
    data_node_addr: SocketAddr,
    block_dir: PathBuf,
    data_node: JoinHandle<()>,
    _tmp: TempDir,
}

impl TestCluster {
    async fn stop_data_node(&mut self) {
        self.data_node.abort();
        let _ = (&mut self.data_node).await;
    }

    async fn restart_data_node(&mut self) {
        let listener = TcpListener::bind(self.data_node_addr).await.unwrap();
        let store = Arc::new(BlockStore::open(self.block_dir.clone()).await.unwrap());
        self.data_node = tokio::spawn(serve_data_node(store, listener));
    }
}

/// One namenode and one datanode on ephemeral ports, storage in a tempdir.
async fn start_cluster() -> TestCluster {
    let tmp = TempDir::new().unwrap();
    let block_dir = tmp.path().join("blocks");

    let dn_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dn_addr = dn_listener.local_addr().unwrap();
    let store = Arc::new(BlockStore::open(block_dir.clone()).await.unwrap());
    let data_node = tokio::spawn(serve_data_node(store, dn_listener));

    let nn_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let nn_addr = nn_listener.local_addr().unwrap();
    let engine = Arc::new(
        NameNodeEngine::new(tmp.path().join("meta"), dn_addr)
            .await
            .unwrap(),
    );
    tokio::spawn(serve_name_node(engine, nn_listener));

    TestCluster {
        name_node: NameNodeStub::new(nn_addr),
        data_node_addr: dn_addr,
        block_dir,
        data_node,
        _tmp: tmp,
    }
}

async fn create_channel(cluster: &TestCluster, path: &str, capacity: usize) -> SdfsFileChannel {
    let open = cluster.name_node.create(path).await.unwrap();
    SdfsFileChannel::new(cluster.name_node.clone(), open, false, capacity)
}

async fn open_readonly_channel(
    cluster: &TestCluster,
    path: &str,
    capacity: usize,
) -> SdfsFileChannel {
    let open = cluster.name_node.open_readonly(path).await.unwrap();
    SdfsFileChannel::new(cluster.name_node.clone(), open, true, capacity)
}

async fn open_readwrite_channel(
    cluster: &TestCluster,
    path: &str,
    capacity: usize,
) -> SdfsFileChannel {
    let open = cluster.name_node.open_readwrite(path).await.unwrap();
    SdfsFileChannel::new(cluster.name_node.clone(), open, false, capacity)
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn read_all(channel: &mut SdfsFileChannel) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; 8192];
    loop {
        let n = channel.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}

// ==================== Round Trip ====================

#[tokio::test]
async fn test_write_read_round_trip_three_blocks() {
    let cluster = start_cluster().await;
    let data = pattern(300_000);

    let mut writer = create_channel(&cluster, "/a", 16).await;
    assert_eq!(writer.write(&data).await.unwrap(), data.len());
    assert_eq!(writer.size().unwrap(), 300_000);
    writer.close().await.unwrap();

    // the persisted namespace shows exactly three descriptors
    let open = cluster.name_node.open_readonly("/a").await.unwrap();
    assert_eq!(open.size, 300_000);
    assert_eq!(open.blocks.len(), 3);
    let mut reader = SdfsFileChannel::new(cluster.name_node.clone(), open, true, 16);
    assert_eq!(read_all(&mut reader).await, data);
    reader.close().await.unwrap();
}

#[tokio::test]
async fn test_partial_overwrite() {
    let cluster = start_cluster().await;
    let mut writer = create_channel(&cluster, "/a", 16).await;
    writer.write(&vec![b'a'; 1000]).await.unwrap();
    writer.seek(500).unwrap();
    writer.write(&vec![b'b'; 100]).await.unwrap();
    assert_eq!(writer.size().unwrap(), 1000);
    writer.close().await.unwrap();

    let mut reader = open_readonly_channel(&cluster, "/a", 16).await;
    let got = read_all(&mut reader).await;
    assert_eq!(got.len(), 1000);
    assert!(got[..500].iter().all(|&b| b == b'a'));
    assert!(got[500..600].iter().all(|&b| b == b'b'));
    assert!(got[600..].iter().all(|&b| b == b'a'));
}

// ==================== Sparse Extension ====================

#[tokio::test]
async fn test_sparse_write_zero_fills_gap() {
    let cluster = start_cluster().await;
    let mut writer = create_channel(&cluster, "/a", 16).await;
    writer.write(b"head").await.unwrap();
    writer.seek(200_000).unwrap();
    writer.write(b"tail").await.unwrap();
    assert_eq!(writer.size().unwrap(), 200_004);
    writer.close().await.unwrap();

    let mut reader = open_readonly_channel(&cluster, "/a", 16).await;
    let got = read_all(&mut reader).await;
    assert_eq!(got.len(), 200_004);
    assert_eq!(&got[..4], b"head");
    assert!(got[4..200_000].iter().all(|&b| b == 0));
    assert_eq!(&got[200_000..], b"tail");
}

#[tokio::test]
async fn test_sparse_write_on_empty_file() {
    let cluster = start_cluster().await;
    let position = 2 * BLOCK_SIZE as u64 + 5;

    let mut writer = create_channel(&cluster, "/a", 16).await;
    writer.seek(position).unwrap();
    writer.write(b"x").await.unwrap();
    assert_eq!(writer.size().unwrap(), position + 1);
    writer.close().await.unwrap();

    let open = cluster.name_node.open_readonly("/a").await.unwrap();
    assert_eq!(open.blocks.len(), 3);
    let mut reader = SdfsFileChannel::new(cluster.name_node.clone(), open, true, 16);
    let got = read_all(&mut reader).await;
    assert!(got[..position as usize].iter().all(|&b| b == 0));
    assert_eq!(got[position as usize], b'x');
}

#[tokio::test]
async fn test_seek_without_write_does_not_extend() {
    let cluster = start_cluster().await;
    let mut writer = create_channel(&cluster, "/a", 16).await;
    writer.write(b"0123456789").await.unwrap();
    writer.seek(5000).unwrap();
    assert_eq!(writer.size().unwrap(), 10);
    writer.close().await.unwrap();

    let reader = open_readonly_channel(&cluster, "/a", 16).await;
    assert_eq!(reader.size().unwrap(), 10);
}

// ==================== Truncate ====================

#[tokio::test]
async fn test_truncate_drops_trailing_blocks() {
    let cluster = start_cluster().await;
    let data = pattern(300_000);
    let mut writer = create_channel(&cluster, "/a", 16).await;
    writer.write(&data).await.unwrap();

    writer.truncate(100_000).await.unwrap();
    assert_eq!(writer.size().unwrap(), 100_000);
    // truncate past the end is a no-op
    writer.truncate(999_999).await.unwrap();
    assert_eq!(writer.size().unwrap(), 100_000);
    writer.close().await.unwrap();

    let open = cluster.name_node.open_readonly("/a").await.unwrap();
    assert_eq!(open.size, 100_000);
    assert_eq!(open.blocks.len(), 1);
    let mut reader = SdfsFileChannel::new(cluster.name_node.clone(), open, true, 16);
    assert_eq!(read_all(&mut reader).await, &data[..100_000]);
}

#[tokio::test]
async fn test_truncate_to_zero() {
    let cluster = start_cluster().await;
    let mut writer = create_channel(&cluster, "/a", 16).await;
    writer.write(&pattern(BLOCK_SIZE + 10)).await.unwrap();
    writer.truncate(0).await.unwrap();
    assert_eq!(writer.size().unwrap(), 0);
    assert_eq!(writer.position().unwrap(), 0);
    writer.close().await.unwrap();

    let open = cluster.name_node.open_readonly("/a").await.unwrap();
    assert_eq!(open.size, 0);
    assert!(open.blocks.is_empty());
    let mut reader = SdfsFileChannel::new(cluster.name_node.clone(), open, true, 16);
    let mut buf = [0u8; 16];
    assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
}

#[tokio::test]
async fn test_truncate_clamps_position() {
    let cluster = start_cluster().await;
    let mut writer = create_channel(&cluster, "/a", 16).await;
    writer.write(&pattern(1000)).await.unwrap();
    assert_eq!(writer.position().unwrap(), 1000);
    writer.truncate(200).await.unwrap();
    assert_eq!(writer.position().unwrap(), 200);
    writer.close().await.unwrap();
}

// ==================== Cache Eviction ====================

#[tokio::test]
async fn test_eviction_never_loses_writes() {
    let cluster = start_cluster().await;
    // capacity 2, writes spanning 5 blocks: three evictions along the way
    let data = pattern(5 * BLOCK_SIZE);
    let mut writer = create_channel(&cluster, "/a", 2).await;
    writer.write(&data).await.unwrap();

    // the first block was evicted long ago; reading it again must reload
    // the flushed bytes from the datanode
    writer.seek(0).unwrap();
    let mut buf = vec![0u8; 1024];
    assert_eq!(writer.read(&mut buf).await.unwrap(), 1024);
    assert_eq!(&buf, &data[..1024]);
    writer.close().await.unwrap();

    let mut reader = open_readonly_channel(&cluster, "/a", 2).await;
    assert_eq!(read_all(&mut reader).await, data);
}

#[tokio::test]
async fn test_failed_flush_keeps_unwritten_bytes() {
    let mut cluster = start_cluster().await;
    let mut writer = create_channel(&cluster, "/a", 16).await;
    writer.write(b"precious").await.unwrap();

    cluster.stop_data_node().await;
    assert!(writer.flush().await.is_err());

    // the dirty block survived the failed flush; a retry delivers it
    cluster.restart_data_node().await;
    writer.flush().await.unwrap();
    writer.close().await.unwrap();

    let mut reader = open_readonly_channel(&cluster, "/a", 16).await;
    assert_eq!(read_all(&mut reader).await, b"precious");
}

#[tokio::test]
async fn test_tail_eviction_writes_only_valid_prefix() {
    let cluster = start_cluster().await;
    // a partial tail block that gets evicted, then reloaded
    let data = pattern(BLOCK_SIZE + 100);
    let mut writer = create_channel(&cluster, "/a", 1).await;
    writer.write(&data).await.unwrap();
    writer.seek(0).unwrap();
    let mut buf = vec![0u8; 64];
    writer.read(&mut buf).await.unwrap();
    assert_eq!(&buf, &data[..64]);
    writer.close().await.unwrap();

    let mut reader = open_readonly_channel(&cluster, "/a", 4).await;
    assert_eq!(read_all(&mut reader).await, data);
}

// ==================== Sessions ====================

#[tokio::test]
async fn test_reader_isolated_from_open_writer() {
    let cluster = start_cluster().await;
    let mut writer = create_channel(&cluster, "/a", 16).await;
    writer.write(b"one").await.unwrap();
    writer.close().await.unwrap();

    let mut writer = open_readwrite_channel(&cluster, "/a", 16).await;
    writer.seek(0).unwrap();
    writer.write(b"TWO").await.unwrap();

    // opened while the writer is live: sees the pre-write state
    let mut reader = open_readonly_channel(&cluster, "/a", 16).await;
    assert_eq!(read_all(&mut reader).await, b"one");
    reader.close().await.unwrap();

    writer.close().await.unwrap();

    let mut reader = open_readonly_channel(&cluster, "/a", 16).await;
    assert_eq!(read_all(&mut reader).await, b"TWO");
}

#[tokio::test]
async fn test_second_writer_rejected() {
    let cluster = start_cluster().await;
    let mut writer = create_channel(&cluster, "/a", 16).await;
    let err = cluster.name_node.open_readwrite("/a").await.unwrap_err();
    assert!(err.is_already_locked());
    writer.close().await.unwrap();
}

// ==================== Channel State ====================

#[tokio::test]
async fn test_readonly_channel_rejects_mutation() {
    let cluster = start_cluster().await;
    let mut writer = create_channel(&cluster, "/a", 16).await;
    writer.write(b"abc").await.unwrap();
    writer.close().await.unwrap();

    let mut reader = open_readonly_channel(&cluster, "/a", 16).await;
    assert!(matches!(
        reader.write(b"x").await,
        Err(SdfsError::NotWritable(_))
    ));
    assert!(matches!(
        reader.truncate(0).await,
        Err(SdfsError::NotWritable(_))
    ));
    assert!(matches!(reader.flush().await, Err(SdfsError::NotWritable(_))));
    reader.close().await.unwrap();
}

#[tokio::test]
async fn test_closed_channel_rejects_everything() {
    let cluster = start_cluster().await;
    let mut channel = create_channel(&cluster, "/a", 16).await;
    channel.write(b"abc").await.unwrap();
    channel.close().await.unwrap();
    assert!(!channel.is_open());

    let mut buf = [0u8; 4];
    assert!(matches!(
        channel.read(&mut buf).await,
        Err(SdfsError::ChannelClosed(_))
    ));
    assert!(matches!(
        channel.write(b"x").await,
        Err(SdfsError::ChannelClosed(_))
    ));
    assert!(matches!(channel.seek(0), Err(SdfsError::ChannelClosed(_))));
    assert!(matches!(channel.size(), Err(SdfsError::ChannelClosed(_))));
    assert!(matches!(
        channel.position(),
        Err(SdfsError::ChannelClosed(_))
    ));

    // a second close is a no-op
    channel.close().await.unwrap();
}

#[tokio::test]
async fn test_read_at_end_of_file() {
    let cluster = start_cluster().await;
    let mut writer = create_channel(&cluster, "/a", 16).await;
    writer.write(b"abc").await.unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(writer.read(&mut buf).await.unwrap(), 0);
    writer.seek(100).unwrap();
    assert_eq!(writer.read(&mut buf).await.unwrap(), 0);
    writer.close().await.unwrap();
}
