use crate::store::BlockStore;
use log::{debug, warn};
use sdfs_lib::{
    read_frame, write_frame, DataNodeRequest, DataNodeResponse, SdfsError, SdfsResult,
};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

/// One framed request per connection, mirroring the namenode server.
pub async fn serve_data_node(store: Arc<BlockStore>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("datanode: connection from {}", peer);
                let store = store.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(store, stream).await {
                        warn!("datanode: connection from {} failed: {}", peer, e);
                    }
                });
            }
            Err(e) => {
                warn!("datanode: accept failed: {}", e);
            }
        }
    }
}

async fn handle_connection(store: Arc<BlockStore>, mut stream: TcpStream) -> SdfsResult<()> {
    let request: DataNodeRequest = read_frame(&mut stream).await?;
    let reply: Result<DataNodeResponse, SdfsError> = dispatch(&store, request).await;
    if let Err(e) = &reply {
        debug!("datanode: request failed: {}", e);
    }
    write_frame(&mut stream, &reply).await
}

async fn dispatch(store: &BlockStore, request: DataNodeRequest) -> SdfsResult<DataNodeResponse> {
    match request {
        DataNodeRequest::Read {
            block_number,
            offset,
            len,
        } => Ok(DataNodeResponse::Data(
            store.read(block_number, offset, len).await?,
        )),
        DataNodeRequest::Write {
            block_number,
            offset,
            data,
        } => {
            store.write(block_number, offset, &data).await?;
            Ok(DataNodeResponse::Done)
        }
    }
}
