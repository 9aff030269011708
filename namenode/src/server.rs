use crate::engine::NameNodeEngine;
use log::{debug, warn};
use sdfs_lib::{
    read_frame, write_frame, NameNodeRequest, NameNodeResponse, SdfsError, SdfsResult,
};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

/// Accept loop: one connection carries exactly one request and one tagged
/// reply, then the connection is dropped.
pub async fn serve_name_node(engine: Arc<NameNodeEngine>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("namenode: connection from {}", peer);
                let engine = engine.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(engine, stream).await {
                        warn!("namenode: connection from {} failed: {}", peer, e);
                    }
                });
            }
            Err(e) => {
                warn!("namenode: accept failed: {}", e);
            }
        }
    }
}

async fn handle_connection(engine: Arc<NameNodeEngine>, mut stream: TcpStream) -> SdfsResult<()> {
    let request: NameNodeRequest = read_frame(&mut stream).await?;
    let reply: Result<NameNodeResponse, SdfsError> = dispatch(&engine, request).await;
    if let Err(e) = &reply {
        debug!("namenode: request failed: {}", e);
    }
    write_frame(&mut stream, &reply).await
}

async fn dispatch(
    engine: &NameNodeEngine,
    request: NameNodeRequest,
) -> SdfsResult<NameNodeResponse> {
    match request {
        NameNodeRequest::OpenReadonly { path } => {
            Ok(NameNodeResponse::Opened(engine.open_readonly(&path).await?))
        }
        NameNodeRequest::OpenReadwrite { path } => {
            Ok(NameNodeResponse::Opened(engine.open_readwrite(&path).await?))
        }
        NameNodeRequest::Create { path } => {
            Ok(NameNodeResponse::Opened(engine.create(&path).await?))
        }
        NameNodeRequest::Mkdir { path } => {
            engine.mkdir(&path).await?;
            Ok(NameNodeResponse::Done)
        }
        NameNodeRequest::CloseReadonly { handle } => {
            engine.close_readonly(handle).await?;
            Ok(NameNodeResponse::Done)
        }
        NameNodeRequest::CloseReadwrite { handle, final_size } => {
            engine.close_readwrite(handle, final_size).await?;
            Ok(NameNodeResponse::Done)
        }
        NameNodeRequest::AddBlock { handle } => {
            Ok(NameNodeResponse::Located(engine.add_block(handle).await?))
        }
        NameNodeRequest::AddBlocks { handle, count } => Ok(NameNodeResponse::LocatedMany(
            engine.add_blocks(handle, count).await?,
        )),
        NameNodeRequest::RemoveLastBlock { handle } => {
            engine.remove_last_block(handle).await?;
            Ok(NameNodeResponse::Done)
        }
        NameNodeRequest::RemoveLastBlocks { handle, count } => {
            engine.remove_last_blocks(handle, count).await?;
            Ok(NameNodeResponse::Done)
        }
        NameNodeRequest::List { path } => {
            Ok(NameNodeResponse::Listing(engine.list(&path).await?))
        }
        NameNodeRequest::Delete { path } => {
            engine.delete(&path).await?;
            Ok(NameNodeResponse::Done)
        }
    }
}
