//! TCP accept loop and per-connection frame pumps.

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use gridstone_net::{FrameError, read_frame, write_frame};

use crate::engine::ServerEngine;

/// Accepts connections forever, spawning one task per client.
pub async fn serve(engine: Arc<ServerEngine>, listener: TcpListener) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true)?;
        tracing::info!(%peer, "client connected");
        let engine = engine.clone();
        tokio::spawn(async move {
            handle_connection(engine, stream).await;
        });
    }
}

/// Binds `addr` and runs [`serve`].
pub async fn serve_on(engine: Arc<ServerEngine>, addr: std::net::SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "gridstone server listening");
    serve(engine, listener).await
}

async fn handle_connection(engine: Arc<ServerEngine>, stream: TcpStream) {
    let (mut reader, mut writer) = stream.into_split();
    let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let connection = engine.add_connection(outgoing);
    let id = connection.id();

    let writer_task = tokio::spawn(async move {
        while let Some(payload) = outgoing_rx.recv().await {
            if let Err(err) = write_frame(&mut writer, &payload).await {
                tracing::warn!(client = id, %err, "send failed");
                break;
            }
        }
    });

    loop {
        match read_frame(&mut reader).await {
            Ok(payload) => {
                if let Err(err) = engine.handle_payload(&connection, &payload) {
                    tracing::warn!(client = id, %err, "protocol violation, closing connection");
                    break;
                }
            }
            Err(FrameError::Closed) => {
                tracing::info!(client = id, "client disconnected");
                break;
            }
            Err(err) => {
                tracing::warn!(client = id, %err, "transport error, closing connection");
                break;
            }
        }
    }

    engine.remove_connection(id);
    writer_task.abort();
}
