//! Hello Service
//!
//! Line-based TCP service: every request line is answered with `hello:<line>`.
//! It runs independently of the registration task.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

pub fn hello(request: &str) -> String {
    format!("hello:{request}")
}

/// Accept connections forever, one task per connection
pub async fn serve(listener: TcpListener) -> Result<()> {
    info!(addr = %listener.local_addr()?, "Hello service listening");

    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .context("Failed to accept connection")?;
        debug!(peer = %peer, "Accepted connection");

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream).await {
                warn!(peer = %peer, error = %e, "Connection failed");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let mut reply = hello(line.trim_end_matches('\r'));
        reply.push('\n');
        writer.write_all(reply.as_bytes()).await?;
    }
    Ok(())
}
