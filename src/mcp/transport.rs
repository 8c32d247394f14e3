use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;

use crate::mcp::types::JsonRpcResponse;

/// Abstraction for sending/receiving newline-delimited JSON-RPC messages
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &JsonRpcResponse) -> Result<()>;
    /// Next raw line as bytes, or `None` once the peer closed its end.
    /// Decoding is left to the caller so a bad line never ends the stream.
    async fn receive_line(&self) -> Result<Option<Vec<u8>>>;
}

/// Line transport over any buffered reader / writer pair.
pub struct LineTransport<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
}

pub type StdioTransport = LineTransport<BufReader<Stdin>, Stdout>;

impl StdioTransport {
    pub fn stdio() -> Self {
        LineTransport::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> LineTransport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }

    pub fn into_writer(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait::async_trait]
impl<R, W> Transport for LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, message: &JsonRpcResponse) -> Result<()> {
        let mut json = serde_json::to_string(message)?;
        json.push('\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(json.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn receive_line(&self) -> Result<Option<Vec<u8>>> {
        let mut reader = self.reader.lock().await;
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}
