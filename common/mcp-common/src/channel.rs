//! Newline-delimited JSON message channel
//!
//! One message per line. Lines that are blank, oversized or do not parse as
//! a request are skipped so a single bad line never tears down the
//! connection.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::protocol::{RpcRequest, RpcResponse};

/// Default ceiling on a single message line
pub const DEFAULT_MAX_LINE_BYTES: usize = 32 * 1024 * 1024;

pub struct MessageChannel<R, W> {
    reader: BufReader<R>,
    writer: W,
    line: Vec<u8>,
    max_line_bytes: usize,
}

impl<R, W> MessageChannel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            line: Vec::new(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    /// Override the line ceiling; longer lines are discarded unparsed
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Read the next well-formed request, or `None` at end of stream
    pub async fn read(&mut self) -> std::io::Result<Option<RpcRequest>> {
        loop {
            self.line.clear();
            let limit = self.max_line_bytes as u64 + 1;
            let n = (&mut self.reader)
                .take(limit)
                .read_until(b'\n', &mut self.line)
                .await?;
            if n == 0 {
                return Ok(None);
            }

            if self.line.len() > self.max_line_bytes && self.line.last() != Some(&b'\n') {
                let skipped = n + self.discard_rest_of_line().await?;
                tracing::warn!(
                    bytes = skipped,
                    max = self.max_line_bytes,
                    "Skipping oversized message line"
                );
                continue;
            }

            let text = String::from_utf8_lossy(&self.line);
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<RpcRequest>(trimmed) {
                Ok(request) => return Ok(Some(request)),
                Err(e) => {
                    tracing::warn!(error = %e, bytes = n, "Skipping malformed message line");
                }
            }
        }
    }

    /// Consume input up to and including the next newline without buffering it
    async fn discard_rest_of_line(&mut self) -> std::io::Result<usize> {
        let mut discarded = 0;
        loop {
            let (newline, available) = {
                let buf = self.reader.fill_buf().await?;
                (buf.iter().position(|b| *b == b'\n'), buf.len())
            };
            match newline {
                Some(i) => {
                    self.reader.consume(i + 1);
                    return Ok(discarded + i + 1);
                }
                None if available == 0 => return Ok(discarded),
                None => {
                    self.reader.consume(available);
                    discarded += available;
                }
            }
        }
    }

    /// Write one response as a single line and flush it
    pub async fn write(&mut self, response: &RpcResponse) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(response)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}
