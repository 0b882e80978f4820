//! Framing: one JSON message per `\n`-terminated line over a pair of pipes.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::{Request, Response, ResponseKind, decode_one_of};
use crate::error::AdapterError;

/// Both ends of a conversation with one agent.
///
/// Generic over the streams so the framing can be exercised against an
/// in-memory duplex as well as real child process pipes.
#[derive(Debug)]
pub struct MessageChannel<R, W> {
    reader: R,
    writer: W,
    read_timeout: Option<Duration>,
}

impl<R, W> MessageChannel<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            read_timeout: None,
        }
    }

    /// Fail reads that wait longer than `timeout` for a complete line.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Serialize `request` and write it as a single line.
    pub async fn send(&mut self, request: &Request) -> Result<(), AdapterError> {
        let mut buf = serde_json::to_vec(request)?;
        buf.push(b'\n');
        debug!(event = request.event(), bytes = buf.len(), "sending message to agent");
        self.writer.write_all(&buf).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read the next line, without its terminator.
    pub async fn read_line(&mut self) -> Result<String, AdapterError> {
        let mut line = String::new();
        let read = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, self.reader.read_line(&mut line))
                .await
                .map_err(|_| AdapterError::Timeout(limit))??,
            None => self.reader.read_line(&mut line).await?,
        };
        if read == 0 {
            return Err(AdapterError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "agent closed its output",
            )));
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        debug!(line = %line, "received message from agent");
        Ok(line)
    }

    /// Read exactly one line and decode it as the first acceptable candidate.
    pub async fn read_one_of(
        &mut self,
        candidates: &[ResponseKind],
    ) -> Result<(usize, Response), AdapterError> {
        let line = self.read_line().await?;
        decode_one_of(&line, candidates)
    }

    /// Send `request` and, when `expect` is given, read exactly one response
    /// of that shape.
    pub async fn exchange(
        &mut self,
        request: &Request,
        expect: Option<ResponseKind>,
    ) -> Result<Option<Response>, AdapterError> {
        self.send(request).await?;
        match expect {
            Some(kind) => {
                let (_, response) = self.read_one_of(&[kind]).await?;
                Ok(Some(response))
            }
            None => Ok(None),
        }
    }

    /// Give back the underlying streams.
    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }
}
