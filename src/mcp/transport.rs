//! Newline-delimited JSON-RPC transport.
//!
//! This module implements the stdio transport as specified by MCP:
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from client
//! - stdout: sends messages to client
//! - stderr: may be used for logging (not MCP messages)
//!
//! Reader and writer are separate halves. Requests complete out of order, so
//! every response goes through one writer task fed by a channel; that keeps
//! lines from interleaving. Both halves are generic so tests can drive a
//! session over an in-memory pipe.

use std::io;
use std::string::FromUtf8Error;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::mcp::protocol::OutgoingMessage;

/// Reads one message per line.
pub struct MessageReader<R> {
    reader: R,
}

impl<R: AsyncBufRead + Unpin> MessageReader<R> {
    /// Wraps a buffered reader.
    pub const fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads the next message line.
    ///
    /// Returns `None` if the input is closed (EOF).
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the line is not valid UTF-8.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        match self.read_frame().await? {
            Some(frame) => frame
                .map(Some)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            None => Ok(None),
        }
    }

    /// Reads the next line as raw bytes and decodes it separately.
    ///
    /// The outer result carries I/O failures only. A line that is not valid
    /// UTF-8 is still consumed and comes back as the inner error, so the
    /// caller can reject it and keep reading.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn read_frame(&mut self) -> io::Result<Option<Result<String, FromUtf8Error>>> {
        let mut bytes = Vec::new();
        let bytes_read = self.reader.read_until(b'\n', &mut bytes).await?;

        if bytes_read == 0 {
            return Ok(None);
        }

        while matches!(bytes.last(), Some(b'\n' | b'\r')) {
            bytes.pop();
        }
        Ok(Some(String::from_utf8(bytes)))
    }
}

/// Writes one message per line.
pub struct MessageWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    /// Wraps an async writer.
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Serialises and writes a message, newline-terminated.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_message(&mut self, message: &OutgoingMessage) -> io::Result<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        // MCP spec: messages must not contain embedded newlines
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}

/// Reader half bound to stdin.
pub type StdinReader = MessageReader<BufReader<tokio::io::Stdin>>;

/// Writer half bound to stdout.
pub type StdoutWriter = MessageWriter<tokio::io::Stdout>;

/// Creates the stdio transport halves.
#[must_use]
pub fn stdio() -> (StdinReader, StdoutWriter) {
    (
        MessageReader::new(BufReader::new(tokio::io::stdin())),
        MessageWriter::new(tokio::io::stdout()),
    )
}

/// Spawns the task that owns the writer.
///
/// The task ends once every sender has been dropped and the queue is empty,
/// or on the first write error.
pub fn spawn_writer<W>(
    mut writer: MessageWriter<W>,
    mut outgoing: mpsc::UnboundedReceiver<OutgoingMessage>,
) -> JoinHandle<io::Result<()>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(message) = outgoing.recv().await {
            if let Err(e) = writer.write_message(&message).await {
                tracing::error!(error = %e, "Failed to write response");
                return Err(e);
            }
        }
        Ok(())
    })
}
