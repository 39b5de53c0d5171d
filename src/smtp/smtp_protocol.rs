//! Line transport for the SMTP conversation.
//!
//! Reads newline-terminated lines from the client and writes `<code> <message>`
//! replies terminated with CRLF. Every reply is flushed before the next read so
//! the conversation stays strictly request/response.

use anyhow::{Context, Result};
use log::debug;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Product name shown after the hostname in the greeting banner.
const BANNER_SUFFIX: &str = "SMTP mail-sink";

/// Buffered line I/O over one client connection.
///
/// Generic over the reader and writer so it can run on a `TcpStream` split or
/// on in-memory buffers in tests.
pub struct SmtpProtocol<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    reader: R,
    writer: W,
}

impl<R, W> SmtpProtocol<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        SmtpProtocol { reader, writer }
    }

    /// Sends the `220` banner that opens every conversation.
    pub async fn send_greeting(&mut self, hostname: &str) -> Result<()> {
        self.write_reply(220, &format!("{} {}", hostname, BANNER_SUFFIX))
            .await
    }

    /// Reads one line from the client.
    ///
    /// Returns `None` once the peer has closed the connection. The trailing
    /// CR/LF is stripped. Bytes that are not valid UTF-8 are replaced rather
    /// than failing the session.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        let mut buffer = Vec::new();
        let bytes_read = self
            .reader
            .read_until(b'\n', &mut buffer)
            .await
            .context("Failed to read line from client")?;

        if bytes_read == 0 {
            return Ok(None);
        }

        let line = String::from_utf8_lossy(&buffer)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        debug!("SMTP Read: {:?}", line);
        Ok(Some(line))
    }

    /// Writes `<code> <message>` followed by CRLF and flushes it.
    pub async fn write_reply(&mut self, code: u16, message: &str) -> Result<()> {
        debug!("SMTP Write: {} {}", code, message);
        self.writer
            .write_all(format!("{} {}\r\n", code, message).as_bytes())
            .await
            .context("Failed to write reply to client")?;
        self.writer
            .flush()
            .await
            .context("Failed to flush reply to client")?;
        Ok(())
    }

    /// Flushes and shuts down the write side, signalling end-of-stream to the peer.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer
            .shutdown()
            .await
            .context("Failed to shut down connection")
    }
}
