use super::{Transport, TransportError, decode};
use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout,
};
use tracing::{debug, warn};

/// Largest body accepted from a `Content-Length` header
pub const MAX_MESSAGE_BYTES: usize = 32 * 1024 * 1024;

/// `Content-Length` framed transport over a byte stream.
///
/// Each message is a header block ended by an empty line, followed by
/// exactly `Content-Length` bytes of UTF-8 JSON. When a header block carries
/// no `Content-Length`, the next line is read as the message instead.
#[derive(Debug)]
pub struct StreamTransport<R, W> {
    reader: BufReader<R>,
    writer: W,
    closed: bool,
}

impl StreamTransport<Stdin, Stdout> {
    /// Transport over the process's standard input and output
    #[inline]
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    #[inline]
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            closed: false,
        }
    }

    #[inline]
    pub fn into_parts(self) -> (R, W) {
        (self.reader.into_inner(), self.writer)
    }

    /// Read one line, mapping undecodable bytes to a parse error
    async fn read_line(&mut self, line: &mut String) -> Result<usize, TransportError> {
        line.clear();
        match self.reader.read_line(line).await {
            Ok(read) => Ok(read),
            Err(e) if e.kind() == ErrorKind::InvalidData => Err(TransportError::Parse {
                message: format!("Header is not valid UTF-8: {}", e),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_message(&mut self) -> Result<Option<Value>, TransportError> {
        let mut content_length = None;
        let mut line = String::new();

        loop {
            if self.read_line(&mut line).await? == 0 {
                return Ok(None);
            }
            let header = line.trim();
            if header.is_empty() {
                break;
            }
            let Some((name, value)) = header.split_once(':') else {
                continue;
            };
            if name.trim().eq_ignore_ascii_case("content-length") {
                let length = value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| TransportError::Parse {
                        message: format!("Invalid Content-Length header: {}", value.trim()),
                    })?;
                content_length = Some(length);
            }
        }

        let Some(length) = content_length else {
            debug!("No Content-Length header, reading next line as the message");
            if self.read_line(&mut line).await? == 0 {
                return Ok(None);
            }
            return decode(line.trim_end().as_bytes()).map(Some);
        };

        if length > MAX_MESSAGE_BYTES {
            // Consume the oversized body so the next header starts cleanly.
            let mut body = (&mut self.reader).take(length as u64);
            let drained = tokio::io::copy(&mut body, &mut tokio::io::sink()).await?;
            if drained < length as u64 {
                warn!("Stream closed before the full message body arrived");
                return Ok(None);
            }
            return Err(TransportError::Parse {
                message: format!(
                    "Message of {} bytes exceeds the {} byte limit",
                    length, MAX_MESSAGE_BYTES
                ),
            });
        }

        let mut body = vec![0_u8; length];
        match self.reader.read_exact(&mut body).await {
            Ok(_) => decode(&body).map(Some),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                warn!("Stream closed before the full message body arrived");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    #[inline]
    async fn send(&mut self, message: &Value) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let body = serde_json::to_vec(message)?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        self.writer.write_all(header.as_bytes()).await?;
        self.writer.write_all(&body).await?;
        self.writer.flush().await?;
        Ok(())
    }

    #[inline]
    async fn receive(&mut self) -> Result<Option<Value>, TransportError> {
        if self.closed {
            return Ok(None);
        }
        self.read_message().await
    }

    #[inline]
    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer.shutdown().await?;
        Ok(())
    }

    #[inline]
    fn is_closed(&self) -> bool {
        self.closed
    }
}
