//! Connection socket used by responders

use crate::error::SocketError;
use bytes::BytesMut;
use std::io::IoSlice;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Byte stream a responder reads the request from and writes its response to.
///
/// Wraps `TcpStream` in the server and `DuplexStream` in tests.
#[derive(Debug)]
pub struct Socket<S> {
    stream: S,
    bytes_written: u64,
}

impl<S> Socket<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            bytes_written: 0,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Total bytes written through this socket
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Read whatever is available into `buf`. `Ok(0)` means EOF.
    pub async fn read(&mut self, buf: &mut BytesMut) -> Result<usize, SocketError> {
        Ok(self.stream.read_buf(buf).await?)
    }

    /// Write all of `buf`, retrying partial writes
    pub async fn write_buffer(&mut self, buf: &[u8]) -> Result<(), SocketError> {
        self.stream.write_all(buf).await?;
        self.bytes_written += buf.len() as u64;
        Ok(())
    }

    /// Scatter-gather write of every slice, advancing across partial writes
    pub async fn write_vectored(&mut self, slices: &mut [IoSlice<'_>]) -> Result<(), SocketError> {
        let mut remaining = slices;
        IoSlice::advance_slices(&mut remaining, 0);
        while !remaining.is_empty() {
            let n = self.stream.write_vectored(remaining).await?;
            if n == 0 {
                return Err(SocketError::Closed);
            }
            self.bytes_written += n as u64;
            IoSlice::advance_slices(&mut remaining, n);
        }
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), SocketError> {
        Ok(self.stream.flush().await?)
    }

    /// Flush and shut down the write half
    pub async fn close(&mut self) -> Result<(), SocketError> {
        self.stream.flush().await?;
        Ok(self.stream.shutdown().await?)
    }
}
