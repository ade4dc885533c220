//! Pre-rendered responses for static routes

use super::BufferWritable;
use crate::date::{DateHeaderCache, DateSnapshot, DATE_LEN};
use crate::error::ResponderError;
use crate::socket::Socket;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::fmt;
use std::io::IoSlice;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// Error a chunk source can yield
pub type ChunkError = Box<dyn std::error::Error + Send + Sync>;

/// Body chunks in write order
pub type ChunkStream = BoxStream<'static, Result<Bytes, ChunkError>>;

/// Opens a fresh chunk stream for every response
#[derive(Clone)]
pub struct ChunkSource {
    open: Arc<dyn Fn() -> ChunkStream + Send + Sync>,
}

impl ChunkSource {
    pub fn new<F>(open: F) -> Self
    where
        F: Fn() -> ChunkStream + Send + Sync + 'static,
    {
        Self {
            open: Arc::new(open),
        }
    }

    /// Replays the same chunks on every response
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
    {
        let chunks: Arc<[Bytes]> = chunks.into_iter().collect();
        Self::new(move || {
            let chunks = chunks.clone();
            stream::iter((0..chunks.len()).map(move |i| Ok(chunks[i].clone()))).boxed()
        })
    }

    pub fn open(&self) -> ChunkStream {
        (self.open)()
    }
}

impl fmt::Debug for ChunkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChunkSource")
    }
}

/// Rendered head and body with a hole for the date value between the spans
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedTemplate {
    pub before: Bytes,
    pub after: Bytes,
}

impl DatedTemplate {
    pub fn new(before: Bytes, after: Bytes) -> Self {
        Self { before, after }
    }

    pub fn byte_count(&self) -> usize {
        self.before.len() + DATE_LEN + self.after.len()
    }

    pub fn write_into(&self, buf: &mut [u8], offset: &mut usize, date: &DateSnapshot) {
        self.before.write_into(buf, offset);
        date.write_into(buf, offset);
        self.after.write_into(buf, offset);
    }

    /// before, date, after in one vectored write
    pub async fn write<S>(&self, socket: &mut Socket<S>, date: &DateSnapshot) -> Result<(), ResponderError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut slices = [
            IoSlice::new(&self.before),
            IoSlice::new(date),
            IoSlice::new(&self.after),
        ];
        Ok(socket.write_vectored(&mut slices).await?)
    }

    /// Both spans, no date
    async fn write_undated<S>(&self, socket: &mut Socket<S>) -> Result<(), ResponderError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut slices = [IoSlice::new(&self.before), IoSlice::new(&self.after)];
        Ok(socket.write_vectored(&mut slices).await?)
    }
}

/// Chunked response: a rendered head followed by framed chunks
#[derive(Debug, Clone)]
pub struct ChunkedTemplate {
    pub head: DatedTemplate,
    pub dated: bool,
    pub source: ChunkSource,
}

/// Response for a static route, chosen when the router is built
#[derive(Debug, Clone)]
pub enum StaticResponder {
    /// Complete response bytes
    Bytes(Bytes),
    /// Complete response with a UTF-8 body
    Text(Arc<str>),
    /// Text response with a live `date` header
    TextWithDate(DatedTemplate),
    /// Binary response with a live `date` header
    BytesWithDate(DatedTemplate),
    Chunked(ChunkedTemplate),
}

impl StaticResponder {
    /// Exact wire size; for chunked responses the head only
    pub fn byte_count(&self) -> usize {
        match self {
            StaticResponder::Bytes(bytes) => bytes.len(),
            StaticResponder::Text(text) => text.len(),
            StaticResponder::TextWithDate(t) | StaticResponder::BytesWithDate(t) => t.byte_count(),
            StaticResponder::Chunked(c) if c.dated => c.head.byte_count(),
            StaticResponder::Chunked(c) => c.head.before.len() + c.head.after.len(),
        }
    }

    /// Copy the response (head only for chunked) into `buf`
    pub fn write_into(&self, buf: &mut [u8], offset: &mut usize, date: &DateSnapshot) {
        match self {
            StaticResponder::Bytes(bytes) => bytes.write_into(buf, offset),
            StaticResponder::Text(text) => text.as_bytes().write_into(buf, offset),
            StaticResponder::TextWithDate(t) | StaticResponder::BytesWithDate(t) => {
                t.write_into(buf, offset, date)
            }
            StaticResponder::Chunked(c) if c.dated => c.head.write_into(buf, offset, date),
            StaticResponder::Chunked(c) => {
                c.head.before.write_into(buf, offset);
                c.head.after.write_into(buf, offset);
            }
        }
    }

    pub fn is_dated(&self) -> bool {
        match self {
            StaticResponder::TextWithDate(_) | StaticResponder::BytesWithDate(_) => true,
            StaticResponder::Chunked(c) => c.dated,
            StaticResponder::Bytes(_) | StaticResponder::Text(_) => false,
        }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self, StaticResponder::Chunked(_))
    }

    /// Write the full response to `socket`
    pub async fn respond<S>(&self, socket: &mut Socket<S>, dates: &DateHeaderCache) -> Result<(), ResponderError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        match self {
            StaticResponder::Bytes(bytes) => Ok(socket.write_buffer(bytes).await?),
            StaticResponder::Text(text) => Ok(socket.write_buffer(text.as_bytes()).await?),
            StaticResponder::TextWithDate(t) | StaticResponder::BytesWithDate(t) => {
                let date = dates.snapshot();
                t.write(socket, &date).await
            }
            StaticResponder::Chunked(c) => {
                if c.dated {
                    let date = dates.snapshot();
                    c.head.write(socket, &date).await?;
                } else {
                    c.head.write_undated(socket).await?;
                }
                write_chunks(socket, c.source.open()).await
            }
        }
    }
}

/// Frame each chunk as `hex(len)\r\n<bytes>\r\n`, then the `0\r\n\r\n` trailer.
///
/// Empty chunks are skipped since one would end the body early.
pub async fn write_chunks<S>(socket: &mut Socket<S>, mut chunks: ChunkStream) -> Result<(), ResponderError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| ResponderError::Stream(e.to_string()))?;
        if chunk.is_empty() {
            continue;
        }
        let size = format!("{:x}\r\n", chunk.len());
        let mut slices = [
            IoSlice::new(size.as_bytes()),
            IoSlice::new(&chunk),
            IoSlice::new(b"\r\n"),
        ];
        socket.write_vectored(&mut slices).await?;
    }
    Ok(socket.write_buffer(b"0\r\n\r\n").await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};
    use tokio::io::{duplex, AsyncReadExt};

    async fn capture<F, Fut>(write: F) -> Vec<u8>
    where
        F: FnOnce(Socket<tokio::io::DuplexStream>) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let (mut client, server) = duplex(1024);
        let reader = tokio::spawn(async move {
            let mut out = Vec::new();
            client.read_to_end(&mut out).await.unwrap();
            out
        });
        write(Socket::new(server)).await;
        reader.await.unwrap()
    }

    fn fixed_dates() -> DateHeaderCache {
        DateHeaderCache::at(UNIX_EPOCH + Duration::from_secs(784111777))
    }

    #[tokio::test]
    async fn test_dated_template_splices_date() {
        let template = DatedTemplate::new(
            Bytes::from_static(b"HTTP/1.1 200\r\ndate: "),
            Bytes::from_static(b"\r\ncontent-length: 2\r\n\r\nhi"),
        );
        let responder = StaticResponder::TextWithDate(template);
        let dates = fixed_dates();

        let expected: &[u8] =
            b"HTTP/1.1 200\r\ndate: Sun, 06 Nov 1994 08:49:37 GMT\r\ncontent-length: 2\r\n\r\nhi";
        assert_eq!(responder.byte_count(), expected.len());

        let mut buf = vec![0u8; responder.byte_count()];
        let mut offset = 0;
        responder.write_into(&mut buf, &mut offset, &dates.snapshot());
        assert_eq!(buf, expected);

        let written = capture(|mut socket| async move {
            responder.respond(&mut socket, &dates).await.unwrap();
            socket.close().await.unwrap();
        })
        .await;
        assert_eq!(written, expected);
    }

    #[tokio::test]
    async fn test_plain_bytes() {
        let responder = StaticResponder::Bytes(Bytes::from_static(b"HTTP/1.1 204\r\n\r\n"));
        assert!(!responder.is_dated());
        let written = capture(|mut socket| async move {
            responder.respond(&mut socket, &fixed_dates()).await.unwrap();
            socket.close().await.unwrap();
        })
        .await;
        assert_eq!(written, b"HTTP/1.1 204\r\n\r\n");
    }

    #[tokio::test]
    async fn test_chunked_framing() {
        let responder = StaticResponder::Chunked(ChunkedTemplate {
            head: DatedTemplate::new(
                Bytes::from_static(b"HTTP/1.1 200\r\ntransfer-encoding: chunked\r\n\r\n"),
                Bytes::new(),
            ),
            dated: false,
            source: ChunkSource::from_chunks([
                Bytes::from_static(b"hello "),
                Bytes::new(),
                Bytes::from_static(b"chunked world!"),
            ]),
        });
        assert!(responder.is_chunked());

        let expected: &[u8] = b"HTTP/1.1 200\r\ntransfer-encoding: chunked\r\n\r\n6\r\nhello \r\ne\r\nchunked world!\r\n0\r\n\r\n";
        for _ in 0..2 {
            let responder = responder.clone();
            let written = capture(|mut socket| async move {
                responder.respond(&mut socket, &fixed_dates()).await.unwrap();
                socket.close().await.unwrap();
            })
            .await;
            assert_eq!(written, expected);
        }
    }

    #[tokio::test]
    async fn test_chunk_source_error() {
        let source = ChunkSource::new(|| {
            stream::iter(vec![
                Ok(Bytes::from_static(b"partial")),
                Err::<Bytes, ChunkError>("disk gone".into()),
            ])
            .boxed()
        });
        let written = capture(|mut socket| async move {
            let err = write_chunks(&mut socket, source.open()).await.unwrap_err();
            assert!(matches!(err, ResponderError::Stream(ref m) if m == "disk gone"));
            socket.close().await.unwrap();
        })
        .await;
        assert_eq!(written, b"7\r\npartial\r\n");
    }
}
