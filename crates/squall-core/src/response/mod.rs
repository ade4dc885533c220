//! Response writer protocol
//!
//! Static routes are rendered to bytes when the router is built. Dated ones
//! keep a 29-byte hole for the `date` value and go out as one three-span
//! vectored write. Dynamic responses render their head per request.

pub mod dynamic;
pub mod head;
pub mod static_responder;
pub mod template;

pub use dynamic::{Body, DynamicResponse};
pub use head::{Framing, ResponseHead};
pub use static_responder::{
    write_chunks, ChunkError, ChunkSource, ChunkStream, ChunkedTemplate, DatedTemplate,
    StaticResponder,
};
pub use template::{RouteTemplate, StaticBody};

use bytes::Bytes;

/// Value that knows its exact encoded size and can copy itself into a
/// pre-sized buffer.
pub trait BufferWritable {
    fn byte_count(&self) -> usize;

    /// Copy into `buf[*offset..]` and advance `offset`.
    ///
    /// `buf` must have `byte_count()` bytes free after `offset`.
    fn write_into(&self, buf: &mut [u8], offset: &mut usize);

    /// Render into a freshly allocated vector
    fn render(&self) -> Vec<u8> {
        let mut buf = vec![0; self.byte_count()];
        let mut offset = 0;
        self.write_into(&mut buf, &mut offset);
        buf
    }
}

impl BufferWritable for [u8] {
    #[inline]
    fn byte_count(&self) -> usize {
        self.len()
    }

    #[inline]
    fn write_into(&self, buf: &mut [u8], offset: &mut usize) {
        buf[*offset..*offset + self.len()].copy_from_slice(self);
        *offset += self.len();
    }
}

impl<const N: usize> BufferWritable for [u8; N] {
    #[inline]
    fn byte_count(&self) -> usize {
        N
    }

    #[inline]
    fn write_into(&self, buf: &mut [u8], offset: &mut usize) {
        self.as_slice().write_into(buf, offset)
    }
}

impl BufferWritable for str {
    #[inline]
    fn byte_count(&self) -> usize {
        self.len()
    }

    #[inline]
    fn write_into(&self, buf: &mut [u8], offset: &mut usize) {
        self.as_bytes().write_into(buf, offset)
    }
}

impl BufferWritable for String {
    #[inline]
    fn byte_count(&self) -> usize {
        self.len()
    }

    #[inline]
    fn write_into(&self, buf: &mut [u8], offset: &mut usize) {
        self.as_bytes().write_into(buf, offset)
    }
}

impl BufferWritable for Bytes {
    #[inline]
    fn byte_count(&self) -> usize {
        self.len()
    }

    #[inline]
    fn write_into(&self, buf: &mut [u8], offset: &mut usize) {
        self.as_ref().write_into(buf, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_writes() {
        let parts: [&dyn BufferWritable; 4] = [
            &String::from("HTTP/1.1 200\r\n"),
            &Bytes::from_static(b"date: "),
            b"Sun, 06 Nov 1994 08:49:37 GMT",
            &Bytes::from_static(b"\r\n\r\n"),
        ];
        let total: usize = parts.iter().map(|p| p.byte_count()).sum();
        let mut buf = vec![0u8; total];
        let mut offset = 0;
        for part in parts {
            part.write_into(&mut buf, &mut offset);
        }
        assert_eq!(offset, total);
        assert_eq!(
            buf,
            b"HTTP/1.1 200\r\ndate: Sun, 06 Nov 1994 08:49:37 GMT\r\n\r\n"
        );
    }

    #[test]
    fn test_render() {
        assert_eq!("abc".render(), b"abc");
    }
}
