//! Route templates: the declared head and body a route responds with

use super::head::{Framing, ResponseHead};
use super::static_responder::{ChunkSource, ChunkedTemplate, StaticResponder};
use crate::error::MessageError;
use crate::http::{Charset, ContentType, HeaderName, MediaType, StatusCode};
use bytes::{Bytes, BytesMut};
use std::sync::Arc;

/// Body declared for a route
#[derive(Debug, Clone, Default)]
pub enum StaticBody {
    #[default]
    Empty,
    Bytes(Bytes),
    Text(Arc<str>),
    Chunked(ChunkSource),
}

impl StaticBody {
    /// Byte length, `None` for chunked bodies
    pub fn len(&self) -> Option<usize> {
        match self {
            StaticBody::Empty => Some(0),
            StaticBody::Bytes(bytes) => Some(bytes.len()),
            StaticBody::Text(text) => Some(text.len()),
            StaticBody::Chunked(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    fn as_bytes(&self) -> &[u8] {
        match self {
            StaticBody::Bytes(bytes) => bytes,
            StaticBody::Text(text) => text.as_bytes(),
            StaticBody::Empty | StaticBody::Chunked(_) => &[],
        }
    }
}

/// What a static route is rendered from, and what a dynamic route's response
/// starts out as. Static middleware edits it before rendering.
#[derive(Debug, Clone, Default)]
pub struct RouteTemplate {
    pub head: ResponseHead,
    pub body: StaticBody,
    /// Splice a live `date` header into every response
    pub dated: bool,
}

impl RouteTemplate {
    pub fn new(status: StatusCode) -> Self {
        Self {
            head: ResponseHead::new(status),
            body: StaticBody::Empty,
            dated: false,
        }
    }

    /// `text/plain` body
    pub fn text(body: impl Into<Arc<str>>) -> Self {
        Self::new(StatusCode::OK)
            .content_type(MediaType::TextPlain)
            .body(StaticBody::Text(body.into()))
    }

    pub fn html(body: impl Into<Arc<str>>) -> Self {
        Self::new(StatusCode::OK)
            .content_type(ContentType::new(MediaType::TextHtml).with_charset(Charset::Utf8))
            .body(StaticBody::Text(body.into()))
    }

    pub fn json(body: impl Into<Arc<str>>) -> Self {
        Self::new(StatusCode::OK)
            .content_type(MediaType::ApplicationJson)
            .body(StaticBody::Text(body.into()))
    }

    pub fn bytes(media_type: MediaType, body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK)
            .content_type(media_type)
            .body(StaticBody::Bytes(body.into()))
    }

    pub fn chunked(media_type: MediaType, source: ChunkSource) -> Self {
        Self::new(StatusCode::OK)
            .content_type(media_type)
            .body(StaticBody::Chunked(source))
    }

    /// Empty-bodied redirect with a `location` header
    pub fn redirect(location: impl Into<String>, permanent: bool) -> Self {
        let status = if permanent {
            StatusCode::PERMANENT_REDIRECT
        } else {
            StatusCode::TEMPORARY_REDIRECT
        };
        Self::new(status).header(HeaderName::Location, location)
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.head.status = status;
        self
    }

    pub fn content_type(mut self, content_type: impl Into<ContentType>) -> Self {
        self.head.content_type = Some(content_type.into());
        self
    }

    pub fn header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.head.append_header(name, value);
        self
    }

    pub fn cookie(mut self, cookie: crate::http::Cookie) -> Self {
        self.head.cookies.push(cookie);
        self
    }

    pub fn body(mut self, body: StaticBody) -> Self {
        self.body = body;
        self
    }

    pub fn dated(mut self, dated: bool) -> Self {
        self.dated = dated;
        self
    }

    /// Render into the responder variant matching the body and date mode
    pub fn compile(&self) -> Result<StaticResponder, MessageError> {
        self.head.validate()?;

        if let StaticBody::Chunked(source) = &self.body {
            if !self.head.status.allows_body() {
                return Err(MessageError::BodyNotAllowed {
                    status: self.head.status.as_u16(),
                });
            }
            return Ok(StaticResponder::Chunked(ChunkedTemplate {
                head: self.head.render(Framing::Chunked, self.dated),
                dated: self.dated,
                source: source.clone(),
            }));
        }

        let body = self.body.as_bytes();
        let framing = self.head.framing_for(body.len())?;
        let mut rendered = self.head.render(framing, self.dated);

        if self.dated {
            let mut after = BytesMut::from(&rendered.after[..]);
            after.extend_from_slice(body);
            rendered.after = after.freeze();
            return Ok(match self.body {
                StaticBody::Text(_) => StaticResponder::TextWithDate(rendered),
                _ => StaticResponder::BytesWithDate(rendered),
            });
        }

        let mut full = BytesMut::from(&rendered.before[..]);
        full.extend_from_slice(body);
        let full = full.freeze();
        Ok(match self.body {
            StaticBody::Text(_) => match std::str::from_utf8(&full) {
                Ok(text) => StaticResponder::Text(Arc::from(text)),
                Err(_) => StaticResponder::Bytes(full),
            },
            _ => StaticResponder::Bytes(full),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::DateHeaderCache;
    use std::time::UNIX_EPOCH;

    fn render(responder: &StaticResponder) -> Vec<u8> {
        let date = DateHeaderCache::at(UNIX_EPOCH).snapshot();
        let mut buf = vec![0u8; responder.byte_count()];
        let mut offset = 0;
        responder.write_into(&mut buf, &mut offset, &date);
        buf
    }

    #[test]
    fn test_text_undated() {
        let responder = RouteTemplate::text("hi").compile().unwrap();
        assert!(matches!(responder, StaticResponder::Text(_)));
        assert_eq!(
            render(&responder),
            b"HTTP/1.1 200\r\ncontent-type: text/plain\r\ncontent-length: 2\r\n\r\nhi"
        );
    }

    #[test]
    fn test_text_dated() {
        let responder = RouteTemplate::text("hi").dated(true).compile().unwrap();
        assert!(matches!(responder, StaticResponder::TextWithDate(_)));
        assert_eq!(
            render(&responder),
            b"HTTP/1.1 200\r\ndate: Thu, 01 Jan 1970 00:00:00 GMT\r\ncontent-type: text/plain\r\ncontent-length: 2\r\n\r\nhi".to_vec()
        );
    }

    #[test]
    fn test_bytes_dated() {
        let responder = RouteTemplate::bytes(MediaType::ImagePng, vec![0x89, b'P'])
            .dated(true)
            .compile()
            .unwrap();
        assert!(matches!(responder, StaticResponder::BytesWithDate(_)));
        assert!(render(&responder).ends_with(b"content-length: 2\r\n\r\n\x89P"));
    }

    #[test]
    fn test_content_length_matches_body() {
        let body = "x".repeat(1000);
        let responder = RouteTemplate::text(body.as_str()).compile().unwrap();
        let out = render(&responder);
        let text = String::from_utf8(out).unwrap();
        let (head, rest) = text.split_once("\r\n\r\n").unwrap();
        assert!(head.contains("content-length: 1000"));
        assert_eq!(rest.len(), 1000);
    }

    #[test]
    fn test_no_body_status() {
        let responder = RouteTemplate::new(StatusCode::NO_CONTENT).compile().unwrap();
        assert_eq!(render(&responder), b"HTTP/1.1 204\r\n\r\n");

        let err = RouteTemplate::text("x")
            .status(StatusCode::NOT_MODIFIED)
            .compile()
            .unwrap_err();
        assert_eq!(err, MessageError::BodyNotAllowed { status: 304 });
    }

    #[test]
    fn test_redirect() {
        let responder = RouteTemplate::redirect("/new", true).compile().unwrap();
        assert_eq!(
            render(&responder),
            b"HTTP/1.1 308\r\nlocation: /new\r\ncontent-length: 0\r\n\r\n"
        );
    }

    #[test]
    fn test_chunked() {
        let responder = RouteTemplate::chunked(MediaType::TextPlain, ChunkSource::from_chunks([]))
            .compile()
            .unwrap();
        assert!(responder.is_chunked());
        assert_eq!(
            render(&responder),
            b"HTTP/1.1 200\r\ncontent-type: text/plain\r\ntransfer-encoding: chunked\r\n\r\n"
        );
    }

    #[test]
    fn test_invalid_header_rejected() {
        let err = RouteTemplate::text("x")
            .header(HeaderName::Server, "bad\r\nvalue")
            .compile()
            .unwrap_err();
        assert!(matches!(err, MessageError::InvalidHeaderValue { .. }));
    }
}
