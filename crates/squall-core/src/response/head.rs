//! Status line and header block rendering

use super::static_responder::DatedTemplate;
use crate::error::MessageError;
use crate::http::{validate_header_value, ContentType, Cookie, HeaderName, HttpVersion, StatusCode};
use bytes::{BufMut, BytesMut};
use smallvec::SmallVec;

/// How the body length is announced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `content-length: n`
    Length(usize),
    /// `transfer-encoding: chunked`
    Chunked,
    /// No framing header (statuses without a body)
    None,
}

/// Everything before the body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub version: HttpVersion,
    pub status: StatusCode,
    pub content_type: Option<ContentType>,
    /// Headers (stack-allocated for small header counts)
    pub headers: SmallVec<[(HeaderName, String); 8]>,
    pub cookies: SmallVec<[Cookie; 2]>,
}

impl ResponseHead {
    pub fn new(status: StatusCode) -> Self {
        Self {
            version: HttpVersion::Http11,
            status,
            content_type: None,
            headers: SmallVec::new(),
            cookies: SmallVec::new(),
        }
    }

    pub fn version(mut self, version: HttpVersion) -> Self {
        self.version = version;
        self
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn content_type(mut self, content_type: impl Into<ContentType>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Append a header
    pub fn header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn cookie(mut self, cookie: Cookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// Replace every header with this name by a single value
    pub fn set_header(&mut self, name: HeaderName, value: impl Into<String>) {
        self.headers.retain(|(n, _)| *n != name);
        self.headers.push((name, value.into()));
    }

    pub fn append_header(&mut self, name: HeaderName, value: impl Into<String>) {
        self.headers.push((name, value.into()));
    }

    pub fn remove_header(&mut self, name: &HeaderName) {
        self.headers.retain(|(n, _)| n != name);
    }

    pub fn get_header(&self, name: &HeaderName) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Reject values that would corrupt the wire format
    pub fn validate(&self) -> Result<(), MessageError> {
        for (name, value) in &self.headers {
            if name.is_framing() || *name == HeaderName::ContentType || *name == HeaderName::SetCookie {
                return Err(MessageError::InvalidHeaderName(name.as_str().to_string()));
            }
            validate_header_value(name, value)?;
        }
        for cookie in &self.cookies {
            cookie.validate()?;
        }
        Ok(())
    }

    /// Render the head split around an optional `date` value.
    ///
    /// With `dated`, `before` ends with `date: ` and `after` starts with the
    /// line break that closes it. Without, `after` is empty.
    pub fn render(&self, framing: Framing, dated: bool) -> DatedTemplate {
        let mut out = BytesMut::with_capacity(128 + self.headers.len() * 32);
        out.put_slice(&self.status.status_line_bytes(self.version));

        let before = if dated {
            out.put_slice(b"date: ");
            let before = out.split().freeze();
            out.put_slice(b"\r\n");
            Some(before)
        } else {
            None
        };

        for (name, value) in &self.headers {
            put_header(&mut out, name.as_str(), value);
        }
        for cookie in &self.cookies {
            put_header(&mut out, "set-cookie", &cookie.to_header_value());
        }
        if let Some(content_type) = self.content_type {
            put_header(&mut out, "content-type", &content_type.to_string());
        }
        match framing {
            Framing::Length(len) => {
                out.put_slice(b"content-length: ");
                out.put_slice(len.to_string().as_bytes());
                out.put_slice(b"\r\n");
            }
            Framing::Chunked => out.put_slice(b"transfer-encoding: chunked\r\n"),
            Framing::None => {}
        }
        out.put_slice(b"\r\n");

        match before {
            Some(before) => DatedTemplate::new(before, out.freeze()),
            None => DatedTemplate::new(out.freeze(), bytes::Bytes::new()),
        }
    }

    /// Framing for a body of `len` bytes under this status
    pub fn framing_for(&self, len: usize) -> Result<Framing, MessageError> {
        if self.status.allows_body() {
            Ok(Framing::Length(len))
        } else if len == 0 {
            Ok(Framing::None)
        } else {
            Err(MessageError::BodyNotAllowed {
                status: self.status.as_u16(),
            })
        }
    }
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

fn put_header(out: &mut BytesMut, name: &str, value: &str) {
    out.put_slice(name.as_bytes());
    out.put_slice(b": ");
    out.put_slice(value.as_bytes());
    out.put_slice(b"\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Charset, MediaType};

    #[test]
    fn test_render_undated() {
        let head = ResponseHead::new(StatusCode::OK)
            .header(HeaderName::Server, "squall")
            .content_type(MediaType::TextPlain);
        let rendered = head.render(Framing::Length(2), false);
        assert_eq!(
            &rendered.before[..],
            b"HTTP/1.1 200\r\nserver: squall\r\ncontent-type: text/plain\r\ncontent-length: 2\r\n\r\n"
        );
        assert!(rendered.after.is_empty());
    }

    #[test]
    fn test_render_dated_splits_around_date() {
        let head = ResponseHead::new(StatusCode::NOT_FOUND).content_type(
            ContentType::new(MediaType::TextHtml).with_charset(Charset::Utf8),
        );
        let rendered = head.render(Framing::Length(0), true);
        assert_eq!(&rendered.before[..], b"HTTP/1.1 404\r\ndate: ");
        assert_eq!(
            &rendered.after[..],
            b"\r\ncontent-type: text/html; charset=utf-8\r\ncontent-length: 0\r\n\r\n"
        );
    }

    #[test]
    fn test_render_chunked_and_cookies() {
        let head = ResponseHead::new(StatusCode::OK)
            .version(HttpVersion::Http10)
            .cookie(Cookie::new("id", "7").path("/"));
        let rendered = head.render(Framing::Chunked, false);
        assert_eq!(
            &rendered.before[..],
            b"HTTP/1.0 200\r\nset-cookie: id=7; Path=/\r\ntransfer-encoding: chunked\r\n\r\n"
        );
    }

    #[test]
    fn test_set_header_replaces() {
        let mut head = ResponseHead::default()
            .header(HeaderName::CacheControl, "no-cache")
            .header(HeaderName::CacheControl, "no-store");
        head.set_header(HeaderName::CacheControl, "max-age=60");
        assert_eq!(head.headers.len(), 1);
        assert_eq!(head.get_header(&HeaderName::CacheControl), Some("max-age=60"));
    }

    #[test]
    fn test_validate() {
        assert!(ResponseHead::default()
            .header(HeaderName::Server, "ok")
            .validate()
            .is_ok());
        assert_eq!(
            ResponseHead::default()
                .header(HeaderName::ContentLength, "3")
                .validate(),
            Err(MessageError::InvalidHeaderName("content-length".to_string()))
        );
        assert!(matches!(
            ResponseHead::default()
                .header(HeaderName::Server, "a\nb")
                .validate(),
            Err(MessageError::InvalidHeaderValue { .. })
        ));
        assert!(matches!(
            ResponseHead::default().cookie(Cookie::new("", "x")).validate(),
            Err(MessageError::Cookie(_))
        ));
    }

    #[test]
    fn test_framing_for_no_body_status() {
        let head = ResponseHead::new(StatusCode::NO_CONTENT);
        assert_eq!(head.framing_for(0), Ok(Framing::None));
        assert_eq!(
            head.framing_for(3),
            Err(MessageError::BodyNotAllowed { status: 204 })
        );
        assert_eq!(ResponseHead::default().framing_for(3), Ok(Framing::Length(3)));
    }
}
