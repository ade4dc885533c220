//! Parsed request view
//!
//! A `Request` is a set of offsets over the `Bytes` the connection read, so
//! cloning one is a handful of refcount bumps. The canonical start line used
//! for route lookup is `METHOD SP path SP version` with the query removed.

use crate::http::{parse_cookie_header, HttpVersion, Method};
use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use memchr::memmem;
use once_cell::sync::OnceCell;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::ops::Range;

/// Header lines accepted per request
pub const MAX_HEADERS: usize = 64;

/// Path segments accepted per request
pub const MAX_PATH_COMPONENTS: usize = 32;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// HTTP Request
#[derive(Debug, Clone)]
pub struct Request {
    raw: Bytes,
    method: Method,
    version: HttpVersion,
    start_line: Bytes,
    start_line_lowercased: OnceCell<Bytes>,
    path: Range<usize>,
    query: Option<Range<usize>>,
    segments: SmallVec<[Range<usize>; 8]>,
    headers: SmallVec<[(Range<usize>, Range<usize>); 16]>,
    head_len: usize,
}

impl Request {
    /// Parse a request head from the bytes read so far.
    ///
    /// Returns `Ok(None)` while the head (`\r\n\r\n`) is incomplete.
    pub fn parse(raw: Bytes) -> Result<Option<Self>> {
        let Some(head_end) = memmem::find(&raw, HEAD_TERMINATOR) else {
            return Ok(None);
        };
        let head_len = head_end + HEAD_TERMINATOR.len();

        let line_end = memmem::find(&raw[..head_end + 2], b"\r\n").unwrap_or(head_end);
        let line = &raw[..line_end];

        let method_end = memchr::memchr(b' ', line)
            .ok_or_else(|| Error::Parse("request line has no target".to_string()))?;
        let method = Method::parse(&line[..method_end]).ok_or_else(|| {
            Error::InvalidMethod(String::from_utf8_lossy(&line[..method_end]).into_owned())
        })?;

        let target_start = method_end + 1;
        let target_len = memchr::memchr(b' ', &line[target_start..])
            .ok_or_else(|| Error::Parse("request line has no version".to_string()))?;
        let target_end = target_start + target_len;
        let version = HttpVersion::parse(&line[target_end + 1..]).ok_or_else(|| {
            Error::Parse(format!(
                "unsupported version {:?}",
                String::from_utf8_lossy(&line[target_end + 1..])
            ))
        })?;

        let target = &line[target_start..target_end];
        if target.is_empty() || !(target[0] == b'/' || target == b"*") {
            return Err(Error::Parse("request target must be an origin path".to_string()));
        }
        if target.iter().any(|b| b.is_ascii_control()) {
            return Err(Error::Parse("control character in request target".to_string()));
        }

        // Fragments never reach the server, strip one if a client sends it
        let target_end = memchr::memchr(b'#', target).map_or(target_end, |i| target_start + i);
        let (path, query) = match memchr::memchr(b'?', &raw[target_start..target_end]) {
            Some(i) => (
                target_start..target_start + i,
                Some(target_start + i + 1..target_end),
            ),
            None => (target_start..target_end, None),
        };

        let mut segments = SmallVec::new();
        let mut offset = path.start;
        for segment in raw[path.clone()].split(|b| *b == b'/') {
            let start = offset;
            offset += segment.len() + 1;
            if segment.is_empty() {
                continue;
            }
            if segments.len() == MAX_PATH_COMPONENTS {
                return Err(Error::Parse(format!(
                    "more than {} path components",
                    MAX_PATH_COMPONENTS
                )));
            }
            segments.push(start..start + segment.len());
        }

        let start_line = if path.end == line_end - version.as_str().len() - 1 {
            raw.slice(..line_end)
        } else {
            let mut canonical = BytesMut::with_capacity(line_end);
            canonical.put_slice(&raw[..path.end]);
            canonical.put_u8(b' ');
            canonical.put_slice(version.as_bytes());
            canonical.freeze()
        };

        let headers = parse_headers(&raw, line_end + 2, head_end)?;

        Ok(Some(Self {
            raw,
            method,
            version,
            start_line,
            start_line_lowercased: OnceCell::new(),
            path,
            query,
            segments,
            headers,
            head_len,
        }))
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn is_method(&self, method: Method) -> bool {
        self.method == method
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    /// `METHOD path VERSION` with the query removed
    pub fn start_line(&self) -> &[u8] {
        &self.start_line
    }

    /// ASCII-lowercased start line, computed on first use
    pub fn start_line_lowercased(&self) -> &[u8] {
        self.start_line_lowercased
            .get_or_init(|| Bytes::from(self.start_line.to_ascii_lowercase()))
    }

    /// Request path without query string
    pub fn path(&self) -> &str {
        std::str::from_utf8(&self.raw[self.path.clone()]).unwrap_or("")
    }

    pub fn path_bytes(&self) -> &[u8] {
        &self.raw[self.path.clone()]
    }

    /// Query string without the leading `?`
    pub fn query(&self) -> Option<&str> {
        self.query
            .as_ref()
            .and_then(|q| std::str::from_utf8(&self.raw[q.clone()]).ok())
    }

    /// Query pairs, percent-decoded
    pub fn query_params(&self) -> HashMap<String, String> {
        let mut params = HashMap::new();
        if let Some(query) = self.query() {
            for pair in query.split('&') {
                if let Some((key, value)) = pair.split_once('=') {
                    params.insert(percent_decode(key), percent_decode(value));
                }
            }
        }
        params
    }

    /// Non-empty path segment at `index`
    pub fn path_component(&self, index: usize) -> Option<&[u8]> {
        self.segments.get(index).map(|r| &self.raw[r.clone()])
    }

    pub fn path_component_count(&self) -> usize {
        self.segments.len()
    }

    /// Every non-empty path segment in order
    pub fn path_components(&self) -> SmallVec<[&[u8]; 8]> {
        self.segments.iter().map(|r| &self.raw[r.clone()]).collect()
    }

    /// First header value with this name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_bytes(name)
            .and_then(|v| std::str::from_utf8(v).ok())
    }

    pub fn header_bytes(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(n, _)| self.raw[n.clone()].eq_ignore_ascii_case(name.as_bytes()))
            .map(|(_, v)| &self.raw[v.clone()])
    }

    /// All headers in arrival order
    pub fn headers(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.headers
            .iter()
            .map(|(n, v)| (&self.raw[n.clone()], &self.raw[v.clone()]))
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn content_length(&self) -> Option<usize> {
        self.header("content-length").and_then(|v| v.trim().parse().ok())
    }

    /// Cookie pairs from every `Cookie` header, passed through untouched
    pub fn cookies(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .filter(|(n, _)| self.raw[n.clone()].eq_ignore_ascii_case(b"cookie"))
            .filter_map(|(_, v)| std::str::from_utf8(&self.raw[v.clone()]).ok())
            .flat_map(parse_cookie_header)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Bytes after the head, as read
    pub fn body(&self) -> Bytes {
        self.raw.slice(self.head_len..)
    }

    /// Size of the head including the blank line
    pub fn head_len(&self) -> usize {
        self.head_len
    }

    /// Whether the declared body has been read in full
    pub fn is_complete(&self) -> bool {
        self.content_length()
            .map_or(true, |len| self.raw.len() - self.head_len >= len)
    }
}

fn parse_headers(
    raw: &[u8],
    start: usize,
    head_end: usize,
) -> Result<SmallVec<[(Range<usize>, Range<usize>); 16]>> {
    let mut headers = SmallVec::new();
    let mut offset = start;
    while offset < head_end {
        let line_len = memmem::find(&raw[offset..head_end], b"\r\n").unwrap_or(head_end - offset);
        let line = &raw[offset..offset + line_len];

        let colon = memchr::memchr(b':', line)
            .ok_or_else(|| Error::Parse("header line without ':'".to_string()))?;
        let name = &line[..colon];
        if name.is_empty() || !name.iter().copied().all(crate::http::header::is_token_byte) {
            return Err(Error::Parse(format!(
                "invalid header name {:?}",
                String::from_utf8_lossy(name)
            )));
        }
        if headers.len() == MAX_HEADERS {
            return Err(Error::Parse(format!("more than {} headers", MAX_HEADERS)));
        }

        let mut value_start = offset + colon + 1;
        let mut value_end = offset + line_len;
        while value_start < value_end && matches!(raw[value_start], b' ' | b'\t') {
            value_start += 1;
        }
        while value_end > value_start && matches!(raw[value_end - 1], b' ' | b'\t') {
            value_end -= 1;
        }

        headers.push((offset..offset + colon, value_start..value_end));
        offset += line_len + 2;
    }
    Ok(headers)
}

/// Percent-decoding for query pairs (`+` is a space)
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &'static [u8]) -> Request {
        Request::parse(Bytes::from_static(raw)).unwrap().unwrap()
    }

    #[test]
    fn test_incomplete_head() {
        assert!(Request::parse(Bytes::from_static(b"GET / HTTP/1.1\r\nHost: x\r\n"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_start_line_without_query() {
        let req = parse(b"GET /hello HTTP/1.1\r\nHost: localhost\r\n\r\n");
        assert_eq!(req.start_line(), b"GET /hello HTTP/1.1");
        assert_eq!(req.method(), Method::Get);
        assert_eq!(req.version(), HttpVersion::Http11);
        assert_eq!(req.path(), "/hello");
        assert_eq!(req.query(), None);
    }

    #[test]
    fn test_start_line_strips_query() {
        let req = parse(b"GET /search?q=rust+lang&page=2 HTTP/1.0\r\n\r\n");
        assert_eq!(req.start_line(), b"GET /search HTTP/1.0");
        assert_eq!(req.query(), Some("q=rust+lang&page=2"));
        let params = req.query_params();
        assert_eq!(params.get("q").map(String::as_str), Some("rust lang"));
        assert_eq!(params.get("page").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_lowercased_start_line() {
        let req = parse(b"GET /Status HTTP/1.1\r\n\r\n");
        assert_eq!(req.start_line_lowercased(), b"get /status http/1.1");
        assert_eq!(req.start_line(), b"GET /Status HTTP/1.1");
    }

    #[test]
    fn test_path_components() {
        let req = parse(b"GET /users//42/posts/ HTTP/1.1\r\n\r\n");
        assert_eq!(req.path_component_count(), 3);
        assert_eq!(req.path_component(0), Some(b"users".as_slice()));
        assert_eq!(req.path_component(1), Some(b"42".as_slice()));
        assert_eq!(req.path_component(2), Some(b"posts".as_slice()));
        assert_eq!(req.path_component(3), None);

        let root = parse(b"GET / HTTP/1.1\r\n\r\n");
        assert_eq!(root.path_component_count(), 0);
    }

    #[test]
    fn test_headers_case_insensitive() {
        let req = parse(b"POST /api HTTP/1.1\r\nContent-Type:  application/json \r\nX-Trace: a\r\n\r\n");
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(req.header("x-trace"), Some("a"));
        assert_eq!(req.header("missing"), None);
        assert_eq!(req.headers().count(), 2);
    }

    #[test]
    fn test_body_and_completion() {
        let req = parse(b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nhel");
        assert_eq!(req.body(), Bytes::from_static(b"hel"));
        assert!(!req.is_complete());

        let req = parse(b"POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello");
        assert_eq!(req.body(), Bytes::from_static(b"hello"));
        assert!(req.is_complete());
    }

    #[test]
    fn test_cookies_pass_through() {
        let req = parse(b"GET / HTTP/1.1\r\nCookie: a=1; b=2\r\ncookie: c=3\r\n\r\n");
        let cookies: Vec<_> = req.cookies().collect();
        assert_eq!(cookies, vec![("a", "1"), ("b", "2"), ("c", "3")]);
        assert_eq!(req.cookie("b"), Some("2"));
    }

    #[test]
    fn test_malformed_requests() {
        let bad = |raw: &'static [u8]| Request::parse(Bytes::from_static(raw));
        assert!(matches!(bad(b"BREW /pot HTTP/1.1\r\n\r\n"), Err(Error::InvalidMethod(_))));
        assert!(matches!(bad(b"GET\r\n\r\n"), Err(Error::Parse(_))));
        assert!(matches!(bad(b"GET / HTTP/2.0\r\n\r\n"), Err(Error::Parse(_))));
        assert!(matches!(bad(b"GET relative HTTP/1.1\r\n\r\n"), Err(Error::Parse(_))));
        assert!(matches!(bad(b"GET / HTTP/1.1\r\nNoColon\r\n\r\n"), Err(Error::Parse(_))));
    }

    #[test]
    fn test_clone_shares_buffer() {
        let req = parse(b"GET /a/b HTTP/1.1\r\n\r\n");
        let copy = req.clone();
        assert_eq!(copy.start_line(), req.start_line());
        assert_eq!(copy.path_components(), req.path_components());
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("a%20b"), "a b");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(percent_decode("caf%C3%A9"), "café");
    }
}
