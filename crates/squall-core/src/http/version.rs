//! Protocol versions

use std::fmt;

/// HTTP/1.x version carried on start lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpVersion {
    Http10,
    #[default]
    Http11,
}

impl HttpVersion {
    pub const fn as_str(&self) -> &'static str {
        match self {
            HttpVersion::Http10 => "HTTP/1.0",
            HttpVersion::Http11 => "HTTP/1.1",
        }
    }

    pub const fn as_bytes(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"HTTP/1.1" => Some(HttpVersion::Http11),
            b"HTTP/1.0" => Some(HttpVersion::Http10),
            _ => None,
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse() {
        assert_eq!(HttpVersion::parse(b"HTTP/1.1"), Some(HttpVersion::Http11));
        assert_eq!(HttpVersion::parse(b"HTTP/1.0"), Some(HttpVersion::Http10));
        assert_eq!(HttpVersion::parse(b"HTTP/2"), None);
        assert_eq!(HttpVersion::default().as_str(), "HTTP/1.1");
    }
}
