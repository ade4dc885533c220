//! Header names with canonical lower-case spellings

use crate::error::MessageError;
use std::fmt;
use std::str::FromStr;

macro_rules! header_names {
    ($($variant:ident => $name:literal,)+) => {
        /// Standard header names plus `Custom` for everything else
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum HeaderName {
            $($variant,)+
            /// Lower-cased, validated custom name
            Custom(String),
        }

        impl HeaderName {
            /// Canonical lower-case name
            pub fn as_str(&self) -> &str {
                match self {
                    $(HeaderName::$variant => $name,)+
                    HeaderName::Custom(name) => name,
                }
            }

            fn standard(lower: &str) -> Option<HeaderName> {
                match lower {
                    $($name => Some(HeaderName::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

header_names! {
    Accept => "accept",
    AcceptEncoding => "accept-encoding",
    AcceptLanguage => "accept-language",
    AccessControlAllowOrigin => "access-control-allow-origin",
    Age => "age",
    Allow => "allow",
    Authorization => "authorization",
    CacheControl => "cache-control",
    Connection => "connection",
    ContentDisposition => "content-disposition",
    ContentEncoding => "content-encoding",
    ContentLanguage => "content-language",
    ContentLength => "content-length",
    ContentSecurityPolicy => "content-security-policy",
    ContentType => "content-type",
    Cookie => "cookie",
    CrossOriginEmbedderPolicy => "cross-origin-embedder-policy",
    CrossOriginOpenerPolicy => "cross-origin-opener-policy",
    CrossOriginResourcePolicy => "cross-origin-resource-policy",
    Date => "date",
    ETag => "etag",
    Expires => "expires",
    Host => "host",
    IfModifiedSince => "if-modified-since",
    IfNoneMatch => "if-none-match",
    LastModified => "last-modified",
    Location => "location",
    Origin => "origin",
    PermissionsPolicy => "permissions-policy",
    Pragma => "pragma",
    Range => "range",
    Referer => "referer",
    ReferrerPolicy => "referrer-policy",
    RetryAfter => "retry-after",
    Server => "server",
    SetCookie => "set-cookie",
    StrictTransportSecurity => "strict-transport-security",
    TransferEncoding => "transfer-encoding",
    Upgrade => "upgrade",
    UserAgent => "user-agent",
    Vary => "vary",
    WwwAuthenticate => "www-authenticate",
    XContentTypeOptions => "x-content-type-options",
    XFrameOptions => "x-frame-options",
    XRequestId => "x-request-id",
    XXssProtection => "x-xss-protection",
}

impl HeaderName {
    /// Headers the response writer owns; templates may not set them directly
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            HeaderName::ContentLength | HeaderName::TransferEncoding | HeaderName::Date
        )
    }
}

/// Case-insensitive; unknown but well-formed names become `Custom`
impl FromStr for HeaderName {
    type Err = MessageError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        if name.is_empty() || !name.bytes().all(is_token_byte) {
            return Err(MessageError::InvalidHeaderName(name.to_string()));
        }
        let lower = name.to_ascii_lowercase();
        Ok(HeaderName::standard(&lower).unwrap_or(HeaderName::Custom(lower)))
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RFC 9110 `tchar`
#[inline]
pub fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_'
                | b'`' | b'|' | b'~'
        )
}

/// Reject values that would break framing (CR, LF, NUL)
pub fn validate_header_value(name: &HeaderName, value: &str) -> Result<(), MessageError> {
    if value.bytes().any(|b| matches!(b, b'\r' | b'\n' | 0)) {
        return Err(MessageError::InvalidHeaderValue {
            name: name.as_str().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_names_case_insensitive() {
        assert_eq!("Content-Type".parse::<HeaderName>().unwrap(), HeaderName::ContentType);
        assert_eq!("X-REQUEST-ID".parse::<HeaderName>().unwrap(), HeaderName::XRequestId);
        assert_eq!(HeaderName::ETag.as_str(), "etag");
    }

    #[test]
    fn test_custom_name_lowercased() {
        let name: HeaderName = "X-Powered-By".parse().unwrap();
        assert_eq!(name, HeaderName::Custom("x-powered-by".to_string()));
        assert_eq!(name.to_string(), "x-powered-by");
    }

    #[test]
    fn test_invalid_names() {
        assert!("".parse::<HeaderName>().is_err());
        assert!("bad name".parse::<HeaderName>().is_err());
        assert!("bad:name".parse::<HeaderName>().is_err());
    }

    #[test]
    fn test_header_value_validation() {
        assert!(validate_header_value(&HeaderName::Server, "squall").is_ok());
        assert_eq!(
            validate_header_value(&HeaderName::Server, "a\r\nb: c"),
            Err(MessageError::InvalidHeaderValue {
                name: "server".to_string()
            })
        );
    }

    #[test]
    fn test_framing_headers() {
        assert!(HeaderName::ContentLength.is_framing());
        assert!(HeaderName::Date.is_framing());
        assert!(!HeaderName::ContentType.is_framing());
    }
}
