//! Media types and the `content-type` value built from them

use std::fmt;

macro_rules! media_types {
    ($($variant:ident => $mime:literal [$($ext:literal),*],)+) => {
        /// Closed set of `type/subtype` pairs
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum MediaType {
            $($variant,)+
        }

        impl MediaType {
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(MediaType::$variant => $mime,)+
                }
            }

            /// Lookup by `type/subtype`, parameters ignored
            pub fn parse(value: &str) -> Option<Self> {
                let essence = value.split(';').next().unwrap_or(value).trim();
                $(if essence.eq_ignore_ascii_case($mime) {
                    return Some(MediaType::$variant);
                })+
                None
            }

            /// Lookup by file extension (case-insensitive, no dot)
            pub fn from_extension(ext: &str) -> Option<Self> {
                let ext = ext.to_ascii_lowercase();
                $({
                    let extensions: &[&str] = &[$($ext),*];
                    if extensions.contains(&ext.as_str()) {
                        return Some(MediaType::$variant);
                    }
                })+
                None
            }
        }
    };
}

media_types! {
    TextPlain => "text/plain" ["txt", "text"],
    TextHtml => "text/html" ["html", "htm"],
    TextCss => "text/css" ["css"],
    TextJavascript => "text/javascript" ["js", "mjs"],
    TextCsv => "text/csv" ["csv"],
    TextEventStream => "text/event-stream" [],
    ApplicationJson => "application/json" ["json"],
    ApplicationXml => "application/xml" ["xml"],
    ApplicationPdf => "application/pdf" ["pdf"],
    ApplicationWasm => "application/wasm" ["wasm"],
    ApplicationOctetStream => "application/octet-stream" ["bin"],
    ApplicationFormUrlencoded => "application/x-www-form-urlencoded" [],
    MultipartFormData => "multipart/form-data" [],
    ImagePng => "image/png" ["png"],
    ImageJpeg => "image/jpeg" ["jpg", "jpeg"],
    ImageGif => "image/gif" ["gif"],
    ImageSvg => "image/svg+xml" ["svg"],
    ImageWebp => "image/webp" ["webp"],
    ImageIcon => "image/x-icon" ["ico"],
    FontWoff => "font/woff" ["woff"],
    FontWoff2 => "font/woff2" ["woff2"],
    FontTtf => "font/ttf" ["ttf"],
}

impl MediaType {
    pub fn is_text(&self) -> bool {
        self.as_str().starts_with("text/")
            || matches!(
                self,
                MediaType::ApplicationJson | MediaType::ApplicationXml | MediaType::ImageSvg
            )
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `charset` parameter values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Charset {
    Utf8,
    UsAscii,
    Iso8859_1,
}

impl Charset {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Charset::Utf8 => "utf-8",
            Charset::UsAscii => "us-ascii",
            Charset::Iso8859_1 => "iso-8859-1",
        }
    }
}

/// Media type with an optional charset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentType {
    pub media_type: MediaType,
    pub charset: Option<Charset>,
}

impl ContentType {
    pub const fn new(media_type: MediaType) -> Self {
        Self {
            media_type,
            charset: None,
        }
    }

    pub const fn with_charset(mut self, charset: Charset) -> Self {
        self.charset = Some(charset);
        self
    }
}

impl From<MediaType> for ContentType {
    fn from(media_type: MediaType) -> Self {
        ContentType::new(media_type)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.charset {
            Some(charset) => write!(f, "{}; charset={}", self.media_type, charset.as_str()),
            None => f.write_str(self.media_type.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(MediaType::from_extension("html"), Some(MediaType::TextHtml));
        assert_eq!(MediaType::from_extension("JPG"), Some(MediaType::ImageJpeg));
        assert_eq!(MediaType::from_extension("woff2"), Some(MediaType::FontWoff2));
        assert_eq!(MediaType::from_extension("exe"), None);
    }

    #[test]
    fn test_parse_ignores_parameters() {
        assert_eq!(
            MediaType::parse("application/json; charset=utf-8"),
            Some(MediaType::ApplicationJson)
        );
        assert_eq!(MediaType::parse("TEXT/PLAIN"), Some(MediaType::TextPlain));
        assert_eq!(MediaType::parse("video/mp4"), None);
    }

    #[test]
    fn test_content_type_display() {
        assert_eq!(ContentType::new(MediaType::TextPlain).to_string(), "text/plain");
        assert_eq!(
            ContentType::new(MediaType::TextHtml)
                .with_charset(Charset::Utf8)
                .to_string(),
            "text/html; charset=utf-8"
        );
    }

    #[test]
    fn test_is_text() {
        assert!(MediaType::TextCss.is_text());
        assert!(MediaType::ApplicationJson.is_text());
        assert!(!MediaType::ImagePng.is_text());
    }
}
