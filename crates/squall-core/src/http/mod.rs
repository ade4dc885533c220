//! Closed HTTP constant tables

pub mod cookie;
pub mod header;
pub mod media_type;
pub mod method;
pub mod status;
pub mod version;

pub use cookie::{parse_cookie_header, Cookie, SameSite};
pub use header::{validate_header_value, HeaderName};
pub use media_type::{Charset, ContentType, MediaType};
pub use method::Method;
pub use status::StatusCode;
pub use version::HttpVersion;
