//! Request ID middleware
//!
//! Echoes the client's `x-request-id` or generates one, and sets it on the
//! response.

use super::DynamicMiddleware;
use crate::error::MiddlewareError;
use crate::http::HeaderName;
use crate::request::Request;
use crate::response::DynamicResponse;
use futures_util::future::{self, BoxFuture, FutureExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::trace;

/// ID format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdGenerator {
    Uuid,
    #[default]
    NanoId,
    ShortId,
    Counter,
}

impl IdGenerator {
    pub fn generate(&self) -> String {
        match self {
            IdGenerator::Uuid => generate_uuid(),
            IdGenerator::NanoId => generate_nano_id(),
            IdGenerator::ShortId => generate_short_id(),
            IdGenerator::Counter => generate_counter_id(),
        }
    }
}

/// Generate UUID v4
pub fn generate_uuid() -> String {
    let mut bytes = [0u8; 16];
    fill_random(&mut bytes);

    // Version 4, RFC 4122 variant
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    format!(
        "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        u16::from_be_bytes([bytes[4], bytes[5]]),
        u16::from_be_bytes([bytes[6], bytes[7]]),
        u16::from_be_bytes([bytes[8], bytes[9]]),
        u64::from_be_bytes([0, 0, bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15]])
    )
}

/// 21-character NanoID
pub fn generate_nano_id() -> String {
    const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz_-";
    let mut bytes = [0u8; 21];
    fill_random(&mut bytes);
    bytes
        .iter()
        .map(|&b| ALPHABET[b as usize % ALPHABET.len()] as char)
        .collect()
}

/// 8-character alphanumeric ID
pub fn generate_short_id() -> String {
    const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    let mut bytes = [0u8; 8];
    fill_random(&mut bytes);
    bytes
        .iter()
        .map(|&b| ALPHABET[b as usize % ALPHABET.len()] as char)
        .collect()
}

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Process-local sequence, zero-padded hex
pub fn generate_counter_id() -> String {
    format!("{:016x}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// xorshift64 seeded from the clock and a per-call counter, so two calls in
/// the same nanosecond still differ. Not for secrets.
fn fill_random(buf: &mut [u8]) {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let mut seed = (nanos ^ sequence.wrapping_mul(0x9E37_79B9_7F4A_7C15)) | 1;

    for byte in buf.iter_mut() {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        *byte = (seed >> 24) as u8;
    }
}

/// Dynamic middleware setting `x-request-id` on the response
#[derive(Debug, Clone, Default)]
pub struct RequestId {
    generator: IdGenerator,
    /// Reuse a well-formed incoming id instead of generating one
    trust_incoming: bool,
}

impl RequestId {
    pub fn new(generator: IdGenerator) -> Self {
        Self {
            generator,
            trust_incoming: true,
        }
    }

    pub fn trust_incoming(mut self, trust: bool) -> Self {
        self.trust_incoming = trust;
        self
    }

    fn incoming<'r>(&self, request: &'r Request) -> Option<&'r str> {
        if !self.trust_incoming {
            return None;
        }
        request.header("x-request-id").filter(|id| {
            !id.is_empty()
                && id.len() <= 128
                && id
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        })
    }
}

impl DynamicMiddleware for RequestId {
    fn handle<'a>(
        &'a self,
        request: &'a Request,
        response: &'a mut DynamicResponse,
    ) -> BoxFuture<'a, Result<bool, MiddlewareError>> {
        let id = match self.incoming(request) {
            Some(id) => id.to_string(),
            None => self.generator.generate(),
        };
        trace!(request_id = %id, path = request.path(), "request id assigned");
        response.set_header(HeaderName::XRequestId, id);
        future::ready(Ok(true)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn request(raw: &'static [u8]) -> Request {
        Request::parse(Bytes::from_static(raw)).unwrap().unwrap()
    }

    #[test]
    fn test_uuid_format() {
        let uuid = generate_uuid();
        assert_eq!(uuid.len(), 36);
        assert_eq!(uuid.chars().filter(|&c| c == '-').count(), 4);
        assert_eq!(uuid.as_bytes()[14], b'4');
    }

    #[test]
    fn test_id_lengths() {
        assert_eq!(generate_nano_id().len(), 21);
        assert_eq!(generate_short_id().len(), 8);
        assert_eq!(generate_counter_id().len(), 16);
    }

    #[test]
    fn test_consecutive_ids_differ() {
        assert_ne!(generate_nano_id(), generate_nano_id());
        assert_ne!(generate_counter_id(), generate_counter_id());
    }

    #[tokio::test]
    async fn test_generates_id() {
        let middleware = RequestId::new(IdGenerator::Uuid);
        let mut response = DynamicResponse::ok();
        let cont = middleware
            .handle(&request(b"GET / HTTP/1.1\r\n\r\n"), &mut response)
            .await
            .unwrap();
        assert!(cont);
        assert_eq!(response.header(&HeaderName::XRequestId).map(str::len), Some(36));
    }

    #[tokio::test]
    async fn test_echoes_incoming_id() {
        let middleware = RequestId::default().trust_incoming(true);
        let req = request(b"GET / HTTP/1.1\r\nX-Request-Id: abc-123\r\n\r\n");
        let mut response = DynamicResponse::ok();
        middleware.handle(&req, &mut response).await.unwrap();
        assert_eq!(response.header(&HeaderName::XRequestId), Some("abc-123"));

        let untrusting = RequestId::new(IdGenerator::ShortId).trust_incoming(false);
        let mut response = DynamicResponse::ok();
        untrusting.handle(&req, &mut response).await.unwrap();
        assert_ne!(response.header(&HeaderName::XRequestId), Some("abc-123"));
    }

    #[tokio::test]
    async fn test_rejects_malformed_incoming_id() {
        let middleware = RequestId::new(IdGenerator::Counter);
        let req = request(b"GET / HTTP/1.1\r\nX-Request-Id: <script>\r\n\r\n");
        let mut response = DynamicResponse::ok();
        middleware.handle(&req, &mut response).await.unwrap();
        assert_eq!(response.header(&HeaderName::XRequestId).map(str::len), Some(16));
    }
}
