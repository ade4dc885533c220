//! Per-request responses built by dynamic route handlers

use super::head::{Framing, ResponseHead};
use super::static_responder::{write_chunks, ChunkStream};
use super::template::{RouteTemplate, StaticBody};
use crate::date::{DateHeaderCache, DateSnapshot};
use crate::error::ResponderError;
use crate::http::{Charset, ContentType, Cookie, HeaderName, MediaType, StatusCode};
use crate::socket::Socket;
use bytes::{Bytes, BytesMut};
use smallvec::SmallVec;
use std::fmt;
use std::io::IoSlice;
use tokio::io::{AsyncRead, AsyncWrite};

/// Response body
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Bytes),
    Text(String),
    Json(serde_json::Value),
    /// Sent with chunked transfer encoding
    Stream(ChunkStream),
}

impl Body {
    pub fn is_stream(&self) -> bool {
        matches!(self, Body::Stream(_))
    }

    fn default_content_type(&self) -> Option<ContentType> {
        match self {
            Body::Text(_) => Some(ContentType::new(MediaType::TextPlain).with_charset(Charset::Utf8)),
            Body::Json(_) => Some(ContentType::new(MediaType::ApplicationJson)),
            Body::Bytes(_) => Some(ContentType::new(MediaType::ApplicationOctetStream)),
            Body::Empty | Body::Stream(_) => None,
        }
    }

    /// Encode a sized body; streams yield `None`
    fn into_bytes(self) -> Result<Option<Bytes>, ResponderError> {
        Ok(Some(match self {
            Body::Empty => Bytes::new(),
            Body::Bytes(bytes) => bytes,
            Body::Text(text) => Bytes::from(text),
            Body::Json(value) => Bytes::from(
                serde_json::to_vec(&value).map_err(|e| ResponderError::Handler(e.to_string()))?,
            ),
            Body::Stream(_) => return Ok(None),
        }))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Bytes(bytes) => f.debug_tuple("Bytes").field(bytes).finish(),
            Body::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Body::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Response a dynamic route handler fills in
#[derive(Debug, Default)]
pub struct DynamicResponse {
    pub head: ResponseHead,
    pub body: Body,
    /// Captured path parameters in route order, catch-all tail last
    pub parameters: SmallVec<[String; 4]>,
}

impl DynamicResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            head: ResponseHead::new(status),
            body: Body::Empty,
            parameters: SmallVec::new(),
        }
    }

    /// Start from a route's declared head and body
    pub fn from_template(template: &RouteTemplate) -> Self {
        let body = match &template.body {
            StaticBody::Empty => Body::Empty,
            StaticBody::Bytes(bytes) => Body::Bytes(bytes.clone()),
            StaticBody::Text(text) => Body::Text(text.to_string()),
            StaticBody::Chunked(source) => Body::Stream(source.open()),
        };
        Self {
            head: template.head.clone(),
            body,
            parameters: SmallVec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::ok().with_body(Body::Text(body.into()))
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self::ok().with_body(Body::Json(value))
    }

    pub fn html(body: impl Into<String>) -> Self {
        let mut response = Self::ok().with_body(Body::Text(body.into()));
        response.head.content_type =
            Some(ContentType::new(MediaType::TextHtml).with_charset(Charset::Utf8));
        response
    }

    pub fn redirect(location: &str, permanent: bool) -> Self {
        let status = if permanent {
            StatusCode::PERMANENT_REDIRECT
        } else {
            StatusCode::TEMPORARY_REDIRECT
        };
        let mut response = Self::new(status);
        response.head.set_header(HeaderName::Location, location);
        response
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND).with_body(Body::Text("Not Found".to_string()))
    }

    pub fn internal_error(message: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR).with_body(Body::Text(message.to_string()))
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.head.status = status;
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.head.append_header(name, value);
        self
    }

    pub fn with_cookie(mut self, cookie: Cookie) -> Self {
        self.head.cookies.push(cookie);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.head.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.head.status = status;
    }

    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    pub fn set_header(&mut self, name: HeaderName, value: impl Into<String>) {
        self.head.set_header(name, value);
    }

    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.head.get_header(name)
    }

    /// Positional parameter, `None` past the last one
    pub fn parameter(&self, index: usize) -> Option<&str> {
        self.parameters.get(index).map(String::as_str)
    }

    /// Body as string, for text bodies
    pub fn body_string(&self) -> Option<String> {
        match &self.body {
            Body::Text(text) => Some(text.clone()),
            Body::Bytes(bytes) => std::str::from_utf8(bytes).ok().map(str::to_string),
            Body::Json(value) => Some(value.to_string()),
            Body::Empty => Some(String::new()),
            Body::Stream(_) => None,
        }
    }

    /// Full wire bytes for a sized body; streams are rejected
    pub fn to_bytes(self, date: &DateSnapshot) -> Result<Bytes, ResponderError> {
        let DynamicResponse { mut head, body, .. } = self;
        finish_head(&mut head, &body)?;
        let body = body.into_bytes()?.ok_or_else(|| {
            ResponderError::Handler("streaming bodies cannot be rendered to bytes".to_string())
        })?;
        let rendered = head.render(head.framing_for(body.len())?, true);
        let mut out = BytesMut::with_capacity(rendered.byte_count() + body.len());
        out.extend_from_slice(&rendered.before);
        out.extend_from_slice(date);
        out.extend_from_slice(&rendered.after);
        out.extend_from_slice(&body);
        Ok(out.freeze())
    }

    /// Write head and body with one vectored write, or head then chunks for
    /// streamed bodies. `omit_body` answers HEAD requests.
    pub async fn write_to<S>(
        self,
        socket: &mut Socket<S>,
        dates: &DateHeaderCache,
        omit_body: bool,
    ) -> Result<(), ResponderError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let DynamicResponse { mut head, body, .. } = self;
        finish_head(&mut head, &body)?;
        let date = dates.snapshot();

        if let Body::Stream(stream) = body {
            head.render(Framing::Chunked, true).write(socket, &date).await?;
            if omit_body {
                return Ok(());
            }
            return write_chunks(socket, stream).await;
        }

        let body = body.into_bytes()?.unwrap_or_default();
        let rendered = head.render(head.framing_for(body.len())?, true);
        let body: &[u8] = if omit_body { &[] } else { &body };
        let mut slices = [
            IoSlice::new(&rendered.before),
            IoSlice::new(&date[..]),
            IoSlice::new(&rendered.after),
            IoSlice::new(body),
        ];
        Ok(socket.write_vectored(&mut slices).await?)
    }
}

/// Default the content type from the body and validate
fn finish_head(head: &mut ResponseHead, body: &Body) -> Result<(), ResponderError> {
    if head.content_type.is_none() {
        head.content_type = body.default_content_type();
    }
    head.validate()?;
    if body.is_stream() && !head.status.allows_body() {
        return Err(crate::error::MessageError::BodyNotAllowed {
            status: head.status.as_u16(),
        }
        .into());
    }
    Ok(())
}
