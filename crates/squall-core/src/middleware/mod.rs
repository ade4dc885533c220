//! Static and dynamic middleware
//!
//! Static middleware edits a route's template once, when the router is
//! built, and never sees a request. Dynamic middleware runs per request, in
//! order, before a dynamic route's handler.

pub mod request_id;
pub mod security;

pub use request_id::{generate_counter_id, generate_nano_id, generate_short_id, generate_uuid, IdGenerator, RequestId};
pub use security::{FrameOptions, HstsConfig, SecurityConfig, SecurityHeaders};

use crate::error::{MiddlewareError, ResponderError};
use crate::http::{ContentType, Cookie, HeaderName, HttpVersion, MediaType, Method, StatusCode};
use crate::request::Request;
use crate::response::{DynamicResponse, RouteTemplate};
use futures_util::future::{self, BoxFuture, FutureExt};
use smallvec::SmallVec;
use std::sync::Arc;

/// Route attributes a static middleware may filter on. Empty lists match
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteFilter {
    pub versions: SmallVec<[HttpVersion; 2]>,
    pub methods: SmallVec<[Method; 4]>,
    pub media_types: SmallVec<[MediaType; 4]>,
    pub statuses: SmallVec<[StatusCode; 4]>,
}

impl RouteFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn version(mut self, version: HttpVersion) -> Self {
        self.versions.push(version);
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    pub fn media_type(mut self, media_type: MediaType) -> Self {
        self.media_types.push(media_type);
        self
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn matches(
        &self,
        version: HttpVersion,
        method: Method,
        content_type: Option<&ContentType>,
        status: StatusCode,
    ) -> bool {
        (self.versions.is_empty() || self.versions.contains(&version))
            && (self.methods.is_empty() || self.methods.contains(&method))
            && (self.media_types.is_empty()
                || content_type.is_some_and(|ct| self.media_types.contains(&ct.media_type)))
            && (self.statuses.is_empty() || self.statuses.contains(&status))
    }
}

/// Compile-time edit of a route template
pub trait StaticMiddleware: Send + Sync {
    /// Whether this middleware applies to a route with these attributes
    fn handles(
        &self,
        version: HttpVersion,
        method: Method,
        content_type: Option<&ContentType>,
        status: StatusCode,
    ) -> bool;

    /// Override status, content type, headers or cookies. The body is never
    /// touched.
    fn apply(&self, template: &mut RouteTemplate);
}

/// Run each middleware that handles the route, in order
pub fn apply_static(middleware: &[Arc<dyn StaticMiddleware>], method: Method, template: &mut RouteTemplate) {
    for m in middleware {
        let head = &template.head;
        if m.handles(head.version, method, head.content_type.as_ref(), head.status) {
            m.apply(template);
        }
    }
}

/// Fixed overrides applied to every matching route
#[derive(Debug, Clone, Default)]
pub struct StaticHeaders {
    pub filter: RouteFilter,
    pub status: Option<StatusCode>,
    pub content_type: Option<ContentType>,
    pub headers: Vec<(HeaderName, String)>,
    pub cookies: Vec<Cookie>,
}

impl StaticHeaders {
    pub fn new(filter: RouteFilter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn content_type(mut self, content_type: impl Into<ContentType>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn cookie(mut self, cookie: Cookie) -> Self {
        self.cookies.push(cookie);
        self
    }
}

impl StaticMiddleware for StaticHeaders {
    fn handles(
        &self,
        version: HttpVersion,
        method: Method,
        content_type: Option<&ContentType>,
        status: StatusCode,
    ) -> bool {
        self.filter.matches(version, method, content_type, status)
    }

    fn apply(&self, template: &mut RouteTemplate) {
        if let Some(status) = self.status {
            template.head.status = status;
        }
        if let Some(content_type) = self.content_type {
            template.head.content_type = Some(content_type);
        }
        for (name, value) in &self.headers {
            template.head.set_header(name.clone(), value.clone());
        }
        template.head.cookies.extend(self.cookies.iter().cloned());
    }
}

/// Per-request hook run before a dynamic route's handler
pub trait DynamicMiddleware: Send + Sync {
    /// `Ok(false)` stops the chain and skips the handler; the response is
    /// still sent.
    fn handle<'a>(
        &'a self,
        request: &'a Request,
        response: &'a mut DynamicResponse,
    ) -> BoxFuture<'a, Result<bool, MiddlewareError>>;
}

/// Ordered dynamic middleware
#[derive(Clone, Default)]
pub struct DynamicMiddlewareChain {
    middleware: Vec<Arc<dyn DynamicMiddleware>>,
}

impl DynamicMiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<M: DynamicMiddleware + 'static>(&mut self, middleware: M) {
        self.middleware.push(Arc::new(middleware));
    }

    pub fn push(&mut self, middleware: Arc<dyn DynamicMiddleware>) {
        self.middleware.push(middleware);
    }

    /// This chain followed by `other`
    pub fn then(&self, other: &DynamicMiddlewareChain) -> Self {
        let mut middleware = self.middleware.clone();
        middleware.extend(other.middleware.iter().cloned());
        Self { middleware }
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Run in order. `Ok(false)` when a middleware stopped the chain.
    pub async fn run(&self, request: &Request, response: &mut DynamicResponse) -> Result<bool, ResponderError> {
        for m in &self.middleware {
            if !m.handle(request, response).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl std::fmt::Debug for DynamicMiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicMiddlewareChain")
            .field("len", &self.middleware.len())
            .finish()
    }
}

/// Synchronous closure as dynamic middleware
pub struct FnMiddleware<F>(F);

/// Wrap a synchronous closure
pub fn from_fn<F>(f: F) -> FnMiddleware<F>
where
    F: Fn(&Request, &mut DynamicResponse) -> Result<bool, MiddlewareError> + Send + Sync,
{
    FnMiddleware(f)
}

impl<F> DynamicMiddleware for FnMiddleware<F>
where
    F: Fn(&Request, &mut DynamicResponse) -> Result<bool, MiddlewareError> + Send + Sync,
{
    fn handle<'a>(
        &'a self,
        request: &'a Request,
        response: &'a mut DynamicResponse,
    ) -> BoxFuture<'a, Result<bool, MiddlewareError>> {
        future::ready((self.0)(request, response)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn request() -> Request {
        Request::parse(Bytes::from_static(b"GET /x HTTP/1.1\r\nX-Key: k\r\n\r\n"))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_route_filter() {
        let filter = RouteFilter::any().method(Method::Get).media_type(MediaType::TextHtml);
        let html = ContentType::new(MediaType::TextHtml);
        assert!(filter.matches(HttpVersion::Http11, Method::Get, Some(&html), StatusCode::OK));
        assert!(!filter.matches(HttpVersion::Http11, Method::Post, Some(&html), StatusCode::OK));
        assert!(!filter.matches(HttpVersion::Http11, Method::Get, None, StatusCode::OK));
        assert!(RouteFilter::any().matches(HttpVersion::Http10, Method::Put, None, StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_apply_static_respects_filter() {
        let only_post: Arc<dyn StaticMiddleware> = Arc::new(
            StaticHeaders::new(RouteFilter::any().method(Method::Post)).header(HeaderName::Server, "post"),
        );
        let all: Arc<dyn StaticMiddleware> = Arc::new(
            StaticHeaders::new(RouteFilter::any())
                .header(HeaderName::CacheControl, "no-store")
                .status(StatusCode::ACCEPTED),
        );

        let mut template = RouteTemplate::text("body");
        apply_static(&[only_post, all], Method::Get, &mut template);
        assert_eq!(template.head.get_header(&HeaderName::Server), None);
        assert_eq!(template.head.get_header(&HeaderName::CacheControl), Some("no-store"));
        assert_eq!(template.head.status, StatusCode::ACCEPTED);
        assert_eq!(template.body.len(), Some(4));
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let mut chain = DynamicMiddlewareChain::new();
        chain.add(from_fn(|_req: &Request, res: &mut DynamicResponse| {
            res.set_header(HeaderName::Custom("x-order".into()), "first");
            Ok(true)
        }));
        chain.add(from_fn(|_req: &Request, res: &mut DynamicResponse| {
            let seen = res.header(&HeaderName::Custom("x-order".into())).unwrap_or("").to_string();
            res.set_header(HeaderName::Custom("x-order".into()), format!("{},second", seen));
            Ok(true)
        }));

        let mut response = DynamicResponse::ok();
        assert!(chain.run(&request(), &mut response).await.unwrap());
        assert_eq!(
            response.header(&HeaderName::Custom("x-order".into())),
            Some("first,second")
        );
    }

    #[tokio::test]
    async fn test_chain_stops_on_false() {
        let mut chain = DynamicMiddlewareChain::new();
        chain.add(from_fn(|req: &Request, res: &mut DynamicResponse| {
            if req.header("x-key") != Some("secret") {
                res.set_status(StatusCode::UNAUTHORIZED);
                return Ok(false);
            }
            Ok(true)
        }));
        chain.add(from_fn(|_req: &Request, _res: &mut DynamicResponse| {
            panic!("must not run after the chain stopped")
        }));

        let mut response = DynamicResponse::ok();
        assert!(!chain.run(&request(), &mut response).await.unwrap());
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_chain_error_becomes_responder_error() {
        let mut chain = DynamicMiddlewareChain::new();
        chain.add(from_fn(|_req: &Request, _res: &mut DynamicResponse| {
            Err(MiddlewareError::new(StatusCode::FORBIDDEN, "denied"))
        }));

        let mut response = DynamicResponse::ok();
        let err = chain.run(&request(), &mut response).await.unwrap_err();
        assert!(matches!(err, ResponderError::Middleware(ref e) if e.message == "denied"));
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_chain_then() {
        let mut a = DynamicMiddlewareChain::new();
        a.add(from_fn(|_: &Request, _: &mut DynamicResponse| Ok(true)));
        let mut b = DynamicMiddlewareChain::new();
        b.add(from_fn(|_: &Request, _: &mut DynamicResponse| Ok(true)));
        b.add(from_fn(|_: &Request, _: &mut DynamicResponse| Ok(true)));
        assert_eq!(a.then(&b).len(), 3);
        assert_eq!(a.len(), 1);
    }
}
