//! Dynamic responder storage
//!
//! Three tiers, searched in order:
//! 1. `parameterless` - routes without parameters, keyed by rendered start line
//! 2. `parameterized` - one bucket per path length, scanned in registration order
//! 3. `catchall` - routes ending in `*`, scanned in registration order

use crate::date::DateHeaderCache;
use crate::error::{ResponderError, RouterError};
use crate::http::{HttpVersion, Method};
use crate::middleware::DynamicMiddlewareChain;
use crate::request::Request;
use crate::response::{DynamicResponse, RouteTemplate};
use crate::socket::Socket;
use futures_util::future::{BoxFuture, FutureExt};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use squall_router::{
    capture_parameters, has_catch_all, has_parameters, matches_catchall, matches_exact,
    parse_path, render_path, PathComponent,
};
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};

/// Route handler: receives the request and the response derived from the
/// route template, returns the response to send
pub type DynamicHandler = Arc<
    dyn Fn(Request, DynamicResponse) -> BoxFuture<'static, Result<DynamicResponse, ResponderError>>
        + Send
        + Sync,
>;

/// Box an async closure as a [`DynamicHandler`]
pub fn handler<F, Fut>(f: F) -> DynamicHandler
where
    F: Fn(Request, DynamicResponse) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<DynamicResponse, ResponderError>> + Send + 'static,
{
    Arc::new(move |request, response| f(request, response).boxed())
}

/// Declared dynamic route
#[derive(Debug, Clone)]
pub struct DynamicRoute {
    pub method: Method,
    pub version: HttpVersion,
    pub path: Vec<PathComponent>,
    pub case_sensitive: bool,
    pub template: RouteTemplate,
}

impl DynamicRoute {
    /// Parse `path` (`/users/:id`, `/files/*`)
    pub fn new(method: Method, path: &str) -> Result<Self, RouterError> {
        if !path.starts_with('/') {
            return Err(RouterError::InvalidRoute {
                route: path.to_string(),
                reason: "path must start with '/'".to_string(),
            });
        }
        Ok(Self {
            method,
            version: HttpVersion::Http11,
            path: parse_path(path)?,
            case_sensitive: true,
            template: RouteTemplate::default(),
        })
    }

    pub fn version(mut self, version: HttpVersion) -> Self {
        self.version = version;
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    /// Head and body every response starts from
    pub fn template(mut self, template: RouteTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn is_parameterless(&self) -> bool {
        !has_parameters(&self.path)
    }

    pub fn is_catch_all(&self) -> bool {
        has_catch_all(&self.path)
    }

    /// `METHOD /rendered/path VERSION`
    pub fn start_line(&self) -> String {
        format!("{} {} {}", self.method, render_path(&self.path), self.version)
    }

    /// Same method, version and path shape
    fn same_route(&self, other: &DynamicRoute) -> bool {
        self.method == other.method
            && self.version == other.version
            && self.path.len() == other.path.len()
            && self.path.iter().zip(&other.path).all(|(a, b)| match (a, b) {
                (PathComponent::Literal(a), PathComponent::Literal(b)) if self.case_sensitive => a == b,
                (PathComponent::Literal(a), PathComponent::Literal(b)) => a.eq_ignore_ascii_case(b),
                (PathComponent::Parameter(_), PathComponent::Parameter(_)) => true,
                (PathComponent::CatchAll, PathComponent::CatchAll) => true,
                _ => false,
            })
    }

    #[inline]
    fn accepts(&self, request: &Request) -> bool {
        self.method == request.method() && self.version == request.version()
    }
}

/// Route, handler and the middleware that runs before it
#[derive(Clone)]
pub struct DynamicResponder {
    pub route: Arc<DynamicRoute>,
    pub handler: DynamicHandler,
    pub middleware: DynamicMiddlewareChain,
}

impl DynamicResponder {
    pub fn new(route: DynamicRoute, handler: DynamicHandler) -> Self {
        Self {
            route: Arc::new(route),
            handler,
            middleware: DynamicMiddlewareChain::new(),
        }
    }

    pub fn with_middleware(mut self, middleware: DynamicMiddlewareChain) -> Self {
        self.middleware = middleware;
        self
    }

    /// Build the response from the template, run middleware then the handler,
    /// and write the result
    pub async fn respond<S>(
        &self,
        socket: &mut Socket<S>,
        request: Request,
        parameters: SmallVec<[String; 4]>,
        dates: &DateHeaderCache,
    ) -> Result<(), ResponderError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut response = DynamicResponse::from_template(&self.route.template);
        response.parameters = parameters;
        let omit_body = request.is_method(Method::Head);

        let response = if self.middleware.run(&request, &mut response).await? {
            (self.handler)(request, response).await?
        } else {
            response
        };
        response.write_to(socket, dates, omit_body).await
    }
}

impl std::fmt::Debug for DynamicResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicResponder")
            .field("route", &self.route.start_line())
            .field("middleware", &self.middleware)
            .finish()
    }
}

/// Resolved responder and its positional parameters
#[derive(Debug)]
pub struct DynamicMatch<'a> {
    pub responder: &'a DynamicResponder,
    /// Parameter segments in route order, catch-all tail appended
    pub parameters: SmallVec<[String; 4]>,
}

impl<'a> DynamicMatch<'a> {
    fn new(responder: &'a DynamicResponder, segments: &[&[u8]]) -> Self {
        let parameters = capture_parameters(&responder.route.path, segments)
            .into_iter()
            .map(|segment| String::from_utf8_lossy(segment).into_owned())
            .collect();
        Self {
            responder,
            parameters,
        }
    }
}

/// Dynamic routes of one case mode
#[derive(Debug, Clone)]
pub struct DynamicResponderStorage {
    case_sensitive: bool,
    parameterless: FxHashMap<Box<[u8]>, DynamicResponder>,
    parameterized: Vec<Vec<DynamicResponder>>,
    catchall: Vec<DynamicResponder>,
}

impl DynamicResponderStorage {
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            case_sensitive,
            parameterless: FxHashMap::default(),
            parameterized: Vec::new(),
            catchall: Vec::new(),
        }
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn len(&self) -> usize {
        self.parameterless.len()
            + self.parameterized.iter().map(Vec::len).sum::<usize>()
            + self.catchall.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a responder. A route already registered with the same method,
    /// version and path shape is rejected unless `allow_override`, in which
    /// case it is replaced in place.
    pub fn register(&mut self, responder: DynamicResponder, allow_override: bool) -> Result<(), RouterError> {
        let route = responder.route.clone();
        if route.case_sensitive != self.case_sensitive {
            return Err(RouterError::InvalidRoute {
                route: route.start_line(),
                reason: "case mode differs from storage".to_string(),
            });
        }

        if route.is_parameterless() {
            let key = self.parameterless_key(&route);
            if self.parameterless.contains_key(&key) && !allow_override {
                return Err(RouterError::DuplicateRoute {
                    route: route.start_line(),
                });
            }
            self.parameterless.insert(key, responder);
            return Ok(());
        }

        let tier = if route.is_catch_all() {
            &mut self.catchall
        } else {
            let count = route.path.len();
            if self.parameterized.len() <= count {
                self.parameterized.resize_with(count + 1, Vec::new);
            }
            &mut self.parameterized[count]
        };

        match tier.iter().position(|existing| existing.route.same_route(&route)) {
            Some(_) if !allow_override => Err(RouterError::DuplicateRoute {
                route: route.start_line(),
            }),
            Some(index) => {
                tier[index] = responder;
                Ok(())
            }
            None => {
                tier.push(responder);
                Ok(())
            }
        }
    }

    /// First matching responder across the three tiers
    pub fn resolve(&self, request: &Request) -> Option<DynamicMatch<'_>> {
        if !self.parameterless.is_empty() {
            let line = if self.case_sensitive {
                request.start_line()
            } else {
                request.start_line_lowercased()
            };
            if let Some(responder) = self.parameterless.get(line) {
                return Some(DynamicMatch {
                    responder,
                    parameters: SmallVec::new(),
                });
            }
        }

        let segments = request.path_components();

        if let Some(bucket) = self.parameterized.get(segments.len()) {
            let found = bucket.iter().find(|responder| {
                responder.route.accepts(request)
                    && matches_exact(&responder.route.path, &segments, self.case_sensitive)
            });
            if let Some(responder) = found {
                return Some(DynamicMatch::new(responder, &segments));
            }
        }

        self.catchall
            .iter()
            .find(|responder| {
                responder.route.accepts(request)
                    && matches_catchall(&responder.route.path, &segments, self.case_sensitive)
            })
            .map(|responder| DynamicMatch::new(responder, &segments))
    }

    fn parameterless_key(&self, route: &DynamicRoute) -> Box<[u8]> {
        let line = route.start_line();
        if self.case_sensitive {
            line.into_bytes().into_boxed_slice()
        } else {
            line.to_ascii_lowercase().into_bytes().into_boxed_slice()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;
    use bytes::Bytes;

    fn request(raw: &'static str) -> Request {
        Request::parse(Bytes::from_static(raw.as_bytes())).unwrap().unwrap()
    }

    fn get(path: &'static str) -> Request {
        let raw: &'static str = Box::leak(format!("GET {} HTTP/1.1\r\n\r\n", path).into_boxed_str());
        request(raw)
    }

    fn responder(method: Method, path: &str, tag: &'static str) -> DynamicResponder {
        let route = DynamicRoute::new(method, path)
            .unwrap()
            .template(RouteTemplate::text(tag));
        DynamicResponder::new(route, handler(|_, response| async move { Ok(response) }))
    }

    fn tag(found: Option<DynamicMatch<'_>>) -> Option<String> {
        let found = found?;
        match &found.responder.route.template.body {
            crate::response::StaticBody::Text(text) => Some(text.to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_parameterless_priority() {
        let mut storage = DynamicResponderStorage::new(true);
        storage.register(responder(Method::Get, "/:x", "param"), false).unwrap();
        storage.register(responder(Method::Get, "/health", "health"), false).unwrap();

        assert_eq!(tag(storage.resolve(&get("/health"))).as_deref(), Some("health"));
        assert_eq!(tag(storage.resolve(&get("/other"))).as_deref(), Some("param"));
    }

    #[test]
    fn test_bucket_isolation() {
        let mut storage = DynamicResponderStorage::new(true);
        storage.register(responder(Method::Get, "/a/:x", "two"), false).unwrap();
        storage.register(responder(Method::Get, "/a/:x/:y", "three"), false).unwrap();

        assert_eq!(tag(storage.resolve(&get("/a/1"))).as_deref(), Some("two"));
        assert_eq!(tag(storage.resolve(&get("/a/1/2"))).as_deref(), Some("three"));
        assert!(storage.resolve(&get("/a/1/2/3")).is_none());
        assert!(storage.resolve(&get("/a")).is_none());
    }

    #[test]
    fn test_registration_order_wins() {
        let mut storage = DynamicResponderStorage::new(true);
        storage.register(responder(Method::Get, "/users/:id", "first"), false).unwrap();
        storage.register(responder(Method::Get, "/:section/:id", "second"), false).unwrap();

        assert_eq!(tag(storage.resolve(&get("/users/7"))).as_deref(), Some("first"));
        assert_eq!(tag(storage.resolve(&get("/posts/7"))).as_deref(), Some("second"));
    }

    #[test]
    fn test_parameters_captured() {
        let mut storage = DynamicResponderStorage::new(true);
        storage.register(responder(Method::Get, "/users/:id/posts/:post", "p"), false).unwrap();

        let found = storage.resolve(&get("/users/42/posts/7?x=1")).unwrap();
        assert_eq!(found.parameters.as_slice(), ["42", "7"]);
    }

    #[test]
    fn test_catch_all_absorption() {
        let mut storage = DynamicResponderStorage::new(true);
        storage.register(responder(Method::Get, "/static/*", "files"), false).unwrap();

        let found = storage.resolve(&get("/static/css/site/app.css")).unwrap();
        assert_eq!(found.parameters.as_slice(), ["css", "site", "app.css"]);

        let found = storage.resolve(&get("/static")).unwrap();
        assert!(found.parameters.is_empty());

        assert!(storage.resolve(&get("/public/app.css")).is_none());
    }

    #[test]
    fn test_catch_all_after_buckets() {
        let mut storage = DynamicResponderStorage::new(true);
        storage.register(responder(Method::Get, "/files/*", "catch"), false).unwrap();
        storage.register(responder(Method::Get, "/files/:name", "exact"), false).unwrap();

        assert_eq!(tag(storage.resolve(&get("/files/a"))).as_deref(), Some("exact"));
        assert_eq!(tag(storage.resolve(&get("/files/a/b"))).as_deref(), Some("catch"));
    }

    #[test]
    fn test_method_must_match() {
        let mut storage = DynamicResponderStorage::new(true);
        storage.register(responder(Method::Post, "/users/:id", "post"), false).unwrap();
        storage.register(responder(Method::Post, "/ping", "ping"), false).unwrap();

        assert!(storage.resolve(&get("/users/1")).is_none());
        assert!(storage.resolve(&get("/ping")).is_none());
        let found = storage.resolve(&request("POST /users/1 HTTP/1.1\r\n\r\n"));
        assert_eq!(tag(found).as_deref(), Some("post"));
    }

    #[test]
    fn test_case_insensitive_storage() {
        let mut storage = DynamicResponderStorage::new(false);
        let route = |path: &str, tag: &'static str| {
            let route = DynamicRoute::new(Method::Get, path)
                .unwrap()
                .case_insensitive()
                .template(RouteTemplate::text(tag));
            DynamicResponder::new(route, handler(|_, response| async move { Ok(response) }))
        };
        storage.register(route("/Health", "health"), false).unwrap();
        storage.register(route("/Users/:id", "user"), false).unwrap();

        assert_eq!(tag(storage.resolve(&get("/HEALTH"))).as_deref(), Some("health"));
        let found = storage.resolve(&get("/users/AbC")).unwrap();
        assert_eq!(found.parameters.as_slice(), ["AbC"]);

        let err = storage
            .register(responder(Method::Get, "/x", "sensitive"), false)
            .unwrap_err();
        assert!(matches!(err, RouterError::InvalidRoute { .. }));
    }

    #[test]
    fn test_duplicates_and_override() {
        let mut storage = DynamicResponderStorage::new(true);
        storage.register(responder(Method::Get, "/health", "one"), false).unwrap();
        let err = storage
            .register(responder(Method::Get, "/health", "two"), false)
            .unwrap_err();
        assert_eq!(
            err,
            RouterError::DuplicateRoute {
                route: "GET /health HTTP/1.1".to_string()
            }
        );
        storage.register(responder(Method::Get, "/health", "two"), true).unwrap();
        assert_eq!(tag(storage.resolve(&get("/health"))).as_deref(), Some("two"));

        storage.register(responder(Method::Get, "/u/:id", "a"), false).unwrap();
        assert!(storage.register(responder(Method::Get, "/u/:name", "b"), false).is_err());
        storage.register(responder(Method::Get, "/u/:name", "b"), true).unwrap();
        assert_eq!(tag(storage.resolve(&get("/u/1"))).as_deref(), Some("b"));
        assert_eq!(storage.len(), 2);
    }

    #[tokio::test]
    async fn test_respond_runs_middleware_then_handler() {
        use crate::middleware::from_fn;
        use tokio::io::{duplex, AsyncReadExt};

        let route = DynamicRoute::new(Method::Get, "/users/:id")
            .unwrap()
            .template(RouteTemplate::text("template"));
        let mut chain = DynamicMiddlewareChain::new();
        chain.add(from_fn(|_, response| {
            response.set_header(crate::http::HeaderName::Server, "squall");
            Ok(true)
        }));
        let responder = DynamicResponder::new(
            route,
            handler(|_, response| async move {
                let id = response.parameter(0).unwrap_or("?").to_string();
                Ok(response.with_status(StatusCode::CREATED).with_body(crate::response::Body::Text(id)))
            }),
        )
        .with_middleware(chain);

        let mut storage = DynamicResponderStorage::new(true);
        storage.register(responder, false).unwrap();
        let request = get("/users/42");
        let found = storage.resolve(&request).unwrap();

        let (mut client, server) = duplex(1024);
        let mut socket = Socket::new(server);
        let dates = DateHeaderCache::new();
        found
            .responder
            .respond(&mut socket, request.clone(), found.parameters, &dates)
            .await
            .unwrap();
        socket.close().await.unwrap();

        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 201\r\ndate: "));
        assert!(text.contains("server: squall\r\n"));
        assert!(text.ends_with("content-length: 2\r\n\r\n42"));
    }
}
