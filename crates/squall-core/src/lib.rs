//! squall-core: Start-line routed HTTP/1.x server core
//!
//! Static routes are rendered once at startup and served from a perfect-hash
//! table keyed by the request start line. Dynamic routes resolve through
//! length-bucketed path matching and run their middleware and handler per
//! request. Responses go out through vectored writes with a cached `date`
//! header spliced in.
//!
//! ## Features
//! - `native` - socket2-tuned listener (SO_REUSEPORT, backlog) and
//!   CPU-count worker defaults
//!
//! ## Example
//! ```no_run
//! use squall_core::{handler, Body, RouteTemplate, Router, Server, ServerConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> squall_core::Result<()> {
//! let router = Router::builder()
//!     .get_static("/hello", RouteTemplate::text("Hello, World!").dated(true))
//!     .get("/users/:id", handler(|_, response| async move {
//!         let id = response.parameter(0).unwrap_or_default().to_string();
//!         Ok(response.with_body(Body::Text(id)))
//!     }))
//!     .build()?;
//!
//! let server = Server::bind(&ServerConfig::default(), Arc::new(router)).await?;
//! server.serve().await
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod date;
pub mod error;
pub mod http;
pub mod middleware;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod socket;
pub mod storage;

// Re-exports
pub use date::{DateHeaderCache, DateRefresher};
pub use error::{
    CookieError, Error, MessageError, MiddlewareError, ResponderError, Result, RouterError,
    SocketError,
};
pub use http::{ContentType, Cookie, HeaderName, HttpVersion, MediaType, Method, SameSite, StatusCode};
pub use request::Request;
pub use response::{Body, ChunkSource, DynamicResponse, RouteTemplate, StaticBody, StaticResponder};
pub use router::{
    Dispatch, DispatchOutcome, ErrorResponder, JsonErrorResponder, MutableRouter, RouteGroup,
    Router, RouterBuilder, Tier, UnmatchedPolicy,
};
pub use server::{ConnectionTracker, Server, ServerConfig, ShutdownHandle};
pub use socket::Socket;
pub use storage::{handler, DynamicHandler, DynamicRoute, StaticRoute};

// Middleware re-exports
pub use middleware::{
    from_fn, DynamicMiddleware, DynamicMiddlewareChain, RequestId, RouteFilter, SecurityHeaders,
    StaticHeaders, StaticMiddleware,
};

pub use squall_router::KeyWidth;

#[cfg(feature = "native")]
pub use server::create_optimized_socket;
