//! Request dispatch over static and dynamic route tiers
//!
//! A request is tried against, in order:
//! 1. case-sensitive static routes (exact start line)
//! 2. case-insensitive static routes (lower-cased start line)
//! 3. case-sensitive dynamic routes, with their middleware
//! 4. case-insensitive dynamic routes
//! 5. route groups whose prefix covers the path, each with the same tiers
//!
//! then the not-found responder, then the [`UnmatchedPolicy`].

mod builder;
mod error_responder;
mod mutable;
mod table;

pub use builder::{RouteGroup, RouterBuilder};
pub use error_responder::{ErrorResponder, JsonErrorResponder};
pub use mutable::MutableRouter;
pub use table::Tier;

use crate::date::DateHeaderCache;
use crate::error::ResponderError;
use crate::request::Request;
use crate::response::StaticResponder;
use crate::socket::Socket;
use crate::storage::{DynamicMatch, DynamicResponder};
use futures_util::future::{BoxFuture, FutureExt};
use smallvec::SmallVec;
use std::sync::Arc;
use table::{Resolved, RouteTable};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace, warn};

const BARE_NOT_FOUND: &[u8] = b"HTTP/1.1 404\r\ncontent-length: 0\r\n\r\n";

/// What to do when nothing matched and no not-found responder is set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnmatchedPolicy {
    /// Write nothing; the caller closes the connection
    #[default]
    Close,
    /// Write `HTTP/1.1 404` with an empty body
    BareNotFound,
}

/// How a dispatch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A route responded
    Responded(Tier),
    /// The not-found responder responded
    NotFound,
    /// Nothing matched; a bare 404 was written
    BareNotFound,
    /// Nothing matched; nothing was written
    Unmatched,
    /// A responder failed. `responded` tells whether an error response was
    /// written.
    Failed { responded: bool },
}

impl DispatchOutcome {
    /// Whether a complete response reached the socket
    pub fn responded(&self) -> bool {
        match self {
            DispatchOutcome::Responded(_)
            | DispatchOutcome::NotFound
            | DispatchOutcome::BareNotFound => true,
            DispatchOutcome::Unmatched => false,
            DispatchOutcome::Failed { responded } => *responded,
        }
    }
}

pub(crate) enum NotFound {
    Static(StaticResponder),
    Dynamic(DynamicResponder),
}

/// Immutable route table plus fallbacks, shared across connections
pub struct Router {
    table: RouteTable,
    not_found: Option<NotFound>,
    error_responder: Option<Arc<dyn ErrorResponder>>,
    unmatched: UnmatchedPolicy,
    dates: Arc<DateHeaderCache>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Routes across every tier and group
    pub fn route_count(&self) -> usize {
        self.table.len()
    }

    pub fn dates(&self) -> &Arc<DateHeaderCache> {
        &self.dates
    }

    /// Dispatch one request and write its response
    pub async fn handle<S>(&self, socket: &mut Socket<S>, request: Request) -> DispatchOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let written = socket.bytes_written();
        trace!(
            method = %request.method(),
            path = request.path(),
            "dispatching request"
        );

        let result = match self.table.resolve(&request) {
            Some(Resolved::Static(responder, tier)) => responder
                .respond(socket, &self.dates)
                .await
                .map(|_| DispatchOutcome::Responded(tier)),
            Some(Resolved::Dynamic(DynamicMatch { responder, parameters }, tier)) => responder
                .respond(socket, request, parameters, &self.dates)
                .await
                .map(|_| DispatchOutcome::Responded(tier)),
            None => self.unmatched(socket, request).await,
        };

        match result {
            Ok(outcome) => outcome,
            Err(err) => self.fail(socket, err, written).await,
        }
    }

    async fn unmatched<S>(&self, socket: &mut Socket<S>, request: Request) -> Result<DispatchOutcome, ResponderError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        debug!(
            method = %request.method(),
            path = request.path(),
            "no route matched"
        );
        match &self.not_found {
            Some(NotFound::Static(responder)) => {
                responder.respond(socket, &self.dates).await?;
                Ok(DispatchOutcome::NotFound)
            }
            Some(NotFound::Dynamic(responder)) => {
                responder
                    .respond(socket, request, SmallVec::new(), &self.dates)
                    .await?;
                Ok(DispatchOutcome::NotFound)
            }
            None => match self.unmatched {
                UnmatchedPolicy::Close => Ok(DispatchOutcome::Unmatched),
                UnmatchedPolicy::BareNotFound => {
                    socket.write_buffer(BARE_NOT_FOUND).await?;
                    Ok(DispatchOutcome::BareNotFound)
                }
            },
        }
    }

    /// Hand the error to the error responder, unless part of a response
    /// already went out or the socket itself failed
    async fn fail<S>(&self, socket: &mut Socket<S>, err: ResponderError, written: u64) -> DispatchOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        warn!(error = %err, "responder failed");

        let Some(error_responder) = &self.error_responder else {
            return DispatchOutcome::Failed { responded: false };
        };
        if err.is_socket() || socket.bytes_written() != written {
            return DispatchOutcome::Failed { responded: false };
        }

        let response = error_responder.render(&err);
        match response.write_to(socket, &self.dates, false).await {
            Ok(()) => DispatchOutcome::Failed { responded: true },
            Err(write_err) => {
                warn!(error = %write_err, "error response failed");
                DispatchOutcome::Failed { responded: false }
            }
        }
    }

    /// Answer a request that failed before dispatch through the error
    /// responder; with none configured nothing is written
    pub async fn reject<S>(&self, socket: &mut Socket<S>, err: ResponderError) -> DispatchOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let written = socket.bytes_written();
        self.fail(socket, err, written).await
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.route_count())
            .field("groups", &self.table.groups.len())
            .field("not_found", &self.not_found.is_some())
            .field("error_responder", &self.error_responder.is_some())
            .field("unmatched", &self.unmatched)
            .finish()
    }
}

/// Something that can serve a parsed request on a socket
pub trait Dispatch: Send + Sync + 'static {
    /// Date cache the responses are stamped from
    fn date_cache(&self) -> Arc<DateHeaderCache>;

    fn dispatch<'a, S>(&'a self, socket: &'a mut Socket<S>, request: Request) -> BoxFuture<'a, DispatchOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'a;

    /// Report a request that could not be read or parsed
    fn reject<'a, S>(&'a self, socket: &'a mut Socket<S>, err: ResponderError) -> BoxFuture<'a, DispatchOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'a;
}

impl Dispatch for Router {
    fn date_cache(&self) -> Arc<DateHeaderCache> {
        self.dates.clone()
    }

    fn dispatch<'a, S>(&'a self, socket: &'a mut Socket<S>, request: Request) -> BoxFuture<'a, DispatchOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'a,
    {
        self.handle(socket, request).boxed()
    }

    fn reject<'a, S>(&'a self, socket: &'a mut Socket<S>, err: ResponderError) -> BoxFuture<'a, DispatchOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'a,
    {
        Router::reject(self, socket, err).boxed()
    }
}

impl Dispatch for MutableRouter {
    fn date_cache(&self) -> Arc<DateHeaderCache> {
        self.load().dates().clone()
    }

    fn dispatch<'a, S>(&'a self, socket: &'a mut Socket<S>, request: Request) -> BoxFuture<'a, DispatchOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'a,
    {
        let router = self.load();
        async move { router.handle(socket, request).await }.boxed()
    }

    fn reject<'a, S>(&'a self, socket: &'a mut Socket<S>, err: ResponderError) -> BoxFuture<'a, DispatchOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'a,
    {
        let router = self.load();
        async move { router.reject(socket, err).await }.boxed()
    }
}
