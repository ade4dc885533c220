//! Accept loop
//!
//! One tokio task per connection. Each task reads a request head (and any
//! declared body), dispatches it once and closes the connection.
//! - SO_REUSEPORT for load balancing
//! - TCP_NODELAY for low latency
//! - Graceful drain on shutdown

use crate::date::DateRefresher;
use crate::error::{ResponderError, SocketError};
use crate::request::Request;
use crate::router::{Dispatch, DispatchOutcome};
use crate::socket::Socket;
use crate::{Error, Result};
use bytes::BytesMut;
use memchr::memmem;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub hostname: String,
    pub port: u16,
    /// Runtime worker threads
    pub workers: usize,
    /// Listen backlog
    pub backlog: i32,
    /// Largest accepted request head, blank line included
    pub max_head_size: usize,
    /// Largest accepted declared body
    pub max_body_size: usize,
    /// Time allowed to read a complete request
    pub read_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "0.0.0.0".to_string(),
            port: 3000,
            workers: default_workers(),
            backlog: 1024,
            max_head_size: 16 * 1024,
            max_body_size: 1024 * 1024,
            read_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(feature = "native")]
fn default_workers() -> usize {
    num_cpus::get()
}

#[cfg(not(feature = "native"))]
fn default_workers() -> usize {
    1
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `SQUALL_HOST`, `SQUALL_PORT`, `SQUALL_WORKERS`
    /// and `SQUALL_READ_TIMEOUT_MS`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(host) = lookup("SQUALL_HOST") {
            config.hostname = host;
        }
        if let Some(port) = lookup("SQUALL_PORT") {
            config.port = parse_var("SQUALL_PORT", &port)?;
        }
        if let Some(workers) = lookup("SQUALL_WORKERS") {
            config.workers = parse_var("SQUALL_WORKERS", &workers)?;
            if config.workers == 0 {
                return Err(Error::Config("SQUALL_WORKERS must be at least 1".to_string()));
            }
        }
        if let Some(timeout) = lookup("SQUALL_READ_TIMEOUT_MS") {
            config.read_timeout = Duration::from_millis(parse_var("SQUALL_READ_TIMEOUT_MS", &timeout)?);
        }
        Ok(config)
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn max_head_size(mut self, size: usize) -> Self {
        self.max_head_size = size;
        self
    }

    pub fn max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.hostname, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid address {}:{}: {}", self.hostname, self.port, e)))
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{}={:?}: {}", key, value, e)))
}

/// Create a TCP socket with optimizations
#[cfg(feature = "native")]
pub fn create_optimized_socket(addr: &SocketAddr, backlog: i32) -> std::io::Result<socket2::Socket> {
    use socket2::{Domain, Protocol, Type};

    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = socket2::Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // Allow binding to address in TIME_WAIT
    socket.set_reuse_address(true)?;

    // Kernel load balancing across listeners
    #[cfg(unix)]
    socket.set_reuse_port(true)?;

    socket.set_nodelay(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&(*addr).into())?;
    socket.listen(backlog)?;

    Ok(socket)
}

#[cfg(feature = "native")]
async fn bind_listener(addr: SocketAddr, backlog: i32) -> std::io::Result<TcpListener> {
    let socket = create_optimized_socket(&addr, backlog)?;
    TcpListener::from_std(socket.into())
}

#[cfg(not(feature = "native"))]
async fn bind_listener(addr: SocketAddr, _backlog: i32) -> std::io::Result<TcpListener> {
    TcpListener::bind(addr).await
}

/// Tracks active connections for graceful shutdown
///
/// Used to:
/// - Count active connections
/// - Signal shutdown to reject new connections
/// - Wait for existing connections to drain
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    active: AtomicU64,
    shutting_down: AtomicBool,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn decrement(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    /// Count the connection until the guard drops
    pub fn track(self: &Arc<Self>) -> ConnectionGuard {
        self.increment();
        ConnectionGuard {
            tracker: self.clone(),
        }
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    pub fn start_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Wait until no connection is active. `None` waits indefinitely.
    /// Returns false when the timeout ran out first.
    pub async fn wait_for_drain(&self, timeout: Option<Duration>) -> bool {
        let start = Instant::now();
        loop {
            if self.count() == 0 {
                return true;
            }
            if let Some(t) = timeout {
                if start.elapsed() >= t {
                    return false;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Decrements the tracker on drop, panics included
#[derive(Debug)]
pub struct ConnectionGuard {
    tracker: Arc<ConnectionTracker>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.tracker.decrement();
    }
}

/// Stops a running [`Server`]
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    signal: Arc<watch::Sender<bool>>,
    tracker: Arc<ConnectionTracker>,
}

impl ShutdownHandle {
    /// Stop accepting; in-flight connections keep running
    pub fn shutdown(&self) {
        self.tracker.start_shutdown();
        self.signal.send_replace(true);
    }

    /// Stop accepting, then wait for in-flight connections.
    /// Returns true if all connections drained before `timeout`.
    pub async fn graceful_shutdown(&self, timeout: Option<Duration>) -> bool {
        self.shutdown();
        let drained = self.tracker.wait_for_drain(timeout).await;
        if drained {
            info!("all connections drained");
        } else {
            warn!(active = self.tracker.count(), "drain timed out");
        }
        drained
    }

    pub fn is_shutdown(&self) -> bool {
        *self.signal.borrow()
    }
}

/// Per-connection read limits
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub max_head_size: usize,
    pub max_body_size: usize,
    pub read_timeout: Duration,
}

impl From<&ServerConfig> for ConnectionLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_head_size: config.max_head_size,
            max_body_size: config.max_body_size,
            read_timeout: config.read_timeout,
        }
    }
}

/// Bound listener serving a router
pub struct Server<D: Dispatch> {
    listener: TcpListener,
    router: Arc<D>,
    limits: ConnectionLimits,
    tracker: Arc<ConnectionTracker>,
    signal: Arc<watch::Sender<bool>>,
    shutdown: watch::Receiver<bool>,
}

impl<D: Dispatch> Server<D> {
    pub async fn bind(config: &ServerConfig, router: Arc<D>) -> Result<Self> {
        let addr = config.addr()?;
        let listener = bind_listener(addr, config.backlog).await?;
        let (signal, shutdown) = watch::channel(false);
        Ok(Self {
            listener,
            router,
            limits: ConnectionLimits::from(config),
            tracker: Arc::new(ConnectionTracker::new()),
            signal: Arc::new(signal),
            shutdown,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            signal: self.signal.clone(),
            tracker: self.tracker.clone(),
        }
    }

    pub fn tracker(&self) -> &Arc<ConnectionTracker> {
        &self.tracker
    }

    /// Accept until shut down. Keeps the router's date cache fresh meanwhile.
    pub async fn serve(self) -> Result<()> {
        let mut shutdown = self.shutdown.clone();
        let refresher = DateRefresher::spawn(self.router.date_cache(), self.shutdown.clone());
        info!(addr = %self.local_addr()?, "listening");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(err) => {
                            warn!(error = %err, "accept failed");
                            continue;
                        }
                    };

                    // Reject new connections during shutdown
                    if self.tracker.is_shutting_down() {
                        drop(stream);
                        continue;
                    }
                    if let Err(err) = stream.set_nodelay(true) {
                        debug!(error = %err, "set_nodelay failed");
                    }

                    let router = self.router.clone();
                    let limits = self.limits;
                    let guard = self.tracker.track();
                    tokio::spawn(async move {
                        let _guard = guard;
                        match serve_connection(&*router, stream, &limits).await {
                            Ok(outcome) => trace!(%peer, ?outcome, "connection done"),
                            Err(err) => debug!(%peer, error = %err, "connection failed"),
                        }
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.tracker.start_shutdown();
        info!(active = self.tracker.count(), "stopped accepting");
        if let Err(err) = refresher.await {
            warn!(error = %err, "date refresher task failed");
        }
        Ok(())
    }
}

/// Read one request, dispatch it, close.
///
/// Malformed or oversized requests go to the router's error responder with
/// a 400, 413 or 431 status. A peer closing early gets nothing.
pub async fn serve_connection<D, S>(router: &D, stream: S, limits: &ConnectionLimits) -> Result<DispatchOutcome>
where
    D: Dispatch,
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut socket = Socket::new(stream);
    let read = tokio::time::timeout(limits.read_timeout, read_request(&mut socket, limits)).await;

    let request = match read {
        Err(_) => {
            debug!(timeout_ms = limits.read_timeout.as_millis() as u64, "request read timed out");
            return Err(SocketError::TimedOut.into());
        }
        Ok(Ok(Some(request))) => request,
        Ok(Ok(None)) => {
            trace!("peer closed before a complete request");
            return Ok(DispatchOutcome::Unmatched);
        }
        Ok(Err(err)) => {
            if let Some(status) = err.request_status() {
                let rejected = ResponderError::Rejected {
                    status,
                    message: err.to_string(),
                };
                let outcome = router.reject(&mut socket, rejected).await;
                trace!(?outcome, "request rejected");
                if let Err(close_err) = socket.close().await {
                    trace!(error = %close_err, "close failed");
                }
            }
            return Err(err);
        }
    };

    let outcome = router.dispatch(&mut socket, request).await;
    if let Err(err) = socket.close().await {
        trace!(error = %err, "close failed");
    }
    Ok(outcome)
}

/// Read until the head and the declared body are complete.
/// `Ok(None)` when the peer closes first.
async fn read_request<S>(socket: &mut Socket<S>, limits: &ConnectionLimits) -> Result<Option<Request>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut buf = BytesMut::with_capacity(limits.max_head_size.min(4096));
    let mut needed: Option<usize> = None;

    loop {
        if socket.read(&mut buf).await? == 0 {
            return Ok(None);
        }

        let total = match needed {
            Some(total) => total,
            None => match memmem::find(&buf, b"\r\n\r\n") {
                Some(end) => {
                    let head_len = end + 4;
                    if head_len > limits.max_head_size {
                        return Err(head_too_large(head_len, limits));
                    }
                    let head = Request::parse(buf.clone().freeze())?
                        .ok_or_else(|| Error::Parse("incomplete request head".to_string()))?;
                    let body_len = match head.header("content-length") {
                        None => 0,
                        Some(value) => head
                            .content_length()
                            .ok_or_else(|| Error::Parse(format!("invalid content-length: {:?}", value)))?,
                    };
                    if body_len > limits.max_body_size {
                        return Err(Error::BodyTooLarge {
                            size: body_len,
                            limit: limits.max_body_size,
                        });
                    }
                    let total = head_len + body_len;
                    needed = Some(total);
                    total
                }
                None if buf.len() > limits.max_head_size => {
                    return Err(head_too_large(buf.len(), limits));
                }
                None => continue,
            },
        };

        if buf.len() >= total {
            buf.truncate(total);
            return Request::parse(buf.freeze());
        }
        buf.reserve(total - buf.len());
    }
}

fn head_too_large(size: usize, limits: &ConnectionLimits) -> Error {
    Error::HeadTooLarge {
        size,
        limit: limits.max_head_size,
    }
}
