//! Exposition server.
//!
//! A plain accept loop over hyper's HTTP/1 connection builder, so the three
//! fixed timeouts can be enforced per connection:
//! - read: 5 s from the first byte of a request until it is dispatched,
//!   after which the connection is dropped
//! - write: 10 s per-request deadline (`TimeoutLayer`). On expiry the client
//!   gets a `408 Request Timeout` instead of a cut connection; this is
//!   intentional so scrapers see a status line.
//! - idle: keep-alive connections with nothing in flight or arriving for
//!   15 s are closed gracefully
//!
//! Failing to bind is returned as `TunnelError::Bind`; the binary treats it as fatal.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::Router;
use hyper::{body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tower::Service;
use tower_http::timeout::TimeoutLayer;

use promtunnel_core::error::{Result, TunnelError};

use crate::{app_state::AppState, router};

pub const READ_TIMEOUT: Duration = Duration::from_secs(5);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(15);

const DEADLINE_POLL_INTERVAL: Duration = Duration::from_millis(250);
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Bind the exposition listener on all interfaces.
pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .map_err(|source| TunnelError::Bind { addr, source })
}

/// Bind `port` and serve the four exposition routes until `shutdown` resolves.
pub async fn run<F>(port: u16, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    let listener = bind(port).await?;
    tracing::info!(port, "metrics server starting");

    serve(listener, router::build_router(state), shutdown).await;
    Ok(())
}

/// Serve `router` on an already bound listener until `shutdown` resolves.
///
/// Connections accepted before shutdown keep running on their own tasks.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F)
where
    F: Future<Output = ()> + Send,
{
    let router = router.layer(TimeoutLayer::new(WRITE_TIMEOUT));
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    tokio::spawn(serve_connection(stream, remote, router.clone()));
                }
                Err(e) => {
                    // EMFILE and friends; give the process a moment before retrying accept.
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            _ = &mut shutdown => {
                tracing::info!("metrics server stopped accepting connections");
                return;
            }
        }
    }
}

async fn serve_connection(stream: TcpStream, remote: SocketAddr, router: Router) {
    let activity = Arc::new(Activity::new());

    let tracked = Arc::clone(&activity);
    let service = service_fn(move |request: hyper::Request<Incoming>| {
        let mut router = router.clone();
        let in_flight = tracked.begin();
        async move {
            let response = router.call(request).await;
            drop(in_flight);
            response
        }
    });

    // No hyper timer: its header read timeout would also run while a
    // keep-alive connection waits for the next request. Both limits are
    // driven from `Activity` instead.
    let io = TrackedStream {
        inner: stream,
        activity: Arc::clone(&activity),
    };
    let conn = http1::Builder::new().serve_connection(TokioIo::new(io), service);
    tokio::pin!(conn);

    let mut closing = false;
    loop {
        tokio::select! {
            res = conn.as_mut() => {
                if let Err(e) = res {
                    tracing::debug!(%remote, error = %e, "connection closed with error");
                }
                return;
            }
            _ = tokio::time::sleep(DEADLINE_POLL_INTERVAL), if !closing => {
                match activity.check() {
                    Deadline::Open => {}
                    Deadline::ReadExpired => {
                        tracing::debug!(%remote, "request read timed out");
                        return;
                    }
                    Deadline::Idle => {
                        tracing::debug!(%remote, "closing idle connection");
                        conn.as_mut().graceful_shutdown();
                        closing = true;
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deadline {
    Open,
    /// A request started arriving more than `READ_TIMEOUT` ago and was never dispatched.
    ReadExpired,
    /// Nothing in flight or arriving for `IDLE_TIMEOUT`.
    Idle,
}

const NOT_READING: u64 = u64::MAX;

/// Per-connection bookkeeping for the read and idle timeouts.
///
/// All instants are millis since `opened`.
struct Activity {
    opened: Instant,
    last_done_ms: AtomicU64,
    /// First byte of a not yet dispatched request, or `NOT_READING`.
    reading_since_ms: AtomicU64,
    in_flight: AtomicUsize,
}

impl Activity {
    fn new() -> Self {
        Self {
            opened: Instant::now(),
            last_done_ms: AtomicU64::new(0),
            reading_since_ms: AtomicU64::new(NOT_READING),
            in_flight: AtomicUsize::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        self.opened.elapsed().as_millis() as u64
    }

    /// Bytes arrived from the peer.
    fn bytes_read(&self) {
        if self.in_flight.load(Ordering::Relaxed) > 0 {
            return;
        }
        let _ = self.reading_since_ms.compare_exchange(
            NOT_READING,
            self.now_ms(),
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }

    /// Request head parsed and handed to the router.
    fn begin(self: &Arc<Self>) -> InFlight {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        self.reading_since_ms.store(NOT_READING, Ordering::Relaxed);
        InFlight(Arc::clone(self))
    }

    fn check(&self) -> Deadline {
        if self.in_flight.load(Ordering::Relaxed) > 0 {
            return Deadline::Open;
        }
        let now = self.now_ms();
        let reading_since = self.reading_since_ms.load(Ordering::Relaxed);
        if reading_since != NOT_READING {
            if now.saturating_sub(reading_since) >= READ_TIMEOUT.as_millis() as u64 {
                return Deadline::ReadExpired;
            }
            return Deadline::Open;
        }
        let last_done = self.last_done_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last_done) >= IDLE_TIMEOUT.as_millis() as u64 {
            return Deadline::Idle;
        }
        Deadline::Open
    }
}

struct InFlight(Arc<Activity>);

impl Drop for InFlight {
    fn drop(&mut self) {
        let activity = &self.0;
        activity.last_done_ms.store(activity.now_ms(), Ordering::Relaxed);
        activity.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// `TcpStream` that reports inbound bytes to its connection's `Activity`.
struct TrackedStream {
    inner: TcpStream,
    activity: Arc<Activity>,
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let res = Pin::new(&mut self.inner).poll_read(cx, buf);
        if matches!(res, Poll::Ready(Ok(()))) && buf.filled().len() > before {
            self.activity.bytes_read();
        }
        res
    }
}

impl AsyncWrite for TrackedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backdate(activity: &Activity, field: &AtomicU64, by: Duration) {
        let now = activity.now_ms();
        field.store(now.saturating_sub(by.as_millis() as u64), Ordering::Relaxed);
    }

    #[test]
    fn fresh_connection_is_open() {
        let activity = Activity::new();
        assert_eq!(activity.check(), Deadline::Open);
    }

    #[test]
    fn waiting_between_requests_uses_idle_limit_not_read_limit() {
        // Build the clock as if the connection had been open for a while.
        let activity = Activity {
            opened: Instant::now() - Duration::from_secs(60),
            ..Activity::new()
        };
        backdate(&activity, &activity.last_done_ms, READ_TIMEOUT + Duration::from_secs(1));
        assert_eq!(activity.check(), Deadline::Open);

        backdate(&activity, &activity.last_done_ms, IDLE_TIMEOUT);
        assert_eq!(activity.check(), Deadline::Idle);
    }

    #[test]
    fn partial_request_expires_after_read_limit() {
        let activity = Activity {
            opened: Instant::now() - Duration::from_secs(60),
            ..Activity::new()
        };
        activity.bytes_read();
        assert_eq!(activity.check(), Deadline::Open);

        backdate(&activity, &activity.reading_since_ms, READ_TIMEOUT);
        assert_eq!(activity.check(), Deadline::ReadExpired);
    }

    #[test]
    fn in_flight_request_holds_connection_open() {
        let activity = Arc::new(Activity {
            opened: Instant::now() - Duration::from_secs(60),
            ..Activity::new()
        });
        activity.bytes_read();
        backdate(&activity, &activity.reading_since_ms, READ_TIMEOUT);

        let guard = activity.begin();
        assert_eq!(activity.check(), Deadline::Open);

        drop(guard);
        assert_eq!(activity.check(), Deadline::Open);
    }

    #[tokio::test]
    async fn bind_reports_address_in_use() {
        let held = TcpListener::bind("0.0.0.0:0").await.unwrap();
        let port = held.local_addr().unwrap().port();

        let err = bind(port).await.unwrap_err();
        assert!(matches!(err, TunnelError::Bind { .. }));
        assert_eq!(err.kind().as_str(), "BIND");
    }
}
