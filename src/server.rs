//! HTTP server and graceful shutdown.
//!
//! On SIGTERM or Ctrl-C the server:
//! 1. Immediately stops `listener.accept()` — no new connections are made.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`], which lets `main` exit cleanly.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::status::Status;

/// Request bodies above this size are answered with `413` unless
/// [`Server::body_limit`] says otherwise.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// The HTTP server.
pub struct Server {
    addr: String,
    body_limit: usize,
}

impl Server {
    /// Configures the server to bind to `addr` (`host:port`) when
    /// [`serve`](Server::serve) is called.
    ///
    /// ```rust,no_run
    /// use waylay::Server;
    /// let server = Server::bind("0.0.0.0:8080");
    /// ```
    pub fn bind(addr: impl Into<String>) -> Self {
        Self { addr: addr.into(), body_limit: DEFAULT_BODY_LIMIT }
    }

    /// Largest request body, in bytes, read into memory before dispatch.
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but stops accepting when `signal`
    /// resolves instead of on process signals.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let addr: SocketAddr = self.addr.parse().map_err(|_| Error::Addr(self.addr.clone()))?;
        let listener = TcpListener::bind(addr).await?;
        let router = Arc::new(router);
        let body_limit = self.body_limit;

        info!(addr = %addr, body_limit, "waylay listening");

        let mut tasks = tokio::task::JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a signal stops accepting right away,
                // even with connections still queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            async move { dispatch(router, req, body_limit).await }
                        });

                        // HTTP/1.1 or HTTP/2, whatever the client negotiates.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("waylay stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Collects the body, converts the request and hands it to the router.
///
/// Infallible: every failure becomes a response, hyper never sees an error.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<Incoming>,
    body_limit: usize,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match read_body(&parts, body, body_limit).await {
        Ok(body) => body,
        Err(rejection) => return Ok(rejection.into_inner()),
    };

    let response = router.dispatch(Request::from_parts(parts, body)).await;
    Ok(response.into_inner())
}

/// Reads at most `limit` bytes of body.
///
/// A declared `content-length` above the limit is refused without reading;
/// a body that grows past it while streaming is cut off. Both answer `413`.
async fn read_body<B>(parts: &http::request::Parts, body: B, limit: usize) -> Result<Bytes, Response>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let declared = parts
        .headers
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        warn!(path = parts.uri.path(), limit, "request body too large");
        return Err(Response::status(Status::ContentTooLarge));
    }

    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            warn!(path = parts.uri.path(), limit, "request body too large");
            Err(Response::status(Status::ContentTooLarge))
        }
        Err(e) => {
            warn!(path = parts.uri.path(), "failed to read request body: {e}");
            Err(Response::status(Status::BadRequest))
        }
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or Ctrl-C. A handler that cannot be
/// installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_malformed_bind_address() {
        let err = Server::bind("not an address")
            .serve_with_shutdown(Router::new(), async {})
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Addr(ref a) if a == "not an address"));
    }

    #[tokio::test]
    async fn stops_when_signalled() {
        let res = Server::bind("127.0.0.1:0")
            .serve_with_shutdown(Router::new(), async {})
            .await;

        assert!(res.is_ok());
    }

    fn parts(content_length: Option<usize>) -> http::request::Parts {
        let mut builder = http::Request::builder().method("POST").uri("/loginController/login4");
        if let Some(len) = content_length {
            builder = builder.header("content-length", len);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn reads_bodies_within_the_limit() {
        let body = Full::new(Bytes::from_static(b"name=abc"));

        let bytes = read_body(&parts(Some(8)), body, 8).await.unwrap();

        assert_eq!(&bytes[..], b"name=abc");
    }

    #[tokio::test]
    async fn refuses_declared_length_above_the_limit() {
        let body = Full::new(Bytes::from_static(b"name=abc"));

        let res = read_body(&parts(Some(8)), body, 4).await.unwrap_err();

        assert_eq!(res.status_code(), 413);
    }

    #[tokio::test]
    async fn cuts_off_undeclared_bodies_above_the_limit() {
        let body = Full::new(Bytes::from(vec![b'a'; 64]));

        let res = read_body(&parts(None), body, 16).await.unwrap_err();

        assert_eq!(res.status_code(), 413);
    }
}
