use crate::api::Body;
use http::{Request, Response};
use hyper::{body::Incoming, server::conn::http1};
use hyper_util::{rt::TokioIo, service::TowerToHyperService};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Serves HTTP/1 connections accepted on `listener` until `drain` is signaled.
///
/// Once signaled, no new connections are accepted and open connections are shut down
/// gracefully; the drain completes when every in-flight request has been answered.
pub async fn serve<S>(listener: TcpListener, svc: S, drain: drain::Watch) -> anyhow::Result<()>
where
    S: tower::Service<Request<Incoming>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
{
    let addr = listener.local_addr()?;
    info!(%addr, "HTTP server listening");

    let signaled = drain.clone().signaled();
    tokio::pin!(signaled);
    loop {
        let (io, client) = tokio::select! {
            res = listener.accept() => match res {
                Ok(conn) => conn,
                Err(error) => {
                    warn!(%error, "Failed to accept connection");
                    continue;
                }
            },
            _ = &mut signaled => {
                debug!(%addr, "No longer accepting connections");
                return Ok(());
            }
        };

        let svc = TowerToHyperService::new(svc.clone());
        let drain = drain.clone();
        tokio::spawn(async move {
            let conn = http1::Builder::new().serve_connection(TokioIo::new(io), svc);
            tokio::pin!(conn);
            tokio::select! {
                res = &mut conn => {
                    if let Err(error) = res {
                        debug!(%error, %client, "Connection closed with error");
                    }
                }
                handle = drain.signaled() => {
                    conn.as_mut().graceful_shutdown();
                    if let Err(error) = handle.release_after(conn).await {
                        debug!(%error, %client, "Connection closed with error");
                    }
                }
            }
        });
    }
}
