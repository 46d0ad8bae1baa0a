use crate::api::Body;
use futures::future;
use http::{header, Method, Request, Response, StatusCode};
use prometheus_client::registry::Registry;
use std::{convert::Infallible, sync::Arc};
use tokio::sync::watch;
use tracing::warn;

/// Serves liveness, readiness and metrics.
#[derive(Clone)]
pub struct Admin {
    ready: watch::Receiver<bool>,
    registry: Arc<Registry>,
}

// === impl Admin ===

impl Admin {
    pub fn new(ready: watch::Receiver<bool>, registry: Arc<Registry>) -> Self {
        Self { ready, registry }
    }

    fn handle(&self, method: &Method, path: &str) -> Response<Body> {
        if !matches!(*method, Method::GET | Method::HEAD) {
            return text(StatusCode::METHOD_NOT_ALLOWED, "");
        }

        match path {
            "/live" => text(StatusCode::OK, "live\n"),
            "/ready" => {
                if *self.ready.borrow() {
                    text(StatusCode::OK, "ready\n")
                } else {
                    text(StatusCode::INTERNAL_SERVER_ERROR, "not ready\n")
                }
            }
            "/metrics" => {
                let mut buf = String::new();
                if let Err(error) = prometheus_client::encoding::text::encode(&mut buf, &self.registry)
                {
                    warn!(%error, "Failed to encode metrics");
                    return text(StatusCode::INTERNAL_SERVER_ERROR, "");
                }
                Response::builder()
                    .status(StatusCode::OK)
                    .header(
                        header::CONTENT_TYPE,
                        "application/openmetrics-text; version=1.0.0; charset=utf-8",
                    )
                    .body(Body::from(buf))
                    .expect("metrics response must be valid")
            }
            _ => text(StatusCode::NOT_FOUND, ""),
        }
    }
}

impl<B> tower::Service<Request<B>> for Admin {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = future::Ready<Result<Response<Body>, Infallible>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        future::ok(self.handle(req.method(), req.uri().path()))
    }
}

fn text(status: StatusCode, body: &'static str) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(body))
        .expect("admin response must be valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use prometheus_client::metrics::counter::Counter;
    use tower::ServiceExt;

    async fn get(admin: &Admin, path: &str) -> (StatusCode, String) {
        let rsp = admin
            .clone()
            .oneshot(Request::get(path).body(Body::default()).unwrap())
            .await
            .unwrap();
        let status = rsp.status();
        let body = rsp.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn ready_follows_the_signal() {
        let (tx, rx) = watch::channel(false);
        let admin = Admin::new(rx, Arc::new(Registry::default()));

        assert_eq!(
            get(&admin, "/ready").await,
            (StatusCode::INTERNAL_SERVER_ERROR, "not ready\n".to_string())
        );
        assert_eq!(get(&admin, "/live").await.0, StatusCode::OK);

        tx.send(true).unwrap();
        assert_eq!(
            get(&admin, "/ready").await,
            (StatusCode::OK, "ready\n".to_string())
        );
        assert_eq!(get(&admin, "/nope").await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serves_metrics() {
        let mut registry = Registry::default();
        let counter = Counter::<u64>::default();
        registry.register("requests", "Count of requests", counter.clone());
        counter.inc();

        let (_tx, rx) = watch::channel(true);
        let admin = Admin::new(rx, Arc::new(registry));
        let (status, body) = get(&admin, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("requests_total 1"), "{body}");
    }
}
