use crate::{
    clusters::{Accepted, Clusters},
    operations::{OperationResult, Tracker, OPERATIONS_STATUS, OPERATION_RESULTS},
    FrontendConfig,
};
use bytes::Bytes;
use futures::future;
use http::{header, request::Parts, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use rp_frontend_changefeed::{SharedRoleSets, SharedVersions};
use rp_frontend_core::{
    code, CloudError, Error as ApiError, OpenShiftCluster, ResourceId, OPENSHIFT_CLUSTERS_TYPE,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, trace};

/// Serves the frontend's ARM API.
#[derive(Clone)]
pub struct Api {
    clusters: Clusters,
    tracker: Tracker,
    versions: SharedVersions,
    role_sets: SharedRoleSets,
    config: Arc<FrontendConfig>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[source] BoxError),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to build response: {0}")]
    Response(#[from] http::Error),
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Body = http_body_util::Full<Bytes>;

const AZURE_ASYNC_OPERATION: &str = "azure-asyncoperation";

#[derive(Debug, PartialEq)]
enum Route {
    Cluster(ResourceId),
    OperationStatus {
        subscription_id: String,
        operation_id: String,
    },
    OperationResult {
        subscription_id: String,
        operation_id: String,
    },
    OpenShiftVersions,
    RoleSets,
}

#[derive(Serialize)]
struct List<T> {
    value: Vec<T>,
}

// === impl Api ===

impl<B> tower::Service<Request<B>> for Api
where
    B: hyper::body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        trace!(method = %req.method(), uri = %req.uri(), "Request");
        let api = self.clone();
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| Error::Request(e.into()))?
                .to_bytes();
            api.handle(parts, body).await
        })
    }
}

impl Api {
    pub fn new(
        clusters: Clusters,
        tracker: Tracker,
        versions: SharedVersions,
        role_sets: SharedRoleSets,
        config: Arc<FrontendConfig>,
    ) -> Self {
        Self {
            clusters,
            tracker,
            versions,
            role_sets,
            config,
        }
    }

    async fn handle(self, parts: Parts, body: Bytes) -> Result<Response<Body>, Error> {
        debug!(method = %parts.method, path = %parts.uri.path(), "Handling request");
        let Some(route) = self.route(parts.uri.path()) else {
            return cloud_error(&CloudError::new(
                StatusCode::NOT_FOUND,
                code::NOT_FOUND,
                "",
                format!("The requested path '{}' could not be found.", parts.uri.path()),
            ));
        };

        match self.dispatch(&parts, route, body).await {
            Ok(rsp) => Ok(rsp),
            Err(ApiError::Internal(error)) => {
                error!(%error, "Request failed");
                cloud_error(&CloudError::internal())
            }
            Err(error) => {
                debug!(%error, "Request rejected");
                cloud_error(&error.to_cloud_error())
            }
        }
    }

    async fn dispatch(
        &self,
        parts: &Parts,
        route: Route,
        body: Bytes,
    ) -> Result<Response<Body>, ApiError> {
        match (&parts.method, route) {
            (&Method::GET, Route::Cluster(resource)) => {
                let oc = self.clusters.get(&resource).await?;
                json_response(StatusCode::OK, &oc)
            }

            (&Method::PUT | &Method::PATCH, Route::Cluster(resource)) => {
                let request = parse_cluster(parts, &body)?;
                let accepted = self
                    .clusters
                    .put_or_patch(&resource, &request, parts.method == Method::PATCH)
                    .await?;
                self.accepted_response(parts, &resource, accepted)
            }

            (&Method::DELETE, Route::Cluster(resource)) => {
                match self.clusters.delete(&resource).await? {
                    Some(accepted) => self.accepted_response(parts, &resource, accepted),
                    None => empty_response(StatusCode::NO_CONTENT),
                }
            }

            (
                &Method::GET,
                Route::OperationStatus {
                    subscription_id,
                    operation_id,
                },
            ) => {
                let status = self.tracker.status(&subscription_id, &operation_id).await?;
                json_response(StatusCode::OK, &status)
            }

            (
                &Method::GET,
                Route::OperationResult {
                    subscription_id,
                    operation_id,
                },
            ) => match self.tracker.result(&subscription_id, &operation_id).await? {
                OperationResult::InProgress { location } => {
                    let mut rsp = empty_response(StatusCode::ACCEPTED)?;
                    rsp.headers_mut()
                        .insert(header::LOCATION, header_value(&url(parts, &location))?);
                    Ok(rsp)
                }
                OperationResult::Succeeded(oc) => json_response(StatusCode::OK, &oc),
                OperationResult::NoContent => empty_response(StatusCode::NO_CONTENT),
                OperationResult::Failed(error) => json_response(error.status, &error),
            },

            (&Method::GET, Route::OpenShiftVersions) => {
                let value = self.versions.read().list();
                json_response(StatusCode::OK, &List { value })
            }

            (&Method::GET, Route::RoleSets) => {
                let value = self.role_sets.read().list();
                json_response(StatusCode::OK, &List { value })
            }

            _ => empty_response(StatusCode::METHOD_NOT_ALLOWED),
        }
    }

    fn route(&self, path: &str) -> Option<Route> {
        let segments = path.trim_matches('/').split('/').collect::<Vec<_>>();
        let namespace = &self.config.resource_provider_namespace;

        if let Ok(resource) = ResourceId::parse(path) {
            if resource.provider_namespace.eq_ignore_ascii_case(namespace)
                && resource.resource_type.eq_ignore_ascii_case(OPENSHIFT_CLUSTERS_TYPE)
            {
                return Some(Route::Cluster(resource));
            }
            return None;
        }

        let (subscription_id, rest) = match segments[..] {
            [subscriptions, sub, providers, ns, locations, location, ref rest @ ..]
                if subscriptions.eq_ignore_ascii_case("subscriptions")
                    && providers.eq_ignore_ascii_case("providers")
                    && locations.eq_ignore_ascii_case("locations")
                    && ns.eq_ignore_ascii_case(namespace)
                    && location.eq_ignore_ascii_case(&self.config.location) =>
            {
                (sub.to_string(), rest)
            }
            _ => return None,
        };

        match rest {
            [kind, id] if kind.eq_ignore_ascii_case(OPERATIONS_STATUS) => {
                Some(Route::OperationStatus {
                    subscription_id,
                    operation_id: id.to_string(),
                })
            }
            [kind, id] if kind.eq_ignore_ascii_case(OPERATION_RESULTS) => {
                Some(Route::OperationResult {
                    subscription_id,
                    operation_id: id.to_string(),
                })
            }
            [kind] if kind.eq_ignore_ascii_case("openShiftVersions") => {
                Some(Route::OpenShiftVersions)
            }
            [kind] if kind.eq_ignore_ascii_case("platformWorkloadIdentityRoleSets") => {
                Some(Route::RoleSets)
            }
            _ => None,
        }
    }

    /// Responds to a committed mutation, pointing the client at the operation to poll.
    fn accepted_response(
        &self,
        parts: &Parts,
        resource: &ResourceId,
        accepted: Accepted,
    ) -> Result<Response<Body>, ApiError> {
        let Accepted {
            operation_id,
            status,
            cluster,
        } = accepted;
        let sub = &resource.subscription_id;

        let mut rsp = match cluster {
            Some(oc) => json_response(status, &oc)?,
            None => empty_response(status)?,
        };
        let status_url = url(
            parts,
            &self
                .tracker
                .operation_path(sub, OPERATIONS_STATUS, &operation_id),
        );
        rsp.headers_mut()
            .insert(AZURE_ASYNC_OPERATION, header_value(&status_url)?);
        if status == StatusCode::ACCEPTED {
            let result_url = url(
                parts,
                &self
                    .tracker
                    .operation_path(sub, OPERATION_RESULTS, &operation_id),
            );
            rsp.headers_mut()
                .insert(header::LOCATION, header_value(&result_url)?);
        }
        Ok(rsp)
    }
}

fn parse_cluster(parts: &Parts, body: &[u8]) -> Result<OpenShiftCluster, ApiError> {
    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let media_type = content_type.split(';').next().unwrap_or_default().trim();
    if !media_type.eq_ignore_ascii_case("application/json") {
        return Err(ApiError::InvalidState(CloudError::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            code::UNSUPPORTED_MEDIA_TYPE,
            "",
            format!(
                "The content media type '{content_type}' is not supported. Only 'application/json' is supported."
            ),
        )));
    }

    serde_json::from_slice(body).map_err(|error| {
        ApiError::bad_request(
            code::INVALID_REQUEST_CONTENT,
            "",
            format!("The request content was invalid and could not be deserialized: '{error}'."),
        )
    })
}

/// Builds an absolute URL for `path` on the host the request was addressed to, carrying the
/// request's API version.
fn url(parts: &Parts, path: &str) -> String {
    let mut url = match parts.headers.get(header::HOST).and_then(|h| h.to_str().ok()) {
        Some(host) => format!("https://{host}{path}"),
        None => path.to_string(),
    };
    let api_version = parts.uri.query().and_then(|q| {
        q.split('&')
            .find_map(|kv| kv.strip_prefix("api-version="))
    });
    if let Some(v) = api_version {
        url.push_str("?api-version=");
        url.push_str(v);
    }
    url
}

fn header_value(s: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(s).map_err(|e| ApiError::Internal(e.into()))
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Result<Response<Body>, ApiError> {
    let bytes = serde_json::to_vec(value).map_err(|e| ApiError::Internal(e.into()))?;
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .map_err(|e| ApiError::Internal(e.into()))
}

fn empty_response(status: StatusCode) -> Result<Response<Body>, ApiError> {
    Response::builder()
        .status(status)
        .body(Body::default())
        .map_err(|e| ApiError::Internal(e.into()))
}

fn cloud_error(error: &CloudError) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(error)?;
    let rsp = Response::builder()
        .status(error.status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))?;
    Ok(rsp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::Harness;
    use hyper::body::Frame;
    use rp_frontend_changefeed::RoleSets;
    use std::{
        convert::Infallible,
        pin::Pin,
        task::{Context, Poll},
    };
    use tower::ServiceExt;

    /// A request body that does not implement `Debug`.
    struct Opaque(Option<Bytes>);

    impl hyper::body::Body for Opaque {
        type Data = Bytes;
        type Error = Infallible;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
            Poll::Ready(self.0.take().map(|b| Ok(Frame::data(b))))
        }
    }

    fn mk_parts(uri: &str, host: Option<&str>) -> Parts {
        let mut req = Request::builder().uri(uri);
        if let Some(host) = host {
            req = req.header(header::HOST, host);
        }
        req.body(()).unwrap().into_parts().0
    }

    #[test]
    fn urls_keep_host_and_api_version() {
        let parts = mk_parts(
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.RedHatOpenShift/openShiftClusters/c?api-version=2023-11-22",
            Some("management.azure.com"),
        );
        assert_eq!(
            url(&parts, "/subscriptions/sub/providers/p/locations/eastus/operationresults/1"),
            "https://management.azure.com/subscriptions/sub/providers/p/locations/eastus/operationresults/1?api-version=2023-11-22"
        );

        let parts = mk_parts("/x", None);
        assert_eq!(url(&parts, "/y"), "/y");
    }

    #[tokio::test]
    async fn serves_any_request_body() {
        let h = Harness::new().await;
        let api = Api::new(
            h.clusters.clone(),
            h.tracker.clone(),
            h.versions.clone(),
            RoleSets::shared(),
            h.config.clone(),
        );
        let req = Request::get("/healthz")
            .body(Opaque(Some(Bytes::from_static(b"ignored"))))
            .unwrap();
        let rsp = api.oneshot(req).await.unwrap();
        assert_eq!(rsp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn renders_cloud_errors() {
        let error = CloudError::new(
            StatusCode::FORBIDDEN,
            "AuthorizationFailed",
            "",
            "The client does not have authorization to perform the action.",
        );
        let rsp = cloud_error(&error).unwrap();
        assert_eq!(rsp.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            rsp.headers().get(header::CONTENT_TYPE),
            Some(&HeaderValue::from_static("application/json"))
        );
    }

    #[test]
    fn rejects_other_media_types() {
        let mut parts = mk_parts("/x", None);
        parts
            .headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let error = parse_cluster(&parts, b"{}").unwrap_err();
        assert_eq!(error.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        parts.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        assert!(parse_cluster(&parts, b"{}").is_ok());
        let error = parse_cluster(&parts, b"{").unwrap_err();
        assert_eq!(error.to_cloud_error().body.code, code::INVALID_REQUEST_CONTENT);
    }
}
