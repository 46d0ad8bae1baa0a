use bytes::Bytes;
use http::{header, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use pretty_assertions::assert_eq;
use rp_frontend_runtime::{
    changefeed::{CacheMetrics, ChangefeedCache, EnabledVersions, RoleSets, SharedVersions, Synchronizer},
    core::{
        CloudError, Error, OpenShiftCluster, OpenShiftClusterDocument, OpenShiftVersion, OpenShiftVersionDocument,
        OpenShiftVersionProperties, ProvisioningState, Subscription, SubscriptionDocument,
        SubscriptionState,
    },
    database::{Database, MemoryDatabase},
    Api, Clusters, FrontendConfig, Tracker,
};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";
const HOST: &str = "management.azure.com";
const API_VERSION: &str = "2023-11-22";

struct Frontend {
    store: MemoryDatabase,
    db: Database,
    tracker: Tracker,
    versions: SharedVersions,
    api: Api,
}

impl Frontend {
    async fn new() -> Self {
        let config = Arc::new(FrontendConfig::new("eastus", "Microsoft.RedHatOpenShift"));
        let store = MemoryDatabase::new();
        let db = store.database(config.retry);
        db.subscriptions
            .create(SubscriptionDocument {
                id: SUBSCRIPTION.to_string(),
                etag: None,
                subscription: Subscription {
                    state: SubscriptionState::Registered,
                    properties: None,
                },
            })
            .await
            .unwrap();

        let versions = EnabledVersions::shared();
        let role_sets = RoleSets::shared();
        let tracker = Tracker::new(
            db.open_shift_clusters.clone(),
            db.async_operations.clone(),
            config.clone(),
        );
        let clusters = Clusters::new(db.clone(), tracker.clone(), versions.clone(), config.clone());
        let api = Api::new(clusters, tracker.clone(), versions.clone(), role_sets, config);
        Self {
            store,
            db,
            tracker,
            versions,
            api,
        }
    }

    async fn seed_cluster(&self, name: &str) -> OpenShiftClusterDocument {
        let id = cluster_path(name);
        let mut doc = OpenShiftClusterDocument {
            id: format!("doc-{name}"),
            key: id.to_lowercase(),
            open_shift_cluster: OpenShiftCluster {
                id,
                name: name.to_string(),
                type_: "Microsoft.RedHatOpenShift/openShiftClusters".to_string(),
                location: "eastus".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        doc.open_shift_cluster.properties.provisioning_state = ProvisioningState::Succeeded;
        doc.open_shift_cluster.properties.cluster_profile.version = "4.14.16".to_string();
        self.db.open_shift_clusters.create(doc).await.unwrap()
    }

    async fn send(&self, method: Method, path: &str, body: Option<&str>) -> Response<Full<Bytes>> {
        let mut req = Request::builder()
            .method(method)
            .uri(format!("{path}?api-version={API_VERSION}"))
            .header(header::HOST, HOST);
        if body.is_some() {
            req = req.header(header::CONTENT_TYPE, "application/json");
        }
        let req = req
            .body(Full::new(Bytes::from(body.unwrap_or_default().to_string())))
            .unwrap();
        self.api.clone().oneshot(req).await.unwrap()
    }
}

fn cluster_path(name: &str) -> String {
    format!(
        "/subscriptions/{SUBSCRIPTION}/resourceGroups/resourceGroup/providers/Microsoft.RedHatOpenShift/openShiftClusters/{name}"
    )
}

fn mk_version(version: &str, enabled: bool, default: bool) -> OpenShiftVersionDocument {
    OpenShiftVersionDocument {
        id: version.to_string(),
        etag: None,
        open_shift_version: OpenShiftVersion {
            properties: OpenShiftVersionProperties {
                version: version.to_string(),
                enabled,
                default,
                ..Default::default()
            },
            ..Default::default()
        },
    }
}

fn operation_url(kind: &str, id: &str) -> String {
    format!(
        "https://{HOST}/subscriptions/{SUBSCRIPTION}/providers/Microsoft.RedHatOpenShift/locations/eastus/{kind}/{id}?api-version={API_VERSION}"
    )
}

fn header_str(rsp: &Response<Full<Bytes>>, name: impl header::AsHeaderName) -> String {
    rsp.headers()
        .get(name)
        .expect("header must be set")
        .to_str()
        .unwrap()
        .to_string()
}

async fn json(rsp: Response<Full<Bytes>>) -> serde_json::Value {
    let body = rsp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

/// The path component of an absolute URL returned in a response header.
fn path_of(url: &str) -> &str {
    let path = url.strip_prefix(&format!("https://{HOST}")).unwrap();
    path.split('?').next().unwrap()
}

#[tokio::test]
async fn delete_is_polled_to_completion() {
    let fe = Frontend::new().await;
    fe.seed_cluster("resourceName").await;

    let rsp = fe.send(Method::DELETE, &cluster_path("resourceName"), None).await;
    assert_eq!(rsp.status(), StatusCode::ACCEPTED);

    let ops = fe.store.async_operations.documents();
    assert_eq!(ops.len(), 1);
    let operation_id = ops[0].id.clone();
    let status_url = header_str(&rsp, "azure-asyncoperation");
    let result_url = header_str(&rsp, header::LOCATION);
    assert_eq!(status_url, operation_url("operationsstatus", &operation_id));
    assert_eq!(result_url, operation_url("operationresults", &operation_id));

    let rsp = fe.send(Method::GET, path_of(&status_url), None).await;
    assert_eq!(rsp.status(), StatusCode::OK);
    let status = json(rsp).await;
    assert_eq!(status["name"], operation_id.as_str());
    assert_eq!(status["status"], "Deleting");
    assert!(status.get("endTime").is_none());

    let rsp = fe.send(Method::GET, path_of(&result_url), None).await;
    assert_eq!(rsp.status(), StatusCode::ACCEPTED);
    assert_eq!(header_str(&rsp, header::LOCATION), result_url);

    // The backend finishes the deletion.
    let doc = fe
        .db
        .open_shift_clusters
        .get(&cluster_path("resourceName").to_lowercase())
        .await
        .unwrap();
    fe.db.open_shift_clusters.delete(&doc).await.unwrap();
    fe.tracker
        .complete(&operation_id, ProvisioningState::Succeeded, None, None)
        .await
        .unwrap();

    let rsp = fe.send(Method::GET, path_of(&result_url), None).await;
    assert_eq!(rsp.status(), StatusCode::NO_CONTENT);

    let rsp = fe.send(Method::GET, path_of(&status_url), None).await;
    let status = json(rsp).await;
    assert_eq!(status["status"], "Succeeded");
    assert!(status.get("endTime").is_some());

    // Deleting again is a no-op.
    let rsp = fe.send(Method::DELETE, &cluster_path("resourceName"), None).await;
    assert_eq!(rsp.status(), StatusCode::NO_CONTENT);
    assert!(rsp.headers().get("azure-asyncoperation").is_none());
    assert_eq!(fe.store.async_operations.len(), 1);
}

#[tokio::test]
async fn failed_update_replays_its_status() {
    let fe = Frontend::new().await;
    fe.seed_cluster("cluster").await;

    let rsp = fe.send(Method::PATCH, &cluster_path("cluster"), Some("{}")).await;
    assert_eq!(rsp.status(), StatusCode::OK);
    let status_url = header_str(&rsp, "azure-asyncoperation");
    let operation_id = fe.store.async_operations.documents()[0].id.clone();
    assert_eq!(status_url, operation_url("operationsstatus", &operation_id));

    let failure = CloudError::new(
        StatusCode::FORBIDDEN,
        "AuthorizationFailed",
        "",
        "The client does not have authorization to perform the action.",
    );
    fe.tracker
        .end_operation(
            &cluster_path("cluster").to_lowercase(),
            &operation_id,
            ProvisioningState::Failed,
            Some(&Error::InvalidState(failure)),
        )
        .await
        .unwrap();

    let result_url = operation_url("operationresults", &operation_id);
    let rsp = fe.send(Method::GET, path_of(&result_url), None).await;
    assert_eq!(rsp.status(), StatusCode::FORBIDDEN);
    assert_eq!(json(rsp).await["error"]["code"], "AuthorizationFailed");

    let rsp = fe.send(Method::GET, path_of(&status_url), None).await;
    let status = json(rsp).await;
    assert_eq!(status["status"], "Failed");
    assert_eq!(status["error"]["code"], "AuthorizationFailed");
}

#[tokio::test]
async fn put_returns_the_created_cluster() {
    let fe = Frontend::new().await;
    fe.versions.write().apply(mk_version("4.14.16", true, true));

    let body = r#"{"properties":{"clusterProfile":{"domain":"example","pullSecret":"secret"}}}"#;
    let rsp = fe.send(Method::PUT, &cluster_path("cluster"), Some(body)).await;
    assert_eq!(rsp.status(), StatusCode::CREATED);
    assert!(rsp.headers().get(header::LOCATION).is_none());
    let status_url = header_str(&rsp, "azure-asyncoperation");

    let oc = json(rsp).await;
    assert_eq!(oc["properties"]["provisioningState"], "Creating");
    assert_eq!(oc["properties"]["clusterProfile"]["version"], "4.14.16");
    assert!(oc["properties"]["clusterProfile"].get("pullSecret").is_none());

    let rsp = fe.send(Method::GET, path_of(&status_url), None).await;
    assert_eq!(json(rsp).await["status"], "Creating");

    let rsp = fe.send(Method::GET, &cluster_path("CLUSTER"), None).await;
    assert_eq!(rsp.status(), StatusCode::OK);
    assert_eq!(json(rsp).await["name"], "cluster");
}

#[tokio::test]
async fn rejected_requests_carry_cloud_errors() {
    let fe = Frontend::new().await;
    fe.seed_cluster("cluster").await;

    let rsp = fe
        .send(Method::PATCH, &cluster_path("cluster"), Some("{"))
        .await;
    assert_eq!(rsp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(rsp).await["error"]["code"], "InvalidRequestContent");

    let rsp = fe.send(Method::GET, &cluster_path("absent"), None).await;
    assert_eq!(rsp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(rsp).await["error"]["code"], "NotFound");

    let rsp = fe
        .send(
            Method::GET,
            &format!("/subscriptions/{SUBSCRIPTION}/providers/Microsoft.RedHatOpenShift/locations/eastus/operationsstatus/unknown"),
            None,
        )
        .await;
    assert_eq!(rsp.status(), StatusCode::NOT_FOUND);

    let rsp = fe.send(Method::GET, "/healthz", None).await;
    assert_eq!(rsp.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        json(rsp).await["error"]["message"],
        "The requested path '/healthz' could not be found."
    );

    // Operations are only served for the configured location.
    let rsp = fe
        .send(
            Method::GET,
            &format!("/subscriptions/{SUBSCRIPTION}/providers/Microsoft.RedHatOpenShift/locations/westus/openShiftVersions"),
            None,
        )
        .await;
    assert_eq!(rsp.status(), StatusCode::NOT_FOUND);

    let rsp = fe.send(Method::POST, &cluster_path("cluster"), None).await;
    assert_eq!(rsp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn lists_versions_from_the_change_feed() {
    let fe = Frontend::new().await;
    for (version, enabled) in [("4.14.16", true), ("4.15.2", true), ("4.13.40", false)] {
        fe.db
            .open_shift_versions
            .create(mk_version(version, enabled, false))
            .await
            .unwrap();
    }

    let (sync, mut last_sync) = Synchronizer::new(
        "openshiftversions",
        fe.db.open_shift_versions.change_feed(),
        fe.versions.clone(),
        Duration::from_millis(10),
        CacheMetrics::default(),
    );
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(sync.run(shutdown.clone()));
    last_sync.wait_for(Option::is_some).await.unwrap();
    assert!(fe.store.open_shift_versions.all_iterators_consumed());

    let rsp = fe
        .send(
            Method::GET,
            &format!("/subscriptions/{SUBSCRIPTION}/providers/Microsoft.RedHatOpenShift/locations/EastUS/openShiftVersions"),
            None,
        )
        .await;
    assert_eq!(rsp.status(), StatusCode::OK);
    let versions = json(rsp).await["value"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["properties"]["version"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(versions, ["4.14.16", "4.15.2"]);

    shutdown.cancel();
    task.await.unwrap();
}
