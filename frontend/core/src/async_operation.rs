use crate::{CloudError, CloudErrorBody, OpenShiftCluster, ProvisioningState};
use http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tracks a single long-running mutation against a cluster.
///
/// Only the embedded operation's state, end time and error change after creation (plus the
/// cluster snapshot recorded when the operation completes).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncOperationDocument {
    pub id: String,

    /// Lower-cased key of the cluster the operation acts on.
    pub open_shift_cluster_key: String,

    #[serde(rename = "_etag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    pub async_operation: AsyncOperation,

    /// The cluster as it stood when the operation completed. Absent while the operation runs and
    /// after a completed delete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_shift_cluster: Option<OpenShiftCluster>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncOperation {
    /// Fully qualified `operationsstatus` path of the operation.
    pub id: String,
    pub name: String,
    pub initial_provisioning_state: ProvisioningState,
    pub provisioning_state: ProvisioningState,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CloudErrorBody>,

    /// The status code the failure was reported with, replayed alongside `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_status: Option<u16>,
}

/// The operation as reported to a polling client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatus {
    pub id: String,
    pub name: String,
    pub status: ProvisioningState,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CloudErrorBody>,
}

/// Builds the path of an operation resource, e.g.
/// `/subscriptions/{sub}/providers/{namespace}/locations/{location}/operationsstatus/{id}`.
///
/// The location is always lower-cased.
pub fn operation_path(
    subscription_id: &str,
    provider_namespace: &str,
    location: &str,
    kind: &str,
    operation_id: &str,
) -> String {
    format!(
        "/subscriptions/{}/providers/{}/locations/{}/{}/{}",
        subscription_id,
        provider_namespace,
        location.to_lowercase(),
        kind,
        operation_id
    )
}

// === impl AsyncOperation ===

impl AsyncOperation {
    pub fn is_terminal(&self) -> bool {
        self.provisioning_state.is_terminal()
    }

    /// The subscription component of the operation's path.
    pub fn subscription_id(&self) -> Option<&str> {
        let mut segments = self.id.split('/').filter(|s| !s.is_empty());
        match (segments.next(), segments.next()) {
            (Some(s), Some(id)) if s.eq_ignore_ascii_case("subscriptions") => Some(id),
            _ => None,
        }
    }

    /// Moves the operation to `state`.
    ///
    /// Terminal states never regress: once the operation has reached one, every later
    /// transition is ignored. The end time is stamped on the first transition into a terminal
    /// state and the error, with its status, is only retained for failures. Returns whether the
    /// operation changed.
    pub fn transition(
        &mut self,
        state: ProvisioningState,
        error: Option<CloudError>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.is_terminal() {
            return false;
        }

        self.provisioning_state = state;
        if state.is_terminal() {
            self.end_time.get_or_insert(now);
            if state == ProvisioningState::Failed {
                self.error_status = error.as_ref().map(|e| e.status.as_u16());
                self.error = error.map(|e| e.body);
            }
        }
        true
    }

    /// The failure as it was reported, if the operation failed with an error.
    ///
    /// Records written without a status recover it from the error code.
    pub fn cloud_error(&self) -> Option<CloudError> {
        let body = self.error.clone()?;
        let status = self
            .error_status
            .and_then(|s| StatusCode::from_u16(s).ok())
            .unwrap_or_else(|| body.status());
        Some(CloudError { status, body })
    }

    pub fn to_status(&self) -> OperationStatus {
        OperationStatus {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.provisioning_state,
            start_time: self.start_time,
            end_time: self.end_time,
            error: self.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code;
    use chrono::TimeZone;

    fn mk_operation(state: ProvisioningState) -> AsyncOperation {
        AsyncOperation {
            id: operation_path(
                "00000000-0000-0000-0000-000000000000",
                "Microsoft.RedHatOpenShift",
                "EastUS",
                "operationsstatus",
                "11111111-1111-1111-1111-111111111111",
            ),
            name: "11111111-1111-1111-1111-111111111111".to_string(),
            initial_provisioning_state: ProvisioningState::Succeeded,
            provisioning_state: state,
            start_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            end_time: None,
            error: None,
            error_status: None,
        }
    }

    #[test]
    fn operation_path_lowercases_location() {
        let op = mk_operation(ProvisioningState::Deleting);
        assert_eq!(
            op.id,
            "/subscriptions/00000000-0000-0000-0000-000000000000/providers/Microsoft.RedHatOpenShift/locations/eastus/operationsstatus/11111111-1111-1111-1111-111111111111"
        );
        assert_eq!(
            op.subscription_id(),
            Some("00000000-0000-0000-0000-000000000000")
        );
    }

    #[test]
    fn end_time_is_set_once() {
        let first = Utc.timestamp_opt(1_700_000_100, 0).unwrap();
        let later = Utc.timestamp_opt(1_700_000_200, 0).unwrap();

        let mut op = mk_operation(ProvisioningState::Updating);
        assert!(op.transition(ProvisioningState::Updating, None, first));
        assert_eq!(op.end_time, None);

        assert!(op.transition(ProvisioningState::Succeeded, None, first));
        assert_eq!(op.end_time, Some(first));

        // Terminal states never regress, and the end time is not restamped.
        assert!(!op.transition(ProvisioningState::Failed, None, later));
        assert_eq!(op.provisioning_state, ProvisioningState::Succeeded);
        assert_eq!(op.end_time, Some(first));
    }

    #[test]
    fn failure_keeps_error() {
        let now = Utc.timestamp_opt(1_700_000_100, 0).unwrap();
        let error = CloudError::new(
            StatusCode::FORBIDDEN,
            "AuthorizationFailed",
            "",
            "The client does not have authorization to perform the action.",
        );

        let mut op = mk_operation(ProvisioningState::Creating);
        assert!(op.transition(ProvisioningState::Failed, Some(error.clone()), now));
        assert_eq!(op.error, Some(error.body.clone()));
        assert_eq!(op.error_status, Some(403));
        assert_eq!(op.cloud_error(), Some(error));

        let mut op = mk_operation(ProvisioningState::Creating);
        assert!(op.transition(
            ProvisioningState::Succeeded,
            Some(CloudError::internal()),
            now
        ));
        assert_eq!(op.error, None);
        assert_eq!(op.error_status, None);
        assert_eq!(op.cloud_error(), None);
    }

    #[test]
    fn records_without_a_status_recover_it_from_the_code() {
        let mut op = mk_operation(ProvisioningState::Failed);
        op.error = Some(CloudErrorBody {
            code: code::INTERNAL_SERVER_ERROR.to_string(),
            message: "Internal server error.".to_string(),
            target: String::new(),
        });
        assert_eq!(op.cloud_error(), Some(CloudError::internal()));
    }

    #[test]
    fn status_omits_initial_state() {
        let op = mk_operation(ProvisioningState::Deleting);
        let json = serde_json::to_value(op.to_status()).unwrap();
        assert_eq!(json["status"], "Deleting");
        assert!(json.get("initialProvisioningState").is_none());
        assert!(json.get("endTime").is_none());
    }
}
