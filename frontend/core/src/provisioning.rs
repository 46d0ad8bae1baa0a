use serde::{Deserialize, Serialize};
use std::fmt;

/// The provisioning state of a cluster, and of the operation acting on it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProvisioningState {
    Creating,
    Updating,
    AdminUpdating,
    Deleting,
    Succeeded,
    Failed,
    Canceled,
}

// === impl ProvisioningState ===

impl ProvisioningState {
    /// Terminal states are never left by an operation; a cluster leaves them only when a new
    /// mutation is accepted.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Creating => "Creating",
            Self::Updating => "Updating",
            Self::AdminUpdating => "AdminUpdating",
            Self::Deleting => "Deleting",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Canceled => "Canceled",
        }
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
