use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Notification, Role};

/// Events pushed from the gateway to clients.
///
/// The gateway is push-only: there is no client-to-server command type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Handshake accepted, connection joined its user group
    #[serde(rename_all = "camelCase")]
    Ready { user_id: Uuid, role: Role },

    /// One notification for the connected user
    Notification(Notification),
}

impl GatewayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "Ready",
            Self::Notification(_) => "Notification",
        }
    }
}
