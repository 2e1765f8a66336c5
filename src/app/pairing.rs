use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::app::adb::client::DeviceClient;
use crate::app::error::AppError;
use crate::app::models::DiscoveryCandidate;

const NETWORK_NAME_PREFIX: &str = "ADB_WIFI_";

/// Session-lived; regenerated for every pairing attempt and never written anywhere.
#[derive(Clone, PartialEq, Eq)]
pub struct PairingCredential {
    pub network_name: String,
    pub password: String,
}

impl PairingCredential {
    pub fn generate() -> Self {
        let name_id = Uuid::new_v4().simple().to_string();
        let password = Uuid::new_v4().simple().to_string();
        Self {
            network_name: format!("{NETWORK_NAME_PREFIX}{}", &name_id[..12]),
            password,
        }
    }

    /// The Android wireless-debugging QR payload.
    pub fn descriptor(&self) -> String {
        format!("WIFI:T:ADB;S:{};P:{};;", self.network_name, self.password)
    }
}

impl std::fmt::Debug for PairingCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingCredential")
            .field("network_name", &self.network_name)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub struct PairingInitiator {
    client: Arc<DeviceClient>,
}

impl PairingInitiator {
    pub fn new(client: Arc<DeviceClient>) -> Self {
        Self { client }
    }

    /// One attempt, no retry. A new attempt needs a new discovery session.
    pub async fn pair(
        &self,
        candidate: &DiscoveryCandidate,
        credential: &PairingCredential,
        trace_id: &str,
    ) -> Result<(), AppError> {
        let target = candidate.target();
        match self.client.pair(&target, &credential.password, trace_id).await {
            Ok(message) => {
                info!(trace_id = %trace_id, target = %target, message = %message, "paired over network");
                Ok(())
            }
            Err(err) => {
                warn!(trace_id = %trace_id, target = %target, error = %err, "pairing failed");
                Err(err)
            }
        }
    }
}
