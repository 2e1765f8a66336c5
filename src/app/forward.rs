use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::app::adb::client::DeviceClient;
use crate::app::error::AppError;
use crate::app::models::ForwardSpec;

/// Owns the single local->device forward of this process.
///
/// The local port is shared by every device, so a forward left on a previously selected device
/// would shadow a new one. Every establish therefore clears forwards on all devices first.
pub struct ForwardManager {
    client: Arc<DeviceClient>,
    settle_delay: Duration,
    active: Mutex<HashMap<String, ForwardSpec>>,
}

impl ForwardManager {
    pub fn new(client: Arc<DeviceClient>, settle_delay: Duration) -> Self {
        Self {
            client,
            settle_delay,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub async fn active(&self) -> Option<(String, ForwardSpec)> {
        let guard = self.active.lock().await;
        guard
            .iter()
            .next()
            .map(|(serial, spec)| (serial.clone(), spec.clone()))
    }

    pub async fn establish_forward(
        &self,
        known_devices: &[String],
        serial: &str,
        spec: &ForwardSpec,
        trace_id: &str,
    ) -> Result<(), AppError> {
        // Held for the whole sequence so concurrent callers cannot interleave teardown and create.
        let mut active = self.active.lock().await;

        if let Err(err) = self.remove_everywhere(&mut active, known_devices, trace_id).await {
            warn!(trace_id = %trace_id, serial = %serial, error = %err, "forward teardown failed");
            return Err(err);
        }

        // Removal completes asynchronously inside the adb server.
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        if let Err(err) = self.client.create_forward(serial, spec, trace_id).await {
            warn!(trace_id = %trace_id, serial = %serial, forward = %spec, error = %err, "forward create failed");
            return Err(err);
        }

        active.insert(serial.to_string(), spec.clone());
        info!(trace_id = %trace_id, serial = %serial, forward = %spec, "forward established");
        Ok(())
    }

    pub async fn teardown_all(&self, known_devices: &[String], trace_id: &str) -> Result<(), AppError> {
        let mut active = self.active.lock().await;
        self.remove_everywhere(&mut active, known_devices, trace_id).await
    }

    /// Partial removals are not rolled back; `--remove-all` is idempotent.
    async fn remove_everywhere(
        &self,
        active: &mut HashMap<String, ForwardSpec>,
        known_devices: &[String],
        trace_id: &str,
    ) -> Result<(), AppError> {
        let listed = self.client.list_forwards(trace_id).await?;

        let targets: BTreeSet<String> = known_devices
            .iter()
            .cloned()
            .chain(listed.into_iter().map(|entry| entry.serial))
            .chain(active.keys().cloned())
            .collect();

        for target in &targets {
            match self.client.remove_all_forwards(target, trace_id).await {
                Ok(()) => {
                    active.remove(target);
                }
                // A device that disappeared holds no forwards worth removing.
                Err(err) if err.is_device_not_found() => {
                    active.remove(target);
                }
                Err(err) => return Err(err),
            }
        }
        info!(trace_id = %trace_id, devices = targets.len(), "forwards cleared");
        Ok(())
    }
}
