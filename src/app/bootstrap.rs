use std::sync::Arc;

use tracing::{info, warn};

use crate::app::adb::client::DeviceClient;
use crate::app::config::CompanionSettings;
use crate::app::error::AppError;
use crate::app::forward::ForwardManager;
use crate::app::models::{BootstrapReport, BootstrapResult, BootstrapStep, ForwardSpec};

pub const SETTINGS_NAMESPACE: &str = "secure";
pub const ACCESSIBILITY_SERVICES_KEY: &str = "enabled_accessibility_services";

/// Appends `service` to a colon-delimited services list, keeping existing entries in order.
/// Returns `None` when the service is already listed.
pub fn merge_accessibility_services(current: Option<&str>, service: &str) -> Option<String> {
    let mut entries: Vec<&str> = current
        .unwrap_or_default()
        .split(':')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect();
    if entries.contains(&service) {
        return None;
    }
    entries.push(service);
    Some(entries.join(":"))
}

/// Makes the companion service reachable: app check, accessibility enable, service start, forward.
///
/// The two middle steps are fire-and-forget on the device side, so their failures are recorded
/// and the sequence moves on. Only a missing app, a failed package listing or a failed forward
/// end the run without a forward.
pub struct RemoteBootstrapper {
    client: Arc<DeviceClient>,
    forwards: Arc<ForwardManager>,
    companion: CompanionSettings,
    forward_spec: ForwardSpec,
}

impl RemoteBootstrapper {
    pub fn new(
        client: Arc<DeviceClient>,
        forwards: Arc<ForwardManager>,
        companion: CompanionSettings,
        forward_spec: ForwardSpec,
    ) -> Self {
        Self {
            client,
            forwards,
            companion,
            forward_spec,
        }
    }

    pub async fn is_app_installed(&self, serial: &str, trace_id: &str) -> Result<bool, AppError> {
        let packages = self.client.list_packages(serial, trace_id).await?;
        Ok(packages.contains(&self.companion.package))
    }

    pub async fn run(&self, known_devices: &[String], serial: &str, trace_id: &str) -> BootstrapReport {
        let mut report = BootstrapReport {
            serial: serial.to_string(),
            results: Vec::new(),
            forward: None,
        };
        let mut step = BootstrapStep::AppCheck;

        loop {
            info!(trace_id = %trace_id, serial = %serial, step = %step, "bootstrap step");
            step = match step {
                BootstrapStep::AppCheck => match self.is_app_installed(serial, trace_id).await {
                    Ok(true) => BootstrapStep::AccessibilityEnable,
                    Ok(false) => {
                        report.results.push(BootstrapResult::AppNotInstalled);
                        BootstrapStep::Done
                    }
                    Err(err) => {
                        report.results.push(step_failed(step, &err, trace_id));
                        BootstrapStep::Done
                    }
                },
                BootstrapStep::AccessibilityEnable => {
                    // Continues to ServiceStart even on a failed write; pending product confirmation.
                    let result = match self.enable_accessibility_service(serial, trace_id).await {
                        Ok(true) => BootstrapResult::AccessibilityServiceEnabled,
                        Ok(false) => BootstrapResult::AlreadyEnabled,
                        Err(err) => step_failed(step, &err, trace_id),
                    };
                    report.results.push(result);
                    BootstrapStep::ServiceStart
                }
                BootstrapStep::ServiceStart => {
                    let result = match self.start_foreground_service(serial, trace_id).await {
                        Ok(()) => BootstrapResult::ServiceStarted,
                        Err(err) => step_failed(step, &err, trace_id),
                    };
                    report.results.push(result);
                    BootstrapStep::ForwardEstablish
                }
                BootstrapStep::ForwardEstablish => {
                    match self
                        .forwards
                        .establish_forward(known_devices, serial, &self.forward_spec, trace_id)
                        .await
                    {
                        Ok(()) => {
                            report.forward = Some(self.forward_spec.clone());
                            report.results.push(BootstrapResult::ForwardEstablished {
                                spec: self.forward_spec.clone(),
                            });
                        }
                        Err(err) => report.results.push(step_failed(step, &err, trace_id)),
                    }
                    BootstrapStep::Done
                }
                BootstrapStep::Done => break,
            };
        }

        info!(
            trace_id = %trace_id,
            serial = %serial,
            forwarded = report.succeeded(),
            "bootstrap finished"
        );
        report
    }

    /// `Ok(true)` when the setting was written, `Ok(false)` when already enabled.
    pub async fn enable_accessibility_service(
        &self,
        serial: &str,
        trace_id: &str,
    ) -> Result<bool, AppError> {
        let current = self
            .client
            .get_setting(serial, SETTINGS_NAMESPACE, ACCESSIBILITY_SERVICES_KEY, trace_id)
            .await?;
        let Some(updated) =
            merge_accessibility_services(current.as_deref(), &self.companion.accessibility_service)
        else {
            return Ok(false);
        };
        self.client
            .put_setting(
                serial,
                SETTINGS_NAMESPACE,
                ACCESSIBILITY_SERVICES_KEY,
                &updated,
                trace_id,
            )
            .await?;
        Ok(true)
    }

    async fn start_foreground_service(&self, serial: &str, trace_id: &str) -> Result<(), AppError> {
        let output = self
            .client
            .shell(
                serial,
                &["am", "start-foreground-service", &self.companion.foreground_service],
                trace_id,
            )
            .await?;
        info!(trace_id = %trace_id, serial = %serial, output = %output.stdout_text().trim(), "companion service start requested");
        Ok(())
    }
}

fn step_failed(step: BootstrapStep, err: &AppError, trace_id: &str) -> BootstrapResult {
    warn!(trace_id = %trace_id, step = %step, error = %err, "bootstrap step failed");
    BootstrapResult::StepFailed {
        step,
        cause: err.error.clone(),
    }
}
